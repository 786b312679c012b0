use actix_web::web;

pub mod maintenance_service;
pub mod transcription_service;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(maintenance_service::health)
        .service(maintenance_service::reconcile)
        .service(transcription_service::create_transcription)
        .service(transcription_service::list_transcriptions)
        .service(transcription_service::get_audio)
        .service(transcription_service::get_transcription)
        .service(transcription_service::delete_transcription);
}
