use std::io;
use std::sync::PoisonError;

use actix_web::{delete, get, post, web, HttpResponse};
use audio_blob_store::{BlobId, StorageError};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::errors::TranscribeErr;
use crate::records::{RecordFilter, TranscriptionRecord, TranscriptionStatus};
use crate::whisper::{TranscribeOptions, Transcript, WhisperError};
use crate::AppState;

const SUPPORTED_EXTENSIONS: [&str; 3] = ["wav", "mp3", "m4a"];

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UploadParams {
    #[validate(length(min = 1, max = 8))]
    extension: String,
    #[validate(length(min = 2, max = 10))]
    language: Option<String>,
    #[validate(length(max = 1000))]
    prompt: Option<String>,
}

const DEFAULT_PAGE_SIZE: usize = 100;

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ListParams {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000))]
    limit: usize,
    status: Option<TranscriptionStatus>,
    #[validate(length(min = 2, max = 10))]
    language: Option<String>,
    #[validate(length(min = 1, max = 255))]
    audio_path: Option<String>,
}

impl ListParams {
    fn filter(&self) -> RecordFilter {
        RecordFilter {
            status: self.status,
            language: self.language.clone(),
            audio_path: self.audio_path.clone(),
        }
    }
}

fn content_type_for(id: &BlobId) -> &'static str {
    match id.extension() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

fn check_upload(params: &UploadParams, body: &[u8], max_upload_bytes: usize) -> Result<String, TranscribeErr> {
    params.validate().map_err(|e| TranscribeErr::BadUpload(e.to_string()))?;
    let extension = params.extension.trim_start_matches('.').to_ascii_lowercase();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(TranscribeErr::BadUpload(format!("unsupported audio format: {}", params.extension)));
    }
    if body.is_empty() {
        return Err(TranscribeErr::BadUpload("empty audio body".to_string()));
    }
    if body.len() > max_upload_bytes {
        return Err(TranscribeErr::TooLarge(max_upload_bytes));
    }
    Ok(extension)
}

#[post("/transcriptions")]
pub(crate) async fn create_transcription(
    query: web::Query<UploadParams>,
    body: web::Bytes,
    shared_state: web::Data<AppState>,
) -> Result<HttpResponse, TranscribeErr> {
    let params = query.into_inner();
    let extension = check_upload(&params, &body, shared_state.max_upload_bytes)?;

    // Save and register under one shared guard so reconciliation never
    // sees the blob without its record.
    let state = shared_state.clone();
    let record = web::block(move || -> Result<TranscriptionRecord, TranscribeErr> {
        let _guard = state.storage_guard.read().unwrap_or_else(PoisonError::into_inner);
        let mut reader: &[u8] = &body;
        let id = state.store.save(&mut reader, &extension, None)?;
        Ok(state.records.create(id))
    })
    .await??;
    tracing::info!("Stored upload {} for transcription {}", record.audio_path, record.id);

    let options = TranscribeOptions { language: params.language, prompt: params.prompt };
    let state = shared_state.clone();
    let audio_path = record.audio_path.clone();
    let outcome = web::block(move || -> Result<Result<Transcript, WhisperError>, TranscribeErr> {
        let path = state.store.resolve(&audio_path)?;
        Ok(state.retry.run(|| state.transcriber.transcribe(&path, &options)))
    })
    .await??;

    match outcome {
        Ok(transcript) => {
            let updated = shared_state
                .records
                .complete(&record.id, transcript)
                .ok_or(TranscribeErr::NotFound(record.id))?;
            Ok(HttpResponse::Ok().json(updated))
        }
        Err(e) => {
            shared_state.records.fail(&record.id, e.to_string());
            Err(TranscribeErr::from_remote(e))
        }
    }
}

#[get("/transcriptions")]
pub(crate) async fn list_transcriptions(
    query: web::Query<ListParams>,
    shared_state: web::Data<AppState>,
) -> Result<HttpResponse, TranscribeErr> {
    let params = query.into_inner();
    params.validate().map_err(|e| TranscribeErr::InvalidQuery(e.to_string()))?;
    let page = shared_state.records.list(&params.filter(), params.offset, params.limit);
    Ok(HttpResponse::Ok().json(page))
}

#[get("/transcriptions/{id}")]
pub(crate) async fn get_transcription(
    id: web::Path<Uuid>,
    shared_state: web::Data<AppState>,
) -> Result<HttpResponse, TranscribeErr> {
    let id = id.into_inner();
    let record = shared_state.records.get(&id).ok_or(TranscribeErr::NotFound(id))?;
    Ok(HttpResponse::Ok().json(record))
}

#[get("/transcriptions/{id}/audio")]
pub(crate) async fn get_audio(
    id: web::Path<Uuid>,
    shared_state: web::Data<AppState>,
) -> Result<HttpResponse, TranscribeErr> {
    let id = id.into_inner();
    let record = shared_state.records.get(&id).ok_or(TranscribeErr::NotFound(id))?;
    let content_type = content_type_for(&record.audio_path);

    let state = shared_state.clone();
    let bytes = web::block(move || -> Result<Vec<u8>, TranscribeErr> {
        let path = state.store.resolve(&record.audio_path)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                tracing::warn!("Audio for transcription {} is missing on disk", id);
                TranscribeErr::NotFound(id)
            }
            _ => StorageError::from_io("reading blob", e).into(),
        })
    })
    .await??;

    Ok(HttpResponse::Ok().content_type(content_type).body(bytes))
}

#[delete("/transcriptions/{id}")]
pub(crate) async fn delete_transcription(
    id: web::Path<Uuid>,
    shared_state: web::Data<AppState>,
) -> Result<HttpResponse, TranscribeErr> {
    let id = id.into_inner();
    let record = shared_state.records.remove(&id).ok_or(TranscribeErr::NotFound(id))?;

    let state = shared_state.clone();
    let removed = web::block(move || state.store.delete(&record.audio_path)).await?;
    match removed {
        Ok(true) => tracing::info!("Deleted transcription {} and its audio", id),
        Ok(false) => tracing::warn!("Transcription {} had no audio on disk", id),
        // The blob is unreferenced now; the next reconcile run collects it.
        Err(e) => tracing::warn!("Failed to delete audio for transcription {}: {}", id, e),
    }
    Ok(HttpResponse::NoContent().finish())
}
