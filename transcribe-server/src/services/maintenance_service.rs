use std::sync::PoisonError;

use actix_web::{get, post, web, HttpResponse};
use audio_blob_store::{find_orphans, reconcile_orphans};
use serde::{Deserialize, Serialize};

use crate::errors::TranscribeErr;
use crate::AppState;

#[derive(Serialize)]
struct Health {
    status: &'static str,
    records: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReconcileParams {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct ReconcileReport {
    orphans: usize,
    deleted: usize,
    dry_run: bool,
}

#[get("/health")]
pub(crate) async fn health(shared_state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(Health { status: "ok", records: shared_state.records.len() })
}

#[post("/maintenance/reconcile")]
pub(crate) async fn reconcile(
    query: web::Query<ReconcileParams>,
    shared_state: web::Data<AppState>,
) -> Result<HttpResponse, TranscribeErr> {
    let dry_run = query.into_inner().dry_run;
    let state = shared_state.clone();
    let report = web::block(move || -> Result<ReconcileReport, TranscribeErr> {
        // Exclusive: no upload may save a blob between the listing and the deletes.
        let _guard = state.storage_guard.write().unwrap_or_else(PoisonError::into_inner);
        let references = state.records.referenced_paths();
        let orphans = find_orphans(state.store.as_ref(), &references)?;
        let deleted = if dry_run || orphans.is_empty() {
            0
        } else {
            reconcile_orphans(state.store.as_ref(), &references)?
        };
        Ok(ReconcileReport { orphans: orphans.len(), deleted, dry_run })
    })
    .await??;

    tracing::info!(
        "Reconcile finished: {} orphans, {} deleted (dry run: {})",
        report.orphans, report.deleted, report.dry_run
    );
    Ok(HttpResponse::Ok().json(report))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::configure;
    use crate::services::test_support::{state, FakeTranscriber};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use audio_blob_store::BlobStore;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[actix_web::test]
    async fn test_health() {
        let dir = tempdir().unwrap();
        let data = state(dir.path(), Arc::new(FakeTranscriber::default()));
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["records"], 0);
    }

    #[actix_web::test]
    async fn test_reconcile_keeps_referenced_audio() {
        let dir = tempdir().unwrap();
        let data = state(dir.path(), Arc::new(FakeTranscriber::default()));
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post().uri("/transcriptions?extension=wav").set_payload(vec![1u8; 16]).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        data.store.save(&mut Cursor::new(vec![9u8; 16]), "mp3", None).unwrap();
        data.store.save(&mut Cursor::new(vec![8u8; 16]), "mp3", None).unwrap();

        let req = test::TestRequest::post().uri("/maintenance/reconcile?dry_run=true").to_request();
        let report: ReconcileReport = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report, ReconcileReport { orphans: 2, deleted: 0, dry_run: true });
        assert_eq!(data.store.list_all().unwrap().len(), 3);

        let req = test::TestRequest::post().uri("/maintenance/reconcile").to_request();
        let report: ReconcileReport = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report, ReconcileReport { orphans: 2, deleted: 2, dry_run: false });

        let remaining = data.store.list_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.into_iter().collect::<std::collections::HashSet<_>>(), data.records.referenced_paths());
    }

    #[actix_web::test]
    async fn test_reconcile_empty_store() {
        let dir = tempdir().unwrap();
        let data = state(dir.path(), Arc::new(FakeTranscriber::default()));
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post().uri("/maintenance/reconcile").to_request();
        let report: ReconcileReport = test::call_and_read_body_json(&app, req).await;

        assert_eq!(report, ReconcileReport { orphans: 0, deleted: 0, dry_run: false });
    }
}
