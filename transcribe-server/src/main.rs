mod errors;
mod params;
mod records;
mod services;
mod whisper;

use std::io;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use audio_blob_store::{BlobStore, LocalFileBlobStore};
use clap::Parser;
use retry_policy::BackoffPolicy;
use tracing_subscriber::EnvFilter;

use crate::params::Args;
use crate::records::RecordRegistry;
use crate::whisper::{Transcriber, WhisperClient};

pub struct AppState {
    pub(crate) store: Arc<dyn BlobStore + Send + Sync>,
    pub(crate) records: RecordRegistry,
    pub(crate) transcriber: Arc<dyn Transcriber>,
    pub(crate) retry: BackoffPolicy,
    pub(crate) max_upload_bytes: usize,
    /// Held shared by uploads between save and record insert, exclusively by
    /// reconciliation.
    pub(crate) storage_guard: RwLock<()>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BlobStore + Send + Sync>,
        transcriber: Arc<dyn Transcriber>,
        retry: BackoffPolicy,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            records: RecordRegistry::new(),
            transcriber,
            retry,
            max_upload_bytes,
            storage_guard: RwLock::new(()),
        }
    }
}

// The blocking HTTP client must be built outside the async runtime, so the
// actix system is started by hand instead of through `#[actix_web::main]`.
fn main() -> io::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = LocalFileBlobStore::new(&args.storage_root).map_err(io::Error::other)?;
    let client = WhisperClient::new(
        &args.openai_base_url,
        args.openai_api_key.clone(),
        args.model.clone(),
        Duration::from_secs(args.request_timeout_secs),
    )
    .map_err(io::Error::other)?;
    let retry = BackoffPolicy::new(args.backoff_config()).with_label("whisper transcription");

    let state = web::Data::new(AppState::new(Arc::new(store), Arc::new(client), retry, args.max_upload_bytes));
    let max_upload_bytes = args.max_upload_bytes;

    tracing::info!("Listening on {}", args.http_addr);
    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .app_data(web::PayloadConfig::new(max_upload_bytes))
                .configure(services::configure)
        })
        .bind(args.http_addr.clone())?
        .run()
        .await
    })
}
