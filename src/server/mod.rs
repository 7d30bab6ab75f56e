//! File server
//!
//! Handles uploads and downloads with:
//! - Ingest pipeline with staged blob writes
//! - Journal-then-index commit protocol
//! - Streaming retrieval

pub mod http;
pub mod ingest;
pub mod retrieval;
pub mod service;

pub use http::{create_router, AppState, HttpOptions, ListFilesResponse};
pub use ingest::{BodyError, Ingest, IngestState, DEFAULT_CONTENT_TYPE};
pub use retrieval::RetrievedFile;
pub use service::FileService;

use crate::common::{Config, Error, Result};

pub struct FileServer {
    config: Config,
}

impl FileServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting filedrop {}", crate::VERSION);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Journal: {}", self.config.journal_path().display());
        tracing::info!("  Blobs: {}", self.config.blobs_dir().display());

        let files = FileService::open(&self.config)?;

        let options = HttpOptions {
            max_upload_bytes: usize::try_from(self.config.max_upload_bytes).map_err(|_| {
                Error::InvalidConfig("max_upload_bytes does not fit in memory size".into())
            })?,
            cors_allow_origin: self.config.cors_allow_origin.clone(),
        };
        let router = create_router(AppState { files }, &options)?;

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ filedrop ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("filedrop stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
