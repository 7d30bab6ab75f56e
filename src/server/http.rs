//! HTTP API
//!
//! - `POST /files`: multipart upload of exactly one file part
//! - `GET /files`: `{"items": [...]}` in upload order
//! - `GET /files/:file_id`: streamed content with the declared name and type
//! - `GET /health`: liveness and file count

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{content_disposition, Error, FileId, Result};
use crate::server::{BodyError, FileService};
use crate::store::{chunk_stream, FileRecord};
use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub files: FileService,
}

/// Body of `GET /files`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub items: Vec<FileRecord>,
}

/// Transport settings for [`create_router`]
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub max_upload_bytes: usize,
    pub cors_allow_origin: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            max_upload_bytes: 1024 * 1024 * 1024,
            cors_allow_origin: "*".to_string(),
        }
    }
}

/// Creates the HTTP router with all public endpoints.
pub fn create_router(state: AppState, options: &HttpOptions) -> Result<Router> {
    let origin = if options.cors_allow_origin == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(&options.cors_allow_origin).map_err(|_| {
            Error::InvalidConfig(format!(
                "invalid CORS origin {:?}",
                options.cors_allow_origin
            ))
        })?;
        AllowOrigin::exact(value)
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Ok(Router::new()
        .route("/files", get(list_files).post(upload_file))
        .route("/files/:file_id", get(download_file))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(options.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_tracing_middleware))
        .with_state(state))
}

/// Accept a single-file multipart upload.
///
/// Anything but exactly one part carrying a filename is rejected, including
/// requests whose first part is a valid file followed by further parts.
async fn upload_file(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<FileRecord>> {
    let mut multipart = multipart.map_err(|e| Error::InvalidUpload(e.body_text()))?;

    let field = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
        .ok_or_else(|| Error::InvalidUpload("no file part".into()))?;

    let name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);

    let mut ingest = state.files.begin_ingest(&name, content_type.as_deref())?;
    ingest.store(field).await?;

    match multipart.next_field().await {
        Ok(None) => {}
        Ok(Some(_)) => return Err(ingest.reject("too many parts")),
        Err(e) => return Err(ingest.abandon(multipart_error(e))),
    }

    Ok(Json(ingest.commit().await?))
}

fn multipart_error(e: MultipartError) -> Error {
    if e.is_too_large() {
        Error::PayloadTooLarge(e.body_text())
    } else {
        Error::InvalidUpload(format!("malformed multipart body: {}", e.body_text()))
    }
}

async fn list_files(State(state): State<AppState>) -> Json<ListFilesResponse> {
    Json(ListFilesResponse {
        items: state.files.list(),
    })
}

async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response> {
    // An id that could never have been issued cannot exist.
    let id = FileId::parse(&file_id).map_err(|_| Error::NotFound(file_id.clone()))?;
    let retrieved = state.files.open_file(&id).await?;

    let content_type = HeaderValue::from_str(&retrieved.record.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(&retrieved.record.name))
        .map_err(|e| Error::Internal(format!("content disposition: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(retrieved.size)),
        ],
        Body::from_stream(chunk_stream(retrieved.file)),
    )
        .into_response())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "files": state.files.len(),
        "version": crate::VERSION,
    }))
}
