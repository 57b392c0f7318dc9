//! HTTP upload surface.
//!
//! Exposes one shared [`DocumentProcessor`] over a small JSON API, standing in
//! for the browser upload and tab UI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/document` | Snapshot of the current document |
//! | `PUT`    | `/document` | Upload raw bytes; `Content-Type` is the document type |
//! | `DELETE` | `/document` | Clear the current document |
//! | `POST`   | `/document/extract` | Extract text from the uploaded document |
//! | `POST`   | `/document/{kind}` | Run `summary` or `translation` (extracts first if needed) |
//! | `POST`   | `/chat` | Ask a question: `{ "message": "..." }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_document", "message": "no document available for this step" } }
//! ```
//!
//! Error codes: `bad_request` (400), `empty_message` (400), `not_found` (404),
//! `no_document` (409), `busy` (409), `superseded` (409), `file_too_large` (413),
//! `unsupported_type` (415), `extraction_failed` (422), `completion_failed` (502).

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::completion::HttpCompletionClient;
use crate::config::Config;
use crate::models::{Artifact, ArtifactKind, ConversationTurn, SourceDocument};
use crate::processor::{DocumentProcessor, DocumentSnapshot, ProcessError};
use crate::progress::TracingProgress;
use crate::prompts::{artifact_title, CHAT_FALLBACK};
use crate::session::ChatError;
use crate::validate::ValidationError;

/// Header carrying the original file name of an upload.
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    processor: Arc<DocumentProcessor>,
    max_size_bytes: u64,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let client = HttpCompletionClient::new(&config.completion)?;
    tracing::info!(model = client.model(), endpoint = %config.completion.endpoint, "completion backend configured");

    let processor = DocumentProcessor::new(config, Arc::new(client))
        .with_reporter(Arc::new(TracingProgress));
    let app = router(Arc::new(processor), config);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("PDF processor listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router around an existing processor.
pub fn router(processor: Arc<DocumentProcessor>, config: &Config) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Bodies up to one byte over the limit reach the validator; longer ones
    // are cut off here and rejected in `handle_upload`.
    let body_limit = usize::try_from(config.upload.max_size_bytes.saturating_add(1))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/document",
            get(handle_snapshot).put(handle_upload).delete(handle_clear),
        )
        .route("/document/extract", post(handle_extract))
        .route("/document/{kind}", post(handle_operation))
        .route("/chat", post(handle_chat))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(AppState {
            processor,
            max_size_bytes: config.upload.max_size_bytes,
        })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ProcessError> for AppError {
    fn from(err: ProcessError) -> Self {
        let message = err.to_string();
        match err {
            ProcessError::Validation(ValidationError::TooLarge { .. }) => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "file_too_large", message)
            }
            ProcessError::Validation(ValidationError::UnsupportedType(_)) => {
                AppError::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_type", message)
            }
            ProcessError::Extraction(_) => {
                AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed", message)
            }
            ProcessError::Completion(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "completion_failed", message)
            }
            ProcessError::NoDocument => AppError::new(StatusCode::CONFLICT, "no_document", message),
            ProcessError::Busy => AppError::new(StatusCode::CONFLICT, "busy", message),
            ProcessError::Superseded => AppError::new(StatusCode::CONFLICT, "superseded", message),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::EmptyMessage => {
                AppError::new(StatusCode::BAD_REQUEST, "empty_message", message)
            }
            ChatError::NoDocument => AppError::new(StatusCode::CONFLICT, "no_document", message),
            ChatError::Busy => AppError::new(StatusCode::CONFLICT, "busy", message),
            ChatError::Superseded => AppError::new(StatusCode::CONFLICT, "superseded", message),
            ChatError::Completion(_) => AppError::new(
                StatusCode::BAD_GATEWAY,
                "completion_failed",
                format!("{} ({})", CHAT_FALLBACK, message),
            ),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ /document ============

async fn handle_snapshot(State(state): State<AppState>) -> Json<DocumentSnapshot> {
    Json(state.processor.snapshot())
}

/// Handler for `PUT /document`.
///
/// The request body is the raw file; `Content-Type` is its declared type and
/// the optional `X-File-Name` header its display name. A body cut off at the
/// size limit is rejected like any other oversized document.
async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<DocumentSnapshot>), AppError> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let size_bytes = headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(state.max_size_bytes.saturating_add(1));
            let err = state.processor.reject(ValidationError::TooLarge {
                size_bytes,
                max_bytes: state.max_size_bytes,
            });
            return Err(err.into());
        }
        Err(rejection) => {
            return Err(AppError::new(
                rejection.status(),
                "bad_request",
                rejection.body_text(),
            ))
        }
    };

    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let mut document = SourceDocument::new(body, mime_type);
    if let Some(name) = headers.get(FILE_NAME_HEADER).and_then(|v| v.to_str().ok()) {
        document = document.with_name(name);
    }

    state.processor.submit(document)?;
    Ok((StatusCode::CREATED, Json(state.processor.snapshot())))
}

async fn handle_clear(State(state): State<AppState>) -> Json<DocumentSnapshot> {
    state.processor.clear();
    Json(state.processor.snapshot())
}

#[derive(Serialize)]
struct ExtractResponse {
    page_count: usize,
    char_count: usize,
    text: String,
}

async fn handle_extract(State(state): State<AppState>) -> Result<Json<ExtractResponse>, AppError> {
    let text = state.processor.run_extraction().await?;
    Ok(Json(ExtractResponse {
        page_count: text.page_count(),
        char_count: text.char_count(),
        text: text.as_str().to_string(),
    }))
}

#[derive(Serialize)]
struct OperationResponse {
    title: String,
    #[serde(flatten)]
    artifact: Artifact,
}

/// Handler for `POST /document/{kind}`.
async fn handle_operation(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<OperationResponse>, AppError> {
    let kind: ArtifactKind = kind
        .parse()
        .map_err(|e: String| AppError::new(StatusCode::NOT_FOUND, "not_found", e))?;
    let artifact = state.processor.process(kind).await?;
    Ok(Json(OperationResponse {
        title: artifact_title(kind, state.processor.prompts()),
        artifact,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ConversationTurn>, AppError> {
    let turn = state.processor.ask(&request.message).await?;
    Ok(Json(turn))
}
