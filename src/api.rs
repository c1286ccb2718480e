//! HTTP surface for DocSense.
//!
//! - `POST /upload` – Store a PDF from a multipart `file` field, extract and index its text.
//! - `POST /scrape_and_index` – Fetch a web page and index its visible text under its title.
//! - `POST /query` – Answer a question with source attributions.
//! - `POST /stream_query` – Same as `/query`, streamed as server-sent events: one `token`
//!   event per generated token, then `[DONE]`, then the final answer with its sources.
//! - `POST /summarize` – Summarize every indexed document.
//! - `POST /reset` – Drop the index and delete uploaded files.
//! - `GET /status` – Report whether anything is indexed.
//!
//! Failures are returned as `{"detail": "<message>"}` with status 400 for bad input and
//! missing documents, 500 for everything else.

pub mod schemas;

use crate::config::Config;
use crate::document::{DocumentError, DocumentProcessor};
use crate::rag::{FinalResponse, NO_DOCUMENTS_MESSAGE, RagError, RagService};
use async_stream::stream;
use axum::{
    Json, Router, async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use futures_core::Stream;
use futures_util::StreamExt;
use schemas::{QueryRequest, ScrapeRequest, StatusResponse, SummarizeRequest, SummaryResponse};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const MULTIPART_OVERHEAD: usize = 64 * 1024;
const UPLOAD_FIELD: &str = "file";
const FILE_TOO_LARGE: &str = "File size exceeds maximum limit";
const UNSUPPORTED_FILE: &str = "Only PDF files are supported";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Index and question answering.
    pub rag: Arc<RagService>,
    /// Text extraction for uploads and scraped pages.
    pub processor: DocumentProcessor,
    /// Directory uploads are written to.
    pub upload_dir: PathBuf,
    /// Largest accepted upload, in bytes.
    pub max_file_size: usize,
}

impl AppState {
    /// State using the upload settings from `config`.
    pub fn new(rag: Arc<RagService>, config: &Config) -> Self {
        Self {
            rag,
            processor: DocumentProcessor::new(),
            upload_dir: config.upload_dir.clone(),
            max_file_size: config.max_file_size,
        }
    }
}

/// Build the HTTP router with CORS and request tracing applied to every route.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_file_size.saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/upload", post(upload_document))
        .route("/scrape_and_index", post(scrape_and_index))
        .route("/query", post(query))
        .route("/stream_query", post(stream_query))
        .route("/summarize", post(summarize))
        .route("/reset", post(reset_index))
        .route("/status", get(get_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Save an uploaded PDF, extract its text and index it under its file name.
async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if !state.processor.validate_file_type(&filename) {
            return Err(ApiError::BadRequest(UNSUPPORTED_FILE.to_string()));
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(ApiError::BadRequest(format!(
            "Missing multipart field '{UPLOAD_FIELD}'"
        )));
    };
    if bytes.len() > state.max_file_size {
        return Err(ApiError::BadRequest(FILE_TOO_LARGE.to_string()));
    }
    let filename = sanitize_filename(&filename)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid file name '{filename}'")))?;

    let path = state.upload_dir.join(&filename);
    match index_upload(&state, &path, &filename, &bytes).await {
        Ok(text_length) => {
            let documents = state.rag.get_indexed_documents().await;
            tracing::info!(filename = %filename, text_length, "Upload indexed");
            Ok(Json(StatusResponse::success(
                format!("Document '{filename}' uploaded and indexed successfully"),
                Some(json!({
                    "filename": filename,
                    "text_length": text_length,
                    "indexed_documents": documents,
                })),
            )))
        }
        Err(error) => {
            if let Err(remove_error) = tokio::fs::remove_file(&path).await {
                if remove_error.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %remove_error, "Failed to remove upload");
                }
            }
            tracing::error!(filename = %filename, error = %error, "Upload failed");
            Err(ApiError::Internal(format!(
                "Error processing document: {error}"
            )))
        }
    }
}

async fn index_upload(
    state: &AppState,
    path: &Path,
    filename: &str,
    bytes: &[u8],
) -> Result<usize, UploadError> {
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(UploadError::Store)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(UploadError::Store)?;
    let text = state.processor.extract_pdf_text(path).await?;
    let cleaned = DocumentProcessor::clean_text(&text);
    state.rag.create_index_from_text(&cleaned, filename).await?;
    Ok(cleaned.chars().count())
}

/// Failures after an upload has been accepted; the stored file is removed on any of them.
#[derive(Debug, Error)]
enum UploadError {
    #[error("Failed to store upload: {0}")]
    Store(#[source] std::io::Error),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Rag(#[from] RagError),
}

/// Fetch a page, clean its text and index it under the page title.
async fn scrape_and_index(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ScrapeRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let url = validate_url(&request.url)?;

    let (title, text) = state
        .processor
        .scrape_url(&url)
        .await
        .map_err(|error| ApiError::Internal(format!("Error scraping URL: {error}")))?;
    let cleaned = DocumentProcessor::clean_text(&text);
    state
        .rag
        .create_index_from_text(&cleaned, &title)
        .await
        .map_err(|error| ApiError::Internal(format!("Error scraping URL: {error}")))?;

    let documents = state.rag.get_indexed_documents().await;
    tracing::info!(url = %url, title = %title, "Page indexed");
    Ok(Json(StatusResponse::success(
        "URL content indexed successfully",
        Some(json!({
            "url": url,
            "title": title,
            "text_length": cleaned.chars().count(),
            "indexed_documents": documents,
        })),
    )))
}

async fn query(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<QueryRequest>,
) -> Result<Json<FinalResponse>, ApiError> {
    let (final_answer, sources) = state
        .rag
        .query(&request.question)
        .await
        .map_err(|error| ApiError::from_rag("Error processing query", error))?;
    Ok(Json(FinalResponse {
        final_answer,
        sources,
    }))
}

async fn stream_query(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if !state.rag.has_documents().await {
        return Err(ApiError::BadRequest(NO_DOCUMENTS_MESSAGE.to_string()));
    }
    Ok(Sse::new(answer_events(
        Arc::clone(&state.rag),
        request.question,
    )))
}

/// Token events, then `[DONE]`, then the final answer. Any failure ends the stream with a
/// single `error` event.
fn answer_events(
    rag: Arc<RagService>,
    question: String,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream! {
        let mut tokens = match rag.stream_query(&question).await {
            Ok(tokens) => tokens,
            Err(error) => {
                yield Ok(error_event(&error));
                return;
            }
        };

        let mut final_answer = String::new();
        while let Some(token) = tokens.next().await {
            match token {
                Ok(token) => {
                    final_answer.push_str(&token);
                    yield Ok(Event::default().data(json!({ "token": token }).to_string()));
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Answer stream failed");
                    yield Ok(error_event(&error));
                    return;
                }
            }
        }

        let sources = match rag.retrieve(&question).await {
            Ok(sources) => sources,
            Err(error) => {
                yield Ok(error_event(&error));
                return;
            }
        };

        yield Ok(Event::default().data("[DONE]"));
        let response = FinalResponse { final_answer, sources };
        yield Ok(match Event::default().json_data(&response) {
            Ok(event) => event,
            Err(error) => error_event(&error),
        });
    }
}

fn error_event(error: &dyn std::fmt::Display) -> Event {
    Event::default().data(json!({ "error": error.to_string() }).to_string())
}

async fn summarize(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SummaryResponse>, ApiError> {
    let request = summarize_request(&body)?;
    tracing::debug!(
        max_length = request.max_length(),
        style = request.style(),
        "Summary requested"
    );

    let summary = state
        .rag
        .summarize(request.max_length())
        .await
        .map_err(|error| ApiError::from_rag("Error generating summary", error))?;
    let word_count = summary.split_whitespace().count();
    Ok(Json(SummaryResponse {
        summary,
        word_count,
        source_documents: state.rag.get_indexed_documents().await,
    }))
}

/// An empty body asks for the default summary; anything else must be a valid request.
fn summarize_request(body: &[u8]) -> Result<SummarizeRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SummarizeRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|error| ApiError::BadRequest(format!("Invalid request body: {error}")))
}

async fn reset_index(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state.rag.reset_index().await;
    let removed = remove_uploads(&state.upload_dir)
        .await
        .map_err(|error| ApiError::Internal(format!("Error resetting index: {error}")))?;
    tracing::info!(removed, "Uploads removed");
    Ok(Json(StatusResponse::success(
        "Index reset successfully. All documents removed.",
        None,
    )))
}

/// Delete every regular file directly inside `dir`. A missing directory is not an error.
async fn remove_uploads(dir: &Path) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(error),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let documents = state.rag.get_indexed_documents().await;
    Json(StatusResponse {
        status: "online".to_string(),
        message: "DocSense RAG API is running".to_string(),
        details: Some(json!({
            "has_documents": state.rag.has_documents().await,
            "document_count": documents.len(),
            "indexed_documents": documents,
        })),
    })
}

/// Keep only the final path component of a client-supplied file name.
fn sanitize_filename(filename: &str) -> Option<String> {
    let last = filename.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

fn validate_url(raw: &str) -> Result<String, ApiError> {
    let url = reqwest::Url::parse(raw.trim())
        .map_err(|error| ApiError::BadRequest(format!("Invalid URL '{raw}': {error}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ApiError::BadRequest(format!(
            "Invalid URL '{raw}': only http and https URLs are supported"
        )));
    }
    Ok(url.to_string())
}

fn multipart_error(error: axum::extract::multipart::MultipartError) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::BadRequest(FILE_TOO_LARGE.to_string())
    } else {
        ApiError::BadRequest(format!("Invalid multipart payload: {}", error.body_text()))
    }
}

/// JSON body extractor whose rejections are reported as 400 `{"detail"}` errors.
struct ApiJson<T>(T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(request, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| {
                ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
            })
    }
}

/// Error returned by handlers, rendered as `{"detail": message}`.
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    fn from_rag(context: &str, error: RagError) -> Self {
        match error {
            RagError::NoDocuments => Self::BadRequest(NO_DOCUMENTS_MESSAGE.to_string()),
            other => {
                tracing::error!(error = %other, "{context}");
                Self::Internal(format!("{context}: {other}"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
