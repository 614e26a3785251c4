//! Timetable Extractor - upload a timetable image or document, get structured JSON back.

mod artifacts;
mod config;
mod documents;
mod error;
mod llm;
mod normalizer;
mod ocr;
mod pipeline;
mod preprocess;
mod samples;
mod schema;
mod storage;
mod text_parser;
mod time_format;
mod validator;

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use documents::ALLOWED_MIME_TYPES;
use error::{PipelineError, StorageError};
use llm::LlmClient;
use ocr::mistral::MistralOcrProvider;
use ocr::tesseract::TesseractOcr;
use ocr::{OcrProvider, OcrProviderKind};
use pipeline::{Pipeline, Upload};
use storage::FileStore;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    upload_dir: PathBuf,
    max_file_size: usize,
    started: Instant,
}

type ApiError = (StatusCode, Json<Value>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "timetable_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let http = reqwest::Client::new();

    let ocr: Arc<dyn OcrProvider> = match config.ocr_provider {
        OcrProviderKind::Tesseract => {
            Arc::new(TesseractOcr::new(&config.tesseract_path, &config.tesseract_lang))
        }
        OcrProviderKind::MistralOcr => {
            let key = config
                .mistral_api_key
                .clone()
                .context("MISTRAL_API_KEY not set")?;
            Arc::new(MistralOcrProvider::new(key, http.clone()))
        }
    };
    info!("OCR provider: {}", ocr.name());

    let store = Arc::new(FileStore::new(&config.data_dir));
    info!("Timetable store: {:?}", store.dir());
    let mut pipeline = Pipeline::new(ocr.clone(), store);

    if config.has_vision_credential() {
        info!("Vision model enabled: {}", config.openai_model);
    } else {
        warn!("OPENAI_API_KEY not configured, images will go straight to OCR");
    }
    if let Some(llm) = LlmClient::from_config(&config, http) {
        let llm = Arc::new(llm);
        pipeline = pipeline.with_vision(llm.clone()).with_repairer(llm);
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload dir {:?}", config.upload_dir))?;

    let state = AppState {
        pipeline: Arc::new(pipeline),
        upload_dir: config.upload_dir.clone(),
        max_file_size: config.max_file_size,
        started: Instant::now(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/timetable/upload", post(upload_timetable))
        .route("/api/timetable", get(list_timetables))
        .route("/api/timetable/:id", get(get_timetable).delete(delete_timetable))
        .layer(DefaultBodyLimit::max(config.max_file_size + MULTIPART_OVERHEAD))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ocr.release().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started.elapsed().as_secs_f64(),
    }))
}

/// Upload a timetable file and run the extraction pipeline on it.
async fn upload_timetable(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let mime_type = field.content_type().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Failed to read file: {}", e)))?;
            file = Some((filename, mime_type, data));
            break;
        }
    }

    let Some((filename, mime_type, data)) = file else {
        return Err(bad_request("No file uploaded"));
    };

    if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
        return Err(bad_request(format!(
            "Invalid file type. Only PDF, JPEG, PNG, and DOCX files are allowed. Received: {}",
            mime_type
        )));
    }

    if data.len() > state.max_file_size {
        return Err(bad_request("File too large"));
    }

    info!("Received file: {} ({} bytes, {})", filename, data.len(), mime_type);

    let path = state.upload_dir.join(stored_file_name(&filename));
    tokio::fs::write(&path, &data).await.map_err(|e| {
        error!("Failed to write upload {:?}: {}", path, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": "Failed to store uploaded file" })),
        )
    })?;

    let upload = Upload {
        original_filename: filename,
        mime_type,
        path,
    };

    match state.pipeline.process(upload).await {
        Ok(outcome) => Ok(Json(json!({
            "status": "success",
            "data": outcome.timetable,
            "metadata": outcome.metadata,
        }))),
        Err(e) => {
            error!("Upload failed at stage {}: {}", e.stage(), e);
            Err(pipeline_error_response(&e))
        }
    }
}

async fn get_timetable(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.pipeline.store().get(&id).await {
        Ok(Some(timetable)) => Ok(Json(json!({ "status": "success", "data": timetable }))),
        Ok(None) | Err(StorageError::InvalidId(_)) => Err(not_found()),
        Err(e) => {
            error!("Failed to load timetable {}: {}", id, e);
            Err(internal_error("Failed to load timetable"))
        }
    }
}

async fn delete_timetable(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.pipeline.store().delete(&id).await {
        Ok(true) => Ok(Json(json!({ "status": "success", "message": "Timetable deleted" }))),
        Ok(false) | Err(StorageError::InvalidId(_)) => Err(not_found()),
        Err(e) => {
            error!("Failed to delete timetable {}: {}", id, e);
            Err(internal_error("Failed to delete timetable"))
        }
    }
}

async fn list_timetables(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let ids = state.pipeline.store().list().await.map_err(|e| {
        error!("Failed to list timetables: {}", e);
        internal_error("Failed to list timetables")
    })?;

    Ok(Json(json!({
        "status": "success",
        "data": { "timetableIds": ids },
    })))
}

// ============================================================================
// Helper functions
// ============================================================================

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "error", "message": message.into() })),
    )
}

fn not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "error", "message": "Timetable not found" })),
    )
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": "error", "message": message })),
    )
}

fn pipeline_error_response(err: &PipelineError) -> ApiError {
    match err {
        PipelineError::Validation(errors) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": err.to_string(),
                "errors": errors,
            })),
        ),
        _ => {
            let status = match err {
                PipelineError::ExtractionUnavailable => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(json!({
                    "status": "error",
                    "message": err.to_string(),
                    "stage": err.stage().as_str(),
                })),
            )
        }
    }
}

/// `upload-<millis>-<uuid><ext>`, keeping the client's extension.
fn stored_file_name(original: &str) -> String {
    let ext = FsPath::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    format!(
        "upload-{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4(),
        ext
    )
}
