// 🌐 HTTP API - upload, poll, download
//
//   POST /api/uploads               multipart: file|files, processingType, format
//   GET  /api/status/*file_key      job status by uploaded file key
//   GET  /api/download/*output_key  finished artifact as an attachment
//   GET  /api/health

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::emit::OutputFormat;
use crate::error::ConvertError;
use crate::job::ProcessingType;
use crate::orchestrator::Orchestrator;
use crate::status::JobStatusView;
use crate::upload::{Upload, UploadFile, MIB};

// ============================================================================
// ERRORS → RESPONSES
// ============================================================================

impl ConvertError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConvertError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ConvertError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ConvertError::NoFiles
            | ConvertError::TooManyFiles { .. }
            | ConvertError::UnknownProcessingType(_)
            | ConvertError::UnknownFormat(_)
            | ConvertError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            ConvertError::NotFound(_) => StatusCode::NOT_FOUND,
            ConvertError::NotReady(_) | ConvertError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ConvertError::Storage(_) | ConvertError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the application router with all API endpoints
pub fn create_router(orchestrator: Orchestrator) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // validate_upload enforces the real per-file limits; this only caps the raw body
    let limits = &orchestrator.settings().limits;
    let body_limit = limits
        .statement_max_bytes
        .max(limits.csv_max_bytes.saturating_mul(limits.max_csv_files))
        .saturating_add(MIB);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/uploads", post(upload_statement))
        .route("/api/status/*file_key", get(job_status))
        .route("/api/download/*output_key", get(download_artifact))
        .with_state(orchestrator)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped
pub async fn run_server(orchestrator: Orchestrator, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(orchestrator);

    let addr = format!("{}:{}", host, port).parse::<SocketAddr>()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadAccepted {
    file_key: String,
    job_id: Uuid,
    output_key: String,
    format: OutputFormat,
}

async fn upload_statement(
    State(orchestrator): State<Orchestrator>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAccepted>), ConvertError> {
    let mut processing_type = ProcessingType::default();
    let mut format = OutputFormat::default();
    let mut files = Vec::new();

    let malformed = |e: axum::extract::multipart::MultipartError| {
        ConvertError::MalformedUpload(e.body_text())
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "files" | "files[]" => {
                let file_name = field.file_name().unwrap_or("statement").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(malformed)?;
                files.push(UploadFile::new(file_name, content_type, bytes.to_vec()));
            }
            "processingType" | "processing_type" | "type" => {
                processing_type = field.text().await.map_err(malformed)?.parse()?;
            }
            "format" => {
                format = field.text().await.map_err(malformed)?.parse()?;
            }
            other => warn!(field = other, "Ignoring unknown upload field"),
        }
    }

    let job = orchestrator
        .submit(Upload {
            processing_type,
            format,
            files,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            file_key: job.source_key().to_string(),
            job_id: job.id,
            output_key: job.planned_output_key.clone(),
            format: job.format,
        }),
    ))
}

async fn job_status(
    State(orchestrator): State<Orchestrator>,
    Path(file_key): Path<String>,
) -> Result<Json<JobStatusView>, ConvertError> {
    let view = orchestrator.status(file_key.trim_start_matches('/')).await?;
    Ok(Json(view))
}

async fn download_artifact(
    State(orchestrator): State<Orchestrator>,
    Path(output_key): Path<String>,
) -> Result<Response, ConvertError> {
    let download = orchestrator.download(output_key.trim_start_matches('/')).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace(['"', '\\'], "_")
    );

    let headers = [
        (header::CONTENT_TYPE, download.content_type),
        (header::CONTENT_DISPOSITION, disposition),
        (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate".to_string()),
        (header::PRAGMA, "no-cache".to_string()),
        (header::EXPIRES, "0".to_string()),
    ];

    Ok((headers, download.bytes).into_response())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ConvertError::UnsupportedMediaType("application/zip".into()), 415),
            (
                ConvertError::FileTooLarge {
                    name: "a.pdf".into(),
                    size: 2,
                    limit: 1,
                },
                413,
            ),
            (ConvertError::NoFiles, 400),
            (ConvertError::NotFound("x".into()), 404),
            (ConvertError::NotReady("x".into()), 409),
            (ConvertError::Pipeline(anyhow::anyhow!("boom")), 500),
        ];
        for (err, code) in cases {
            assert_eq!(err.status_code().as_u16(), code, "{}", err);
        }
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let response = ConvertError::Storage(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["retryable"], true);
    }
}
