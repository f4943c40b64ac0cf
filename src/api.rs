use std::path::Path;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State},
    http::{
        header::{self, CACHE_CONTROL, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::fs;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    artifact_store::write_temp_input,
    error::ApiError,
    formats::{
        content_type_for, format_from_file_name, is_input_format, is_output_format,
        INPUT_FORMATS, OUTPUT_FORMATS,
    },
    models::{ConvertRequest, ConvertResponse, FormatsResponse, JobInput, JobStatus},
    service::JobOutcome,
    AppState,
};

const FALLBACK_SOURCE_FORMAT: &str = "markdown";

pub fn router(state: AppState) -> Router {
    let body_limit = state.service.config().max_upload_bytes;

    Router::new()
        .route("/ping", get(ping))
        .route("/api/convert", post(convert))
        .route("/api/download", get(download))
        .route("/api/status", get(job_status))
        .route("/api/formats", get(formats))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn ping() -> impl IntoResponse {
    (
        [(CACHE_CONTROL, "no-store")],
        Json(json!({
            "status": "ok",
            "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })),
    )
}

pub async fn formats() -> impl IntoResponse {
    (
        [(CACHE_CONTROL, "public, max-age=3600")],
        Json(FormatsResponse {
            input: INPUT_FORMATS,
            output: OUTPUT_FORMATS,
        }),
    )
}

/// Parsed conversion request, before validation.
struct Submission {
    from: String,
    to: String,
    input: JobInput,
}

pub async fn convert(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let submission = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|_| ApiError::BadRequest("Failed to parse form".to_string()))?;
        read_upload(&state, multipart).await?
    } else {
        let body = Bytes::from_request(request, &state)
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read request body".to_string()))?;
        read_json(&body)?
    };

    validate_formats(&submission.from, &submission.to)?;

    let outcome = state
        .service
        .submit_and_wait(submission.from, submission.to, submission.input)
        .await?;

    match outcome {
        JobOutcome::Done { job_id } => Ok((
            StatusCode::OK,
            [(CACHE_CONTROL, "no-store")],
            Json(ConvertResponse {
                job_id,
                status: JobStatus::Done,
            }),
        )
            .into_response()),
        JobOutcome::Failed { job_id, error } => Err(ApiError::ConversionFailed {
            job_id,
            message: error,
        }),
        JobOutcome::TimedOut { job_id } => Err(ApiError::Timeout { job_id }),
    }
}

fn read_json(body: &[u8]) -> Result<Submission, ApiError> {
    let request: ConvertRequest = serde_json::from_slice(body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON".to_string()))?;
    Ok(Submission {
        from: request.from.trim().to_string(),
        to: request.to.trim().to_string(),
        input: JobInput::Inline(request.content),
    })
}

async fn read_upload(state: &AppState, mut multipart: Multipart) -> Result<Submission, ApiError> {
    let mut from = String::new();
    let mut to = String::new();
    let mut upload: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("Failed to parse form: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("Failed to read file: {err}")))?;
                upload = Some((file_name, bytes));
            }
            "from" | "to" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("Failed to parse form: {err}")))?;
                if name == "from" {
                    from = value.trim().to_string();
                } else {
                    to = value.trim().to_string();
                }
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = upload else {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    };
    let file_name = file_name.unwrap_or_default();

    if from.is_empty() {
        from = format_from_file_name(&file_name)
            .unwrap_or(FALLBACK_SOURCE_FORMAT)
            .to_string();
    }

    let suffix = Path::new(&file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let work_root = state.service.config().work_root.clone();
    let temp = tokio::task::spawn_blocking(move || write_temp_input(&work_root, &suffix, &bytes))
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to save file: {err}")))?
        .map_err(|err| {
            warn!("Failed to save upload: {err:#}");
            ApiError::Internal("Failed to save file".to_string())
        })?;

    Ok(Submission {
        from,
        to,
        input: JobInput::Upload(temp),
    })
}

fn validate_formats(from: &str, to: &str) -> Result<(), ApiError> {
    if from.is_empty() || to.is_empty() {
        return Err(ApiError::BadRequest(
            "Missing format specification".to_string(),
        ));
    }
    if !is_input_format(from) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported source format: {from}"
        )));
    }
    if !is_output_format(to) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported target format: {to}"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    #[serde(default)]
    id: String,
}

impl JobQuery {
    fn job_id(&self) -> Result<&str, ApiError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ApiError::BadRequest("Missing job ID".to_string()));
        }
        Ok(id)
    }
}

pub async fn job_status(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Response, ApiError> {
    let job_id = query.job_id()?;
    let entry = state
        .service
        .store()
        .get(job_id)
        .await
        .ok_or(ApiError::NotFound)?;
    Ok(([(CACHE_CONTROL, "no-store")], Json(entry)).into_response())
}

pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Response, ApiError> {
    let job_id = query.job_id()?.to_string();
    let entry = state
        .service
        .store()
        .get(&job_id)
        .await
        .ok_or(ApiError::NotFound)?;

    if !entry.status.is_terminal() {
        return Err(ApiError::NotComplete { job_id });
    }
    if entry.status == JobStatus::Failed {
        return Err(ApiError::JobFailed {
            job_id,
            message: entry.error.unwrap_or_default(),
        });
    }

    let Some(path) = entry.output_path else {
        return Err(ApiError::OutputMissing { job_id });
    };

    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::OutputMissing { job_id });
        }
        Err(err) => {
            warn!(job_id = %job_id, "Failed to read output {}: {err}", path.display());
            return Err(ApiError::Internal("Failed to read file".to_string()));
        }
    };

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| job_id.clone());
    info!(job_id = %job_id, size_bytes = bytes.len(), "Serving converted file");

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type_for(&path))
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        )
        .header(CACHE_CONTROL, "no-store")
        .body(Body::from(bytes))
        .map_err(|err| ApiError::Internal(format!("Failed to build download response: {err}")))
}
