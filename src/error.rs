use axum::{
    http::{header::CACHE_CONTROL, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::service::SubmitError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("{message}")]
    ConversionFailed { job_id: String, message: String },

    #[error("Conversion timeout")]
    Timeout { job_id: String },

    #[error("Job not found")]
    NotFound,

    #[error("Job not complete")]
    NotComplete { job_id: String },

    #[error("Job failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Output file not available")]
    OutputMissing { job_id: String },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Submit(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConversionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::NotComplete { .. } | Self::JobFailed { .. } => StatusCode::CONFLICT,
            Self::OutputMissing { .. } => StatusCode::GONE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::ConversionFailed { job_id, .. }
            | Self::Timeout { job_id }
            | Self::NotComplete { job_id }
            | Self::JobFailed { job_id, .. }
            | Self::OutputMissing { job_id } => Some(job_id),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.to_string() });
        if let (Some(job_id), Value::Object(map)) = (self.job_id(), &mut body) {
            map.insert("job_id".to_string(), Value::String(job_id.to_string()));
        }
        (
            self.status_code(),
            [(CACHE_CONTROL, "no-store")],
            Json(body),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::ApiError;
    use crate::service::SubmitError;

    #[test]
    fn failures_and_timeouts_are_distinct() {
        let failed = ApiError::ConversionFailed {
            job_id: "j".to_string(),
            message: "boom".to_string(),
        };
        let timeout = ApiError::Timeout {
            job_id: "j".to_string(),
        };
        assert_ne!(failed.status_code(), timeout.status_code());
        assert_eq!(timeout.to_string(), "Conversion timeout");
        assert_eq!(failed.job_id(), Some("j"));
    }

    #[test]
    fn queue_full_maps_to_service_unavailable() {
        let err: ApiError = SubmitError::QueueFull.into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "Queue full, try again later");
        assert!(err.job_id().is_none());
        assert_eq!(
            err.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
