//! HTTP response bodies and the API error type.

use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use jobstream_core::JobId;
use serde::Serialize;

use crate::protocol::{ErrorBody, ErrorCode};
use crate::service::{Acknowledgement, ServiceError};

/// Body returned by `/api/v1/train` once the job has succeeded.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub status: &'static str,
    pub job_id: JobId,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl From<Acknowledgement> for AckResponse {
    fn from(ack: Acknowledgement) -> Self {
        Self {
            status: "ok",
            job_id: ack.job_id,
            elapsed_ms: ack.elapsed_ms,
            completed_at: ack.completed_at,
        }
    }
}

/// Error wrapper, same envelope as WebSocket error frames.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// API errors with their HTTP status codes.
#[derive(Debug)]
pub enum ApiError {
    // Client errors (4xx)
    /// Request body is not JSON.
    InvalidJson { message: String },
    /// Payload failed validation.
    InvalidRequest { message: String },

    // Server errors (5xx)
    /// The job started and failed.
    WorkerFailure { message: String },
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidRequest(e) => ApiError::InvalidRequest {
                message: e.to_string(),
            },
            ServiceError::WorkerFailure { failure, .. } => ApiError::WorkerFailure {
                message: failure.message,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match self {
            ApiError::InvalidJson { message } => (
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidRequest,
                format!("Invalid JSON body: {}", message),
            ),
            ApiError::InvalidRequest { message } => {
                (StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, message)
            }
            ApiError::WorkerFailure { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::WorkerFailure,
                message,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobstream_core::{CoreError, JobFailure};

    #[test]
    fn test_service_error_mapping() {
        let err = ApiError::from(ServiceError::InvalidRequest(CoreError::MissingField(
            "param".into(),
        )));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(ServiceError::WorkerFailure {
            job_id: JobId::generate(),
            failure: JobFailure::new("boom", ""),
        });
        assert!(matches!(err, ApiError::WorkerFailure { ref message } if message == "boom"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
