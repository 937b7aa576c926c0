//! Plain-data error taxonomy and HTTP mapping.
//!
//! Grounded in `auth::middleware::AuthError`'s pattern — a small `enum`
//! with a direct `impl IntoResponse`, rather than `thiserror`'s derive
//! machinery, since every variant here already carries exactly the data
//! an API client needs and a hand-written `Display` costs nothing extra.

use crate::chain::ChainError;
use crate::events::SchemaError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum IngestError {
    SchemaInvalid(SchemaError),
    ChainBroken { seq_no: u64, reason: ChainError },
    ConflictingEvent { seq_no: u64 },
    InstanceLocked,
    Storage(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::SchemaInvalid(e) => write!(f, "schema invalid: {e}"),
            IngestError::ChainBroken { seq_no, reason } => {
                write!(f, "chain broken at seqNo={seq_no}: {reason}")
            }
            IngestError::ConflictingEvent { seq_no } => {
                write!(f, "conflicting event already recorded at seqNo={seq_no}")
            }
            IngestError::InstanceLocked => write!(f, "instance is busy processing another event"),
            IngestError::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for IngestError {}

#[derive(Debug, Clone)]
pub enum ApiError {
    Ingest(IngestError),
    InstanceNotFound { instance_id: String },
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Ingest(e) => write!(f, "{e}"),
            ApiError::InstanceNotFound { instance_id } => {
                write!(f, "unknown instance: {instance_id}")
            }
            ApiError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError::Ingest(e)
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Ingest(IngestError::SchemaInvalid(_)) => (StatusCode::UNPROCESSABLE_ENTITY, "SCHEMA_INVALID"),
            ApiError::Ingest(IngestError::ChainBroken { .. }) => (StatusCode::CONFLICT, "CHAIN_BROKEN"),
            ApiError::Ingest(IngestError::ConflictingEvent { .. }) => (StatusCode::CONFLICT, "CONFLICTING_EVENT"),
            ApiError::Ingest(IngestError::InstanceLocked) => (StatusCode::SERVICE_UNAVAILABLE, "INSTANCE_LOCKED"),
            ApiError::Ingest(IngestError::Storage(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::InstanceNotFound { .. } => (StatusCode::NOT_FOUND, "INSTANCE_NOT_FOUND"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let body = ErrorBody { error: code.to_string(), message: self.to_string() };
        (status, Json(json!(body))).into_response()
    }
}
