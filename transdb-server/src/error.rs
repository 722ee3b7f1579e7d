use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use transdb_common::ErrorResponse;

/// Error taxonomy for the coordinator. Transport and per-replica failures
/// never reach here directly — they are absorbed into replica counts by
/// `QuorumCollector` and only surface as `InsufficientReplicas`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordError {
    BadParameters(String),
    Overloaded,
    InsufficientReplicas,
    ShuttingDown,
    InternalFailure(String),
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

impl IntoResponse for CoordError {
    fn into_response(self) -> Response {
        match self {
            CoordError::BadParameters(msg) => error_response(StatusCode::BAD_REQUEST, msg),
            CoordError::Overloaded => error_response(StatusCode::SERVICE_UNAVAILABLE, "Server overloaded"),
            CoordError::InsufficientReplicas => {
                error_response(StatusCode::GATEWAY_TIMEOUT, "Could not reach enough replicas")
            }
            CoordError::ShuttingDown => error_response(StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down"),
            CoordError::InternalFailure(cause) => {
                eprintln!("internal failure: {}", cause);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
