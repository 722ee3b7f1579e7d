use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted key size, in bytes.
pub const MAX_KEY_SIZE: usize = 1024;

/// Maximum accepted value size, in bytes.
pub const MAX_VALUE_SIZE: usize = 4 * 1024 * 1024;

/// JSON body of a non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Client-side view of a failed request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransDbError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Key exceeds maximum size of {0} bytes")]
    KeyTooLarge(usize),

    #[error("Value exceeds maximum size of {0} bytes")]
    ValueTooLarge(usize),

    #[error("HTTP {0}: {1}")]
    HttpError(u16, String),
}

pub type Result<T> = std::result::Result<T, TransDbError>;
