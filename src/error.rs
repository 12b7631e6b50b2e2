//! Setup-time and option-parsing error taxonomy.
//!
//! Per-request failures on the hot path (socket errors, timeouts, bad
//! status codes) are represented as [`crate::client::FetchOutcome`]
//! values, not as `Result<_, AppError>`, to keep the hot path allocation-free.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid URL '{0}': {1}")]
    InvalidUrl(String, String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("initial request failed and --allow-initial-errors was not set: {0}")]
    InitError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// 0 on success, 1 on any user-facing error.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
