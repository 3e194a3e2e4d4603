use alayasiki_core::error::{AlayasikiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlmError {
    #[error("failed to start generator worker: {0}")]
    WorkerStartup(String),

    #[error("generator worker protocol violation: {0}")]
    WorkerProtocol(String),

    #[error("generator worker returned an error: {0}")]
    WorkerError(String),

    #[error("generator worker timed out after {0}s")]
    Timeout(u64),
}

impl AlayasikiError for SlmError {
    fn error_code(&self) -> ErrorCode {
        match self {
            SlmError::WorkerStartup(_) => ErrorCode::Internal,
            SlmError::WorkerProtocol(_) => ErrorCode::Internal,
            SlmError::WorkerError(_) => ErrorCode::Internal,
            SlmError::Timeout(_) => ErrorCode::ResourceExhausted,
        }
    }
}
