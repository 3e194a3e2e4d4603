use alayasiki_core::error::{AlayasikiError, ErrorCode};
use storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("no chunks matched the query")]
    NotFound,

    #[error("all retrieved chunks were empty or too short to use")]
    EmptyChunk,

    #[error("generator worker failed: {0}")]
    WorkerError(String),

    #[error("persistence error: {0}")]
    PersistenceError(#[from] StorageError),
}

impl AlayasikiError for RagError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RagError::NotFound => ErrorCode::NotFound,
            RagError::EmptyChunk => ErrorCode::InvalidArgument,
            RagError::WorkerError(_) => ErrorCode::Internal,
            RagError::PersistenceError(_) => ErrorCode::Internal,
        }
    }
}
