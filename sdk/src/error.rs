use alayasiki_core::error::{AlayasikiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to prepare data directory: {0}")]
    DataDir(String),
}

impl AlayasikiError for SdkError {
    fn error_code(&self) -> ErrorCode {
        match self {
            SdkError::Storage(e) => e.error_code(),
            SdkError::Config(_) => ErrorCode::InvalidArgument,
            SdkError::DataDir(_) => ErrorCode::Internal,
        }
    }
}
