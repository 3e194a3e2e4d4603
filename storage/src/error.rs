use crate::wal::WalError;
use alayasiki_core::error::{AlayasikiError, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl AlayasikiError for StorageError {
    fn error_code(&self) -> ErrorCode {
        match self {
            StorageError::Wal(_) => ErrorCode::Internal,
            StorageError::CorruptRow(_) => ErrorCode::Internal,
        }
    }
}
