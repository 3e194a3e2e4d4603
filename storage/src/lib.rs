pub mod cache_store;
pub mod conversation_store;
pub mod error;
pub mod history_store;
pub mod index;
pub mod wal;

pub use cache_store::CacheStore;
pub use conversation_store::ConversationStore;
pub use error::StorageError;
pub use history_store::{HistoryRecord, HistoryStore};
pub use index::{AnnIndex, LinearAnnIndex};
pub use wal::{Wal, WalError};
