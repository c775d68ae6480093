use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Storage failure. Recoverable: the affected cache entry stays unfetched or dirty.
///
/// Cloneable so every caller collapsed onto one fetch receives the same error.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("storage I/O failed: {0}")]
    Io(#[source] Arc<io::Error>),
    #[error("malformed cell record: {0}")]
    Serde(#[source] Arc<serde_json::Error>),
    #[error("storage backend failed: {0}")]
    Backend(String),
}

impl From<io::Error> for PersistenceError {
    fn from(e: io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(Arc::new(e))
    }
}
