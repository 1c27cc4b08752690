//! Named scalar persistence for airnode.
//!
//! The gas sensor's calibration baseline must survive power loss. This crate
//! stores small named integers behind the [`ScalarStore`] trait, with a
//! file-backed implementation for the device and an in-memory one for tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Stored name of the equivalent-CO2 baseline
pub const CO2EQ_BASELINE: &str = "co2eq_baseline";

/// Stored name of the TVOC baseline
pub const TVOC_BASELINE: &str = "tvoc_baseline";

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),
    /// Invalid operation
    #[error("Invalid operation: {0}")]
    Invalid(String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistent store of named integer values
#[async_trait]
pub trait ScalarStore: Send + Sync {
    /// Load a value; `Ok(None)` when it was never saved
    async fn load(&self, name: &str) -> Result<Option<i64>, StorageError>;

    /// Save a value, replacing any previous one
    async fn save(&self, name: &str, value: i64) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: ScalarStore + ?Sized> ScalarStore for Arc<S> {
    async fn load(&self, name: &str) -> Result<Option<i64>, StorageError> {
        (**self).load(name).await
    }

    async fn save(&self, name: &str, value: i64) -> Result<(), StorageError> {
        (**self).save(name, value).await
    }
}

/// Storage backend configuration
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StorageMode {
    /// In-memory storage (dev/tests only)
    #[default]
    InMemory,
    /// One JSON record per name under a data directory
    File {
        /// Data directory path
        data_dir: PathBuf,
    },
}

// Re-export backend implementations
pub use backend::file::FileStore;
pub use backend::mem::MemoryStore;

/// Create a store from configuration
pub async fn open_store(mode: StorageMode) -> Result<Box<dyn ScalarStore>, StorageError> {
    match mode {
        StorageMode::InMemory => Ok(Box::new(MemoryStore::new())),
        StorageMode::File { data_dir } => Ok(Box::new(FileStore::open(data_dir).await?)),
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::Invalid(format!("bad scalar name {:?}", name)))
    }
}
