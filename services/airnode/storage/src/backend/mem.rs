//! In-memory storage backend for development and testing

use crate::{validate_name, ScalarStore, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// In-memory scalar store; contents vanish with the process
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<DashMap<String, i64>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has been saved
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl ScalarStore for MemoryStore {
    async fn load(&self, name: &str) -> Result<Option<i64>, StorageError> {
        validate_name(name)?;
        let value = self.values.get(name).map(|v| *v);
        debug!("Scalar load name={} value={:?}", name, value);
        Ok(value)
    }

    async fn save(&self, name: &str, value: i64) -> Result<(), StorageError> {
        validate_name(name)?;
        debug!("Scalar save name={} value={}", name, value);
        self.values.insert(name.to_string(), value);
        Ok(())
    }
}
