//! File-based storage backend: one checksummed JSON record per name

use crate::{validate_name, ScalarStore, StorageError};
use async_trait::async_trait;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// On-disk record content
#[derive(Serialize, Deserialize, Debug)]
struct ScalarRecord {
    name: String,
    value: i64,
    crc32: u32,
}

impl ScalarRecord {
    fn new(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value,
            crc32: Self::compute_crc(name, value),
        }
    }

    fn compute_crc(name: &str, value: i64) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&value.to_le_bytes());
        hasher.finalize()
    }
}

/// Scalar store writing `<name>.json` files under a data directory.
///
/// Writes go to a temp file that is synced before it is renamed over the
/// record, and the directory is synced after the rename. A power cut leaves
/// either the old record or the new one, at worst with a stray temp file.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `data_dir`
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        info!("Opened scalar store at {}", data_dir.display());
        Ok(Self { data_dir })
    }

    /// Root directory of the store
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", name))
    }

    /// Persist the rename itself
    async fn sync_dir(&self) {
        let synced = match tokio::fs::File::open(&self.data_dir).await {
            Ok(dir) => dir.sync_all().await,
            Err(e) => Err(e),
        };
        if let Err(e) = synced {
            warn!("Failed to sync {}: {}", self.data_dir.display(), e);
        }
    }
}

#[async_trait]
impl ScalarStore for FileStore {
    async fn load(&self, name: &str) -> Result<Option<i64>, StorageError> {
        validate_name(name)?;
        let path = self.record_path(name);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored value for {}", name);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let record: ScalarRecord = serde_json::from_str(&content).map_err(|e| {
            StorageError::Corruption(format!("Invalid record file for {}: {}", name, e))
        })?;

        if record.name != name {
            return Err(StorageError::Corruption(format!(
                "Record {} holds value for {}",
                name, record.name
            )));
        }
        let expected = ScalarRecord::compute_crc(&record.name, record.value);
        if record.crc32 != expected {
            warn!(
                "CRC mismatch for {}: stored {:08x}, computed {:08x}",
                name, record.crc32, expected
            );
            return Err(StorageError::Corruption(format!(
                "CRC mismatch for {}",
                name
            )));
        }

        debug!("Loaded {}={}", name, record.value);
        Ok(Some(record.value))
    }

    async fn save(&self, name: &str, value: i64) -> Result<(), StorageError> {
        validate_name(name)?;
        let path = self.record_path(name);
        let tmp = self.data_dir.join(format!("{}.json.tmp", name));

        let content = serde_json::to_string_pretty(&ScalarRecord::new(name, value))?;
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;
        self.sync_dir().await;

        debug!("Saved {}={} to {}", name, value, path.display());
        Ok(())
    }
}
