use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemStorage;
pub use memory::MemoryStore;

use crate::print::StoredPrint;

/// Error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable sink for finalized print jobs
///
/// Shared by every association; implementations synchronise concurrent
/// writers themselves.
#[async_trait]
pub trait PrintStore: Send + Sync + std::fmt::Debug {
    /// Persist one film box with its images and Presentation LUTs
    async fn persist_film_box(&self, print: &StoredPrint) -> StorageResult<()>;
}

/// Configuration for the storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub options: std::collections::HashMap<String, serde_json::Value>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let mut options = std::collections::HashMap::new();
        options.insert(
            "path".to_string(),
            serde_json::Value::String("./stored_prints".to_string()),
        );

        Self {
            backend: default_backend(),
            options,
        }
    }
}

fn default_backend() -> String {
    "filesystem".to_string()
}

/// Create a print store from configuration
pub fn create_print_store(config: &StorageConfig) -> StorageResult<Arc<dyn PrintStore>> {
    match config.backend.as_str() {
        "filesystem" => {
            let path = config
                .options
                .get("path")
                .and_then(|v| v.as_str())
                .unwrap_or("./stored_prints");

            let storage = FilesystemStorage::new(path)?;
            Ok(Arc::new(storage))
        }
        "memory" => Ok(Arc::new(MemoryStore::new())),
        _ => Err(StorageError::Config(format!(
            "Unknown storage backend: {}",
            config.backend
        ))),
    }
}

/// Serialize byte buffers as base64 strings
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
