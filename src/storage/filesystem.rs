use crate::print::StoredPrint;
use crate::storage::{PrintStore, StorageError, StorageResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Filesystem-based print store
///
/// Writes every stored print as a JSON document below the root path,
/// grouped by calling AE title.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root_path: PathBuf,
}

impl FilesystemStorage {
    /// Create a new filesystem store with the given root path
    pub fn new<P: AsRef<Path>>(root_path: P) -> StorageResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        if !root_path.exists() {
            std::fs::create_dir_all(&root_path).map_err(|e| {
                StorageError::Config(format!(
                    "Failed to create storage root directory '{}': {}",
                    root_path.display(),
                    e
                ))
            })?;
        }

        // keep the path as given, no canonicalization
        Ok(Self { root_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.root_path
    }

    /// Location of a stored print
    pub fn path_for(&self, print: &StoredPrint) -> PathBuf {
        let caller: String = print
            .calling_ae_title
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let caller = if caller.is_empty() { "UNKNOWN".to_string() } else { caller };
        self.root_path
            .join(caller)
            .join(format!("{}.json", print.sop_instance_uid))
    }
}

#[async_trait]
impl PrintStore for FilesystemStorage {
    async fn persist_film_box(&self, print: &StoredPrint) -> StorageResult<()> {
        let full_path = self.path_for(print);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(print)?;
        tokio::fs::write(&full_path, json).await?;
        info!(
            "Stored print {} ({} images) written to {}",
            print.sop_instance_uid,
            print.hardcopy_images.len(),
            full_path.display()
        );
        Ok(())
    }
}
