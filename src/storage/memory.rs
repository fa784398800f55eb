use std::sync::Mutex;

use async_trait::async_trait;

use crate::print::StoredPrint;
use crate::storage::{PrintStore, StorageError, StorageResult};

/// Keeps stored prints in memory, in persistence order
#[derive(Debug, Default)]
pub struct MemoryStore {
    prints: Mutex<Vec<StoredPrint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything persisted so far
    pub fn prints(&self) -> Vec<StoredPrint> {
        self.prints
            .lock()
            .map(|prints| prints.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.prints.lock().map(|prints| prints.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PrintStore for MemoryStore {
    async fn persist_film_box(&self, print: &StoredPrint) -> StorageResult<()> {
        self.prints
            .lock()
            .map_err(|_| StorageError::Config("memory store poisoned".into()))?
            .push(print.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_persistence_order() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        let first = StoredPrint::sample("MOD1");
        let second = StoredPrint::sample("MOD2");
        tokio_test::block_on(store.persist_film_box(&first)).unwrap();
        tokio_test::block_on(store.persist_film_box(&second)).unwrap();

        let titles: Vec<String> = store
            .prints()
            .into_iter()
            .map(|print| print.calling_ae_title)
            .collect();
        assert_eq!(titles, vec!["MOD1", "MOD2"]);
        assert_eq!(store.len(), 2);
    }
}
