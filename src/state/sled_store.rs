use crate::error::{AppError, Result};
use crate::state::{matches_date, CaseStore};
use async_trait::async_trait;
use serde_json::Value;
use sled::Db;
use std::path::Path;
use std::sync::Arc;

/// Persistent case store using Sled embedded database.
///
/// Each collection is its own tree. Keys are big-endian ids from
/// `Db::generate_id`, so key order is insertion order.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    cases_tree: sled::Tree,
}

impl SledStore {
    /// Open (or create) a Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P, collection: &str) -> Result<Self> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref).map_err(|e| {
            AppError::Database(format!("Failed to open Sled database: {}", e))
        })?;

        let cases_tree = db.open_tree(collection).map_err(|e| {
            AppError::Database(format!("Failed to open '{}' tree: {}", collection, e))
        })?;

        tracing::info!(collection = %collection, "Initialized Sled store at {:?}", path_ref);

        Ok(Self {
            db: Arc::new(db),
            cases_tree,
        })
    }

    fn serialize_case(document: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(document).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize case: {}", e))
        })
    }

    fn deserialize_case(bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize case: {}", e))
        })
    }

    fn next_key(&self) -> Result<[u8; 8]> {
        let id = self.db.generate_id().map_err(|e| {
            AppError::Database(format!("Failed to generate case id: {}", e))
        })?;
        Ok(id.to_be_bytes())
    }

    /// First entry whose date matches, with its key
    fn find_entry(&self, date: &str) -> Result<Option<(sled::IVec, Value)>> {
        for entry in self.cases_tree.iter() {
            let (key, bytes) = entry.map_err(|e| {
                AppError::Database(format!("Failed to read case: {}", e))
            })?;
            let document = Self::deserialize_case(&bytes)?;
            if matches_date(&document, date) {
                return Ok(Some((key, document)));
            }
        }
        Ok(None)
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Database(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl CaseStore for SledStore {
    async fn insert_case(&self, document: &Value) -> Result<()> {
        let key = self.next_key()?;
        let value = Self::serialize_case(document)?;

        self.cases_tree.insert(key, value).map_err(|e| {
            AppError::Database(format!("Failed to save case: {}", e))
        })?;

        self.cases_tree.flush().map_err(|e| {
            AppError::Database(format!("Failed to flush cases tree: {}", e))
        })?;

        tracing::debug!(case_id = u64::from_be_bytes(key), "Case saved to Sled");
        Ok(())
    }

    async fn insert_many(&self, documents: &[Value]) -> Result<usize> {
        let mut batch = sled::Batch::default();
        for document in documents {
            batch.insert(self.next_key()?.to_vec(), Self::serialize_case(document)?);
        }

        self.cases_tree.apply_batch(batch).map_err(|e| {
            AppError::Database(format!("Failed to save cases: {}", e))
        })?;

        self.cases_tree.flush().map_err(|e| {
            AppError::Database(format!("Failed to flush cases tree: {}", e))
        })?;

        tracing::debug!(count = documents.len(), "Cases saved to Sled");
        Ok(documents.len())
    }

    async fn list_cases(&self) -> Result<Vec<Value>> {
        self.cases_tree
            .iter()
            .values()
            .map(|bytes| {
                let bytes = bytes.map_err(|e| {
                    AppError::Database(format!("Failed to read case: {}", e))
                })?;
                Self::deserialize_case(&bytes)
            })
            .collect()
    }

    async fn find_by_date(&self, date: &str) -> Result<Option<Value>> {
        Ok(self.find_entry(date)?.map(|(_, document)| document))
    }

    async fn delete_by_date(&self, date: &str) -> Result<bool> {
        // A concurrent delete may remove the match first; look again
        loop {
            let Some((key, _)) = self.find_entry(date)? else {
                return Ok(false);
            };

            let removed = self.cases_tree.remove(&key).map_err(|e| {
                AppError::Database(format!("Failed to delete case: {}", e))
            })?;
            if removed.is_some() {
                break;
            }
        }

        self.cases_tree.flush().map_err(|e| {
            AppError::Database(format!("Failed to flush cases tree: {}", e))
        })?;

        tracing::debug!(date = %date, "Case deleted from Sled");
        Ok(true)
    }

    async fn count_cases(&self) -> Result<u64> {
        Ok(self.cases_tree.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (SledStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStore::new(temp_dir.path(), "dashboard").unwrap();
        (store, temp_dir)
    }

    fn case(date: &str, case_type: &str) -> Value {
        json!({
            "data_do_caso": date,
            "tipo_do_caso": case_type,
            "localizacao": "Bairro A",
            "vitima": {"etnia": "Branca", "idade": 33}
        })
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (store, _temp_dir) = create_test_store();
        store.insert_case(&case("2024-03-10", "Furto")).await.unwrap();

        let found = store.find_by_date("2024-03-10").await.unwrap().unwrap();
        assert_eq!(found["tipo_do_caso"], "Furto");
        assert_eq!(found["vitima"]["idade"], 33);
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let (store, _temp_dir) = create_test_store();
        store
            .insert_many(&[case("2024-01-03", "C"), case("2024-01-01", "A")])
            .await
            .unwrap();
        store.insert_case(&case("2024-01-02", "B")).await.unwrap();

        let types: Vec<String> = store
            .list_cases()
            .await
            .unwrap()
            .iter()
            .map(|c| c["tipo_do_caso"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(types, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_delete_by_date() {
        let (store, _temp_dir) = create_test_store();
        store.insert_case(&case("2024-03-10", "Furto")).await.unwrap();

        assert!(store.delete_by_date("2024-03-10").await.unwrap());
        assert!(!store.delete_by_date("2024-03-10").await.unwrap());
        assert_eq!(store.count_cases().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = SledStore::new(temp_dir.path(), "dashboard").unwrap();
            store.insert_case(&case("2024-07-07", "Tráfico")).await.unwrap();
            store.flush().await.unwrap();
        }

        let store = SledStore::new(temp_dir.path(), "dashboard").unwrap();
        let found = store.find_by_date("2024-07-07").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStore::new(temp_dir.path(), "dashboard").unwrap();
        store.insert_case(&case("2024-07-07", "Tráfico")).await.unwrap();

        let other = SledStore {
            db: store.db.clone(),
            cases_tree: store.db.open_tree("archive").unwrap(),
        };
        assert_eq!(other.count_cases().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deletes_remove_one_record_each() {
        let (store, _temp_dir) = create_test_store();
        store
            .insert_many(&[case("2024-09-09", "Furto"), case("2024-09-09", "Assalto")])
            .await
            .unwrap();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.delete_by_date("2024-09-09").await.unwrap() })
            })
            .collect();

        let mut deleted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                deleted += 1;
            }
        }

        assert_eq!(deleted, 2);
        assert_eq!(store.count_cases().await.unwrap(), 0);
    }
}
