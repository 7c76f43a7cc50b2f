use crate::config::{StoreBackend, StoreConfig};
use crate::error::{AppError, Result};
use crate::state::{CaseStore, InMemoryStore, SledStore};
use std::sync::Arc;

/// Create a case store based on configuration
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn CaseStore>> {
    match config.backend {
        StoreBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("Sled backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing Sled storage backend");

            let store = SledStore::new(path, &config.collection)?;
            Ok(Arc::new(store))
        }

        StoreBackend::Memory => Ok(create_in_memory_store()),
    }
}

/// Create an in-memory store (for testing and development)
pub fn create_in_memory_store() -> Arc<dyn CaseStore> {
    tracing::info!("Initializing in-memory storage backend");
    Arc::new(InMemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_sled_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sled,
            path: Some(temp_dir.path().to_path_buf()),
            collection: "dashboard".to_string(),
        };

        let store = create_store(&config).await.unwrap();
        assert_eq!(store.count_cases().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_memory_store() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            path: None,
            collection: "dashboard".to_string(),
        };

        let store = create_store(&config).await.unwrap();
        assert_eq!(store.count_cases().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sled_requires_path() {
        let config = StoreConfig {
            backend: StoreBackend::Sled,
            path: None,
            collection: "dashboard".to_string(),
        };

        let result = create_store(&config).await;
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
