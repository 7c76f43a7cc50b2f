use crate::error::Result;
use crate::state::{matches_date, CaseStore};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory case store (for development and testing)
#[derive(Clone)]
pub struct InMemoryStore {
    cases: Arc<DashMap<u64, Value>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            cases: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Entries sorted by insertion sequence
    fn ordered(&self) -> Vec<(u64, Value)> {
        let mut entries: Vec<(u64, Value)> = self
            .cases
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaseStore for InMemoryStore {
    async fn insert_case(&self, document: &Value) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.cases.insert(id, document.clone());
        tracing::debug!(case_id = id, "Case saved");
        Ok(())
    }

    async fn insert_many(&self, documents: &[Value]) -> Result<usize> {
        for document in documents {
            self.insert_case(document).await?;
        }
        Ok(documents.len())
    }

    async fn list_cases(&self) -> Result<Vec<Value>> {
        Ok(self.ordered().into_iter().map(|(_, doc)| doc).collect())
    }

    async fn find_by_date(&self, date: &str) -> Result<Option<Value>> {
        Ok(self
            .ordered()
            .into_iter()
            .map(|(_, doc)| doc)
            .find(|doc| matches_date(doc, date)))
    }

    async fn delete_by_date(&self, date: &str) -> Result<bool> {
        // A concurrent delete may remove the match first; look again
        loop {
            let target = self
                .ordered()
                .into_iter()
                .find(|(_, doc)| matches_date(doc, date))
                .map(|(id, _)| id);

            let Some(id) = target else {
                return Ok(false);
            };
            if self.cases.remove(&id).is_some() {
                tracing::debug!(case_id = id, date = %date, "Case deleted");
                return Ok(true);
            }
        }
    }

    async fn count_cases(&self) -> Result<u64> {
        Ok(self.cases.len() as u64)
    }
}
