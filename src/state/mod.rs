pub mod store;
pub mod sled_store;
pub mod factory;

pub use store::*;
pub use sled_store::SledStore;
pub use factory::{create_store, create_in_memory_store};

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Field used to address individual case documents
pub const CASE_DATE_FIELD: &str = "data_do_caso";

/// Trait for case document storage.
///
/// Documents are schemaless JSON objects; listing returns them in insertion
/// order.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Append one document
    async fn insert_case(&self, document: &Value) -> Result<()>;

    /// Append many documents, returning how many were written
    async fn insert_many(&self, documents: &[Value]) -> Result<usize>;

    /// All documents in insertion order
    async fn list_cases(&self) -> Result<Vec<Value>>;

    /// First document whose `data_do_caso` equals `date`
    async fn find_by_date(&self, date: &str) -> Result<Option<Value>>;

    /// Delete the first document whose `data_do_caso` equals `date`
    async fn delete_by_date(&self, date: &str) -> Result<bool>;

    /// Number of stored documents
    async fn count_cases(&self) -> Result<u64>;
}

/// Whether a document's `data_do_caso` is exactly `date`
pub fn matches_date(document: &Value, date: &str) -> bool {
    document
        .get(CASE_DATE_FIELD)
        .and_then(Value::as_str)
        .map(|d| d == date)
        .unwrap_or(false)
}
