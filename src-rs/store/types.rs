use serde_json::Value;
use thiserror::Error;

use super::value::Document;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("unsupported operator: {0}")]
    Unsupported(String),

    #[error("invalid record: {0}")]
    InvalidData(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    pub sort: Option<(String, i64)>,
    pub limit: Option<usize>,
}

/// Read-only view of one collection of procurement records.
///
/// Filters and pipelines use the MongoDB query shape. Implementations must be
/// shareable across concurrent queries.
pub trait DocumentStore: Send + Sync {
    fn collection_name(&self) -> &str;

    fn find(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Document>, StoreError>;

    fn find_one(&self, filter: &Value) -> Result<Option<Document>, StoreError> {
        let options = FindOptions {
            sort: None,
            limit: Some(1),
        };
        Ok(self.find(filter, &options)?.into_iter().next())
    }

    fn count(&self, filter: &Value) -> Result<u64, StoreError>;

    fn distinct(&self, field: &str) -> Result<Vec<Value>, StoreError>;

    fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Document>, StoreError>;

    fn ping(&self) -> Result<(), StoreError>;
}
