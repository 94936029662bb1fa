use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};

use super::filter;
use super::pipeline;
use super::types::{DocumentStore, FindOptions, StoreError};
use super::value::{canonical_key, compare_values, lookup, Document};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One procurement collection held in memory.
///
/// Loaded once at startup and never mutated afterwards, so concurrent queries
/// only ever take shared references.
pub struct MemoryStore {
    name: String,
    documents: Vec<Document>,
}

impl MemoryStore {
    pub fn new(name: &str, documents: Vec<Document>) -> Self {
        let documents = documents.into_iter().map(normalize_document).collect();
        Self {
            name: name.to_string(),
            documents,
        }
    }

    /// Loads a JSON array or newline-delimited JSON export.
    pub fn open(path: &Path, name: &str) -> Result<Self, StoreError> {
        let raw = fs::read_to_string(path)?;
        let documents = parse_documents(&raw)?;
        tracing::info!(
            collection = name,
            path = %path.display(),
            documents = documents.len(),
            "loaded procurement collection"
        );
        Ok(Self::new(name, documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn filtered(&self, filter: &Value) -> Result<Vec<&Document>, StoreError> {
        filter::validate(filter)?;
        let mut out = Vec::new();
        for doc in &self.documents {
            if filter::matches(doc, filter)? {
                out.push(doc);
            }
        }
        Ok(out)
    }
}

impl DocumentStore for MemoryStore {
    fn collection_name(&self) -> &str {
        &self.name
    }

    fn find(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self.filtered(filter)?.into_iter().cloned().collect();
        if let Some((field, order)) = &options.sort {
            pipeline::sort_documents(&mut docs, &[(field.clone(), *order)]);
        }
        if let Some(limit) = options.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    fn count(&self, filter: &Value) -> Result<u64, StoreError> {
        Ok(self.filtered(filter)?.len() as u64)
    }

    fn distinct(&self, field: &str) -> Result<Vec<Value>, StoreError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut values: Vec<Value> = Vec::new();
        let mut push = |value: &Value| {
            if seen.insert(canonical_key(value)) {
                values.push(value.clone());
            }
        };
        for doc in &self.documents {
            match lookup(doc, field) {
                Some(Value::Array(items)) => items.iter().for_each(&mut push),
                Some(value) => push(value),
                None => {}
            }
        }
        values.sort_by(compare_values);
        Ok(values)
    }

    /// A leading `$match` runs over borrowed documents so only the
    /// survivors are copied into the pipeline.
    fn aggregate(&self, stages: &[Value]) -> Result<Vec<Document>, StoreError> {
        let leading_match = stages.first().and_then(|stage| match stage.as_object() {
            Some(map) if map.len() == 1 => map.get("$match"),
            _ => None,
        });
        match leading_match {
            Some(filter) => {
                let seed = self.filtered(filter)?.into_iter().cloned().collect();
                pipeline::run(seed, &stages[1..])
            }
            None => pipeline::run(self.documents.clone(), stages),
        }
    }

    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn parse_documents(raw: &str) -> Result<Vec<Document>, StoreError> {
    let trimmed = raw.trim_start();
    let values: Vec<Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?
    };
    values
        .into_iter()
        .map(|value| match value {
            Value::Object(doc) => Ok(doc),
            other => Err(StoreError::InvalidData(format!(
                "expected a JSON object per record, got {}",
                other
            ))),
        })
        .collect()
}

fn normalize_document(mut doc: Document) -> Document {
    if !doc.contains_key("_id") {
        let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
        doc.insert("_id".to_string(), Value::String(format!("{:024x}", id)));
    }
    doc.into_iter()
        .map(|(key, value)| (key, normalize_value(value)))
        .collect()
}

// Extended JSON dates become ISO strings; $oid wrappers are left for the tool layer.
fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) if map.len() == 1 && map.contains_key("$date") => {
            match map.get("$date") {
                Some(Value::String(s)) => Value::String(s.clone()),
                Some(Value::Number(n)) => millis_to_iso(n.as_i64()),
                Some(Value::Object(inner)) => millis_to_iso(
                    inner
                        .get("$numberLong")
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse().ok()),
                ),
                _ => Value::Null,
            }
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_value(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

fn millis_to_iso(millis: Option<i64>) -> Value {
    millis
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
        .unwrap_or(Value::Null)
}
