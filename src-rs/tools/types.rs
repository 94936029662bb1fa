use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("invalid tool")]
    InvalidName,

    #[error("schema name mismatch")]
    NameMismatch,

    #[error("tool already registered: {0}")]
    Duplicate(String),

    #[error("lock error")]
    Lock,
}

/// Result of one tool invocation as fed back to the reasoning loop.
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    Ok(Map<String, Value>),
    Err(String),
}

impl Observation {
    pub fn is_success(&self) -> bool {
        matches!(self, Observation::Ok(_))
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match self {
            Observation::Ok(payload) => Some(payload),
            Observation::Err(_) => None,
        }
    }

    /// `{"success": true, ...payload}` or `{"success": false, "error": ...}`.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        match self {
            Observation::Ok(payload) => {
                out.insert("success".to_string(), Value::Bool(true));
                for (key, value) in payload {
                    out.insert(key.clone(), value.clone());
                }
            }
            Observation::Err(message) => {
                out.insert("success".to_string(), Value::Bool(false));
                out.insert("error".to_string(), Value::String(message.clone()));
            }
        }
        Value::Object(out)
    }
}

impl From<Result<Map<String, Value>, ToolError>> for Observation {
    fn from(result: Result<Map<String, Value>, ToolError>) -> Self {
        match result {
            Ok(payload) => Observation::Ok(payload),
            Err(err) => Observation::Err(err.to_string()),
        }
    }
}

pub type ToolHandler = Arc<dyn Fn(Value) -> Result<Map<String, Value>, ToolError> + Send + Sync>;

pub struct ToolEntry {
    pub name: String,
    pub handler: ToolHandler,
    pub schema: ToolSchema,
}
