use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;

use super::types::{Observation, RegistryError, ToolEntry, ToolHandler, ToolSchema};

pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, ToolEntry>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(
        &self,
        name: &str,
        handler: ToolHandler,
        mut schema: ToolSchema,
    ) -> Result<(), RegistryError> {
        if name.is_empty() || schema.description.trim().is_empty() {
            return Err(RegistryError::InvalidName);
        }
        if schema.name.is_empty() {
            schema.name = name.to_string();
        }
        if schema.name != name {
            return Err(RegistryError::NameMismatch);
        }

        let mut map = self.tools.write().map_err(|_| RegistryError::Lock)?;
        if map.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        map.insert(
            name.to_string(),
            ToolEntry {
                name: name.to_string(),
                handler,
                schema,
            },
        );
        Ok(())
    }

    /// Never fails past this point: unknown tools and handler errors come back
    /// as `Observation::Err`.
    pub fn execute(&self, name: &str, args: Value) -> Observation {
        let map = match self.tools.read() {
            Ok(lock) => lock,
            Err(_) => return Observation::Err("lock error".to_string()),
        };

        let entry = match map.get(name) {
            Some(entry) => entry,
            None => return Observation::Err(format!("tool not found: {}", name)),
        };

        let observation = Observation::from((entry.handler)(args));
        if let Observation::Err(err) = &observation {
            tracing::warn!(tool = %entry.name, error = %err, "tool execution failed");
        }
        observation
    }

    pub fn get_schemas(&self) -> Vec<ToolSchema> {
        let map = match self.tools.read() {
            Ok(lock) => lock,
            Err(_) => return vec![],
        };
        map.values().map(|entry| entry.schema.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        match self.tools.read() {
            Ok(map) => map.keys().cloned().collect(),
            Err(_) => vec![],
        }
    }

    pub fn has(&self, name: &str) -> bool {
        let map = match self.tools.read() {
            Ok(lock) => lock,
            Err(_) => return false,
        };
        map.contains_key(name)
    }

    pub fn count(&self) -> usize {
        let map = match self.tools.read() {
            Ok(lock) => lock,
            Err(_) => return 0,
        };
        map.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map};

    use super::*;
    use crate::tools::ToolError;

    fn schema(name: &str) -> ToolSchema {
        ToolSchema {
            name: name.to_string(),
            description: "echo the arguments back".to_string(),
            parameters: None,
        }
    }

    fn echo() -> ToolHandler {
        Arc::new(|args: Value| {
            let mut out = Map::new();
            out.insert("args".to_string(), args);
            Ok(out)
        })
    }

    fn reject(_: Value) -> Result<Map<String, Value>, ToolError> {
        Err(ToolError::InvalidArgs("query must be an object".into()))
    }

    #[test]
    fn register_rejects_duplicates_and_mismatches() {
        let registry = ToolRegistry::new();
        registry.register("echo", echo(), schema("echo")).unwrap();
        assert_eq!(
            registry.register("echo", echo(), schema("echo")),
            Err(RegistryError::Duplicate("echo".to_string()))
        );
        assert_eq!(
            registry.register("other", echo(), schema("echo")),
            Err(RegistryError::NameMismatch)
        );
        assert_eq!(registry.register("", echo(), schema("")), Err(RegistryError::InvalidName));
        assert!(registry.has("echo"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn execute_wraps_results_and_failures() {
        let registry = ToolRegistry::new();
        registry.register("echo", echo(), schema("echo")).unwrap();
        registry
            .register("fail", Arc::new(reject), schema("fail"))
            .unwrap();

        let ok = registry.execute("echo", json!({"x": 1}));
        assert_eq!(ok.to_json(), json!({"success": true, "args": {"x": 1}}));

        let err = registry.execute("fail", json!({}));
        assert_eq!(
            err.to_json(),
            json!({"success": false, "error": "invalid arguments: query must be an object"})
        );

        let missing = registry.execute("nope", json!({}));
        assert!(!missing.is_success());
    }

    #[test]
    fn schemas_are_listed_in_name_order() {
        let registry = ToolRegistry::new();
        registry.register("zeta", echo(), schema("zeta")).unwrap();
        registry.register("alpha", echo(), schema("")).unwrap();
        let names: Vec<String> = registry.get_schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
