use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub model: String,
    pub max_iterations: usize,
    pub temperature: f64,
    /// Keep a step log and return it with each answer.
    pub verbose: bool,
    /// Run tool calls and candidate answers through the policy checks.
    pub enforce_policy: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            max_iterations: 10,
            temperature: 0.0,
            verbose: false,
            enforce_policy: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub data_path: PathBuf,
    pub collection_name: String,
    pub google_api_keys: Vec<String>,
    pub model_name: String,
    pub api_host: String,
    pub api_port: u16,
    pub debug: bool,
    pub allowed_origins: Vec<String>,
    pub agent: AgentConfig,
}

impl Settings {
    /// Reads settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let data_path = PathBuf::from(required("DATA_PATH")?);
        let google_api_keys = collect_keys(&lookup, "GOOGLE_API_KEY");
        if google_api_keys.is_empty() {
            return Err(ConfigError::MissingEnvVar("GOOGLE_API_KEY".into()));
        }
        let model_name = get("MODEL_NAME").unwrap_or_else(|| AgentConfig::default().model);

        let api_port = match get("API_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("API_PORT".into(), raw))?,
            None => 8000,
        };
        let max_iterations = match get("AGENT_MAX_ITERATIONS") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidValue("AGENT_MAX_ITERATIONS".into(), raw)),
            },
            None => 10,
        };
        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["http://localhost:3000".to_string()]);

        Ok(Self {
            data_path,
            collection_name: get("COLLECTION_NAME").unwrap_or_else(|| "purchases".to_string()),
            google_api_keys,
            model_name: model_name.clone(),
            api_host: get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port,
            debug: flag(get("DEBUG"), true),
            allowed_origins,
            agent: AgentConfig {
                model: model_name,
                max_iterations,
                temperature: 0.0,
                verbose: flag(get("AGENT_VERBOSE"), true),
                enforce_policy: flag(get("AGENT_ENFORCE_POLICY"), true),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

fn flag(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Collects `PRIMARY` (comma separated) followed by `PRIMARY_2` through `PRIMARY_10`.
pub fn collect_keys(lookup: &impl Fn(&str) -> Option<String>, primary: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(raw) = lookup(primary) {
        keys.extend(
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from),
        );
    }
    for idx in 2..=10 {
        if let Some(value) = lookup(&format!("{}_{}", primary, idx)) {
            let trimmed = value.trim();
            if !trimmed.is_empty() && !keys.iter().any(|k| k == trimmed) {
                keys.push(trimmed.to_string());
            }
        }
    }
    keys
}
