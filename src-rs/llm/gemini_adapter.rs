use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};

use super::rotation::Rotator;
use super::types::{
    CompletionRequest, Content, LLMResponse, Message, ProviderAdapter, ProviderError, Role,
    ToolCall,
};
use crate::tools::ToolSchema;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiConfig {
    pub api_keys: Vec<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct GeminiAdapter {
    cfg: GeminiConfig,
    rotator: Rotator,
    client: Client,
}

impl GeminiAdapter {
    pub fn new(mut cfg: GeminiConfig) -> Result<Self, ProviderError> {
        if cfg.base_url.is_empty() {
            cfg.base_url = DEFAULT_BASE_URL.to_string();
        }
        if cfg.model.is_empty() {
            cfg.model = DEFAULT_MODEL.to_string();
        }
        if cfg.api_keys.is_empty() {
            return Err(ProviderError::new("auth_error", "no Gemini API keys", false));
        }
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|err| ProviderError::new("client_error", &err.to_string(), false))?;
        Ok(Self {
            rotator: Rotator::new(cfg.api_keys.clone()),
            cfg,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn complete(&self, request: CompletionRequest) -> Result<LLMResponse, ProviderError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.cfg.model.clone());
        let temperature = request.temperature.unwrap_or(self.cfg.temperature);
        let payload = build_payload(&request.messages, request.tools.as_deref(), temperature);

        let mut last_err = None;
        for _ in 0..self.rotator.len() {
            let key = match self.rotator.next() {
                Some(key) => key,
                None => break,
            };
            match send_request(&self.client, &self.cfg.base_url, &model, key, &payload) {
                Ok(resp) => return Ok(resp),
                Err(err) if err.retryable => {
                    tracing::warn!(code = %err.code, "gemini request failed, rotating key");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| ProviderError::new("api_error", "request failed", true)))
    }
}

fn build_payload(messages: &[Message], tools: Option<&[ToolSchema]>, temperature: f64) -> Value {
    let mut contents = Vec::new();
    let mut system_instruction: Option<String> = None;

    for msg in messages {
        let text = msg.content.normalize();
        if msg.role == Role::System {
            system_instruction = Some(match system_instruction {
                Some(prev) => format!("{}\n\n{}", prev, text),
                None => text,
            });
            continue;
        }
        if text.trim().is_empty() {
            continue;
        }
        let role = match msg.role {
            Role::Assistant => "model",
            _ => "user",
        };
        contents.push(json!({
            "role": role,
            "parts": [{"text": text}]
        }));
    }

    let mut payload = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": temperature
        }
    });

    if let Some(system) = system_instruction {
        payload["systemInstruction"] = json!({
            "parts": [{"text": system}]
        });
    }

    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|tool| {
                let mut decl = json!({
                    "name": tool.name,
                    "description": tool.description,
                });
                if let Some(params) = &tool.parameters {
                    decl["parameters"] = params.clone();
                }
                decl
            })
            .collect();
        payload["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    payload
}

fn send_request(
    client: &Client,
    base_url: &str,
    model: &str,
    api_key: &str,
    payload: &Value,
) -> Result<LLMResponse, ProviderError> {
    let endpoint = format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    );
    let resp = client
        .post(endpoint)
        .header("Content-Type", "application/json")
        .header("x-goog-api-key", api_key)
        .json(payload)
        .send()
        .map_err(|err| ProviderError::new("network_error", &err.to_string(), true))?;

    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    if status.is_client_error() || status.is_server_error() {
        return Err(classify_failure(status.as_u16(), &body));
    }

    let raw: Value = serde_json::from_str(&body)
        .map_err(|_| ProviderError::new("parse_error", "invalid json", false))?;
    let (content, tool_calls) = parse_response(&raw);
    Ok(LLMResponse {
        content,
        tool_calls,
        raw: Some(raw),
    })
}

fn classify_failure(status: u16, body: &str) -> ProviderError {
    let lowered = body.to_lowercase();
    match status {
        401 | 403 => ProviderError::new("auth_error", body, true),
        429 => ProviderError::new("rate_limit", body, true),
        _ if lowered.contains("quota") || lowered.contains("resource_exhausted") => {
            ProviderError::new("rate_limit", body, true)
        }
        500..=599 => ProviderError::new("server_error", body, true),
        _ => ProviderError::new("api_error", body, false),
    }
}

fn parse_response(raw: &Value) -> (Content, Vec<ToolCall>) {
    let mut texts: Vec<Value> = Vec::new();
    let mut tool_calls = Vec::new();

    let parts = raw
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for part in parts {
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            continue;
        }
        if let Some(chunk) = part.get("text").and_then(Value::as_str) {
            texts.push(json!({ "text": chunk }));
        }
        if let Some(fc) = part.get("functionCall") {
            let name = fc.get("name").and_then(Value::as_str).unwrap_or("");
            let args = fc.get("args").cloned().unwrap_or_else(|| json!({}));
            tool_calls.push(ToolCall {
                name: name.to_string(),
                args,
            });
        }
    }

    let content = match texts.len() {
        0 => Content::Text(String::new()),
        1 => Content::Text(texts[0]["text"].as_str().unwrap_or_default().to_string()),
        _ => Content::Fragments(texts),
    };
    (content, tool_calls)
}
