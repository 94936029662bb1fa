use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Message content as returned by the reasoning engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Fragments(Vec<Value>),
    Opaque(Value),
}

impl Content {
    /// Collapses any content shape into plain text.
    ///
    /// Fragments contribute their `text` field when present and their JSON
    /// form otherwise, one fragment per line.
    pub fn normalize(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Fragments(parts) => parts
                .iter()
                .map(|part| match part {
                    Value::Object(map) => match map.get("text") {
                        Some(Value::String(text)) => text.clone(),
                        Some(other) => other.to_string(),
                        None => part.to_string(),
                    },
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Content::Opaque(Value::Null) => String::new(),
            Content::Opaque(Value::String(text)) => text.clone(),
            Content::Opaque(other) => other.to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.normalize().trim().is_empty()
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<Content>) -> Self {
        Self::new(Role::Tool, content)
    }
}

/// Turns of a single question. Append-only; dropped once the query returns.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.turns.push(message);
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns.last()
    }

    pub fn last_from(&self, role: Role) -> Option<&Message> {
        self.turns.iter().rev().find(|turn| turn.role == role)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
