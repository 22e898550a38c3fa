//! Core wire types shared between the session loop and the LLM backend
//! trait boundary.
//!
//! The root and sub models never see native tool-calling: every turn is a
//! plain-text completion that either contains `FINAL(...)` or a fenced
//! code block. `ToolDefinition` exists only to render the textual tool
//! catalog embedded in the system prompt (SPEC_FULL §4.6), not to be sent
//! as an API `tools` parameter.

use serde::{Deserialize, Serialize};

/// System prompt — simple text, matching what every provider's
/// chat-completion API accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt(pub String);

impl SystemPrompt {
    pub fn to_text(&self) -> String {
        self.0.clone()
    }
}

impl From<String> for SystemPrompt {
    fn from(s: String) -> Self {
        SystemPrompt(s)
    }
}

impl From<&str> for SystemPrompt {
    fn from(s: &str) -> Self {
        SystemPrompt(s.to_string())
    }
}

/// A single-turn completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            system: None,
            temperature: None,
            stop_sequences: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(SystemPrompt(system.into()));
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Describes one navigation or sub-query primitive for the textual tool
/// catalog rendered into the system prompt. Never sent as an API `tools`
/// parameter — the model only ever produces plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub signature: String,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            signature: signature.into(),
        }
    }

    /// Render as a single line for the prompt's tool catalog section.
    pub fn to_prompt_line(&self) -> String {
        format!("{} — {}\n    {}", self.signature, self.description, "")
            .trim_end()
            .to_string()
    }
}

/// A completion response from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub text: String,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl CompletionResponse {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        text: impl Into<String>,
        stop_reason: StopReason,
        usage: Usage,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            text: text.into(),
            stop_reason,
            usage,
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// Token usage statistics for one completion call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_user() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("model-x", vec![Message::user("Hello")], 1024)
            .with_system("You are helpful.")
            .with_temperature(0.2);

        assert_eq!(request.model, "model-x");
        assert_eq!(request.max_tokens, 1024);
        assert!(request.system.is_some());
        assert_eq!(request.temperature, Some(0.2));
    }

    #[test]
    fn test_tool_definition_prompt_line() {
        let def = ToolDefinition::new("nav_ls", "list a directory", "nav_ls(path: str) -> list");
        assert!(def.to_prompt_line().contains("nav_ls"));
    }

    #[test]
    fn test_usage_total() {
        let usage = Usage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_serialize_deserialize_request() {
        let request = CompletionRequest::new("model-x", vec![Message::user("Hello")], 1024);
        let json = serde_json::to_string(&request).unwrap();
        let parsed: CompletionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model, request.model);
    }
}
