//! Test fixtures and builders for common test scenarios.
//!
//! Pre-built requests and responses to reduce test boilerplate across the
//! session loop, backend, and subquery tests.

use crate::types::{CompletionRequest, CompletionResponse, Message, StopReason, Usage};

/// Create a user message with text content.
pub fn user_message(content: &str) -> Message {
    Message::user(content)
}

/// Create an assistant message with text content.
pub fn assistant_message(content: &str) -> Message {
    Message::assistant(content)
}

/// Create a simple completion request.
pub fn simple_request() -> CompletionRequest {
    CompletionRequest::new("test-model", vec![Message::user("Hello")], 100)
}

/// Create a request with a system prompt.
pub fn request_with_system(system: &str) -> CompletionRequest {
    CompletionRequest::new("test-model", vec![Message::user("Hello")], 100).with_system(system)
}

/// Create a simple text response.
pub fn text_response(content: &str) -> CompletionResponse {
    CompletionResponse::new(
        "msg_test",
        "test-model",
        content,
        StopReason::EndTurn,
        Usage::new(10, 20),
    )
}

/// Create a response with custom usage.
pub fn text_response_with_usage(content: &str, input: u32, output: u32) -> CompletionResponse {
    CompletionResponse::new(
        "msg_test",
        "test-model",
        content,
        StopReason::EndTurn,
        Usage::new(input, output),
    )
}

/// Create a `FINAL(...)` response, as the root model would emit to end a
/// session.
pub fn final_response(answer: &str) -> CompletionResponse {
    text_response(&format!("FINAL(\"{}\")", answer))
}

/// Create a response containing one fenced code block.
pub fn code_response(code: &str) -> CompletionResponse {
    text_response(&format!("```python\n{}\n```", code))
}

/// Create an error response (simulated by text with error indication).
pub fn error_response(error_msg: &str) -> CompletionResponse {
    text_response(&format!("Error: {}", error_msg))
}

/// Builder for creating custom completion responses.
pub struct ResponseBuilder {
    id: String,
    model: String,
    text: String,
    stop_reason: StopReason,
    usage: Usage,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self {
            id: "msg_built".to_string(),
            model: "test-model".to_string(),
            text: String::new(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::new(10, 10),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_stop_reason(mut self, reason: StopReason) -> Self {
        self.stop_reason = reason;
        self
    }

    pub fn with_usage(mut self, input: u32, output: u32) -> Self {
        self.usage = Usage::new(input, output);
        self
    }

    pub fn build(self) -> CompletionResponse {
        CompletionResponse::new(self.id, self.model, self.text, self.stop_reason, self.usage)
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating custom completion requests.
pub struct RequestBuilder {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    system: Option<String>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            model: "test-model".to_string(),
            messages: Vec::new(),
            max_tokens: 1000,
            system: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn message(mut self, msg: Message) -> Self {
        self.messages.push(msg);
        self
    }

    pub fn user(self, content: impl Into<String>) -> Self {
        self.message(Message::user(content))
    }

    pub fn assistant(self, content: impl Into<String>) -> Self {
        self.message(Message::assistant(content))
    }

    pub fn system(mut self, prompt: impl Into<String>) -> Self {
        self.system = Some(prompt.into());
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn build(self) -> CompletionRequest {
        let mut request = CompletionRequest::new(self.model, self.messages, self.max_tokens);
        if let Some(system) = self.system {
            request = request.with_system(system);
        }
        request
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_request() {
        let req = simple_request();
        assert_eq!(req.model, "test-model");
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn test_text_response() {
        let resp = text_response("Hello!");
        assert_eq!(resp.text, "Hello!");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn test_final_response() {
        let resp = final_response("42");
        assert!(resp.text.contains("FINAL"));
        assert!(resp.text.contains("42"));
    }

    #[test]
    fn test_code_response() {
        let resp = code_response("x = nav_ls('.')");
        assert!(resp.text.contains("```"));
        assert!(resp.text.contains("nav_ls"));
    }

    #[test]
    fn test_response_builder() {
        let resp = ResponseBuilder::new()
            .with_id("custom_id")
            .with_model("custom-model")
            .with_text("Hello")
            .with_usage(100, 50)
            .build();

        assert_eq!(resp.id, "custom_id");
        assert_eq!(resp.model, "custom-model");
        assert_eq!(resp.text, "Hello");
        assert_eq!(resp.usage.input_tokens, 100);
        assert_eq!(resp.usage.output_tokens, 50);
    }

    #[test]
    fn test_user_message() {
        let msg = user_message("Hello!");
        assert_eq!(msg.content, "Hello!");
    }

    #[test]
    fn test_assistant_message() {
        let msg = assistant_message("Hi there!");
        assert_eq!(msg.content, "Hi there!");
    }

    #[test]
    fn test_request_builder_basic() {
        let req = RequestBuilder::new()
            .model("custom-model")
            .user("Hello!")
            .max_tokens(500)
            .build();

        assert_eq!(req.model, "custom-model");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.max_tokens, 500);
    }

    #[test]
    fn test_request_builder_with_system() {
        let req = RequestBuilder::new().system("Be helpful").user("Hi").build();
        assert!(req.system.is_some());
    }

    #[test]
    fn test_request_builder_conversation() {
        let req = RequestBuilder::new()
            .user("What is 2+2?")
            .assistant("4")
            .user("And 3+3?")
            .build();

        assert_eq!(req.messages.len(), 3);
    }
}
