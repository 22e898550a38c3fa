//! Enhanced mock LLM backend for testing.
//!
//! More feature-rich than `backend::MockBackend`: queues responses behind a
//! `VecDeque` so callers can push more mid-test, captures every request for
//! later assertions, and can simulate latency.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::LLMBackend;
use crate::error::{Result, RlmError};
use crate::types::CompletionRequest;
use crate::types::CompletionResponse;

#[derive(Debug)]
pub struct MockLLMBackend {
    responses: Arc<Mutex<VecDeque<CompletionResponse>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    latency: Option<Duration>,
    name: String,
}

impl MockLLMBackend {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            latency: None,
            name: "mock-llm".to_string(),
        }
    }

    pub fn with_response(self, response: CompletionResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn with_responses(self, responses: Vec<CompletionResponse>) -> Self {
        let mut queue = self.responses.lock().unwrap();
        for response in responses {
            queue.push_back(response);
        }
        drop(queue);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn captured_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Panics if the request count doesn't match.
    pub fn assert_request_count(&self, expected: usize) {
        let actual = self.request_count();
        assert_eq!(
            actual, expected,
            "Expected {} requests, but got {}",
            expected, actual
        );
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    pub fn has_responses(&self) -> bool {
        !self.responses.lock().unwrap().is_empty()
    }
}

impl Default for MockLLMBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockLLMBackend {
    fn clone(&self) -> Self {
        Self {
            responses: Arc::clone(&self.responses),
            requests: Arc::clone(&self.requests),
            latency: self.latency,
            name: self.name.clone(),
        }
    }
}

#[async_trait]
impl LLMBackend for MockLLMBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut responses = self.responses.lock().unwrap();
        responses.pop_front().ok_or_else(|| {
            RlmError::ModelError("MockLLMBackend: no more responses queued".to_string())
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Matches requests for conditional-response test setups.
pub struct RequestMatcher {
    model_pattern: Option<String>,
    message_contains: Option<String>,
}

impl RequestMatcher {
    pub fn any() -> Self {
        Self {
            model_pattern: None,
            message_contains: None,
        }
    }

    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model_pattern: Some(model.into()),
            message_contains: None,
        }
    }

    pub fn contains(text: impl Into<String>) -> Self {
        Self {
            model_pattern: None,
            message_contains: Some(text.into()),
        }
    }

    pub fn matches(&self, request: &CompletionRequest) -> bool {
        if let Some(ref model) = self.model_pattern {
            if !request.model.contains(model) {
                return false;
            }
        }

        if let Some(ref text) = self.message_contains {
            let all_text: String = request
                .messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            if !all_text.contains(text) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use crate::types::Message;

    #[tokio::test]
    async fn test_mock_backend_single_response() {
        let backend = MockLLMBackend::new().with_response(fixtures::text_response("Hello!"));

        let request = fixtures::simple_request();
        let response = backend.complete(request).await.unwrap();

        assert_eq!(response.text, "Hello!");
        backend.assert_request_count(1);
    }

    #[tokio::test]
    async fn test_mock_backend_multiple_responses() {
        let backend = MockLLMBackend::new()
            .with_response(fixtures::text_response("First"))
            .with_response(fixtures::text_response("Second"));

        let r1 = backend.complete(fixtures::simple_request()).await.unwrap();
        let r2 = backend.complete(fixtures::simple_request()).await.unwrap();

        assert_eq!(r1.text, "First");
        assert_eq!(r2.text, "Second");
        backend.assert_request_count(2);
    }

    #[tokio::test]
    async fn test_mock_backend_exhausted() {
        let backend = MockLLMBackend::new();

        let result = backend.complete(fixtures::simple_request()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_backend_captured_requests() {
        let backend = MockLLMBackend::new().with_response(fixtures::text_response("Ok"));

        let request =
            CompletionRequest::new("special-model", vec![Message::user("Special request")], 100);
        let _ = backend.complete(request).await;

        let captured = backend.captured_requests();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].model, "special-model");
    }

    #[tokio::test]
    async fn test_mock_backend_queue_response() {
        let backend = MockLLMBackend::new();

        backend.queue_response(fixtures::text_response("Queued!"));
        assert!(backend.has_responses());

        let response = backend.complete(fixtures::simple_request()).await.unwrap();
        assert_eq!(response.text, "Queued!");
        assert!(!backend.has_responses());
    }

    #[test]
    fn test_request_matcher_any() {
        let matcher = RequestMatcher::any();
        let request = fixtures::simple_request();
        assert!(matcher.matches(&request));
    }

    #[test]
    fn test_request_matcher_model() {
        let matcher = RequestMatcher::model("test");
        let request = fixtures::simple_request();
        assert!(matcher.matches(&request));

        let matcher = RequestMatcher::model("other");
        assert!(!matcher.matches(&request));
    }

    #[test]
    fn test_request_matcher_contains() {
        let request =
            CompletionRequest::new("model", vec![Message::user("Find the bug in auth")], 100);

        let matcher = RequestMatcher::contains("bug");
        assert!(matcher.matches(&request));

        let matcher = RequestMatcher::contains("feature");
        assert!(!matcher.matches(&request));
    }
}
