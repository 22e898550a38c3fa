//! LLM Backend trait and implementations.
//!
//! Defines the abstraction layer for whichever concrete LLM provider backs
//! the root or a sub-query model. Concrete provider adapters (Anthropic,
//! Groq, Ollama, ...) are an external collaborator and out of scope here —
//! only the trait boundary and a mock/logging implementation live in this
//! crate.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, RlmError};
use crate::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors. Non-retryable errors are returned
/// immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    let mut backoff = initial_backoff;

    for attempt in 0..=max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        backend = backend_name,
                        attempt = attempt + 1,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap())
}

/// Check if an error is retryable.
///
/// Only transport-level model errors are retried; config, budget, and
/// sandbox errors never are.
pub fn is_retryable(error: &RlmError) -> bool {
    matches!(error, RlmError::ModelError(_))
}

/// Trait for LLM backend providers.
///
/// Implementations connect to a concrete provider (Anthropic, OpenAI,
/// local models). The root session loop and sub-query loop are the only
/// callers; both speak plain-text completions only — there is no native
/// tool-calling surface to negotiate.
#[async_trait]
pub trait LLMBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Check if the backend is available and properly configured.
    async fn health_check(&self) -> Result<()>;
}

/// A mock backend for testing purposes.
///
/// Returns pre-configured responses in order, useful for deterministic
/// testing of the session loop.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: std::sync::Mutex<Vec<CompletionResponse>>,
    request_log: std::sync::Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// Create a new mock backend with the given responses.
    ///
    /// Responses are returned in order. If more requests are made than
    /// responses available, an error is returned.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: std::sync::Mutex::new(responses),
            request_log: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![CompletionResponse::new(
            "mock_msg_1",
            "mock-model",
            text.into(),
            StopReason::EndTurn,
            Usage::new(10, 20),
        )])
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().unwrap().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.request_log.lock().unwrap().push(request);

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(RlmError::ModelError(
                "MockBackend: no more responses available".to_string(),
            ));
        }
        Ok(responses.remove(0))
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// A backend that wraps another backend with request/response logging.
pub struct LoggingBackend<B: LLMBackend> {
    inner: B,
    name: String,
}

impl<B: LLMBackend> LoggingBackend<B> {
    /// Create a new logging backend.
    pub fn new(inner: B) -> Self {
        let name = format!("logging({})", inner.name());
        Self { inner, name }
    }
}

#[async_trait]
impl<B: LLMBackend> LLMBackend for LoggingBackend<B> {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        tracing::debug!(
            backend = self.inner.name(),
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::debug!(
                    backend = self.inner.name(),
                    response_id = %response.id,
                    stop_reason = ?response.stop_reason,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    duration_ms = elapsed.as_millis() as u64,
                    "Completion successful"
                );
            }
            Err(e) => {
                tracing::warn!(
                    backend = self.inner.name(),
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "Completion failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LLMBackend>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn test_mock_backend_single_response() {
        let backend = MockBackend::with_text("Hello!");

        let request = CompletionRequest::new("test-model", vec![Message::user("Hi")], 100);
        let response = backend.complete(request).await.unwrap();

        assert_eq!(response.text, "Hello!");
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_backend_multiple_responses() {
        let backend = MockBackend::new(vec![
            CompletionResponse::new("msg_1", "model", "First", StopReason::EndTurn, Usage::new(10, 10)),
            CompletionResponse::new("msg_2", "model", "Second", StopReason::EndTurn, Usage::new(10, 10)),
        ]);

        let request = CompletionRequest::new("test-model", vec![Message::user("1")], 100);
        let r1 = backend.complete(request).await.unwrap();

        let request = CompletionRequest::new("test-model", vec![Message::user("2")], 100);
        let r2 = backend.complete(request).await.unwrap();

        assert_eq!(r1.text, "First");
        assert_eq!(r2.text, "Second");
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_backend_exhausted() {
        let backend = MockBackend::new(vec![]);

        let request = CompletionRequest::new("test-model", vec![Message::user("Hi")], 100);
        let result = backend.complete(request).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_backend_health_check() {
        let backend = MockBackend::with_text("test");
        assert!(backend.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_logging_backend() {
        let inner = MockBackend::with_text("Logged!");
        let backend = LoggingBackend::new(inner);

        assert_eq!(backend.name(), "logging(mock)");

        let request = CompletionRequest::new("test-model", vec![Message::user("Hi")], 100);
        let response = backend.complete(request).await.unwrap();

        assert_eq!(response.text, "Logged!");
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_failures() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let attempts = AtomicU32::new(0);

        let result = with_retry(3, Duration::from_millis(1), "test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RlmError::ModelError("transient".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_non_retryable() {
        let result: Result<i32> =
            with_retry(3, Duration::from_millis(1), "test", || async {
                Err(RlmError::Internal("fatal".to_string()))
            })
            .await;

        assert!(result.is_err());
    }
}
