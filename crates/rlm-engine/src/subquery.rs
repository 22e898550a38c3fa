//! `llm_query` — the sub-LLM recursion primitive dispatched by the
//! Interception layer (SPEC_FULL §4.5/§9 Open Question #1).
//!
//! A single, non-recursive completion against the configured sub-model,
//! charged against the session's stricter sub-budget. Errors (budget halt,
//! model failure) are returned as a tagged JSON value rather than
//! propagated as an exception, so sandboxed code can branch on them —
//! the same typed-placeholder-on-error idiom the teacher used for tool
//! dispatch.

use std::time::Duration;

use serde_json::{json, Value};

use crate::backend::{self, LLMBackend};
use crate::budget::BudgetGovernor;
use crate::error::RlmError;
use crate::types::{CompletionRequest, Message};

/// Run one sub-LLM completion, reserving/committing against the sub side
/// of `governor`. Never returns `Err` — failures are encoded in the
/// returned JSON value so the caller (call dispatch in `session.rs`) can
/// treat every tool call uniformly. Transient `ModelError`s are retried
/// with backoff before being reported.
pub async fn llm_query(
    backend: &dyn LLMBackend,
    sub_model: &str,
    temperature: f32,
    governor: &mut BudgetGovernor,
    prompt: &str,
    max_tokens: Option<u32>,
    max_retries: u32,
    retry_backoff_ms: u64,
) -> Value {
    let estimate = governor.estimate_sub_tokens(prompt);
    let reservation = match governor.reserve_sub(estimate) {
        Ok(r) => r,
        Err(halt) => {
            return json!({
                "error": {
                    "code": "budget_exhausted",
                    "detail": format!("sub-query budget exhausted: {}", halt.0),
                }
            });
        }
    };

    let request = CompletionRequest::new(
        sub_model,
        vec![Message::user(prompt)],
        max_tokens.unwrap_or(1024),
    )
    .with_temperature(temperature);

    let result = backend::with_retry(
        max_retries,
        Duration::from_millis(retry_backoff_ms),
        backend.name(),
        || backend.complete(request.clone()),
    )
    .await;

    match result {
        Ok(response) => {
            if let Err(halt) = governor.commit(
                reservation,
                response.usage.input_tokens as u64,
                response.usage.output_tokens as u64,
                sub_model,
            ) {
                return json!({
                    "error": {
                        "code": "budget_exhausted",
                        "detail": format!("sub-query budget exhausted: {}", halt.0),
                    }
                });
            }
            json!({ "answer": response.text })
        }
        Err(e) => {
            governor.release(reservation);
            let detail = match &e {
                RlmError::ModelError(m) => m.clone(),
                other => other.to_string(),
            };
            json!({
                "error": {
                    "code": "model_error",
                    "detail": detail,
                }
            })
        }
    }
}
