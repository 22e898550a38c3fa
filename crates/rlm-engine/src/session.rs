//! Session Loop — the turn-based state machine that drives the root model
//! from a task to a final answer (SPEC_FULL §4.6).
//!
//! `Initializing -> AwaitingModel -> ParsingReply -> ExecutingCode ->
//! Done/Failed`. Each turn renders a bounded, summarized prompt (never a
//! replay of previous code blocks), calls the root model, and either
//! extracts a `FINAL(...)` answer or dispatches a code block through
//! Interception then the Sandbox. Termination conditions are checked at
//! every transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::backend;
use crate::backend::SharedBackend;
use crate::budget::{BudgetGovernor, BudgetSnapshot};
use crate::config::Config;
use crate::error::{BudgetAxis, Result, RlmError};
use crate::interception::{check_imports, intercept, ArgValue};
use crate::nav::{NavTools, SearchKind};
use crate::sandbox::{classify_outcome, SharedSandbox};
use crate::subquery;
use crate::types::{CompletionRequest, Message, ToolDefinition};

/// Cooperative cancellation flag shared with the caller. Checked between
/// every state transition and before any model call, per §4.6.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a turn's execution produced. Appended to the transcript once,
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Observation {
    Final(String),
    CodeResult {
        stdout: String,
        stderr: String,
        values: Vec<(String, Value)>,
        errors: Vec<String>,
        truncated: bool,
    },
    ParseError(String),
    BudgetHalt(String),
    Timeout,
    InternalError(String),
}

/// One `(prompt, model_output, observation)` triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub prompt: String,
    pub model_output: String,
    pub observation: Observation,
}

/// Why the session loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Final,
    SessionTimeout,
    BudgetExhausted,
    MaxTurnsReached,
    InternalError,
    Cancelled,
}

/// The outcome of `Session::run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RLMResult {
    pub answer: Option<String>,
    pub turns: usize,
    pub budget_snapshot: BudgetSnapshot,
    pub terminated_by: TerminationReason,
}

/// Exactly one of `Inline`/`Path` must back a session per the `rlm_run`
/// argument-schema contract (§6); the caller enforces that at the
/// boundary before constructing this.
#[derive(Debug, Clone)]
pub enum TaskContext {
    Inline(String),
    Path(String),
}

/// Collaborators a session needs, injected explicitly — no global mutable
/// state anywhere in this crate (§5).
pub struct SessionDeps {
    pub root_backend: SharedBackend,
    pub sub_backend: SharedBackend,
    pub sandbox: SharedSandbox,
    pub nav: NavTools,
}

fn final_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^FINAL\(["']?([\s\S]+?)["']?\)\s*$"#).unwrap())
}

fn code_block_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:python)?\s*\n(.*?)```").unwrap())
}

const WHITELISTED_TOOLS: &[&str] = &[
    "nav_outline",
    "nav_ls",
    "nav_read",
    "nav_search",
    "nav_info",
    "llm_query",
];

/// Catalog of whitelisted tools rendered into the system prompt, in the
/// same order as `WHITELISTED_TOOLS`.
fn tool_catalog() -> &'static [ToolDefinition] {
    static CATALOG: OnceLock<Vec<ToolDefinition>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            ToolDefinition::new(
                "nav_outline",
                "structured summary of the tree",
                "RESULT = nav_outline()",
            ),
            ToolDefinition::new(
                "nav_ls",
                "directory listing",
                "RESULT = nav_ls(path: str)",
            ),
            ToolDefinition::new(
                "nav_read",
                "read a line range from a file",
                "RESULT = nav_read(path: str, line_start: int = None, line_end: int = None)",
            ),
            ToolDefinition::new(
                "nav_search",
                "search by text or symbol name",
                "RESULT = nav_search(query: str, kind: str = \"text\")",
            ),
            ToolDefinition::new(
                "nav_info",
                "metadata for a path (size, language, symbols)",
                "RESULT = nav_info(path: str)",
            ),
            ToolDefinition::new(
                "llm_query",
                "ask the sub-model a question",
                "RESULT = llm_query(prompt: str, max_tokens: int = None)",
            ),
        ]
    })
}

/// Drives one root-model dialogue from task to terminal `RLMResult`.
pub struct Session {
    deps: SessionDeps,
    config: Config,
    governor: BudgetGovernor,
    turns: Vec<Turn>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(deps: SessionDeps, config: Config, cancel: CancellationToken) -> Self {
        let governor = BudgetGovernor::new(
            config.budget.clone(),
            crate::budget::BudgetConfig::default_sub_budget(),
        );
        Self {
            deps,
            config,
            governor,
            turns: Vec::new(),
            cancel,
        }
    }

    /// Run the full session loop for `task` over `context`.
    pub async fn run(&mut self, task: &str, context: &TaskContext) -> RLMResult {
        rlm_tracing::start_span_with_data(
            "rlm_session",
            &serde_json::json!({ "task_len": task.len() }),
        );

        let context_summary = self.summarize_context(context).await;
        let result = self.run_loop(task, &context_summary).await;

        match &result.terminated_by {
            TerminationReason::Final => rlm_tracing::end_span_ok(),
            reason => rlm_tracing::end_span_error(format!("{:?}", reason)),
        }

        result
    }

    async fn summarize_context(&self, context: &TaskContext) -> String {
        match context {
            TaskContext::Inline(text) => {
                let cap = self.config.session.max_context_chars;
                text.chars().take(cap).collect()
            }
            TaskContext::Path(path) => match self.deps.nav.nav_info(path).await {
                Ok(info) => format!(
                    "file {} ({} bytes, {})",
                    info.path,
                    info.size_bytes,
                    info.language.unwrap_or_else(|| "unknown".to_string())
                ),
                Err(e) => format!("<path unavailable: {}>", e.detail),
            },
        }
    }

    async fn run_loop(&mut self, task: &str, context_summary: &str) -> RLMResult {
        loop {
            if self.cancel.is_cancelled() {
                return self.finalize(None, TerminationReason::Cancelled);
            }
            if self.turns.len() as u32 >= self.config.session.max_turns {
                return self.finalize(None, TerminationReason::MaxTurnsReached);
            }

            let prompt = self.render_prompt(task, context_summary);

            rlm_tracing::start_span_with_data(
                "rlm_turn",
                &serde_json::json!({ "turn": self.turns.len() }),
            );

            let estimate = self.governor.estimate_root_tokens(&prompt);
            let reservation = match self.governor.reserve_root(estimate) {
                Ok(r) => r,
                Err(halt) => {
                    rlm_tracing::end_span_error(format!("{}", halt.0));
                    return self.finalize_on_halt(halt.0);
                }
            };

            let request = CompletionRequest::new(
                self.config.llm.root_model.clone(),
                vec![Message::user(prompt.clone())],
                self.config.llm.max_output_tokens,
            )
            .with_temperature(self.config.llm.temperature_root);

            let root_backend = &self.deps.root_backend;
            let retry_result = backend::with_retry(
                self.config.llm.max_retries,
                std::time::Duration::from_millis(self.config.llm.retry_backoff_ms),
                root_backend.name(),
                || root_backend.complete(request.clone()),
            )
            .await;

            let response = match retry_result {
                Ok(r) => r,
                Err(e) => {
                    self.governor.release(reservation);
                    rlm_tracing::end_span_error(e.to_string());
                    self.turns.push(Turn {
                        prompt,
                        model_output: String::new(),
                        observation: Observation::InternalError(e.to_string()),
                    });
                    return self.finalize(None, TerminationReason::InternalError);
                }
            };

            if let Err(halt) = self.governor.commit(
                reservation,
                response.usage.input_tokens as u64,
                response.usage.output_tokens as u64,
                &self.config.llm.root_model,
            ) {
                rlm_tracing::end_span_error(format!("{}", halt.0));
                self.turns.push(Turn {
                    prompt,
                    model_output: response.text.clone(),
                    observation: Observation::BudgetHalt(halt.0.to_string()),
                });
                return self.finalize_on_halt(halt.0);
            }

            rlm_tracing::record_event(
                "rlm_model_reply",
                Some(serde_json::json!({ "chars": response.text.len() })),
            );

            if let Some(answer) = Self::extract_final(&response.text) {
                self.turns.push(Turn {
                    prompt,
                    model_output: response.text,
                    observation: Observation::Final(answer.clone()),
                });
                rlm_tracing::end_span_ok();
                return self.finalize(Some(answer), TerminationReason::Final);
            }

            if self.cancel.is_cancelled() {
                rlm_tracing::end_span_error("cancelled".to_string());
                return self.finalize(None, TerminationReason::Cancelled);
            }

            if let Some(code) = Self::extract_code_block(&response.text) {
                let observation = self.execute_code(&code).await;
                rlm_tracing::end_span_ok();
                self.turns.push(Turn {
                    prompt,
                    model_output: response.text,
                    observation,
                });
            } else {
                rlm_tracing::end_span_ok();
                self.turns.push(Turn {
                    prompt,
                    model_output: response.text,
                    observation: Observation::ParseError(
                        "reply contained neither FINAL(...) nor a code block".to_string(),
                    ),
                });
            }
        }
    }

    fn render_prompt(&self, task: &str, context_summary: &str) -> String {
        let mut out = String::new();
        out.push_str("# Task\n");
        out.push_str(task);
        out.push_str("\n\n# Context\n");
        out.push_str(context_summary);
        out.push_str("\n\n# Tools\n");
        for tool in tool_catalog() {
            out.push_str("- ");
            out.push_str(&tool.to_prompt_line());
            out.push('\n');
        }
        out.push_str("\n# Prior observations\n");

        let preview_chars = self.config.trace.preview_chars;
        let window = self.turns.len().min(8);
        for turn in &self.turns[self.turns.len() - window..] {
            out.push_str(&Self::summarize_turn(turn, preview_chars));
            out.push('\n');
        }

        out.push_str(
            "\nRespond with either FINAL(\"answer\") or exactly one fenced code block.\n",
        );
        out
    }

    fn summarize_turn(turn: &Turn, preview_chars: usize) -> String {
        let truncate = |s: &str| -> String { s.chars().take(preview_chars).collect() };
        match &turn.observation {
            Observation::Final(answer) => format!("- final: {}", truncate(answer)),
            Observation::CodeResult {
                stdout,
                stderr,
                values,
                errors,
                truncated,
            } => format!(
                "- code result: stdout={:?} stderr={:?} values={} errors={:?} truncated={}",
                truncate(stdout),
                truncate(stderr),
                values.len(),
                errors,
                truncated
            ),
            Observation::ParseError(detail) => format!("- parse error: {}", truncate(detail)),
            Observation::BudgetHalt(axis) => format!("- budget halt: {}", axis),
            Observation::Timeout => "- timeout".to_string(),
            Observation::InternalError(detail) => {
                format!("- internal error: {}", truncate(detail))
            }
        }
    }

    fn extract_final(text: &str) -> Option<String> {
        final_pattern()
            .captures(text)
            .map(|c| c[1].trim().to_string())
    }

    fn extract_code_block(text: &str) -> Option<String> {
        code_block_pattern().captures(text).map(|c| c[1].to_string())
    }

    async fn execute_code(&mut self, code: &str) -> Observation {
        if let Err(RlmError::PolicyDenied(reason)) = check_imports(code, &self.config.sandbox) {
            return Observation::ParseError(format!("import denied: {}", reason));
        }

        let intercepted = match intercept(code, WHITELISTED_TOOLS) {
            Ok(r) => r,
            Err(RlmError::BadCall { reason, line }) => {
                return Observation::ParseError(format!("bad call at line {}: {}", line, reason));
            }
            Err(e) => return Observation::InternalError(e.to_string()),
        };

        let mut target_values: HashMap<String, Value> = HashMap::new();
        let mut injected: HashMap<String, Value> = HashMap::new();
        let mut dispatch_errors = Vec::new();

        for site in &intercepted.call_sites {
            let mut args = Vec::with_capacity(site.args.len());
            let mut ok = true;
            for arg in &site.args {
                match arg {
                    ArgValue::Literal(v) => args.push(v.clone()),
                    ArgValue::Ref(name) => match target_values.get(name) {
                        Some(v) => args.push(v.clone()),
                        None => {
                            dispatch_errors.push(format!(
                                "line {}: reference to unbound name '{}'",
                                site.line, name
                            ));
                            ok = false;
                            break;
                        }
                    },
                }
            }
            let value = if ok {
                self.dispatch_tool(&site.tool, &args).await
            } else {
                Value::Null
            };
            target_values.insert(site.target.clone(), value.clone());
            injected.insert(site.fresh_name.clone(), value);
        }

        let outcome = self
            .deps
            .sandbox
            .execute(&intercepted.rewritten_source, &injected)
            .await;

        match outcome {
            Ok(outcome) => match classify_outcome(outcome) {
                Ok(outcome) => Observation::CodeResult {
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                    values: injected.into_iter().collect(),
                    errors: dispatch_errors,
                    truncated: outcome.truncated,
                },
                Err(RlmError::SandboxUserError(traceback)) => Observation::CodeResult {
                    stdout: String::new(),
                    stderr: traceback,
                    values: Vec::new(),
                    errors: dispatch_errors,
                    truncated: false,
                },
                Err(e) => Observation::InternalError(e.to_string()),
            },
            Err(RlmError::SandboxTimeout(_)) => Observation::Timeout,
            Err(e) => Observation::InternalError(e.to_string()),
        }
    }

    async fn dispatch_tool(&mut self, tool: &str, args: &[Value]) -> Value {
        let as_str = |v: &Value| v.as_str().map(|s| s.to_string());
        let as_usize = |v: &Value| v.as_u64().map(|n| n as usize);

        match tool {
            "nav_outline" => to_json(self.deps.nav.nav_outline().await),
            "nav_ls" => {
                let path = args.first().and_then(as_str).unwrap_or_else(|| ".".to_string());
                to_json(self.deps.nav.nav_ls(&path).await)
            }
            "nav_read" => {
                let path = args.first().and_then(as_str).unwrap_or_default();
                let line_start = args.get(1).and_then(as_usize);
                let line_end = args.get(2).and_then(as_usize);
                to_json(self.deps.nav.nav_read(&path, line_start, line_end).await)
            }
            "nav_search" => {
                let query = args.first().and_then(as_str).unwrap_or_default();
                let kind = match args.get(1).and_then(as_str).as_deref() {
                    Some("symbol") => SearchKind::Symbol,
                    _ => SearchKind::Text,
                };
                to_json(self.deps.nav.nav_search(&query, kind).await)
            }
            "nav_info" => {
                let path = args.first().and_then(as_str).unwrap_or_default();
                to_json(self.deps.nav.nav_info(&path).await)
            }
            "llm_query" => {
                let prompt = args.first().and_then(as_str).unwrap_or_default();
                let max_tokens = args.get(1).and_then(|v| v.as_u64()).map(|n| n as u32);
                subquery::llm_query(
                    self.deps.sub_backend.as_ref(),
                    &self.config.llm.sub_model,
                    self.config.llm.temperature_sub,
                    &mut self.governor,
                    &prompt,
                    max_tokens,
                    self.config.llm.max_retries,
                    self.config.llm.retry_backoff_ms,
                )
                .await
            }
            other => serde_json::json!({
                "error": { "code": "invalid_args", "detail": format!("unknown tool '{}'", other) }
            }),
        }
    }

    fn finalize_on_halt(&self, axis: BudgetAxis) -> RLMResult {
        let reason = if axis == BudgetAxis::Timeout {
            TerminationReason::SessionTimeout
        } else {
            TerminationReason::BudgetExhausted
        };
        self.finalize(None, reason)
    }

    fn finalize(&self, answer: Option<String>, terminated_by: TerminationReason) -> RLMResult {
        RLMResult {
            answer,
            turns: self.turns.len(),
            budget_snapshot: self.governor.snapshot(),
            terminated_by,
        }
    }
}

fn to_json<T: Serialize, E: Serialize>(result: std::result::Result<T, E>) -> Value {
    match result {
        Ok(v) => serde_json::to_value(v).unwrap_or(Value::Null),
        Err(e) => serde_json::json!({ "error": serde_json::to_value(e).unwrap_or(Value::Null) }),
    }
}
