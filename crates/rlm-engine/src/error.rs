//! Error taxonomy for the RLM session engine.
//!
//! `RlmError` covers every failure mode named in the error-handling design:
//! argument/schema violations, policy and path denials, sandbox failures,
//! budget exhaustion, model-provider failures, and internal invariant
//! violations. `ErrorEnvelope` is the redacted form surfaced to callers of
//! `rlm_run`.

use thiserror::Error;

/// Result type alias for RLM operations.
pub type Result<T> = std::result::Result<T, RlmError>;

/// Errors that can occur in the RLM session engine.
#[derive(Debug, Error)]
pub enum RlmError {
    /// Argument schema violation (e.g. both or neither of `context`/`path`
    /// supplied to `rlm_run`). Not retryable.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Configuration forbids the requested operation (model override, path
    /// use, tool access).
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// A path argument resolved outside the configured root, or failed
    /// symlink/traversal checks.
    #[error("path denied: {0}")]
    PathDenied(String),

    /// A file exceeded `max_file_bytes`. The core must not have read past
    /// the cap before returning this.
    #[error("file too large: {0}")]
    FileTooLarge(String),

    /// The model reply could not be parsed into `FINAL(...)` or a code
    /// block. Recoverable — fed back as an observation.
    #[error("parse error: {0}")]
    ParseError(String),

    /// User code raised inside the sandbox child. Recoverable — fed back
    /// as an observation.
    #[error("sandbox user error: {0}")]
    SandboxUserError(String),

    /// The execution watchdog fired. Terminal for the turn.
    #[error("sandbox timeout after {0}s")]
    SandboxTimeout(u64),

    /// The child exceeded its memory rlimit. Terminal for the turn.
    #[error("memory limit exceeded: {0} bytes")]
    MemoryExceeded(u64),

    /// The child could not be started.
    #[error("sandbox spawn error: {0}")]
    SpawnError(String),

    /// The child died without a usable result, or the channel to it was
    /// corrupted. Terminal for the turn.
    #[error("sandbox protocol error: {0}")]
    ProtocolError(String),

    /// A whitelisted-tool call in a code block violated the strict calling
    /// convention (bare expression, nested call, loop/conditional, computed
    /// argument, multiple calls per line).
    #[error("bad call at line {line}: {reason}")]
    BadCall {
        /// Human-readable description of the violated convention.
        reason: String,
        /// 1-based line number of the offending statement.
        line: usize,
    },

    /// A budget cap was reached. Terminal for the session.
    #[error("budget exhausted: {axis}")]
    BudgetExhausted {
        /// Which axis was exhausted (`tokens`, `usd`, `root_calls`,
        /// `sub_calls`, `timeout`).
        axis: BudgetAxis,
    },

    /// The LLM provider failed. Retried with backoff within a turn before
    /// escalating to terminal.
    #[error("model error: {0}")]
    ModelError(String),

    /// A configuration value failed critical validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A programming-invariant violation in the core. Terminal; the detail
    /// is redacted before it reaches the public envelope.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Which budget axis was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetAxis {
    /// Total tokens across all calls.
    Tokens,
    /// Dollar cost ceiling.
    Usd,
    /// Number of completed root calls.
    RootCalls,
    /// Number of completed sub-calls.
    SubCalls,
    /// Session wall-clock timeout.
    Timeout,
}

impl std::fmt::Display for BudgetAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BudgetAxis::Tokens => "tokens",
            BudgetAxis::Usd => "usd",
            BudgetAxis::RootCalls => "root_calls",
            BudgetAxis::SubCalls => "sub_calls",
            BudgetAxis::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

impl From<serde_json::Error> for RlmError {
    fn from(e: serde_json::Error) -> Self {
        RlmError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for RlmError {
    fn from(e: std::io::Error) -> Self {
        RlmError::Internal(e.to_string())
    }
}

impl From<toml::de::Error> for RlmError {
    fn from(e: toml::de::Error) -> Self {
        RlmError::Config(e.to_string())
    }
}

/// Canonical error code surfaced in the public envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Disabled,
    InvalidArgs,
    PolicyDenied,
    PathDenied,
    FileTooLarge,
    Timeout,
    BudgetExhausted,
    SandboxError,
    ModelError,
    InternalError,
}

/// The redacted error form returned to external callers of `rlm_run`.
///
/// Never carries a raw `source()` chain or un-sanitized `Display` of an
/// internal error — only `error_code` and a safe human-readable message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable, safe-to-display message.
    pub error: String,
    /// Machine-readable metadata.
    pub meta: ErrorMeta,
}

/// Metadata attached to an `ErrorEnvelope`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorMeta {
    pub error_code: ErrorCode,
    pub retryable: bool,
}

impl From<&RlmError> for ErrorEnvelope {
    fn from(err: &RlmError) -> Self {
        let (error_code, retryable, message) = match err {
            RlmError::InvalidArgs(m) => (ErrorCode::InvalidArgs, false, m.clone()),
            RlmError::PolicyDenied(m) => (ErrorCode::PolicyDenied, false, m.clone()),
            RlmError::PathDenied(m) => (ErrorCode::PathDenied, false, m.clone()),
            RlmError::FileTooLarge(m) => (ErrorCode::FileTooLarge, false, m.clone()),
            RlmError::ParseError(m) => (ErrorCode::InvalidArgs, false, m.clone()),
            RlmError::SandboxUserError(m) => (ErrorCode::SandboxError, false, m.clone()),
            RlmError::SandboxTimeout(secs) => (
                ErrorCode::Timeout,
                false,
                format!("sandbox execution exceeded {}s", secs),
            ),
            RlmError::MemoryExceeded(_) => (
                ErrorCode::SandboxError,
                false,
                "sandbox exceeded its memory limit".to_string(),
            ),
            RlmError::SpawnError(_) => (
                ErrorCode::SandboxError,
                true,
                "sandbox failed to start".to_string(),
            ),
            RlmError::ProtocolError(_) => (
                ErrorCode::SandboxError,
                false,
                "sandbox protocol error".to_string(),
            ),
            RlmError::BadCall { reason, line } => (
                ErrorCode::InvalidArgs,
                false,
                format!("unsupported call pattern at line {}: {}", line, reason),
            ),
            RlmError::BudgetExhausted { axis } => (
                ErrorCode::BudgetExhausted,
                false,
                format!("budget exhausted: {}", axis),
            ),
            RlmError::ModelError(_) => (
                ErrorCode::ModelError,
                true,
                "the model provider failed".to_string(),
            ),
            RlmError::Config(m) => (ErrorCode::InvalidArgs, false, m.clone()),
            RlmError::Internal(_) => (
                ErrorCode::InternalError,
                false,
                "an internal error occurred".to_string(),
            ),
            RlmError::Serialization(_) => (
                ErrorCode::InternalError,
                false,
                "an internal error occurred".to_string(),
            ),
        };

        ErrorEnvelope {
            error: message,
            meta: ErrorMeta {
                error_code,
                retryable,
            },
        }
    }
}
