//! rlm-engine: Recursive Language Model session engine
//!
//! - Configuration loading and validation
//! - Budget governor for tokens, dollars, call counts, and wall-clock time
//! - `CodeSource` and navigation tools over a confined codebase view
//! - Sandbox backend for isolated code execution
//! - Call interception layer bridging model-generated code to navigation
//!   and sub-query tools
//! - Turn-based session loop driving a task to completion

pub mod backend;
pub mod budget;
pub mod codesource;
pub mod config;
pub mod error;
pub mod fs;
pub mod interception;
pub mod nav;
pub mod sandbox;
pub mod session;
pub mod subquery;
pub mod types;

// Testing utilities - available in test builds
#[cfg(test)]
pub mod testing;

pub use backend::{LLMBackend, LoggingBackend, MockBackend, SharedBackend};
pub use budget::{
    BudgetConfig, BudgetGovernor, BudgetLedger, BudgetSnapshot, Halt, Reservation,
    ReservationKind,
};
pub use codesource::CodeSource;
pub use fs::{DirEntry, FileSystem, MockFileSystem, RealFileSystem, SharedFileSystem};
pub use config::{
    Config, ConfigError, ConfigWarning, LlmConfig, SandboxConfig, SecurityMode, SessionConfig,
    ToolsConfig, TraceConfig,
};
pub use error::{BudgetAxis, ErrorCode, ErrorEnvelope, Result, RlmError};
pub use interception::{check_imports, intercept, ArgValue, CallSite, InterceptionResult};
pub use nav::{
    EntryKind, InfoResult, ListEntry, NavError, NavTools, Outline, OutlineFile, ReadSlice,
    SearchKind, SearchMatch,
};
pub use sandbox::{classify_outcome, ProcessSandbox, Sandbox, SandboxOutcome, SharedSandbox};
pub use session::{
    CancellationToken, Observation, RLMResult, Session, SessionDeps, TaskContext,
    TerminationReason, Turn,
};
pub use subquery::llm_query;
pub use types::{
    CompletionRequest, CompletionResponse, Message, Role, StopReason, SystemPrompt,
    ToolDefinition, Usage,
};
