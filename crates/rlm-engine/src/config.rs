//! Configuration — an immutable nested record assembled from a single TOML
//! source and default values.
//!
//! Validation is two-tier: [`Config::validate_critical`] fails loudly with a
//! named [`ConfigError`]; [`Config::validate_soft`] collects warnings for
//! out-of-range or unknown settings and clamps them to defaults rather than
//! failing the load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::BudgetConfig;

/// Top-level configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub budget: BudgetConfig,
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub tools: ToolsConfig,
    pub trace: TraceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            budget: BudgetConfig::default(),
            sandbox: SandboxConfig::default(),
            llm: LlmConfig::default(),
            session: SessionConfig::default(),
            tools: ToolsConfig::default(),
            trace: TraceConfig::default(),
        }
    }
}

/// Sandbox execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Execution backend. Only `"process"` is implemented; the field is an
    /// extension point for future backends.
    pub backend: String,
    pub execution_timeout_seconds: u64,
    pub max_memory_bytes: u64,
    pub max_output_chars: usize,
    /// Allow-list of importable top-level module names (strict mode).
    pub allowed_modules: Vec<String>,
    /// Deny-list applied after the allow-list (permissive mode).
    pub blocked_names: Vec<String>,
    pub security_mode: SecurityMode,
    pub working_directory: String,
    pub temp_directory: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: "process".to_string(),
            execution_timeout_seconds: 10,
            max_memory_bytes: 256 * 1024 * 1024,
            max_output_chars: 16_384,
            allowed_modules: vec![
                "math".to_string(),
                "json".to_string(),
                "re".to_string(),
                "itertools".to_string(),
                "collections".to_string(),
                "string".to_string(),
                "textwrap".to_string(),
            ],
            blocked_names: vec![
                "socket".to_string(),
                "subprocess".to_string(),
                "os".to_string(),
                "sys".to_string(),
                "urllib".to_string(),
                "requests".to_string(),
                "http".to_string(),
                "ctypes".to_string(),
            ],
            security_mode: SecurityMode::Strict,
            working_directory: "/tmp".to_string(),
            temp_directory: "/tmp".to_string(),
        }
    }
}

/// Sandbox security mode. `Strict` is the only mode selectable for
/// production; `Permissive` exists solely as a development affordance and
/// must never be reachable from untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    Strict,
    Permissive,
}

/// LLM provider selection. Opaque to the core beyond model ids and
/// sampling parameters — concrete provider wiring lives outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub root_model: String,
    pub sub_model: String,
    pub temperature_root: f32,
    pub temperature_sub: f32,
    pub max_output_tokens: u32,
    pub allow_model_override: bool,
    pub allowed_model_prefixes: Vec<String>,
    /// Retries attempted on a transient `ModelError` before the call
    /// escalates to a terminal failure.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub provider_config: toml::Table,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            root_model: String::new(),
            sub_model: String::new(),
            temperature_root: 0.2,
            temperature_sub: 0.0,
            max_output_tokens: 4096,
            allow_model_override: false,
            allowed_model_prefixes: Vec::new(),
            max_retries: 3,
            retry_backoff_ms: 500,
            provider_config: toml::Table::new(),
        }
    }
}

/// Session-loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_turns: u32,
    pub max_context_chars: usize,
    pub max_file_bytes: u64,
    pub max_nav_results: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_context_chars: 8_000,
            max_file_bytes: 1024 * 1024,
            max_nav_results: 50,
        }
    }
}

/// Which navigation/sub-query tools are enabled for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub enabled: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                "nav_outline".to_string(),
                "nav_ls".to_string(),
                "nav_read".to_string(),
                "nav_search".to_string(),
                "nav_info".to_string(),
                "llm_query".to_string(),
            ],
        }
    }
}

/// Tracing/transcript retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub retain_full_transcript: bool,
    pub preview_chars: usize,
    pub redact_patterns: Vec<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            retain_full_transcript: false,
            preview_chars: 400,
            redact_patterns: Vec::new(),
        }
    }
}

/// A critical configuration error, naming the offending field. Returned by
/// `validate_critical`; the caller must not start a session on `Err`.
#[derive(Debug, Error, Clone)]
#[error("{field}: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

/// A non-critical configuration issue: the value was clamped to a default
/// rather than failing the load.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const KNOWN_SANDBOX_BACKENDS: &[&str] = &["process"];

impl Config {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError {
            field: "<root>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load configuration from a TOML file on disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError {
            field: "<file>".to_string(),
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Self::from_toml_str(&content)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    /// Never fails — any load error is logged and defaults are used.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file found, using defaults");
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Critical-field validation. Fails loudly and names the offending
    /// field; no session may be started when this returns `Err`.
    pub fn validate_critical(&self) -> Result<(), ConfigError> {
        if let Some(field) = self.budget.first_invalid_field() {
            return Err(ConfigError {
                field: field.to_string(),
                message: "budget caps must be greater than zero".to_string(),
            });
        }
        if !KNOWN_SANDBOX_BACKENDS.contains(&self.sandbox.backend.as_str()) {
            return Err(ConfigError {
                field: "sandbox.backend".to_string(),
                message: format!(
                    "unknown sandbox backend '{}', expected one of: {}",
                    self.sandbox.backend,
                    KNOWN_SANDBOX_BACKENDS.join(", ")
                ),
            });
        }
        if self.llm.root_model.is_empty() {
            return Err(ConfigError {
                field: "llm.root_model".to_string(),
                message: "root model must be set".to_string(),
            });
        }
        Ok(())
    }

    /// Non-critical validation: collects warnings and clamps out-of-range
    /// values to defaults in the returned copy.
    pub fn validate_soft(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.session.max_turns == 0 {
            warnings.push(ConfigWarning {
                field: "session.max_turns".to_string(),
                message: "must be >= 1, clamped to default".to_string(),
            });
            self.session.max_turns = SessionConfig::default().max_turns;
        }

        if self.sandbox.execution_timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                field: "sandbox.execution_timeout_seconds".to_string(),
                message: "must be >= 1, clamped to default".to_string(),
            });
            self.sandbox.execution_timeout_seconds =
                SandboxConfig::default().execution_timeout_seconds;
        }

        let known_tools = [
            "nav_outline",
            "nav_ls",
            "nav_read",
            "nav_search",
            "nav_info",
            "llm_query",
        ];
        let mut unknown_tools = Vec::new();
        self.tools.enabled.retain(|t| {
            if known_tools.contains(&t.as_str()) {
                true
            } else {
                unknown_tools.push(t.clone());
                false
            }
        });
        for t in unknown_tools {
            warnings.push(ConfigWarning {
                field: "tools.enabled".to_string(),
                message: format!("unknown tool '{}', ignored", t),
            });
        }

        for w in &warnings {
            tracing::warn!(field = %w.field, "{}", w.message);
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_empty_root_model() {
        // A default config is not valid on its own — root_model must be set
        // by the caller, matching the "missing root model fails loudly" rule.
        let config = Config::default();
        assert!(config.validate_critical().is_err());
    }

    #[test]
    fn test_critical_validation_names_field() {
        let mut config = Config::default();
        config.llm.root_model = "claude-test".to_string();
        config.budget.max_root_calls = 0;
        let err = config.validate_critical().unwrap_err();
        assert_eq!(err.field, "budget.max_root_calls");
    }

    #[test]
    fn test_critical_validation_unknown_backend() {
        let mut config = Config::default();
        config.llm.root_model = "claude-test".to_string();
        config.sandbox.backend = "docker".to_string();
        let err = config.validate_critical().unwrap_err();
        assert_eq!(err.field, "sandbox.backend");
    }

    #[test]
    fn test_valid_config_passes_critical() {
        let mut config = Config::default();
        config.llm.root_model = "claude-test".to_string();
        assert!(config.validate_critical().is_ok());
    }

    #[test]
    fn test_soft_validation_clamps_and_warns() {
        let mut config = Config::default();
        config.session.max_turns = 0;
        let warnings = config.validate_soft();
        assert_eq!(warnings.len(), 1);
        assert_eq!(config.session.max_turns, SessionConfig::default().max_turns);
    }

    #[test]
    fn test_soft_validation_drops_unknown_tools() {
        let mut config = Config::default();
        config.tools.enabled.push("nav_delete".to_string());
        let warnings = config.validate_soft();
        assert!(warnings.iter().any(|w| w.field == "tools.enabled"));
        assert!(!config.tools.enabled.contains(&"nav_delete".to_string()));
    }

    #[test]
    fn test_from_toml_str_round_trip() {
        let toml_str = r#"
            [llm]
            root_model = "claude-test"
            sub_model = "claude-haiku"

            [budget]
            max_session_tokens = 50000
            max_session_usd = 2.0
            max_root_calls = 10
            max_sub_calls = 5
            session_timeout_seconds = 120
            chars_per_token = 4.0
        "#;
        let config = Config::from_toml_str(toml_str).unwrap();
        assert_eq!(config.llm.root_model, "claude-test");
        assert_eq!(config.budget.max_session_tokens, 50_000);
        assert!(config.validate_critical().is_ok());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/path/config.toml"));
        assert_eq!(config.llm.root_model, "");
    }

    #[test]
    fn test_security_mode_default_is_strict() {
        assert_eq!(SandboxConfig::default().security_mode, SecurityMode::Strict);
    }
}
