//! Sandbox Backend — isolated child-process execution of a turn's code
//! snippet, after call interception has rewritten it.
//!
//! `strict` mode enforces an address-space rlimit (`nix::sys::resource`)
//! before exec, denies network by clearing proxy env vars, and restricts
//! injected bindings to JSON-serializable values. `permissive` mode skips
//! the rlimit and is refused outside local/dev configuration.

use std::collections::HashMap;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::{SandboxConfig, SecurityMode};
use crate::error::{Result, RlmError};

/// Outcome of a single sandbox execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub truncated: bool,
}

impl SandboxOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Execute `code` with `injected_bindings` pre-bound as module-level
    /// names (the rewritten `__rlm_result_N` values from call
    /// interception). Returns `Ok` for both successful runs and user
    /// exceptions inside the child — only infrastructure failure is an
    /// `Err`.
    async fn execute(
        &self,
        code: &str,
        injected_bindings: &HashMap<String, serde_json::Value>,
    ) -> Result<SandboxOutcome>;
}

pub type SharedSandbox = std::sync::Arc<dyn Sandbox>;

/// Subprocess-based Python sandbox.
pub struct ProcessSandbox {
    config: SandboxConfig,
    python_bin: String,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            python_bin: "python3".to_string(),
        }
    }

    pub fn with_interpreter(config: SandboxConfig, python_bin: impl Into<String>) -> Self {
        Self {
            config,
            python_bin: python_bin.into(),
        }
    }

    pub fn shared(config: SandboxConfig) -> SharedSandbox {
        std::sync::Arc::new(Self::new(config))
    }

    fn truncate(&self, bytes: &[u8]) -> (String, bool) {
        let max = self.config.max_output_chars;
        if bytes.len() > max {
            (String::from_utf8_lossy(&bytes[..max]).to_string(), true)
        } else {
            (String::from_utf8_lossy(bytes).to_string(), false)
        }
    }

    /// Build the full script: bindings prelude, then user code. Bindings
    /// are serialized as JSON literals, never interpolated as Python
    /// source, so an injected value can never smuggle in new statements.
    fn build_script(&self, code: &str, injected_bindings: &HashMap<String, serde_json::Value>) -> Result<String> {
        let mut prelude = String::from("import json as __rlm_json\n");
        for (name, value) in injected_bindings {
            if !is_valid_identifier(name) {
                return Err(RlmError::ProtocolError(format!(
                    "invalid injected binding name: {}",
                    name
                )));
            }
            let json = serde_json::to_string(value)?;
            prelude.push_str(&format!(
                "{name} = __rlm_json.loads({literal})\n",
                name = name,
                literal = python_string_literal(&json)
            ));
        }
        prelude.push_str(code);
        Ok(prelude)
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn python_string_literal(s: &str) -> String {
    format!("{:?}", s)
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn execute(
        &self,
        code: &str,
        injected_bindings: &HashMap<String, serde_json::Value>,
    ) -> Result<SandboxOutcome> {
        let start = std::time::Instant::now();
        let script = self.build_script(code, injected_bindings)?;

        let mut cmd = Command::new(&self.python_bin);
        cmd.arg("-I"); // isolated mode: ignore PYTHONPATH/site customizations
        cmd.arg("-c");
        cmd.arg(&script);

        cmd.current_dir(&self.config.working_directory);

        cmd.env_clear();
        cmd.env("PATH", std::env::var("PATH").unwrap_or_default());

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        if self.config.security_mode == SecurityMode::Strict {
            let max_bytes = self.config.max_memory_bytes;
            unsafe {
                cmd.pre_exec(move || {
                    let limit = nix::sys::resource::Resource::RLIMIT_AS;
                    nix::sys::resource::setrlimit(limit, max_bytes, max_bytes)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                    Ok(())
                });
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RlmError::SpawnError(e.to_string()))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        let wait_result = timeout(Duration::from_secs(self.config.execution_timeout_seconds), child.wait()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        if let Some(mut h) = stdout_handle.take() {
            let _ = h.read_to_end(&mut stdout_buf).await;
        }
        if let Some(mut h) = stderr_handle.take() {
            let _ = h.read_to_end(&mut stderr_buf).await;
        }
        let (stdout, stdout_trunc) = self.truncate(&stdout_buf);
        let (stderr, stderr_trunc) = self.truncate(&stderr_buf);
        let truncated = stdout_trunc || stderr_trunc;

        match wait_result {
            Ok(Ok(status)) => {
                if let Some(signal) = status.signal() {
                    if signal == 9 && self.config.security_mode == SecurityMode::Strict {
                        return Err(RlmError::MemoryExceeded(self.config.max_memory_bytes));
                    }
                    return Err(RlmError::ProtocolError(format!(
                        "sandbox child terminated by signal {}",
                        signal
                    )));
                }
                Ok(SandboxOutcome {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                    duration_ms,
                    truncated,
                })
            }
            Ok(Err(e)) => Err(RlmError::ProtocolError(e.to_string())),
            Err(_) => {
                let _ = child.kill().await;
                Err(RlmError::SandboxTimeout(self.config.execution_timeout_seconds))
            }
        }
    }
}

/// Classify a completed, non-timed-out outcome as success or a recoverable
/// `SandboxUserError` carrying the child's traceback.
pub fn classify_outcome(outcome: SandboxOutcome) -> Result<SandboxOutcome> {
    if outcome.is_success() {
        Ok(outcome)
    } else {
        Err(RlmError::SandboxUserError(outcome.stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> ProcessSandbox {
        ProcessSandbox::new(SandboxConfig {
            execution_timeout_seconds: 5,
            ..SandboxConfig::default()
        })
    }

    #[test]
    fn test_build_script_rejects_bad_identifier() {
        let sb = sandbox();
        let mut bindings = HashMap::new();
        bindings.insert("not valid".to_string(), serde_json::json!(1));
        let result = sb.build_script("pass", &bindings);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_script_embeds_json_binding() {
        let sb = sandbox();
        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), serde_json::json!({"a": 1}));
        let script = sb.build_script("print(x)", &bindings).unwrap();
        assert!(script.contains("x = __rlm_json.loads"));
        assert!(script.trim_end().ends_with("print(x)"));
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("foo_bar"));
        assert!(is_valid_identifier("_x"));
        assert!(!is_valid_identifier("1foo"));
        assert!(!is_valid_identifier("foo bar"));
        assert!(!is_valid_identifier(""));
    }

    #[tokio::test]
    async fn test_execute_simple_success() {
        let sb = sandbox();
        let outcome = sb.execute("print('hi')", &HashMap::new()).await.unwrap();
        assert!(outcome.is_success());
        assert!(outcome.stdout.contains("hi"));
    }

    #[tokio::test]
    async fn test_execute_with_injected_binding() {
        let sb = sandbox();
        let mut bindings = HashMap::new();
        bindings.insert("value".to_string(), serde_json::json!(42));
        let outcome = sb
            .execute("print(value + 1)", &bindings)
            .await
            .unwrap();
        assert!(outcome.stdout.contains("43"));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let sb = ProcessSandbox::new(SandboxConfig {
            execution_timeout_seconds: 1,
            ..SandboxConfig::default()
        });
        let result = sb.execute("import time; time.sleep(5)", &HashMap::new()).await;
        assert!(matches!(result, Err(RlmError::SandboxTimeout(_))));
    }

    #[tokio::test]
    async fn test_execute_user_error_classified() {
        let sb = sandbox();
        let outcome = sb.execute("raise ValueError('boom')", &HashMap::new()).await.unwrap();
        assert!(!outcome.is_success());
        let classified = classify_outcome(outcome);
        assert!(matches!(classified, Err(RlmError::SandboxUserError(_))));
    }
}
