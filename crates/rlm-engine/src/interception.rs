//! AST call-interception layer.
//!
//! Rewrites `TARGET = TOOL(ARGS)` statements in a model-generated code
//! block into plain name bindings against fresh identifiers, so the
//! actual tool invocation (navigation, sub-LLM query) happens in the
//! parent process with the budget governor and `CodeSource` in scope,
//! never inside the sandboxed child.
//!
//! This is a statement-level static scan, not a full parser: it is
//! deliberately conservative. Anything that doesn't match the strict
//! calling convention — bare expression calls, calls nested in another
//! expression, calls inside a loop or conditional, computed arguments,
//! more than one call per line — rejects the *whole* code block with a
//! single `BadCall` naming the offending line, rather than attempting a
//! partial rewrite.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{Result, RlmError};

/// One statically-resolved argument to a whitelisted tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// A literal string/number/bool/null, parsed from the source text.
    Literal(Value),
    /// A reference to a previously bound target identifier.
    Ref(String),
}

/// A single whitelisted call extracted from the snippet.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// The original left-hand-side identifier the model wrote.
    pub target: String,
    /// The tool name invoked.
    pub tool: String,
    /// Statically-resolved positional arguments.
    pub args: Vec<ArgValue>,
    /// 1-based source line number.
    pub line: usize,
    /// Fresh identifier the rewritten snippet binds the result to.
    pub fresh_name: String,
}

/// Output of interception: the rewritten source to hand to the sandbox,
/// plus the call sites to execute in the parent before running it.
#[derive(Debug, Clone)]
pub struct InterceptionResult {
    pub rewritten_source: String,
    pub call_sites: Vec<CallSite>,
}

fn assignment_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<indent>\s*)(?P<target>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?P<tool>[A-Za-z_][A-Za-z0-9_]*)\s*\((?P<args>.*)\)\s*$").unwrap()
    })
}

fn block_header_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(for|while|if|elif|else|with|try|except|finally|def|class)\b.*:\s*$").unwrap()
    })
}

fn tool_occurrence_pattern(tool: &str) -> Regex {
    Regex::new(&format!(r"\b{}\s*\(", regex::escape(tool))).unwrap()
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ').count()
}

/// Scan `source` for whitelisted tool calls and produce a rewritten
/// snippet plus the call sites to execute before running it.
///
/// `whitelisted_tools` must be in alphabetical-independent order; lookups
/// are by name only.
pub fn intercept(source: &str, whitelisted_tools: &[&str]) -> Result<InterceptionResult> {
    let whitelist: HashSet<&str> = whitelisted_tools.iter().copied().collect();
    let lines: Vec<&str> = source.lines().collect();

    // Track which lines sit inside a loop/conditional/def/class body by
    // maintaining a stack of block-opening indentation levels.
    let mut block_stack: Vec<usize> = Vec::new();
    let mut in_block = vec![false; lines.len()];

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            in_block[i] = !block_stack.is_empty();
            continue;
        }
        let indent = indent_of(line);
        while let Some(&top) = block_stack.last() {
            if indent <= top {
                block_stack.pop();
            } else {
                break;
            }
        }
        in_block[i] = !block_stack.is_empty();
        if block_header_pattern().is_match(line) {
            block_stack.push(indent);
        }
    }

    // Conservative whole-turn rejection: any whitelisted tool name that
    // appears on a line which does NOT match the strict assignment
    // pattern exactly fails the whole block.
    for (i, line) in lines.iter().enumerate() {
        for tool in &whitelist {
            if !tool_occurrence_pattern(tool).is_match(line) {
                continue;
            }
            let Some(caps) = assignment_pattern().captures(line) else {
                return Err(RlmError::BadCall {
                    reason: format!(
                        "'{}' must be called as a top-level assignment, not embedded in an expression",
                        tool
                    ),
                    line: i + 1,
                });
            };
            if &caps["tool"] != *tool {
                return Err(RlmError::BadCall {
                    reason: format!(
                        "'{}' appears inside the arguments or right-hand side of another call",
                        tool
                    ),
                    line: i + 1,
                });
            }
            if in_block[i] {
                return Err(RlmError::BadCall {
                    reason: format!("'{}' call inside a loop or conditional is not supported", tool),
                    line: i + 1,
                });
            }
        }
    }

    let mut call_sites = Vec::new();
    let mut bound_targets: HashSet<String> = HashSet::new();
    let mut rewritten_lines: Vec<String> = Vec::with_capacity(lines.len());
    let mut counter = 0usize;

    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = assignment_pattern().captures(line) else {
            rewritten_lines.push(line.to_string());
            bound_targets.insert(bare_target(line));
            continue;
        };
        let tool = caps["tool"].to_string();
        if !whitelist.contains(tool.as_str()) {
            rewritten_lines.push(line.to_string());
            bound_targets.insert(caps["target"].to_string());
            continue;
        }

        let target = caps["target"].to_string();
        let indent = &caps["indent"];
        let args_text = caps["args"].to_string();

        if count_top_level_calls(&args_text) > 0 {
            return Err(RlmError::BadCall {
                reason: format!("'{}' has a nested call in its arguments", tool),
                line: i + 1,
            });
        }

        let args = parse_args(&args_text, &bound_targets).map_err(|reason| RlmError::BadCall {
            reason,
            line: i + 1,
        })?;

        counter += 1;
        let fresh_name = format!("__rlm_result_{}", counter);
        rewritten_lines.push(format!("{}{} = {}", indent, target, fresh_name));
        bound_targets.insert(target.clone());

        call_sites.push(CallSite {
            target,
            tool,
            args,
            line: i + 1,
            fresh_name,
        });
    }

    Ok(InterceptionResult {
        rewritten_source: rewritten_lines.join("\n"),
        call_sites,
    })
}

fn bare_target(line: &str) -> String {
    line.split('=').next().unwrap_or("").trim().to_string()
}

/// Count how many `name(` call-like occurrences appear in an arguments
/// string — any nonzero count means a nested call, which the strict
/// calling convention forbids.
fn count_top_level_calls(args_text: &str) -> usize {
    static CALL_RE: OnceLock<Regex> = OnceLock::new();
    let re = CALL_RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*\s*\(").unwrap());
    re.find_iter(args_text).count()
}

/// Split a comma-separated argument list, respecting quoted strings, and
/// resolve each element to either a literal or a reference to a
/// previously bound identifier.
fn parse_args(args_text: &str, bound_targets: &HashSet<String>) -> std::result::Result<Vec<ArgValue>, String> {
    let mut args = Vec::new();
    for raw in split_top_level_commas(args_text) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(value) = parse_literal(trimmed) {
            args.push(ArgValue::Literal(value));
            continue;
        }
        if is_identifier(trimmed) {
            if bound_targets.contains(trimmed) {
                args.push(ArgValue::Ref(trimmed.to_string()));
                continue;
            }
            return Err(format!(
                "argument '{}' references an identifier not yet assigned in this turn",
                trimmed
            ));
        }
        return Err(format!("argument '{}' is not a literal or a prior assignment", trimmed));
    }
    Ok(args)
}

fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut current = String::new();

    for c in text.chars() {
        match in_string {
            Some(q) => {
                current.push(c);
                if c == q {
                    in_string = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    in_string = Some(c);
                    current.push(c);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    parts.push(current.clone());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_literal(text: &str) -> Option<Value> {
    if text == "None" {
        return Some(Value::Null);
    }
    if text == "True" {
        return Some(Value::Bool(true));
    }
    if text == "False" {
        return Some(Value::Bool(false));
    }
    if (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
        || (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
    {
        return Some(Value::String(text[1..text.len() - 1].to_string()));
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    if let Ok(f) = text.parse::<f64>() {
        return serde_json::Number::from_f64(f).map(Value::Number);
    }
    None
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn import_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:import\s+(?P<plain>[A-Za-z_][A-Za-z0-9_\.]*)|from\s+(?P<from>[A-Za-z_][A-Za-z0-9_\.]*)\s+import\b)").unwrap()
    })
}

/// Scan `source` for `import`/`from ... import` statements and reject any
/// that names a module outside the sandbox's import policy, before the
/// snippet ever reaches the child process.
///
/// Strict mode enforces an allow-list (`sandbox.allowed_modules`);
/// permissive mode enforces a deny-list (`sandbox.blocked_names`) instead.
pub fn check_imports(source: &str, sandbox: &crate::config::SandboxConfig) -> Result<()> {
    for (i, line) in source.lines().enumerate() {
        let Some(caps) = import_pattern().captures(line) else {
            continue;
        };
        let module_path = caps
            .name("plain")
            .or_else(|| caps.name("from"))
            .unwrap()
            .as_str();
        let top_level = module_path.split('.').next().unwrap_or(module_path);

        let denied = match sandbox.security_mode {
            crate::config::SecurityMode::Strict => {
                !sandbox.allowed_modules.iter().any(|m| m == top_level)
            }
            crate::config::SecurityMode::Permissive => {
                sandbox.blocked_names.iter().any(|m| m == top_level)
            }
        };

        if denied {
            return Err(RlmError::PolicyDenied(format!(
                "import of '{}' is not permitted by the sandbox's import policy",
                top_level
            )));
        }
    }
    Ok(())
}
