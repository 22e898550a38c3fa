//! rlm: thin command-line front end for the RLM session engine.
//!
//! Loads configuration from a TOML file, builds the engine's
//! collaborators (navigation tools over a `CodeSource`, a sandbox, an LLM
//! backend), and drives exactly one `rlm_run`-equivalent session to
//! completion, printing the resulting `RLMResult` as JSON.
//!
//! No proxy, router, or MCP server lives here — that plumbing is an
//! external collaborator outside the core engine's scope.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rlm_engine::{
    CancellationToken, CodeSource, Config, MockBackend, NavTools, ProcessSandbox, Session,
    SessionDeps, TaskContext,
};

/// Run a task against a codebase using the Recursive Language Model engine.
#[derive(Parser, Debug)]
#[command(name = "rlm", version, about)]
struct Cli {
    /// Natural-language task for the root model to solve.
    task: String,

    /// Root directory of the codebase to navigate. Defaults to the
    /// current directory.
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Inline context text, used instead of --path when the task doesn't
    /// need codebase navigation.
    #[arg(long, conflicts_with = "path")]
    context: Option<String>,

    /// Path to a TOML configuration file. Falls back to built-in
    /// defaults when absent.
    #[arg(long, default_value = "rlm.toml")]
    config: PathBuf,

    /// Override the configured root model name.
    #[arg(long)]
    model: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}

/// Build the default LLM backend. No concrete provider adapter ships in
/// this crate (§1 names "choice of concrete LLM provider" an external
/// collaborator) — embedders wire in a real `LLMBackend` here; standalone
/// runs get a single canned reply so the CLI is runnable end to end.
fn default_backend() -> Arc<dyn rlm_engine::LLMBackend> {
    Arc::new(MockBackend::with_text(
        "FINAL(\"no LLM backend configured — wire a real LLMBackend into rlm-cli::default_backend\")",
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config);
    let mut config = config;
    if let Some(model) = cli.model {
        config.llm.root_model = model;
    }
    if let Err(e) = config.validate_critical() {
        anyhow::bail!("invalid configuration: {}", e);
    }
    for warning in config.validate_soft() {
        tracing::warn!(field = %warning.field, message = %warning.message, "config warning");
    }

    let task_context = match &cli.context {
        Some(text) => TaskContext::Inline(text.clone()),
        None => TaskContext::Path(".".to_string()),
    };

    let source = CodeSource::new(&cli.path, config.session.max_file_bytes);
    let nav = NavTools::new(source, config.session.max_nav_results);
    let sandbox = ProcessSandbox::shared(config.sandbox.clone());
    let root_backend = default_backend();
    let sub_backend = default_backend();

    let deps = SessionDeps {
        root_backend,
        sub_backend,
        sandbox,
        nav,
    };

    let mut session = Session::new(deps, config, CancellationToken::new());
    let result = session.run(&cli.task, &task_context).await;

    let output = serde_json::to_string_pretty(&result).context("failed to serialize result")?;
    println!("{}", output);

    Ok(())
}
