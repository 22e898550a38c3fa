//! Cross-crate integration tests.
//!
//! Exercises `rlm-codegraph`'s tree-sitter symbol extraction feeding
//! `rlm-engine`'s navigation tools, and a full session run driven through
//! that real parsing path rather than a stubbed-out symbol list.

use std::sync::Arc;

use rlm_codegraph::{Language, Parser, RustExtractor, SymbolKind};
use rlm_engine::{
    CancellationToken, CodeSource, CompletionResponse, Config, MockBackend, NavTools,
    ProcessSandbox, SandboxConfig, SearchKind, Session, SessionDeps, StopReason, TaskContext,
    TerminationReason, Usage,
};
use tempfile::TempDir;

const SAMPLE_RUST: &str = r#"
pub struct Calculator {
    total: i32,
}

impl Calculator {
    pub fn add(&mut self, value: i32) -> i32 {
        self.total += value;
        self.total
    }
}

fn helper() -> bool {
    true
}
"#;

/// rlm-codegraph parses real Rust source and extracts symbols directly,
/// with no engine involved.
#[test]
fn test_rust_extractor_finds_struct_and_methods() {
    let mut parser = Parser::new();
    let parsed = parser
        .parse_source(SAMPLE_RUST, Language::Rust)
        .expect("parse should succeed");

    let symbols = RustExtractor::extract_symbols(&parsed.tree, SAMPLE_RUST, "calc.rs")
        .expect("extraction should succeed");

    let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"Calculator"), "names: {:?}", names);
    assert!(names.contains(&"add"), "names: {:?}", names);
    assert!(names.contains(&"helper"), "names: {:?}", names);

    let calculator = symbols
        .iter()
        .find(|s| s.name == "Calculator")
        .expect("Calculator symbol present");
    assert_eq!(calculator.kind, SymbolKind::Struct);
}

fn sample_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("calc.rs"), SAMPLE_RUST).unwrap();
    dir
}

/// rlm-engine's `NavTools` routes symbol search through rlm-codegraph's
/// real Rust extractor, not a hand-rolled regex scan.
#[tokio::test]
async fn test_nav_symbol_search_uses_codegraph_extractor() {
    let dir = sample_repo();
    let nav = NavTools::new(CodeSource::new(dir.path(), 1024 * 1024), 50);

    let matches = nav
        .nav_search("Calculator", SearchKind::Symbol)
        .await
        .expect("symbol search should succeed");

    assert!(
        matches.iter().any(|m| m.path.ends_with("calc.rs")),
        "expected a match in calc.rs, got {:?}",
        matches
    );
}

/// nav_info reports symbols extracted via rlm-codegraph for a Rust file.
#[tokio::test]
async fn test_nav_info_lists_codegraph_symbols() {
    let dir = sample_repo();
    let nav = NavTools::new(CodeSource::new(dir.path(), 1024 * 1024), 50);

    let info = nav.nav_info("calc.rs").await.expect("info should succeed");

    assert_eq!(info.language.as_deref(), Some("rust"));
    assert!(info.symbols.contains(&"Calculator".to_string()));
    assert!(info.symbols.contains(&"add".to_string()));
}

fn text(content: &str) -> CompletionResponse {
    CompletionResponse::new("msg", "model", content, StopReason::EndTurn, Usage::new(10, 10))
}

fn final_answer(answer: &str) -> CompletionResponse {
    text(&format!("FINAL(\"{}\")", answer))
}

fn code(snippet: &str) -> CompletionResponse {
    text(&format!("```python\n{}\n```", snippet))
}

/// End-to-end: a session turn calls nav_search(kind=symbol) through the
/// sandbox, which resolves to rlm-codegraph's real tree-sitter extraction,
/// before the root model emits FINAL.
#[tokio::test]
async fn test_session_symbol_search_round_trip() {
    let dir = sample_repo();
    let backend = MockBackend::new(vec![
        code("hits = nav_search('Calculator', 'symbol')\nprint(hits)"),
        final_answer("found Calculator"),
    ]);

    let deps = SessionDeps {
        root_backend: Arc::new(backend),
        sub_backend: Arc::new(MockBackend::new(vec![])),
        sandbox: ProcessSandbox::shared(SandboxConfig::default()),
        nav: NavTools::new(CodeSource::new(dir.path(), 1024 * 1024), 50),
    };

    let mut config = Config::default();
    config.llm.root_model = "root-model".to_string();
    config.session.max_turns = 5;

    let mut session = Session::new(deps, config, CancellationToken::new());
    let result = session
        .run("where is Calculator defined?", &TaskContext::Inline(String::new()))
        .await;

    assert_eq!(result.terminated_by, TerminationReason::Final);
    assert_eq!(result.answer.unwrap(), "found Calculator");
    assert_eq!(result.turns, 2);
}
