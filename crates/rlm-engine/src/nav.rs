//! Navigation Tools — outline / list / read / search / info over a
//! `CodeSource`. The only channel through which sandboxed code learns
//! about the target repository.
//!
//! Every call is idempotent and side-effect-free. Path arguments are
//! confined via `CodeSource::confine`; a path that fails validation
//! returns a tagged `NavError`, never an exception.

use std::path::Path;

use serde::{Deserialize, Serialize};

use rlm_codegraph::{Language as ParseLanguage, Parser, Symbol, SymbolKind};

use crate::codesource::CodeSource;
use crate::error::{Result, RlmError};

/// A path/operation failure reported as a value rather than an exception,
/// so code running in the sandbox can inspect and branch on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavError {
    pub code: String,
    pub detail: String,
}

impl NavError {
    fn path_denied(detail: impl Into<String>) -> Self {
        Self {
            code: "path_denied".to_string(),
            detail: detail.into(),
        }
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self {
            code: "not_found".to_string(),
            detail: detail.into(),
        }
    }

    fn file_too_large(detail: impl Into<String>) -> Self {
        Self {
            code: "file_too_large".to_string(),
            detail: detail.into(),
        }
    }
}

impl From<RlmError> for NavError {
    fn from(e: RlmError) -> Self {
        match e {
            RlmError::PathDenied(d) => NavError::path_denied(d),
            RlmError::FileTooLarge(d) => NavError::file_too_large(d),
            other => NavError {
                code: "internal_error".to_string(),
                detail: other.to_string(),
            },
        }
    }
}

/// Entry kind for directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// A file and its top-level symbols, one node of `nav_outline`'s tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineFile {
    pub path: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    pub files: Vec<OutlineFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadSlice {
    pub path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub text: String,
    /// True if the requested range was clamped to the file's bounds.
    pub clamped: bool,
}

/// Which mode `nav_search` should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Text,
    Symbol,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    pub path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub preview: String,
    /// Character-offset span into the file, set for symbol-kind matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_span: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResult {
    pub path: String,
    pub size_bytes: u64,
    pub language: Option<String>,
    pub symbols: Vec<String>,
}

const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "build", "dist", "__pycache__", ".git"];

/// Navigation capability set bound to one `CodeSource`.
pub struct NavTools {
    source: CodeSource,
    max_nav_results: usize,
}

impl NavTools {
    pub fn new(source: CodeSource, max_nav_results: usize) -> Self {
        Self {
            source,
            max_nav_results,
        }
    }

    fn detect_language(path: &Path) -> Option<ParseLanguage> {
        ParseLanguage::from_extension(path.extension()?.to_str()?)
    }

    fn language_name(path: &Path) -> Option<String> {
        Self::detect_language(path).map(|l| format!("{:?}", l).to_lowercase())
    }

    async fn extract_symbols(&self, path: &std::path::Path) -> Vec<Symbol> {
        let Some(language) = Self::detect_language(path) else {
            return Vec::new();
        };
        let Ok(content) = self.source.read_file(path).await else {
            return Vec::new();
        };
        let mut parser = Parser::new();
        let Ok(parsed) = parser.parse_source(&content, language) else {
            return Vec::new();
        };
        let display = self.source.display_path(path);
        match language {
            ParseLanguage::Rust => {
                rlm_codegraph::RustExtractor::extract_symbols(&parsed.tree, &content, &display)
                    .unwrap_or_default()
            }
            ParseLanguage::Python => {
                rlm_codegraph::PythonExtractor::extract_symbols(&parsed.tree, &content, &display)
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }

    async fn walk_files(&self, dir: &std::path::Path, out: &mut Vec<std::path::PathBuf>) {
        let Ok(entries) = self.source.list_dir(dir).await else {
            return;
        };
        for entry in entries {
            if entry.name.starts_with('.') {
                continue;
            }
            if entry.is_dir {
                if SKIPPED_DIRS.contains(&entry.name.as_str()) {
                    continue;
                }
                Box::pin(self.walk_files(&entry.path, out)).await;
            } else {
                out.push(entry.path);
            }
        }
    }

    /// `nav_outline() -> structured summary of the tree`.
    pub async fn nav_outline(&self) -> std::result::Result<Outline, NavError> {
        let mut files = Vec::new();
        self.walk_files(self.source.root(), &mut files).await;
        files.sort();

        let mut outline_files = Vec::with_capacity(files.len());
        for path in files {
            let symbols = self
                .extract_symbols(&path)
                .await
                .into_iter()
                .map(|s| s.name)
                .collect();
            outline_files.push(OutlineFile {
                path: self.source.display_path(&path),
                symbols,
            });
        }
        Ok(Outline { files: outline_files })
    }

    /// `nav_ls(path) -> directory listing`.
    pub async fn nav_ls(&self, path: &str) -> std::result::Result<Vec<ListEntry>, NavError> {
        let resolved = self.source.confine(path).await?;
        if !self.source.is_dir(&resolved).await {
            return Err(NavError::not_found(format!("'{}' is not a directory", path)));
        }
        let mut entries: Vec<ListEntry> = self
            .source
            .list_dir(&resolved)
            .await?
            .into_iter()
            .filter(|e| !e.name.starts_with('.'))
            .map(|e| ListEntry {
                name: e.name,
                kind: if e.is_dir {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// `nav_read(path, line_start?, line_end?) -> text slice`.
    ///
    /// 1-based, inclusive. Out-of-range slices clamp to file bounds and
    /// report the clamp rather than erroring.
    pub async fn nav_read(
        &self,
        path: &str,
        line_start: Option<usize>,
        line_end: Option<usize>,
    ) -> std::result::Result<ReadSlice, NavError> {
        let resolved = self.source.confine(path).await?;
        if !self.source.is_file(&resolved).await {
            return Err(NavError::not_found(format!("'{}' is not a file", path)));
        }
        let content = self.source.read_file(&resolved).await?;
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();

        let requested_start = line_start.unwrap_or(1).max(1);
        let requested_end = line_end.unwrap_or(total).max(requested_start);

        let clamped_start = requested_start.min(total.max(1));
        let clamped_end = requested_end.min(total);
        let clamped = clamped_start != requested_start || clamped_end != requested_end;

        let start_idx = clamped_start.saturating_sub(1);
        let end_idx = clamped_end.min(total);
        let slice = if start_idx < end_idx {
            lines[start_idx..end_idx].join("\n")
        } else {
            String::new()
        };

        Ok(ReadSlice {
            path: self.source.display_path(&resolved),
            line_start: clamped_start,
            line_end: clamped_end.max(clamped_start),
            text: slice,
            clamped,
        })
    }

    /// `nav_search(query, kind?) -> ranked list of (path, line_range, preview)`.
    ///
    /// Ranking is deterministic for fixed `(query, kind, CodeSource)` —
    /// results are ordered by path then line number, never by anything
    /// time-dependent.
    pub async fn nav_search(
        &self,
        query: &str,
        kind: SearchKind,
    ) -> std::result::Result<Vec<SearchMatch>, NavError> {
        match kind {
            SearchKind::Text => self.search_text(query).await,
            SearchKind::Symbol => self.search_symbols(query).await,
        }
    }

    async fn search_text(&self, query: &str) -> std::result::Result<Vec<SearchMatch>, NavError> {
        let pattern = regex::RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
            .map_err(|e| NavError {
                code: "invalid_args".to_string(),
                detail: e.to_string(),
            })?;

        let mut files = Vec::new();
        self.walk_files(self.source.root(), &mut files).await;
        files.sort();

        let mut results = Vec::new();
        for path in files {
            if results.len() >= self.max_nav_results {
                break;
            }
            let Ok(content) = self.source.read_file(&path).await else {
                continue;
            };
            for (i, line) in content.lines().enumerate() {
                if pattern.is_match(line) {
                    results.push(SearchMatch {
                        path: self.source.display_path(&path),
                        line_start: i + 1,
                        line_end: i + 1,
                        preview: line.trim().chars().take(200).collect(),
                        char_span: None,
                    });
                    if results.len() >= self.max_nav_results {
                        break;
                    }
                }
            }
        }
        Ok(results)
    }

    async fn search_symbols(&self, query: &str) -> std::result::Result<Vec<SearchMatch>, NavError> {
        let mut files = Vec::new();
        self.walk_files(self.source.root(), &mut files).await;
        files.sort();

        let mut results = Vec::new();
        for path in files {
            if results.len() >= self.max_nav_results {
                break;
            }
            let symbols = self.extract_symbols(&path).await;
            for symbol in symbols {
                if results.len() >= self.max_nav_results {
                    break;
                }
                if symbol.name.to_lowercase().contains(&query.to_lowercase()) {
                    results.push(SearchMatch {
                        path: self.source.display_path(&path),
                        line_start: symbol.start_line,
                        line_end: symbol.end_line,
                        preview: format!("{:?} {}", symbol.kind, symbol.name),
                        char_span: symbol.char_span,
                    });
                }
            }
        }
        Ok(results)
    }

    /// `nav_info(path) -> metadata (size, language, declared symbols)`.
    pub async fn nav_info(&self, path: &str) -> std::result::Result<InfoResult, NavError> {
        let resolved = self.source.confine(path).await?;
        if !self.source.exists(&resolved).await {
            return Err(NavError::not_found(format!("'{}' does not exist", path)));
        }
        let size_bytes = if self.source.is_file(&resolved).await {
            self.source
                .read_file(&resolved)
                .await
                .map(|c| c.len() as u64)
                .unwrap_or(0)
        } else {
            0
        };
        let symbols = if self.source.is_file(&resolved).await {
            self.extract_symbols(&resolved)
                .await
                .into_iter()
                .filter(|s| s.kind != SymbolKind::File)
                .map(|s| s.name)
                .collect()
        } else {
            Vec::new()
        };

        Ok(InfoResult {
            path: self.source.display_path(&resolved),
            size_bytes,
            language: Self::language_name(&resolved),
            symbols,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/lib.rs"),
            "pub fn greet() {}\npub struct Foo;\n",
        )
        .unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(dir.path().join("README.md"), "# hi\n").unwrap();
        dir
    }

    fn tools(dir: &TempDir) -> NavTools {
        NavTools::new(CodeSource::new(dir.path(), 1024 * 1024), 50)
    }

    #[tokio::test]
    async fn test_nav_ls() {
        let dir = setup();
        let nav = tools(&dir);
        let entries = nav.nav_ls(".").await.unwrap();
        assert!(entries.iter().any(|e| e.name == "src"));
        assert!(entries.iter().any(|e| e.name == "README.md"));
    }

    #[tokio::test]
    async fn test_nav_ls_path_denied() {
        let dir = setup();
        let nav = tools(&dir);
        let err = nav.nav_ls("../../../etc").await.unwrap_err();
        assert_eq!(err.code, "path_denied");
    }

    #[tokio::test]
    async fn test_nav_read_clamps_out_of_range() {
        let dir = setup();
        let nav = tools(&dir);
        let slice = nav.nav_read("src/main.rs", Some(1), Some(100)).await.unwrap();
        assert!(slice.clamped);
        assert_eq!(slice.line_end, 1);
    }

    #[tokio::test]
    async fn test_nav_read_in_range() {
        let dir = setup();
        let nav = tools(&dir);
        let slice = nav.nav_read("src/lib.rs", Some(1), Some(1)).await.unwrap();
        assert!(!slice.clamped);
        assert!(slice.text.contains("greet"));
    }

    #[tokio::test]
    async fn test_nav_search_text() {
        let dir = setup();
        let nav = tools(&dir);
        let results = nav.nav_search("greet", SearchKind::Text).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "src/lib.rs");
    }

    #[tokio::test]
    async fn test_nav_search_symbol() {
        let dir = setup();
        let nav = tools(&dir);
        let results = nav.nav_search("Foo", SearchKind::Symbol).await.unwrap();
        assert!(results.iter().any(|r| r.path == "src/lib.rs"));
        assert!(results.iter().all(|r| r.char_span.is_some()));
    }

    #[tokio::test]
    async fn test_nav_info() {
        let dir = setup();
        let nav = tools(&dir);
        let info = nav.nav_info("src/lib.rs").await.unwrap();
        assert_eq!(info.language, Some("rust".to_string()));
        assert!(info.symbols.contains(&"greet".to_string()));
    }

    #[tokio::test]
    async fn test_nav_outline() {
        let dir = setup();
        let nav = tools(&dir);
        let outline = nav.nav_outline().await.unwrap();
        assert!(outline.files.iter().any(|f| f.path == "src/lib.rs"));
    }

    #[tokio::test]
    async fn test_nav_search_is_deterministic() {
        let dir = setup();
        let nav = tools(&dir);
        let a = nav.nav_search("fn", SearchKind::Text).await.unwrap();
        let b = nav.nav_search("fn", SearchKind::Text).await.unwrap();
        assert_eq!(
            a.iter().map(|m| (&m.path, m.line_start)).collect::<Vec<_>>(),
            b.iter().map(|m| (&m.path, m.line_start)).collect::<Vec<_>>()
        );
    }
}
