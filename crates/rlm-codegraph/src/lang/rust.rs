//! Rust-specific symbol extraction.
//!
//! Uses tree-sitter queries to extract symbols from Rust source code.

use std::sync::OnceLock;

use streaming_iterator::StreamingIterator;

use crate::parser::byte_to_char_offset;
use crate::symbols::{Symbol, SymbolKind, Visibility};

/// Character-offset span for a node, converted from its byte-offset span.
fn node_char_span(node: tree_sitter::Node, source: &str) -> (usize, usize) {
    (
        byte_to_char_offset(source, node.start_byte()),
        byte_to_char_offset(source, node.end_byte()),
    )
}

/// Compiled queries for Rust symbol extraction.
struct RustQueries {
    symbols: tree_sitter::Query,
}

impl RustQueries {
    fn new(language: tree_sitter::Language) -> Result<Self, String> {
        let symbols = tree_sitter::Query::new(&language, SYMBOLS_QUERY)
            .map_err(|e| format!("Failed to compile symbols query: {e}"))?;
        Ok(Self { symbols })
    }
}

static RUST_QUERIES: OnceLock<Result<RustQueries, String>> = OnceLock::new();

fn get_queries() -> Result<&'static RustQueries, &'static str> {
    RUST_QUERIES
        .get_or_init(|| {
            let language = tree_sitter_rust::LANGUAGE.into();
            RustQueries::new(language)
        })
        .as_ref()
        .map_err(|e| e.as_str())
}

/// Tree-sitter query for extracting Rust symbols.
const SYMBOLS_QUERY: &str = r#"
; Structs
(struct_item
  (visibility_modifier)? @visibility
  name: (type_identifier) @name) @struct

; Enums
(enum_item
  (visibility_modifier)? @visibility
  name: (type_identifier) @name) @enum

; Functions
(function_item
  (visibility_modifier)? @visibility
  name: (identifier) @name
  parameters: (parameters) @params
  return_type: (_)? @return) @function

; Traits
(trait_item
  (visibility_modifier)? @visibility
  name: (type_identifier) @name) @trait

; Impl blocks
(impl_item
  trait: (type_identifier)? @trait_name
  type: (type_identifier) @type_name) @impl

; Modules
(mod_item
  (visibility_modifier)? @visibility
  name: (identifier) @name) @module

; Constants
(const_item
  (visibility_modifier)? @visibility
  name: (identifier) @name) @constant

; Statics
(static_item
  (visibility_modifier)? @visibility
  name: (identifier) @name) @static

; Type aliases
(type_item
  (visibility_modifier)? @visibility
  name: (type_identifier) @name) @type_alias

; Macro definitions
(macro_definition
  name: (identifier) @name) @macro
"#;

/// Rust language extractor.
pub struct RustExtractor;

impl RustExtractor {
    /// Extract symbols from a parsed Rust syntax tree.
    pub fn extract_symbols(
        tree: &tree_sitter::Tree,
        source: &str,
        file_path: &str,
    ) -> Result<Vec<Symbol>, String> {
        let queries = get_queries()?;
        let mut cursor = tree_sitter::QueryCursor::new();
        let source_bytes = source.as_bytes();

        let mut symbols = Vec::new();
        let mut matches = cursor.matches(&queries.symbols, tree.root_node(), source_bytes);

        while let Some(match_) = matches.next() {
            let mut name = None;
            let mut visibility = None;
            let mut signature_parts = Vec::new();
            let mut kind = None;
            let mut start_line = 0;
            let mut end_line = 0;
            let mut char_span = None;

            for capture in match_.captures {
                let capture_name = queries.symbols.capture_names()[capture.index as usize];
                let node = capture.node;
                let text = node.utf8_text(source_bytes).unwrap_or("");

                match capture_name {
                    "name" | "type_name" => {
                        name = Some(text.to_string());
                    }
                    "visibility" => {
                        visibility = Some(parse_visibility(text));
                    }
                    "params" => {
                        signature_parts.push(text.to_string());
                    }
                    "return" => {
                        signature_parts.push(format!("-> {text}"));
                    }
                    "struct" => {
                        kind = Some(SymbolKind::Struct);
                        start_line = node.start_position().row + 1;
                        end_line = node.end_position().row + 1;
                        char_span = Some(node_char_span(node, source));
                    }
                    "enum" => {
                        kind = Some(SymbolKind::Enum);
                        start_line = node.start_position().row + 1;
                        end_line = node.end_position().row + 1;
                        char_span = Some(node_char_span(node, source));
                    }
                    "function" => {
                        kind = Some(SymbolKind::Function);
                        start_line = node.start_position().row + 1;
                        end_line = node.end_position().row + 1;
                        char_span = Some(node_char_span(node, source));
                    }
                    "trait" => {
                        kind = Some(SymbolKind::Interface);
                        start_line = node.start_position().row + 1;
                        end_line = node.end_position().row + 1;
                        char_span = Some(node_char_span(node, source));
                    }
                    "impl" => {
                        kind = Some(SymbolKind::Type);
                        start_line = node.start_position().row + 1;
                        end_line = node.end_position().row + 1;
                        char_span = Some(node_char_span(node, source));
                    }
                    "module" => {
                        kind = Some(SymbolKind::Module);
                        start_line = node.start_position().row + 1;
                        end_line = node.end_position().row + 1;
                        char_span = Some(node_char_span(node, source));
                    }
                    "constant" | "static" => {
                        kind = Some(SymbolKind::Variable);
                        start_line = node.start_position().row + 1;
                        end_line = node.end_position().row + 1;
                        char_span = Some(node_char_span(node, source));
                    }
                    "type_alias" => {
                        kind = Some(SymbolKind::Type);
                        start_line = node.start_position().row + 1;
                        end_line = node.end_position().row + 1;
                        char_span = Some(node_char_span(node, source));
                    }
                    "macro" => {
                        kind = Some(SymbolKind::Macro);
                        start_line = node.start_position().row + 1;
                        end_line = node.end_position().row + 1;
                        char_span = Some(node_char_span(node, source));
                    }
                    _ => {}
                }
            }

            if let (Some(name), Some(kind)) = (name, kind) {
                // Extract doc comments by looking at siblings before the symbol
                let doc_comment = extract_doc_comment(tree, start_line, source);

                let signature = if signature_parts.is_empty() {
                    None
                } else {
                    Some(signature_parts.join(" "))
                };

                symbols.push(Symbol {
                    name,
                    kind,
                    file_path: file_path.to_string(),
                    start_line,
                    end_line,
                    signature,
                    qualified_name: None,
                    doc_comment,
                    visibility: visibility.unwrap_or(Visibility::Private),
                    char_span,
                });
            }
        }

        Ok(symbols)
    }

}

/// Parse a Rust visibility modifier into our Visibility enum.
fn parse_visibility(vis_text: &str) -> Visibility {
    let vis = vis_text.trim();
    if vis == "pub" {
        Visibility::Public
    } else if vis.starts_with("pub(crate)") {
        Visibility::Crate
    } else if vis.starts_with("pub(super)") {
        Visibility::Restricted("super".to_string())
    } else if vis.starts_with("pub(in") {
        // Extract the path from pub(in path)
        let path = vis
            .strip_prefix("pub(in ")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or("unknown");
        Visibility::Restricted(path.to_string())
    } else if vis.starts_with("pub(") {
        // pub(self) or similar
        let inner = vis
            .strip_prefix("pub(")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or("self");
        Visibility::Restricted(inner.to_string())
    } else {
        Visibility::Private
    }
}

/// Extract doc comments preceding a symbol by looking at source lines.
fn extract_doc_comment(
    tree: &tree_sitter::Tree,
    symbol_line: usize,
    source: &str,
) -> Option<String> {
    // Look for comment nodes that precede the symbol
    let lines: Vec<&str> = source.lines().collect();
    let mut doc_lines = Vec::new();

    // Walk backwards from the symbol line to find doc comments
    let mut line_idx = symbol_line.saturating_sub(2); // 0-indexed, start from line before
    while line_idx > 0 {
        if line_idx >= lines.len() {
            break;
        }
        let line = lines[line_idx].trim();

        if line.starts_with("///") {
            // Regular doc comment
            let content = line.strip_prefix("///").unwrap_or("").trim();
            doc_lines.push(content.to_string());
        } else if line.starts_with("//!") {
            // Inner doc comment (for modules)
            let content = line.strip_prefix("//!").unwrap_or("").trim();
            doc_lines.push(content.to_string());
        } else if line.is_empty() || line.starts_with("#[") {
            // Allow empty lines and attributes between doc comments
            if !doc_lines.is_empty() && line.is_empty() {
                // Stop if we hit an empty line after finding some docs
                break;
            }
        } else {
            // Hit something else, stop looking
            break;
        }

        if line_idx == 0 {
            break;
        }
        line_idx -= 1;
    }

    if doc_lines.is_empty() {
        // Also check for inner doc comments in the tree
        let root = tree.root_node();
        let mut cursor = root.walk();

        // Look for line_comment or block_comment at the beginning
        if cursor.goto_first_child() {
            loop {
                let node = cursor.node();
                if node.kind() == "line_comment" {
                    let text = node.utf8_text(source.as_bytes()).unwrap_or("").trim();
                    if text.starts_with("//!") {
                        let content = text.strip_prefix("//!").unwrap_or("").trim();
                        doc_lines.push(content.to_string());
                    }
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
    }

    if doc_lines.is_empty() {
        None
    } else {
        doc_lines.reverse();
        Some(doc_lines.join("\n"))
    }
}
