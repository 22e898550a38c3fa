//! Python-specific symbol extraction using tree-sitter.
//!
//! Extracts classes, functions, and methods from Python source code.

use std::sync::OnceLock;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Query, Tree};

use crate::parser::byte_to_char_offset;
use crate::symbols::{Symbol, SymbolKind, Visibility};

/// Character-offset span for a node, converted from its byte-offset span.
fn node_char_span(node: &tree_sitter::Node, source: &str) -> (usize, usize) {
    (
        byte_to_char_offset(source, node.start_byte()),
        byte_to_char_offset(source, node.end_byte()),
    )
}

/// Compiled tree-sitter queries for Python.
struct PythonQueries {
    symbols: Query,
}

static PYTHON_QUERIES: OnceLock<PythonQueries> = OnceLock::new();

fn get_queries() -> &'static PythonQueries {
    PYTHON_QUERIES.get_or_init(|| {
        let language = tree_sitter_python::LANGUAGE.into();

        let symbols_query = Query::new(
            &language,
            r#"
            ;; Classes
            (class_definition
              name: (identifier) @class_name
              body: (block) @class_body) @class

            ;; Top-level functions
            (module
              (function_definition
                name: (identifier) @func_name
                parameters: (parameters) @func_params
                body: (block) @func_body) @function)

            ;; Methods (functions inside class body)
            (class_definition
              body: (block
                (function_definition
                  name: (identifier) @method_name
                  parameters: (parameters) @method_params
                  body: (block) @method_body) @method))

            ;; Decorated definitions
            (decorated_definition
              definition: (function_definition
                name: (identifier) @decorated_func_name)) @decorated_func

            (decorated_definition
              definition: (class_definition
                name: (identifier) @decorated_class_name)) @decorated_class
            "#,
        )
        .expect("Invalid Python symbols query");

        PythonQueries {
            symbols: symbols_query,
        }
    })
}

/// Python-specific symbol extractor.
pub struct PythonExtractor;

impl PythonExtractor {
    /// Extract symbols from a Python source file.
    pub fn extract_symbols(
        tree: &Tree,
        source: &str,
        file_path: &str,
    ) -> Result<Vec<Symbol>, String> {
        let queries = get_queries();
        let source_bytes = source.as_bytes();
        let mut symbols = Vec::new();

        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(&queries.symbols, tree.root_node(), source_bytes);

        while let Some(match_) = matches.next() {
            for capture in match_.captures {
                let node = capture.node;
                let capture_name = queries.symbols.capture_names()[capture.index as usize];

                match capture_name {
                    "class" => {
                        if let Some(name_node) = node.child_by_field_name("name") {
                            let name = Self::node_text(&name_node, source);
                            let mut symbol = Symbol::new(
                                name.clone(),
                                SymbolKind::Class,
                                file_path,
                                node.start_position().row + 1,
                                node.end_position().row + 1,
                            )
                            .with_char_span(node_char_span(&node, source));

                            // Extract docstring
                            if let Some(body) = node.child_by_field_name("body") {
                                if let Some(docstring) = Self::extract_docstring(&body, source) {
                                    symbol = symbol.with_doc_comment(docstring);
                                }
                            }

                            // Visibility based on naming convention
                            symbol = symbol.with_visibility(Self::visibility_from_name(&name));

                            symbols.push(symbol);
                        }
                    }
                    "function" => {
                        if let Some(name_node) = node.child_by_field_name("name") {
                            let name = Self::node_text(&name_node, source);
                            let mut symbol = Symbol::new(
                                name.clone(),
                                SymbolKind::Function,
                                file_path,
                                node.start_position().row + 1,
                                node.end_position().row + 1,
                            )
                            .with_char_span(node_char_span(&node, source));

                            // Extract signature
                            if let Some(params) = node.child_by_field_name("parameters") {
                                let params_text = Self::node_text(&params, source);
                                let return_type = node
                                    .child_by_field_name("return_type")
                                    .map(|n| Self::node_text(&n, source));

                                let sig = match return_type {
                                    Some(ret) => format!("def {}{} -> {}", name, params_text, ret),
                                    None => format!("def {}{}", name, params_text),
                                };
                                symbol = symbol.with_signature(sig);
                            }

                            // Extract docstring
                            if let Some(body) = node.child_by_field_name("body") {
                                if let Some(docstring) = Self::extract_docstring(&body, source) {
                                    symbol = symbol.with_doc_comment(docstring);
                                }
                            }

                            symbol = symbol.with_visibility(Self::visibility_from_name(&name));
                            symbols.push(symbol);
                        }
                    }
                    "method" => {
                        if let Some(name_node) = node.child_by_field_name("name") {
                            let name = Self::node_text(&name_node, source);
                            let mut symbol = Symbol::new(
                                name.clone(),
                                SymbolKind::Method,
                                file_path,
                                node.start_position().row + 1,
                                node.end_position().row + 1,
                            )
                            .with_char_span(node_char_span(&node, source));

                            // Extract signature
                            if let Some(params) = node.child_by_field_name("parameters") {
                                let params_text = Self::node_text(&params, source);
                                let sig = format!("def {}{}", name, params_text);
                                symbol = symbol.with_signature(sig);
                            }

                            // Extract docstring
                            if let Some(body) = node.child_by_field_name("body") {
                                if let Some(docstring) = Self::extract_docstring(&body, source) {
                                    symbol = symbol.with_doc_comment(docstring);
                                }
                            }

                            symbol = symbol.with_visibility(Self::visibility_from_name(&name));
                            symbols.push(symbol);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(symbols)
    }

    /// Get text content of a node.
    fn node_text(node: &tree_sitter::Node, source: &str) -> String {
        source[node.byte_range()].to_string()
    }

    /// Extract docstring from a block (first string literal).
    fn extract_docstring(block: &tree_sitter::Node, source: &str) -> Option<String> {
        let mut cursor = block.walk();
        cursor.goto_first_child();

        // Look for expression_statement containing a string
        loop {
            let node = cursor.node();
            if node.kind() == "expression_statement" {
                if let Some(child) = node.child(0) {
                    if child.kind() == "string" {
                        let text = Self::node_text(&child, source);
                        // Remove quotes (could be ', ", ''', or """)
                        let trimmed = text
                            .trim_start_matches("\"\"\"")
                            .trim_end_matches("\"\"\"")
                            .trim_start_matches("'''")
                            .trim_end_matches("'''")
                            .trim_start_matches('"')
                            .trim_end_matches('"')
                            .trim_start_matches('\'')
                            .trim_end_matches('\'')
                            .trim();
                        return Some(trimmed.to_string());
                    }
                }
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        None
    }

    /// Determine visibility from Python naming convention.
    fn visibility_from_name(name: &str) -> Visibility {
        if name.starts_with("__") && !name.ends_with("__") {
            // Name mangled (strongly private)
            Visibility::Private
        } else if name.starts_with('_') && !name.starts_with("__") {
            // Single underscore (conventionally private)
            Visibility::Private
        } else {
            Visibility::Public
        }
    }
}
