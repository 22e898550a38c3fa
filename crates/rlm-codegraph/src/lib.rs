//! rlm-codegraph: source parsing and symbol extraction
//!
//! Tree-sitter backed multi-language parsing and symbol extraction. Backs
//! the navigation tools' symbol-kind search and outline/info operations.
//! Carries no persistence or file-watching — the corpus a session sees is
//! an immutable, in-memory or lazily-read `CodeSource` assembled once per
//! session by the engine crate.

pub mod lang;
pub mod parser;
pub mod symbols;

pub use lang::python::PythonExtractor;
pub use lang::rust::RustExtractor;
pub use parser::{Language, ParseError, ParsedFile, Parser};
pub use symbols::{Symbol, SymbolKind, Visibility};
