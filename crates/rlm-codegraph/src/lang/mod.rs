//! Language-specific extractors.
//!
//! Each language module provides symbol extraction logic over parsed
//! syntax trees.

pub mod python;
pub mod rust;

pub use python::PythonExtractor;
pub use rust::RustExtractor;
