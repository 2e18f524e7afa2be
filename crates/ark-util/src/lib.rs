//! ark-util - Shared infrastructure for the ArkScript compiler and VM.
//!
//! This crate hosts everything the other crates agree on: source positions
//! and the source map, the compile-time and runtime error types, the closed
//! language tables (keywords, operators, builtin names), and the
//! nearest-name suggestion helper used by diagnostics.

pub mod error;
pub mod lang;
pub mod source_map;
pub mod span;
pub mod suggestion;

pub use error::{CodeError, RuntimeError};
pub use source_map::{SourceFile, SourceMap};
pub use span::{FileId, Span};
