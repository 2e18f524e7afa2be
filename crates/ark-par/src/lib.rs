//! ark-par - AST definition and predictive parser for ArkScript.
//!
//! The parser consumes the token stream produced by `ark-lex` and builds a
//! [`Node`] tree rooted at a synthetic `(begin …)` list. Keyword forms are
//! shape-checked at parse time; top-level imports are accumulated into
//! [`Import`] descriptors for the import solver.

mod import;
mod node;
mod parser;

pub use import::Import;
pub use node::{Node, NodeKind};
pub use parser::Parser;
