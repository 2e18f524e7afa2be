//! ark-sem - AST-to-AST passes running between the parser and the compiler.
//!
//! In pipeline order:
//! 1. [`ImportSolver`] resolves and inlines imported modules;
//! 2. [`MacroProcessor`] expands compile-time macros;
//! 3. [`Optimizer`] drops unused top-level bindings;
//! 4. [`NameResolution`] rejects unbound names and mutability violations.

mod imports;
mod macros;
mod optimizer;
mod resolver;

pub use imports::{ImportSolver, SolvedAst};
pub use macros::MacroProcessor;
pub use optimizer::Optimizer;
pub use resolver::NameResolution;
