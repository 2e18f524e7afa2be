//! Error types shared by the compiler passes and the virtual machine.
//!
//! Every pass returns `Result<_, CodeError>`; the VM and the builtins
//! return `Result<_, RuntimeError>`. The driver turns both into exit codes
//! and renders compile-time errors with a source excerpt.

use thiserror::Error;

use crate::source_map::SourceMap;
use crate::span::Span;

/// A compile-time error raised by the parser, the macro processor, the
/// name-resolution pass or the compiler.
///
/// Carries the position of the offending node so the driver can point at
/// the source line.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CodeError {
    /// Human readable description.
    pub message: String,
    /// Position of the offending expression.
    pub span: Span,
    /// Textual representation of the offending expression, when available.
    pub expr: Option<String>,
}

impl CodeError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            expr: None,
        }
    }

    pub fn with_expr(mut self, expr: impl Into<String>) -> Self {
        self.expr = Some(expr.into());
        self
    }

    /// Render the error with file, position and a source excerpt.
    pub fn render(&self, sources: &SourceMap) -> String {
        let mut out = String::new();
        if self.span.is_dummy() {
            out.push_str(&format!("error: {}\n", self.message));
        } else {
            out.push_str(&format!(
                "error: {}\n  --> {}:{}:{}\n",
                self.message,
                sources.name(self.span.file_id).display(),
                self.span.line,
                self.span.column,
            ));
            out.push_str(&sources.excerpt(self.span));
        }
        if let Some(expr) = &self.expr {
            out.push_str(&format!("  in expression: {}\n", expr));
        }
        out
    }
}

/// Runtime error taxonomy.
///
/// The kind names are part of the user-visible output: every message is
/// prefixed with the kind when printed by the VM or the driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// Operator or builtin applied to a value of the wrong type.
    #[error("TypeError: {0}")]
    Type(String),

    /// List or string access out of range.
    #[error("IndexError: {0}")]
    Index(String),

    /// Call with the wrong number of arguments.
    #[error("ArityError: {0}")]
    Arity(String),

    /// Symbol not bound at runtime.
    #[error("ScopeError: {0}")]
    Scope(String),

    /// Import or native module failure.
    #[error("ModuleError: {0}")]
    Module(String),

    /// Arithmetic division by zero.
    #[error("DivisionByZero: {0}")]
    DivisionByZero(String),

    /// Explicit `(assert cond message)` failure.
    #[error("AssertionFailed: {0}")]
    AssertionFailed(String),

    /// VM invariant breach: stack overflow, broken bytecode, invalid page.
    #[error("VMError: {0}")]
    Vm(String),
}

impl RuntimeError {
    /// Short kind name, used by tests and by the `await` re-raise path.
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::Type(_) => "TypeError",
            RuntimeError::Index(_) => "IndexError",
            RuntimeError::Arity(_) => "ArityError",
            RuntimeError::Scope(_) => "ScopeError",
            RuntimeError::Module(_) => "ModuleError",
            RuntimeError::DivisionByZero(_) => "DivisionByZero",
            RuntimeError::AssertionFailed(_) => "AssertionFailed",
            RuntimeError::Vm(_) => "VMError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    #[test]
    fn test_code_error_render() {
        let mut sources = SourceMap::new();
        let id = sources.add_file("test.ark", "(let x)\n");
        let err = CodeError::new("missing initializer", Span::new(id, 1, 1)).with_expr("(let x)");
        let rendered = err.render(&sources);
        assert!(rendered.contains("missing initializer"));
        assert!(rendered.contains("test.ark:1:1"));
        assert!(rendered.contains("(let x)"));
    }

    #[test]
    fn test_runtime_error_display_carries_kind() {
        let err = RuntimeError::DivisionByZero("10 / 0".into());
        assert_eq!(err.to_string(), "DivisionByZero: 10 / 0");
        assert_eq!(err.kind(), "DivisionByZero");
    }

    #[test]
    fn test_runtime_error_kinds() {
        assert_eq!(RuntimeError::Type(String::new()).kind(), "TypeError");
        assert_eq!(RuntimeError::Vm(String::new()).kind(), "VMError");
        assert_eq!(RuntimeError::Arity(String::new()).kind(), "ArityError");
    }
}
