//! The immutable program image shared by every execution context.

use ark_ir::{Program, TableValue, Word};
use ark_util::RuntimeError;

/// Symbols, constants and code pages. Built once (from the compiler's
/// output or a bytecode container) and never mutated at runtime, so
/// contexts can share it behind an `Arc` without locking.
#[derive(Debug)]
pub struct State {
    pub symbols: Vec<String>,
    pub values: Vec<TableValue>,
    pub pages: Vec<Vec<Word>>,
}

impl State {
    /// Wrap a linked program.
    pub fn from_program(program: Program) -> Self {
        Self {
            symbols: program.symbols,
            values: program.values,
            pages: program.pages,
        }
    }

    /// Decode and verify a bytecode container.
    pub fn from_bytecode(bytes: &[u8]) -> Result<Self, RuntimeError> {
        let file = ark_bc::read(bytes).map_err(|e| RuntimeError::Module(e.to_string()))?;
        Ok(Self::from_program(file.program))
    }

    /// Name of a symbol id, for error messages.
    pub fn symbol_name(&self, id: u16) -> &str {
        self.symbols
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    /// Reverse lookup, used by `hasField`.
    pub fn symbol_id(&self, name: &str) -> Option<u16> {
        self.symbols.iter().position(|s| s == name).map(|i| i as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ir::Opcode;

    fn sample() -> State {
        State {
            symbols: vec!["a".into(), "b".into()],
            values: vec![TableValue::Number(1.0)],
            pages: vec![vec![Word::new(Opcode::Halt, 0)]],
        }
    }

    #[test]
    fn test_symbol_lookups() {
        let state = sample();
        assert_eq!(state.symbol_name(1), "b");
        assert_eq!(state.symbol_name(9), "<unknown>");
        assert_eq!(state.symbol_id("a"), Some(0));
        assert_eq!(state.symbol_id("zz"), None);
    }

    #[test]
    fn test_from_bytecode_rejects_garbage() {
        let err = State::from_bytecode(b"not bytecode").unwrap_err();
        assert!(matches!(err, RuntimeError::Module(_)));
    }
}
