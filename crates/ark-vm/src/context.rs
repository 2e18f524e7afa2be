//! Per-thread VM state.

use std::sync::Arc;

use parking_lot::Mutex;

use ark_util::RuntimeError;

use crate::scope::Scope;
use crate::value::{ScopeRef, Value};

/// Fixed operand stack capacity, in value slots.
pub const VM_STACK_SIZE: usize = 8192;

/// Everything one thread of execution owns: instruction pointer, page
/// pointer, operand stack, scope chain and call bookkeeping. The primary
/// context is created by [`Vm::run`](crate::Vm::run); secondary contexts
/// are spawned by the `async` builtin and share the program image only.
pub struct ExecutionContext {
    /// True for the context created first.
    pub primary: bool,
    /// Instruction pointer (index into the current page).
    pub ip: usize,
    /// Page pointer.
    pub pp: u16,
    /// Frame count: number of in-flight calls.
    pub fc: u16,
    /// Last symbol id touched, for error messages.
    pub last_symbol: u16,
    /// Operand stack; the stack pointer is its length.
    pub stack: Vec<Value>,
    /// Number of scopes to drop per frame on `RET`.
    pub scope_count_to_delete: Vec<u8>,
    /// Scope snapshot waiting for the next closure creation.
    pub saved_scope: Option<ScopeRef>,
    /// The scope chain, innermost last.
    pub locals: Vec<ScopeRef>,
}

impl ExecutionContext {
    pub fn new(primary: bool) -> Self {
        let mut ctx = Self {
            primary,
            ip: 0,
            pp: 0,
            fc: 0,
            last_symbol: u16::MAX,
            stack: Vec::with_capacity(256),
            scope_count_to_delete: vec![0],
            saved_scope: None,
            locals: Vec::new(),
        };
        // the global scope exists from the start
        ctx.locals.push(Arc::new(Mutex::new(Scope::new())));
        ctx
    }

    /// Push a value, failing on stack exhaustion.
    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= VM_STACK_SIZE {
            return Err(RuntimeError::Vm(format!(
                "stack overflow ({VM_STACK_SIZE} slots)"
            )));
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop a value, failing on underflow.
    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::Vm("stack underflow".to_string()))
    }

    /// Open a fresh innermost scope.
    pub fn push_scope(&mut self) -> ScopeRef {
        let scope: ScopeRef = Arc::new(Mutex::new(Scope::new()));
        self.locals.push(scope.clone());
        scope
    }

    /// The innermost scope.
    pub fn current_scope(&self) -> &ScopeRef {
        self.locals.last().expect("the global scope always exists")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_has_global_scope() {
        let ctx = ExecutionContext::new(true);
        assert_eq!(ctx.locals.len(), 1);
        assert_eq!(ctx.fc, 0);
        assert!(ctx.primary);
    }

    #[test]
    fn test_stack_overflow_is_detected() {
        let mut ctx = ExecutionContext::new(true);
        for _ in 0..VM_STACK_SIZE {
            ctx.push(Value::Nil).unwrap();
        }
        let err = ctx.push(Value::Nil).unwrap_err();
        assert!(matches!(err, RuntimeError::Vm(_)));
    }

    #[test]
    fn test_stack_underflow_is_detected() {
        let mut ctx = ExecutionContext::new(true);
        assert!(matches!(ctx.pop(), Err(RuntimeError::Vm(_))));
    }
}
