//! Futures: values representing in-flight async computations.

use std::thread::JoinHandle;

use parking_lot::Mutex;

use ark_util::RuntimeError;

use crate::value::Value;

/// A join-handle-backed future. Created by the `async` builtin, resolved
/// exactly once by `await`; the secondary context lives on the spawned
/// thread and is disposed when it finishes.
pub struct Future {
    handle: Mutex<Option<JoinHandle<Result<Value, RuntimeError>>>>,
}

impl Future {
    pub fn new(handle: JoinHandle<Result<Value, RuntimeError>>) -> Self {
        Self {
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Block until the computation finishes. Errors raised inside the
    /// async body are re-raised here, in the awaiting context.
    pub fn resolve(&self) -> Result<Value, RuntimeError> {
        let handle = self
            .handle
            .lock()
            .take()
            .ok_or_else(|| RuntimeError::Type("future already awaited".to_string()))?;
        handle
            .join()
            .map_err(|_| RuntimeError::Vm("async task panicked".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_returns_thread_result() {
        let future = Future::new(std::thread::spawn(|| Ok(Value::Number(42.0))));
        assert_eq!(future.resolve().unwrap(), Value::Number(42.0));
    }

    #[test]
    fn test_resolve_twice_is_an_error() {
        let future = Future::new(std::thread::spawn(|| Ok(Value::Nil)));
        future.resolve().unwrap();
        assert!(future.resolve().is_err());
    }

    #[test]
    fn test_errors_are_reraised_on_resolve() {
        let future = Future::new(std::thread::spawn(|| {
            Err(RuntimeError::DivisionByZero("in async task".into()))
        }));
        assert!(matches!(
            future.resolve(),
            Err(RuntimeError::DivisionByZero(_))
        ));
    }
}
