//! The `async`/`await` builtins.
//!
//! `async` clones the VM handle (the program image stays shared and
//! read-only), spawns a native thread with a fresh secondary context and
//! runs the callable to completion there. `await` blocks on the result
//! and re-raises any error in the awaiting context.

use ark_util::RuntimeError;

use crate::context::ExecutionContext;
use crate::future::Future;
use crate::typecheck::{check_contracts, contract_error, Contract, Typedef, ValueType};
use crate::value::{UserData, Value};
use crate::vm::Vm;

/// `(async callable args…)`
pub fn run_async(args: &mut Vec<Value>, vm: &Vm) -> Result<Value, RuntimeError> {
    let contracts = [Contract::new(vec![
        Typedef::new("function", ValueType::Function),
        Typedef::variadic("args", ValueType::Any),
    ])];
    if !check_contracts(&contracts, args) {
        return Err(contract_error("async", &contracts, args));
    }

    let callee = args.remove(0);
    let call_args = std::mem::take(args);
    let vm = vm.clone();
    let handle = std::thread::spawn(move || {
        let mut ctx = ExecutionContext::new(false);
        vm.call_value(&mut ctx, callee, call_args)
    });
    Ok(Value::User(UserData::new("Future", Future::new(handle))))
}

/// `(await future)`
pub fn run_await(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let future = match args.first() {
        Some(Value::User(user)) if user.is::<Future>() => {
            user.downcast::<Future>().expect("checked just above")
        }
        _ => {
            let contracts = [Contract::new(vec![Typedef::new("future", ValueType::User)])];
            return Err(contract_error("await", &contracts, args));
        }
    };
    future.resolve()
}
