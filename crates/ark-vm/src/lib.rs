//! ark-vm - The ArkScript stack-based virtual machine.
//!
//! The VM executes the pages decoded from a bytecode container (or handed
//! over directly by the compiler) in one or more [`ExecutionContext`]s.
//! The program image ([`State`]) is immutable after loading and shared
//! between contexts; the `async`/`await` builtins spawn secondary
//! contexts on native threads.

mod builtins;
mod context;
mod future;
mod scope;
mod state;
mod typecheck;
mod value;
mod vm;

pub use builtins::{registry, Builtin, BuiltinFn};
pub use context::{ExecutionContext, VM_STACK_SIZE};
pub use future::Future;
pub use scope::Scope;
pub use state::State;
pub use typecheck::{check_contracts, contract_error, Contract, Typedef, ValueType};
pub use value::{Closure, ScopeRef, UserData, Value};
pub use vm::Vm;
