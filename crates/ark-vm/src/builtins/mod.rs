//! The builtins registry.
//!
//! A fixed table mapping names to native handlers (or constant values for
//! `true`/`false`/`nil` and the math constants). The position of an entry
//! is the immediate argument of the `BUILTIN` instruction, so the order
//! here must stay aligned with `ark_util::lang::BUILTIN_NAMES`; a test
//! enforces it. Native plugins append to the same table at registration
//! time.

mod concurrency;
mod io;
mod list;
mod math;
mod string;
mod system;

use ark_util::RuntimeError;

use crate::value::Value;
use crate::vm::Vm;

/// Native handler signature: mutable argument window plus the VM handle.
pub type BuiltinFn = fn(&mut Vec<Value>, &Vm) -> Result<Value, RuntimeError>;

/// One registry entry.
#[derive(Clone)]
pub enum Builtin {
    /// A plain value pushed by `BUILTIN idx`.
    Const(Value),
    /// A native function; `BUILTIN idx` pushes a callable reference.
    Fn(BuiltinFn),
}

/// Build the builtin table, in `BUILTIN_NAMES` order.
pub fn registry() -> Vec<(&'static str, Builtin)> {
    use std::f64::consts;

    vec![
        // value constants
        ("false", Builtin::Const(Value::False)),
        ("true", Builtin::Const(Value::True)),
        ("nil", Builtin::Const(Value::Nil)),
        // list
        ("list:reverse", Builtin::Fn(list::reverse)),
        ("list:find", Builtin::Fn(list::find)),
        ("list:removeAt", Builtin::Fn(list::remove_at)),
        ("list:slice", Builtin::Fn(list::slice)),
        ("list:sort", Builtin::Fn(list::sort)),
        ("list:fill", Builtin::Fn(list::fill)),
        ("list:setAt", Builtin::Fn(list::set_at)),
        // io
        ("print", Builtin::Fn(io::print)),
        ("puts", Builtin::Fn(io::puts)),
        ("input", Builtin::Fn(io::input)),
        ("io:writeFile", Builtin::Fn(io::write_file)),
        ("io:readFile", Builtin::Fn(io::read_file)),
        ("io:fileExists?", Builtin::Fn(io::file_exists)),
        ("io:listFiles", Builtin::Fn(io::list_files)),
        ("io:isDir?", Builtin::Fn(io::is_directory)),
        ("io:makeDir", Builtin::Fn(io::make_dir)),
        ("io:removeFiles", Builtin::Fn(io::remove_files)),
        // time
        ("time", Builtin::Fn(system::time)),
        // system
        ("sys:exec", Builtin::Fn(system::exec)),
        ("sleep", Builtin::Fn(system::sleep)),
        ("sys:exit", Builtin::Fn(system::exit)),
        // string
        ("str:format", Builtin::Fn(string::format)),
        ("str:find", Builtin::Fn(string::find)),
        ("str:removeAt", Builtin::Fn(string::remove_at)),
        ("str:ord", Builtin::Fn(string::ord)),
        ("str:chr", Builtin::Fn(string::chr)),
        // math
        ("math:exp", Builtin::Fn(math::exp)),
        ("math:ln", Builtin::Fn(math::ln)),
        ("math:ceil", Builtin::Fn(math::ceil)),
        ("math:floor", Builtin::Fn(math::floor)),
        ("math:round", Builtin::Fn(math::round)),
        ("math:NaN?", Builtin::Fn(math::is_nan)),
        ("math:Inf?", Builtin::Fn(math::is_inf)),
        ("math:cos", Builtin::Fn(math::cos)),
        ("math:sin", Builtin::Fn(math::sin)),
        ("math:tan", Builtin::Fn(math::tan)),
        ("math:arccos", Builtin::Fn(math::arccos)),
        ("math:arcsin", Builtin::Fn(math::arcsin)),
        ("math:arctan", Builtin::Fn(math::arctan)),
        ("math:pi", Builtin::Const(Value::Number(consts::PI))),
        ("math:e", Builtin::Const(Value::Number(consts::E))),
        ("math:tau", Builtin::Const(Value::Number(consts::TAU))),
        ("math:Inf", Builtin::Const(Value::Number(f64::INFINITY))),
        ("math:NaN", Builtin::Const(Value::Number(f64::NAN))),
        // async
        ("async", Builtin::Fn(concurrency::run_async)),
        ("await", Builtin::Fn(concurrency::run_await)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_aligned_with_the_name_table() {
        let registry = registry();
        assert_eq!(registry.len(), ark_util::lang::BUILTIN_NAMES.len());
        for ((name, _), expected) in registry.iter().zip(ark_util::lang::BUILTIN_NAMES) {
            assert_eq!(*name, expected);
        }
    }

    #[test]
    fn test_constants() {
        let registry = registry();
        let find = |name: &str| {
            registry
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, b)| b)
                .unwrap()
        };
        assert!(matches!(find("true"), Builtin::Const(Value::True)));
        assert!(matches!(find("nil"), Builtin::Const(Value::Nil)));
        assert!(matches!(find("math:pi"), Builtin::Const(Value::Number(_))));
        assert!(matches!(find("print"), Builtin::Fn(_)));
    }
}
