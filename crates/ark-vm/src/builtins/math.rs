//! Math builtins. All take a single number.

use ark_util::RuntimeError;

use crate::value::Value;
use crate::vm::Vm;

fn unary(args: &[Value], who: &str, f: fn(f64) -> Value) -> Result<Value, RuntimeError> {
    match args {
        [Value::Number(n)] => Ok(f(*n)),
        [other] => Err(RuntimeError::Type(format!(
            "{who} expects a Number, got {}",
            other.type_name()
        ))),
        _ => Err(RuntimeError::Arity(format!(
            "{who} expects 1 argument, got {}",
            args.len()
        ))),
    }
}

pub fn exp(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:exp", |n| Value::Number(n.exp()))
}

pub fn ln(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:ln", |n| Value::Number(n.ln()))
}

pub fn ceil(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:ceil", |n| Value::Number(n.ceil()))
}

pub fn floor(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:floor", |n| Value::Number(n.floor()))
}

pub fn round(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:round", |n| Value::Number(n.round()))
}

pub fn is_nan(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:NaN?", |n| Value::boolean(n.is_nan()))
}

pub fn is_inf(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:Inf?", |n| Value::boolean(n.is_infinite()))
}

pub fn cos(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:cos", |n| Value::Number(n.cos()))
}

pub fn sin(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:sin", |n| Value::Number(n.sin()))
}

pub fn tan(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:tan", |n| Value::Number(n.tan()))
}

pub fn arccos(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:arccos", |n| Value::Number(n.acos()))
}

pub fn arcsin(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:arcsin", |n| Value::Number(n.asin()))
}

pub fn arctan(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    unary(args, "math:arctan", |n| Value::Number(n.atan()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;

    fn vm() -> Vm {
        Vm::new(State {
            symbols: vec![],
            values: vec![],
            pages: vec![vec![]],
        })
    }

    #[test]
    fn test_rounding() {
        let vm = vm();
        assert_eq!(
            ceil(&mut vec![Value::Number(1.2)], &vm).unwrap(),
            Value::Number(2.0)
        );
        assert_eq!(
            floor(&mut vec![Value::Number(1.8)], &vm).unwrap(),
            Value::Number(1.0)
        );
        assert_eq!(
            round(&mut vec![Value::Number(1.5)], &vm).unwrap(),
            Value::Number(2.0)
        );
    }

    #[test]
    fn test_nan_inf_predicates() {
        let vm = vm();
        assert_eq!(
            is_nan(&mut vec![Value::Number(f64::NAN)], &vm).unwrap(),
            Value::True
        );
        assert_eq!(
            is_inf(&mut vec![Value::Number(f64::INFINITY)], &vm).unwrap(),
            Value::True
        );
        assert_eq!(
            is_nan(&mut vec![Value::Number(1.0)], &vm).unwrap(),
            Value::False
        );
    }

    #[test]
    fn test_type_errors() {
        let vm = vm();
        assert!(matches!(
            cos(&mut vec![Value::Nil], &vm),
            Err(RuntimeError::Type(_))
        ));
        assert!(matches!(
            cos(&mut vec![], &vm),
            Err(RuntimeError::Arity(_))
        ));
    }

    #[test]
    fn test_exp_ln() {
        let vm = vm();
        let Value::Number(n) = exp(&mut vec![Value::Number(1.0)], &vm).unwrap() else {
            panic!()
        };
        assert!((n - std::f64::consts::E).abs() < 1e-12);
        let Value::Number(n) = ln(&mut vec![Value::Number(std::f64::consts::E)], &vm).unwrap()
        else {
            panic!()
        };
        assert!((n - 1.0).abs() < 1e-12);
    }
}
