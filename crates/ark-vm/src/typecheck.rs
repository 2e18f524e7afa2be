//! Declarative type contracts for builtins.
//!
//! A builtin declares the argument lists it accepts as a set of
//! [`Contract`]s; when none matches, [`contract_error`] renders a
//! diagnostic listing every alternative with the mismatching positions
//! called out.

use ark_util::RuntimeError;

use crate::value::Value;

/// Coarse value categories used by contracts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Any,
    Number,
    String,
    List,
    Function,
    Bool,
    Nil,
    User,
}

impl ValueType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::Any => true,
            ValueType::Number => matches!(value, Value::Number(_)),
            ValueType::String => matches!(value, Value::String(_)),
            ValueType::List => matches!(value, Value::List(_)),
            ValueType::Function => matches!(
                value,
                Value::PageAddr(_) | Value::Closure(_) | Value::Builtin(_)
            ),
            ValueType::Bool => matches!(value, Value::True | Value::False),
            ValueType::Nil => matches!(value, Value::Nil),
            ValueType::User => matches!(value, Value::User(_)),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::Number => "Number",
            ValueType::String => "String",
            ValueType::List => "List",
            ValueType::Function => "Function",
            ValueType::Bool => "Bool",
            ValueType::Nil => "Nil",
            ValueType::User => "UserType",
        }
    }
}

/// One named argument slot in a contract.
#[derive(Clone, Debug)]
pub struct Typedef {
    pub name: &'static str,
    pub types: Vec<ValueType>,
    /// A variadic slot matches all remaining arguments.
    pub variadic: bool,
}

impl Typedef {
    pub fn new(name: &'static str, ty: ValueType) -> Self {
        Self {
            name,
            types: vec![ty],
            variadic: false,
        }
    }

    pub fn variadic(name: &'static str, ty: ValueType) -> Self {
        Self {
            name,
            types: vec![ty],
            variadic: true,
        }
    }

    fn matches(&self, value: &Value) -> bool {
        self.types.iter().any(|t| t.matches(value))
    }
}

/// An accepted argument list.
#[derive(Clone, Debug)]
pub struct Contract {
    pub arguments: Vec<Typedef>,
}

impl Contract {
    pub fn new(arguments: Vec<Typedef>) -> Self {
        Self { arguments }
    }

    fn matches(&self, args: &[Value]) -> bool {
        let fixed = self
            .arguments
            .iter()
            .filter(|a| !a.variadic)
            .count();
        let has_variadic = self.arguments.iter().any(|a| a.variadic);
        if has_variadic {
            if args.len() < fixed {
                return false;
            }
        } else if args.len() != fixed {
            return false;
        }

        let mut args = args.iter();
        for typedef in &self.arguments {
            if typedef.variadic {
                return args.all(|v| typedef.matches(v));
            }
            match args.next() {
                Some(value) if typedef.matches(value) => {}
                _ => return false,
            }
        }
        true
    }
}

/// True if any contract accepts the argument list.
pub fn check_contracts(contracts: &[Contract], args: &[Value]) -> bool {
    contracts.iter().any(|c| c.matches(args))
}

/// Build the diagnostic for a contract violation: the accepted
/// alternatives with the mismatched positions marked.
pub fn contract_error(funcname: &str, contracts: &[Contract], args: &[Value]) -> RuntimeError {
    let mut message = format!("`{funcname}' expected one of:\n");
    for contract in contracts {
        message.push_str(&format!("  ({funcname}"));
        for (i, typedef) in contract.arguments.iter().enumerate() {
            let types = typedef
                .types
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>()
                .join("|");
            let mismatch = match args.get(i) {
                Some(value) if !typedef.matches(value) => " <-",
                None if !typedef.variadic => " <- missing",
                _ => "",
            };
            let dots = if typedef.variadic { "..." } else { "" };
            message.push_str(&format!(" {}:{types}{dots}{mismatch}", typedef.name));
        }
        message.push_str(")\n");
    }
    message.push_str(&format!(
        "  got ({funcname}{})",
        args.iter()
            .map(|v| format!(" {}", v.type_name()))
            .collect::<String>()
    ));
    RuntimeError::Type(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number_contract() -> Vec<Contract> {
        vec![Contract::new(vec![Typedef::new("x", ValueType::Number)])]
    }

    #[test]
    fn test_exact_match() {
        assert!(check_contracts(&number_contract(), &[Value::Number(1.0)]));
        assert!(!check_contracts(&number_contract(), &[Value::Nil]));
        assert!(!check_contracts(&number_contract(), &[]));
    }

    #[test]
    fn test_variadic_tail() {
        let contracts = vec![Contract::new(vec![
            Typedef::new("fmt", ValueType::String),
            Typedef::variadic("args", ValueType::Any),
        ])];
        assert!(check_contracts(&contracts, &[Value::String("x".into())]));
        assert!(check_contracts(
            &contracts,
            &[Value::String("x".into()), Value::Number(1.0), Value::True]
        ));
        assert!(!check_contracts(&contracts, &[Value::Number(1.0)]));
    }

    #[test]
    fn test_alternative_contracts() {
        let contracts = vec![
            Contract::new(vec![Typedef::new("x", ValueType::Number)]),
            Contract::new(vec![Typedef::new("x", ValueType::String)]),
        ];
        assert!(check_contracts(&contracts, &[Value::Number(1.0)]));
        assert!(check_contracts(&contracts, &[Value::String("s".into())]));
        assert!(!check_contracts(&contracts, &[Value::Nil]));
    }

    #[test]
    fn test_error_lists_alternatives_and_marks_mismatch() {
        let contracts = vec![Contract::new(vec![
            Typedef::new("list", ValueType::List),
            Typedef::new("index", ValueType::Number),
        ])];
        let err = contract_error("list:removeAt", &contracts, &[Value::Nil, Value::Number(0.0)]);
        let text = err.to_string();
        assert!(text.contains("list:removeAt"));
        assert!(text.contains("list:List <-"));
        assert!(text.contains("index:Number"));
        assert!(text.contains("got"));
    }
}
