//! String builtins: formatting, lookup and codepoint conversion.

use ark_util::RuntimeError;

use crate::value::Value;
use crate::vm::Vm;

fn string_arg<'a>(args: &'a [Value], index: usize, who: &str) -> Result<&'a str, RuntimeError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(RuntimeError::Type(format!(
            "{who} expects a String as argument {index}, got {}",
            other.type_name()
        ))),
        None => Err(RuntimeError::Arity(format!(
            "{who} is missing argument {index}"
        ))),
    }
}

/// `(str:format fmt args…)`: each `{}` is replaced by the next argument.
pub fn format(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let template = string_arg(args, 0, "str:format")?.to_string();
    let mut out = String::with_capacity(template.len());
    let mut rest = template.as_str();
    let mut next = 1;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        let value = args.get(next).ok_or_else(|| {
            RuntimeError::Arity(format!(
                "str:format placeholder {} has no matching argument",
                next
            ))
        })?;
        out.push_str(&value.to_string());
        next += 1;
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

/// `(str:find str sub)`: character index of the first occurrence, or -1.
pub fn find(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let haystack = string_arg(args, 0, "str:find")?;
    let needle = string_arg(args, 1, "str:find")?;
    let index = match haystack.find(needle) {
        Some(byte_index) => haystack[..byte_index].chars().count() as f64,
        None => -1.0,
    };
    Ok(Value::Number(index))
}

/// `(str:removeAt str index)`
pub fn remove_at(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let source = string_arg(args, 0, "str:removeAt")?;
    let Some(Value::Number(n)) = args.get(1) else {
        return Err(RuntimeError::Type(
            "str:removeAt expects a Number index".to_string(),
        ));
    };
    let chars: Vec<char> = source.chars().collect();
    let index = *n as i64;
    let at = if index < 0 {
        index + chars.len() as i64
    } else {
        index
    };
    if at < 0 || at as usize >= chars.len() {
        return Err(RuntimeError::Index(format!(
            "index {index} out of range (length {})",
            chars.len()
        )));
    }
    let out: String = chars
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != at as usize)
        .map(|(_, c)| c)
        .collect();
    Ok(Value::String(out))
}

/// `(str:ord s)`: codepoint of the first character.
pub fn ord(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let source = string_arg(args, 0, "str:ord")?;
    let first = source.chars().next().ok_or_else(|| {
        RuntimeError::Index("str:ord called on an empty string".to_string())
    })?;
    Ok(Value::Number(first as u32 as f64))
}

/// `(str:chr n)`: one-character string from a codepoint.
pub fn chr(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let Some(Value::Number(n)) = args.first() else {
        return Err(RuntimeError::Type(
            "str:chr expects a Number codepoint".to_string(),
        ));
    };
    let code = *n as u32;
    let decoded = char::from_u32(code).ok_or_else(|| {
        RuntimeError::Type(format!("{code:#x} is not a valid codepoint"))
    })?;
    Ok(Value::String(decoded.to_string()))
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
    fn test_format() {
        let vm = vm();
        let mut args = vec![
            Value::String("{} + {} = {}".to_string()),
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
        ];
        assert_eq!(
            format(&mut args, &vm).unwrap(),
            Value::String("1 + 2 = 3".to_string())
        );
    }

    #[test]
    fn test_format_missing_argument() {
        let vm = vm();
        let mut args = vec![Value::String("{} {}".to_string()), Value::Number(1.0)];
        assert!(matches!(format(&mut args, &vm), Err(RuntimeError::Arity(_))));
    }

    #[test]
    fn test_find() {
        let vm = vm();
        let mut args = vec![
            Value::String("hello world".to_string()),
            Value::String("world".to_string()),
        ];
        assert_eq!(find(&mut args, &vm).unwrap(), Value::Number(6.0));

        let mut args = vec![
            Value::String("hello".to_string()),
            Value::String("zzz".to_string()),
        ];
        assert_eq!(find(&mut args, &vm).unwrap(), Value::Number(-1.0));
    }

    #[test]
    fn test_remove_at() {
        let vm = vm();
        let mut args = vec![Value::String("abc".to_string()), Value::Number(1.0)];
        assert_eq!(
            remove_at(&mut args, &vm).unwrap(),
            Value::String("ac".to_string())
        );

        let mut args = vec![Value::String("abc".to_string()), Value::Number(7.0)];
        assert!(matches!(
            remove_at(&mut args, &vm),
            Err(RuntimeError::Index(_))
        ));
    }

    #[test]
    fn test_ord_chr_round_trip() {
        let vm = vm();
        let mut args = vec![Value::String("A".to_string())];
        assert_eq!(ord(&mut args, &vm).unwrap(), Value::Number(65.0));

        let mut args = vec![Value::Number(65.0)];
        assert_eq!(chr(&mut args, &vm).unwrap(), Value::String("A".to_string()));
    }
}
