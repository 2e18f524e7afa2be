//! Console and filesystem builtins. File handles are scoped to the call:
//! opened and closed within each builtin.

use std::io::Write;

use ark_util::RuntimeError;

use crate::typecheck::{check_contracts, contract_error, Contract, Typedef, ValueType};
use crate::value::Value;
use crate::vm::Vm;

fn io_error(what: &str, err: std::io::Error) -> RuntimeError {
    RuntimeError::Module(format!("{what}: {err}"))
}

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

/// `(print args…)`: writes every argument then a newline.
pub fn print(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for value in args.iter() {
        write!(out, "{value}").map_err(|e| io_error("print", e))?;
    }
    writeln!(out).map_err(|e| io_error("print", e))?;
    Ok(Value::Nil)
}

/// `(puts args…)`: like print, without the newline.
pub fn puts(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for value in args.iter() {
        write!(out, "{value}").map_err(|e| io_error("puts", e))?;
    }
    out.flush().map_err(|e| io_error("puts", e))?;
    Ok(Value::Nil)
}

/// `(input [prompt])`: reads one line from stdin.
pub fn input(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    if let Some(prompt) = args.first() {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        write!(out, "{prompt}").map_err(|e| io_error("input", e))?;
        out.flush().map_err(|e| io_error("input", e))?;
    }
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| io_error("input", e))?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Value::String(line))
}

/// `(io:writeFile filename content [mode])`, mode `"w"` (default) or `"a"`.
pub fn write_file(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let filename = string_arg(args, 0, "io:writeFile")?.to_string();
    let content = args
        .get(1)
        .ok_or_else(|| RuntimeError::Arity("io:writeFile needs a content argument".to_string()))?
        .to_string();
    let append = match args.get(2) {
        Some(Value::String(mode)) if mode == "a" => true,
        Some(Value::String(mode)) if mode == "w" => false,
        Some(other) => {
            return Err(RuntimeError::Type(format!(
                "io:writeFile mode must be \"w\" or \"a\", got {other}"
            )))
        }
        None => false,
    };

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(&filename)
        .map_err(|e| io_error(&filename, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| io_error(&filename, e))?;
    Ok(Value::Nil)
}

/// `(io:readFile filename)`
pub fn read_file(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let filename = string_arg(args, 0, "io:readFile")?;
    let content = std::fs::read_to_string(filename).map_err(|e| io_error(filename, e))?;
    Ok(Value::String(content))
}

/// `(io:fileExists? filename)`
pub fn file_exists(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let filename = string_arg(args, 0, "io:fileExists?")?;
    Ok(Value::boolean(std::path::Path::new(filename).is_file()))
}

/// `(io:listFiles dir)`
pub fn list_files(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let dir = string_arg(args, 0, "io:listFiles")?;
    let entries = std::fs::read_dir(dir).map_err(|e| io_error(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        names.push(Value::String(entry.path().to_string_lossy().into_owned()));
    }
    Ok(Value::list(names))
}

/// `(io:isDir? path)`
pub fn is_directory(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let path = string_arg(args, 0, "io:isDir?")?;
    Ok(Value::boolean(std::path::Path::new(path).is_dir()))
}

/// `(io:makeDir path)`
pub fn make_dir(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let path = string_arg(args, 0, "io:makeDir")?;
    std::fs::create_dir_all(path).map_err(|e| io_error(path, e))?;
    Ok(Value::Nil)
}

/// `(io:removeFiles paths…)`: removes files and directories, recursively
/// for the latter.
pub fn remove_files(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let contracts = [Contract::new(vec![Typedef::variadic(
        "paths",
        ValueType::String,
    )])];
    if !check_contracts(&contracts, args) || args.is_empty() {
        return Err(contract_error("io:removeFiles", &contracts, args));
    }
    for value in args.iter() {
        let Value::String(path) = value else {
            unreachable!("checked by contract")
        };
        let target = std::path::Path::new(path);
        let result = if target.is_dir() {
            std::fs::remove_dir_all(target)
        } else {
            std::fs::remove_file(target)
        };
        result.map_err(|e| io_error(path, e))?;
    }
    Ok(Value::Nil)
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
    fn test_write_then_read_file() {
        let vm = vm();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt").to_string_lossy().into_owned();

        let mut args = vec![
            Value::String(path.clone()),
            Value::String("hello".to_string()),
        ];
        write_file(&mut args, &vm).unwrap();

        let mut args = vec![Value::String(path.clone())];
        assert_eq!(
            read_file(&mut args, &vm).unwrap(),
            Value::String("hello".to_string())
        );

        // append mode
        let mut args = vec![
            Value::String(path.clone()),
            Value::String(" world".to_string()),
            Value::String("a".to_string()),
        ];
        write_file(&mut args, &vm).unwrap();
        let mut args = vec![Value::String(path)];
        assert_eq!(
            read_file(&mut args, &vm).unwrap(),
            Value::String("hello world".to_string())
        );
    }

    #[test]
    fn test_file_exists_and_is_dir() {
        let vm = vm();
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_string_lossy().into_owned();

        let mut args = vec![Value::String(dir_path.clone())];
        assert_eq!(is_directory(&mut args, &vm).unwrap(), Value::True);
        let mut args = vec![Value::String(dir_path)];
        assert_eq!(file_exists(&mut args, &vm).unwrap(), Value::False);
    }

    #[test]
    fn test_make_and_remove_dir() {
        let vm = vm();
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b").to_string_lossy().into_owned();

        let mut args = vec![Value::String(nested.clone())];
        make_dir(&mut args, &vm).unwrap();
        assert!(std::path::Path::new(&nested).is_dir());

        let mut args = vec![Value::String(nested.clone())];
        remove_files(&mut args, &vm).unwrap();
        assert!(!std::path::Path::new(&nested).exists());
    }

    #[test]
    fn test_read_missing_file_is_a_module_error() {
        let vm = vm();
        let mut args = vec![Value::String("/nonexistent/definitely".to_string())];
        assert!(matches!(
            read_file(&mut args, &vm),
            Err(RuntimeError::Module(_))
        ));
    }
}
