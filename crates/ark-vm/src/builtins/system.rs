//! Time and system builtins.
//!
//! `sys:exec` can be compiled out entirely by disabling the `system`
//! feature; the builtin then reports a module error instead of spawning
//! processes.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ark_util::RuntimeError;

use crate::value::Value;
use crate::vm::Vm;

/// `(time)`: seconds since epoch, fractional.
pub fn time(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    if !args.is_empty() {
        return Err(RuntimeError::Arity(format!(
            "time expects no argument, got {}",
            args.len()
        )));
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| RuntimeError::Module(format!("time: {e}")))?;
    Ok(Value::Number(now.as_secs_f64()))
}

/// `(sys:exec command)`: runs a shell command, returns its stdout.
#[cfg(feature = "system")]
pub fn exec(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let Some(Value::String(command)) = args.first() else {
        return Err(RuntimeError::Type(
            "sys:exec expects a String command".to_string(),
        ));
    };
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .map_err(|e| RuntimeError::Module(format!("sys:exec: {e}")))?;
    Ok(Value::String(
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}

#[cfg(not(feature = "system"))]
pub fn exec(_args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    Err(RuntimeError::Module(
        "sys:exec was disabled at build time".to_string(),
    ))
}

/// `(sleep milliseconds)`
pub fn sleep(args: &mut Vec<Value>, _vm: &Vm) -> Result<Value, RuntimeError> {
    let Some(Value::Number(ms)) = args.first() else {
        return Err(RuntimeError::Type(
            "sleep expects a Number of milliseconds".to_string(),
        ));
    };
    if *ms > 0.0 {
        std::thread::sleep(Duration::from_secs_f64(ms / 1000.0));
    }
    Ok(Value::Nil)
}

/// `(sys:exit code)`: marks the whole VM to halt; every context observes
/// it at its next instruction boundary.
pub fn exit(args: &mut Vec<Value>, vm: &Vm) -> Result<Value, RuntimeError> {
    let code = match args.first() {
        Some(Value::Number(n)) => *n as i32,
        Some(other) => {
            return Err(RuntimeError::Type(format!(
                "sys:exit expects a Number, got {}",
                other.type_name()
            )))
        }
        None => 0,
    };
    vm.halt_with(code);
    Ok(Value::Nil)
}
