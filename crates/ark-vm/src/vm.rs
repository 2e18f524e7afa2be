//! The fetch-decode-execute loop and the call protocol.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use ark_ir::{Opcode, TableValue, VARIADIC_ARITY_BIT};
use ark_util::RuntimeError;

use crate::builtins::{registry, Builtin, BuiltinFn};
use crate::context::ExecutionContext;
use crate::state::State;
use crate::value::{Closure, FrameInfo, ScopeRef, Value};

/// The virtual machine.
///
/// Holds the immutable program image and the builtin table behind shared
/// pointers; cloning a `Vm` is cheap and gives a handle usable from a
/// secondary (async) context.
#[derive(Clone)]
pub struct Vm {
    state: Arc<State>,
    builtins: Arc<Vec<(String, Builtin)>>,
    /// Native packages: package name to (export name, builtin index).
    plugins: Arc<FxHashMap<String, Vec<(String, u16)>>>,
    halt: Arc<AtomicBool>,
    exit_code: Arc<AtomicI32>,
}

impl Vm {
    pub fn new(state: State) -> Self {
        let builtins = registry()
            .into_iter()
            .map(|(name, builtin)| (name.to_string(), builtin))
            .collect();
        Self {
            state: Arc::new(state),
            builtins: Arc::new(builtins),
            plugins: Arc::new(FxHashMap::default()),
            halt: Arc::new(AtomicBool::new(false)),
            exit_code: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Register a native package: its exports become builtins, bound into
    /// the global scope when a `PLUGIN` instruction names the package.
    /// Must be called before [`run`](Self::run).
    pub fn register_plugin(
        &mut self,
        package: impl Into<String>,
        exports: Vec<(String, BuiltinFn)>,
    ) {
        let builtins = Arc::make_mut(&mut self.builtins);
        let plugins = Arc::make_mut(&mut self.plugins);
        let mut indexed = Vec::with_capacity(exports.len());
        for (name, handler) in exports {
            indexed.push((name.clone(), builtins.len() as u16));
            builtins.push((name, Builtin::Fn(handler)));
        }
        plugins.insert(package.into(), indexed);
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Request a VM-wide halt; other contexts observe it at their next
    /// instruction boundary.
    pub fn halt_with(&self, code: i32) {
        self.exit_code.store(code, Ordering::SeqCst);
        self.halt.store(true, Ordering::SeqCst);
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    /// Execute page 0 on a fresh primary context.
    pub fn run(&self) -> Result<Value, RuntimeError> {
        let mut ctx = ExecutionContext::new(true);
        self.run_in(&mut ctx)
    }

    /// Execute page 0 on a caller-provided context, leaving its global
    /// scope inspectable afterwards (used by embedders and tests).
    pub fn run_in(&self, ctx: &mut ExecutionContext) -> Result<Value, RuntimeError> {
        debug!(pages = self.state.pages.len(), "starting execution");
        self.execute(ctx, None)
    }

    /// Invoke a callable with the given arguments on `ctx` and run it to
    /// completion. Used by `async` bodies and embedders.
    pub fn call_value(
        &self,
        ctx: &mut ExecutionContext,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Builtin(index) => {
                let mut args = args;
                self.run_builtin(index, &mut args)
            }
            Value::PageAddr(_) | Value::Closure(_) => {
                let argc = args.len() as u16;
                for arg in args {
                    ctx.push(arg)?;
                }
                ctx.push(callee)?;
                let entry_fc = ctx.fc;
                self.call(ctx, argc)?;
                self.execute(ctx, Some(entry_fc))
            }
            other => Err(RuntimeError::Type(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }

    /// The dispatch loop. With `stop_at_fc`, execution stops when a `RET`
    /// brings the frame count back to that level and the returned value is
    /// handed back; otherwise it runs until `HALT` or the end of page 0.
    fn execute(
        &self,
        ctx: &mut ExecutionContext,
        stop_at_fc: Option<u16>,
    ) -> Result<Value, RuntimeError> {
        loop {
            if self.halt.load(Ordering::Relaxed) {
                return Ok(Value::Nil);
            }
            let page = self
                .state
                .pages
                .get(ctx.pp as usize)
                .ok_or_else(|| RuntimeError::Vm(format!("invalid page {}", ctx.pp)))?;
            let Some(word) = page.get(ctx.ip).copied() else {
                if ctx.pp == 0 && stop_at_fc.is_none() {
                    return Ok(Value::Nil);
                }
                return Err(RuntimeError::Vm(format!(
                    "fell off the end of page {}",
                    ctx.pp
                )));
            };
            ctx.ip += 1;
            trace!(pp = ctx.pp, ip = ctx.ip - 1, opcode = %word.opcode, "step");

            match word.opcode {
                Opcode::Nop => {}
                Opcode::LoadSymbol => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    ctx.push(value)?;
                }
                Opcode::LoadConst => {
                    let value = self.load_const(ctx, word.primary)?;
                    ctx.push(value)?;
                }
                Opcode::PopJumpIfTrue => {
                    let value = ctx.pop()?;
                    if value.is_truthy() {
                        ctx.ip = word.primary as usize;
                    }
                }
                Opcode::PopJumpIfFalse => {
                    let value = ctx.pop()?;
                    if !value.is_truthy() {
                        ctx.ip = word.primary as usize;
                    }
                }
                Opcode::Jump => ctx.ip = word.primary as usize,
                Opcode::Store => {
                    let value = ctx.pop()?;
                    self.store(ctx, word.primary, value)?;
                }
                Opcode::Let | Opcode::Mut => {
                    let value = ctx.pop()?;
                    self.declare(ctx, word.primary, value)?;
                }
                Opcode::Ret => {
                    self.ret(ctx)?;
                    if let Some(target) = stop_at_fc {
                        if ctx.fc == target {
                            return ctx.pop();
                        }
                    }
                }
                Opcode::Halt => return Ok(Value::Nil),
                Opcode::Call => self.call(ctx, word.primary)?,
                Opcode::Capture => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    let scope = ctx
                        .saved_scope
                        .get_or_insert_with(|| {
                            Arc::new(parking_lot::Mutex::new(crate::scope::Scope::new()))
                        })
                        .clone();
                    scope.lock().push(word.primary, value);
                }
                Opcode::Builtin => match self.builtins.get(word.primary as usize) {
                    Some((_, Builtin::Const(value))) => ctx.push(value.clone())?,
                    Some((_, Builtin::Fn(_))) => ctx.push(Value::Builtin(word.primary))?,
                    None => {
                        return Err(RuntimeError::Vm(format!(
                            "unknown builtin index {}",
                            word.primary
                        )))
                    }
                },
                Opcode::Del => {
                    let id = word.primary;
                    let removed = ctx
                        .locals
                        .iter()
                        .rev()
                        .any(|scope| scope.lock().remove(id));
                    if !removed {
                        return Err(RuntimeError::Scope(format!(
                            "unbound symbol `{}', can not delete it",
                            self.state.symbol_name(id)
                        )));
                    }
                }
                Opcode::SaveEnv => {
                    ctx.saved_scope = Some(ctx.current_scope().clone());
                }
                Opcode::GetField => {
                    let target = ctx.pop()?;
                    let value = self.get_field(&target, word.primary)?;
                    ctx.push(value)?;
                }
                Opcode::Plugin => self.load_plugin(ctx, word.primary)?,
                Opcode::List => {
                    let values = self.pop_args(ctx, word.primary)?;
                    ctx.push(Value::list(values))?;
                }
                Opcode::Append => {
                    let (values, rest) = self.pop_list_operands(ctx, word.primary)?;
                    let list = as_list(&values[0])?;
                    let mut out = list.lock().clone();
                    out.extend(rest);
                    ctx.push(Value::list(out))?;
                }
                Opcode::Concat => {
                    let (values, rest) = self.pop_list_operands(ctx, word.primary)?;
                    let list = as_list(&values[0])?;
                    let mut out = list.lock().clone();
                    for other in rest {
                        out.extend(as_list(&other)?.lock().iter().cloned());
                    }
                    ctx.push(Value::list(out))?;
                }
                Opcode::AppendInPlace => {
                    let (values, rest) = self.pop_list_operands(ctx, word.primary)?;
                    let list = as_list(&values[0])?;
                    list.lock().extend(rest);
                    ctx.push(Value::Nil)?;
                }
                Opcode::ConcatInPlace => {
                    let (values, rest) = self.pop_list_operands(ctx, word.primary)?;
                    let list = as_list(&values[0])?;
                    for other in rest {
                        let elements: Vec<Value> = as_list(&other)?.lock().clone();
                        list.lock().extend(elements);
                    }
                    ctx.push(Value::Nil)?;
                }
                Opcode::PopList => {
                    let index = ctx.pop()?;
                    let target = ctx.pop()?;
                    let list = as_list(&target)?;
                    let mut out = list.lock().clone();
                    let at = normalize_index(&index, out.len())?;
                    out.remove(at);
                    ctx.push(Value::list(out))?;
                }
                Opcode::PopListInPlace => {
                    let index = ctx.pop()?;
                    let target = ctx.pop()?;
                    let list = as_list(&target)?;
                    let mut guard = list.lock();
                    let at = normalize_index(&index, guard.len())?;
                    guard.remove(at);
                    drop(guard);
                    ctx.push(Value::Nil)?;
                }
                Opcode::Pop => {
                    ctx.pop()?;
                }

                // operators
                Opcode::Add => self.binary(ctx, op_add)?,
                Opcode::Sub => self.binary(ctx, op_sub)?,
                Opcode::Mul => self.binary(ctx, op_mul)?,
                Opcode::Div => self.binary(ctx, op_div)?,
                Opcode::Gt => self.compare(ctx, |o| o.is_gt())?,
                Opcode::Lt => self.compare(ctx, |o| o.is_lt())?,
                Opcode::Le => self.compare(ctx, |o| o.is_le())?,
                Opcode::Ge => self.compare(ctx, |o| o.is_ge())?,
                Opcode::Neq => {
                    let rhs = ctx.pop()?;
                    let lhs = ctx.pop()?;
                    ctx.push(Value::boolean(lhs != rhs))?;
                }
                Opcode::Eq => {
                    let rhs = ctx.pop()?;
                    let lhs = ctx.pop()?;
                    ctx.push(Value::boolean(lhs == rhs))?;
                }
                Opcode::Len => {
                    let value = ctx.pop()?;
                    let len = match &value {
                        Value::List(l) => l.lock().len(),
                        Value::String(s) => s.chars().count(),
                        other => {
                            return Err(RuntimeError::Type(format!(
                                "len expects a List or a String, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    ctx.push(Value::Number(len as f64))?;
                }
                Opcode::Empty => {
                    let value = ctx.pop()?;
                    let empty = match &value {
                        Value::List(l) => l.lock().is_empty(),
                        Value::String(s) => s.is_empty(),
                        other => {
                            return Err(RuntimeError::Type(format!(
                                "empty? expects a List or a String, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    ctx.push(Value::boolean(empty))?;
                }
                Opcode::Tail => {
                    let value = ctx.pop()?;
                    ctx.push(tail_of(&value)?)?;
                }
                Opcode::Head => {
                    let value = ctx.pop()?;
                    ctx.push(head_of(&value)?)?;
                }
                Opcode::IsNil => {
                    let value = ctx.pop()?;
                    ctx.push(Value::boolean(value == Value::Nil))?;
                }
                Opcode::Assert => {
                    let message = ctx.pop()?;
                    let condition = ctx.pop()?;
                    if !condition.is_truthy() {
                        return Err(RuntimeError::AssertionFailed(message.to_string()));
                    }
                    ctx.push(Value::Nil)?;
                }
                Opcode::ToNum => {
                    let value = ctx.pop()?;
                    let result = match &value {
                        Value::String(s) => s
                            .trim()
                            .parse::<f64>()
                            .map(Value::Number)
                            .unwrap_or(Value::Nil),
                        Value::Number(n) => Value::Number(*n),
                        _ => Value::Nil,
                    };
                    ctx.push(result)?;
                }
                Opcode::ToStr => {
                    let value = ctx.pop()?;
                    ctx.push(Value::String(value.to_string()))?;
                }
                Opcode::At => {
                    let index = ctx.pop()?;
                    let target = ctx.pop()?;
                    let result = match &target {
                        Value::List(l) => {
                            let guard = l.lock();
                            let at = normalize_index(&index, guard.len())?;
                            guard[at].clone()
                        }
                        Value::String(s) => {
                            let chars: Vec<char> = s.chars().collect();
                            let at = normalize_index(&index, chars.len())?;
                            Value::String(chars[at].to_string())
                        }
                        other => {
                            return Err(RuntimeError::Type(format!(
                                "@ expects a List or a String, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    ctx.push(result)?;
                }
                Opcode::And => {
                    let rhs = ctx.pop()?;
                    let lhs = ctx.pop()?;
                    ctx.push(Value::boolean(lhs.is_truthy() && rhs.is_truthy()))?;
                }
                Opcode::Or => {
                    let rhs = ctx.pop()?;
                    let lhs = ctx.pop()?;
                    ctx.push(Value::boolean(lhs.is_truthy() || rhs.is_truthy()))?;
                }
                Opcode::Mod => self.binary(ctx, op_mod)?,
                Opcode::Type => {
                    let value = ctx.pop()?;
                    ctx.push(Value::String(value.type_name().to_string()))?;
                }
                Opcode::HasField => {
                    let field = ctx.pop()?;
                    let target = ctx.pop()?;
                    let (Value::Closure(closure), Value::String(name)) = (&target, &field) else {
                        return Err(RuntimeError::Type(format!(
                            "hasField expects a Closure and a String, got {} and {}",
                            target.type_name(),
                            field.type_name()
                        )));
                    };
                    let has = self
                        .state
                        .symbol_id(name)
                        .map(|id| closure.scope.lock().has(id))
                        .unwrap_or(false);
                    ctx.push(Value::boolean(has))?;
                }
                Opcode::Not => {
                    let value = ctx.pop()?;
                    ctx.push(Value::boolean(!value.is_truthy()))?;
                }

                // fused opcodes
                Opcode::LoadConstLoadConst => {
                    let first = self.load_const(ctx, word.primary)?;
                    ctx.push(first)?;
                    let second = self.load_const(ctx, word.secondary)?;
                    ctx.push(second)?;
                }
                Opcode::LoadConstStore => {
                    let value = self.load_const(ctx, word.primary)?;
                    self.declare(ctx, word.secondary, value)?;
                }
                Opcode::LoadConstSetVal => {
                    let value = self.load_const(ctx, word.primary)?;
                    self.store(ctx, word.secondary, value)?;
                }
                Opcode::StoreFrom => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    self.declare(ctx, word.secondary, value)?;
                }
                Opcode::SetValFrom => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    self.store(ctx, word.secondary, value)?;
                }
                Opcode::Increment => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    let Value::Number(n) = value else {
                        return Err(RuntimeError::Type(format!(
                            "can not increment `{}', it is not a Number",
                            self.state.symbol_name(word.primary)
                        )));
                    };
                    ctx.push(Value::Number(n + 1.0))?;
                }
                Opcode::Decrement => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    let Value::Number(n) = value else {
                        return Err(RuntimeError::Type(format!(
                            "can not decrement `{}', it is not a Number",
                            self.state.symbol_name(word.primary)
                        )));
                    };
                    ctx.push(Value::Number(n - 1.0))?;
                }
                Opcode::StoreTail => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    let tail = tail_of(&value)?;
                    self.declare(ctx, word.secondary, tail)?;
                }
                Opcode::StoreHead => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    let head = head_of(&value)?;
                    self.declare(ctx, word.secondary, head)?;
                }
                Opcode::SetValTail => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    let tail = tail_of(&value)?;
                    self.store(ctx, word.secondary, tail)?;
                }
                Opcode::SetValHead => {
                    let value = self.load_symbol(ctx, word.primary)?;
                    let head = head_of(&value)?;
                    self.store(ctx, word.secondary, head)?;
                }
            }
        }
    }

    /// Scope-chain lookup, innermost scope first.
    fn load_symbol(&self, ctx: &mut ExecutionContext, id: u16) -> Result<Value, RuntimeError> {
        ctx.last_symbol = id;
        for scope in ctx.locals.iter().rev() {
            if let Some(value) = scope.lock().get(id) {
                return Ok(value.clone());
            }
        }
        Err(RuntimeError::Scope(format!(
            "unbound symbol `{}'",
            self.state.symbol_name(id)
        )))
    }

    /// Overwrite the nearest binding.
    fn store(&self, ctx: &mut ExecutionContext, id: u16, value: Value) -> Result<(), RuntimeError> {
        ctx.last_symbol = id;
        for scope in ctx.locals.iter().rev() {
            let mut guard = scope.lock();
            if let Some(slot) = guard.get_mut(id) {
                *slot = value;
                return Ok(());
            }
        }
        Err(RuntimeError::Scope(format!(
            "unbound symbol `{}', can not modify it",
            self.state.symbol_name(id)
        )))
    }

    /// Declare a binding in the current scope.
    fn declare(&self, ctx: &mut ExecutionContext, id: u16, value: Value) -> Result<(), RuntimeError> {
        ctx.last_symbol = id;
        ctx.current_scope().lock().push(id, value);
        Ok(())
    }

    /// Value-table load; function entries become closures when a scope
    /// snapshot is pending.
    fn load_const(&self, ctx: &mut ExecutionContext, index: u16) -> Result<Value, RuntimeError> {
        let entry = self
            .state
            .values
            .get(index as usize)
            .ok_or_else(|| RuntimeError::Vm(format!("unknown constant index {index}")))?;
        Ok(match entry {
            TableValue::Number(n) => Value::Number(*n),
            TableValue::String(s) => Value::String(s.clone()),
            TableValue::Page(page) => match ctx.saved_scope.take() {
                Some(scope) => Value::Closure(Closure::new(scope, *page)),
                None => Value::PageAddr(*page),
            },
        })
    }

    fn get_field(&self, target: &Value, id: u16) -> Result<Value, RuntimeError> {
        let Value::Closure(closure) = target else {
            return Err(RuntimeError::Type(format!(
                "field access needs a Closure, got {}",
                target.type_name()
            )));
        };
        closure.scope.lock().get(id).cloned().ok_or_else(|| {
            RuntimeError::Scope(format!(
                "closure has no field `{}'",
                self.state.symbol_name(id)
            ))
        })
    }

    /// Bind the exports of a registered native package into the global
    /// scope.
    fn load_plugin(&self, ctx: &mut ExecutionContext, index: u16) -> Result<(), RuntimeError> {
        let Some(TableValue::String(package)) = self.state.values.get(index as usize) else {
            return Err(RuntimeError::Vm(format!(
                "PLUGIN references a non-string constant {index}"
            )));
        };
        let exports = self.plugins.get(package).ok_or_else(|| {
            RuntimeError::Module(format!("native package `{package}' is not registered"))
        })?;
        let global = ctx.locals.first().expect("global scope").clone();
        let mut guard = global.lock();
        for (name, builtin_index) in exports {
            if let Some(id) = self.state.symbol_id(name) {
                guard.push(id, Value::Builtin(*builtin_index));
            }
        }
        Ok(())
    }

    /// Pop `count` values, restoring push order.
    fn pop_args(&self, ctx: &mut ExecutionContext, count: u16) -> Result<Vec<Value>, RuntimeError> {
        let mut args = Vec::with_capacity(count as usize);
        for _ in 0..count {
            args.push(ctx.pop()?);
        }
        args.reverse();
        Ok(args)
    }

    /// Pop the operands of a list instruction: the list plus its extra
    /// arguments. Broken bytecode with a zero count is rejected here.
    fn pop_list_operands(
        &self,
        ctx: &mut ExecutionContext,
        count: u16,
    ) -> Result<(Vec<Value>, Vec<Value>), RuntimeError> {
        if count == 0 {
            return Err(RuntimeError::Vm(
                "list instruction with no operands".to_string(),
            ));
        }
        let mut values = self.pop_args(ctx, count)?;
        let rest = values.split_off(1);
        Ok((values, rest))
    }

    fn run_builtin(&self, index: u16, args: &mut Vec<Value>) -> Result<Value, RuntimeError> {
        match self.builtins.get(index as usize) {
            Some((_, Builtin::Fn(handler))) => handler(args, self),
            Some((name, Builtin::Const(_))) => Err(RuntimeError::Type(format!(
                "`{name}' is a value and can not be called"
            ))),
            None => Err(RuntimeError::Vm(format!("unknown builtin index {index}"))),
        }
    }

    /// The `CALL argc` protocol.
    fn call(&self, ctx: &mut ExecutionContext, argc: u16) -> Result<(), RuntimeError> {
        let callee = ctx.pop()?;
        match callee {
            Value::Builtin(index) => {
                let mut args = self.pop_args(ctx, argc)?;
                let result = self.run_builtin(index, &mut args)?;
                ctx.push(result)
            }
            Value::PageAddr(page) => self.call_page(ctx, page, None, argc),
            Value::Closure(closure) => {
                self.call_page(ctx, closure.page_addr, Some(closure.scope), argc)
            }
            other => Err(RuntimeError::Type(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_page(
        &self,
        ctx: &mut ExecutionContext,
        page: u16,
        closure_scope: Option<ScopeRef>,
        argc: u16,
    ) -> Result<(), RuntimeError> {
        let code = self
            .state
            .pages
            .get(page as usize)
            .ok_or_else(|| RuntimeError::Vm(format!("call to invalid page {page}")))?;

        // arity header: first word of every function page
        let (declared, variadic) = match code.first() {
            Some(word) if word.opcode == Opcode::Nop => (
                word.primary & !VARIADIC_ARITY_BIT,
                word.primary & VARIADIC_ARITY_BIT != 0,
            ),
            _ => (argc, false),
        };
        if variadic {
            if argc < declared {
                return Err(RuntimeError::Arity(format!(
                    "function expected at least {declared} argument(s), got {argc}"
                )));
            }
        } else if argc != declared {
            return Err(RuntimeError::Arity(format!(
                "function expected {declared} argument(s), got {argc}"
            )));
        }

        let mut args = self.pop_args(ctx, argc)?;

        // caller state sits below the re-pushed arguments
        ctx.push(Value::Frame(FrameInfo {
            ip: ctx.ip,
            pp: ctx.pp,
            argc,
        }))?;

        let mut scope_count = 1u8;
        if let Some(scope) = closure_scope {
            // the captured scope becomes a parent of the call scope
            ctx.locals.push(scope);
            scope_count = 2;
        }
        ctx.push_scope();
        ctx.scope_count_to_delete.push(scope_count);
        ctx.fc += 1;

        if variadic {
            let rest = args.split_off(declared as usize);
            for value in args {
                ctx.push(value)?;
            }
            ctx.push(Value::list(rest))?;
        } else {
            for value in args {
                ctx.push(value)?;
            }
        }

        ctx.pp = page;
        ctx.ip = 0;
        Ok(())
    }

    /// The `RET` protocol: pop the result, drop this frame's scopes,
    /// restore the caller and push the result back.
    fn ret(&self, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        let value = ctx.pop()?;
        let scope_count = ctx
            .scope_count_to_delete
            .pop()
            .ok_or_else(|| RuntimeError::Vm("return outside of a call".to_string()))?;
        for _ in 0..scope_count {
            ctx.locals.pop();
        }
        match ctx.pop()? {
            Value::Frame(info) => {
                ctx.ip = info.ip;
                ctx.pp = info.pp;
                ctx.fc -= 1;
                ctx.push(value)
            }
            other => Err(RuntimeError::Vm(format!(
                "broken call frame: expected the saved caller state, found {}",
                other.type_name()
            ))),
        }
    }

    fn binary(
        &self,
        ctx: &mut ExecutionContext,
        op: fn(Value, Value) -> Result<Value, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let rhs = ctx.pop()?;
        let lhs = ctx.pop()?;
        let result = op(lhs, rhs)?;
        ctx.push(result)
    }

    fn compare(
        &self,
        ctx: &mut ExecutionContext,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> Result<(), RuntimeError> {
        let rhs = ctx.pop()?;
        let lhs = ctx.pop()?;
        let ordering = match (&lhs, &rhs) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        };
        let Some(ordering) = ordering else {
            return Err(RuntimeError::Type(format!(
                "can not compare {} with {}",
                lhs.type_name(),
                rhs.type_name()
            )));
        };
        ctx.push(Value::boolean(accept(ordering)))
    }
}

fn op_add(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (lhs, rhs) => Err(RuntimeError::Type(format!(
            "can not add {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn op_sub(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        (lhs, rhs) => Err(RuntimeError::Type(format!(
            "can not subtract {} from {}",
            rhs.type_name(),
            lhs.type_name()
        ))),
    }
}

fn op_mul(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (lhs, rhs) => Err(RuntimeError::Type(format!(
            "can not multiply {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn op_div(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero(format!("{a} / 0")));
            }
            Ok(Value::Number(a / b))
        }
        (lhs, rhs) => Err(RuntimeError::Type(format!(
            "can not divide {} by {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn op_mod(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero(format!("{a} mod 0")));
            }
            Ok(Value::Number(a % b))
        }
        (lhs, rhs) => Err(RuntimeError::Type(format!(
            "can not take {} modulo {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn as_list(value: &Value) -> Result<&crate::value::ListRef, RuntimeError> {
    match value {
        Value::List(list) => Ok(list),
        other => Err(RuntimeError::Type(format!(
            "expected a List, got {}",
            other.type_name()
        ))),
    }
}

fn tail_of(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::List(list) => {
            let guard = list.lock();
            Ok(Value::list(guard.iter().skip(1).cloned().collect()))
        }
        Value::String(s) => {
            let mut chars = s.chars();
            chars.next();
            Ok(Value::String(chars.collect()))
        }
        other => Err(RuntimeError::Type(format!(
            "tail expects a List or a String, got {}",
            other.type_name()
        ))),
    }
}

fn head_of(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::List(list) => Ok(list.lock().first().cloned().unwrap_or(Value::Nil)),
        Value::String(s) => Ok(s
            .chars()
            .next()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Nil)),
        other => Err(RuntimeError::Type(format!(
            "head expects a List or a String, got {}",
            other.type_name()
        ))),
    }
}

/// Bounds-check an index value against a container length, with negative
/// indices counting from the end.
fn normalize_index(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let Value::Number(n) = index else {
        return Err(RuntimeError::Type(format!(
            "index must be a Number, got {}",
            index.type_name()
        )));
    };
    let raw = *n as i64;
    let at = if raw < 0 { raw + len as i64 } else { raw };
    if at < 0 || at as usize >= len {
        return Err(RuntimeError::Index(format!(
            "index {raw} out of range (length {len})"
        )));
    }
    Ok(at as usize)
}
