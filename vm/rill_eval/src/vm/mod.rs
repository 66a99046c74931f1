//! The dispatch engine.
//!
//! One `Vm` executes one program: it owns the operand stack and the current
//! environment, and `execute` runs a stream to completion or to the first
//! error. `call` swaps a child environment in for the duration of the callee
//! body and re-enters `execute`; the operand stack is never swapped, so
//! whatever the callee leaves on top is the caller's to consume.

mod builder;

pub use builder::VmBuilder;

use std::cmp::Ordering;
use std::rc::Rc;

use tracing::trace;

use rill_runtime::errors::{
    assertion_failed, division_by_zero, index_out_of_range, integer_overflow,
    malformed_instruction, resource_exhausted, stack_underflow, unbound_variable,
    unsupported_operation,
};
use rill_runtime::{Code, Environment, FunctionValue, Op, Slot, Value, VmError, VmResult};

use crate::print_handler::SharedPrintHandler;
use crate::stack::ensure_sufficient_stack;

/// Default bound on interpreted call depth.
pub const DEFAULT_CALL_DEPTH_LIMIT: usize = 256;

/// The interpreter.
pub struct Vm {
    /// Operand stack, shared across the whole run including calls.
    stack: Vec<Value>,
    /// Environment of the currently executing frame.
    env: Environment,
    /// Destination for the print builtins.
    print: SharedPrintHandler,
    /// Current interpreted call depth.
    call_depth: usize,
    /// Depth at which further calls fail with `ResourceExhausted`.
    call_depth_limit: usize,
}

/// Read the next slot as a value immediate for `op`.
fn immediate<'c>(code: &'c Code, pc: &mut usize, op: Op) -> Result<&'c Value, VmError> {
    match code.get(*pc) {
        Some(Slot::Value(value)) => {
            *pc += 1;
            Ok(value)
        }
        _ => Err(malformed_instruction(format!(
            "{op} is missing its immediate"
        ))),
    }
}

/// Read the next slot as a name (text) immediate for `op`.
fn name_immediate<'c>(code: &'c Code, pc: &mut usize, op: Op) -> Result<&'c str, VmError> {
    match immediate(code, pc, op)? {
        Value::Str(name) => Ok(name),
        other => Err(malformed_instruction(format!(
            "{op} expects a name immediate, got {}",
            other.type_name()
        ))),
    }
}

/// Read the next slot as an integer immediate for `op`.
fn int_immediate(code: &Code, pc: &mut usize, op: Op) -> Result<i64, VmError> {
    match immediate(code, pc, op)? {
        Value::Int(n) => Ok(*n),
        other => Err(malformed_instruction(format!(
            "{op} expects an int immediate, got {}",
            other.type_name()
        ))),
    }
}

/// Slot count immediate (body/block lengths, array sizes): must be
/// non-negative.
fn count_immediate(code: &Code, pc: &mut usize, op: Op) -> Result<usize, VmError> {
    let n = int_immediate(code, pc, op)?;
    usize::try_from(n)
        .map_err(|_| malformed_instruction(format!("{op} has negative count {n}")))
}

impl Vm {
    /// Fresh interpreter with the builtins installed and default settings.
    pub fn new() -> Self {
        VmBuilder::new().build()
    }

    /// Assemble a `Vm` and install the `print`/`println` builtins into the
    /// root scope as ordinary function values, so user code reaches them
    /// through the `call` opcode like any other function.
    pub(crate) fn with_parts(print: SharedPrintHandler, call_depth_limit: usize) -> Self {
        let mut env = Environment::new();
        for (name, op) in [("print", Op::Print), ("println", Op::Println)] {
            let mut body = Code::new();
            body.push_op(op);
            let func = FunctionValue {
                name: name.to_owned(),
                body: Rc::new(body),
                env: env.clone(),
            };
            env.define(name, Value::function(func));
        }
        Vm {
            stack: Vec::new(),
            env,
            print,
            call_depth: 0,
            call_depth_limit,
        }
    }

    /// The operand stack, bottom to top. Observational.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// The current environment. Observational.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Execute an instruction stream.
    ///
    /// Runs until a `ret` or the end of the stream; either way the result is
    /// the top of the operand stack (left in place), or null when the stack
    /// is empty. The first precondition violation aborts with an error; no
    /// recovery happens below the host.
    pub fn execute(&mut self, code: &Code) -> VmResult {
        let mut pc = 0usize;
        while pc < code.len() {
            let op = match code.get(pc) {
                Some(Slot::Op(op)) => *op,
                Some(Slot::Value(value)) => {
                    return Err(malformed_instruction(format!(
                        "value immediate {value} in opcode position {pc}"
                    )));
                }
                None => break,
            };
            if tracing::enabled!(tracing::Level::TRACE) {
                self.trace_step(pc, op);
            }
            pc += 1;
            match op {
                Op::DeclareVar => {
                    let name = name_immediate(code, &mut pc, op)?.to_owned();
                    self.env.define(name, Value::Null);
                }
                Op::DeclareAssign | Op::Assign => {
                    let name = name_immediate(code, &mut pc, op)?.to_owned();
                    let value = self.pop(op)?;
                    self.env.define(name, value);
                }
                Op::Pop => {
                    self.pop(op)?;
                }
                Op::Push => {
                    let value = immediate(code, &mut pc, op)?.clone();
                    self.stack.push(value);
                }
                Op::Add => self.binary_int(op, i64::checked_add)?,
                Op::Sub => self.binary_int(op, i64::checked_sub)?,
                Op::Mul => self.binary_int(op, i64::checked_mul)?,
                Op::Div => self.binary_int(op, i64::checked_div)?,
                Op::Mod => self.binary_int(op, i64::checked_rem)?,
                Op::Return => return Ok(self.top_or_null()),
                Op::GetVar => {
                    let name = name_immediate(code, &mut pc, op)?;
                    let value = self
                        .env
                        .get(name)
                        .ok_or_else(|| unbound_variable(name))?;
                    self.stack.push(value);
                }
                Op::SetVarPop => {
                    let name = name_immediate(code, &mut pc, op)?;
                    let value = self.pop(op)?;
                    self.env.set(name, value);
                }
                Op::SetArrayElem => {
                    let name = name_immediate(code, &mut pc, op)?;
                    let index = self.pop(op)?.as_int()?;
                    let value = self.pop(op)?;
                    let array = self.lookup_array(name)?;
                    let mut items = array.borrow_mut();
                    let len = items.len();
                    let idx = usize::try_from(index)
                        .map_err(|_| index_out_of_range(index, len))?;
                    let slot = items
                        .get_mut(idx)
                        .ok_or_else(|| index_out_of_range(index, len))?;
                    *slot = value;
                }
                Op::GetArrayElem => {
                    let name = name_immediate(code, &mut pc, op)?;
                    let index = self.pop(op)?.as_int()?;
                    let array = self.lookup_array(name)?;
                    let element = {
                        let items = array.borrow();
                        usize::try_from(index)
                            .ok()
                            .and_then(|i| items.get(i).cloned())
                            .ok_or_else(|| index_out_of_range(index, items.len()))?
                    };
                    self.stack.push(element);
                }
                Op::MakeArray => {
                    let count = count_immediate(code, &mut pc, op)?;
                    let mut items = vec![Value::Null; count];
                    // Top of stack becomes the last element.
                    for slot in items.iter_mut().rev() {
                        *slot = self.pop(op)?;
                    }
                    self.stack.push(Value::array(items));
                }
                Op::Call => {
                    let name = name_immediate(code, &mut pc, op)?;
                    self.call(name)?;
                }
                Op::Nop => {
                    // Tolerate a stray immediate slot after a nop.
                    if matches!(code.get(pc), Some(Slot::Value(_))) {
                        pc += 1;
                    }
                }
                Op::DeclareFn => {
                    let name = name_immediate(code, &mut pc, op)?.to_owned();
                    let body_len = count_immediate(code, &mut pc, op)?;
                    let end = pc
                        .checked_add(body_len)
                        .filter(|&end| end <= code.len())
                        .ok_or_else(|| {
                            malformed_instruction(format!(
                                "function body for {name} runs past the end of the stream"
                            ))
                        })?;
                    let body = code.slice(pc, end);
                    pc = end;
                    let func = FunctionValue {
                        name: name.clone(),
                        body: Rc::new(body),
                        env: self.env.dup(),
                    };
                    self.env.define(name, Value::function(func));
                }
                Op::Eq => {
                    let (a, b) = self.pop_pair(op)?;
                    let eq = a.equals(&b)?;
                    self.stack.push(Value::bool(eq));
                }
                Op::NotEq => {
                    let (a, b) = self.pop_pair(op)?;
                    let eq = a.equals(&b)?;
                    self.stack.push(Value::bool(!eq));
                }
                Op::Lt => self.ordering(op, Ordering::is_lt)?,
                Op::Lte => self.ordering(op, Ordering::is_le)?,
                Op::Gt => self.ordering(op, Ordering::is_gt)?,
                Op::Gte => self.ordering(op, Ordering::is_ge)?,
                Op::And => self.logical(op, |a, b| a && b)?,
                Op::Or => self.logical(op, |a, b| a || b)?,
                Op::Xor => return Err(unsupported_operation("xor")),
                Op::JumpRel => {
                    let offset = int_immediate(code, &mut pc, op)?;
                    pc = relative_target(pc, offset)?;
                }
                Op::JumpAbs => {
                    let target = int_immediate(code, &mut pc, op)?;
                    pc = usize::try_from(target).map_err(|_| {
                        malformed_instruction(format!("negative jump target {target}"))
                    })?;
                }
                Op::If => {
                    let truthy = self.pop(op)?.is_truthy()?;
                    let block_len = count_immediate(code, &mut pc, op)?;
                    if !truthy {
                        pc = pc.saturating_add(block_len);
                    }
                }
                Op::Print => {
                    let value = self.pop(op)?;
                    self.print.print(&value.to_string());
                }
                Op::Println => {
                    let value = self.pop(op)?;
                    self.print.println(&value.to_string());
                }
                Op::Assert => {
                    let message = self.pop(op)?.as_str()?.to_owned();
                    let passed = self.pop(op)?.as_bool()?;
                    if !passed {
                        return Err(assertion_failed(message));
                    }
                }
            }
        }
        Ok(self.top_or_null())
    }

    /// Call the function bound to `name` in the current (caller's)
    /// environment: duplicate its captured environment for the frame, run
    /// the body, restore the caller's environment. The callee's result stays
    /// on the shared operand stack.
    #[tracing::instrument(level = "debug", skip(self))]
    fn call(&mut self, name: &str) -> Result<(), VmError> {
        let callee = self
            .env
            .get(name)
            .ok_or_else(|| unbound_variable(name))?;
        let func = callee.as_function()?;
        let (body, frame_env) = {
            let func = func.borrow();
            (Rc::clone(&func.body), func.env.dup())
        };
        if self.call_depth >= self.call_depth_limit {
            return Err(resource_exhausted(self.call_depth_limit));
        }
        self.call_depth += 1;
        let caller_env = std::mem::replace(&mut self.env, frame_env);
        let result = ensure_sufficient_stack(|| self.execute(&body));
        self.env = caller_env;
        self.call_depth -= 1;
        result.map(|_| ())
    }

    fn pop(&mut self, op: Op) -> Result<Value, VmError> {
        self.stack.pop().ok_or_else(|| stack_underflow(op.mnemonic()))
    }

    /// Pop the two operands of a binary instruction: the right-hand side is
    /// on top.
    fn pop_pair(&mut self, op: Op) -> Result<(Value, Value), VmError> {
        let b = self.pop(op)?;
        let a = self.pop(op)?;
        Ok((a, b))
    }

    fn top_or_null(&self) -> Value {
        self.stack.last().cloned().unwrap_or(Value::Null)
    }

    fn lookup_array(&self, name: &str) -> Result<rill_runtime::Shared<Vec<Value>>, VmError> {
        self.env
            .get(name)
            .ok_or_else(|| unbound_variable(name))?
            .as_array()
    }

    fn binary_int(&mut self, op: Op, apply: fn(i64, i64) -> Option<i64>) -> Result<(), VmError> {
        let (a, b) = self.pop_pair(op)?;
        let b = b.as_int()?;
        let a = a.as_int()?;
        if matches!(op, Op::Div | Op::Mod) && b == 0 {
            return Err(division_by_zero());
        }
        let result = apply(a, b).ok_or_else(|| integer_overflow(op.mnemonic()))?;
        self.stack.push(Value::int(result));
        Ok(())
    }

    fn ordering(&mut self, op: Op, accept: fn(Ordering) -> bool) -> Result<(), VmError> {
        let (a, b) = self.pop_pair(op)?;
        let ord = a.compare(&b)?;
        self.stack.push(Value::bool(accept(ord)));
        Ok(())
    }

    fn logical(&mut self, op: Op, apply: fn(bool, bool) -> bool) -> Result<(), VmError> {
        let (a, b) = self.pop_pair(op)?;
        let b = b.as_bool()?;
        let a = a.as_bool()?;
        self.stack.push(Value::bool(apply(a, b)));
        Ok(())
    }

    /// Per-step trace: opcode, current-scope bindings, full operand stack.
    fn trace_step(&self, pc: usize, op: Op) {
        let slots: Vec<String> = self.stack.iter().map(ToString::to_string).collect();
        let stack = format!("[{}]", slots.join(", "));
        let bindings: Vec<String> = self
            .env
            .local_bindings()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        let scope = bindings.join(", ");
        trace!(pc, op = %op, stack = %stack, scope = %scope);
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a relative jump from the slot after the offset immediate.
fn relative_target(pc: usize, offset: i64) -> Result<usize, VmError> {
    let base = i64::try_from(pc)
        .map_err(|_| malformed_instruction("program counter out of range".to_owned()))?;
    let target = base
        .checked_add(offset)
        .ok_or_else(|| malformed_instruction(format!("relative jump overflow ({offset})")))?;
    usize::try_from(target)
        .map_err(|_| malformed_instruction(format!("relative jump to negative slot {target}")))
}

#[cfg(test)]
mod tests;
