//! Rill Eval - the bytecode interpreter.
//!
//! `Vm` owns an operand stack and the current environment, and executes a
//! decoded instruction stream opcode-by-opcode. Function calls re-enter the
//! dispatch loop recursively against a fresh child environment; the operand
//! stack is shared across the whole run, which is how a callee's result
//! reaches its caller.
//!
//! Dispatch is a plain `match` per opcode. Direct-threaded dispatch would
//! only change decode overhead, not observable behavior, so the simple loop
//! is the implementation of record.

mod print_handler;
mod stack;
mod vm;

// Re-export the runtime model for convenience
pub use rill_runtime::{
    Code, Environment, FunctionValue, Op, OrderedMap, Scope, Shared, Slot, Value, VmError,
    VmErrorKind, VmResult,
};

pub use print_handler::{
    buffer_handler, silent_handler, stdout_handler, BufferPrintHandler, PrintHandlerImpl,
    SharedPrintHandler, StdoutPrintHandler,
};
pub use stack::ensure_sufficient_stack;
pub use vm::{Vm, VmBuilder, DEFAULT_CALL_DEPTH_LIMIT};
