//! Runtime error taxonomy for the VM.
//!
//! Every precondition violation during execution is unrecoverable within the
//! interpreter: the error propagates up through `execute` and the host
//! decides whether to report and retry a fresh run. Factory functions (e.g.
//! `unbound_variable()`) are the public construction API; they populate both
//! the structured `kind` and the display `message`.

use std::fmt;

use crate::value::Value;

/// Result of executing an instruction stream.
pub type VmResult = Result<Value, VmError>;

/// Structured category for a runtime failure.
///
/// Variants carry the context needed for a useful diagnostic; matching on
/// the kind (rather than parsing messages) is how tests and hosts
/// distinguish failure modes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VmErrorKind {
    /// Operating on or comparing values of incompatible tags.
    TypeMismatch { expected: String, got: String },
    /// `get`/`call` on a name with no binding anywhere in the scope chain.
    UnboundVariable { name: String },
    /// Array access outside `0..len`.
    IndexOutOfRange { index: i64, len: usize },
    /// Pop on an empty operand stack, tagged with the opcode that popped.
    StackUnderflow { op: String },
    /// Operation the value model does not define (xor, non-ordered compare).
    UnsupportedOperation { what: String },
    /// Program-level `assert` failed with its message operand.
    AssertionFailed { message: String },
    /// Integer division or modulo by zero.
    DivisionByZero,
    /// Checked integer arithmetic overflowed.
    IntegerOverflow { op: String },
    /// Interpreted call depth exceeded the configured limit.
    ResourceExhausted { depth: usize },
    /// Instruction stream violated an opcode's layout contract.
    MalformedInstruction { detail: String },
}

impl fmt::Display for VmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {expected}, got {got}")
            }
            Self::UnboundVariable { name } => write!(f, "no such variable: {name}"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "array index {index} out of range (length {len})")
            }
            Self::StackUnderflow { op } => write!(f, "operand stack underflow in {op}"),
            Self::UnsupportedOperation { what } => write!(f, "unsupported operation: {what}"),
            Self::AssertionFailed { message } => write!(f, "assertion failed: {message}"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::IntegerOverflow { op } => write!(f, "integer overflow in {op}"),
            Self::ResourceExhausted { depth } => {
                write!(f, "call depth limit exceeded (limit: {depth})")
            }
            Self::MalformedInstruction { detail } => {
                write!(f, "malformed instruction stream: {detail}")
            }
        }
    }
}

/// Runtime error.
///
/// Carries the structured `kind` plus a preformatted message. There is no
/// recovery mechanism below the host: construction is always followed by
/// `?`-propagation out of the dispatch loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmError {
    /// Structured failure category.
    pub kind: VmErrorKind,
    /// Human-readable rendering of `kind`.
    pub message: String,
}

impl VmError {
    fn from_kind(kind: VmErrorKind) -> Self {
        let message = kind.to_string();
        VmError { kind, message }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for VmError {}

// Factory constructors

/// Values of incompatible tags met in an operation.
pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> VmError {
    VmError::from_kind(VmErrorKind::TypeMismatch {
        expected: expected.into(),
        got: got.into(),
    })
}

/// Lookup of a name with no binding in the scope chain.
pub fn unbound_variable(name: impl Into<String>) -> VmError {
    VmError::from_kind(VmErrorKind::UnboundVariable { name: name.into() })
}

/// Array access outside the valid index range.
pub fn index_out_of_range(index: i64, len: usize) -> VmError {
    VmError::from_kind(VmErrorKind::IndexOutOfRange { index, len })
}

/// Pop on an empty operand stack while executing `op`.
pub fn stack_underflow(op: impl Into<String>) -> VmError {
    VmError::from_kind(VmErrorKind::StackUnderflow { op: op.into() })
}

/// Operation the value model does not define.
pub fn unsupported_operation(what: impl Into<String>) -> VmError {
    VmError::from_kind(VmErrorKind::UnsupportedOperation { what: what.into() })
}

/// Program-level assertion failure.
pub fn assertion_failed(message: impl Into<String>) -> VmError {
    VmError::from_kind(VmErrorKind::AssertionFailed {
        message: message.into(),
    })
}

/// Integer division or modulo by zero.
pub fn division_by_zero() -> VmError {
    VmError::from_kind(VmErrorKind::DivisionByZero)
}

/// Checked integer arithmetic overflowed in `op`.
pub fn integer_overflow(op: impl Into<String>) -> VmError {
    VmError::from_kind(VmErrorKind::IntegerOverflow { op: op.into() })
}

/// Call depth exceeded the configured limit.
pub fn resource_exhausted(depth: usize) -> VmError {
    VmError::from_kind(VmErrorKind::ResourceExhausted { depth })
}

/// Instruction stream violated an opcode's layout contract.
pub fn malformed_instruction(detail: impl Into<String>) -> VmError {
    VmError::from_kind(VmErrorKind::MalformedInstruction {
        detail: detail.into(),
    })
}
