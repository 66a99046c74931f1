//! Runtime values for the Rill VM.
//!
//! `Value` is a tagged variant; a value's tag never changes after
//! construction. `Clone` on a `Value` clones the *handle*: arrays and
//! functions stay shared, which is how one array aliases across stack slots
//! and bindings. The explicit `deep_clone` is the duplication operation the
//! language exposes, copying arrays element-by-element and re-duplicating a
//! function's captured environment.
//!
//! Two equality notions coexist and must not be confused:
//!
//! - `equals` is the *language* operation behind `eq`/`neq`: it rejects
//!   mismatched tags and refuses null/function operands.
//! - `PartialEq` is infrastructure equality for tests and diagnostics:
//!   total, structural, functions compared by handle identity.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::code::Code;
use crate::environment::Environment;
use crate::errors::{type_mismatch, unsupported_operation, VmError};
use crate::shared::Shared;

/// A function value: a named instruction stream closed over the environment
/// it was declared in.
///
/// Duplicates share the body (`Rc`) but each carries its own re-duplicated
/// environment handle.
#[derive(Clone)]
pub struct FunctionValue {
    /// Name the function was declared under.
    pub name: String,
    /// The body instruction stream, shared between duplicates.
    pub body: Rc<Code>,
    /// Environment captured at declaration time.
    pub env: Environment,
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The captured environment can reach back to the scope this function
        // is bound in; printing it would recurse forever.
        f.debug_struct("FunctionValue")
            .field("name", &self.name)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

/// A runtime value.
#[derive(Clone, Debug)]
pub enum Value {
    /// The absent value; also what bare declarations bind.
    Null,
    /// Signed 64-bit integer.
    Int(i64),
    /// Owned text.
    Str(String),
    /// Boolean.
    Bool(bool),
    /// Mutable, resizable sequence, shared by handle.
    Array(Shared<Vec<Value>>),
    /// Function with captured environment, shared by handle.
    Function(Shared<FunctionValue>),
}

impl Value {
    /// Integer value.
    #[inline]
    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    /// Text value.
    #[inline]
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Boolean value.
    #[inline]
    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    /// Array value over `items`.
    #[inline]
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Shared::new(items))
    }

    /// Function value.
    #[inline]
    pub fn function(func: FunctionValue) -> Self {
        Value::Function(Shared::new(func))
    }

    /// Tag name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::Array(_) => "array",
            Value::Function(_) => "function",
        }
    }

    /// The integer payload, or `TypeMismatch`.
    pub fn as_int(&self) -> Result<i64, VmError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(type_mismatch("int", other.type_name())),
        }
    }

    /// The text payload, or `TypeMismatch`.
    pub fn as_str(&self) -> Result<&str, VmError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(type_mismatch("str", other.type_name())),
        }
    }

    /// The boolean payload, or `TypeMismatch`.
    pub fn as_bool(&self) -> Result<bool, VmError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(type_mismatch("bool", other.type_name())),
        }
    }

    /// The array handle, or `TypeMismatch`.
    pub fn as_array(&self) -> Result<Shared<Vec<Value>>, VmError> {
        match self {
            Value::Array(items) => Ok(items.clone()),
            other => Err(type_mismatch("array", other.type_name())),
        }
    }

    /// The function handle, or `TypeMismatch`.
    pub fn as_function(&self) -> Result<Shared<FunctionValue>, VmError> {
        match self {
            Value::Function(func) => Ok(func.clone()),
            other => Err(type_mismatch("function", other.type_name())),
        }
    }

    /// Language-level equality, as used by the `eq`/`neq` instructions.
    ///
    /// Mismatched tags are a `TypeMismatch`; arrays compare deep,
    /// element-wise and order-sensitive; null and function operands are
    /// `UnsupportedOperation`.
    pub fn equals(&self, other: &Value) -> Result<bool, VmError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a == b),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Array(a), Value::Array(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.equals(y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Function(_), Value::Function(_)) => {
                Err(unsupported_operation("equality on function values"))
            }
            (Value::Null, Value::Null) => Err(unsupported_operation("equality on null")),
            _ => Err(type_mismatch(self.type_name(), other.type_name())),
        }
    }

    /// Language-level three-way comparison, as used by the ordering
    /// instructions. Defined for int and str only.
    pub fn compare(&self, other: &Value) -> Result<Ordering, VmError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bool(_), Value::Bool(_)) => {
                Err(unsupported_operation("ordering on bool values"))
            }
            (Value::Array(_), Value::Array(_)) => {
                Err(unsupported_operation("ordering on array values"))
            }
            (Value::Function(_), Value::Function(_)) => {
                Err(unsupported_operation("ordering on function values"))
            }
            (Value::Null, Value::Null) => Err(unsupported_operation("ordering on null")),
            _ => Err(type_mismatch(self.type_name(), other.type_name())),
        }
    }

    /// Deep duplication.
    ///
    /// Text is copied, arrays are copied element-by-element (each element
    /// deep-cloned), and a function keeps its body but gets a freshly
    /// duplicated environment (one new child scope over the shared chain).
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Int(n) => Value::Int(*n),
            Value::Str(s) => Value::Str(s.clone()),
            Value::Bool(b) => Value::Bool(*b),
            Value::Array(items) => {
                let copied = items.borrow().iter().map(Value::deep_clone).collect();
                Value::Array(Shared::new(copied))
            }
            Value::Function(func) => {
                let func = func.borrow();
                Value::Function(Shared::new(FunctionValue {
                    name: func.name.clone(),
                    body: Rc::clone(&func.body),
                    env: func.env.dup(),
                }))
            }
        }
    }

    /// Truthiness for the `if` instruction: nonzero ints and `true` are
    /// truthy, null is falsy, and every other tag is a condition error.
    pub fn is_truthy(&self) -> Result<bool, VmError> {
        match self {
            Value::Int(n) => Ok(*n != 0),
            Value::Bool(b) => Ok(*b),
            Value::Null => Ok(false),
            other => Err(type_mismatch("int, bool, or null condition", other.type_name())),
        }
    }
}

/// Infrastructure equality: total and structural, never errors.
///
/// Functions compare by handle identity; use `Value::equals` for the
/// language's semantics.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.ptr_eq(b) || *a.borrow() == *b.borrow()
            }
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Function(func) => write!(f, "<function {}>", func.borrow().name),
        }
    }
}
