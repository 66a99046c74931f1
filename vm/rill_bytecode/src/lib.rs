//! Rill Bytecode - loader for compiled programs.
//!
//! A compiled program is a flat sequence of little-endian 64-bit words: an
//! alternation of opcode tags and serialized value immediates, in exactly
//! the per-opcode layout the VM executes. This crate reads the words and
//! decodes them into a `Code` stream; it is the only place the wire format
//! is known.
//!
//! # Wire format
//!
//! A serialized value is a tag word followed by its payload:
//!
//! | tag | payload |
//! |-----|---------|
//! | 0 int | one word |
//! | 1 str | length word, then one word per character |
//! | 2 bool | one word, nonzero is true |
//! | 3 array | length word, then that many serialized elements |
//! | 4 function | not serializable |
//! | 5 null | none |
//!
//! Function bodies are not nested: `declare_fn` carries its name and body
//! length, and the body instructions follow as ordinary stream content.

use std::path::Path;

use rill_runtime::{Code, Op, Value};
use thiserror::Error;

/// Serialized value tags.
mod tag {
    pub const INT: i64 = 0;
    pub const STR: i64 = 1;
    pub const BOOL: i64 = 2;
    pub const ARRAY: i64 = 3;
    pub const FUNCTION: i64 = 4;
    pub const NULL: i64 = 5;
}

/// Failure while reading or decoding a compiled program.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read program: {0}")]
    Io(#[from] std::io::Error),
    #[error("program ends mid-instruction")]
    UnexpectedEof,
    #[error("program length is not a whole number of words ({0} trailing bytes)")]
    TrailingBytes(usize),
    #[error("unknown opcode tag {0}")]
    UnknownOpcode(i64),
    #[error("unknown value tag {0}")]
    UnknownValueTag(i64),
    #[error("word {0} is not a character")]
    InvalidChar(i64),
    #[error("negative length {0}")]
    NegativeLength(i64),
    #[error("{0} cannot appear in a serialized program")]
    Unsupported(&'static str),
}

struct Cursor<'w> {
    words: &'w [i64],
    pos: usize,
}

impl<'w> Cursor<'w> {
    fn new(words: &'w [i64]) -> Self {
        Cursor { words, pos: 0 }
    }

    fn next(&mut self) -> Result<i64, DecodeError> {
        let word = *self.words.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        Ok(word)
    }

    fn next_opt(&mut self) -> Option<i64> {
        let word = *self.words.get(self.pos)?;
        self.pos += 1;
        Some(word)
    }

    fn length(&mut self) -> Result<usize, DecodeError> {
        let n = self.next()?;
        usize::try_from(n).map_err(|_| DecodeError::NegativeLength(n))
    }
}

fn decode_value(cursor: &mut Cursor<'_>) -> Result<Value, DecodeError> {
    let tag = cursor.next()?;
    match tag {
        tag::INT => Ok(Value::int(cursor.next()?)),
        tag::STR => {
            let len = cursor.length()?;
            let mut text = String::with_capacity(len);
            for _ in 0..len {
                let word = cursor.next()?;
                let ch = u32::try_from(word)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or(DecodeError::InvalidChar(word))?;
                text.push(ch);
            }
            Ok(Value::string(text))
        }
        tag::BOOL => Ok(Value::bool(cursor.next()? != 0)),
        tag::ARRAY => {
            let len = cursor.length()?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_value(cursor)?);
            }
            Ok(Value::array(items))
        }
        tag::FUNCTION => Err(DecodeError::Unsupported("a function value")),
        tag::NULL => Ok(Value::Null),
        other => Err(DecodeError::UnknownValueTag(other)),
    }
}

/// Decode a word stream into an instruction stream.
pub fn decode(words: &[i64]) -> Result<Code, DecodeError> {
    let mut cursor = Cursor::new(words);
    let mut code = Code::new();
    while let Some(word) = cursor.next_opt() {
        let op = Op::from_wire(word).ok_or(DecodeError::UnknownOpcode(word))?;
        match op {
            // The compiler never emits a bare pop; its presence means the
            // stream is not a compiled program.
            Op::Pop => return Err(DecodeError::Unsupported("pop")),
            // A nop carries one spare word; drop it.
            Op::Nop => {
                code.push_op(op);
                cursor.next()?;
            }
            _ => {
                code.push_op(op);
                for _ in 0..op.immediate_count() {
                    code.push_value(decode_value(&mut cursor)?);
                }
            }
        }
    }
    Ok(code)
}

/// Split a raw byte buffer into little-endian words.
fn words_of(bytes: &[u8]) -> Result<Vec<i64>, DecodeError> {
    let mut chunks = bytes.chunks_exact(8);
    let words = chunks
        .by_ref()
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            i64::from_le_bytes(word)
        })
        .collect();
    let trailing = chunks.remainder().len();
    if trailing != 0 {
        return Err(DecodeError::TrailingBytes(trailing));
    }
    Ok(words)
}

/// Read and decode a compiled program from disk.
pub fn read_program(path: impl AsRef<Path>) -> Result<Code, DecodeError> {
    let bytes = std::fs::read(path)?;
    decode(&words_of(&bytes)?)
}
