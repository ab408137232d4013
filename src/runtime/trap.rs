//! Runtime traps
//!
//! A trap aborts the current invocation and every frame beneath it. State
//! committed by earlier instructions stays as it was; the trapping
//! instruction itself has no effect.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrapKind {
    #[error("unreachable")]
    Unreachable,
    #[error("integer divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversion,
    #[error("out of bounds memory access")]
    OutOfBoundsMemory,
    #[error("out of bounds table access")]
    OutOfBoundsTable,
    #[error("uninitialized element")]
    UninitializedElement,
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    #[error("call stack exhausted")]
    CallStackExhausted,
    /// Raised by a host function
    #[error("host trap: {0}")]
    Host(String),
}

/// A trap with the function and instruction that raised it. Traps raised by
/// host functions, or before any instruction ran, carry no location.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}{}", TrapLocation(.func_idx, .instr_idx))]
pub struct Trap {
    pub kind: TrapKind,
    pub func_idx: Option<u32>,
    pub instr_idx: Option<usize>,
}

struct TrapLocation<'a>(&'a Option<u32>, &'a Option<usize>);

impl fmt::Display for TrapLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.0, self.1) {
            (Some(func_idx), Some(instr_idx)) => {
                write!(f, " (function {func_idx}, instruction {instr_idx})")
            }
            (Some(func_idx), None) => write!(f, " (function {func_idx})"),
            _ => Ok(()),
        }
    }
}

impl Trap {
    pub fn new(kind: TrapKind) -> Self {
        Trap {
            kind,
            func_idx: None,
            instr_idx: None,
        }
    }

    /// A trap raised by host code
    pub fn host(message: impl Into<String>) -> Self {
        Trap::new(TrapKind::Host(message.into()))
    }

    /// Record where the trap happened, unless an inner frame already did.
    pub(crate) fn at(mut self, func_idx: u32, instr_idx: usize) -> Self {
        if self.func_idx.is_none() {
            self.func_idx = Some(func_idx);
            self.instr_idx = Some(instr_idx);
        }
        self
    }
}

impl From<TrapKind> for Trap {
    fn from(kind: TrapKind) -> Self {
        Trap::new(kind)
    }
}
