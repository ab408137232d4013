//! WebAssembly runtime implementation
//!
//! This module provides the execution engine for validated modules: the
//! store and its instances, linear memories, tables, globals, import
//! resolution and the stack-machine interpreter.

pub mod config;
pub mod control;
pub mod executor;
pub mod frame;
pub mod global;
pub mod imports;
pub mod instance;
pub mod link;
pub mod memory;
pub mod ops;
pub mod stack;
pub mod store;
pub mod table;
pub mod test_utils;
pub mod trap;
pub mod value;

pub use config::EngineConfig;
pub use global::Global;
pub use imports::{Extern, ImportObject};
pub use instance::Instance;
pub use link::{LinkError, Segment};
pub use memory::Memory;
pub use store::{
    FuncAddr, FunctionInstance, GlobalAddr, InstanceAddr, MemoryAddr, SharedGlobal, SharedMemory, SharedTable,
    Store, TableAddr,
};
pub use table::Table;
pub use trap::{Trap, TrapKind};
pub use value::Value;

use crate::parser::module::ValueType;

/// Failures of a host call into the runtime.
///
/// `StackUnderflow` and `TypeMismatch` cannot happen for validated code;
/// they are reported rather than panicking if an internal invariant breaks.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Trap(#[from] Trap),
    #[error("unknown export: {0}")]
    UnknownExport(String),
    #[error("export {0} is not a function")]
    NotAFunction(String),
    #[error("argument mismatch: expected {expected:?}, got {actual:?}")]
    ArgumentMismatch {
        expected: Vec<ValueType>,
        actual: Vec<ValueType>,
    },
    #[error("unknown instance: {0}")]
    UnknownInstance(usize),
    #[error("unknown function address: {0}")]
    UnknownFunction(usize),
    #[error("unknown {kind} address: {addr}")]
    UnknownAddress { kind: &'static str, addr: usize },
    #[error("global is immutable")]
    ImmutableGlobal,
    #[error("invalid constant expression: {0}")]
    InvalidConstExpr(String),
    #[error("resource limit: {0}")]
    ResourceLimit(String),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: ValueType, actual: ValueType },
}

impl RuntimeError {
    /// The trap kind, if this error is a trap
    pub fn trap_kind(&self) -> Option<&TrapKind> {
        match self {
            RuntimeError::Trap(trap) => Some(&trap.kind),
            _ => None,
        }
    }

    /// Attach a location to a trap raised while executing `func_idx`.
    pub(crate) fn at(self, func_idx: u32, instr_idx: usize) -> Self {
        match self {
            RuntimeError::Trap(trap) => RuntimeError::Trap(trap.at(func_idx, instr_idx)),
            other => other,
        }
    }
}

impl From<TrapKind> for RuntimeError {
    fn from(kind: TrapKind) -> Self {
        RuntimeError::Trap(Trap::new(kind))
    }
}
