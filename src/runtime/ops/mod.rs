//! WebAssembly operation implementations
//!
//! This module contains the implementation of the instructions, organised
//! by category. Operations that only touch the operand stack take it
//! alone; the rest are handed the memory, table, global or frame they act
//! on by the executor.

pub mod bitwise;
pub mod comparison;
pub mod control;
pub mod conversion;
pub mod memory;
pub mod numeric;
pub mod parametric;
pub mod reference;
pub mod table;
pub mod variable;
// Re-export commonly used types for operation implementations
pub(crate) use crate::parser::instruction::MemArg;
pub(crate) use crate::runtime::memory::Memory;
pub(crate) use crate::runtime::stack::Stack;
pub(crate) use crate::runtime::table::Table;
pub(crate) use crate::runtime::{RuntimeError, TrapKind, Value};
