//! WebAssembly call frame
//!
//! One activation record per active wasm call. Labels and operand values
//! live in the executor's shared stacks; a frame records where its own
//! portion of each starts.

use super::instance::Instance;
use super::Value;
use crate::parser::validate::FunctionCode;

#[derive(Debug)]
pub struct Frame<'s> {
    pub instance: &'s Instance,
    pub code: &'s FunctionCode,
    /// Parameters followed by declared locals
    pub locals: Vec<Value>,
    /// Index of the next instruction
    pub pc: usize,
    /// Label stack height when the function was entered
    pub label_base: usize,
    /// Operand stack height below this call's values
    pub stack_base: usize,
    /// Number of results
    pub arity: usize,
}

impl Frame<'_> {
    pub fn func_idx(&self) -> u32 {
        self.code.func_idx
    }
}
