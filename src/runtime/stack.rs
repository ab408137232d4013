//! WebAssembly value stack implementation

use super::store::FuncAddr;
use super::{RuntimeError, Value};
use crate::parser::module::ValueType;

/// The operand stack, shared by every frame of one invocation
#[derive(Debug, Default)]
pub struct Stack {
    values: Vec<Value>,
}

impl Stack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Stack { values: Vec::new() }
    }

    /// Push a value onto the stack
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Push multiple values onto the stack
    pub fn push_all(&mut self, values: impl IntoIterator<Item = Value>) {
        self.values.extend(values);
    }

    /// Pop a value from the stack
    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.values.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pop the top `n` values, keeping their order
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let start = self
            .values
            .len()
            .checked_sub(n)
            .ok_or(RuntimeError::StackUnderflow)?;
        Ok(self.values.split_off(start))
    }

    /// Pop a value and check its type
    pub fn pop_typed(&mut self, expected: ValueType) -> Result<Value, RuntimeError> {
        let value = self.pop()?;
        if value.typ() != expected {
            return Err(RuntimeError::TypeMismatch {
                expected,
                actual: value.typ(),
            });
        }
        Ok(value)
    }

    /// Pop an i32 value
    pub fn pop_i32(&mut self) -> Result<i32, RuntimeError> {
        match self.pop()? {
            Value::I32(v) => Ok(v),
            other => Err(type_mismatch(ValueType::I32, &other)),
        }
    }

    /// Pop an i64 value
    pub fn pop_i64(&mut self) -> Result<i64, RuntimeError> {
        match self.pop()? {
            Value::I64(v) => Ok(v),
            other => Err(type_mismatch(ValueType::I64, &other)),
        }
    }

    /// Pop an f32 value
    pub fn pop_f32(&mut self) -> Result<f32, RuntimeError> {
        match self.pop()? {
            Value::F32(v) => Ok(v),
            other => Err(type_mismatch(ValueType::F32, &other)),
        }
    }

    /// Pop an f64 value
    pub fn pop_f64(&mut self) -> Result<f64, RuntimeError> {
        match self.pop()? {
            Value::F64(v) => Ok(v),
            other => Err(type_mismatch(ValueType::F64, &other)),
        }
    }

    /// Pop a function reference
    pub fn pop_funcref(&mut self) -> Result<Option<FuncAddr>, RuntimeError> {
        match self.pop()? {
            Value::FuncRef(v) => Ok(v),
            other => Err(type_mismatch(ValueType::FuncRef, &other)),
        }
    }

    /// Pop an i32 used as an address, index or length
    pub fn pop_u32(&mut self) -> Result<u32, RuntimeError> {
        Ok(self.pop_i32()? as u32)
    }

    /// Get the current stack depth
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    /// Check if the stack is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop everything above `height`
    pub fn truncate(&mut self, height: usize) {
        self.values.truncate(height);
    }

    /// Get all values (used for returning results)
    pub fn drain(&mut self) -> Vec<Value> {
        self.values.drain(..).collect()
    }

    /// Peek at the top value without popping
    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }
}

fn type_mismatch(expected: ValueType, actual: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected,
        actual: actual.typ(),
    }
}
