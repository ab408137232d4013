//! Global variable instances

use super::{RuntimeError, Value};
use crate::parser::module::GlobalType;
use std::cell::Cell;

/// A typed global cell. Shared by every instance that imports it.
#[derive(Debug)]
pub struct Global {
    global_type: GlobalType,
    value: Cell<Value>,
}

impl Global {
    /// Create a global holding `value`, which must match the declared type.
    pub fn new(global_type: GlobalType, value: Value) -> Result<Self, RuntimeError> {
        if value.typ() != global_type.value_type {
            return Err(RuntimeError::TypeMismatch {
                expected: global_type.value_type,
                actual: value.typ(),
            });
        }
        Ok(Global {
            global_type,
            value: Cell::new(value),
        })
    }

    pub fn global_type(&self) -> GlobalType {
        self.global_type
    }

    pub fn get(&self) -> Value {
        self.value.get()
    }

    /// Replace the value of a mutable global.
    pub fn set(&self, value: Value) -> Result<(), RuntimeError> {
        if !self.global_type.mutable {
            return Err(RuntimeError::ImmutableGlobal);
        }
        if value.typ() != self.global_type.value_type {
            return Err(RuntimeError::TypeMismatch {
                expected: self.global_type.value_type,
                actual: value.typ(),
            });
        }
        self.value.set(value);
        Ok(())
    }
}
