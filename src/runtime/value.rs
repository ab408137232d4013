//! WebAssembly value representation

use super::store::FuncAddr;
use crate::parser::module::{RefType, ValueType};
use fhex::ToHex;
use std::fmt;

/// Runtime representation of WebAssembly values
///
/// Floats are stored as Rust floats but never normalised, so NaN payloads
/// survive loads, stores, `reinterpret` and parameter passing unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Function reference, `None` for `ref.null func`
    FuncRef(Option<FuncAddr>),
    /// Host reference, `None` for `ref.null extern`
    ExternRef(Option<u32>),
}

impl Value {
    /// Get the WebAssembly type of this value
    pub fn typ(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::FuncRef(_) => ValueType::FuncRef,
            Value::ExternRef(_) => ValueType::ExternRef,
        }
    }

    /// The zero value locals and fresh globals of this type start with
    pub fn default_for(value_type: ValueType) -> Value {
        match value_type {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(0.0),
            ValueType::F64 => Value::F64(0.0),
            ValueType::FuncRef => Value::FuncRef(None),
            ValueType::ExternRef => Value::ExternRef(None),
        }
    }

    /// The null reference of a reference type
    pub fn null(ref_type: RefType) -> Value {
        match ref_type {
            RefType::FuncRef => Value::FuncRef(None),
            RefType::ExternRef => Value::ExternRef(None),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::FuncRef(None) | Value::ExternRef(None))
    }

    /// Convert to i32, returning None if wrong type
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to i64, returning None if wrong type
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to f32, returning None if wrong type
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to f64, returning None if wrong type
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_funcref(&self) -> Option<Option<FuncAddr>> {
        match self {
            Value::FuncRef(v) => Some(*v),
            _ => None,
        }
    }

    /// Bitwise equality: unlike `==`, NaNs with the same payload compare
    /// equal and `0.0` differs from `-0.0`.
    pub fn bits_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32:{v}"),
            Value::I64(v) => write!(f, "i64:{v}"),
            Value::F32(v) => write!(f, "f32:{}", v.to_hex()),
            Value::F64(v) => write!(f, "f64:{}", v.to_hex()),
            Value::FuncRef(None) | Value::ExternRef(None) => write!(f, "{}:null", self.typ()),
            Value::FuncRef(Some(addr)) => write!(f, "funcref:{}", addr.0),
            Value::ExternRef(Some(v)) => write!(f, "externref:{v}"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ValueType::I32, Value::I32(0))]
    #[case(ValueType::F64, Value::F64(0.0))]
    #[case(ValueType::FuncRef, Value::FuncRef(None))]
    #[case(ValueType::ExternRef, Value::ExternRef(None))]
    fn test_default_for(#[case] value_type: ValueType, #[case] expected: Value) {
        let value = Value::default_for(value_type);
        assert_eq!(value, expected);
        assert_eq!(value.typ(), value_type);
    }

    #[test]
    fn test_bits_eq() {
        let nan = Value::F32(f32::from_bits(0x7fc0_0001));
        assert_ne!(nan, nan);
        assert!(nan.bits_eq(&nan));
        assert!(!Value::F64(0.0).bits_eq(&Value::F64(-0.0)));
        assert!(Value::I64(3).bits_eq(&Value::I64(3)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::I32(-1).to_string(), "i32:-1");
        assert!(Value::F32(1.5).to_string().starts_with("f32:0x1.8p"));
        assert_eq!(Value::FuncRef(None).to_string(), "funcref:null");
        assert_eq!(Value::FuncRef(Some(FuncAddr(3))).to_string(), "funcref:3");
    }
}
