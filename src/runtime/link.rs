//! Import resolution and initialiser evaluation
//!
//! Imports are matched by kind and type against the externs supplied by
//! the host:
//!
//! - functions: exact signature equality
//! - tables and memories: limits subtyping on the *current* size, and for
//!   tables the same element type
//! - globals: same value type and mutability

use super::imports::{Extern, ImportObject};
use super::store::{FuncAddr, GlobalAddr, Store};
use super::{RuntimeError, Trap, Value};
use crate::parser::instruction::InstructionKind;
use crate::parser::module::{ConstExpr, ExternalKind, Import, Module};
use std::fmt;
use thiserror::Error;

/// A segment that failed to initialise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Element(u32),
    Data(u32),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Segment::Element(idx) => write!(f, "element segment {idx}"),
            Segment::Data(idx) => write!(f, "data segment {idx}"),
        }
    }
}

/// Instantiation failures. The module stays valid and may be instantiated
/// again with a different import environment.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("unknown import {module}.{name}")]
    UnresolvedImport { module: String, name: String },
    #[error("incompatible import type for {module}.{name}: {reason}")]
    IncompatibleImport {
        module: String,
        name: String,
        reason: String,
    },
    #[error("out of bounds {segment} initialisation")]
    InitOutOfBounds { segment: Segment },
    #[error("start function trapped: {0}")]
    StartTrap(Trap),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Find the extern bound to `import` and check that it fits.
pub(crate) fn resolve_import(
    store: &Store,
    module: &Module,
    import: &Import,
    imports: &ImportObject,
) -> Result<Extern, LinkError> {
    let provided = imports
        .get(&import.module, &import.name)
        .ok_or_else(|| LinkError::UnresolvedImport {
            module: import.module.clone(),
            name: import.name.clone(),
        })?;
    let incompatible = |reason: String| LinkError::IncompatibleImport {
        module: import.module.clone(),
        name: import.name.clone(),
        reason,
    };
    let unknown = || incompatible(format!("no such {} in store", provided.kind_name()));

    match (&import.external_kind, provided) {
        (ExternalKind::Function(type_idx), Extern::Func(addr)) => {
            let expected = module
                .types
                .get(*type_idx as usize)
                .ok_or_else(|| incompatible(format!("unknown type {type_idx}")))?;
            let actual = store.function_type(addr).ok_or_else(unknown)?;
            if actual != expected {
                return Err(incompatible(format!(
                    "expected function {expected}, got {actual}"
                )));
            }
        }
        (ExternalKind::Table(expected), Extern::Table(addr)) => {
            let actual = store.table(addr).ok_or_else(unknown)?.borrow().table_type();
            if actual.ref_type != expected.ref_type || !actual.limits.matches(&expected.limits) {
                return Err(incompatible(format!(
                    "expected table {expected}, got {actual}"
                )));
            }
        }
        (ExternalKind::Memory(expected), Extern::Memory(addr)) => {
            let actual = store.memory(addr).ok_or_else(unknown)?.borrow().memory_type();
            if !actual.limits.matches(&expected.limits) {
                return Err(incompatible(format!(
                    "expected memory {expected}, got {actual}"
                )));
            }
        }
        (ExternalKind::Global(expected), Extern::Global(addr)) => {
            let actual = store.global(addr).ok_or_else(unknown)?.global_type();
            if actual != *expected {
                return Err(incompatible(format!(
                    "expected global {expected}, got {actual}"
                )));
            }
        }
        (expected, provided) => {
            return Err(incompatible(format!(
                "expected {}, got {}",
                expected.kind_name(),
                provided.kind_name()
            )))
        }
    }

    Ok(provided)
}

/// Evaluate a validated constant expression. `globals` only needs to hold
/// the imported globals, the only ones a constant expression may read.
pub(crate) fn eval_const(
    expr: &ConstExpr,
    store: &Store,
    funcs: &[FuncAddr],
    globals: &[GlobalAddr],
) -> Result<Value, RuntimeError> {
    let mut result = None;
    for instruction in &expr.instructions {
        let value = match instruction {
            InstructionKind::I32Const { value } => Value::I32(*value),
            InstructionKind::I64Const { value } => Value::I64(*value),
            InstructionKind::F32Const { value } => Value::F32(*value),
            InstructionKind::F64Const { value } => Value::F64(*value),
            InstructionKind::RefNull { ref_type } => Value::null(*ref_type),
            InstructionKind::RefFunc { func_idx } => Value::FuncRef(funcs.get(*func_idx as usize).copied()),
            InstructionKind::GlobalGet { global_idx } => globals
                .get(*global_idx as usize)
                .and_then(|addr| store.global(*addr))
                .map(|global| global.get())
                .ok_or_else(|| RuntimeError::InvalidConstExpr(expr.to_string()))?,
            _ => return Err(RuntimeError::InvalidConstExpr(expr.to_string())),
        };
        result = Some(value);
    }
    result.ok_or_else(|| RuntimeError::InvalidConstExpr(expr.to_string()))
}
