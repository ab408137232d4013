//! Reference instructions

use super::{RuntimeError, Stack, Value};
use crate::parser::module::RefType;
use crate::runtime::store::FuncAddr;

pub fn ref_null(stack: &mut Stack, ref_type: RefType) -> Result<(), RuntimeError> {
    stack.push(Value::null(ref_type));
    Ok(())
}

/// ref.is_null [ref] -> [i32]
pub fn ref_is_null(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop()?;
    stack.push(Value::I32(value.is_null() as i32));
    Ok(())
}

/// ref.func: `addr` is the store address the instance assigned to the
/// function index
pub fn ref_func(stack: &mut Stack, addr: FuncAddr) -> Result<(), RuntimeError> {
    stack.push(Value::FuncRef(Some(addr)));
    Ok(())
}
