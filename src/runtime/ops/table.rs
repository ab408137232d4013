//! Table instructions
//!
//! Index, length and size operands are i32 values read as unsigned. Bulk
//! operations check the whole range before touching any element.

use std::cell::RefCell;
use std::rc::Rc;

use super::{RuntimeError, Stack, Table, Value};

/// table.get [i] -> [ref]
pub fn table_get(stack: &mut Stack, table: &Table) -> Result<(), RuntimeError> {
    let index = stack.pop_u32()?;
    stack.push(table.get(index)?);
    Ok(())
}

/// table.set [i ref] -> []
pub fn table_set(stack: &mut Stack, table: &mut Table) -> Result<(), RuntimeError> {
    let value = stack.pop()?;
    let index = stack.pop_u32()?;
    table.set(index, value)
}

pub fn table_size(stack: &mut Stack, table: &Table) -> Result<(), RuntimeError> {
    stack.push(Value::I32(table.size() as i32));
    Ok(())
}

/// table.grow [ref n] -> [i32], the old size or -1
pub fn table_grow(stack: &mut Stack, table: &mut Table) -> Result<(), RuntimeError> {
    let delta = stack.pop_u32()?;
    let init = stack.pop()?;
    let result = table.grow(delta, init)?;
    stack.push(Value::I32(result));
    Ok(())
}

/// table.fill [i ref n] -> []
pub fn table_fill(stack: &mut Stack, table: &mut Table) -> Result<(), RuntimeError> {
    let n = stack.pop_u32()?;
    let value = stack.pop()?;
    let start = stack.pop_u32()?;
    table.fill(start, value, n)
}

/// table.copy [d s n] -> []. Source and destination may be the same table.
pub fn table_copy(
    stack: &mut Stack,
    dst: &Rc<RefCell<Table>>,
    src: &Rc<RefCell<Table>>,
) -> Result<(), RuntimeError> {
    let n = stack.pop_u32()?;
    let s = stack.pop_u32()?;
    let d = stack.pop_u32()?;
    if Rc::ptr_eq(dst, src) {
        dst.borrow_mut().copy_within(d, s, n)
    } else {
        dst.borrow_mut().copy_from(d, &src.borrow(), s, n)
    }
}

/// table.init [d s n] -> [], from an element segment
pub fn table_init(stack: &mut Stack, table: &mut Table, segment: &[Value]) -> Result<(), RuntimeError> {
    let n = stack.pop_u32()?;
    let s = stack.pop_u32()?;
    let d = stack.pop_u32()?;
    table.init(d, segment, s, n)
}
