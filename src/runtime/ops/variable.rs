//! Variable operations for WebAssembly
//!
//! Local indices are checked by validation, as is the mutability of
//! globals written by `global.set`.

use super::{RuntimeError, Stack};
use crate::runtime::frame::Frame;
use crate::runtime::global::Global;

/// local.get x
pub fn local_get(stack: &mut Stack, frame: &Frame, local_idx: u32) -> Result<(), RuntimeError> {
    stack.push(frame.locals[local_idx as usize]);
    Ok(())
}

/// local.set x
pub fn local_set(stack: &mut Stack, frame: &mut Frame, local_idx: u32) -> Result<(), RuntimeError> {
    let value = stack.pop()?;
    frame.locals[local_idx as usize] = value;
    Ok(())
}

/// local.tee x - Set local variable but keep value on stack
pub fn local_tee(stack: &mut Stack, frame: &mut Frame, local_idx: u32) -> Result<(), RuntimeError> {
    let value = stack.pop()?;
    stack.push(value);
    frame.locals[local_idx as usize] = value;
    Ok(())
}

/// global.get x
pub fn global_get(stack: &mut Stack, global: &Global) -> Result<(), RuntimeError> {
    stack.push(global.get());
    Ok(())
}

/// global.set x. Globals are shared with importers, so the write is
/// visible through every instance holding the same address.
pub fn global_set(stack: &mut Stack, global: &Global) -> Result<(), RuntimeError> {
    let value = stack.pop()?;
    global.set(value)
}
