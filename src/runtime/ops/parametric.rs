//! Parametric operations for WebAssembly

use super::{RuntimeError, Stack};

/// drop - Drop value from stack
pub fn drop(stack: &mut Stack) -> Result<(), RuntimeError> {
    stack.pop()?;
    Ok(())
}

/// select [t t i32] -> [t], the first operand when the condition is
/// non-zero. Covers both the untyped and the typed form.
pub fn select(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    let val2 = stack.pop()?;
    let val1 = stack.pop()?;
    stack.push(if c != 0 { val1 } else { val2 });
    Ok(())
}
