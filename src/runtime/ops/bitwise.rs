//! Bitwise operations for WebAssembly
//!
//! Shift and rotate counts are taken modulo the bit width.

use super::{RuntimeError, Stack, Value};

macro_rules! int_bitwise {
    ($pop:ident, $variant:ident, $bits:ty,
     and: $and:ident, or: $or:ident, xor: $xor:ident,
     shl: $shl:ident, shr_s: $shr_s:ident, shr_u: $shr_u:ident,
     rotl: $rotl:ident, rotr: $rotr:ident) => {
        pub fn $and(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1 & c2));
            Ok(())
        }

        pub fn $or(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1 | c2));
            Ok(())
        }

        pub fn $xor(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1 ^ c2));
            Ok(())
        }

        pub fn $shl(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1.wrapping_shl(c2 as u32)));
            Ok(())
        }

        /// Arithmetic shift, replicating the sign bit
        pub fn $shr_s(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1.wrapping_shr(c2 as u32)));
            Ok(())
        }

        /// Logical shift, filling with zeros
        pub fn $shr_u(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()? as $bits;
            stack.push(Value::$variant(c1.wrapping_shr(c2 as u32) as _));
            Ok(())
        }

        pub fn $rotl(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1.rotate_left(c2 as u32)));
            Ok(())
        }

        pub fn $rotr(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1.rotate_right(c2 as u32)));
            Ok(())
        }
    };
}

int_bitwise!(pop_i32, I32, u32,
    and: i32_and, or: i32_or, xor: i32_xor,
    shl: i32_shl, shr_s: i32_shr_s, shr_u: i32_shr_u,
    rotl: i32_rotl, rotr: i32_rotr);

int_bitwise!(pop_i64, I64, u64,
    and: i64_and, or: i64_or, xor: i64_xor,
    shl: i64_shl, shr_s: i64_shr_s, shr_u: i64_shr_u,
    rotl: i64_rotl, rotr: i64_rotr);

// ============================================================================
// Sign extension
// ============================================================================

/// i32.extend8_s: sign-extend the low 8 bits
pub fn i32_extend8_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push(Value::I32(c as i8 as i32));
    Ok(())
}

pub fn i32_extend16_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push(Value::I32(c as i16 as i32));
    Ok(())
}

pub fn i64_extend8_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push(Value::I64(c as i8 as i64));
    Ok(())
}

pub fn i64_extend16_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push(Value::I64(c as i16 as i64));
    Ok(())
}

pub fn i64_extend32_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push(Value::I64(c as i32 as i64));
    Ok(())
}
