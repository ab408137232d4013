//! Type conversion operations for WebAssembly
//!
//! Conversions include:
//! - Integer width conversions (wrap, extend)
//! - Float width conversions (promote, demote)
//! - Integer to float conversions
//! - Float to integer conversions, trapping and saturating
//! - Reinterpretation (bit casting)

use super::{RuntimeError, Stack, TrapKind, Value};

// ============================================================================
// Integer Width Conversions
// ============================================================================

/// i32.wrap_i64, keeps the low 32 bits
pub fn i32_wrap_i64(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop_i64()?;
    stack.push(Value::I32(value as i32));
    Ok(())
}

pub fn i64_extend_i32_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop_i32()?;
    stack.push(Value::I64(value as i64));
    Ok(())
}

pub fn i64_extend_i32_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop_i32()?;
    stack.push(Value::I64(value as u32 as i64));
    Ok(())
}

// ============================================================================
// Float to Integer, trapping
// ============================================================================

/// Generates a trapping truncation. The operand is widened to f64, which is
/// exact for every f32, and checked against the open interval of values
/// whose truncation fits the target type.
macro_rules! trunc_ops {
    ($( $name:ident: $pop:ident -> $variant:ident as $target:ty as $store:ty, $lo:expr, $hi:expr, $lo_inclusive:expr; )*) => {
        $(
            pub fn $name(stack: &mut Stack) -> Result<(), RuntimeError> {
                let value = stack.$pop()?;
                let x = value as f64;
                if x.is_nan() {
                    return Err(TrapKind::InvalidConversion.into());
                }
                let above_lo = if $lo_inclusive { x >= $lo } else { x > $lo };
                if !above_lo || x >= $hi {
                    return Err(TrapKind::IntegerOverflow.into());
                }
                stack.push(Value::$variant(value.trunc() as $target as $store));
                Ok(())
            }
        )*
    };
}

trunc_ops! {
    i32_trunc_f32_s: pop_f32 -> I32 as i32 as i32, -2147483649.0, 2147483648.0, false;
    i32_trunc_f32_u: pop_f32 -> I32 as u32 as i32, -1.0, 4294967296.0, false;
    i32_trunc_f64_s: pop_f64 -> I32 as i32 as i32, -2147483649.0, 2147483648.0, false;
    i32_trunc_f64_u: pop_f64 -> I32 as u32 as i32, -1.0, 4294967296.0, false;
    i64_trunc_f32_s: pop_f32 -> I64 as i64 as i64, -9223372036854775808.0, 9223372036854775808.0, true;
    i64_trunc_f32_u: pop_f32 -> I64 as u64 as i64, -1.0, 18446744073709551616.0, false;
    i64_trunc_f64_s: pop_f64 -> I64 as i64 as i64, -9223372036854775808.0, 9223372036854775808.0, true;
    i64_trunc_f64_u: pop_f64 -> I64 as u64 as i64, -1.0, 18446744073709551616.0, false;
}

// ============================================================================
// Float to Integer, saturating
// ============================================================================

// Rust's float-to-int `as` already saturates and maps NaN to zero.
macro_rules! trunc_sat_ops {
    ($( $name:ident: $pop:ident -> $variant:ident as $target:ty as $store:ty; )*) => {
        $(
            pub fn $name(stack: &mut Stack) -> Result<(), RuntimeError> {
                let value = stack.$pop()?;
                stack.push(Value::$variant(value as $target as $store));
                Ok(())
            }
        )*
    };
}

trunc_sat_ops! {
    i32_trunc_sat_f32_s: pop_f32 -> I32 as i32 as i32;
    i32_trunc_sat_f32_u: pop_f32 -> I32 as u32 as i32;
    i32_trunc_sat_f64_s: pop_f64 -> I32 as i32 as i32;
    i32_trunc_sat_f64_u: pop_f64 -> I32 as u32 as i32;
    i64_trunc_sat_f32_s: pop_f32 -> I64 as i64 as i64;
    i64_trunc_sat_f32_u: pop_f32 -> I64 as u64 as i64;
    i64_trunc_sat_f64_s: pop_f64 -> I64 as i64 as i64;
    i64_trunc_sat_f64_u: pop_f64 -> I64 as u64 as i64;
}

// ============================================================================
// Integer to Float
// ============================================================================

macro_rules! convert_ops {
    ($( $name:ident: $pop:ident as $via:ty, $variant:ident as $target:ty; )*) => {
        $(
            pub fn $name(stack: &mut Stack) -> Result<(), RuntimeError> {
                let value = stack.$pop()?;
                stack.push(Value::$variant(value as $via as $target));
                Ok(())
            }
        )*
    };
}

// Rust int-to-float `as` rounds to nearest, ties to even.
convert_ops! {
    f32_convert_i32_s: pop_i32 as i32, F32 as f32;
    f32_convert_i32_u: pop_i32 as u32, F32 as f32;
    f32_convert_i64_s: pop_i64 as i64, F32 as f32;
    f32_convert_i64_u: pop_i64 as u64, F32 as f32;
    f64_convert_i32_s: pop_i32 as i32, F64 as f64;
    f64_convert_i32_u: pop_i32 as u32, F64 as f64;
    f64_convert_i64_s: pop_i64 as i64, F64 as f64;
    f64_convert_i64_u: pop_i64 as u64, F64 as f64;
}

// ============================================================================
// Float Width Conversions
// ============================================================================

pub fn f32_demote_f64(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop_f64()?;
    stack.push(Value::F32(value as f32));
    Ok(())
}

pub fn f64_promote_f32(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop_f32()?;
    stack.push(Value::F64(value as f64));
    Ok(())
}

// ============================================================================
// Reinterpretation
// ============================================================================

pub fn i32_reinterpret_f32(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop_f32()?;
    stack.push(Value::I32(value.to_bits() as i32));
    Ok(())
}

pub fn i64_reinterpret_f64(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop_f64()?;
    stack.push(Value::I64(value.to_bits() as i64));
    Ok(())
}

pub fn f32_reinterpret_i32(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop_i32()?;
    stack.push(Value::F32(f32::from_bits(value as u32)));
    Ok(())
}

pub fn f64_reinterpret_i64(stack: &mut Stack) -> Result<(), RuntimeError> {
    let value = stack.pop_i64()?;
    stack.push(Value::F64(f64::from_bits(value as u64)));
    Ok(())
}
