//! Numeric operations for WebAssembly
//!
//! Integer arithmetic wraps modulo 2^N; only division and remainder can
//! trap. Float arithmetic is plain IEEE 754 on the host's `f32`/`f64`.
//! `min`, `max` and `nearest` need their own definitions because Rust's
//! versions disagree with WebAssembly on NaN, signed zero and ties.

use super::{RuntimeError, Stack, TrapKind, Value};

// ============================================================================
// Constants
// ============================================================================

pub fn i32_const(stack: &mut Stack, value: i32) -> Result<(), RuntimeError> {
    stack.push(Value::I32(value));
    Ok(())
}

pub fn i64_const(stack: &mut Stack, value: i64) -> Result<(), RuntimeError> {
    stack.push(Value::I64(value));
    Ok(())
}

pub fn f32_const(stack: &mut Stack, value: f32) -> Result<(), RuntimeError> {
    stack.push(Value::F32(value));
    Ok(())
}

pub fn f64_const(stack: &mut Stack, value: f64) -> Result<(), RuntimeError> {
    stack.push(Value::F64(value));
    Ok(())
}

// ============================================================================
// Integer Binary Operations
// ============================================================================

/// i32.add
/// [i32 i32] -> [i32], c1 + c2 modulo 2^32
pub fn i32_add(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push(Value::I32(c1.wrapping_add(c2)));
    Ok(())
}

/// i32.sub
pub fn i32_sub(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push(Value::I32(c1.wrapping_sub(c2)));
    Ok(())
}

/// i32.mul
pub fn i32_mul(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push(Value::I32(c1.wrapping_mul(c2)));
    Ok(())
}

/// i32.div_s
/// 1. If c2 is 0, trap
/// 2. If c1 is INT32_MIN and c2 is -1, trap (2^31 doesn't fit in i32)
/// 3. Otherwise divide, truncating toward zero
pub fn i32_div_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    if c2 == 0 {
        return Err(TrapKind::DivideByZero.into());
    }
    if c1 == i32::MIN && c2 == -1 {
        return Err(TrapKind::IntegerOverflow.into());
    }
    stack.push(Value::I32(c1 / c2));
    Ok(())
}

/// i32.div_u
pub fn i32_div_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_u32()?;
    let c1 = stack.pop_u32()?;
    if c2 == 0 {
        return Err(TrapKind::DivideByZero.into());
    }
    stack.push(Value::I32((c1 / c2) as i32));
    Ok(())
}

/// i32.rem_s
/// The result has the sign of the dividend. INT32_MIN rem -1 is 0, not a
/// trap.
pub fn i32_rem_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    if c2 == 0 {
        return Err(TrapKind::DivideByZero.into());
    }
    stack.push(Value::I32(c1.wrapping_rem(c2)));
    Ok(())
}

/// i32.rem_u
pub fn i32_rem_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_u32()?;
    let c1 = stack.pop_u32()?;
    if c2 == 0 {
        return Err(TrapKind::DivideByZero.into());
    }
    stack.push(Value::I32((c1 % c2) as i32));
    Ok(())
}

/// i64.add
pub fn i64_add(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push(Value::I64(c1.wrapping_add(c2)));
    Ok(())
}

/// i64.sub
pub fn i64_sub(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push(Value::I64(c1.wrapping_sub(c2)));
    Ok(())
}

/// i64.mul
pub fn i64_mul(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push(Value::I64(c1.wrapping_mul(c2)));
    Ok(())
}

/// i64.div_s
pub fn i64_div_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    if c2 == 0 {
        return Err(TrapKind::DivideByZero.into());
    }
    if c1 == i64::MIN && c2 == -1 {
        return Err(TrapKind::IntegerOverflow.into());
    }
    stack.push(Value::I64(c1 / c2));
    Ok(())
}

/// i64.div_u
pub fn i64_div_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()? as u64;
    if c2 == 0 {
        return Err(TrapKind::DivideByZero.into());
    }
    stack.push(Value::I64((c1 / c2) as i64));
    Ok(())
}

/// i64.rem_s
pub fn i64_rem_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    if c2 == 0 {
        return Err(TrapKind::DivideByZero.into());
    }
    stack.push(Value::I64(c1.wrapping_rem(c2)));
    Ok(())
}

/// i64.rem_u
pub fn i64_rem_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()? as u64;
    if c2 == 0 {
        return Err(TrapKind::DivideByZero.into());
    }
    stack.push(Value::I64((c1 % c2) as i64));
    Ok(())
}

// ============================================================================
// Integer Unary Operations
// ============================================================================

pub fn i32_clz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push(Value::I32(c.leading_zeros() as i32));
    Ok(())
}

pub fn i32_ctz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push(Value::I32(c.trailing_zeros() as i32));
    Ok(())
}

pub fn i32_popcnt(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push(Value::I32(c.count_ones() as i32));
    Ok(())
}

pub fn i64_clz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push(Value::I64(c.leading_zeros() as i64));
    Ok(())
}

pub fn i64_ctz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push(Value::I64(c.trailing_zeros() as i64));
    Ok(())
}

pub fn i64_popcnt(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push(Value::I64(c.count_ones() as i64));
    Ok(())
}

// ============================================================================
// Float Operations
// ============================================================================

/// Generates the float operations for one width. `abs`, `neg` and
/// `copysign` only touch the sign bit, so NaN payloads pass through.
macro_rules! float_ops {
    ($ty:ident, $pop:ident, $variant:ident,
     abs: $abs:ident, neg: $neg:ident, ceil: $ceil:ident, floor: $floor:ident,
     trunc: $trunc:ident, nearest: $nearest:ident, sqrt: $sqrt:ident,
     add: $add:ident, sub: $sub:ident, mul: $mul:ident, div: $div:ident,
     min: $min:ident, max: $max:ident, copysign: $copysign:ident) => {
        pub fn $abs(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c = stack.$pop()?;
            stack.push(Value::$variant(c.abs()));
            Ok(())
        }

        pub fn $neg(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c = stack.$pop()?;
            stack.push(Value::$variant(-c));
            Ok(())
        }

        pub fn $ceil(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c = stack.$pop()?;
            stack.push(Value::$variant(c.ceil()));
            Ok(())
        }

        pub fn $floor(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c = stack.$pop()?;
            stack.push(Value::$variant(c.floor()));
            Ok(())
        }

        pub fn $trunc(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c = stack.$pop()?;
            stack.push(Value::$variant(c.trunc()));
            Ok(())
        }

        /// Round to nearest, ties to even
        pub fn $nearest(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c = stack.$pop()?;
            stack.push(Value::$variant(c.round_ties_even()));
            Ok(())
        }

        pub fn $sqrt(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c = stack.$pop()?;
            stack.push(Value::$variant(c.sqrt()));
            Ok(())
        }

        pub fn $add(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1 + c2));
            Ok(())
        }

        pub fn $sub(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1 - c2));
            Ok(())
        }

        pub fn $mul(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1 * c2));
            Ok(())
        }

        /// Division by zero gives an infinity or NaN, never a trap
        pub fn $div(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1 / c2));
            Ok(())
        }

        /// NaN if either operand is NaN; -0 is smaller than +0
        pub fn $min(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            let result = if c1.is_nan() || c2.is_nan() {
                $ty::NAN
            } else if c1 == c2 {
                // only differs for zeros of opposite sign
                if c1.is_sign_negative() { c1 } else { c2 }
            } else {
                c1.min(c2)
            };
            stack.push(Value::$variant(result));
            Ok(())
        }

        pub fn $max(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            let result = if c1.is_nan() || c2.is_nan() {
                $ty::NAN
            } else if c1 == c2 {
                if c1.is_sign_positive() { c1 } else { c2 }
            } else {
                c1.max(c2)
            };
            stack.push(Value::$variant(result));
            Ok(())
        }

        pub fn $copysign(stack: &mut Stack) -> Result<(), RuntimeError> {
            let c2 = stack.$pop()?;
            let c1 = stack.$pop()?;
            stack.push(Value::$variant(c1.copysign(c2)));
            Ok(())
        }
    };
}

float_ops!(f32, pop_f32, F32,
    abs: f32_abs, neg: f32_neg, ceil: f32_ceil, floor: f32_floor,
    trunc: f32_trunc, nearest: f32_nearest, sqrt: f32_sqrt,
    add: f32_add, sub: f32_sub, mul: f32_mul, div: f32_div,
    min: f32_min, max: f32_max, copysign: f32_copysign);

float_ops!(f64, pop_f64, F64,
    abs: f64_abs, neg: f64_neg, ceil: f64_ceil, floor: f64_floor,
    trunc: f64_trunc, nearest: f64_nearest, sqrt: f64_sqrt,
    add: f64_add, sub: f64_sub, mul: f64_mul, div: f64_div,
    min: f64_min, max: f64_max, copysign: f64_copysign);
