//! Comparison operations for WebAssembly
//!
//! Every comparison pushes an i32: 1 when the relation holds, 0 otherwise.
//! Float comparisons involving NaN are false, except `ne` which is true.

use super::{RuntimeError, Stack, Value};

fn push_bool(stack: &mut Stack, b: bool) {
    stack.push(Value::I32(b as i32));
}

/// i32.eqz
/// [i32] -> [i32]
pub fn i32_eqz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    push_bool(stack, c == 0);
    Ok(())
}

/// i64.eqz
/// [i64] -> [i32]
pub fn i64_eqz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    push_bool(stack, c == 0);
    Ok(())
}

/// One `[t t] -> [i32]` relation per line: name, pop, operand conversion
/// and the Rust operator.
macro_rules! relops {
    ($( $name:ident: $pop:ident as $ty:ty, $op:tt; )*) => {
        $(
            pub fn $name(stack: &mut Stack) -> Result<(), RuntimeError> {
                let c2 = stack.$pop()? as $ty;
                let c1 = stack.$pop()? as $ty;
                push_bool(stack, c1 $op c2);
                Ok(())
            }
        )*
    };
}

relops! {
    i32_eq: pop_i32 as i32, ==;
    i32_ne: pop_i32 as i32, !=;
    i32_lt_s: pop_i32 as i32, <;
    i32_lt_u: pop_i32 as u32, <;
    i32_gt_s: pop_i32 as i32, >;
    i32_gt_u: pop_i32 as u32, >;
    i32_le_s: pop_i32 as i32, <=;
    i32_le_u: pop_i32 as u32, <=;
    i32_ge_s: pop_i32 as i32, >=;
    i32_ge_u: pop_i32 as u32, >=;

    i64_eq: pop_i64 as i64, ==;
    i64_ne: pop_i64 as i64, !=;
    i64_lt_s: pop_i64 as i64, <;
    i64_lt_u: pop_i64 as u64, <;
    i64_gt_s: pop_i64 as i64, >;
    i64_gt_u: pop_i64 as u64, >;
    i64_le_s: pop_i64 as i64, <=;
    i64_le_u: pop_i64 as u64, <=;
    i64_ge_s: pop_i64 as i64, >=;
    i64_ge_u: pop_i64 as u64, >=;

    f32_eq: pop_f32 as f32, ==;
    f32_ne: pop_f32 as f32, !=;
    f32_lt: pop_f32 as f32, <;
    f32_gt: pop_f32 as f32, >;
    f32_le: pop_f32 as f32, <=;
    f32_ge: pop_f32 as f32, >=;

    f64_eq: pop_f64 as f64, ==;
    f64_ne: pop_f64 as f64, !=;
    f64_lt: pop_f64 as f64, <;
    f64_gt: pop_f64 as f64, >;
    f64_le: pop_f64 as f64, <=;
    f64_ge: pop_f64 as f64, >=;
}
