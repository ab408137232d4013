//! Memory instructions for WebAssembly
//!
//! Loads and stores address memory with a dynamic i32 operand, read as
//! unsigned, plus the static `offset` of their memarg. The sum is computed
//! in 64 bits so it can never wrap. Alignment hints do not affect behavior.
//! Multi-byte accesses are little-endian.

use super::{MemArg, Memory, RuntimeError, Stack, Value};

/// Pop the dynamic address and add the static offset.
#[inline]
fn effective_address(stack: &mut Stack, memarg: &MemArg) -> Result<u64, RuntimeError> {
    let base = stack.pop_u32()?;
    Ok(base as u64 + memarg.offset as u64)
}

// ============================================================================
// Loads
// ============================================================================

macro_rules! loads {
    ($( $name:ident: $read:ident as $conv:ty => $variant:ident as $target:ty; )*) => {
        $(
            pub fn $name(stack: &mut Stack, memory: &Memory, memarg: &MemArg) -> Result<(), RuntimeError> {
                let addr = effective_address(stack, memarg)?;
                let raw = memory.$read(addr)?;
                stack.push(Value::$variant(raw as $conv as $target));
                Ok(())
            }
        )*
    };
}

loads! {
    i32_load: read_u32 as u32 => I32 as i32;
    i64_load: read_u64 as u64 => I64 as i64;
    i32_load8_s: read_u8 as i8 => I32 as i32;
    i32_load8_u: read_u8 as u8 => I32 as i32;
    i32_load16_s: read_u16 as i16 => I32 as i32;
    i32_load16_u: read_u16 as u16 => I32 as i32;
    i64_load8_s: read_u8 as i8 => I64 as i64;
    i64_load8_u: read_u8 as u8 => I64 as i64;
    i64_load16_s: read_u16 as i16 => I64 as i64;
    i64_load16_u: read_u16 as u16 => I64 as i64;
    i64_load32_s: read_u32 as i32 => I64 as i64;
    i64_load32_u: read_u32 as u32 => I64 as i64;
}

// Float loads go through the bit pattern so NaN payloads are preserved.
pub fn f32_load(stack: &mut Stack, memory: &Memory, memarg: &MemArg) -> Result<(), RuntimeError> {
    let addr = effective_address(stack, memarg)?;
    stack.push(Value::F32(memory.read_f32(addr)?));
    Ok(())
}

pub fn f64_load(stack: &mut Stack, memory: &Memory, memarg: &MemArg) -> Result<(), RuntimeError> {
    let addr = effective_address(stack, memarg)?;
    stack.push(Value::F64(memory.read_f64(addr)?));
    Ok(())
}

// ============================================================================
// Stores
// ============================================================================

/// Stores pop the value first, then the address. Narrow stores keep the
/// low bits of the value.
macro_rules! stores {
    ($( $name:ident: $pop:ident => $write:ident as $narrow:ty; )*) => {
        $(
            pub fn $name(stack: &mut Stack, memory: &mut Memory, memarg: &MemArg) -> Result<(), RuntimeError> {
                let value = stack.$pop()?;
                let addr = effective_address(stack, memarg)?;
                memory.$write(addr, value as $narrow)
            }
        )*
    };
}

stores! {
    i32_store: pop_i32 => write_u32 as u32;
    i64_store: pop_i64 => write_u64 as u64;
    i32_store8: pop_i32 => write_u8 as u8;
    i32_store16: pop_i32 => write_u16 as u16;
    i64_store8: pop_i64 => write_u8 as u8;
    i64_store16: pop_i64 => write_u16 as u16;
    i64_store32: pop_i64 => write_u32 as u32;
}

pub fn f32_store(stack: &mut Stack, memory: &mut Memory, memarg: &MemArg) -> Result<(), RuntimeError> {
    let value = stack.pop_f32()?;
    let addr = effective_address(stack, memarg)?;
    memory.write_f32(addr, value)
}

pub fn f64_store(stack: &mut Stack, memory: &mut Memory, memarg: &MemArg) -> Result<(), RuntimeError> {
    let value = stack.pop_f64()?;
    let addr = effective_address(stack, memarg)?;
    memory.write_f64(addr, value)
}

// ============================================================================
// Size and bulk operations
// ============================================================================

/// memory.size, in pages
pub fn memory_size(stack: &mut Stack, memory: &Memory) -> Result<(), RuntimeError> {
    stack.push(Value::I32(memory.size() as i32));
    Ok(())
}

/// memory.grow: pushes the previous size in pages, or -1 if the memory
/// could not grow. Failure to grow is not a trap.
pub fn memory_grow(stack: &mut Stack, memory: &mut Memory) -> Result<(), RuntimeError> {
    let delta = stack.pop_u32()?;
    stack.push(Value::I32(memory.grow(delta)));
    Ok(())
}

/// memory.init [d s n] -> [], copies `n` bytes of a data segment from
/// offset `s` into memory at `d`. Bounds are checked before any write.
pub fn memory_init(stack: &mut Stack, memory: &mut Memory, data: &[u8]) -> Result<(), RuntimeError> {
    let n = stack.pop_u32()?;
    let s = stack.pop_u32()?;
    let d = stack.pop_u32()?;
    memory.init(d, data, s, n)
}

/// memory.copy [d s n] -> [], overlapping ranges are handled as if the
/// source were copied to a temporary first.
pub fn memory_copy(stack: &mut Stack, memory: &mut Memory) -> Result<(), RuntimeError> {
    let n = stack.pop_u32()?;
    let s = stack.pop_u32()?;
    let d = stack.pop_u32()?;
    memory.copy_within(d, s, n)
}

/// memory.fill [d val n] -> []
pub fn memory_fill(stack: &mut Stack, memory: &mut Memory) -> Result<(), RuntimeError> {
    let n = stack.pop_u32()?;
    let val = stack.pop_i32()?;
    let d = stack.pop_u32()?;
    memory.fill(d, val as u8, n)
}

#[cfg(test)]
mod tests {
    use crate::parser::instruction::{InstructionKind, MemArg};
    use crate::parser::module::ValueType;
    use crate::runtime::test_utils::test::ExecutorTest;
    use crate::runtime::{TrapKind, Value};
    use rstest::rstest;

    fn memarg(offset: u32) -> MemArg {
        MemArg { align: 0, offset }
    }

    #[test]
    fn store_then_load_round_trips_little_endian() {
        ExecutorTest::new()
            .with_memory(1, None)
            .inst(InstructionKind::I32Const { value: 8 })
            .inst(InstructionKind::I32Const { value: 0x0102_0304 })
            .inst(InstructionKind::I32Store { memarg: memarg(0) })
            .inst(InstructionKind::I32Const { value: 8 })
            .inst(InstructionKind::I32Load8U { memarg: memarg(0) })
            .inst(InstructionKind::I32Const { value: 4 })
            .inst(InstructionKind::I32Load { memarg: memarg(4) })
            .returns(vec![ValueType::I32, ValueType::I32])
            .expect_stack(vec![Value::I32(0x04), Value::I32(0x0102_0304)]);
    }

    #[rstest]
    #[case(InstructionKind::I32Load8S { memarg: MemArg { align: 0, offset: 0 } }, Value::I32(-1))]
    #[case(InstructionKind::I32Load8U { memarg: MemArg { align: 0, offset: 0 } }, Value::I32(0xff))]
    #[case(InstructionKind::I32Load16S { memarg: MemArg { align: 0, offset: 0 } }, Value::I32(-1))]
    #[case(InstructionKind::I64Load32U { memarg: MemArg { align: 0, offset: 0 } }, Value::I64(0xffff_ffff))]
    #[case(InstructionKind::I64Load32S { memarg: MemArg { align: 0, offset: 0 } }, Value::I64(-1))]
    fn narrow_loads_extend(#[case] load: InstructionKind, #[case] expected: Value) {
        ExecutorTest::new()
            .with_memory(1, None)
            .with_data(0, vec![0xff; 8])
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(load)
            .returns(vec![expected.typ()])
            .expect_stack(vec![expected]);
    }

    #[test]
    fn narrow_store_keeps_low_bits() {
        ExecutorTest::new()
            .with_memory(1, None)
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I64Const { value: 0x1234_5678_9abc })
            .inst(InstructionKind::I64Store16 { memarg: memarg(0) })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I32Load { memarg: memarg(0) })
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(0x9abc)]);
    }

    #[rstest]
    #[case(65532, 0, true)]
    #[case(65533, 0, false)]
    #[case(0, 65533, false)]
    #[case(-1, 0, false)]
    fn i32_load_bounds(#[case] addr: i32, #[case] offset: u32, #[case] ok: bool) {
        let test = ExecutorTest::new()
            .with_memory(1, None)
            .inst(InstructionKind::I32Const { value: addr })
            .inst(InstructionKind::I32Load { memarg: memarg(offset) })
            .returns(vec![ValueType::I32]);
        if ok {
            test.expect_stack(vec![Value::I32(0)]);
        } else {
            test.expect_trap(TrapKind::OutOfBoundsMemory);
        }
    }

    #[test]
    fn offset_does_not_wrap() {
        ExecutorTest::new()
            .with_memory(1, None)
            .inst(InstructionKind::I32Const { value: -1 })
            .inst(InstructionKind::I32Load8U { memarg: memarg(1) })
            .returns(vec![ValueType::I32])
            .expect_trap(TrapKind::OutOfBoundsMemory);
    }

    #[test]
    fn f32_store_keeps_nan_payload() {
        let nan = f32::from_bits(0x7fa0_0001);
        ExecutorTest::new()
            .with_memory(1, None)
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::F32Const { value: nan })
            .inst(InstructionKind::F32Store { memarg: memarg(0) })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I32Load { memarg: memarg(0) })
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(0x7fa0_0001)]);
    }

    #[test]
    fn grow_then_access_new_page() {
        ExecutorTest::new()
            .with_memory(1, Some(2))
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::MemoryGrow)
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::MemoryGrow)
            .inst(InstructionKind::MemorySize)
            .inst(InstructionKind::I32Const { value: 131068 })
            .inst(InstructionKind::I32Load { memarg: memarg(0) })
            .returns(vec![ValueType::I32, ValueType::I32, ValueType::I32, ValueType::I32])
            .expect_stack(vec![Value::I32(1), Value::I32(-1), Value::I32(2), Value::I32(0)]);
    }

    #[test]
    fn fill_and_copy_overlapping() {
        ExecutorTest::new()
            .with_memory(1, None)
            .with_data(0, vec![1, 2, 3, 4])
            // copy [0..4) to [1..5)
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I32Const { value: 4 })
            .inst(InstructionKind::MemoryCopy)
            .inst(InstructionKind::I32Const { value: 8 })
            .inst(InstructionKind::I32Const { value: 0x1ab })
            .inst(InstructionKind::I32Const { value: 2 })
            .inst(InstructionKind::MemoryFill)
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I64Load { memarg: memarg(0) })
            .inst(InstructionKind::I32Const { value: 8 })
            .inst(InstructionKind::I32Load16U { memarg: memarg(0) })
            .returns(vec![ValueType::I64, ValueType::I32])
            .expect_stack(vec![Value::I64(0x04_0302_0101), Value::I32(0xabab)]);
    }

    #[test]
    fn fill_out_of_bounds_writes_nothing() {
        ExecutorTest::new()
            .with_memory(1, None)
            .inst(InstructionKind::I32Const { value: 65530 })
            .inst(InstructionKind::I32Const { value: 7 })
            .inst(InstructionKind::I32Const { value: 7 })
            .inst(InstructionKind::MemoryFill)
            .returns(vec![])
            .expect_trap(TrapKind::OutOfBoundsMemory);
    }

    #[test]
    fn init_from_passive_segment_then_drop() {
        let test = ExecutorTest::new()
            .with_memory(1, None)
            .with_passive_data(vec![9, 8, 7])
            .inst(InstructionKind::I32Const { value: 16 })
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::I32Const { value: 2 })
            .inst(InstructionKind::MemoryInit { data_idx: 0 })
            .inst(InstructionKind::I32Const { value: 16 })
            .inst(InstructionKind::I32Load16U { memarg: memarg(0) })
            .inst(InstructionKind::DataDrop { data_idx: 0 })
            .returns(vec![ValueType::I32]);
        test.expect_stack(vec![Value::I32(0x0708)]);
    }

    #[test]
    fn init_after_drop_traps_unless_empty() {
        ExecutorTest::new()
            .with_memory(1, None)
            .with_passive_data(vec![9, 8, 7])
            .inst(InstructionKind::DataDrop { data_idx: 0 })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::MemoryInit { data_idx: 0 })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::MemoryInit { data_idx: 0 })
            .returns(vec![])
            .expect_trap(TrapKind::OutOfBoundsMemory);
    }
}
