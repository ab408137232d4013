//! Control flow operations for WebAssembly
//!
//! Structured control is resolved to instruction indices ahead of time, so
//! a branch is a jump to the continuation recorded in its label. `block`,
//! `loop`, `if`, `call` and `return` live in the executor, which owns the
//! frame and label stacks; this module holds the branch logic they share.

use super::{RuntimeError, Stack, TrapKind};
use crate::runtime::control::Label;

/// What the executor does after a control instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Fall through to the next instruction
    Next,
    /// Continue at this instruction index
    Jump(usize),
    /// Leave the current function
    Return,
}

/// Branch to the label `depth` levels out.
///
/// The top `arity` values are kept, everything the label's block pushed
/// beneath them is discarded, and the labels between here and the target
/// are popped. A loop keeps its own label since control re-enters it.
/// A depth equal to the number of labels in the frame names the function
/// body itself and acts as `return`.
fn perform_branch(
    stack: &mut Stack,
    labels: &mut Vec<Label>,
    label_base: usize,
    depth: u32,
) -> Result<Flow, RuntimeError> {
    let frame_labels = labels.len() - label_base;
    if depth as usize == frame_labels {
        return Ok(Flow::Return);
    }
    let idx = labels
        .len()
        .checked_sub(1 + depth as usize)
        .ok_or(RuntimeError::StackUnderflow)?;
    let label = labels[idx];

    let values = stack.pop_n(label.arity)?;
    stack.truncate(label.height);
    stack.push_all(values);

    labels.truncate(if label.kept_on_branch() { idx + 1 } else { idx });
    Ok(Flow::Jump(label.continuation))
}

/// br l - Unconditional branch
pub fn br(stack: &mut Stack, labels: &mut Vec<Label>, label_base: usize, depth: u32) -> Result<Flow, RuntimeError> {
    perform_branch(stack, labels, label_base, depth)
}

/// br_if l - branch when the popped condition is non-zero
pub fn br_if(
    stack: &mut Stack,
    labels: &mut Vec<Label>,
    label_base: usize,
    depth: u32,
) -> Result<Flow, RuntimeError> {
    let condition = stack.pop_i32()?;
    if condition != 0 {
        perform_branch(stack, labels, label_base, depth)
    } else {
        Ok(Flow::Next)
    }
}

/// br_table l* lN - the popped index, read as unsigned, selects a label;
/// out of range selects the default
pub fn br_table(
    stack: &mut Stack,
    labels: &mut Vec<Label>,
    label_base: usize,
    targets: &[u32],
    default: u32,
) -> Result<Flow, RuntimeError> {
    let index = stack.pop_u32()? as usize;
    let depth = targets.get(index).copied().unwrap_or(default);
    perform_branch(stack, labels, label_base, depth)
}

/// unreachable - Trap immediately
pub fn unreachable() -> Result<Flow, RuntimeError> {
    Err(TrapKind::Unreachable.into())
}

#[cfg(test)]
mod tests {
    use crate::parser::instruction::{BlockType, InstructionKind};
    use crate::parser::module::{FunctionType, ValueType};
    use crate::runtime::test_utils::test::ExecutorTest;
    use crate::runtime::{EngineConfig, TrapKind, Value};
    use rstest::rstest;

    fn block(value_type: Option<ValueType>) -> InstructionKind {
        InstructionKind::Block {
            block_type: value_type.map_or(BlockType::Empty, BlockType::Value),
        }
    }

    // ============================================================================
    // Block and Control Flow Tests
    // ============================================================================

    #[test]
    fn block_empty() {
        ExecutorTest::new()
            .inst(block(None))
            .inst(InstructionKind::End)
            .inst(InstructionKind::I32Const { value: 42 })
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(42)]);
    }

    #[test]
    fn block_with_value() {
        ExecutorTest::new()
            .inst(block(Some(ValueType::I32)))
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(42)]);
    }

    #[test]
    fn block_with_params_and_results() {
        // (i32 i32) -> (i32 i32), swaps its operands through a branch
        ExecutorTest::new()
            .with_type(FunctionType::new(
                vec![ValueType::I32, ValueType::I32],
                vec![ValueType::I32, ValueType::I32],
            ))
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::I32Const { value: 2 })
            .inst(InstructionKind::Block {
                block_type: BlockType::FuncType(0),
            })
            .inst(InstructionKind::I32Add)
            .inst(InstructionKind::I32Const { value: 10 })
            .inst(InstructionKind::Br { label_idx: 0 })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32, ValueType::I32])
            .expect_stack(vec![Value::I32(3), Value::I32(10)]);
    }

    #[test]
    fn br_discards_values_below_results() {
        ExecutorTest::new()
            .inst(block(Some(ValueType::I32)))
            .inst(InstructionKind::I64Const { value: 7 })
            .inst(InstructionKind::F32Const { value: 1.0 })
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(InstructionKind::Br { label_idx: 0 })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(42)]);
    }

    #[test]
    fn br_nested() {
        // Branch from inner to outer block
        ExecutorTest::new()
            .inst(block(Some(ValueType::I32)))
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(block(None))
            .inst(InstructionKind::Br { label_idx: 1 })
            .inst(InstructionKind::End)
            .inst(InstructionKind::Drop)
            .inst(InstructionKind::I32Const { value: 88 })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(42)]);
    }

    #[rstest]
    #[case(1, 42)]
    #[case(-1, 42)]
    #[case(0, 99)]
    fn br_if(#[case] condition: i32, #[case] expected: i32) {
        ExecutorTest::new()
            .inst(block(Some(ValueType::I32)))
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(InstructionKind::I32Const { value: condition })
            .inst(InstructionKind::BrIf { label_idx: 0 })
            .inst(InstructionKind::Drop)
            .inst(InstructionKind::I32Const { value: 99 })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(expected)]);
    }

    #[test]
    fn loop_counts_down() {
        // local 0 counts from 5 to 0, local 1 accumulates the iterations
        ExecutorTest::new()
            .args(vec![Value::I32(5)])
            .local(ValueType::I32)
            .inst(InstructionKind::Loop {
                block_type: BlockType::Empty,
            })
            .inst(InstructionKind::LocalGet { local_idx: 1 })
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::I32Add)
            .inst(InstructionKind::LocalSet { local_idx: 1 })
            .inst(InstructionKind::LocalGet { local_idx: 0 })
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::I32Sub)
            .inst(InstructionKind::LocalTee { local_idx: 0 })
            .inst(InstructionKind::BrIf { label_idx: 0 })
            .inst(InstructionKind::End)
            .inst(InstructionKind::LocalGet { local_idx: 1 })
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(5)]);
    }

    #[test]
    fn loop_branch_carries_parameters() {
        // The loop takes an i32 and re-enters with it doubled until it
        // exceeds 100
        ExecutorTest::new()
            .with_type(FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]))
            .inst(InstructionKind::I32Const { value: 3 })
            .inst(InstructionKind::Loop {
                block_type: BlockType::FuncType(0),
            })
            .inst(InstructionKind::I32Const { value: 2 })
            .inst(InstructionKind::I32Mul)
            .inst(InstructionKind::LocalTee { local_idx: 0 })
            .inst(InstructionKind::LocalGet { local_idx: 0 })
            .inst(InstructionKind::I32Const { value: 100 })
            .inst(InstructionKind::I32LtS)
            .inst(InstructionKind::BrIf { label_idx: 0 })
            .inst(InstructionKind::End)
            .local(ValueType::I32)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(192)]);
    }

    #[rstest]
    #[case(1, 42)]
    #[case(0, 88)]
    fn if_else(#[case] condition: i32, #[case] expected: i32) {
        ExecutorTest::new()
            .inst(InstructionKind::I32Const { value: condition })
            .inst(InstructionKind::If {
                block_type: BlockType::Value(ValueType::I32),
            })
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(InstructionKind::Else)
            .inst(InstructionKind::I32Const { value: 88 })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(expected)]);
    }

    #[rstest]
    #[case(1, 2)]
    #[case(0, 1)]
    fn if_without_else(#[case] condition: i32, #[case] expected: i32) {
        ExecutorTest::new()
            .args(vec![Value::I32(1)])
            .inst(InstructionKind::I32Const { value: condition })
            .inst(InstructionKind::If {
                block_type: BlockType::Empty,
            })
            .inst(InstructionKind::I32Const { value: 2 })
            .inst(InstructionKind::LocalSet { local_idx: 0 })
            .inst(InstructionKind::End)
            .inst(InstructionKind::LocalGet { local_idx: 0 })
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(expected)]);
    }

    #[test]
    fn nested_if() {
        ExecutorTest::new()
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::If {
                block_type: BlockType::Value(ValueType::I32),
            })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::If {
                block_type: BlockType::Value(ValueType::I32),
            })
            .inst(InstructionKind::I32Const { value: 11 })
            .inst(InstructionKind::Else)
            .inst(InstructionKind::I32Const { value: 22 })
            .inst(InstructionKind::End)
            .inst(InstructionKind::Else)
            .inst(InstructionKind::I32Const { value: 33 })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(22)]);
    }

    #[test]
    fn if_br() {
        // Branch out of if skips the else arm
        ExecutorTest::new()
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::If {
                block_type: BlockType::Value(ValueType::I32),
            })
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(InstructionKind::Br { label_idx: 0 })
            .inst(InstructionKind::Else)
            .inst(InstructionKind::I32Const { value: 99 })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(42)]);
    }

    // ============================================================================
    // Return Tests
    // ============================================================================

    #[test]
    fn return_simple() {
        ExecutorTest::new()
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(InstructionKind::Return)
            .inst(InstructionKind::I32Const { value: 99 })
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(42)]);
    }

    #[test]
    fn return_multiple_values() {
        ExecutorTest::new()
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::I32Const { value: 2 })
            .inst(InstructionKind::Return)
            .returns(vec![ValueType::I32, ValueType::I32])
            .expect_stack(vec![Value::I32(1), Value::I32(2)]);
    }

    #[test]
    fn return_from_nested_blocks() {
        ExecutorTest::new()
            .inst(block(None))
            .inst(InstructionKind::Loop {
                block_type: BlockType::Empty,
            })
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(InstructionKind::Return)
            .inst(InstructionKind::End)
            .inst(InstructionKind::End)
            .inst(InstructionKind::I32Const { value: 99 })
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(42)]);
    }

    #[test]
    fn br_to_function_label_returns() {
        ExecutorTest::new()
            .inst(block(None))
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(InstructionKind::Br { label_idx: 1 })
            .inst(InstructionKind::End)
            .inst(InstructionKind::I32Const { value: 99 })
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(42)]);
    }

    // ============================================================================
    // BrTable Tests
    // ============================================================================

    /// Three nested blocks around a `br_table` on the argument. Each exit
    /// records a marker in local 1, so the taken path shows in the result.
    fn three_way(index: i32) -> ExecutorTest {
        ExecutorTest::new()
            .args(vec![Value::I32(index)])
            .local(ValueType::I32)
            .inst(block(None))
            .inst(block(None))
            .inst(block(None))
            .inst(InstructionKind::LocalGet { local_idx: 0 })
            .inst(InstructionKind::BrTable {
                labels: vec![0, 1],
                default: 2,
            })
            .inst(InstructionKind::End)
            .inst(InstructionKind::I32Const { value: 100 })
            .inst(InstructionKind::LocalSet { local_idx: 1 })
            .inst(InstructionKind::Br { label_idx: 1 })
            .inst(InstructionKind::End)
            .inst(InstructionKind::I32Const { value: 200 })
            .inst(InstructionKind::LocalSet { local_idx: 1 })
            .inst(InstructionKind::End)
            .inst(InstructionKind::LocalGet { local_idx: 1 })
            .returns(vec![ValueType::I32])
    }

    #[rstest]
    #[case(0, 100)]
    #[case(1, 200)]
    #[case(2, 0)]
    #[case(-1, 0)]
    #[case(1_000_000, 0)]
    fn br_table_selects_label(#[case] index: i32, #[case] expected: i32) {
        three_way(index).expect_stack(vec![Value::I32(expected)]);
    }

    #[test]
    fn br_table_default_with_value() {
        ExecutorTest::new()
            .inst(block(Some(ValueType::I32)))
            .inst(InstructionKind::I32Const { value: 42 })
            .inst(InstructionKind::I32Const { value: 5 })
            .inst(InstructionKind::BrTable {
                labels: vec![],
                default: 0,
            })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(42)]);
    }

    #[test]
    fn br_table_invalid_label_depth() {
        ExecutorTest::new()
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::BrTable {
                labels: vec![5],
                default: 0,
            })
            .expect_error("unknown label 5");
    }

    // ============================================================================
    // Unreachable Tests
    // ============================================================================

    #[test]
    fn unreachable_immediate() {
        ExecutorTest::new()
            .inst(InstructionKind::Unreachable)
            .inst(InstructionKind::I32Const { value: 42 })
            .returns(vec![ValueType::I32])
            .expect_trap(TrapKind::Unreachable);
    }

    #[rstest]
    #[case(1)]
    #[case(0)]
    fn unreachable_in_taken_arm(#[case] condition: i32) {
        let (then_arm, else_arm) = if condition != 0 {
            (InstructionKind::Unreachable, InstructionKind::Nop)
        } else {
            (InstructionKind::Nop, InstructionKind::Unreachable)
        };
        ExecutorTest::new()
            .inst(InstructionKind::I32Const { value: condition })
            .inst(InstructionKind::If {
                block_type: BlockType::Empty,
            })
            .inst(then_arm)
            .inst(InstructionKind::Else)
            .inst(else_arm)
            .inst(InstructionKind::End)
            .expect_trap(TrapKind::Unreachable);
    }

    // ============================================================================
    // Call Tests
    // ============================================================================

    fn i32_binary() -> FunctionType {
        FunctionType::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32])
    }

    #[test]
    fn call_passes_arguments_in_order() {
        ExecutorTest::new()
            .function(
                i32_binary(),
                vec![],
                vec![
                    InstructionKind::LocalGet { local_idx: 0 },
                    InstructionKind::LocalGet { local_idx: 1 },
                    InstructionKind::I32Sub,
                ],
            )
            .inst(InstructionKind::I32Const { value: 10 })
            .inst(InstructionKind::I32Const { value: 3 })
            .inst(InstructionKind::Call { func_idx: 0 })
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(7)]);
    }

    #[test]
    fn callee_locals_are_fresh() {
        let counter = vec![
            InstructionKind::LocalGet { local_idx: 0 },
            InstructionKind::I32Const { value: 1 },
            InstructionKind::I32Add,
            InstructionKind::LocalTee { local_idx: 0 },
        ];
        ExecutorTest::new()
            .function(FunctionType::new(vec![], vec![ValueType::I32]), vec![ValueType::I32], counter)
            .inst(InstructionKind::Call { func_idx: 0 })
            .inst(InstructionKind::Call { func_idx: 0 })
            .returns(vec![ValueType::I32, ValueType::I32])
            .expect_stack(vec![Value::I32(1), Value::I32(1)]);
    }

    #[test]
    fn recursive_factorial() {
        // fac(n) = n < 2 ? 1 : n * fac(n - 1), over i64
        let fac = vec![
            InstructionKind::LocalGet { local_idx: 0 },
            InstructionKind::I64Const { value: 2 },
            InstructionKind::I64LtS,
            InstructionKind::If {
                block_type: BlockType::Value(ValueType::I64),
            },
            InstructionKind::I64Const { value: 1 },
            InstructionKind::Else,
            InstructionKind::LocalGet { local_idx: 0 },
            InstructionKind::LocalGet { local_idx: 0 },
            InstructionKind::I64Const { value: 1 },
            InstructionKind::I64Sub,
            InstructionKind::Call { func_idx: 0 },
            InstructionKind::I64Mul,
            InstructionKind::End,
        ];
        ExecutorTest::new()
            .function(FunctionType::new(vec![ValueType::I64], vec![ValueType::I64]), vec![], fac)
            .inst(InstructionKind::I64Const { value: 20 })
            .inst(InstructionKind::Call { func_idx: 0 })
            .returns(vec![ValueType::I64])
            .expect_stack(vec![Value::I64(2_432_902_008_176_640_000)]);
    }

    #[test]
    fn unbounded_recursion_exhausts_call_stack() {
        ExecutorTest::new()
            .with_config(EngineConfig::new().with_max_call_depth(100))
            .function(FunctionType::default(), vec![], vec![InstructionKind::Call { func_idx: 0 }])
            .inst(InstructionKind::Call { func_idx: 0 })
            .expect_trap(TrapKind::CallStackExhausted);
    }

    #[test]
    fn trap_in_callee_unwinds_everything() {
        ExecutorTest::new()
            .function(
                i32_binary(),
                vec![],
                vec![
                    InstructionKind::LocalGet { local_idx: 0 },
                    InstructionKind::LocalGet { local_idx: 1 },
                    InstructionKind::I32DivU,
                ],
            )
            .inst(block(Some(ValueType::I32)))
            .inst(InstructionKind::I32Const { value: 1 })
            .inst(InstructionKind::I32Const { value: 0 })
            .inst(InstructionKind::Call { func_idx: 0 })
            .inst(InstructionKind::End)
            .returns(vec![ValueType::I32])
            .expect_trap(TrapKind::DivideByZero);
    }

    // ============================================================================
    // Indirect Call Tests
    // ============================================================================

    /// Table of 3: [add, sub, null]
    fn indirect(index: i32, type_idx: FunctionType) -> ExecutorTest {
        let add = vec![
            InstructionKind::LocalGet { local_idx: 0 },
            InstructionKind::LocalGet { local_idx: 1 },
            InstructionKind::I32Add,
        ];
        let sub = vec![
            InstructionKind::LocalGet { local_idx: 0 },
            InstructionKind::LocalGet { local_idx: 1 },
            InstructionKind::I32Sub,
        ];
        ExecutorTest::new()
            .function(i32_binary(), vec![], add)
            .function(i32_binary(), vec![], sub)
            .with_table(3, None)
            .with_elements(0, vec![0, 1])
            .with_type(type_idx)
            .inst(InstructionKind::I32Const { value: 10 })
            .inst(InstructionKind::I32Const { value: 4 })
            .inst(InstructionKind::I32Const { value: index })
            .inst(InstructionKind::CallIndirect {
                type_idx: 0,
                table_idx: 0,
            })
            .returns(vec![ValueType::I32])
    }

    #[rstest]
    #[case(0, 14)]
    #[case(1, 6)]
    fn call_indirect_dispatches(#[case] index: i32, #[case] expected: i32) {
        indirect(index, i32_binary()).expect_stack(vec![Value::I32(expected)]);
    }

    #[rstest]
    #[case(2, TrapKind::UninitializedElement)]
    #[case(3, TrapKind::OutOfBoundsTable)]
    #[case(-1, TrapKind::OutOfBoundsTable)]
    fn call_indirect_traps(#[case] index: i32, #[case] trap: TrapKind) {
        indirect(index, i32_binary()).expect_trap(trap);
    }

    #[test]
    fn call_indirect_type_mismatch() {
        // Expected type (i32 i32) -> i64 differs from the entry's type
        let test = indirect(0, FunctionType::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I64]));
        test.returns(vec![ValueType::I64])
            .expect_trap(TrapKind::IndirectCallTypeMismatch);
    }
}
