//! Function body validation by abstract interpretation.
//!
//! The validator keeps a stack of operand types and a stack of control
//! frames. Every instruction pops the types it consumes and pushes the
//! types it produces. After `unreachable`, `br`, `br_table` and `return`
//! the current frame becomes polymorphic: pops below its entry height
//! yield [`MaybeValue::Unknown`], which matches any type.

use super::{invalid_index, table_ref_type, IndexSpace, ValidationError, ValidationErrorKind};
use crate::parser::error::DecodeError;
use crate::parser::instruction::{BlockType, InstructionKind, MemArg};
use crate::parser::module::{FunctionBody, FunctionType, Locals, Module, ValueType};
use crate::parser::reader::Reader;
use std::collections::HashSet;
use MaybeValue::{Unknown, Val};
use ValueType::*;

#[derive(PartialEq, Debug, Clone, Copy)]
enum MaybeValue {
    Val(ValueType),
    Unknown,
}

impl MaybeValue {
    fn is_num(&self) -> bool {
        match self {
            Val(v) => v.is_num(),
            Unknown => true,
        }
    }

    fn is_ref(&self) -> bool {
        match self {
            Val(v) => v.is_ref(),
            Unknown => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug, Clone)]
struct CtrlFrame {
    kind: FrameKind,
    start_types: Vec<ValueType>,
    end_types: Vec<ValueType>,
    height: usize,
    unreachable: bool,
    /// Instruction index of the opening `block`/`loop`/`if`
    start: usize,
}

impl CtrlFrame {
    /// Types a branch to this frame's label must carry.
    fn label_types(&self) -> &[ValueType] {
        if self.kind == FrameKind::Loop {
            &self.start_types
        } else {
            &self.end_types
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

fn mismatch() -> ValidationError {
    ValidationErrorKind::TypeMismatch.into()
}

pub(super) struct CodeValidator<'a> {
    module: &'a Module,
    declared: &'a HashSet<u32>,
    locals: Vec<ValueType>,
    return_types: &'a [ValueType],
    vals: Vec<MaybeValue>,
    ctrls: Vec<CtrlFrame>,
    /// Block targets, indexed like the decoded instructions
    targets: Vec<u32>,
}

impl<'a> CodeValidator<'a> {
    pub(super) fn new(
        module: &'a Module,
        declared: &'a HashSet<u32>,
        func_type: &'a FunctionType,
        locals: &Locals,
    ) -> CodeValidator<'a> {
        let mut all_locals = func_type.parameters.clone();
        all_locals.extend(locals.expand());
        CodeValidator {
            module,
            declared,
            locals: all_locals,
            return_types: &func_type.return_types,
            vals: Vec::new(),
            ctrls: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Decode and check a whole body. On failure the error comes back with
    /// the index of the instruction that caused it.
    #[allow(clippy::type_complexity)]
    pub(super) fn run(
        mut self,
        body: &FunctionBody,
    ) -> std::result::Result<(Vec<InstructionKind>, Vec<u32>), (ValidationError, usize)> {
        // the function body is the outermost block; its parameters are in
        // locals, not on the stack
        self.push_ctrl(FrameKind::Block, Vec::new(), self.return_types.to_vec(), 0);

        let mut reader = Reader::with_offset(&body.code, body.offset);
        let mut instructions = Vec::new();
        while !self.ctrls.is_empty() {
            let pc = instructions.len();
            let kind = InstructionKind::decode(&mut reader)
                .map_err(|e| (ValidationError::from(e), pc))?;
            self.targets.push(0);
            self.step(&kind, pc, reader.offset()).map_err(|e| (e, pc))?;
            instructions.push(kind);
        }
        if !reader.is_empty() {
            let err = DecodeError::malformed(
                reader.offset(),
                "operators remaining after end of function",
            );
            return Err((err.into(), instructions.len()));
        }
        Ok((instructions, self.targets))
    }

    fn push_val(&mut self, val: MaybeValue) {
        self.vals.push(val);
    }

    fn push_vals(&mut self, types: &[ValueType]) {
        self.vals.extend(types.iter().map(|t| Val(*t)));
    }

    fn pop_val(&mut self) -> Result<MaybeValue> {
        let frame = self.ctrls.last().ok_or_else(mismatch)?;
        if self.vals.len() == frame.height {
            if frame.unreachable {
                return Ok(Unknown);
            }
            return Err(ValidationErrorKind::StackMismatch.into());
        }
        self.vals.pop().ok_or_else(mismatch)
    }

    fn pop_expected(&mut self, expected: ValueType) -> Result<MaybeValue> {
        let actual = self.pop_val()?;
        match actual {
            Val(t) if t != expected => Err(mismatch()),
            _ => Ok(actual),
        }
    }

    fn pop_expecteds(&mut self, types: &[ValueType]) -> Result<Vec<MaybeValue>> {
        let mut popped = Vec::with_capacity(types.len());
        for t in types.iter().rev() {
            popped.push(self.pop_expected(*t)?);
        }
        popped.reverse();
        Ok(popped)
    }

    fn push_ctrl(
        &mut self,
        kind: FrameKind,
        start_types: Vec<ValueType>,
        end_types: Vec<ValueType>,
        start: usize,
    ) {
        let height = self.vals.len();
        self.push_vals(&start_types);
        self.ctrls.push(CtrlFrame {
            kind,
            start_types,
            end_types,
            height,
            unreachable: false,
            start,
        });
    }

    fn pop_ctrl(&mut self) -> Result<CtrlFrame> {
        let end_types = self.ctrls.last().ok_or_else(mismatch)?.end_types.clone();
        self.pop_expecteds(&end_types)?;
        let frame = self.ctrls.pop().ok_or_else(mismatch)?;
        if self.vals.len() != frame.height {
            return Err(ValidationErrorKind::StackMismatch.into());
        }
        Ok(frame)
    }

    fn unreachable(&mut self) -> Result<()> {
        let frame = self.ctrls.last_mut().ok_or_else(mismatch)?;
        self.vals.truncate(frame.height);
        frame.unreachable = true;
        Ok(())
    }

    fn sig_unary(&mut self, input: ValueType, output: ValueType) -> Result<()> {
        self.pop_expected(input)?;
        self.push_val(Val(output));
        Ok(())
    }

    fn sig_binary(&mut self, input: ValueType, output: ValueType) -> Result<()> {
        self.pop_expected(input)?;
        self.pop_expected(input)?;
        self.push_val(Val(output));
        Ok(())
    }

    fn label_types(&self, depth: u32) -> Result<Vec<ValueType>> {
        let index = (self.ctrls.len() as u64)
            .checked_sub(depth as u64 + 1)
            .ok_or(ValidationErrorKind::UnknownLabel { depth })?;
        Ok(self.ctrls[index as usize].label_types().to_vec())
    }

    fn local(&self, local_idx: u32) -> Result<ValueType> {
        self.locals
            .get(local_idx as usize)
            .copied()
            .ok_or_else(|| invalid_index(IndexSpace::Local, local_idx))
    }

    fn block_signature(&self, block_type: BlockType) -> Result<(Vec<ValueType>, Vec<ValueType>)> {
        match block_type {
            BlockType::Empty => Ok((Vec::new(), Vec::new())),
            BlockType::Value(t) => Ok((Vec::new(), vec![t])),
            BlockType::FuncType(type_idx) => {
                let func_type = self
                    .module
                    .types
                    .get(type_idx as usize)
                    .ok_or_else(|| invalid_index(IndexSpace::Type, type_idx))?;
                Ok((func_type.parameters.clone(), func_type.return_types.clone()))
            }
        }
    }

    fn check_memory(&self) -> Result<()> {
        match self.module.memory_type(0) {
            Some(_) => Ok(()),
            None => Err(invalid_index(IndexSpace::Memory, 0)),
        }
    }

    fn check_memarg(&self, memarg: &MemArg, natural: u32) -> Result<()> {
        self.check_memory()?;
        if memarg.align > natural {
            return Err(ValidationErrorKind::InvalidAlignment.into());
        }
        Ok(())
    }

    fn check_data_index(&self, data_idx: u32) -> Result<()> {
        let count = self
            .module
            .data_count
            .ok_or(ValidationErrorKind::DataCountRequired)?;
        if data_idx >= count {
            return Err(invalid_index(IndexSpace::Data, data_idx));
        }
        Ok(())
    }

    fn element_type(&self, elem_idx: u32) -> Result<ValueType> {
        self.module
            .elements
            .get(elem_idx as usize)
            .map(|e| ValueType::from(e.ref_type))
            .ok_or_else(|| invalid_index(IndexSpace::Element, elem_idx))
    }

    fn table_type(&self, table_idx: u32) -> Result<ValueType> {
        table_ref_type(self.module, table_idx).map(ValueType::from)
    }

    fn load(&mut self, memarg: &MemArg, natural: u32, output: ValueType) -> Result<()> {
        self.check_memarg(memarg, natural)?;
        self.sig_unary(I32, output)
    }

    fn store(&mut self, memarg: &MemArg, natural: u32, input: ValueType) -> Result<()> {
        self.check_memarg(memarg, natural)?;
        self.pop_expected(input)?;
        self.pop_expected(I32)?;
        Ok(())
    }

    fn select(&mut self, typed: Option<ValueType>) -> Result<()> {
        self.pop_expected(I32)?;
        match typed {
            Some(t) => {
                self.pop_expected(t)?;
                self.pop_expected(t)?;
                self.push_val(Val(t));
            }
            None => {
                let t1 = self.pop_val()?;
                let t2 = self.pop_val()?;
                if !(t1.is_num() && t2.is_num()) {
                    return Err(mismatch());
                }
                if t1 != t2 && t1 != Unknown && t2 != Unknown {
                    return Err(mismatch());
                }
                self.push_val(if t1 == Unknown { t2 } else { t1 });
            }
        }
        Ok(())
    }

    fn branch(&mut self, depth: u32) -> Result<()> {
        let types = self.label_types(depth)?;
        self.pop_expecteds(&types)?;
        self.unreachable()
    }

    fn step(&mut self, kind: &InstructionKind, pc: usize, end_offset: usize) -> Result<()> {
        use InstructionKind::*;

        if let Some((_, memarg)) = kind.memory_access() {
            let natural = kind.natural_alignment().unwrap_or(0);
            return match kind {
                I32Load { .. } | I32Load8S { .. } | I32Load8U { .. } | I32Load16S { .. }
                | I32Load16U { .. } => self.load(&memarg, natural, I32),
                I64Load { .. } | I64Load8S { .. } | I64Load8U { .. } | I64Load16S { .. }
                | I64Load16U { .. } | I64Load32S { .. } | I64Load32U { .. } => {
                    self.load(&memarg, natural, I64)
                }
                F32Load { .. } => self.load(&memarg, natural, F32),
                F64Load { .. } => self.load(&memarg, natural, F64),
                I32Store { .. } | I32Store8 { .. } | I32Store16 { .. } => {
                    self.store(&memarg, natural, I32)
                }
                I64Store { .. } | I64Store8 { .. } | I64Store16 { .. } | I64Store32 { .. } => {
                    self.store(&memarg, natural, I64)
                }
                F32Store { .. } => self.store(&memarg, natural, F32),
                _ => self.store(&memarg, natural, F64),
            };
        }

        match kind {
            // Control instructions
            Unreachable => self.unreachable(),
            Nop => Ok(()),
            Block { block_type } | Loop { block_type } | If { block_type } => {
                if matches!(kind, If { .. }) {
                    self.pop_expected(I32)?;
                }
                let (params, results) = self.block_signature(*block_type)?;
                self.pop_expecteds(&params)?;
                let frame_kind = match kind {
                    Block { .. } => FrameKind::Block,
                    Loop { .. } => FrameKind::Loop,
                    _ => FrameKind::If,
                };
                self.push_ctrl(frame_kind, params, results, pc);
                Ok(())
            }
            Else => {
                let is_if = self.ctrls.last().map(|f| f.kind) == Some(FrameKind::If);
                if !is_if {
                    let err = DecodeError::malformed(end_offset - 1, "else without matching if");
                    return Err(err.into());
                }
                let frame = self.pop_ctrl()?;
                self.targets[frame.start] = pc as u32;
                self.push_ctrl(FrameKind::Else, frame.start_types, frame.end_types, pc);
                Ok(())
            }
            End => {
                let frame = self.pop_ctrl()?;
                if frame.kind == FrameKind::If && frame.start_types != frame.end_types {
                    // an `if` without `else` must leave its parameters unchanged
                    return Err(mismatch());
                }
                if !self.ctrls.is_empty() {
                    self.targets[frame.start] = pc as u32;
                }
                self.push_vals(&frame.end_types);
                Ok(())
            }
            Br { label_idx } => self.branch(*label_idx),
            BrIf { label_idx } => {
                self.pop_expected(I32)?;
                let types = self.label_types(*label_idx)?;
                self.pop_expecteds(&types)?;
                self.push_vals(&types);
                Ok(())
            }
            BrTable { labels, default } => {
                self.pop_expected(I32)?;
                let arity = self.label_types(*default)?.len();
                for label in labels {
                    let types = self.label_types(*label)?;
                    if types.len() != arity {
                        return Err(mismatch());
                    }
                    let popped = self.pop_expecteds(&types)?;
                    self.vals.extend(popped);
                }
                self.branch(*default)
            }
            Return => {
                let types = self.return_types.to_vec();
                self.pop_expecteds(&types)?;
                self.unreachable()
            }
            Call { func_idx } => {
                let func_type = self
                    .module
                    .func_type(*func_idx)
                    .ok_or_else(|| invalid_index(IndexSpace::Function, *func_idx))?;
                self.pop_expecteds(&func_type.parameters)?;
                self.push_vals(&func_type.return_types);
                Ok(())
            }
            CallIndirect {
                type_idx,
                table_idx,
            } => {
                if self.table_type(*table_idx)? != FuncRef {
                    return Err(mismatch());
                }
                let func_type = self
                    .module
                    .types
                    .get(*type_idx as usize)
                    .ok_or_else(|| invalid_index(IndexSpace::Type, *type_idx))?;
                self.pop_expected(I32)?;
                self.pop_expecteds(&func_type.parameters)?;
                self.push_vals(&func_type.return_types);
                Ok(())
            }

            // Reference instructions
            RefNull { ref_type } => {
                self.push_val(Val(ValueType::from(*ref_type)));
                Ok(())
            }
            RefIsNull => {
                if !self.pop_val()?.is_ref() {
                    return Err(mismatch());
                }
                self.push_val(Val(I32));
                Ok(())
            }
            RefFunc { func_idx } => {
                if *func_idx >= self.module.total_functions() {
                    return Err(invalid_index(IndexSpace::Function, *func_idx));
                }
                if !self.declared.contains(func_idx) {
                    return Err(ValidationErrorKind::UndeclaredFunctionReference {
                        func_idx: *func_idx,
                    }
                    .into());
                }
                self.push_val(Val(FuncRef));
                Ok(())
            }

            // Parametric instructions
            Drop => self.pop_val().map(|_| ()),
            Select => self.select(None),
            SelectTyped { val_types } => match val_types.as_slice() {
                [t] => self.select(Some(*t)),
                _ => Err(mismatch()),
            },

            // Variable instructions
            LocalGet { local_idx } => {
                let t = self.local(*local_idx)?;
                self.push_val(Val(t));
                Ok(())
            }
            LocalSet { local_idx } => {
                let t = self.local(*local_idx)?;
                self.pop_expected(t).map(|_| ())
            }
            LocalTee { local_idx } => {
                let t = self.local(*local_idx)?;
                self.sig_unary(t, t)
            }
            GlobalGet { global_idx } => {
                let global = self
                    .module
                    .global_type(*global_idx)
                    .ok_or_else(|| invalid_index(IndexSpace::Global, *global_idx))?;
                self.push_val(Val(global.value_type));
                Ok(())
            }
            GlobalSet { global_idx } => {
                let global = self
                    .module
                    .global_type(*global_idx)
                    .ok_or_else(|| invalid_index(IndexSpace::Global, *global_idx))?;
                if !global.mutable {
                    return Err(ValidationErrorKind::ImmutableGlobal.into());
                }
                self.pop_expected(global.value_type).map(|_| ())
            }

            // Table instructions
            TableGet { table_idx } => {
                let t = self.table_type(*table_idx)?;
                self.sig_unary(I32, t)
            }
            TableSet { table_idx } => {
                let t = self.table_type(*table_idx)?;
                self.pop_expected(t)?;
                self.pop_expected(I32).map(|_| ())
            }
            TableSize { table_idx } => {
                self.table_type(*table_idx)?;
                self.push_val(Val(I32));
                Ok(())
            }
            TableGrow { table_idx } => {
                let t = self.table_type(*table_idx)?;
                self.pop_expected(I32)?;
                self.pop_expected(t)?;
                self.push_val(Val(I32));
                Ok(())
            }
            TableFill { table_idx } => {
                let t = self.table_type(*table_idx)?;
                self.pop_expecteds(&[I32, t, I32]).map(|_| ())
            }
            TableCopy {
                dst_table,
                src_table,
            } => {
                if self.table_type(*dst_table)? != self.table_type(*src_table)? {
                    return Err(mismatch());
                }
                self.pop_expecteds(&[I32, I32, I32]).map(|_| ())
            }
            TableInit {
                elem_idx,
                table_idx,
            } => {
                if self.table_type(*table_idx)? != self.element_type(*elem_idx)? {
                    return Err(mismatch());
                }
                self.pop_expecteds(&[I32, I32, I32]).map(|_| ())
            }
            ElemDrop { elem_idx } => self.element_type(*elem_idx).map(|_| ()),

            // Memory instructions
            MemorySize => {
                self.check_memory()?;
                self.push_val(Val(I32));
                Ok(())
            }
            MemoryGrow => {
                self.check_memory()?;
                self.sig_unary(I32, I32)
            }
            MemoryInit { data_idx } => {
                self.check_memory()?;
                self.check_data_index(*data_idx)?;
                self.pop_expecteds(&[I32, I32, I32]).map(|_| ())
            }
            DataDrop { data_idx } => self.check_data_index(*data_idx),
            MemoryCopy | MemoryFill => {
                self.check_memory()?;
                self.pop_expecteds(&[I32, I32, I32]).map(|_| ())
            }

            // Constants
            I32Const { .. } => {
                self.push_val(Val(I32));
                Ok(())
            }
            I64Const { .. } => {
                self.push_val(Val(I64));
                Ok(())
            }
            F32Const { .. } => {
                self.push_val(Val(F32));
                Ok(())
            }
            F64Const { .. } => {
                self.push_val(Val(F64));
                Ok(())
            }

            // testop, relop
            I32Eqz => self.sig_unary(I32, I32),
            I32Eq | I32Ne | I32LtS | I32LtU | I32GtS | I32GtU | I32LeS | I32LeU | I32GeS
            | I32GeU => self.sig_binary(I32, I32),
            I64Eqz => self.sig_unary(I64, I32),
            I64Eq | I64Ne | I64LtS | I64LtU | I64GtS | I64GtU | I64LeS | I64LeU | I64GeS
            | I64GeU => self.sig_binary(I64, I32),
            F32Eq | F32Ne | F32Lt | F32Gt | F32Le | F32Ge => self.sig_binary(F32, I32),
            F64Eq | F64Ne | F64Lt | F64Gt | F64Le | F64Ge => self.sig_binary(F64, I32),

            // unop, binop
            I32Clz | I32Ctz | I32Popcnt | I32Extend8S | I32Extend16S => self.sig_unary(I32, I32),
            I32Add | I32Sub | I32Mul | I32DivS | I32DivU | I32RemS | I32RemU | I32And | I32Or
            | I32Xor | I32Shl | I32ShrS | I32ShrU | I32Rotl | I32Rotr => self.sig_binary(I32, I32),
            I64Clz | I64Ctz | I64Popcnt | I64Extend8S | I64Extend16S | I64Extend32S => {
                self.sig_unary(I64, I64)
            }
            I64Add | I64Sub | I64Mul | I64DivS | I64DivU | I64RemS | I64RemU | I64And | I64Or
            | I64Xor | I64Shl | I64ShrS | I64ShrU | I64Rotl | I64Rotr => self.sig_binary(I64, I64),
            F32Abs | F32Neg | F32Ceil | F32Floor | F32Trunc | F32Nearest | F32Sqrt => {
                self.sig_unary(F32, F32)
            }
            F32Add | F32Sub | F32Mul | F32Div | F32Min | F32Max | F32Copysign => {
                self.sig_binary(F32, F32)
            }
            F64Abs | F64Neg | F64Ceil | F64Floor | F64Trunc | F64Nearest | F64Sqrt => {
                self.sig_unary(F64, F64)
            }
            F64Add | F64Sub | F64Mul | F64Div | F64Min | F64Max | F64Copysign => {
                self.sig_binary(F64, F64)
            }

            // cvtop
            I32WrapI64 => self.sig_unary(I64, I32),
            I32TruncF32S | I32TruncF32U | I32TruncSatF32S | I32TruncSatF32U
            | I32ReinterpretF32 => self.sig_unary(F32, I32),
            I32TruncF64S | I32TruncF64U | I32TruncSatF64S | I32TruncSatF64U => {
                self.sig_unary(F64, I32)
            }
            I64ExtendI32S | I64ExtendI32U => self.sig_unary(I32, I64),
            I64TruncF32S | I64TruncF32U | I64TruncSatF32S | I64TruncSatF32U => {
                self.sig_unary(F32, I64)
            }
            I64TruncF64S | I64TruncF64U | I64TruncSatF64S | I64TruncSatF64U
            | I64ReinterpretF64 => self.sig_unary(F64, I64),
            F32ConvertI32S | F32ConvertI32U | F32ReinterpretI32 => self.sig_unary(I32, F32),
            F32ConvertI64S | F32ConvertI64U => self.sig_unary(I64, F32),
            F32DemoteF64 => self.sig_unary(F64, F32),
            F64ConvertI32S | F64ConvertI32U => self.sig_unary(I32, F64),
            F64ConvertI64S | F64ConvertI64U | F64ReinterpretI64 => self.sig_unary(I64, F64),
            F64PromoteF32 => self.sig_unary(F32, F64),

            // loads and stores were handled above
            I32Load { .. } | I64Load { .. } | F32Load { .. } | F64Load { .. }
            | I32Load8S { .. } | I32Load8U { .. } | I32Load16S { .. } | I32Load16U { .. }
            | I64Load8S { .. } | I64Load8U { .. } | I64Load16S { .. } | I64Load16U { .. }
            | I64Load32S { .. } | I64Load32U { .. } | I32Store { .. } | I64Store { .. }
            | F32Store { .. } | F64Store { .. } | I32Store8 { .. } | I32Store16 { .. }
            | I64Store8 { .. } | I64Store16 { .. } | I64Store32 { .. } => Ok(()),
        }
    }
}
