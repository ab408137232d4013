//! WebAssembly instruction executor
//!
//! The interpreter runs validated code from a flat instruction list. Calls
//! push a [`Frame`] instead of recursing on the Rust stack, so call depth is
//! bounded by [`EngineConfig`](super::EngineConfig) rather than by the host
//! thread. Structured control uses the targets the validator recorded for
//! every `block`, `loop`, `if` and `else`.

use super::{
    control::{Label, LabelKind},
    frame::Frame,
    instance::Instance,
    ops::{self, control::Flow},
    stack::Stack,
    store::{FuncAddr, FunctionInstance, SharedGlobal, SharedMemory, SharedTable, Store},
    RuntimeError, Trap, TrapKind, Value,
};
use crate::parser::instruction::{BlockType, InstructionKind};
use crate::parser::module::{Module, ValueType};
use crate::parser::validate::FunctionCode;
use tracing::{debug, trace};

/// Executes WebAssembly functions against a store
pub struct Executor<'s> {
    store: &'s Store,
    stack: Stack,
    /// Labels of every active frame; each frame owns those above its
    /// `label_base`
    labels: Vec<Label>,
    frames: Vec<Frame<'s>>,
}

impl<'s> Executor<'s> {
    pub fn new(store: &'s Store) -> Self {
        Executor {
            store,
            stack: Stack::new(),
            labels: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Call the function at `addr` and run it to completion.
    ///
    /// Argument types are checked by the caller. On a trap every frame is
    /// abandoned; writes already made to memories, tables and globals stay.
    pub fn invoke(&mut self, addr: FuncAddr, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        trace!(func = addr.0, args = args.len(), "invoke");
        self.stack.push_all(args.iter().copied());
        self.call(addr)?;
        self.run()?;
        Ok(self.stack.drain())
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        while let Some(frame) = self.frames.last_mut() {
            let code = frame.code;
            let pc = frame.pc;
            frame.pc = pc + 1;

            let flow = self.step(code, pc).map_err(|e| {
                debug!(func = code.func_idx, pc, error = %e, "execution trapped");
                e.at(code.func_idx, pc)
            })?;
            match flow {
                Flow::Next => {}
                Flow::Jump(target) => {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.pc = target;
                    }
                }
                Flow::Return => self.return_from_frame()?,
            }
        }
        Ok(())
    }

    /// Enter the function at `addr`, whose arguments are on the stack. Host
    /// functions run to completion here; wasm functions get a new frame.
    fn call(&mut self, addr: FuncAddr) -> Result<(), RuntimeError> {
        let store = self.store;
        match store.function(addr).ok_or(RuntimeError::UnknownFunction(addr.0))? {
            FunctionInstance::Host { func_type, func } => {
                let args = self.stack.pop_n(func_type.parameters.len())?;
                let results = func(&args)?;
                let actual: Vec<ValueType> = results.iter().map(Value::typ).collect();
                if actual != func_type.return_types {
                    return Err(Trap::host(format!(
                        "host function returned {actual:?}, expected {:?}",
                        func_type.return_types
                    ))
                    .into());
                }
                self.stack.push_all(results);
            }
            FunctionInstance::Wasm {
                instance,
                func_idx,
                func_type,
            } => {
                let config = store.config();
                if self.frames.len() >= config.max_call_depth || self.stack.depth() > config.max_operand_stack {
                    return Err(TrapKind::CallStackExhausted.into());
                }
                let instance = store.defining_instance(*instance).ok_or(RuntimeError::UnknownInstance(instance.0))?;
                let code = instance.code(*func_idx).ok_or(RuntimeError::UnknownFunction(addr.0))?;

                let mut locals = self.stack.pop_n(func_type.parameters.len())?;
                locals.extend(code.locals.iter().map(|t| Value::default_for(*t)));
                self.frames.push(Frame {
                    instance,
                    code,
                    locals,
                    pc: 0,
                    label_base: self.labels.len(),
                    stack_base: self.stack.depth(),
                    arity: func_type.return_types.len(),
                });
            }
        }
        Ok(())
    }

    /// Pop the current frame, leaving only its results on the stack
    fn return_from_frame(&mut self) -> Result<(), RuntimeError> {
        let frame = self.frames.pop().ok_or(RuntimeError::StackUnderflow)?;
        let results = self.stack.pop_n(frame.arity)?;
        self.stack.truncate(frame.stack_base);
        self.stack.push_all(results);
        self.labels.truncate(frame.label_base);
        Ok(())
    }

    /// Execute the instruction at `pc` of `code`, the current frame's body
    fn step(&mut self, code: &'s FunctionCode, pc: usize) -> Result<Flow, RuntimeError> {
        use InstructionKind::*;

        let store = self.store;
        let (instance, label_base) = match self.frames.last() {
            Some(frame) => (frame.instance, frame.label_base),
            None => return Err(RuntimeError::StackUnderflow),
        };

        // Operations that only touch the operand stack
        macro_rules! on_stack {
            ($op:path) => {{
                $op(&mut self.stack)?;
                Ok(Flow::Next)
            }};
        }

        macro_rules! with_memory {
            (load $op:ident($memarg:expr)) => {{
                let memory = memory(store, instance)?;
                ops::memory::$op(&mut self.stack, &memory.borrow(), $memarg)?;
                Ok(Flow::Next)
            }};
            (store $op:ident($memarg:expr)) => {{
                let memory = memory(store, instance)?;
                ops::memory::$op(&mut self.stack, &mut memory.borrow_mut(), $memarg)?;
                Ok(Flow::Next)
            }};
        }

        match &code.instructions[pc] {
            // ----------------------------------------------------------------
            // Control Instructions
            Unreachable => ops::control::unreachable(),
            Nop => Ok(Flow::Next),

            Block { block_type } => {
                let (params, results) = block_arity(instance.module(), block_type);
                let height = self.stack.depth() - params;
                self.labels
                    .push(Label::new(LabelKind::Block, results, height, code.target(pc) + 1));
                Ok(Flow::Next)
            }

            Loop { block_type } => {
                let (params, _) = block_arity(instance.module(), block_type);
                let height = self.stack.depth() - params;
                self.labels.push(Label::new(LabelKind::Loop, params, height, pc + 1));
                Ok(Flow::Next)
            }

            If { block_type } => {
                let condition = self.stack.pop_i32()?;
                let (params, results) = block_arity(instance.module(), block_type);
                let height = self.stack.depth() - params;

                let target = code.target(pc);
                let has_else = matches!(code.instructions[target], Else);
                let end = if has_else { code.target(target) } else { target };
                self.labels.push(Label::new(LabelKind::If, results, height, end + 1));

                if condition != 0 {
                    Ok(Flow::Next)
                } else if has_else {
                    Ok(Flow::Jump(target + 1))
                } else {
                    // The `end` pops the label
                    Ok(Flow::Jump(target))
                }
            }

            // The then arm finished; skip to the `end` of the else arm
            Else => Ok(Flow::Jump(code.target(pc))),

            End => {
                if self.labels.len() > label_base {
                    self.labels.pop();
                    Ok(Flow::Next)
                } else {
                    Ok(Flow::Return)
                }
            }

            Br { label_idx } => ops::control::br(&mut self.stack, &mut self.labels, label_base, *label_idx),
            BrIf { label_idx } => ops::control::br_if(&mut self.stack, &mut self.labels, label_base, *label_idx),
            BrTable { labels, default } => {
                ops::control::br_table(&mut self.stack, &mut self.labels, label_base, labels, *default)
            }
            Return => Ok(Flow::Return),

            Call { func_idx } => {
                self.call(instance.func_addr(*func_idx))?;
                Ok(Flow::Next)
            }

            CallIndirect { type_idx, table_idx } => {
                let table = table(store, instance, *table_idx)?;
                let index = self.stack.pop_u32()?;
                let entry = table.borrow().get(index)?;
                let addr = match entry {
                    Value::FuncRef(Some(addr)) => addr,
                    Value::FuncRef(None) => return Err(TrapKind::UninitializedElement.into()),
                    // validation only admits funcref tables here
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: ValueType::FuncRef,
                            actual: other.typ(),
                        })
                    }
                };
                let expected = instance.module().types.get(*type_idx as usize);
                if expected.is_none() || store.function_type(addr) != expected {
                    return Err(TrapKind::IndirectCallTypeMismatch.into());
                }
                self.call(addr)?;
                Ok(Flow::Next)
            }

            // ----------------------------------------------------------------
            // Reference Instructions
            RefNull { ref_type } => {
                ops::reference::ref_null(&mut self.stack, *ref_type)?;
                Ok(Flow::Next)
            }
            RefIsNull => on_stack!(ops::reference::ref_is_null),
            RefFunc { func_idx } => {
                ops::reference::ref_func(&mut self.stack, instance.func_addr(*func_idx))?;
                Ok(Flow::Next)
            }

            // ----------------------------------------------------------------
            // Parametric Instructions
            Drop => on_stack!(ops::parametric::drop),
            Select | SelectTyped { .. } => on_stack!(ops::parametric::select),

            // ----------------------------------------------------------------
            // Variable Instructions
            LocalGet { local_idx } => {
                let frame = self.frames.last().ok_or(RuntimeError::StackUnderflow)?;
                ops::variable::local_get(&mut self.stack, frame, *local_idx)?;
                Ok(Flow::Next)
            }
            LocalSet { local_idx } => {
                let frame = self.frames.last_mut().ok_or(RuntimeError::StackUnderflow)?;
                ops::variable::local_set(&mut self.stack, frame, *local_idx)?;
                Ok(Flow::Next)
            }
            LocalTee { local_idx } => {
                let frame = self.frames.last_mut().ok_or(RuntimeError::StackUnderflow)?;
                ops::variable::local_tee(&mut self.stack, frame, *local_idx)?;
                Ok(Flow::Next)
            }
            GlobalGet { global_idx } => {
                ops::variable::global_get(&mut self.stack, global(store, instance, *global_idx)?)?;
                Ok(Flow::Next)
            }
            GlobalSet { global_idx } => {
                ops::variable::global_set(&mut self.stack, global(store, instance, *global_idx)?)?;
                Ok(Flow::Next)
            }

            // ----------------------------------------------------------------
            // Table Instructions
            TableGet { table_idx } => {
                let table = table(store, instance, *table_idx)?;
                ops::table::table_get(&mut self.stack, &table.borrow())?;
                Ok(Flow::Next)
            }
            TableSet { table_idx } => {
                let table = table(store, instance, *table_idx)?;
                ops::table::table_set(&mut self.stack, &mut table.borrow_mut())?;
                Ok(Flow::Next)
            }
            TableSize { table_idx } => {
                let table = table(store, instance, *table_idx)?;
                ops::table::table_size(&mut self.stack, &table.borrow())?;
                Ok(Flow::Next)
            }
            TableGrow { table_idx } => {
                let table = table(store, instance, *table_idx)?;
                ops::table::table_grow(&mut self.stack, &mut table.borrow_mut())?;
                Ok(Flow::Next)
            }
            TableFill { table_idx } => {
                let table = table(store, instance, *table_idx)?;
                ops::table::table_fill(&mut self.stack, &mut table.borrow_mut())?;
                Ok(Flow::Next)
            }
            TableCopy { dst_table, src_table } => {
                let dst = table(store, instance, *dst_table)?;
                let src = table(store, instance, *src_table)?;
                ops::table::table_copy(&mut self.stack, dst, src)?;
                Ok(Flow::Next)
            }
            TableInit { elem_idx, table_idx } => {
                let table = table(store, instance, *table_idx)?;
                let segment = instance.element(*elem_idx);
                ops::table::table_init(&mut self.stack, &mut table.borrow_mut(), &segment)?;
                Ok(Flow::Next)
            }
            ElemDrop { elem_idx } => {
                instance.drop_element(*elem_idx);
                Ok(Flow::Next)
            }

            // ----------------------------------------------------------------
            // Memory Instructions
            I32Load { memarg } => with_memory!(load i32_load(memarg)),
            I64Load { memarg } => with_memory!(load i64_load(memarg)),
            F32Load { memarg } => with_memory!(load f32_load(memarg)),
            F64Load { memarg } => with_memory!(load f64_load(memarg)),
            I32Load8S { memarg } => with_memory!(load i32_load8_s(memarg)),
            I32Load8U { memarg } => with_memory!(load i32_load8_u(memarg)),
            I32Load16S { memarg } => with_memory!(load i32_load16_s(memarg)),
            I32Load16U { memarg } => with_memory!(load i32_load16_u(memarg)),
            I64Load8S { memarg } => with_memory!(load i64_load8_s(memarg)),
            I64Load8U { memarg } => with_memory!(load i64_load8_u(memarg)),
            I64Load16S { memarg } => with_memory!(load i64_load16_s(memarg)),
            I64Load16U { memarg } => with_memory!(load i64_load16_u(memarg)),
            I64Load32S { memarg } => with_memory!(load i64_load32_s(memarg)),
            I64Load32U { memarg } => with_memory!(load i64_load32_u(memarg)),

            I32Store { memarg } => with_memory!(store i32_store(memarg)),
            I64Store { memarg } => with_memory!(store i64_store(memarg)),
            F32Store { memarg } => with_memory!(store f32_store(memarg)),
            F64Store { memarg } => with_memory!(store f64_store(memarg)),
            I32Store8 { memarg } => with_memory!(store i32_store8(memarg)),
            I32Store16 { memarg } => with_memory!(store i32_store16(memarg)),
            I64Store8 { memarg } => with_memory!(store i64_store8(memarg)),
            I64Store16 { memarg } => with_memory!(store i64_store16(memarg)),
            I64Store32 { memarg } => with_memory!(store i64_store32(memarg)),

            MemorySize => {
                let memory = memory(store, instance)?;
                ops::memory::memory_size(&mut self.stack, &memory.borrow())?;
                Ok(Flow::Next)
            }
            MemoryGrow => {
                let memory = memory(store, instance)?;
                ops::memory::memory_grow(&mut self.stack, &mut memory.borrow_mut())?;
                Ok(Flow::Next)
            }
            MemoryInit { data_idx } => {
                let memory = memory(store, instance)?;
                ops::memory::memory_init(&mut self.stack, &mut memory.borrow_mut(), instance.data(*data_idx))?;
                Ok(Flow::Next)
            }
            DataDrop { data_idx } => {
                instance.drop_data(*data_idx);
                Ok(Flow::Next)
            }
            MemoryCopy => {
                let memory = memory(store, instance)?;
                ops::memory::memory_copy(&mut self.stack, &mut memory.borrow_mut())?;
                Ok(Flow::Next)
            }
            MemoryFill => {
                let memory = memory(store, instance)?;
                ops::memory::memory_fill(&mut self.stack, &mut memory.borrow_mut())?;
                Ok(Flow::Next)
            }

            // ----------------------------------------------------------------
            // Numeric Instructions - Constants
            I32Const { value } => {
                ops::numeric::i32_const(&mut self.stack, *value)?;
                Ok(Flow::Next)
            }
            I64Const { value } => {
                ops::numeric::i64_const(&mut self.stack, *value)?;
                Ok(Flow::Next)
            }
            F32Const { value } => {
                ops::numeric::f32_const(&mut self.stack, *value)?;
                Ok(Flow::Next)
            }
            F64Const { value } => {
                ops::numeric::f64_const(&mut self.stack, *value)?;
                Ok(Flow::Next)
            }

            // i32 comparison
            I32Eqz => on_stack!(ops::comparison::i32_eqz),
            I32Eq => on_stack!(ops::comparison::i32_eq),
            I32Ne => on_stack!(ops::comparison::i32_ne),
            I32LtS => on_stack!(ops::comparison::i32_lt_s),
            I32LtU => on_stack!(ops::comparison::i32_lt_u),
            I32GtS => on_stack!(ops::comparison::i32_gt_s),
            I32GtU => on_stack!(ops::comparison::i32_gt_u),
            I32LeS => on_stack!(ops::comparison::i32_le_s),
            I32LeU => on_stack!(ops::comparison::i32_le_u),
            I32GeS => on_stack!(ops::comparison::i32_ge_s),
            I32GeU => on_stack!(ops::comparison::i32_ge_u),

            // i32 arithmetic
            I32Clz => on_stack!(ops::numeric::i32_clz),
            I32Ctz => on_stack!(ops::numeric::i32_ctz),
            I32Popcnt => on_stack!(ops::numeric::i32_popcnt),
            I32Add => on_stack!(ops::numeric::i32_add),
            I32Sub => on_stack!(ops::numeric::i32_sub),
            I32Mul => on_stack!(ops::numeric::i32_mul),
            I32DivS => on_stack!(ops::numeric::i32_div_s),
            I32DivU => on_stack!(ops::numeric::i32_div_u),
            I32RemS => on_stack!(ops::numeric::i32_rem_s),
            I32RemU => on_stack!(ops::numeric::i32_rem_u),
            I32And => on_stack!(ops::bitwise::i32_and),
            I32Or => on_stack!(ops::bitwise::i32_or),
            I32Xor => on_stack!(ops::bitwise::i32_xor),
            I32Shl => on_stack!(ops::bitwise::i32_shl),
            I32ShrS => on_stack!(ops::bitwise::i32_shr_s),
            I32ShrU => on_stack!(ops::bitwise::i32_shr_u),
            I32Rotl => on_stack!(ops::bitwise::i32_rotl),
            I32Rotr => on_stack!(ops::bitwise::i32_rotr),

            // i64 comparison
            I64Eqz => on_stack!(ops::comparison::i64_eqz),
            I64Eq => on_stack!(ops::comparison::i64_eq),
            I64Ne => on_stack!(ops::comparison::i64_ne),
            I64LtS => on_stack!(ops::comparison::i64_lt_s),
            I64LtU => on_stack!(ops::comparison::i64_lt_u),
            I64GtS => on_stack!(ops::comparison::i64_gt_s),
            I64GtU => on_stack!(ops::comparison::i64_gt_u),
            I64LeS => on_stack!(ops::comparison::i64_le_s),
            I64LeU => on_stack!(ops::comparison::i64_le_u),
            I64GeS => on_stack!(ops::comparison::i64_ge_s),
            I64GeU => on_stack!(ops::comparison::i64_ge_u),

            // i64 arithmetic
            I64Clz => on_stack!(ops::numeric::i64_clz),
            I64Ctz => on_stack!(ops::numeric::i64_ctz),
            I64Popcnt => on_stack!(ops::numeric::i64_popcnt),
            I64Add => on_stack!(ops::numeric::i64_add),
            I64Sub => on_stack!(ops::numeric::i64_sub),
            I64Mul => on_stack!(ops::numeric::i64_mul),
            I64DivS => on_stack!(ops::numeric::i64_div_s),
            I64DivU => on_stack!(ops::numeric::i64_div_u),
            I64RemS => on_stack!(ops::numeric::i64_rem_s),
            I64RemU => on_stack!(ops::numeric::i64_rem_u),
            I64And => on_stack!(ops::bitwise::i64_and),
            I64Or => on_stack!(ops::bitwise::i64_or),
            I64Xor => on_stack!(ops::bitwise::i64_xor),
            I64Shl => on_stack!(ops::bitwise::i64_shl),
            I64ShrS => on_stack!(ops::bitwise::i64_shr_s),
            I64ShrU => on_stack!(ops::bitwise::i64_shr_u),
            I64Rotl => on_stack!(ops::bitwise::i64_rotl),
            I64Rotr => on_stack!(ops::bitwise::i64_rotr),

            // f32
            F32Eq => on_stack!(ops::comparison::f32_eq),
            F32Ne => on_stack!(ops::comparison::f32_ne),
            F32Lt => on_stack!(ops::comparison::f32_lt),
            F32Gt => on_stack!(ops::comparison::f32_gt),
            F32Le => on_stack!(ops::comparison::f32_le),
            F32Ge => on_stack!(ops::comparison::f32_ge),
            F32Abs => on_stack!(ops::numeric::f32_abs),
            F32Neg => on_stack!(ops::numeric::f32_neg),
            F32Ceil => on_stack!(ops::numeric::f32_ceil),
            F32Floor => on_stack!(ops::numeric::f32_floor),
            F32Trunc => on_stack!(ops::numeric::f32_trunc),
            F32Nearest => on_stack!(ops::numeric::f32_nearest),
            F32Sqrt => on_stack!(ops::numeric::f32_sqrt),
            F32Add => on_stack!(ops::numeric::f32_add),
            F32Sub => on_stack!(ops::numeric::f32_sub),
            F32Mul => on_stack!(ops::numeric::f32_mul),
            F32Div => on_stack!(ops::numeric::f32_div),
            F32Min => on_stack!(ops::numeric::f32_min),
            F32Max => on_stack!(ops::numeric::f32_max),
            F32Copysign => on_stack!(ops::numeric::f32_copysign),

            // f64
            F64Eq => on_stack!(ops::comparison::f64_eq),
            F64Ne => on_stack!(ops::comparison::f64_ne),
            F64Lt => on_stack!(ops::comparison::f64_lt),
            F64Gt => on_stack!(ops::comparison::f64_gt),
            F64Le => on_stack!(ops::comparison::f64_le),
            F64Ge => on_stack!(ops::comparison::f64_ge),
            F64Abs => on_stack!(ops::numeric::f64_abs),
            F64Neg => on_stack!(ops::numeric::f64_neg),
            F64Ceil => on_stack!(ops::numeric::f64_ceil),
            F64Floor => on_stack!(ops::numeric::f64_floor),
            F64Trunc => on_stack!(ops::numeric::f64_trunc),
            F64Nearest => on_stack!(ops::numeric::f64_nearest),
            F64Sqrt => on_stack!(ops::numeric::f64_sqrt),
            F64Add => on_stack!(ops::numeric::f64_add),
            F64Sub => on_stack!(ops::numeric::f64_sub),
            F64Mul => on_stack!(ops::numeric::f64_mul),
            F64Div => on_stack!(ops::numeric::f64_div),
            F64Min => on_stack!(ops::numeric::f64_min),
            F64Max => on_stack!(ops::numeric::f64_max),
            F64Copysign => on_stack!(ops::numeric::f64_copysign),

            // ----------------------------------------------------------------
            // Conversions
            I32WrapI64 => on_stack!(ops::conversion::i32_wrap_i64),
            I32TruncF32S => on_stack!(ops::conversion::i32_trunc_f32_s),
            I32TruncF32U => on_stack!(ops::conversion::i32_trunc_f32_u),
            I32TruncF64S => on_stack!(ops::conversion::i32_trunc_f64_s),
            I32TruncF64U => on_stack!(ops::conversion::i32_trunc_f64_u),
            I64ExtendI32S => on_stack!(ops::conversion::i64_extend_i32_s),
            I64ExtendI32U => on_stack!(ops::conversion::i64_extend_i32_u),
            I64TruncF32S => on_stack!(ops::conversion::i64_trunc_f32_s),
            I64TruncF32U => on_stack!(ops::conversion::i64_trunc_f32_u),
            I64TruncF64S => on_stack!(ops::conversion::i64_trunc_f64_s),
            I64TruncF64U => on_stack!(ops::conversion::i64_trunc_f64_u),
            F32ConvertI32S => on_stack!(ops::conversion::f32_convert_i32_s),
            F32ConvertI32U => on_stack!(ops::conversion::f32_convert_i32_u),
            F32ConvertI64S => on_stack!(ops::conversion::f32_convert_i64_s),
            F32ConvertI64U => on_stack!(ops::conversion::f32_convert_i64_u),
            F32DemoteF64 => on_stack!(ops::conversion::f32_demote_f64),
            F64ConvertI32S => on_stack!(ops::conversion::f64_convert_i32_s),
            F64ConvertI32U => on_stack!(ops::conversion::f64_convert_i32_u),
            F64ConvertI64S => on_stack!(ops::conversion::f64_convert_i64_s),
            F64ConvertI64U => on_stack!(ops::conversion::f64_convert_i64_u),
            F64PromoteF32 => on_stack!(ops::conversion::f64_promote_f32),
            I32ReinterpretF32 => on_stack!(ops::conversion::i32_reinterpret_f32),
            I64ReinterpretF64 => on_stack!(ops::conversion::i64_reinterpret_f64),
            F32ReinterpretI32 => on_stack!(ops::conversion::f32_reinterpret_i32),
            F64ReinterpretI64 => on_stack!(ops::conversion::f64_reinterpret_i64),

            // Sign extension
            I32Extend8S => on_stack!(ops::bitwise::i32_extend8_s),
            I32Extend16S => on_stack!(ops::bitwise::i32_extend16_s),
            I64Extend8S => on_stack!(ops::bitwise::i64_extend8_s),
            I64Extend16S => on_stack!(ops::bitwise::i64_extend16_s),
            I64Extend32S => on_stack!(ops::bitwise::i64_extend32_s),

            // Saturating truncation
            I32TruncSatF32S => on_stack!(ops::conversion::i32_trunc_sat_f32_s),
            I32TruncSatF32U => on_stack!(ops::conversion::i32_trunc_sat_f32_u),
            I32TruncSatF64S => on_stack!(ops::conversion::i32_trunc_sat_f64_s),
            I32TruncSatF64U => on_stack!(ops::conversion::i32_trunc_sat_f64_u),
            I64TruncSatF32S => on_stack!(ops::conversion::i64_trunc_sat_f32_s),
            I64TruncSatF32U => on_stack!(ops::conversion::i64_trunc_sat_f32_u),
            I64TruncSatF64S => on_stack!(ops::conversion::i64_trunc_sat_f64_s),
            I64TruncSatF64U => on_stack!(ops::conversion::i64_trunc_sat_f64_u),
        }
    }
}

/// Parameter and result counts of a block type
fn block_arity(module: &Module, block_type: &BlockType) -> (usize, usize) {
    match block_type {
        BlockType::Empty => (0, 0),
        BlockType::Value(_) => (0, 1),
        BlockType::FuncType(type_idx) => module
            .types
            .get(*type_idx as usize)
            .map_or((0, 0), |t| (t.parameters.len(), t.return_types.len())),
    }
}

// Validated code only names memory 0 and in-range tables and globals, so
// a failed lookup means the store and instance disagree.

fn memory<'s>(store: &'s Store, instance: &Instance) -> Result<&'s SharedMemory, RuntimeError> {
    let addr = instance.memory_addr(0);
    store.memory(addr).ok_or(RuntimeError::UnknownAddress {
        kind: "memory",
        addr: addr.0,
    })
}

fn table<'s>(store: &'s Store, instance: &Instance, table_idx: u32) -> Result<&'s SharedTable, RuntimeError> {
    let addr = instance.table_addr(table_idx);
    store.table(addr).ok_or(RuntimeError::UnknownAddress {
        kind: "table",
        addr: addr.0,
    })
}

fn global<'s>(store: &'s Store, instance: &Instance, global_idx: u32) -> Result<&'s SharedGlobal, RuntimeError> {
    let addr = instance.global_addr(global_idx);
    store.global(addr).ok_or(RuntimeError::UnknownAddress {
        kind: "global",
        addr: addr.0,
    })
}
