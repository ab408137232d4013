//! WebAssembly instruction representation
//!
//! Instructions are decoded from function bodies during validation, not
//! during the section scan. The operand-free instructions and the memory
//! access instructions are described once in opcode tables below; the
//! decoder, the encoder and the mnemonic lookup are all generated from
//! those tables so the three can never disagree.

pub mod decode;
pub mod encode;

use super::module::{RefType, ValueType};
use fhex::ToHex;
use std::fmt;

/// Memory argument for memory access instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    /// Alignment hint, as a power of 2
    pub align: u32,
    /// Static offset added to the dynamic address
    pub offset: u32,
}

/// Block type for structured control instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValueType),
    /// Index into the type section, for blocks with parameters or several results
    FuncType(u32),
}

/// All supported instructions. SIMD, atomics and other post-2.0
/// proposals are not represented.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    // Control instructions
    Unreachable,
    Nop,
    Block { block_type: BlockType },
    Loop { block_type: BlockType },
    If { block_type: BlockType },
    Else,
    End,
    Br { label_idx: u32 },
    BrIf { label_idx: u32 },
    BrTable { labels: Vec<u32>, default: u32 },
    Return,
    Call { func_idx: u32 },
    CallIndirect { type_idx: u32, table_idx: u32 },

    // Reference instructions
    RefNull { ref_type: RefType },
    RefIsNull,
    RefFunc { func_idx: u32 },

    // Parametric instructions
    Drop,
    Select,
    SelectTyped { val_types: Vec<ValueType> },

    // Variable instructions
    LocalGet { local_idx: u32 },
    LocalSet { local_idx: u32 },
    LocalTee { local_idx: u32 },
    GlobalGet { global_idx: u32 },
    GlobalSet { global_idx: u32 },

    // Table instructions
    TableGet { table_idx: u32 },
    TableSet { table_idx: u32 },
    TableInit { elem_idx: u32, table_idx: u32 },
    ElemDrop { elem_idx: u32 },
    TableCopy { dst_table: u32, src_table: u32 },
    TableGrow { table_idx: u32 },
    TableSize { table_idx: u32 },
    TableFill { table_idx: u32 },

    // Memory instructions
    I32Load { memarg: MemArg },
    I64Load { memarg: MemArg },
    F32Load { memarg: MemArg },
    F64Load { memarg: MemArg },
    I32Load8S { memarg: MemArg },
    I32Load8U { memarg: MemArg },
    I32Load16S { memarg: MemArg },
    I32Load16U { memarg: MemArg },
    I64Load8S { memarg: MemArg },
    I64Load8U { memarg: MemArg },
    I64Load16S { memarg: MemArg },
    I64Load16U { memarg: MemArg },
    I64Load32S { memarg: MemArg },
    I64Load32U { memarg: MemArg },
    I32Store { memarg: MemArg },
    I64Store { memarg: MemArg },
    F32Store { memarg: MemArg },
    F64Store { memarg: MemArg },
    I32Store8 { memarg: MemArg },
    I32Store16 { memarg: MemArg },
    I64Store8 { memarg: MemArg },
    I64Store16 { memarg: MemArg },
    I64Store32 { memarg: MemArg },
    MemorySize,
    MemoryGrow,
    MemoryInit { data_idx: u32 },
    DataDrop { data_idx: u32 },
    MemoryCopy,
    MemoryFill,

    // Numeric instructions - Constants
    I32Const { value: i32 },
    I64Const { value: i64 },
    F32Const { value: f32 },
    F64Const { value: f64 },

    // Numeric instructions - i32 operations
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,

    // Numeric instructions - i64 operations
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    // Numeric instructions - f32 operations
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,

    // Numeric instructions - f64 operations
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    // Numeric instructions - Conversions
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,

    // Sign extension operations
    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,

    // Saturating truncation operations (0xFC prefix)
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
}

/// Generates the lookups for instructions that are fully described by
/// their opcode: single-byte plain instructions, `0xFC`-prefixed plain
/// instructions, and memory access instructions (opcode + memarg, with
/// the natural alignment of the access as a power of two).
macro_rules! opcode_tables {
    (
        plain { $( $op:literal => $plain:ident $pname:literal, )* }
        prefixed { $( $sub:literal => $prefixed:ident $xname:literal, )* }
        memory { $( $mop:literal => $mem:ident $mname:literal $width:literal, )* }
    ) => {
        impl InstructionKind {
            pub fn from_plain_opcode(opcode: u8) -> Option<InstructionKind> {
                match opcode {
                    $( $op => Some(InstructionKind::$plain), )*
                    _ => None,
                }
            }

            pub fn plain_opcode(&self) -> Option<u8> {
                match self {
                    $( InstructionKind::$plain => Some($op), )*
                    _ => None,
                }
            }

            pub fn from_prefixed_opcode(subopcode: u32) -> Option<InstructionKind> {
                match subopcode {
                    $( $sub => Some(InstructionKind::$prefixed), )*
                    _ => None,
                }
            }

            pub fn prefixed_opcode(&self) -> Option<u32> {
                match self {
                    $( InstructionKind::$prefixed => Some($sub), )*
                    _ => None,
                }
            }

            pub fn from_memory_opcode(opcode: u8, memarg: MemArg) -> Option<InstructionKind> {
                match opcode {
                    $( $mop => Some(InstructionKind::$mem { memarg }), )*
                    _ => None,
                }
            }

            /// Opcode and memarg of a load or store.
            pub fn memory_access(&self) -> Option<(u8, MemArg)> {
                match self {
                    $( InstructionKind::$mem { memarg } => Some(($mop, *memarg)), )*
                    _ => None,
                }
            }

            /// log2 of the byte width of a load or store.
            pub fn natural_alignment(&self) -> Option<u32> {
                match self {
                    $( InstructionKind::$mem { .. } => Some($width), )*
                    _ => None,
                }
            }

            fn table_mnemonic(&self) -> Option<&'static str> {
                match self {
                    $( InstructionKind::$plain => Some($pname), )*
                    $( InstructionKind::$prefixed => Some($xname), )*
                    $( InstructionKind::$mem { .. } => Some($mname), )*
                    _ => None,
                }
            }
        }
    };
}

opcode_tables! {
    plain {
        0x00 => Unreachable "unreachable",
        0x01 => Nop "nop",
        0x05 => Else "else",
        0x0B => End "end",
        0x0F => Return "return",
        0x1A => Drop "drop",
        0x1B => Select "select",
        0xD1 => RefIsNull "ref.is_null",

        0x45 => I32Eqz "i32.eqz",
        0x46 => I32Eq "i32.eq",
        0x47 => I32Ne "i32.ne",
        0x48 => I32LtS "i32.lt_s",
        0x49 => I32LtU "i32.lt_u",
        0x4A => I32GtS "i32.gt_s",
        0x4B => I32GtU "i32.gt_u",
        0x4C => I32LeS "i32.le_s",
        0x4D => I32LeU "i32.le_u",
        0x4E => I32GeS "i32.ge_s",
        0x4F => I32GeU "i32.ge_u",

        0x50 => I64Eqz "i64.eqz",
        0x51 => I64Eq "i64.eq",
        0x52 => I64Ne "i64.ne",
        0x53 => I64LtS "i64.lt_s",
        0x54 => I64LtU "i64.lt_u",
        0x55 => I64GtS "i64.gt_s",
        0x56 => I64GtU "i64.gt_u",
        0x57 => I64LeS "i64.le_s",
        0x58 => I64LeU "i64.le_u",
        0x59 => I64GeS "i64.ge_s",
        0x5A => I64GeU "i64.ge_u",

        0x5B => F32Eq "f32.eq",
        0x5C => F32Ne "f32.ne",
        0x5D => F32Lt "f32.lt",
        0x5E => F32Gt "f32.gt",
        0x5F => F32Le "f32.le",
        0x60 => F32Ge "f32.ge",

        0x61 => F64Eq "f64.eq",
        0x62 => F64Ne "f64.ne",
        0x63 => F64Lt "f64.lt",
        0x64 => F64Gt "f64.gt",
        0x65 => F64Le "f64.le",
        0x66 => F64Ge "f64.ge",

        0x67 => I32Clz "i32.clz",
        0x68 => I32Ctz "i32.ctz",
        0x69 => I32Popcnt "i32.popcnt",
        0x6A => I32Add "i32.add",
        0x6B => I32Sub "i32.sub",
        0x6C => I32Mul "i32.mul",
        0x6D => I32DivS "i32.div_s",
        0x6E => I32DivU "i32.div_u",
        0x6F => I32RemS "i32.rem_s",
        0x70 => I32RemU "i32.rem_u",
        0x71 => I32And "i32.and",
        0x72 => I32Or "i32.or",
        0x73 => I32Xor "i32.xor",
        0x74 => I32Shl "i32.shl",
        0x75 => I32ShrS "i32.shr_s",
        0x76 => I32ShrU "i32.shr_u",
        0x77 => I32Rotl "i32.rotl",
        0x78 => I32Rotr "i32.rotr",

        0x79 => I64Clz "i64.clz",
        0x7A => I64Ctz "i64.ctz",
        0x7B => I64Popcnt "i64.popcnt",
        0x7C => I64Add "i64.add",
        0x7D => I64Sub "i64.sub",
        0x7E => I64Mul "i64.mul",
        0x7F => I64DivS "i64.div_s",
        0x80 => I64DivU "i64.div_u",
        0x81 => I64RemS "i64.rem_s",
        0x82 => I64RemU "i64.rem_u",
        0x83 => I64And "i64.and",
        0x84 => I64Or "i64.or",
        0x85 => I64Xor "i64.xor",
        0x86 => I64Shl "i64.shl",
        0x87 => I64ShrS "i64.shr_s",
        0x88 => I64ShrU "i64.shr_u",
        0x89 => I64Rotl "i64.rotl",
        0x8A => I64Rotr "i64.rotr",

        0x8B => F32Abs "f32.abs",
        0x8C => F32Neg "f32.neg",
        0x8D => F32Ceil "f32.ceil",
        0x8E => F32Floor "f32.floor",
        0x8F => F32Trunc "f32.trunc",
        0x90 => F32Nearest "f32.nearest",
        0x91 => F32Sqrt "f32.sqrt",
        0x92 => F32Add "f32.add",
        0x93 => F32Sub "f32.sub",
        0x94 => F32Mul "f32.mul",
        0x95 => F32Div "f32.div",
        0x96 => F32Min "f32.min",
        0x97 => F32Max "f32.max",
        0x98 => F32Copysign "f32.copysign",

        0x99 => F64Abs "f64.abs",
        0x9A => F64Neg "f64.neg",
        0x9B => F64Ceil "f64.ceil",
        0x9C => F64Floor "f64.floor",
        0x9D => F64Trunc "f64.trunc",
        0x9E => F64Nearest "f64.nearest",
        0x9F => F64Sqrt "f64.sqrt",
        0xA0 => F64Add "f64.add",
        0xA1 => F64Sub "f64.sub",
        0xA2 => F64Mul "f64.mul",
        0xA3 => F64Div "f64.div",
        0xA4 => F64Min "f64.min",
        0xA5 => F64Max "f64.max",
        0xA6 => F64Copysign "f64.copysign",

        0xA7 => I32WrapI64 "i32.wrap_i64",
        0xA8 => I32TruncF32S "i32.trunc_f32_s",
        0xA9 => I32TruncF32U "i32.trunc_f32_u",
        0xAA => I32TruncF64S "i32.trunc_f64_s",
        0xAB => I32TruncF64U "i32.trunc_f64_u",
        0xAC => I64ExtendI32S "i64.extend_i32_s",
        0xAD => I64ExtendI32U "i64.extend_i32_u",
        0xAE => I64TruncF32S "i64.trunc_f32_s",
        0xAF => I64TruncF32U "i64.trunc_f32_u",
        0xB0 => I64TruncF64S "i64.trunc_f64_s",
        0xB1 => I64TruncF64U "i64.trunc_f64_u",
        0xB2 => F32ConvertI32S "f32.convert_i32_s",
        0xB3 => F32ConvertI32U "f32.convert_i32_u",
        0xB4 => F32ConvertI64S "f32.convert_i64_s",
        0xB5 => F32ConvertI64U "f32.convert_i64_u",
        0xB6 => F32DemoteF64 "f32.demote_f64",
        0xB7 => F64ConvertI32S "f64.convert_i32_s",
        0xB8 => F64ConvertI32U "f64.convert_i32_u",
        0xB9 => F64ConvertI64S "f64.convert_i64_s",
        0xBA => F64ConvertI64U "f64.convert_i64_u",
        0xBB => F64PromoteF32 "f64.promote_f32",
        0xBC => I32ReinterpretF32 "i32.reinterpret_f32",
        0xBD => I64ReinterpretF64 "i64.reinterpret_f64",
        0xBE => F32ReinterpretI32 "f32.reinterpret_i32",
        0xBF => F64ReinterpretI64 "f64.reinterpret_i64",

        0xC0 => I32Extend8S "i32.extend8_s",
        0xC1 => I32Extend16S "i32.extend16_s",
        0xC2 => I64Extend8S "i64.extend8_s",
        0xC3 => I64Extend16S "i64.extend16_s",
        0xC4 => I64Extend32S "i64.extend32_s",
    }
    prefixed {
        0x00 => I32TruncSatF32S "i32.trunc_sat_f32_s",
        0x01 => I32TruncSatF32U "i32.trunc_sat_f32_u",
        0x02 => I32TruncSatF64S "i32.trunc_sat_f64_s",
        0x03 => I32TruncSatF64U "i32.trunc_sat_f64_u",
        0x04 => I64TruncSatF32S "i64.trunc_sat_f32_s",
        0x05 => I64TruncSatF32U "i64.trunc_sat_f32_u",
        0x06 => I64TruncSatF64S "i64.trunc_sat_f64_s",
        0x07 => I64TruncSatF64U "i64.trunc_sat_f64_u",
    }
    memory {
        0x28 => I32Load "i32.load" 2,
        0x29 => I64Load "i64.load" 3,
        0x2A => F32Load "f32.load" 2,
        0x2B => F64Load "f64.load" 3,
        0x2C => I32Load8S "i32.load8_s" 0,
        0x2D => I32Load8U "i32.load8_u" 0,
        0x2E => I32Load16S "i32.load16_s" 1,
        0x2F => I32Load16U "i32.load16_u" 1,
        0x30 => I64Load8S "i64.load8_s" 0,
        0x31 => I64Load8U "i64.load8_u" 0,
        0x32 => I64Load16S "i64.load16_s" 1,
        0x33 => I64Load16U "i64.load16_u" 1,
        0x34 => I64Load32S "i64.load32_s" 2,
        0x35 => I64Load32U "i64.load32_u" 2,
        0x36 => I32Store "i32.store" 2,
        0x37 => I64Store "i64.store" 3,
        0x38 => F32Store "f32.store" 2,
        0x39 => F64Store "f64.store" 3,
        0x3A => I32Store8 "i32.store8" 0,
        0x3B => I32Store16 "i32.store16" 1,
        0x3C => I64Store8 "i64.store8" 0,
        0x3D => I64Store16 "i64.store16" 1,
        0x3E => I64Store32 "i64.store32" 2,
    }
}

impl InstructionKind {
    /// Text-format mnemonic, e.g. `i32.add`
    pub fn mnemonic(&self) -> &'static str {
        use InstructionKind::*;

        if let Some(name) = self.table_mnemonic() {
            return name;
        }
        match self {
            Block { .. } => "block",
            Loop { .. } => "loop",
            If { .. } => "if",
            Br { .. } => "br",
            BrIf { .. } => "br_if",
            BrTable { .. } => "br_table",
            Call { .. } => "call",
            CallIndirect { .. } => "call_indirect",
            RefNull { .. } => "ref.null",
            RefFunc { .. } => "ref.func",
            SelectTyped { .. } => "select",
            LocalGet { .. } => "local.get",
            LocalSet { .. } => "local.set",
            LocalTee { .. } => "local.tee",
            GlobalGet { .. } => "global.get",
            GlobalSet { .. } => "global.set",
            TableGet { .. } => "table.get",
            TableSet { .. } => "table.set",
            TableInit { .. } => "table.init",
            ElemDrop { .. } => "elem.drop",
            TableCopy { .. } => "table.copy",
            TableGrow { .. } => "table.grow",
            TableSize { .. } => "table.size",
            TableFill { .. } => "table.fill",
            MemorySize => "memory.size",
            MemoryGrow => "memory.grow",
            MemoryInit { .. } => "memory.init",
            DataDrop { .. } => "data.drop",
            MemoryCopy => "memory.copy",
            MemoryFill => "memory.fill",
            I32Const { .. } => "i32.const",
            I64Const { .. } => "i64.const",
            F32Const { .. } => "f32.const",
            F64Const { .. } => "f64.const",
            _ => "<unknown>",
        }
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use InstructionKind::*;

        write!(f, "{}", self.mnemonic())?;

        if let Some((_, memarg)) = self.memory_access() {
            return write!(f, " align={} offset={}", memarg.align, memarg.offset);
        }

        match self {
            Block { block_type } | Loop { block_type } | If { block_type } => {
                write!(f, "{block_type}")
            }
            Br { label_idx } | BrIf { label_idx } => write!(f, " {label_idx}"),
            BrTable { labels, default } => {
                for label in labels {
                    write!(f, " {label}")?;
                }
                write!(f, " {default}")
            }
            Call { func_idx } | RefFunc { func_idx } => write!(f, " {func_idx}"),
            CallIndirect { type_idx, table_idx } => write!(f, " {table_idx} (type {type_idx})"),
            RefNull { ref_type } => write!(f, " {ref_type}"),
            SelectTyped { val_types } => {
                for vt in val_types {
                    write!(f, " {vt}")?;
                }
                Ok(())
            }
            LocalGet { local_idx } | LocalSet { local_idx } | LocalTee { local_idx } => {
                write!(f, " {local_idx}")
            }
            GlobalGet { global_idx } | GlobalSet { global_idx } => write!(f, " {global_idx}"),
            TableGet { table_idx }
            | TableSet { table_idx }
            | TableGrow { table_idx }
            | TableSize { table_idx }
            | TableFill { table_idx } => write!(f, " {table_idx}"),
            TableInit { elem_idx, table_idx } => write!(f, " {table_idx} {elem_idx}"),
            ElemDrop { elem_idx } => write!(f, " {elem_idx}"),
            TableCopy { dst_table, src_table } => write!(f, " {dst_table} {src_table}"),
            MemoryInit { data_idx } | DataDrop { data_idx } => write!(f, " {data_idx}"),
            I32Const { value } => write!(f, " {value}"),
            I64Const { value } => write!(f, " {value}"),
            F32Const { value } => write!(f, " {}", value.to_hex()),
            F64Const { value } => write!(f, " {}", value.to_hex()),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Empty => Ok(()),
            BlockType::Value(vt) => write!(f, " (result {vt})"),
            BlockType::FuncType(idx) => write!(f, " (type {idx})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(InstructionKind::I32Add, "i32.add")]
    #[case(InstructionKind::I64TruncSatF64U, "i64.trunc_sat_f64_u")]
    #[case(InstructionKind::Br { label_idx: 2 }, "br 2")]
    #[case(InstructionKind::BrTable { labels: vec![0, 1], default: 3 }, "br_table 0 1 3")]
    #[case(InstructionKind::I32Load { memarg: MemArg { align: 2, offset: 16 } }, "i32.load align=2 offset=16")]
    #[case(InstructionKind::Block { block_type: BlockType::Value(ValueType::I64) }, "block (result i64)")]
    #[case(InstructionKind::RefNull { ref_type: RefType::ExternRef }, "ref.null externref")]
    #[case(InstructionKind::I32Const { value: -7 }, "i32.const -7")]
    fn test_display(#[case] kind: InstructionKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
    }

    #[test]
    fn test_opcode_tables_are_consistent() {
        for opcode in 0..=u8::MAX {
            if let Some(kind) = InstructionKind::from_plain_opcode(opcode) {
                assert_eq!(kind.plain_opcode(), Some(opcode), "{kind}");
                assert_ne!(kind.mnemonic(), "<unknown>");
            }
        }
        for sub in 0..8 {
            let kind = InstructionKind::from_prefixed_opcode(sub).expect("saturating truncation");
            assert_eq!(kind.prefixed_opcode(), Some(sub));
        }
        assert_eq!(InstructionKind::from_prefixed_opcode(8), None);
    }

    #[test]
    fn test_natural_alignment() {
        let memarg = MemArg { align: 0, offset: 0 };
        let load = InstructionKind::from_memory_opcode(0x29, memarg).expect("i64.load");
        assert_eq!(load, InstructionKind::I64Load { memarg });
        assert_eq!(load.natural_alignment(), Some(3));
        assert_eq!(InstructionKind::I32Store8 { memarg }.natural_alignment(), Some(0));
        assert_eq!(InstructionKind::I32Add.natural_alignment(), None);
    }
}
