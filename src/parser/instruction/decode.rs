//! Instruction decoding from binary format

use super::super::limits;
use super::{BlockType, InstructionKind, MemArg};
use crate::parser::encoding;
use crate::parser::error::DecodeError;
use crate::parser::module::{RefType, ValueType};
use crate::parser::reader::Reader;

impl MemArg {
    /// Decode a memory argument from the reader
    pub fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let align = reader.read_vu32()?;
        let offset = reader.read_vu32()?;
        Ok(MemArg { align, offset })
    }
}

impl BlockType {
    /// Decode a block type: `0x40`, a single value type, or a
    /// non-negative s33 type index.
    pub fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let offset = reader.offset();
        let b = reader
            .peek_byte()
            .ok_or(DecodeError::UnexpectedEof { offset })?;

        if b == encoding::BLOCK_TYPE_EMPTY {
            reader.read_byte()?;
            return Ok(BlockType::Empty);
        }
        if let Some(vt) = ValueType::decode(b) {
            reader.read_byte()?;
            return Ok(BlockType::Value(vt));
        }

        let type_idx = reader.read_vs33()?;
        if type_idx < 0 {
            return Err(DecodeError::malformed(offset, "invalid block type"));
        }
        Ok(BlockType::FuncType(type_idx as u32))
    }
}

pub(crate) fn decode_value_type(reader: &mut Reader) -> Result<ValueType, DecodeError> {
    let offset = reader.offset();
    let byte = reader.read_byte()?;
    ValueType::decode(byte)
        .ok_or_else(|| DecodeError::malformed(offset, format!("invalid value type {byte:#x}")))
}

pub(crate) fn decode_ref_type(reader: &mut Reader) -> Result<RefType, DecodeError> {
    let offset = reader.offset();
    let byte = reader.read_byte()?;
    RefType::decode(byte)
        .ok_or_else(|| DecodeError::malformed(offset, format!("malformed reference type {byte:#x}")))
}

fn expect_zero_byte(reader: &mut Reader) -> Result<(), DecodeError> {
    let offset = reader.offset();
    match reader.read_byte()? {
        0x00 => Ok(()),
        _ => Err(DecodeError::malformed(offset, "zero byte expected")),
    }
}

impl InstructionKind {
    /// Decode one instruction, opcode and immediates.
    pub fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let offset = reader.offset();
        let opcode = reader.read_byte()?;

        if let Some(kind) = InstructionKind::from_plain_opcode(opcode) {
            return Ok(kind);
        }
        if (0x28..=0x3E).contains(&opcode) {
            let memarg = MemArg::decode(reader)?;
            return InstructionKind::from_memory_opcode(opcode, memarg).ok_or(
                DecodeError::UnknownOpcode {
                    offset,
                    opcode: opcode as u32,
                },
            );
        }

        use InstructionKind::*;
        match opcode {
            // Control instructions
            0x02 => Ok(Block {
                block_type: BlockType::decode(reader)?,
            }),
            0x03 => Ok(Loop {
                block_type: BlockType::decode(reader)?,
            }),
            0x04 => Ok(If {
                block_type: BlockType::decode(reader)?,
            }),
            0x0C => Ok(Br {
                label_idx: reader.read_vu32()?,
            }),
            0x0D => Ok(BrIf {
                label_idx: reader.read_vu32()?,
            }),
            0x0E => {
                let count = reader.read_count(limits::MAX_BR_TABLE_LABELS, "br_table labels")?;
                let labels = (0..count)
                    .map(|_| reader.read_vu32())
                    .collect::<Result<Vec<_>, _>>()?;
                let default = reader.read_vu32()?;
                Ok(BrTable { labels, default })
            }
            0x10 => Ok(Call {
                func_idx: reader.read_vu32()?,
            }),
            0x11 => Ok(CallIndirect {
                type_idx: reader.read_vu32()?,
                table_idx: reader.read_vu32()?,
            }),

            // Reference instructions
            0xD0 => Ok(RefNull {
                ref_type: decode_ref_type(reader)?,
            }),
            0xD2 => Ok(RefFunc {
                func_idx: reader.read_vu32()?,
            }),

            // Parametric instructions
            0x1C => {
                let count =
                    reader.read_count(limits::MAX_SELECT_TYPED_VALUES, "select value types")?;
                let val_types = (0..count)
                    .map(|_| decode_value_type(reader))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SelectTyped { val_types })
            }

            // Variable instructions
            0x20 => Ok(LocalGet {
                local_idx: reader.read_vu32()?,
            }),
            0x21 => Ok(LocalSet {
                local_idx: reader.read_vu32()?,
            }),
            0x22 => Ok(LocalTee {
                local_idx: reader.read_vu32()?,
            }),
            0x23 => Ok(GlobalGet {
                global_idx: reader.read_vu32()?,
            }),
            0x24 => Ok(GlobalSet {
                global_idx: reader.read_vu32()?,
            }),

            // Table instructions
            0x25 => Ok(TableGet {
                table_idx: reader.read_vu32()?,
            }),
            0x26 => Ok(TableSet {
                table_idx: reader.read_vu32()?,
            }),

            // Memory size/grow carry a reserved memory index byte
            0x3F => {
                expect_zero_byte(reader)?;
                Ok(MemorySize)
            }
            0x40 => {
                expect_zero_byte(reader)?;
                Ok(MemoryGrow)
            }

            // Constants
            0x41 => Ok(I32Const {
                value: reader.read_vs32()?,
            }),
            0x42 => Ok(I64Const {
                value: reader.read_vs64()?,
            }),
            0x43 => Ok(F32Const {
                value: reader.read_f32()?,
            }),
            0x44 => Ok(F64Const {
                value: reader.read_f64()?,
            }),

            0xFC => {
                let subopcode = reader.read_vu32()?;
                decode_0xfc(subopcode, offset, reader)
            }

            _ => Err(DecodeError::UnknownOpcode {
                offset,
                opcode: opcode as u32,
            }),
        }
    }
}

/// Decode 0xFC prefix instructions
fn decode_0xfc(
    subopcode: u32,
    offset: usize,
    reader: &mut Reader,
) -> Result<InstructionKind, DecodeError> {
    use InstructionKind::*;

    if let Some(kind) = InstructionKind::from_prefixed_opcode(subopcode) {
        return Ok(kind);
    }

    match subopcode {
        0x08 => {
            let data_idx = reader.read_vu32()?;
            expect_zero_byte(reader)?;
            Ok(MemoryInit { data_idx })
        }
        0x09 => Ok(DataDrop {
            data_idx: reader.read_vu32()?,
        }),
        0x0A => {
            expect_zero_byte(reader)?;
            expect_zero_byte(reader)?;
            Ok(MemoryCopy)
        }
        0x0B => {
            expect_zero_byte(reader)?;
            Ok(MemoryFill)
        }
        0x0C => Ok(TableInit {
            elem_idx: reader.read_vu32()?,
            table_idx: reader.read_vu32()?,
        }),
        0x0D => Ok(ElemDrop {
            elem_idx: reader.read_vu32()?,
        }),
        0x0E => Ok(TableCopy {
            dst_table: reader.read_vu32()?,
            src_table: reader.read_vu32()?,
        }),
        0x0F => Ok(TableGrow {
            table_idx: reader.read_vu32()?,
        }),
        0x10 => Ok(TableSize {
            table_idx: reader.read_vu32()?,
        }),
        0x11 => Ok(TableFill {
            table_idx: reader.read_vu32()?,
        }),
        _ => Err(DecodeError::UnknownOpcode {
            offset,
            opcode: 0xFC00 | subopcode,
        }),
    }
}
