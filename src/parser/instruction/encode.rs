//! Instruction encoding to binary format

use super::{BlockType, InstructionKind};
use crate::parser::encoding;
use crate::parser::module::ValueType;

impl InstructionKind {
    /// Get the primary opcode for this instruction; `0xFC` for prefixed ones.
    pub fn opcode(&self) -> u8 {
        use InstructionKind::*;

        if let Some(opcode) = self.plain_opcode() {
            return opcode;
        }
        if let Some((opcode, _)) = self.memory_access() {
            return opcode;
        }
        match self {
            Block { .. } => 0x02,
            Loop { .. } => 0x03,
            If { .. } => 0x04,
            Br { .. } => 0x0C,
            BrIf { .. } => 0x0D,
            BrTable { .. } => 0x0E,
            Call { .. } => 0x10,
            CallIndirect { .. } => 0x11,
            RefNull { .. } => 0xD0,
            RefFunc { .. } => 0xD2,
            SelectTyped { .. } => 0x1C,
            LocalGet { .. } => 0x20,
            LocalSet { .. } => 0x21,
            LocalTee { .. } => 0x22,
            GlobalGet { .. } => 0x23,
            GlobalSet { .. } => 0x24,
            TableGet { .. } => 0x25,
            TableSet { .. } => 0x26,
            MemorySize => 0x3F,
            MemoryGrow => 0x40,
            I32Const { .. } => 0x41,
            I64Const { .. } => 0x42,
            F32Const { .. } => 0x43,
            F64Const { .. } => 0x44,
            _ => 0xFC,
        }
    }

    /// Sub-opcode for `0xFC`-prefixed instructions
    pub fn subopcode_0xfc(&self) -> Option<u32> {
        use InstructionKind::*;

        if let Some(sub) = self.prefixed_opcode() {
            return Some(sub);
        }
        match self {
            MemoryInit { .. } => Some(0x08),
            DataDrop { .. } => Some(0x09),
            MemoryCopy => Some(0x0A),
            MemoryFill => Some(0x0B),
            TableInit { .. } => Some(0x0C),
            ElemDrop { .. } => Some(0x0D),
            TableCopy { .. } => Some(0x0E),
            TableGrow { .. } => Some(0x0F),
            TableSize { .. } => Some(0x10),
            TableFill { .. } => Some(0x11),
            _ => None,
        }
    }

    /// Encode this instruction, opcode and immediates.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.encode_into(&mut bytes);
        bytes
    }

    pub fn encode_into(&self, bytes: &mut Vec<u8>) {
        use InstructionKind::*;

        bytes.push(self.opcode());
        if let Some(sub) = self.subopcode_0xfc() {
            encoding::write_vu32(bytes, sub);
        }

        if let Some((_, memarg)) = self.memory_access() {
            encoding::write_vu32(bytes, memarg.align);
            encoding::write_vu32(bytes, memarg.offset);
            return;
        }

        match self {
            Block { block_type } | Loop { block_type } | If { block_type } => {
                encode_block_type(bytes, block_type);
            }
            Br { label_idx } | BrIf { label_idx } => encoding::write_vu32(bytes, *label_idx),
            BrTable { labels, default } => {
                encoding::write_vu32(bytes, labels.len() as u32);
                for label in labels {
                    encoding::write_vu32(bytes, *label);
                }
                encoding::write_vu32(bytes, *default);
            }
            Call { func_idx } | RefFunc { func_idx } => encoding::write_vu32(bytes, *func_idx),
            CallIndirect {
                type_idx,
                table_idx,
            } => {
                encoding::write_vu32(bytes, *type_idx);
                encoding::write_vu32(bytes, *table_idx);
            }
            RefNull { ref_type } => bytes.push(ValueType::from(*ref_type).byte()),
            SelectTyped { val_types } => {
                encoding::write_vu32(bytes, val_types.len() as u32);
                bytes.extend(val_types.iter().map(|vt| vt.byte()));
            }
            LocalGet { local_idx } | LocalSet { local_idx } | LocalTee { local_idx } => {
                encoding::write_vu32(bytes, *local_idx)
            }
            GlobalGet { global_idx } | GlobalSet { global_idx } => {
                encoding::write_vu32(bytes, *global_idx)
            }
            TableGet { table_idx }
            | TableSet { table_idx }
            | TableGrow { table_idx }
            | TableSize { table_idx }
            | TableFill { table_idx } => encoding::write_vu32(bytes, *table_idx),
            TableInit {
                elem_idx,
                table_idx,
            } => {
                encoding::write_vu32(bytes, *elem_idx);
                encoding::write_vu32(bytes, *table_idx);
            }
            ElemDrop { elem_idx } => encoding::write_vu32(bytes, *elem_idx),
            TableCopy {
                dst_table,
                src_table,
            } => {
                encoding::write_vu32(bytes, *dst_table);
                encoding::write_vu32(bytes, *src_table);
            }

            // reserved memory index bytes
            MemorySize | MemoryGrow | MemoryFill => bytes.push(0x00),
            MemoryCopy => bytes.extend([0x00, 0x00]),
            MemoryInit { data_idx } => {
                encoding::write_vu32(bytes, *data_idx);
                bytes.push(0x00);
            }
            DataDrop { data_idx } => encoding::write_vu32(bytes, *data_idx),

            I32Const { value } => encoding::write_vs32(bytes, *value),
            I64Const { value } => encoding::write_vs64(bytes, *value),
            F32Const { value } => encoding::write_f32(bytes, *value),
            F64Const { value } => encoding::write_f64(bytes, *value),

            // All other instructions have no additional operands
            _ => {}
        }
    }
}

fn encode_block_type(bytes: &mut Vec<u8>, block_type: &BlockType) {
    match block_type {
        BlockType::Empty => bytes.push(encoding::BLOCK_TYPE_EMPTY),
        BlockType::Value(vt) => bytes.push(vt.byte()),
        BlockType::FuncType(idx) => encoding::write_vs64(bytes, *idx as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::super::MemArg;
    use super::*;
    use crate::parser::module::RefType;
    use crate::parser::reader::Reader;
    use rstest::rstest;

    #[rstest]
    #[case(InstructionKind::I32Add, &[0x6a])]
    #[case(InstructionKind::I32Const { value: -2 }, &[0x41, 0x7e])]
    #[case(InstructionKind::Block { block_type: BlockType::FuncType(64) }, &[0x02, 0xc0, 0x00])]
    #[case(InstructionKind::MemoryGrow, &[0x40, 0x00])]
    #[case(InstructionKind::I64Store { memarg: MemArg { align: 3, offset: 8 } }, &[0x37, 0x03, 0x08])]
    #[case(InstructionKind::TableInit { elem_idx: 1, table_idx: 2 }, &[0xfc, 0x0c, 0x01, 0x02])]
    #[case(InstructionKind::I32TruncSatF64S, &[0xfc, 0x02])]
    #[case(InstructionKind::RefNull { ref_type: RefType::FuncRef }, &[0xd0, 0x70])]
    fn test_encode(#[case] kind: InstructionKind, #[case] expected: &[u8]) {
        assert_eq!(kind.encode(), expected);
    }

    #[test]
    fn test_encode_decodes_back() {
        let instructions = vec![
            InstructionKind::Loop {
                block_type: BlockType::Value(ValueType::F64),
            },
            InstructionKind::BrTable {
                labels: vec![3, 0, 1],
                default: 2,
            },
            InstructionKind::F64Const { value: -0.5 },
            InstructionKind::SelectTyped {
                val_types: vec![ValueType::ExternRef],
            },
            InstructionKind::MemoryCopy,
            InstructionKind::End,
        ];
        let mut bytes = Vec::new();
        for instruction in &instructions {
            instruction.encode_into(&mut bytes);
        }

        let mut reader = Reader::new(&bytes);
        let mut decoded = Vec::new();
        while !reader.is_empty() {
            decoded.push(InstructionKind::decode(&mut reader).expect("decode"));
        }
        assert_eq!(decoded, instructions);
    }
}
