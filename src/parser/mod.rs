//! Binary format decoder.
//!
//! [`decode`] performs one linear pass over the module bytes. Section
//! payloads are decoded into their typed tables; function bodies are kept
//! as raw instruction bytes and only decoded by the validator.

pub mod encoding;
pub mod error;
pub mod instruction;
pub mod limits;
pub mod module;
pub mod reader;
pub mod validate;

use error::DecodeError;
use instruction::decode::{decode_ref_type, decode_value_type};
use instruction::InstructionKind;
use module::*;
use reader::Reader;
use tracing::debug;

/// Decode a binary module. Any malformation rejects the whole module.
pub fn decode(bytes: &[u8]) -> Result<Module, DecodeError> {
    let mut reader = Reader::new(bytes);
    read_header(&mut reader)?;

    let mut module = Module::default();
    let mut last_order = 0;

    while !reader.is_empty() {
        let id_offset = reader.offset();
        let id = reader.read_byte()?;
        let size = reader.read_vu32()? as usize;
        let mut payload = reader.sub_reader(size)?;

        if id != encoding::SECTION_CUSTOM {
            let order = section_order(id).ok_or_else(|| {
                DecodeError::malformed(id_offset, format!("malformed section id {id}"))
            })?;
            if order <= last_order {
                return Err(DecodeError::InvalidSectionOrder {
                    offset: id_offset,
                    id,
                });
            }
            last_order = order;
        }

        read_section(id, &mut payload, &mut module)?;

        if !payload.is_empty() {
            return Err(DecodeError::SectionSizeMismatch {
                offset: payload.offset(),
                id,
            });
        }
    }

    if module.functions.len() != module.code.len() {
        return Err(DecodeError::malformed(
            reader.offset(),
            "function and code section have inconsistent lengths",
        ));
    }
    if let Some(count) = module.data_count {
        if count as usize != module.data.len() {
            return Err(DecodeError::malformed(
                reader.offset(),
                "data count and data section have inconsistent lengths",
            ));
        }
    }

    debug!(
        types = module.types.len(),
        imports = module.imports.len(),
        functions = module.functions.len(),
        tables = module.tables.len(),
        memories = module.memories.len(),
        globals = module.globals.len(),
        exports = module.exports.len(),
        elements = module.elements.len(),
        data = module.data.len(),
        customs = module.customs.len(),
        "decoded module"
    );

    Ok(module)
}

/// Position of a known section in the canonical order. The data count
/// section sits between the element and code sections.
fn section_order(id: u8) -> Option<u8> {
    match id {
        encoding::SECTION_TYPE..=encoding::SECTION_ELEMENT => Some(id),
        encoding::SECTION_DATA_COUNT => Some(10),
        encoding::SECTION_CODE => Some(11),
        encoding::SECTION_DATA => Some(12),
        _ => None,
    }
}

fn read_header(reader: &mut Reader) -> Result<(), DecodeError> {
    let magic = reader.read_bytes(4).map_err(|_| DecodeError::InvalidHeader {
        offset: 0,
        reason: "unexpected end",
    })?;
    if magic != encoding::MAGIC {
        return Err(DecodeError::InvalidHeader {
            offset: 0,
            reason: "magic header not detected",
        });
    }
    let version = reader.read_u32().map_err(|_| DecodeError::InvalidHeader {
        offset: 4,
        reason: "unexpected end",
    })?;
    if version != encoding::VERSION {
        return Err(DecodeError::InvalidHeader {
            offset: 4,
            reason: "unknown binary version",
        });
    }
    Ok(())
}

fn read_section(id: u8, reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    match id {
        encoding::SECTION_CUSTOM => read_section_custom(reader, &mut module.customs),
        encoding::SECTION_TYPE => read_section_type(reader, &mut module.types),
        encoding::SECTION_IMPORT => read_section_import(reader, &mut module.imports),
        encoding::SECTION_FUNCTION => read_section_function(reader, &mut module.functions),
        encoding::SECTION_TABLE => read_section_table(reader, &mut module.tables),
        encoding::SECTION_MEMORY => read_section_memory(reader, &mut module.memories),
        encoding::SECTION_GLOBAL => read_section_global(reader, &mut module.globals),
        encoding::SECTION_EXPORT => read_section_export(reader, &mut module.exports),
        encoding::SECTION_START => {
            module.start = Some(reader.read_vu32()?);
            Ok(())
        }
        encoding::SECTION_ELEMENT => read_section_element(reader, &mut module.elements),
        encoding::SECTION_DATA_COUNT => {
            module.data_count = Some(reader.read_vu32()?);
            Ok(())
        }
        encoding::SECTION_CODE => read_section_code(reader, module),
        encoding::SECTION_DATA => read_section_data(reader, module),
        _ => Err(DecodeError::malformed(reader.offset(), "malformed section id")),
    }
}

/* SECTION READERS ************************************************/

fn read_section_custom(
    reader: &mut Reader,
    customs: &mut Vec<CustomSection>,
) -> Result<(), DecodeError> {
    let start = reader.offset();
    let name = reader.read_name()?;
    let data = reader.read_bytes(reader.remaining())?.to_vec();
    customs.push(CustomSection {
        name,
        data,
        range: start..reader.offset(),
    });
    Ok(())
}

fn read_result_types(reader: &mut Reader, limit: u32) -> Result<Vec<ValueType>, DecodeError> {
    let count = reader.read_count(limit, "result types")?;
    (0..count).map(|_| decode_value_type(reader)).collect()
}

fn read_section_type(reader: &mut Reader, types: &mut Vec<FunctionType>) -> Result<(), DecodeError> {
    let count = reader.read_count(limits::MAX_TYPES, "types")?;

    for _ in 0..count {
        let offset = reader.offset();
        if reader.read_byte()? != encoding::TYPE_FUNC {
            return Err(DecodeError::malformed(offset, "expected 0x60 to lead function type"));
        }
        let parameters = read_result_types(reader, limits::MAX_FUNCTION_PARAMS)?;
        let return_types = read_result_types(reader, limits::MAX_FUNCTION_RETURNS)?;
        types.push(FunctionType::new(parameters, return_types));
    }
    Ok(())
}

fn read_limits(reader: &mut Reader) -> Result<Limits, DecodeError> {
    let offset = reader.offset();
    match reader.read_byte()? {
        encoding::LIMITS_MIN => Ok(Limits::new(reader.read_vu32()?, None)),
        encoding::LIMITS_MIN_MAX => {
            let min = reader.read_vu32()?;
            let max = reader.read_vu32()?;
            Ok(Limits::new(min, Some(max)))
        }
        flags => Err(DecodeError::malformed(offset, format!("malformed limits flags {flags:#x}"))),
    }
}

fn read_table_type(reader: &mut Reader) -> Result<TableType, DecodeError> {
    let ref_type = decode_ref_type(reader)?;
    let limits = read_limits(reader)?;
    Ok(TableType { ref_type, limits })
}

fn read_global_type(reader: &mut Reader) -> Result<GlobalType, DecodeError> {
    let value_type = decode_value_type(reader)?;
    let offset = reader.offset();
    let mutable = match reader.read_byte()? {
        0x00 => false,
        0x01 => true,
        _ => return Err(DecodeError::malformed(offset, "malformed mutability")),
    };
    Ok(GlobalType {
        value_type,
        mutable,
    })
}

fn read_section_import(reader: &mut Reader, imports: &mut Vec<Import>) -> Result<(), DecodeError> {
    let count = reader.read_count(limits::MAX_IMPORTS, "imports")?;

    for _ in 0..count {
        let module = reader.read_name()?;
        let name = reader.read_name()?;
        let offset = reader.offset();
        let external_kind = match reader.read_byte()? {
            encoding::DESC_FUNC => ExternalKind::Function(reader.read_vu32()?),
            encoding::DESC_TABLE => ExternalKind::Table(read_table_type(reader)?),
            encoding::DESC_MEMORY => ExternalKind::Memory(MemoryType {
                limits: read_limits(reader)?,
            }),
            encoding::DESC_GLOBAL => ExternalKind::Global(read_global_type(reader)?),
            kind => {
                return Err(DecodeError::malformed(
                    offset,
                    format!("malformed import kind {kind:#x}"),
                ))
            }
        };
        imports.push(Import {
            module,
            name,
            external_kind,
        });
    }
    Ok(())
}

fn read_section_function(reader: &mut Reader, functions: &mut Vec<u32>) -> Result<(), DecodeError> {
    let count = reader.read_count(limits::MAX_FUNCTIONS, "functions")?;
    for _ in 0..count {
        functions.push(reader.read_vu32()?);
    }
    Ok(())
}

fn read_section_table(reader: &mut Reader, tables: &mut Vec<TableType>) -> Result<(), DecodeError> {
    let count = reader.read_count(limits::MAX_TABLES, "tables")?;
    for _ in 0..count {
        tables.push(read_table_type(reader)?);
    }
    Ok(())
}

fn read_section_memory(reader: &mut Reader, memories: &mut Vec<MemoryType>) -> Result<(), DecodeError> {
    let count = reader.read_count(limits::MAX_MEMORIES, "memories")?;
    for _ in 0..count {
        memories.push(MemoryType {
            limits: read_limits(reader)?,
        });
    }
    Ok(())
}

/// Read instructions up to and including the terminating `end`.
fn read_const_expr(reader: &mut Reader) -> Result<ConstExpr, DecodeError> {
    let offset = reader.offset();
    let mut instructions = Vec::new();
    loop {
        match InstructionKind::decode(reader)? {
            InstructionKind::End => break,
            kind => instructions.push(kind),
        }
    }
    Ok(ConstExpr {
        instructions,
        offset,
    })
}

fn read_section_global(reader: &mut Reader, globals: &mut Vec<Global>) -> Result<(), DecodeError> {
    let count = reader.read_count(limits::MAX_GLOBALS, "globals")?;
    for _ in 0..count {
        let global_type = read_global_type(reader)?;
        let init = read_const_expr(reader)?;
        globals.push(Global { global_type, init });
    }
    Ok(())
}

fn read_section_export(reader: &mut Reader, exports: &mut Vec<Export>) -> Result<(), DecodeError> {
    let count = reader.read_count(limits::MAX_EXPORTS, "exports")?;
    for _ in 0..count {
        let name = reader.read_name()?;
        let offset = reader.offset();
        let kind = reader.read_byte()?;
        let index = ExportIndex::decode(kind, reader.read_vu32()?, offset)?;
        exports.push(Export { name, index });
    }
    Ok(())
}

fn read_section_element(reader: &mut Reader, elements: &mut Vec<Element>) -> Result<(), DecodeError> {
    let count = reader.read_count(limits::MAX_ELEMENT_SEGMENTS, "element segments")?;

    for _ in 0..count {
        let offset = reader.offset();
        let flags = reader.read_vu32()?;
        if flags > 7 {
            return Err(DecodeError::malformed(offset, "malformed elements segment kind"));
        }
        let explicit_table = flags & encoding::ELEM_EXPLICIT_TABLE != 0;
        let expressions = flags & encoding::ELEM_EXPRESSIONS != 0;

        let mode = if flags & encoding::ELEM_NON_ACTIVE == 0 {
            let table_index = if explicit_table {
                reader.read_vu32()?
            } else {
                0
            };
            ElementMode::Active {
                table_index,
                offset: read_const_expr(reader)?,
            }
        } else if explicit_table {
            ElementMode::Declarative
        } else {
            ElementMode::Passive
        };

        // Flags 0 and 4 carry no element type and are always funcref
        let ref_type = if flags & (encoding::ELEM_NON_ACTIVE | encoding::ELEM_EXPLICIT_TABLE) == 0 {
            RefType::FuncRef
        } else if expressions {
            decode_ref_type(reader)?
        } else {
            let kind_offset = reader.offset();
            if reader.read_byte()? != encoding::ELEMKIND_FUNCREF {
                return Err(DecodeError::malformed(kind_offset, "malformed element kind"));
            }
            RefType::FuncRef
        };

        let entries = reader.read_count(limits::MAX_TABLE_INIT_ENTRIES, "element entries")?;
        let mut init = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            if expressions {
                init.push(read_const_expr(reader)?);
            } else {
                let offset = reader.offset();
                let func_idx = reader.read_vu32()?;
                init.push(ConstExpr {
                    instructions: vec![InstructionKind::RefFunc { func_idx }],
                    offset,
                });
            }
        }

        elements.push(Element {
            ref_type,
            init,
            mode,
        });
    }
    Ok(())
}

fn read_section_code(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let offset = reader.offset();
    let count = reader.read_count(limits::MAX_FUNCTIONS, "function bodies")?;
    if count as usize != module.functions.len() {
        return Err(DecodeError::malformed(
            offset,
            "function and code section have inconsistent lengths",
        ));
    }

    for _ in 0..count {
        let size_offset = reader.offset();
        let size = reader.read_vu32()?;
        if size > limits::MAX_FUNCTION_SIZE {
            return Err(DecodeError::LimitExceeded {
                offset: size_offset,
                what: "function body bytes",
                limit: limits::MAX_FUNCTION_SIZE,
            });
        }
        let mut body = reader.sub_reader(size as usize)?;

        let groups = body.read_count(limits::MAX_FUNCTION_LOCALS, "local declarations")?;
        let mut entries = Vec::with_capacity(groups as usize);
        let mut total: u64 = 0;
        for _ in 0..groups {
            let locals_offset = body.offset();
            let n = body.read_vu32()?;
            total += n as u64;
            if total > limits::MAX_FUNCTION_LOCALS as u64 {
                return Err(DecodeError::LimitExceeded {
                    offset: locals_offset,
                    what: "locals",
                    limit: limits::MAX_FUNCTION_LOCALS,
                });
            }
            entries.push((n, decode_value_type(&mut body)?));
        }

        let code_offset = body.offset();
        let code = body.read_bytes(body.remaining())?.to_vec();
        module.code.push(FunctionBody {
            locals: Locals::new(entries),
            code,
            offset: code_offset,
        });
    }
    Ok(())
}

fn read_section_data(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let offset = reader.offset();
    let count = reader.read_count(limits::MAX_DATA_SEGMENTS, "data segments")?;
    if let Some(expected) = module.data_count {
        if expected != count {
            return Err(DecodeError::malformed(
                offset,
                "data count and data section have inconsistent lengths",
            ));
        }
    }

    for _ in 0..count {
        let flags_offset = reader.offset();
        let mode = match reader.read_vu32()? {
            encoding::DATA_ACTIVE => DataMode::Active {
                memory_index: 0,
                offset: read_const_expr(reader)?,
            },
            encoding::DATA_PASSIVE => DataMode::Passive,
            encoding::DATA_ACTIVE_EXPLICIT => DataMode::Active {
                memory_index: reader.read_vu32()?,
                offset: read_const_expr(reader)?,
            },
            _ => {
                return Err(DecodeError::malformed(
                    flags_offset,
                    "malformed data segment kind",
                ))
            }
        };
        let init = reader.read_byte_vec()?.to_vec();
        module.data.push(Data { init, mode });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    fn module_bytes(sections: &[&[u8]]) -> Vec<u8> {
        let mut bytes = HEADER.to_vec();
        for section in sections {
            bytes.extend_from_slice(section);
        }
        bytes
    }

    // (func (param i32 i32) (result i32) local.get 0 local.get 1 i32.add) exported as "add"
    const TYPE_SECTION: &[u8] = &[0x01, 0x07, 0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f];
    const FUNCTION_SECTION: &[u8] = &[0x03, 0x02, 0x01, 0x00];
    const EXPORT_SECTION: &[u8] = &[0x07, 0x07, 0x01, 0x03, b'a', b'd', b'd', 0x00, 0x00];
    const CODE_SECTION: &[u8] = &[0x0a, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b];

    #[test]
    fn test_decode_empty_module() {
        let module = decode(&HEADER).expect("empty module");
        assert_eq!(module, Module::default());
    }

    #[test]
    fn test_decode_add_module() {
        let bytes = module_bytes(&[TYPE_SECTION, FUNCTION_SECTION, EXPORT_SECTION, CODE_SECTION]);
        let module = decode(&bytes).expect("add module");

        assert_eq!(
            module.types,
            vec![FunctionType::new(
                vec![ValueType::I32, ValueType::I32],
                vec![ValueType::I32]
            )]
        );
        assert_eq!(module.functions, vec![0]);
        assert_eq!(module.export("add").map(|e| e.index), Some(ExportIndex::Function(0)));
        assert_eq!(module.code.len(), 1);
        assert_eq!(module.code[0].code, vec![0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b]);
        assert_eq!(module.code[0].offset, bytes.len() - 6);
    }

    #[rstest]
    #[case::short(&[0x00, 0x61, 0x73], 0)]
    #[case::bad_magic(&[0x00, 0x61, 0x73, 0x6e, 0x01, 0x00, 0x00, 0x00], 0)]
    #[case::bad_version(&[0x00, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00], 4)]
    #[case::short_version(&[0x00, 0x61, 0x73, 0x6d, 0x01], 4)]
    fn test_invalid_header(#[case] bytes: &[u8], #[case] offset: usize) {
        assert!(matches!(
            decode(bytes),
            Err(DecodeError::InvalidHeader { offset: o, .. }) if o == offset
        ));
    }

    #[test]
    fn test_section_out_of_order() {
        let bytes = module_bytes(&[FUNCTION_SECTION, TYPE_SECTION]);
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::InvalidSectionOrder { offset: 12, id: 1 })
        );
    }

    #[test]
    fn test_duplicate_section() {
        let bytes = module_bytes(&[TYPE_SECTION, TYPE_SECTION]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::InvalidSectionOrder { id: 1, .. })
        ));
    }

    #[test]
    fn test_data_count_before_code() {
        // data count (id 12) after code (id 10) is out of order
        let bytes = module_bytes(&[
            TYPE_SECTION,
            FUNCTION_SECTION,
            CODE_SECTION,
            &[0x0c, 0x01, 0x00],
        ]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::InvalidSectionOrder { id: 12, .. })
        ));
    }

    #[test]
    fn test_custom_sections_anywhere() {
        let custom: &[u8] = &[0x00, 0x05, 0x03, b'a', b'b', b'c', 0xff];
        let bytes = module_bytes(&[custom, TYPE_SECTION, custom]);
        let module = decode(&bytes).expect("custom sections");
        assert_eq!(module.customs.len(), 2);
        let section = module.custom_section("abc").expect("abc");
        assert_eq!(section.data, vec![0xff]);
        assert_eq!(section.range, 10..15);
    }

    #[test]
    fn test_section_size_mismatch() {
        // type section claims 8 bytes but its content is 7 bytes, with a trailing byte
        let bytes = module_bytes(&[&[0x01, 0x08, 0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f, 0x00]]);
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::SectionSizeMismatch { offset: 17, id: 1 })
        );
    }

    #[test]
    fn test_section_past_end() {
        let bytes = module_bytes(&[&[0x01, 0x20, 0x01]]);
        assert!(matches!(decode(&bytes), Err(DecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_function_without_code() {
        let bytes = module_bytes(&[TYPE_SECTION, FUNCTION_SECTION]);
        assert!(matches!(decode(&bytes), Err(DecodeError::Malformed { .. })));
    }

    #[test]
    fn test_data_count_mismatch() {
        let bytes = module_bytes(&[&[0x0c, 0x01, 0x02], &[0x0b, 0x01, 0x00]]);
        assert!(matches!(decode(&bytes), Err(DecodeError::Malformed { .. })));

        let bytes = module_bytes(&[&[0x0c, 0x01, 0x01]]);
        assert!(matches!(decode(&bytes), Err(DecodeError::Malformed { .. })));
    }

    #[test]
    fn test_unknown_section_id() {
        let bytes = module_bytes(&[&[0x0d, 0x00]]);
        assert!(matches!(decode(&bytes), Err(DecodeError::Malformed { offset: 8, .. })));
    }

    #[test]
    fn test_invalid_utf8_import_name() {
        let bytes = module_bytes(&[&[0x02, 0x07, 0x01, 0x01, 0xc0, 0x01, b'f', 0x00, 0x00]]);
        assert_eq!(decode(&bytes), Err(DecodeError::InvalidUtf8 { offset: 12 }));
    }

    #[test]
    fn test_element_segments() {
        // one table, then: flag 0 (active, funcs 0 1), flag 1 (passive), flag 3 (declarative)
        let table: &[u8] = &[0x04, 0x04, 0x01, 0x70, 0x00, 0x02];
        let elements: &[u8] = &[
            0x09, 0x0f, 0x03, // section, 3 segments
            0x00, 0x41, 0x00, 0x0b, 0x02, 0x00, 0x01, // active
            0x01, 0x00, 0x01, 0x00, // passive
            0x03, 0x00, 0x00, // declarative, no entries
        ];
        let bytes = module_bytes(&[table, elements]);
        let module = decode(&bytes).expect("elements");

        assert_eq!(module.elements.len(), 3);
        let active = &module.elements[0];
        assert!(matches!(active.mode, ElementMode::Active { table_index: 0, .. }));
        assert_eq!(
            active.init[1].instructions,
            vec![InstructionKind::RefFunc { func_idx: 1 }]
        );
        assert_eq!(module.elements[1].mode, ElementMode::Passive);
        assert_eq!(module.elements[2].mode, ElementMode::Declarative);
    }

    #[test]
    fn test_data_segments() {
        let memory: &[u8] = &[0x05, 0x03, 0x01, 0x00, 0x01];
        let data: &[u8] = &[
            0x0b, 0x0b, 0x02, // section, 2 segments
            0x00, 0x41, 0x10, 0x0b, 0x02, 0xaa, 0xbb, // active at 16
            0x01, 0x01, 0xcc, // passive
        ];
        let module = decode(&module_bytes(&[memory, data])).expect("data");
        assert_eq!(module.memories, vec![MemoryType { limits: Limits::new(1, None) }]);
        assert_eq!(module.data[0].init, vec![0xaa, 0xbb]);
        assert!(matches!(
            &module.data[0].mode,
            DataMode::Active { memory_index: 0, offset } if offset.instructions == vec![InstructionKind::I32Const { value: 16 }]
        ));
        assert_eq!(module.data[1].mode, DataMode::Passive);
    }

    #[test]
    fn test_too_many_locals() {
        let bytes = module_bytes(&[
            &[0x01, 0x04, 0x01, 0x60, 0x00, 0x00],
            FUNCTION_SECTION,
            &[0x0a, 0x0a, 0x01, 0x08, 0x02, 0xff, 0xff, 0x03, 0x7f, 0x01, 0x7e, 0x0b],
        ]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::LimitExceeded { what: "locals", .. })
        ));
    }
}
