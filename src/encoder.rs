//! Binary encoder: the inverse of [`crate::parser::decode`].
//!
//! Given a [`Module`], [`encode`] produces its binary encoding. Sections are
//! emitted in canonical order and only when non-empty; custom sections are
//! appended after the standard ones.
//!
//! [`ModuleBuilder`] assembles a module programmatically, which is how tests
//! and embedders without a text-format front end produce modules.
//!
//! ```
//! use kwasm::encoder::ModuleBuilder;
//! use kwasm::parser::instruction::InstructionKind;
//! use kwasm::parser::module::{FunctionType, ValueType};
//!
//! let mut builder = ModuleBuilder::new();
//! let ty = builder.add_type(FunctionType::new(vec![], vec![ValueType::I32]));
//! let f = builder.add_function(ty, vec![], vec![InstructionKind::I32Const { value: 7 }]);
//! builder.export_function("seven", f);
//!
//! let bytes = builder.encode();
//! assert_eq!(&bytes[0..4], b"\0asm");
//! let module = kwasm::parser::decode(&bytes).unwrap();
//! assert_eq!(module.functions.len(), 1);
//! ```

use crate::parser::encoding::{
    write_name, write_vu1, write_vu32, DATA_ACTIVE, DATA_ACTIVE_EXPLICIT, DATA_PASSIVE, DESC_FUNC,
    DESC_GLOBAL, DESC_MEMORY, DESC_TABLE, ELEMKIND_FUNCREF, ELEM_EXPLICIT_TABLE, ELEM_EXPRESSIONS, ELEM_NON_ACTIVE,
    MAGIC, OP_END, SECTION_CODE, SECTION_CUSTOM, SECTION_DATA, SECTION_DATA_COUNT, SECTION_ELEMENT, SECTION_EXPORT,
    SECTION_FUNCTION, SECTION_GLOBAL, SECTION_IMPORT, SECTION_MEMORY, SECTION_START, SECTION_TABLE, SECTION_TYPE,
    TYPE_FUNC, VERSION,
};
use crate::parser::instruction::InstructionKind;
use crate::parser::module::{
    ConstExpr, Data, DataMode, Element, ElementMode, Export, ExportIndex, ExternalKind, FunctionBody, FunctionType,
    Global, GlobalType, Import, Limits, Locals, MemoryType, Module, RefType, TableType, ValueType,
};

// ===========================================================================
// Public API
// ===========================================================================

/// Encodes a module to binary format.
pub fn encode(module: &Module) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());

    encode_type_section(&mut buf, module);
    encode_import_section(&mut buf, module);
    encode_function_section(&mut buf, module);
    encode_table_section(&mut buf, module);
    encode_memory_section(&mut buf, module);
    encode_global_section(&mut buf, module);
    encode_export_section(&mut buf, module);
    encode_start_section(&mut buf, module);
    encode_element_section(&mut buf, module);
    encode_data_count_section(&mut buf, module);
    encode_code_section(&mut buf, module);
    encode_data_section(&mut buf, module);

    for custom in &module.customs {
        let mut contents = Vec::new();
        write_name(&mut contents, &custom.name);
        contents.extend_from_slice(&custom.data);
        emit_section(&mut buf, SECTION_CUSTOM, &contents);
    }

    buf
}

// ===========================================================================
// Section encoders (in wire order)
// ===========================================================================

/// ```text
/// typesec ::= section_1(vec(functype))
/// functype ::= 0x60 vec(valtype) vec(valtype)
/// ```
fn encode_type_section(buf: &mut Vec<u8>, module: &Module) {
    if module.types.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.types.len() as u32);
    for ft in &module.types {
        contents.push(TYPE_FUNC);
        emit_value_types(&mut contents, &ft.parameters);
        emit_value_types(&mut contents, &ft.return_types);
    }
    emit_section(buf, SECTION_TYPE, &contents);
}

/// ```text
/// importsec ::= section_2(vec(import))
/// importdesc ::= 0x00 typeidx | 0x01 tabletype | 0x02 memtype | 0x03 globaltype
/// ```
fn encode_import_section(buf: &mut Vec<u8>, module: &Module) {
    if module.imports.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.imports.len() as u32);
    for import in &module.imports {
        write_name(&mut contents, &import.module);
        write_name(&mut contents, &import.name);
        match &import.external_kind {
            ExternalKind::Function(type_idx) => {
                contents.push(DESC_FUNC);
                write_vu32(&mut contents, *type_idx);
            }
            ExternalKind::Table(table_type) => {
                contents.push(DESC_TABLE);
                emit_table_type(&mut contents, table_type);
            }
            ExternalKind::Memory(memory_type) => {
                contents.push(DESC_MEMORY);
                emit_limits(&mut contents, &memory_type.limits);
            }
            ExternalKind::Global(global_type) => {
                contents.push(DESC_GLOBAL);
                emit_global_type(&mut contents, global_type);
            }
        }
    }
    emit_section(buf, SECTION_IMPORT, &contents);
}

fn encode_function_section(buf: &mut Vec<u8>, module: &Module) {
    if module.functions.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.functions.len() as u32);
    for type_idx in &module.functions {
        write_vu32(&mut contents, *type_idx);
    }
    emit_section(buf, SECTION_FUNCTION, &contents);
}

fn encode_table_section(buf: &mut Vec<u8>, module: &Module) {
    if module.tables.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.tables.len() as u32);
    for table in &module.tables {
        emit_table_type(&mut contents, table);
    }
    emit_section(buf, SECTION_TABLE, &contents);
}

fn encode_memory_section(buf: &mut Vec<u8>, module: &Module) {
    if module.memories.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.memories.len() as u32);
    for memory in &module.memories {
        emit_limits(&mut contents, &memory.limits);
    }
    emit_section(buf, SECTION_MEMORY, &contents);
}

/// ```text
/// globalsec  ::= section_6(vec(global))
/// global     ::= globaltype expr
/// ```
fn encode_global_section(buf: &mut Vec<u8>, module: &Module) {
    if module.globals.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.globals.len() as u32);
    for global in &module.globals {
        emit_global_type(&mut contents, &global.global_type);
        emit_expression(&mut contents, &global.init);
    }
    emit_section(buf, SECTION_GLOBAL, &contents);
}

fn encode_export_section(buf: &mut Vec<u8>, module: &Module) {
    if module.exports.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.exports.len() as u32);
    for export in &module.exports {
        write_name(&mut contents, &export.name);
        let (desc, idx) = match export.index {
            ExportIndex::Function(idx) => (DESC_FUNC, idx),
            ExportIndex::Table(idx) => (DESC_TABLE, idx),
            ExportIndex::Memory(idx) => (DESC_MEMORY, idx),
            ExportIndex::Global(idx) => (DESC_GLOBAL, idx),
        };
        contents.push(desc);
        write_vu32(&mut contents, idx);
    }
    emit_section(buf, SECTION_EXPORT, &contents);
}

fn encode_start_section(buf: &mut Vec<u8>, module: &Module) {
    if let Some(start) = module.start {
        let mut contents = Vec::new();
        write_vu32(&mut contents, start);
        emit_section(buf, SECTION_START, &contents);
    }
}

/// Element segments pick the most compact of the eight encodings: plain
/// function indices when every entry is a `ref.func` of a funcref segment,
/// expressions otherwise. Table 0 with a funcref segment omits the table
/// index.
///
/// ```text
/// elemsec ::= section_9(vec(elem))
/// ```
fn encode_element_section(buf: &mut Vec<u8>, module: &Module) {
    if module.elements.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.elements.len() as u32);

    for elem in &module.elements {
        let func_indices = function_indices(elem);
        let mut flags = if func_indices.is_some() { 0 } else { ELEM_EXPRESSIONS };
        match &elem.mode {
            ElementMode::Passive => flags |= ELEM_NON_ACTIVE,
            ElementMode::Declarative => flags |= ELEM_NON_ACTIVE | ELEM_EXPLICIT_TABLE,
            ElementMode::Active { table_index, .. } => {
                if *table_index != 0 || elem.ref_type != RefType::FuncRef {
                    flags |= ELEM_EXPLICIT_TABLE;
                }
            }
        }
        write_vu32(&mut contents, flags);

        if let ElementMode::Active { table_index, offset } = &elem.mode {
            if flags & ELEM_EXPLICIT_TABLE != 0 {
                write_vu32(&mut contents, *table_index);
            }
            emit_expression(&mut contents, offset);
        }

        // Flags 0 and 4 carry no element kind
        if flags & (ELEM_NON_ACTIVE | ELEM_EXPLICIT_TABLE) != 0 {
            if func_indices.is_some() {
                contents.push(ELEMKIND_FUNCREF);
            } else {
                contents.push(ValueType::from(elem.ref_type).byte());
            }
        }

        write_vu32(&mut contents, elem.init.len() as u32);
        match func_indices {
            Some(indices) => indices.into_iter().for_each(|idx| write_vu32(&mut contents, idx)),
            None => elem.init.iter().for_each(|expr| emit_expression(&mut contents, expr)),
        }
    }
    emit_section(buf, SECTION_ELEMENT, &contents);
}

/// The function index of every entry, if all entries are plain `ref.func`
fn function_indices(elem: &Element) -> Option<Vec<u32>> {
    if elem.ref_type != RefType::FuncRef {
        return None;
    }
    elem.init
        .iter()
        .map(|expr| match expr.instructions.as_slice() {
            [InstructionKind::RefFunc { func_idx }] => Some(*func_idx),
            _ => None,
        })
        .collect()
}

fn encode_data_count_section(buf: &mut Vec<u8>, module: &Module) {
    if let Some(count) = module.data_count {
        let mut contents = Vec::new();
        write_vu32(&mut contents, count);
        emit_section(buf, SECTION_DATA_COUNT, &contents);
    }
}

/// ```text
/// codesec ::= section_10(vec(code))
/// code    ::= size:u32 func
/// func    ::= vec(locals) expr
/// ```
fn encode_code_section(buf: &mut Vec<u8>, module: &Module) {
    if module.code.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.code.len() as u32);

    for body in &module.code {
        let mut func_buf = Vec::new();
        write_vu32(&mut func_buf, body.locals.iter().count() as u32);
        for (count, value_type) in body.locals.iter() {
            write_vu32(&mut func_buf, *count);
            func_buf.push(value_type.byte());
        }
        // Body bytes already end with the function's `end`
        func_buf.extend_from_slice(&body.code);

        write_vu32(&mut contents, func_buf.len() as u32);
        contents.extend(func_buf);
    }
    emit_section(buf, SECTION_CODE, &contents);
}

/// ```text
/// data ::= 0x00 expr vec(byte)         (active, memory 0)
///        | 0x01 vec(byte)              (passive)
///        | 0x02 memidx expr vec(byte)  (active, explicit memory)
/// ```
fn encode_data_section(buf: &mut Vec<u8>, module: &Module) {
    if module.data.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, module.data.len() as u32);

    for seg in &module.data {
        match &seg.mode {
            DataMode::Active {
                memory_index: 0,
                offset,
            } => {
                write_vu32(&mut contents, DATA_ACTIVE);
                emit_expression(&mut contents, offset);
            }
            DataMode::Active { memory_index, offset } => {
                write_vu32(&mut contents, DATA_ACTIVE_EXPLICIT);
                write_vu32(&mut contents, *memory_index);
                emit_expression(&mut contents, offset);
            }
            DataMode::Passive => write_vu32(&mut contents, DATA_PASSIVE),
        }
        write_vu32(&mut contents, seg.init.len() as u32);
        contents.extend_from_slice(&seg.init);
    }
    emit_section(buf, SECTION_DATA, &contents);
}

// ===========================================================================
// Shared helpers
// ===========================================================================

/// Wraps section contents with a section ID and length prefix.
fn emit_section(buf: &mut Vec<u8>, id: u8, contents: &[u8]) {
    buf.push(id);
    write_vu32(buf, contents.len() as u32);
    buf.extend_from_slice(contents);
}

fn emit_value_types(buf: &mut Vec<u8>, types: &[ValueType]) {
    write_vu32(buf, types.len() as u32);
    buf.extend(types.iter().map(ValueType::byte));
}

/// ```text
/// limits ::= 0x00 min:u32 | 0x01 min:u32 max:u32
/// ```
fn emit_limits(buf: &mut Vec<u8>, limits: &Limits) {
    write_vu1(buf, limits.max.is_some());
    write_vu32(buf, limits.min);
    if let Some(max) = limits.max {
        write_vu32(buf, max);
    }
}

fn emit_table_type(buf: &mut Vec<u8>, table_type: &TableType) {
    buf.push(ValueType::from(table_type.ref_type).byte());
    emit_limits(buf, &table_type.limits);
}

fn emit_global_type(buf: &mut Vec<u8>, global_type: &GlobalType) {
    buf.push(global_type.value_type.byte());
    write_vu1(buf, global_type.mutable);
}

/// Encodes a constant expression followed by the end marker.
fn emit_expression(buf: &mut Vec<u8>, expr: &ConstExpr) {
    for kind in &expr.instructions {
        kind.encode_into(buf);
    }
    buf.push(OP_END);
}

fn const_expr(instructions: Vec<InstructionKind>) -> ConstExpr {
    ConstExpr {
        instructions,
        offset: 0,
    }
}

// ===========================================================================
// Builder
// ===========================================================================

/// Incrementally assembles a [`Module`].
///
/// Index-returning methods give the index in the relevant index space,
/// counting imports. Add imports before definitions of the same kind, or
/// previously returned indices will shift.
#[derive(Debug, Clone, Default)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function type, reusing an identical existing one
    pub fn add_type(&mut self, func_type: FunctionType) -> u32 {
        if let Some(idx) = self.module.types.iter().position(|t| *t == func_type) {
            return idx as u32;
        }
        self.module.types.push(func_type);
        self.module.types.len() as u32 - 1
    }

    /// Add an import; returns its index in the index space of its kind
    pub fn import(&mut self, module: &str, name: &str, external_kind: ExternalKind) -> u32 {
        let idx = match &external_kind {
            ExternalKind::Function(_) => self.module.num_imported_functions(),
            ExternalKind::Table(_) => self.module.imported_tables().count() as u32,
            ExternalKind::Memory(_) => self.module.imported_memories().count() as u32,
            ExternalKind::Global(_) => self.module.num_imported_globals(),
        };
        self.module.imports.push(Import {
            module: module.to_string(),
            name: name.to_string(),
            external_kind,
        });
        idx
    }

    /// Define a function. `body` is the instruction sequence without the
    /// final `end`, which is appended here.
    pub fn add_function(&mut self, type_idx: u32, locals: Vec<ValueType>, body: Vec<InstructionKind>) -> u32 {
        let mut entries: Vec<(u32, ValueType)> = Vec::new();
        for value_type in locals {
            match entries.last_mut() {
                Some((count, last)) if *last == value_type => *count += 1,
                _ => entries.push((1, value_type)),
            }
        }
        let mut code = Vec::new();
        for kind in body.iter().chain(std::iter::once(&InstructionKind::End)) {
            kind.encode_into(&mut code);
        }

        let idx = self.module.total_functions();
        self.module.functions.push(type_idx);
        self.module.code.push(FunctionBody {
            locals: Locals::new(entries),
            code,
            offset: 0,
        });
        idx
    }

    pub fn add_table(&mut self, table_type: TableType) -> u32 {
        let idx = self.module.total_tables();
        self.module.tables.push(table_type);
        idx
    }

    pub fn add_memory(&mut self, memory_type: MemoryType) -> u32 {
        let idx = self.module.total_memories();
        self.module.memories.push(memory_type);
        idx
    }

    pub fn add_global(&mut self, global_type: GlobalType, init: Vec<InstructionKind>) -> u32 {
        let idx = self.module.total_globals();
        self.module.globals.push(Global {
            global_type,
            init: const_expr(init),
        });
        idx
    }

    pub fn export_function(&mut self, name: &str, func_idx: u32) {
        self.export(name, ExportIndex::Function(func_idx));
    }

    pub fn export_table(&mut self, name: &str, table_idx: u32) {
        self.export(name, ExportIndex::Table(table_idx));
    }

    pub fn export_memory(&mut self, name: &str, memory_idx: u32) {
        self.export(name, ExportIndex::Memory(memory_idx));
    }

    pub fn export_global(&mut self, name: &str, global_idx: u32) {
        self.export(name, ExportIndex::Global(global_idx));
    }

    fn export(&mut self, name: &str, index: ExportIndex) {
        self.module.exports.push(Export {
            name: name.to_string(),
            index,
        });
    }

    pub fn start(&mut self, func_idx: u32) {
        self.module.start = Some(func_idx);
    }

    /// Active segment of function references written at `offset` of a table
    pub fn add_active_elements(&mut self, table_idx: u32, offset: i32, funcs: Vec<u32>) -> u32 {
        self.add_elements(
            RefType::FuncRef,
            funcs,
            ElementMode::Active {
                table_index: table_idx,
                offset: const_expr(vec![InstructionKind::I32Const { value: offset }]),
            },
        )
    }

    pub fn add_passive_elements(&mut self, funcs: Vec<u32>) -> u32 {
        self.add_elements(RefType::FuncRef, funcs, ElementMode::Passive)
    }

    /// Declarative segment, making functions referenceable by `ref.func`
    pub fn add_declared_elements(&mut self, funcs: Vec<u32>) -> u32 {
        self.add_elements(RefType::FuncRef, funcs, ElementMode::Declarative)
    }

    /// Segment with arbitrary constant initialisers
    pub fn add_element_segment(&mut self, ref_type: RefType, init: Vec<Vec<InstructionKind>>, mode: ElementMode) -> u32 {
        self.module.elements.push(Element {
            ref_type,
            init: init.into_iter().map(const_expr).collect(),
            mode,
        });
        self.module.elements.len() as u32 - 1
    }

    fn add_elements(&mut self, ref_type: RefType, funcs: Vec<u32>, mode: ElementMode) -> u32 {
        let init = funcs
            .into_iter()
            .map(|func_idx| vec![InstructionKind::RefFunc { func_idx }])
            .collect();
        self.add_element_segment(ref_type, init, mode)
    }

    pub fn add_active_data(&mut self, memory_idx: u32, offset: i32, bytes: Vec<u8>) -> u32 {
        self.add_data(Data {
            init: bytes,
            mode: DataMode::Active {
                memory_index: memory_idx,
                offset: const_expr(vec![InstructionKind::I32Const { value: offset }]),
            },
        })
    }

    pub fn add_passive_data(&mut self, bytes: Vec<u8>) -> u32 {
        self.add_data(Data {
            init: bytes,
            mode: DataMode::Passive,
        })
    }

    fn add_data(&mut self, data: Data) -> u32 {
        self.module.data.push(data);
        // A data count section lets code reference segments by index
        self.module.data_count = Some(self.module.data.len() as u32);
        self.module.data.len() as u32 - 1
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn build(self) -> Module {
        self.module
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(&self.module)
    }
}
