use std::fmt;
use std::ops::Range;

use super::error::DecodeError;
use super::instruction::InstructionKind;

/// A decoded module. Immutable once returned by [`crate::parser::decode`].
///
/// Index spaces (functions, tables, memories, globals) start with the
/// imports of that kind, followed by the module's own definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    /// Type index of each function defined in this module
    pub functions: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<Element>,
    pub code: Vec<FunctionBody>,
    pub data: Vec<Data>,
    pub data_count: Option<u32>,
    pub customs: Vec<CustomSection>,
}

impl Module {
    pub fn imported_functions(&self) -> impl Iterator<Item = u32> + '_ {
        self.imports.iter().filter_map(|import| match import.external_kind {
            ExternalKind::Function(type_idx) => Some(type_idx),
            _ => None,
        })
    }

    pub fn imported_tables(&self) -> impl Iterator<Item = &TableType> + '_ {
        self.imports.iter().filter_map(|import| match &import.external_kind {
            ExternalKind::Table(table_type) => Some(table_type),
            _ => None,
        })
    }

    pub fn imported_memories(&self) -> impl Iterator<Item = &MemoryType> + '_ {
        self.imports.iter().filter_map(|import| match &import.external_kind {
            ExternalKind::Memory(memory_type) => Some(memory_type),
            _ => None,
        })
    }

    pub fn imported_globals(&self) -> impl Iterator<Item = GlobalType> + '_ {
        self.imports.iter().filter_map(|import| match import.external_kind {
            ExternalKind::Global(global_type) => Some(global_type),
            _ => None,
        })
    }

    pub fn num_imported_functions(&self) -> u32 {
        self.imported_functions().count() as u32
    }

    pub fn num_imported_globals(&self) -> u32 {
        self.imported_globals().count() as u32
    }

    pub fn total_functions(&self) -> u32 {
        self.num_imported_functions() + self.functions.len() as u32
    }

    pub fn total_tables(&self) -> u32 {
        self.imported_tables().count() as u32 + self.tables.len() as u32
    }

    pub fn total_memories(&self) -> u32 {
        self.imported_memories().count() as u32 + self.memories.len() as u32
    }

    pub fn total_globals(&self) -> u32 {
        self.num_imported_globals() + self.globals.len() as u32
    }

    /// Type index of a function in the function index space.
    pub fn func_type_index(&self, func_idx: u32) -> Option<u32> {
        let imported = self.num_imported_functions();
        if func_idx < imported {
            self.imported_functions().nth(func_idx as usize)
        } else {
            self.functions.get((func_idx - imported) as usize).copied()
        }
    }

    pub fn func_type(&self, func_idx: u32) -> Option<&FunctionType> {
        self.func_type_index(func_idx)
            .and_then(|type_idx| self.types.get(type_idx as usize))
    }

    pub fn table_type(&self, table_idx: u32) -> Option<&TableType> {
        let imported = self.imported_tables().count() as u32;
        if table_idx < imported {
            self.imported_tables().nth(table_idx as usize)
        } else {
            self.tables.get((table_idx - imported) as usize)
        }
    }

    pub fn memory_type(&self, memory_idx: u32) -> Option<&MemoryType> {
        let imported = self.imported_memories().count() as u32;
        if memory_idx < imported {
            self.imported_memories().nth(memory_idx as usize)
        } else {
            self.memories.get((memory_idx - imported) as usize)
        }
    }

    pub fn global_type(&self, global_idx: u32) -> Option<GlobalType> {
        let imported = self.num_imported_globals();
        if global_idx < imported {
            self.imported_globals().nth(global_idx as usize)
        } else {
            self.globals
                .get((global_idx - imported) as usize)
                .map(|global| global.global_type)
        }
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|export| export.name == name)
    }

    pub fn custom_section(&self, name: &str) -> Option<&CustomSection> {
        self.customs.iter().find(|custom| custom.name == name)
    }

    /// Name under which a function is exported, if any.
    pub fn get_function_name(&self, func_idx: u32) -> Option<&str> {
        self.exports.iter().find_map(|export| match export.index {
            ExportIndex::Function(idx) if idx == func_idx => Some(export.name.as_str()),
            _ => None,
        })
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum ValueType {
    // Number types
    I32,
    I64,
    F32,
    F64,
    // Reference types
    FuncRef,
    ExternRef,
}

impl ValueType {
    pub fn decode(byte: u8) -> Option<Self> {
        match byte {
            0x7f => Some(ValueType::I32),
            0x7e => Some(ValueType::I64),
            0x7d => Some(ValueType::F32),
            0x7c => Some(ValueType::F64),
            0x70 => Some(ValueType::FuncRef),
            0x6f => Some(ValueType::ExternRef),
            _ => None,
        }
    }

    pub fn byte(&self) -> u8 {
        match self {
            ValueType::I32 => 0x7f,
            ValueType::I64 => 0x7e,
            ValueType::F32 => 0x7d,
            ValueType::F64 => 0x7c,
            ValueType::FuncRef => 0x70,
            ValueType::ExternRef => 0x6f,
        }
    }

    pub fn is_num(&self) -> bool {
        matches!(
            self,
            ValueType::I32 | ValueType::I64 | ValueType::F32 | ValueType::F64
        )
    }

    pub fn is_ref(&self) -> bool {
        !self.is_num()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::FuncRef => "funcref",
            ValueType::ExternRef => "externref",
        })
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum RefType {
    FuncRef,
    ExternRef,
}

impl RefType {
    pub fn decode(byte: u8) -> Option<Self> {
        match byte {
            0x70 => Some(RefType::FuncRef),
            0x6f => Some(RefType::ExternRef),
            _ => None,
        }
    }
}

impl From<RefType> for ValueType {
    fn from(rt: RefType) -> Self {
        match rt {
            RefType::FuncRef => ValueType::FuncRef,
            RefType::ExternRef => ValueType::ExternRef,
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        ValueType::from(*self).fmt(f)
    }
}

/// Function signatures compare structurally; two types at different
/// indices with the same parameters and results are the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FunctionType {
    pub parameters: Vec<ValueType>,
    pub return_types: Vec<ValueType>,
}

impl FunctionType {
    pub fn new(parameters: Vec<ValueType>, return_types: Vec<ValueType>) -> Self {
        FunctionType {
            parameters,
            return_types,
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let join = |types: &[ValueType]| {
            types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(", ")
        };
        write!(f, "({}) -> ({})", join(&self.parameters), join(&self.return_types))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Limits { min, max }
    }

    /// Import subtyping: `self` (the provided extern) satisfies `expected`
    /// when it is at least as large and at most as permissive.
    pub fn matches(&self, expected: &Limits) -> bool {
        if self.min < expected.min {
            return false;
        }
        match (self.max, expected.max) {
            (_, None) => true,
            (Some(actual), Some(expected)) => actual <= expected,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "min={} max={}", self.min, max),
            None => write!(f, "min={}", self.min),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub ref_type: RefType,
    pub limits: Limits,
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.ref_type, self.limits)
    }
}

/// Memory limits, in units of 64KiB pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub limits: Limits,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "pages {}", self.limits)
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

impl fmt::Display for GlobalType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.mutable {
            write!(f, "(mut {})", self.value_type)
        } else {
            write!(f, "{}", self.value_type)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalKind {
    /// Type index of the imported function
    Function(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

impl ExternalKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExternalKind::Function(_) => "function",
            ExternalKind::Table(_) => "table",
            ExternalKind::Memory(_) => "memory",
            ExternalKind::Global(_) => "global",
        }
    }
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExternalKind::Function(type_idx) => write!(f, "func (type {type_idx})"),
            ExternalKind::Table(table_type) => write!(f, "table {table_type}"),
            ExternalKind::Memory(memory_type) => write!(f, "memory {memory_type}"),
            ExternalKind::Global(global_type) => write!(f, "global {global_type}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub external_kind: ExternalKind,
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}: {}", self.module, self.name, self.external_kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportIndex {
    Function(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

impl ExportIndex {
    pub fn decode(byte: u8, idx: u32, offset: usize) -> Result<ExportIndex, DecodeError> {
        match byte {
            0x00 => Ok(ExportIndex::Function(idx)),
            0x01 => Ok(ExportIndex::Table(idx)),
            0x02 => Ok(ExportIndex::Memory(idx)),
            0x03 => Ok(ExportIndex::Global(idx)),
            _ => Err(DecodeError::malformed(offset, format!("invalid export kind {byte:#x}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub index: ExportIndex,
}

impl fmt::Display for Export {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\" -> {:?}", self.name, self.index)
    }
}

/// A constant initialiser expression, without its terminating `end`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstExpr {
    pub instructions: Vec<InstructionKind>,
    /// Offset of the first instruction within the module
    pub offset: usize,
}

impl fmt::Display for ConstExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts = self
            .instructions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>();
        write!(f, "({})", parts.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub global_type: GlobalType,
    pub init: ConstExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementMode {
    Passive,
    Declarative,
    Active { table_index: u32, offset: ConstExpr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub ref_type: RefType,
    /// One initialiser expression per table entry
    pub init: Vec<ConstExpr>,
    pub mode: ElementMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataMode {
    Passive,
    Active { memory_index: u32, offset: ConstExpr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub init: Vec<u8>,
    pub mode: DataMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Locals {
    entries: Vec<(u32, ValueType)>,
}

impl Locals {
    /// Initialize with a list of count+ValueType pairs
    pub fn new(entries: Vec<(u32, ValueType)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> u64 {
        self.entries.iter().map(|(count, _)| *count as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (u32, ValueType)> {
        self.entries.iter()
    }

    pub fn get(&self, index: u32) -> Option<&ValueType> {
        let mut remaining = index;
        for (count, value_type) in &self.entries {
            if remaining < *count {
                return Some(value_type);
            }
            remaining -= count;
        }
        None
    }

    /// One entry per local slot.
    pub fn expand(&self) -> Vec<ValueType> {
        self.entries
            .iter()
            .flat_map(|(count, value_type)| std::iter::repeat(*value_type).take(*count as usize))
            .collect()
    }
}

/// A function body as found in the code section. Instructions stay as
/// raw bytes until validation decodes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBody {
    pub locals: Locals,
    pub code: Vec<u8>,
    /// Offset of `code` within the module
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
    /// Byte range of the section payload (name included) within the module
    pub range: Range<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Limits::new(5, None), Limits::new(3, None), true)]
    #[case(Limits::new(2, None), Limits::new(3, None), false)]
    #[case(Limits::new(3, Some(4)), Limits::new(3, Some(4)), true)]
    #[case(Limits::new(3, Some(5)), Limits::new(3, Some(4)), false)]
    #[case(Limits::new(3, None), Limits::new(3, Some(4)), false)]
    #[case(Limits::new(3, Some(10)), Limits::new(1, None), true)]
    fn test_limits_matching(#[case] actual: Limits, #[case] expected: Limits, #[case] ok: bool) {
        assert_eq!(actual.matches(&expected), ok);
    }

    #[test]
    fn test_locals() {
        let locals = Locals::new(vec![(2, ValueType::I32), (1, ValueType::F64)]);
        assert_eq!(locals.len(), 3);
        assert_eq!(locals.get(1), Some(&ValueType::I32));
        assert_eq!(locals.get(2), Some(&ValueType::F64));
        assert_eq!(locals.get(3), None);
        assert_eq!(
            locals.expand(),
            vec![ValueType::I32, ValueType::I32, ValueType::F64]
        );
    }

    #[test]
    fn test_index_spaces_include_imports() {
        let module = Module {
            types: vec![
                FunctionType::new(vec![], vec![]),
                FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]),
            ],
            imports: vec![
                Import {
                    module: "env".into(),
                    name: "g".into(),
                    external_kind: ExternalKind::Global(GlobalType {
                        value_type: ValueType::I64,
                        mutable: false,
                    }),
                },
                Import {
                    module: "env".into(),
                    name: "f".into(),
                    external_kind: ExternalKind::Function(1),
                },
            ],
            functions: vec![0],
            ..Default::default()
        };

        assert_eq!(module.total_functions(), 2);
        assert_eq!(module.func_type_index(0), Some(1));
        assert_eq!(module.func_type_index(1), Some(0));
        assert_eq!(module.func_type_index(2), None);
        assert_eq!(module.global_type(0).map(|g| g.value_type), Some(ValueType::I64));
        assert_eq!(module.global_type(1), None);
    }

    #[test]
    fn test_function_type_display() {
        let ft = FunctionType::new(vec![ValueType::I32, ValueType::F64], vec![ValueType::I64]);
        assert_eq!(ft.to_string(), "(i32, f64) -> (i64)");
    }
}
