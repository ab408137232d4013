//! Module validation.
//!
//! [`validate`] checks a decoded [`Module`] against the type system: index
//! spaces, limits, constant expressions, exports, the start function, and
//! (in [`code`]) every function body. [`compile`] runs the same checks and
//! keeps what the body pass produced, so a [`ValidatedModule`] carries the
//! decoded instructions and block targets the interpreter runs from.

mod code;

use super::error::DecodeError;
use super::instruction::InstructionKind;
use super::limits;
use super::module::{
    DataMode, ElementMode, ExportIndex, ExternalKind, FunctionType, Limits, Module, RefType,
    ValueType,
};
use code::CodeValidator;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// The index space an out-of-range index was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSpace {
    Type,
    Function,
    Table,
    Memory,
    Global,
    Local,
    Element,
    Data,
}

impl fmt::Display for IndexSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexSpace::Type => "type",
            IndexSpace::Function => "function",
            IndexSpace::Table => "table",
            IndexSpace::Memory => "memory",
            IndexSpace::Global => "global",
            IndexSpace::Local => "local",
            IndexSpace::Element => "elem segment",
            IndexSpace::Data => "data segment",
        };
        write!(f, "{name}")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    #[error("type mismatch")]
    TypeMismatch,

    #[error("stack height mismatch")]
    StackMismatch,

    #[error("unknown {space} {index}")]
    InvalidIndex { space: IndexSpace, index: u32 },

    #[error("unknown label {depth}")]
    UnknownLabel { depth: u32 },

    #[error("alignment must not be larger than natural")]
    InvalidAlignment,

    #[error("global is immutable")]
    ImmutableGlobal,

    #[error("constant expression required")]
    NonConstantExpression,

    #[error("data count section required")]
    DataCountRequired,

    #[error("duplicate export name {name:?}")]
    DuplicateExport { name: String },

    #[error("invalid limits: {reason}")]
    InvalidLimits { reason: &'static str },

    #[error("start function must have type [] -> []")]
    InvalidStartFunction,

    #[error("undeclared function reference {func_idx}")]
    UndeclaredFunctionReference { func_idx: u32 },

    #[error("multiple memories")]
    MultipleMemories,

    #[error(transparent)]
    Malformed(#[from] DecodeError),
}

/// A validation failure together with where it was found. Failures in
/// function bodies record the function index (in the function index space,
/// imports included) and the position of the offending instruction.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}{}", Location(.func_idx, .instr_idx))]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub func_idx: Option<u32>,
    pub instr_idx: Option<usize>,
}

struct Location<'a>(&'a Option<u32>, &'a Option<usize>);

impl fmt::Display for Location<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(func_idx) = self.0 {
            write!(f, " in function {func_idx}")?;
        }
        if let Some(instr_idx) = self.1 {
            write!(f, " at instruction {instr_idx}")?;
        }
        Ok(())
    }
}

impl ValidationError {
    pub(crate) fn at(mut self, func_idx: u32, instr_idx: usize) -> Self {
        self.func_idx.get_or_insert(func_idx);
        self.instr_idx.get_or_insert(instr_idx);
        self
    }
}

impl From<ValidationErrorKind> for ValidationError {
    fn from(kind: ValidationErrorKind) -> Self {
        ValidationError {
            kind,
            func_idx: None,
            instr_idx: None,
        }
    }
}

impl From<DecodeError> for ValidationError {
    fn from(err: DecodeError) -> Self {
        ValidationErrorKind::Malformed(err).into()
    }
}

fn invalid_index(space: IndexSpace, index: u32) -> ValidationError {
    ValidationErrorKind::InvalidIndex { space, index }.into()
}

/// A defined function after validation: its signature, locals and the
/// decoded instruction sequence ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCode {
    /// Index in the function index space
    pub func_idx: u32,
    pub type_idx: u32,
    /// Declared locals, one per slot, parameters excluded
    pub locals: Vec<ValueType>,
    pub instructions: Vec<InstructionKind>,
    /// For `block`/`loop`/`if` the index of the matching `end` (or the
    /// `else` of an `if` that has one); for `else` the index of the `end`.
    targets: Vec<u32>,
}

impl FunctionCode {
    /// Where control continues when the structured instruction at `pc` is
    /// skipped over.
    pub fn target(&self, pc: usize) -> usize {
        self.targets.get(pc).map_or(pc, |t| *t as usize)
    }
}

/// A module that passed validation. Only validated modules can be
/// instantiated.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedModule {
    module: Module,
    functions: Vec<FunctionCode>,
}

impl ValidatedModule {
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Compiled body of a defined function, by index in the function
    /// index space.
    pub fn function(&self, func_idx: u32) -> Option<&FunctionCode> {
        let defined = func_idx.checked_sub(self.module.num_imported_functions())?;
        self.functions.get(defined as usize)
    }

    pub fn functions(&self) -> &[FunctionCode] {
        &self.functions
    }

    pub fn into_module(self) -> Module {
        self.module
    }
}

/// Check that a module is well-typed.
pub fn validate(module: &Module) -> Result<(), ValidationError> {
    check(module).map(|_| ())
}

/// Validate a module and keep the decoded function bodies.
pub fn compile(module: Module) -> Result<ValidatedModule, ValidationError> {
    let functions = check(&module)?;
    Ok(ValidatedModule { module, functions })
}

fn check(module: &Module) -> Result<Vec<FunctionCode>, ValidationError> {
    check_imports(module)?;
    check_definitions(module)?;

    let declared = declared_functions(module);
    check_globals(module)?;
    check_exports(module)?;
    check_start(module)?;
    check_elements(module)?;
    check_data(module)?;

    let imported = module.num_imported_functions();
    let mut functions = Vec::with_capacity(module.code.len());
    for (i, (type_idx, body)) in module.functions.iter().zip(&module.code).enumerate() {
        let func_idx = imported + i as u32;
        let func_type = module
            .types
            .get(*type_idx as usize)
            .ok_or_else(|| invalid_index(IndexSpace::Type, *type_idx))?;
        let validator = CodeValidator::new(module, &declared, func_type, &body.locals);
        let (instructions, targets) = validator
            .run(body)
            .map_err(|(err, instr_idx)| err.at(func_idx, instr_idx))?;
        functions.push(FunctionCode {
            func_idx,
            type_idx: *type_idx,
            locals: body.locals.expand(),
            instructions,
            targets,
        });
    }

    debug!(
        functions = functions.len(),
        globals = module.globals.len(),
        elements = module.elements.len(),
        data = module.data.len(),
        "module validated"
    );
    Ok(functions)
}

fn check_type_index(module: &Module, type_idx: u32) -> Result<&FunctionType, ValidationError> {
    module
        .types
        .get(type_idx as usize)
        .ok_or_else(|| invalid_index(IndexSpace::Type, type_idx))
}

fn check_limits(limits: &Limits, bound: u32, what: &'static str) -> Result<(), ValidationError> {
    if limits.min > bound {
        return Err(ValidationErrorKind::InvalidLimits { reason: what }.into());
    }
    if let Some(max) = limits.max {
        if max > bound {
            return Err(ValidationErrorKind::InvalidLimits { reason: what }.into());
        }
        if max < limits.min {
            return Err(ValidationErrorKind::InvalidLimits {
                reason: "size minimum must not be greater than maximum",
            }
            .into());
        }
    }
    Ok(())
}

fn check_memory_limits(limits: &Limits) -> Result<(), ValidationError> {
    check_limits(
        limits,
        limits::MAX_MEMORY_PAGES,
        "memory size must be at most 65536 pages (4GiB)",
    )
}

fn check_table_limits(limits: &Limits) -> Result<(), ValidationError> {
    check_limits(limits, u32::MAX, "table size must be at most 2^32-1")
}

fn check_imports(module: &Module) -> Result<(), ValidationError> {
    for import in &module.imports {
        match &import.external_kind {
            ExternalKind::Function(type_idx) => {
                check_type_index(module, *type_idx)?;
            }
            ExternalKind::Table(table) => check_table_limits(&table.limits)?,
            ExternalKind::Memory(memory) => check_memory_limits(&memory.limits)?,
            ExternalKind::Global(_) => {}
        }
    }
    Ok(())
}

fn check_definitions(module: &Module) -> Result<(), ValidationError> {
    for type_idx in &module.functions {
        check_type_index(module, *type_idx)?;
    }
    for table in &module.tables {
        check_table_limits(&table.limits)?;
    }
    if module.total_memories() > 1 {
        return Err(ValidationErrorKind::MultipleMemories.into());
    }
    for memory in &module.memories {
        check_memory_limits(&memory.limits)?;
    }
    Ok(())
}

/// Functions that may be referenced with `ref.func` inside bodies: those
/// named by an element segment, an export, or a global initialiser.
fn declared_functions(module: &Module) -> HashSet<u32> {
    let exprs = module
        .globals
        .iter()
        .map(|g| &g.init)
        .chain(module.elements.iter().flat_map(|e| e.init.iter()));
    let mut declared: HashSet<u32> = exprs
        .flat_map(|expr| expr.instructions.iter())
        .filter_map(|kind| match kind {
            InstructionKind::RefFunc { func_idx } => Some(*func_idx),
            _ => None,
        })
        .collect();
    declared.extend(module.exports.iter().filter_map(|e| match e.index {
        ExportIndex::Function(idx) => Some(idx),
        _ => None,
    }));
    declared
}

/// Type check a constant expression, which must leave exactly one value of
/// `expected` on the stack. `global.get` may only read imported immutable
/// globals.
fn check_const_expr(
    module: &Module,
    instructions: &[InstructionKind],
    expected: ValueType,
) -> Result<(), ValidationError> {
    let mut stack = Vec::with_capacity(1);
    for kind in instructions {
        let value_type = match kind {
            InstructionKind::I32Const { .. } => ValueType::I32,
            InstructionKind::I64Const { .. } => ValueType::I64,
            InstructionKind::F32Const { .. } => ValueType::F32,
            InstructionKind::F64Const { .. } => ValueType::F64,
            InstructionKind::RefNull { ref_type } => ValueType::from(*ref_type),
            InstructionKind::RefFunc { func_idx } => {
                if *func_idx >= module.total_functions() {
                    return Err(invalid_index(IndexSpace::Function, *func_idx));
                }
                ValueType::FuncRef
            }
            InstructionKind::GlobalGet { global_idx } => {
                if *global_idx >= module.num_imported_globals() {
                    return Err(invalid_index(IndexSpace::Global, *global_idx));
                }
                let global_type = module
                    .global_type(*global_idx)
                    .ok_or_else(|| invalid_index(IndexSpace::Global, *global_idx))?;
                if global_type.mutable {
                    return Err(ValidationErrorKind::NonConstantExpression.into());
                }
                global_type.value_type
            }
            _ => return Err(ValidationErrorKind::NonConstantExpression.into()),
        };
        stack.push(value_type);
    }
    if stack != [expected] {
        return Err(ValidationErrorKind::TypeMismatch.into());
    }
    Ok(())
}

fn check_globals(module: &Module) -> Result<(), ValidationError> {
    for global in &module.globals {
        check_const_expr(
            module,
            &global.init.instructions,
            global.global_type.value_type,
        )?;
    }
    Ok(())
}

fn check_exports(module: &Module) -> Result<(), ValidationError> {
    let mut names = HashSet::with_capacity(module.exports.len());
    for export in &module.exports {
        if !names.insert(export.name.as_str()) {
            return Err(ValidationErrorKind::DuplicateExport {
                name: export.name.clone(),
            }
            .into());
        }
        let (space, index, bound) = match export.index {
            ExportIndex::Function(idx) => (IndexSpace::Function, idx, module.total_functions()),
            ExportIndex::Table(idx) => (IndexSpace::Table, idx, module.total_tables()),
            ExportIndex::Memory(idx) => (IndexSpace::Memory, idx, module.total_memories()),
            ExportIndex::Global(idx) => (IndexSpace::Global, idx, module.total_globals()),
        };
        if index >= bound {
            return Err(invalid_index(space, index));
        }
    }
    Ok(())
}

fn check_start(module: &Module) -> Result<(), ValidationError> {
    let Some(start) = module.start else {
        return Ok(());
    };
    let func_type = module
        .func_type(start)
        .ok_or_else(|| invalid_index(IndexSpace::Function, start))?;
    if !func_type.parameters.is_empty() || !func_type.return_types.is_empty() {
        return Err(ValidationErrorKind::InvalidStartFunction.into());
    }
    Ok(())
}

fn check_elements(module: &Module) -> Result<(), ValidationError> {
    for element in &module.elements {
        let elem_type = ValueType::from(element.ref_type);
        for expr in &element.init {
            check_const_expr(module, &expr.instructions, elem_type)?;
        }
        if let ElementMode::Active {
            table_index,
            offset,
        } = &element.mode
        {
            let table = module
                .table_type(*table_index)
                .ok_or_else(|| invalid_index(IndexSpace::Table, *table_index))?;
            if table.ref_type != element.ref_type {
                return Err(ValidationErrorKind::TypeMismatch.into());
            }
            check_const_expr(module, &offset.instructions, ValueType::I32)?;
        }
    }
    Ok(())
}

fn check_data(module: &Module) -> Result<(), ValidationError> {
    for data in &module.data {
        if let DataMode::Active {
            memory_index,
            offset,
        } = &data.mode
        {
            if module.memory_type(*memory_index).is_none() {
                return Err(invalid_index(IndexSpace::Memory, *memory_index));
            }
            check_const_expr(module, &offset.instructions, ValueType::I32)?;
        }
    }
    Ok(())
}

/// Reference type of a table, for table instructions in bodies.
pub(crate) fn table_ref_type(module: &Module, table_idx: u32) -> Result<RefType, ValidationError> {
    module
        .table_type(table_idx)
        .map(|t| t.ref_type)
        .ok_or_else(|| invalid_index(IndexSpace::Table, table_idx))
}
