//! WebAssembly Store - owns all runtime objects and gives them addresses
//!
//! Every function, table, memory, global and instance lives in the store
//! and is referred to by a typed address. Addresses that escape an
//! instantiation are never reused, so a `FuncAddr` held in a table or a
//! global stays valid for the lifetime of the store, across module
//! boundaries.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                    Store                      │
//! │  functions  [0]: Host { print }               │
//! │             [1]: Wasm { instance: 0, func 1 } │
//! │  memories   [0]: Rc<RefCell<Memory>>          │
//! │  tables     [0]: Rc<RefCell<Table>>           │
//! │  globals    [0]: Rc<Global>                   │
//! │  instances  [0]: module_a                     │
//! │             [1]: module_b (imports from a)    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Memories, tables and globals sit behind shared handles so an importing
//! instance aliases the exporter's object instead of copying it. Execution
//! only needs `&Store`; all mutation goes through those handles.

use super::config::EngineConfig;
use super::executor::Executor;
use super::global::Global;
use super::imports::{Extern, ImportObject};
use super::instance::Instance;
use super::link::{eval_const, resolve_import, LinkError, Segment};
use super::{Memory, RuntimeError, Table, Trap, Value};
use crate::parser::module::{DataMode, ElementMode, FunctionType, GlobalType, MemoryType, TableType};
use crate::parser::validate::ValidatedModule;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Global function address - index into the Store's function space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncAddr(pub usize);

/// Global memory address - index into the Store's memory registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryAddr(pub usize);

/// Global table address - index into the Store's table registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableAddr(pub usize);

/// Global address - index into the Store's global registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalAddr(pub usize);

/// Instance address - index into the Store's instance registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceAddr(pub usize);

/// Shared memory instance; importers and the exporter see the same bytes
pub type SharedMemory = Rc<RefCell<Memory>>;

/// Shared table instance
pub type SharedTable = Rc<RefCell<Table>>;

/// Shared global cell
pub type SharedGlobal = Rc<Global>;

/// Host function implementation. Receives the arguments and returns the
/// results, or a trap that aborts the calling wasm code.
pub type HostFunc = Rc<dyn Fn(&[Value]) -> Result<Vec<Value>, Trap>>;

/// A function instance in the Store
pub enum FunctionInstance {
    /// WebAssembly function defined by an instance's module
    Wasm {
        instance: InstanceAddr,
        /// Function index within the instance's function space (includes imports)
        func_idx: u32,
        func_type: FunctionType,
    },
    /// Host function - native Rust closure
    Host { func_type: FunctionType, func: HostFunc },
}

impl FunctionInstance {
    pub fn func_type(&self) -> &FunctionType {
        match self {
            FunctionInstance::Wasm { func_type, .. } | FunctionInstance::Host { func_type, .. } => func_type,
        }
    }
}

impl fmt::Debug for FunctionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionInstance::Wasm {
                instance,
                func_idx,
                func_type,
            } => f
                .debug_struct("Wasm")
                .field("instance", instance)
                .field("func_idx", func_idx)
                .field("func_type", func_type)
                .finish(),
            FunctionInstance::Host { func_type, .. } => {
                f.debug_struct("Host").field("func_type", func_type).finish_non_exhaustive()
            }
        }
    }
}

/// The WebAssembly Store - owns all instances and provides execution context
#[derive(Debug, Default)]
pub struct Store {
    functions: Vec<FunctionInstance>,
    memories: Vec<SharedMemory>,
    tables: Vec<SharedTable>,
    globals: Vec<SharedGlobal>,
    instances: Vec<Instance>,
    config: EngineConfig,
}

impl Store {
    /// Create a new empty Store with the default engine configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Store {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn allocate_function(&mut self, func: FunctionInstance) -> FuncAddr {
        let addr = FuncAddr(self.functions.len());
        self.functions.push(func);
        addr
    }

    /// Register a host function so it can be imported or invoked
    pub fn allocate_host_function<F>(&mut self, func_type: FunctionType, func: F) -> FuncAddr
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, Trap> + 'static,
    {
        self.allocate_function(FunctionInstance::Host {
            func_type,
            func: Rc::new(func),
        })
    }

    /// Allocate a zero-filled memory at its minimum size
    pub fn allocate_memory(&mut self, memory_type: MemoryType) -> Result<MemoryAddr, RuntimeError> {
        let memory = Memory::new(memory_type)?;
        let addr = MemoryAddr(self.memories.len());
        self.memories.push(Rc::new(RefCell::new(memory)));
        Ok(addr)
    }

    /// Allocate a table of null references at its minimum size
    pub fn allocate_table(&mut self, table_type: TableType) -> Result<TableAddr, RuntimeError> {
        let table = Table::new(table_type)?;
        let addr = TableAddr(self.tables.len());
        self.tables.push(Rc::new(RefCell::new(table)));
        Ok(addr)
    }

    pub fn allocate_global(&mut self, global_type: GlobalType, value: Value) -> Result<GlobalAddr, RuntimeError> {
        let global = Global::new(global_type, value)?;
        let addr = GlobalAddr(self.globals.len());
        self.globals.push(Rc::new(global));
        Ok(addr)
    }

    pub fn function(&self, addr: FuncAddr) -> Option<&FunctionInstance> {
        self.functions.get(addr.0)
    }

    pub fn function_type(&self, addr: FuncAddr) -> Option<&FunctionType> {
        self.function(addr).map(FunctionInstance::func_type)
    }

    pub fn memory(&self, addr: MemoryAddr) -> Option<&SharedMemory> {
        self.memories.get(addr.0)
    }

    pub fn table(&self, addr: TableAddr) -> Option<&SharedTable> {
        self.tables.get(addr.0)
    }

    pub fn global(&self, addr: GlobalAddr) -> Option<&SharedGlobal> {
        self.globals.get(addr.0)
    }

    /// A live instance. Instances discarded by a failed instantiation are
    /// not returned.
    pub fn instance(&self, addr: InstanceAddr) -> Option<&Instance> {
        self.instances.get(addr.0).filter(|instance| !instance.is_discarded())
    }

    /// The instance that defines a function, live or discarded
    pub(crate) fn defining_instance(&self, addr: InstanceAddr) -> Option<&Instance> {
        self.instances.get(addr.0)
    }

    /// Instantiate a validated module against `imports`.
    ///
    /// Imports are resolved first, then tables and memories are allocated,
    /// globals initialised, active element and data segments applied in
    /// order, and finally the start function runs.
    ///
    /// A failure before any segment is applied leaves the store as it was.
    /// From the first segment on the instance is committed: if a segment
    /// is out of bounds or the start function traps, the instance is
    /// discarded so the host can no longer reach it, but writes already
    /// made to imported tables and memories stay, and the functions they
    /// reference remain callable.
    pub fn instantiate(
        &mut self,
        module: impl Into<Rc<ValidatedModule>>,
        imports: &ImportObject,
    ) -> Result<InstanceAddr, LinkError> {
        let validated: Rc<ValidatedModule> = module.into();
        let instance_addr = InstanceAddr(self.instances.len());

        let watermark = self.watermark();
        let instance = match self.allocate_instance(validated, imports, instance_addr) {
            Ok(instance) => instance,
            Err(e) => {
                self.rollback(watermark);
                return Err(e);
            }
        };
        self.instances.push(instance);

        if let Err(e) = self.initialize_instance(instance_addr) {
            debug!(instance = instance_addr.0, error = %e, "instantiation failed, instance discarded");
            self.instances[instance_addr.0].discard();
            return Err(e);
        }

        debug!(instance = instance_addr.0, "instantiated module");
        Ok(instance_addr)
    }

    /// Resolve imports and allocate everything the module defines. Nothing
    /// allocated here is visible outside the store until the instance is
    /// pushed.
    fn allocate_instance(
        &mut self,
        validated: Rc<ValidatedModule>,
        imports: &ImportObject,
        instance_addr: InstanceAddr,
    ) -> Result<Instance, LinkError> {
        let module = validated.module();

        let mut func_addrs = Vec::new();
        let mut table_addrs = Vec::new();
        let mut memory_addrs = Vec::new();
        let mut global_addrs = Vec::new();

        for import in &module.imports {
            match resolve_import(self, module, import, imports)? {
                Extern::Func(addr) => func_addrs.push(addr),
                Extern::Table(addr) => table_addrs.push(addr),
                Extern::Memory(addr) => memory_addrs.push(addr),
                Extern::Global(addr) => global_addrs.push(addr),
            }
        }
        debug!(imports = module.imports.len(), "imports resolved");

        let num_imported = func_addrs.len() as u32;
        for (i, type_idx) in module.functions.iter().enumerate() {
            let func_type = module.types[*type_idx as usize].clone();
            func_addrs.push(self.allocate_function(FunctionInstance::Wasm {
                instance: instance_addr,
                func_idx: num_imported + i as u32,
                func_type,
            }));
        }
        for table_type in &module.tables {
            table_addrs.push(self.allocate_table(*table_type)?);
        }
        for memory_type in &module.memories {
            memory_addrs.push(self.allocate_memory(*memory_type)?);
        }
        for global in &module.globals {
            let value = eval_const(&global.init, self, &func_addrs, &global_addrs)?;
            global_addrs.push(self.allocate_global(global.global_type, value)?);
        }

        let mut elements = Vec::with_capacity(module.elements.len());
        for element in &module.elements {
            let values = element
                .init
                .iter()
                .map(|expr| eval_const(expr, self, &func_addrs, &global_addrs))
                .collect::<Result<Vec<_>, _>>()?;
            elements.push(values);
        }

        Ok(Instance::new(
            validated,
            func_addrs,
            table_addrs,
            memory_addrs,
            global_addrs,
            elements,
        ))
    }

    /// Apply active segments and run the start function of a pushed instance
    fn initialize_instance(&self, instance_addr: InstanceAddr) -> Result<(), LinkError> {
        let instance = &self.instances[instance_addr.0];
        let module = instance.module();

        for (idx, element) in module.elements.iter().enumerate() {
            let idx = idx as u32;
            match &element.mode {
                ElementMode::Active { table_index, offset } => {
                    let offset = eval_const(offset, self, instance.func_addrs(), instance.global_addrs())?;
                    let table = &self.tables[instance.table_addr(*table_index).0];
                    let segment = instance.element(idx).clone();
                    table
                        .borrow_mut()
                        .init(offset_u32(offset), &segment, 0, segment.len() as u32)
                        .map_err(|_| LinkError::InitOutOfBounds {
                            segment: Segment::Element(idx),
                        })?;
                    instance.drop_element(idx);
                }
                ElementMode::Declarative => instance.drop_element(idx),
                ElementMode::Passive => {}
            }
        }

        for (idx, data) in module.data.iter().enumerate() {
            let idx = idx as u32;
            if let DataMode::Active { memory_index, offset } = &data.mode {
                let offset = eval_const(offset, self, instance.func_addrs(), instance.global_addrs())?;
                let memory = &self.memories[instance.memory_addr(*memory_index).0];
                memory
                    .borrow_mut()
                    .write_bytes(offset_u32(offset) as u64, &data.init)
                    .map_err(|_| LinkError::InitOutOfBounds {
                        segment: Segment::Data(idx),
                    })?;
                instance.drop_data(idx);
            }
        }
        debug!(
            elements = module.elements.len(),
            data = module.data.len(),
            "segments applied"
        );

        if let Some(func_idx) = module.start {
            let start = instance.func_addr(func_idx);
            debug!(func = start.0, "running start function");
            match self.invoke(start, &[]) {
                Ok(_) => {}
                Err(RuntimeError::Trap(trap)) => return Err(LinkError::StartTrap(trap)),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn watermark(&self) -> Watermark {
        Watermark {
            functions: self.functions.len(),
            tables: self.tables.len(),
            memories: self.memories.len(),
            globals: self.globals.len(),
        }
    }

    /// Forget everything allocated since `mark`
    fn rollback(&mut self, mark: Watermark) {
        self.functions.truncate(mark.functions);
        self.tables.truncate(mark.tables);
        self.memories.truncate(mark.memories);
        self.globals.truncate(mark.globals);
    }

    /// Look up an export of an instance
    pub fn get_export(&self, instance: InstanceAddr, name: &str) -> Result<Extern, RuntimeError> {
        self.instance(instance)
            .ok_or(RuntimeError::UnknownInstance(instance.0))?
            .export(name)
            .ok_or_else(|| RuntimeError::UnknownExport(name.to_string()))
    }

    /// Invoke a function by address. Arguments must match the function's
    /// parameter types.
    pub fn invoke(&self, addr: FuncAddr, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        let func_type = self
            .function_type(addr)
            .ok_or(RuntimeError::UnknownFunction(addr.0))?;
        let actual: Vec<_> = args.iter().map(Value::typ).collect();
        if actual != func_type.parameters {
            return Err(RuntimeError::ArgumentMismatch {
                expected: func_type.parameters.clone(),
                actual,
            });
        }
        Executor::new(self).invoke(addr, args)
    }

    /// Invoke an exported function by name on a specific instance
    pub fn invoke_export(
        &self,
        instance: InstanceAddr,
        name: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, RuntimeError> {
        let addr = self
            .get_export(instance, name)?
            .as_func()
            .ok_or_else(|| RuntimeError::NotAFunction(name.to_string()))?;
        self.invoke(addr, args)
    }

    /// Make every export of `instance` importable as `as_name.<export>`
    pub fn register(
        &self,
        instance: InstanceAddr,
        as_name: &str,
        imports: &mut ImportObject,
    ) -> Result<(), RuntimeError> {
        let instance = self
            .instance(instance)
            .ok_or(RuntimeError::UnknownInstance(instance.0))?;
        for (name, value) in instance.exports() {
            imports.add(as_name, name, value);
        }
        Ok(())
    }
}

/// Store sizes before an instantiation starts allocating
#[derive(Debug, Clone, Copy)]
struct Watermark {
    functions: usize,
    tables: usize,
    memories: usize,
    globals: usize,
}

/// Segment offsets are i32 constants interpreted as unsigned
fn offset_u32(value: Value) -> u32 {
    value.as_i32().unwrap_or_default() as u32
}
