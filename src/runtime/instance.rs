//! WebAssembly module instance
//!
//! An instance binds a validated module to store addresses. Index spaces
//! are resolved once at instantiation, so a function, table, memory or
//! global index maps straight to the store slot behind it.

use super::imports::Extern;
use super::store::{FuncAddr, GlobalAddr, MemoryAddr, TableAddr};
use super::Value;
use crate::parser::module::{ExportIndex, Module};
use crate::parser::validate::{FunctionCode, ValidatedModule};
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// A WebAssembly module instance
#[derive(Debug)]
pub struct Instance {
    module: Rc<ValidatedModule>,
    func_addrs: Vec<FuncAddr>,
    table_addrs: Vec<TableAddr>,
    memory_addrs: Vec<MemoryAddr>,
    global_addrs: Vec<GlobalAddr>,
    /// Evaluated element segments; a dropped segment is empty
    elements: Vec<RefCell<Vec<Value>>>,
    dropped_data: Vec<Cell<bool>>,
    exports: HashMap<String, Extern>,
    discarded: bool,
}

impl Instance {
    pub(crate) fn new(
        module: Rc<ValidatedModule>,
        func_addrs: Vec<FuncAddr>,
        table_addrs: Vec<TableAddr>,
        memory_addrs: Vec<MemoryAddr>,
        global_addrs: Vec<GlobalAddr>,
        elements: Vec<Vec<Value>>,
    ) -> Self {
        let exports = module
            .module()
            .exports
            .iter()
            .map(|export| {
                let value = match export.index {
                    ExportIndex::Function(idx) => Extern::Func(func_addrs[idx as usize]),
                    ExportIndex::Table(idx) => Extern::Table(table_addrs[idx as usize]),
                    ExportIndex::Memory(idx) => Extern::Memory(memory_addrs[idx as usize]),
                    ExportIndex::Global(idx) => Extern::Global(global_addrs[idx as usize]),
                };
                (export.name.clone(), value)
            })
            .collect();
        let dropped_data = module.module().data.iter().map(|_| Cell::new(false)).collect();

        Instance {
            module,
            func_addrs,
            table_addrs,
            memory_addrs,
            global_addrs,
            elements: elements.into_iter().map(RefCell::new).collect(),
            dropped_data,
            exports,
            discarded: false,
        }
    }

    pub fn module(&self) -> &Module {
        self.module.module()
    }

    pub fn validated(&self) -> &Rc<ValidatedModule> {
        &self.module
    }

    /// Compiled body of a function defined by this instance's module
    pub fn code(&self, func_idx: u32) -> Option<&FunctionCode> {
        self.module.function(func_idx)
    }

    pub fn export(&self, name: &str) -> Option<Extern> {
        self.exports.get(name).copied()
    }

    /// All exports, in no particular order
    pub fn exports(&self) -> impl Iterator<Item = (&str, Extern)> + '_ {
        self.exports.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Whether instantiation failed after this instance was committed.
    /// A discarded instance still backs any of its functions that were
    /// written into imported tables.
    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub(crate) fn discard(&mut self) {
        self.discarded = true;
    }

    pub(crate) fn func_addrs(&self) -> &[FuncAddr] {
        &self.func_addrs
    }

    pub(crate) fn global_addrs(&self) -> &[GlobalAddr] {
        &self.global_addrs
    }

    // Index lookups below take indices the validator has already checked.

    pub fn func_addr(&self, func_idx: u32) -> FuncAddr {
        self.func_addrs[func_idx as usize]
    }

    pub fn table_addr(&self, table_idx: u32) -> TableAddr {
        self.table_addrs[table_idx as usize]
    }

    pub fn memory_addr(&self, memory_idx: u32) -> MemoryAddr {
        self.memory_addrs[memory_idx as usize]
    }

    pub fn global_addr(&self, global_idx: u32) -> GlobalAddr {
        self.global_addrs[global_idx as usize]
    }

    pub(crate) fn element(&self, elem_idx: u32) -> Ref<'_, Vec<Value>> {
        self.elements[elem_idx as usize].borrow()
    }

    pub(crate) fn drop_element(&self, elem_idx: u32) {
        self.elements[elem_idx as usize].borrow_mut().clear();
    }

    /// Bytes of a data segment, empty once dropped
    pub(crate) fn data(&self, data_idx: u32) -> &[u8] {
        if self.dropped_data[data_idx as usize].get() {
            &[]
        } else {
            &self.module().data[data_idx as usize].init
        }
    }

    pub(crate) fn drop_data(&self, data_idx: u32) {
        self.dropped_data[data_idx as usize].set(true);
    }
}
