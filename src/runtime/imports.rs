//! Import environment for instantiation
//!
//! An [`ImportObject`] maps `(module, name)` pairs to externs already
//! allocated in a [`Store`](super::Store). Imports are shared by reference:
//! an importing instance sees the same memory, table or global cell as the
//! exporter.

use super::store::{FuncAddr, GlobalAddr, MemoryAddr, TableAddr};
use std::collections::HashMap;

/// Anything a module can import or export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extern {
    Func(FuncAddr),
    Table(TableAddr),
    Memory(MemoryAddr),
    Global(GlobalAddr),
}

impl Extern {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Extern::Func(_) => "function",
            Extern::Table(_) => "table",
            Extern::Memory(_) => "memory",
            Extern::Global(_) => "global",
        }
    }

    pub fn as_func(&self) -> Option<FuncAddr> {
        match self {
            Extern::Func(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<MemoryAddr> {
        match self {
            Extern::Memory(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<TableAddr> {
        match self {
            Extern::Table(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<GlobalAddr> {
        match self {
            Extern::Global(addr) => Some(*addr),
            _ => None,
        }
    }
}

/// Container for the externs a module can import
#[derive(Debug, Clone, Default)]
pub struct ImportObject {
    externs: HashMap<(String, String), Extern>,
}

impl ImportObject {
    /// Create a new empty import object
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `module.name`, replacing any earlier binding
    pub fn add(&mut self, module: impl Into<String>, name: impl Into<String>, value: Extern) {
        self.externs.insert((module.into(), name.into()), value);
    }

    pub fn add_function(&mut self, module: impl Into<String>, name: impl Into<String>, addr: FuncAddr) {
        self.add(module, name, Extern::Func(addr));
    }

    pub fn add_table(&mut self, module: impl Into<String>, name: impl Into<String>, addr: TableAddr) {
        self.add(module, name, Extern::Table(addr));
    }

    pub fn add_memory(&mut self, module: impl Into<String>, name: impl Into<String>, addr: MemoryAddr) {
        self.add(module, name, Extern::Memory(addr));
    }

    pub fn add_global(&mut self, module: impl Into<String>, name: impl Into<String>, addr: GlobalAddr) {
        self.add(module, name, Extern::Global(addr));
    }

    pub fn get(&self, module: &str, name: &str) -> Option<Extern> {
        self.externs
            .get(&(module.to_string(), name.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.externs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.externs.is_empty()
    }
}
