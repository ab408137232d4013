//! WebAssembly table implementation
//!
//! Tables are typed vectors of references that back indirect calls. Every
//! slot holds a reference of the table's element type, null included.
//! Out-of-range accesses trap with
//! [`TrapKind::OutOfBoundsTable`](super::TrapKind::OutOfBoundsTable);
//! bulk operations check the whole range before changing anything.

use super::{RuntimeError, TrapKind, Value};
use crate::parser::limits::MAX_TABLE_SIZE;
use crate::parser::module::{Limits, RefType, TableType, ValueType};

/// A WebAssembly table - a typed vector of references
#[derive(Debug)]
pub struct Table {
    ref_type: RefType,
    elements: Vec<Value>,
    max: Option<u32>,
}

impl Table {
    /// Create a table of `table_type.limits.min` null references.
    pub fn new(table_type: TableType) -> Result<Self, RuntimeError> {
        let Limits { min, max } = table_type.limits;
        if min > MAX_TABLE_SIZE || max.is_some_and(|max| min > max) {
            return Err(RuntimeError::ResourceLimit(format!(
                "invalid table limits {}",
                table_type.limits
            )));
        }

        Ok(Table {
            ref_type: table_type.ref_type,
            elements: vec![Value::null(table_type.ref_type); min as usize],
            max,
        })
    }

    /// Get the current table size (number of elements)
    pub fn size(&self) -> u32 {
        self.elements.len() as u32
    }

    pub fn ref_type(&self) -> RefType {
        self.ref_type
    }

    /// Current type of this table, as seen by an importing module
    pub fn table_type(&self) -> TableType {
        TableType {
            ref_type: self.ref_type,
            limits: Limits::new(self.size(), self.max),
        }
    }

    pub fn get(&self, index: u32) -> Result<Value, RuntimeError> {
        self.elements
            .get(index as usize)
            .copied()
            .ok_or_else(|| TrapKind::OutOfBoundsTable.into())
    }

    /// Set the element at the given index
    ///
    /// # Errors
    ///
    /// - `OutOfBoundsTable` trap if the index is out of bounds
    /// - `TypeMismatch` if the value is not of the table's reference type
    pub fn set(&mut self, index: u32, value: Value) -> Result<(), RuntimeError> {
        self.check_element(&value)?;
        let slot = self
            .elements
            .get_mut(index as usize)
            .ok_or(TrapKind::OutOfBoundsTable)?;
        *slot = value;
        Ok(())
    }

    /// Grow the table by `delta` elements, filling new slots with `init`
    ///
    /// Returns the old size, or -1 if the table would exceed its maximum.
    pub fn grow(&mut self, delta: u32, init: Value) -> Result<i32, RuntimeError> {
        self.check_element(&init)?;
        let old_size = self.size();

        let Some(new_size) = old_size.checked_add(delta) else {
            return Ok(-1);
        };
        if new_size > self.max.unwrap_or(MAX_TABLE_SIZE).min(MAX_TABLE_SIZE) {
            return Ok(-1);
        }
        if self.elements.try_reserve(delta as usize).is_err() {
            return Ok(-1);
        }

        self.elements.resize(new_size as usize, init);
        Ok(old_size as i32)
    }

    /// `table.fill`
    pub fn fill(&mut self, start: u32, value: Value, len: u32) -> Result<(), RuntimeError> {
        self.check_element(&value)?;
        let range = self.range(start, len)?;
        self.elements[range].fill(value);
        Ok(())
    }

    /// `table.copy` within one table; the ranges may overlap
    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), RuntimeError> {
        let src_range = self.range(src, len)?;
        let dst_range = self.range(dst, len)?;
        self.elements.copy_within(src_range, dst_range.start);
        Ok(())
    }

    /// `table.copy` from another table
    pub fn copy_from(&mut self, dst: u32, source: &Table, src: u32, len: u32) -> Result<(), RuntimeError> {
        let src_range = source.range(src, len)?;
        let dst_range = self.range(dst, len)?;
        self.elements[dst_range].copy_from_slice(&source.elements[src_range]);
        Ok(())
    }

    /// `table.init`: copy `len` references of `segment` starting at `src`
    pub fn init(&mut self, dst: u32, segment: &[Value], src: u32, len: u32) -> Result<(), RuntimeError> {
        let src_end = src as u64 + len as u64;
        if src_end > segment.len() as u64 {
            return Err(TrapKind::OutOfBoundsTable.into());
        }
        let dst_range = self.range(dst, len)?;
        self.elements[dst_range].copy_from_slice(&segment[src as usize..src_end as usize]);
        Ok(())
    }

    fn range(&self, start: u32, len: u32) -> Result<std::ops::Range<usize>, RuntimeError> {
        let end = start as u64 + len as u64;
        if end > self.elements.len() as u64 {
            return Err(TrapKind::OutOfBoundsTable.into());
        }
        Ok(start as usize..end as usize)
    }

    fn check_element(&self, value: &Value) -> Result<(), RuntimeError> {
        let expected = ValueType::from(self.ref_type);
        if value.typ() != expected {
            return Err(RuntimeError::TypeMismatch {
                expected,
                actual: value.typ(),
            });
        }
        Ok(())
    }
}
