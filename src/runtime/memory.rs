//! WebAssembly linear memory implementation
//!
//! All access is bounds-checked before touching the underlying bytes.
//! Addresses are taken as `u64` so that an effective address (an `i32`
//! base plus a static offset) can never wrap around.
//!
//! - Page size: 64KiB
//! - Address space: 32-bit (at most 65536 pages)
//! - Out-of-bounds access traps; failed growth returns -1 and does not

use super::{RuntimeError, TrapKind};
use crate::parser::limits::{MAX_MEMORY_PAGES, PAGE_SIZE};
use crate::parser::module::{Limits, MemoryType};
use byteorder::{ByteOrder, LittleEndian};
use std::ops::Range;

/// A WebAssembly linear memory instance
#[derive(Debug)]
pub struct Memory {
    /// The memory contents, always a whole number of pages
    data: Vec<u8>,

    /// Maximum size in pages (None = bounded only by the address space)
    max_pages: Option<u32>,
}

impl Memory {
    /// Create a zero-filled memory with the minimum size of `memory_type`.
    ///
    /// # Errors
    /// - Minimum exceeds maximum, or either exceeds 65536 pages
    /// - The host cannot allocate the initial pages
    pub fn new(memory_type: MemoryType) -> Result<Self, RuntimeError> {
        let Limits { min, max } = memory_type.limits;
        if min > MAX_MEMORY_PAGES || max.is_some_and(|max| max > MAX_MEMORY_PAGES || min > max) {
            return Err(RuntimeError::ResourceLimit(format!(
                "invalid memory limits {}",
                memory_type.limits
            )));
        }

        let mut data = Vec::new();
        let initial_bytes = min as usize * PAGE_SIZE;
        data.try_reserve_exact(initial_bytes).map_err(|_| {
            RuntimeError::ResourceLimit(format!("cannot allocate {min} memory pages"))
        })?;
        data.resize(initial_bytes, 0);

        Ok(Memory {
            data,
            max_pages: max,
        })
    }

    /// Get the current memory size in pages
    pub fn size(&self) -> u32 {
        (self.data.len() / PAGE_SIZE) as u32
    }

    /// Get the maximum memory size in pages (None = unbounded)
    pub fn max_pages(&self) -> Option<u32> {
        self.max_pages
    }

    /// Current type of this memory, as seen by an importing module
    pub fn memory_type(&self) -> MemoryType {
        MemoryType {
            limits: Limits::new(self.size(), self.max_pages),
        }
    }

    /// Whole contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Grow memory by the specified number of pages
    ///
    /// Returns the previous size in pages, or -1 if growth fails. Growth
    /// never traps.
    pub fn grow(&mut self, delta_pages: u32) -> i32 {
        let current = self.size();

        let Some(new_pages) = current.checked_add(delta_pages) else {
            return -1;
        };
        if new_pages > self.max_pages.unwrap_or(MAX_MEMORY_PAGES) {
            return -1;
        }

        let new_bytes = new_pages as usize * PAGE_SIZE;
        match self.data.try_reserve_exact(new_bytes - self.data.len()) {
            Ok(()) => {
                self.data.resize(new_bytes, 0);
                current as i32
            }
            Err(_) => -1,
        }
    }

    /// The byte range `[addr, addr + len)`, if it lies within memory
    #[inline]
    fn range(&self, addr: u64, len: usize) -> Result<Range<usize>, RuntimeError> {
        let end = addr
            .checked_add(len as u64)
            .ok_or(TrapKind::OutOfBoundsMemory)?;
        if end > self.data.len() as u64 {
            return Err(TrapKind::OutOfBoundsMemory.into());
        }
        Ok(addr as usize..end as usize)
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8, RuntimeError> {
        let range = self.range(addr, 1)?;
        Ok(self.data[range.start])
    }

    pub fn read_u16(&self, addr: u64) -> Result<u16, RuntimeError> {
        let range = self.range(addr, 2)?;
        Ok(LittleEndian::read_u16(&self.data[range]))
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32, RuntimeError> {
        let range = self.range(addr, 4)?;
        Ok(LittleEndian::read_u32(&self.data[range]))
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64, RuntimeError> {
        let range = self.range(addr, 8)?;
        Ok(LittleEndian::read_u64(&self.data[range]))
    }

    /// Bit-exact: NaN payloads are preserved
    pub fn read_f32(&self, addr: u64) -> Result<f32, RuntimeError> {
        Ok(f32::from_bits(self.read_u32(addr)?))
    }

    pub fn read_f64(&self, addr: u64) -> Result<f64, RuntimeError> {
        Ok(f64::from_bits(self.read_u64(addr)?))
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> Result<(), RuntimeError> {
        let range = self.range(addr, 1)?;
        self.data[range.start] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, addr: u64, value: u16) -> Result<(), RuntimeError> {
        let range = self.range(addr, 2)?;
        LittleEndian::write_u16(&mut self.data[range], value);
        Ok(())
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), RuntimeError> {
        let range = self.range(addr, 4)?;
        LittleEndian::write_u32(&mut self.data[range], value);
        Ok(())
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), RuntimeError> {
        let range = self.range(addr, 8)?;
        LittleEndian::write_u64(&mut self.data[range], value);
        Ok(())
    }

    pub fn write_f32(&mut self, addr: u64, value: f32) -> Result<(), RuntimeError> {
        self.write_u32(addr, value.to_bits())
    }

    pub fn write_f64(&mut self, addr: u64, value: f64) -> Result<(), RuntimeError> {
        self.write_u64(addr, value.to_bits())
    }

    /// Read a slice of bytes from memory
    pub fn read_bytes(&self, addr: u64, len: usize) -> Result<&[u8], RuntimeError> {
        let range = self.range(addr, len)?;
        Ok(&self.data[range])
    }

    /// Write a slice of bytes to memory. Nothing is written unless the
    /// whole range is in bounds.
    pub fn write_bytes(&mut self, addr: u64, bytes: &[u8]) -> Result<(), RuntimeError> {
        let range = self.range(addr, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// `memory.fill`
    pub fn fill(&mut self, dst: u32, value: u8, len: u32) -> Result<(), RuntimeError> {
        let range = self.range(dst as u64, len as usize)?;
        self.data[range].fill(value);
        Ok(())
    }

    /// `memory.copy`; the ranges may overlap
    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), RuntimeError> {
        let src_range = self.range(src as u64, len as usize)?;
        let dst_range = self.range(dst as u64, len as usize)?;
        self.data.copy_within(src_range, dst_range.start);
        Ok(())
    }

    /// `memory.init`: copy `len` bytes of `segment` starting at `src`
    pub fn init(&mut self, dst: u32, segment: &[u8], src: u32, len: u32) -> Result<(), RuntimeError> {
        let src_end = src as u64 + len as u64;
        if src_end > segment.len() as u64 {
            return Err(TrapKind::OutOfBoundsMemory.into());
        }
        self.write_bytes(dst as u64, &segment[src as usize..src_end as usize])
    }
}
