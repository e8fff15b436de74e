//! Heap of uniform memory cells
//!
//! The heap is a fixed array of cells addressed by integer handle. Handle 0
//! is reserved for the null reference, valid object handles are
//! `1 .. size`. Cells are created once and never destroyed, only cleared
//! and reused by the allocator.

mod allocator;
mod cell;

pub use allocator::Allocator;
pub use cell::{is_reference_word, Handle, MemoryCell, Word, NULL};

use std::ops::Range;

use crate::vm::{VMError, VMResult};

/// The whole heap of the VM
#[derive(Debug)]
pub struct Heap {
    /// Cells for handles `1 .. size`; `cells[i - 1]` has position `i`
    cells: Box<[MemoryCell]>,
    /// Slots per cell
    cell_size: usize,
}

impl Heap {
    /// Create a heap of `size` cells (counting the reserved null index),
    /// each with `cell_size` slots.
    ///
    /// A `size` of 0 is treated as 1, i.e. a heap with no usable cells.
    pub fn new(
        size: usize,
        cell_size: usize,
    ) -> Self {
        // We intentionally start at 1, handle 0 is the null reference.
        let cells = (1..size.max(1))
            .map(|position| MemoryCell::new(cell_size, position))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { cells, cell_size }
    }

    /// Cell count including the reserved null index.
    #[inline]
    pub fn size(&self) -> usize {
        self.cells.len() + 1
    }

    /// Slots per cell.
    #[inline]
    pub fn cell_size(&self) -> usize {
        self.cell_size
    }

    /// Whether `handle` names a real cell.
    #[inline]
    pub fn contains(
        &self,
        handle: Handle,
    ) -> bool {
        handle >= 1 && handle < self.size()
    }

    /// Get the cell stored under `index`.
    pub fn cell(
        &self,
        index: Handle,
    ) -> VMResult<&MemoryCell> {
        if !self.contains(index) {
            return Err(VMError::IndexOutOfRange {
                index,
                lower: 1,
                upper: self.size(),
            });
        }
        Ok(&self.cells[index - 1])
    }

    /// All valid object handles.
    pub fn handles(&self) -> Range<Handle> {
        1..self.size()
    }

    /// Iterate over all cells in handle order.
    pub fn cells(&self) -> impl Iterator<Item = &MemoryCell> {
        self.cells.iter()
    }
}

#[cfg(test)]
mod tests;
