//! Bump allocation with no collection
//!
//! Cells are handed out in handle order exactly once. Nothing is ever
//! reclaimed, so a program that allocates more than the heap holds runs out
//! of memory no matter how much it releases. Useful as the baseline a real
//! collector is measured against.

use std::sync::Arc;

use super::{Binding, GCStats};
use crate::runtime::memory::{Allocator, Handle, Heap};
use crate::runtime::roots::RootList;
use crate::vm::{VMError, VMResult};

/// Bump allocator over heap handles
#[derive(Debug, Default)]
pub struct BumpAllocator {
    binding: Option<Binding>,
    /// Next handle to hand out
    next: Handle,
    stats: GCStats,
}

impl BumpAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells not yet handed out.
    pub fn remaining(&self) -> usize {
        match &self.binding {
            Some(binding) => binding.heap.size().saturating_sub(self.next),
            None => 0,
        }
    }
}

impl Allocator for BumpAllocator {
    fn initialize(
        &mut self,
        heap: Arc<Heap>,
        roots: Arc<dyn RootList>,
    ) -> VMResult<()> {
        Binding::bind(&mut self.binding, heap, roots)?;
        self.next = 1;
        Ok(())
    }

    fn allocate_object(&mut self) -> VMResult<Handle> {
        let heap = &Binding::get(&self.binding)?.heap;
        if self.next >= heap.size() {
            return Err(VMError::OutOfMemory);
        }
        let handle = self.next;
        heap.cell(handle)?.clear();
        self.next += 1;
        self.stats.allocations += 1;
        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "bump"
    }

    fn stats(&self) -> GCStats {
        self.stats.clone()
    }
}
