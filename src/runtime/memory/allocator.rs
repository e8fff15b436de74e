//! Allocator interface for the harness
//!
//! This module defines the `Allocator` trait that a concrete memory
//! management strategy implements. The VM talks to exactly one allocator
//! for its whole lifetime.
//!
//! # Design Principles
//! - Two operations: `initialize` once, then `allocate_object`
//! - The allocator is the only component that decides a cell is reclaimable
//! - Collection work is bracketed by `RootList::pause` so the root set is
//!   consistent while it is read

use std::fmt;
use std::sync::Arc;

use super::{Handle, Heap};
use crate::runtime::gc::GCStats;
use crate::runtime::roots::RootList;
use crate::vm::VMResult;

/// Pluggable memory allocation (and garbage collection) strategy
///
/// # Contract
/// - `initialize` is called exactly once, before any allocation.
/// - `allocate_object` returns the handle of a cell that is not reachable,
///   directly or through reference slots, from the current roots, with all
///   slots cleared.
/// - When no cell can be produced even after collecting, it fails with
///   `VMError::OutOfMemory` and does not retry.
///
/// # Implementations
/// - `BumpAllocator`: hands out each cell once and never collects
/// - `MarkSweepAllocator`: stop-the-world mark-sweep over a free list
pub trait Allocator: Send + fmt::Debug {
    /// Bind the allocator to the heap it manages and the roots it must keep
    /// alive.
    fn initialize(
        &mut self,
        heap: Arc<Heap>,
        roots: Arc<dyn RootList>,
    ) -> VMResult<()>;

    /// Produce a cleared, unreachable cell.
    fn allocate_object(&mut self) -> VMResult<Handle>;

    /// Run a full collection now and return the number of cells reclaimed.
    /// Strategies that never collect reclaim nothing.
    fn collect(&mut self) -> VMResult<usize> {
        Ok(0)
    }

    /// Strategy name for reports and logs.
    fn name(&self) -> &'static str;

    /// Collection statistics so far.
    fn stats(&self) -> GCStats {
        GCStats::default()
    }
}
