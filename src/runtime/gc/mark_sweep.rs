//! Stop-the-world mark-sweep
//!
//! Free cells live on a free list. When it runs dry the collector stops all
//! mutator threads, marks everything reachable from the roots by walking
//! reference slots, and sweeps every allocated but unmarked cell back onto
//! the free list.

use smallvec::SmallVec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Binding, GCState, GCStats};
use crate::runtime::memory::{Allocator, Handle, Heap};
use crate::runtime::roots::RootList;
use crate::vm::{VMError, VMResult};

/// Mark-sweep collector over a free list
#[derive(Debug)]
pub struct MarkSweepAllocator {
    binding: Option<Binding>,
    /// Free handles; the lowest handle is popped first
    free: Vec<Handle>,
    /// Handed out and not yet swept, indexed by handle
    allocated: Vec<bool>,
    /// Mark bits of the current cycle, indexed by handle
    marks: Vec<bool>,
    state: GCState,
    stats: GCStats,
    max_pause: Duration,
}

impl MarkSweepAllocator {
    pub fn new() -> Self {
        Self::with_max_pause(Duration::from_millis(10))
    }

    pub fn with_max_pause(max_pause: Duration) -> Self {
        Self {
            binding: None,
            free: Vec::new(),
            allocated: Vec::new(),
            marks: Vec::new(),
            state: GCState::Idle,
            stats: GCStats::default(),
            max_pause,
        }
    }

    pub fn state(&self) -> GCState {
        self.state
    }

    /// Cells currently on the free list.
    pub fn free_cells(&self) -> usize {
        self.free.len()
    }

    /// Mark everything reachable from `roots`.
    fn mark(
        &mut self,
        heap: &Heap,
        roots: Vec<Handle>,
    ) -> VMResult<usize> {
        self.marks.fill(false);
        let mut worklist: SmallVec<[Handle; 32]> = SmallVec::new();
        let mut marked = 0;

        for root in roots {
            if heap.contains(root) && !self.marks[root] {
                self.marks[root] = true;
                worklist.push(root);
            }
        }
        while let Some(handle) = worklist.pop() {
            marked += 1;
            for child in heap.cell(handle)?.references() {
                // Slots holding garbage beyond the heap are not followed.
                if heap.contains(child) && !self.marks[child] {
                    self.marks[child] = true;
                    worklist.push(child);
                }
            }
        }
        Ok(marked)
    }

    /// Return allocated, unmarked cells to the free list.
    fn sweep(
        &mut self,
        heap: &Heap,
    ) -> usize {
        let mut reclaimed = 0;
        for handle in heap.handles().rev() {
            if self.allocated[handle] && !self.marks[handle] {
                self.allocated[handle] = false;
                self.free.push(handle);
                reclaimed += 1;
            }
        }
        // Keep handing out low handles first.
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        reclaimed
    }
}

impl Default for MarkSweepAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for MarkSweepAllocator {
    fn initialize(
        &mut self,
        heap: Arc<Heap>,
        roots: Arc<dyn RootList>,
    ) -> VMResult<()> {
        let size = heap.size();
        Binding::bind(&mut self.binding, Arc::clone(&heap), roots)?;
        self.free = heap.handles().rev().collect();
        self.allocated = vec![false; size];
        self.marks = vec![false; size];
        debug!("mark-sweep initialized over {} cells", size - 1);
        Ok(())
    }

    fn allocate_object(&mut self) -> VMResult<Handle> {
        Binding::get(&self.binding)?;
        if self.free.is_empty() {
            self.collect()?;
        }
        let Some(handle) = self.free.pop() else {
            warn!(
                "out of memory after collection #{}",
                self.stats.collections
            );
            return Err(VMError::OutOfMemory);
        };
        let heap = &Binding::get(&self.binding)?.heap;
        heap.cell(handle)?.clear();
        self.allocated[handle] = true;
        self.stats.allocations += 1;
        Ok(handle)
    }

    fn collect(&mut self) -> VMResult<usize> {
        let binding = Binding::get(&self.binding)?.clone();
        let started = Instant::now();

        let result = {
            let pause = binding.roots.pause();
            pause.roots().and_then(|roots| {
                self.state = GCState::Marking;
                let marked = self.mark(&binding.heap, roots)?;
                self.state = GCState::Sweeping;
                Ok((marked, self.sweep(&binding.heap)))
            })
        };
        self.state = GCState::Idle;
        let (marked, reclaimed) = result?;

        let pause = started.elapsed();
        self.stats.record_pause(pause, reclaimed);
        info!(
            "collection #{}: {} live, {} reclaimed, pause {:?}",
            self.stats.collections, marked, reclaimed, pause
        );
        if pause > self.max_pause {
            warn!("pause {:?} exceeded limit {:?}", pause, self.max_pause);
        }
        Ok(reclaimed)
    }

    fn name(&self) -> &'static str {
        "mark-sweep"
    }

    fn stats(&self) -> GCStats {
        self.stats.clone()
    }
}
