//! Per-thread frame stacks and their active sets

use indexmap::IndexSet;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::runtime::memory::Handle;

/// Lifecycle of one call activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Constructed, arguments not yet transferred
    Created,
    /// Running the method body
    Active,
    /// Body finished, result validated
    Returning,
    /// Off the stack; any further use fails
    Popped,
}

/// Roots and state of one call activation
#[derive(Debug)]
pub struct FrameRecord {
    /// Depth on the owning stack, 0 for the entry frame
    depth: usize,
    state: Mutex<FrameState>,
    /// Direct roots held by this frame
    active: Mutex<IndexSet<Handle>>,
}

impl FrameRecord {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            state: Mutex::new(FrameState::Created),
            active: Mutex::new(IndexSet::new()),
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn state(&self) -> FrameState {
        *self.state.lock()
    }

    pub fn set_state(
        &self,
        state: FrameState,
    ) {
        *self.state.lock() = state;
    }

    pub fn contains(
        &self,
        handle: Handle,
    ) -> bool {
        self.active.lock().contains(&handle)
    }

    /// Add a root. Returns false if it was already present.
    pub fn insert(
        &self,
        handle: Handle,
    ) -> bool {
        self.active.lock().insert(handle)
    }

    /// Drop a root. Returns false if it was not present.
    pub fn remove(
        &self,
        handle: Handle,
    ) -> bool {
        self.active.lock().shift_remove(&handle)
    }

    /// Snapshot of the active set in insertion order.
    pub fn handles(&self) -> Vec<Handle> {
        self.active.lock().iter().copied().collect()
    }

    pub fn clear(&self) {
        self.active.lock().clear();
    }
}

/// Call stack of one mutator thread
#[derive(Debug)]
pub struct ThreadStack {
    id: u64,
    frames: Mutex<Vec<Arc<FrameRecord>>>,
}

impl ThreadStack {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            frames: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Push a fresh frame and return it.
    pub fn push(&self) -> Arc<FrameRecord> {
        let mut frames = self.frames.lock();
        let record = Arc::new(FrameRecord::new(frames.len()));
        frames.push(Arc::clone(&record));
        record
    }

    /// Remove `record` from the stack, together with anything still above
    /// it, and mark them popped.
    pub fn pop(
        &self,
        record: &Arc<FrameRecord>,
    ) {
        let mut frames = self.frames.lock();
        if let Some(index) = frames.iter().rposition(|f| Arc::ptr_eq(f, record)) {
            for frame in frames.drain(index..) {
                frame.set_state(FrameState::Popped);
                frame.clear();
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Append every root held by any frame on this stack to `out`.
    pub fn collect_roots(
        &self,
        out: &mut Vec<Handle>,
    ) {
        for frame in self.frames.lock().iter() {
            out.extend(frame.handles());
        }
    }
}
