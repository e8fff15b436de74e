//! Root enumeration
//!
//! The root list is the union, over every mutator thread's frame stack and
//! every frame on it, of the handles that frame directly holds. It is not
//! materialized eagerly; [`RootList::enumerate`] walks the stacks on demand
//! and only gives a trustworthy answer between `stop_user_threads` and
//! `resume_user_threads`.

mod safepoint;
mod stack;

pub use safepoint::{MutatorScope, SafepointGate};
pub use stack::{FrameRecord, FrameState, ThreadStack};

use hashbrown::HashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::runtime::memory::Handle;
use crate::vm::{VMError, VMResult};

/// Everything in active use by running mutator threads
pub trait RootList: Send + Sync {
    /// Block until no mutator thread is in the middle of an operation.
    fn stop_user_threads(&self);

    /// Release the quiescent point taken by `stop_user_threads`.
    fn resume_user_threads(&self);

    /// Whether the calling thread holds the stop.
    fn is_stopped(&self) -> bool;

    /// Direct roots of all active frames. Duplicates are possible.
    ///
    /// Fails with `RootScanContractViolation` unless the calling thread is
    /// inside a stop/resume bracket.
    fn enumerate(&self) -> VMResult<Vec<Handle>>;
}

impl<'r> dyn RootList + 'r {
    /// Stop user threads until the returned guard is dropped.
    pub fn pause(&self) -> PauseGuard<'_> {
        self.stop_user_threads();
        PauseGuard { roots: self }
    }
}

/// Resumes user threads on drop, on every exit path
pub struct PauseGuard<'a> {
    roots: &'a (dyn RootList + 'a),
}

impl PauseGuard<'_> {
    /// Enumerate roots under this pause.
    pub fn roots(&self) -> VMResult<Vec<Handle>> {
        self.roots.enumerate()
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.roots.resume_user_threads();
    }
}

impl fmt::Debug for PauseGuard<'_> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PauseGuard").finish_non_exhaustive()
    }
}

/// Root list backed by the live frame stacks of every mutator thread
#[derive(Debug, Default)]
pub struct MutatorRoots {
    gate: SafepointGate,
    stacks: RwLock<HashMap<u64, Arc<ThreadStack>>>,
    next_stack_id: AtomicU64,
}

impl MutatorRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gate every mutator operation goes through.
    #[inline]
    pub fn gate(&self) -> &SafepointGate {
        &self.gate
    }

    /// Register a new, empty call stack for a mutator thread.
    pub fn register_stack(&self) -> Arc<ThreadStack> {
        let id = self.next_stack_id.fetch_add(1, Ordering::SeqCst);
        let stack = Arc::new(ThreadStack::new(id));
        self.stacks.write().insert(id, Arc::clone(&stack));
        stack
    }

    /// Forget a stack whose thread has finished.
    pub fn unregister_stack(
        &self,
        id: u64,
    ) {
        self.stacks.write().remove(&id);
    }

    /// Number of registered mutator stacks.
    pub fn thread_count(&self) -> usize {
        self.stacks.read().len()
    }
}

impl RootList for MutatorRoots {
    fn stop_user_threads(&self) {
        self.gate.stop();
    }

    fn resume_user_threads(&self) {
        self.gate.resume();
    }

    fn is_stopped(&self) -> bool {
        self.gate.is_stopped_by_current()
    }

    fn enumerate(&self) -> VMResult<Vec<Handle>> {
        if !self.gate.is_stopped_by_current() {
            return Err(VMError::RootScanContractViolation);
        }
        let mut roots = Vec::new();
        for stack in self.stacks.read().values() {
            stack.collect_roots(&mut roots);
        }
        Ok(roots)
    }
}
