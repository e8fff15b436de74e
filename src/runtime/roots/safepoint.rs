//! Stop-the-world gate
//!
//! Mutator operations run inside a [`MutatorScope`]. A collector calls
//! [`SafepointGate::stop`] to close the gate: new scopes block, and `stop`
//! returns once every scope opened by another thread has been left. The
//! stopping thread itself may keep opening scopes, so collector code that
//! re-enters the mutator API does not deadlock on itself.

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use tracing::warn;

#[derive(Debug, Default)]
struct GateState {
    /// Thread holding the stop, if any
    stopped_by: Option<ThreadId>,
    /// Nested stop count of `stopped_by`
    stop_depth: usize,
    /// Open mutator scopes per thread
    open_scopes: HashMap<ThreadId, usize>,
}

impl GateState {
    fn foreign_scopes_open(
        &self,
        me: ThreadId,
    ) -> bool {
        self.open_scopes.keys().any(|&owner| owner != me)
    }
}

/// Global pause/resume primitive shared by all mutator threads
#[derive(Debug, Default)]
pub struct SafepointGate {
    state: Mutex<GateState>,
    changed: Condvar,
    /// Completed stop-the-world pauses
    pauses: AtomicUsize,
}

impl SafepointGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a mutator operation, waiting while another thread holds the stop.
    pub fn enter(&self) -> MutatorScope<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while matches!(state.stopped_by, Some(owner) if owner != me) {
            self.changed.wait(&mut state);
        }
        *state.open_scopes.entry(me).or_insert(0) += 1;
        MutatorScope { gate: self, thread: me }
    }

    fn leave(
        &self,
        thread: ThreadId,
    ) {
        let mut state = self.state.lock();
        if let Some(count) = state.open_scopes.get_mut(&thread) {
            *count -= 1;
            if *count == 0 {
                state.open_scopes.remove(&thread);
            }
        }
        if state.stopped_by.is_some() {
            self.changed.notify_all();
        }
    }

    /// Establish a quiescent point: block until no other thread is inside a
    /// mutator scope. Nested calls from the holding thread only count depth.
    pub fn stop(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.stopped_by {
                None => break,
                Some(owner) if owner == me => {
                    state.stop_depth += 1;
                    return;
                }
                Some(_) => self.changed.wait(&mut state),
            }
        }
        state.stopped_by = Some(me);
        state.stop_depth = 1;
        while state.foreign_scopes_open(me) {
            self.changed.wait(&mut state);
        }
    }

    /// Release one level of the stop held by the calling thread.
    pub fn resume(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.stopped_by != Some(me) {
            warn!("resume without matching stop on {:?}", me);
            return;
        }
        state.stop_depth -= 1;
        if state.stop_depth == 0 {
            state.stopped_by = None;
            self.pauses.fetch_add(1, Ordering::SeqCst);
            self.changed.notify_all();
        }
    }

    /// Whether the calling thread currently holds the stop.
    pub fn is_stopped_by_current(&self) -> bool {
        self.state.lock().stopped_by == Some(thread::current().id())
    }

    /// Whether any thread holds the stop.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped_by.is_some()
    }

    /// Number of open mutator scopes across all threads.
    pub fn open_scopes(&self) -> usize {
        self.state.lock().open_scopes.values().sum()
    }

    /// Completed pauses so far.
    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

/// RAII guard for one mutator operation
#[derive(Debug)]
pub struct MutatorScope<'a> {
    gate: &'a SafepointGate,
    thread: ThreadId,
}

impl Drop for MutatorScope<'_> {
    fn drop(&mut self) {
        self.gate.leave(self.thread);
    }
}
