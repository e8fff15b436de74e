//! VM call frames
//!
//! A [`FrameEnvironment`] is the mutator-facing API of one call activation.
//! It owns the frame's active set, the handles this activation holds
//! directly, and checks on every access that the mutator only touches
//! objects it provably holds. Deep reachability is not tracked here; that is
//! the collector's business.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::executor::VmShared;
use super::method::UserMethod;
use crate::runtime::memory::{Handle, Heap, Word, NULL};
use crate::runtime::roots::{FrameRecord, FrameState, MutatorScope, ThreadStack};
use crate::vm::{VMError, VMResult};

/// Environment of a method frame
///
/// Cloning yields another handle to the same frame. Using any handle after
/// the frame was popped fails with `VMError::InactiveFrame`.
#[derive(Clone)]
pub struct FrameEnvironment {
    vm: Arc<VmShared>,
    stack: Arc<ThreadStack>,
    record: Arc<FrameRecord>,
}

/// Pops a frame if the owner unwinds before popping it explicitly.
struct PopOnDrop<'a> {
    stack: &'a ThreadStack,
    record: &'a Arc<FrameRecord>,
}

impl Drop for PopOnDrop<'_> {
    fn drop(&mut self) {
        self.stack.pop(self.record);
    }
}

impl FrameEnvironment {
    pub(crate) fn new(
        vm: Arc<VmShared>,
        stack: Arc<ThreadStack>,
        record: Arc<FrameRecord>,
    ) -> Self {
        Self { vm, stack, record }
    }

    pub(crate) fn record(&self) -> &Arc<FrameRecord> {
        &self.record
    }

    /// Lifecycle state of this frame.
    pub fn state(&self) -> FrameState {
        self.record.state()
    }

    /// Depth on the thread's call stack, 0 for the entry frame.
    pub fn depth(&self) -> usize {
        self.record.depth()
    }

    /// Whether `handle` is a direct root of this frame.
    pub fn is_active(
        &self,
        handle: Handle,
    ) -> bool {
        self.record.contains(handle)
    }

    /// Direct roots of this frame in the order they were acquired.
    pub fn active_handles(&self) -> Vec<Handle> {
        self.record.handles()
    }

    /// The heap this frame's objects live in.
    pub fn heap(&self) -> &Heap {
        &self.vm.heap
    }

    /// Open a mutator scope and check the frame can still be used.
    fn enter(&self) -> VMResult<MutatorScope<'_>> {
        let scope = self.vm.roots.gate().enter();
        match self.record.state() {
            FrameState::Active => Ok(scope),
            _ => Err(VMError::InactiveFrame(self.record.depth())),
        }
    }

    fn require_active(
        &self,
        object: Handle,
    ) -> VMResult<()> {
        if self.record.contains(object) {
            Ok(())
        } else {
            Err(VMError::not_referenced(object))
        }
    }

    /// Allocate a new memory cell and root it in this frame.
    pub fn new_object(&self) -> VMResult<Handle> {
        // Never wait on the allocator while inside a scope: a collection on
        // another thread would wait for that scope to close.
        drop(self.enter()?);

        let mut allocator = self.vm.allocator.lock();
        let handle = allocator.allocate_object()?;
        // Still holding the allocator, so no collection can run before the
        // new cell is rooted.
        if !self.record.insert(handle) {
            return Err(VMError::InvalidState(format!(
                "allocator returned cell {} which is already held",
                handle
            )));
        }
        drop(allocator);

        if self.vm.config.trace_execution {
            debug!("frame {}: new object {}", self.depth(), handle);
        }
        Ok(handle)
    }

    /// Read a reference slot. A non-null result becomes a root of this frame.
    pub fn get_reference(
        &self,
        object: Handle,
        slot: usize,
    ) -> VMResult<Handle> {
        let _scope = self.enter()?;
        self.require_active(object)?;
        let value = self.vm.heap.cell(object)?.get_reference(slot)?;
        if value < 0 {
            return Err(VMError::wrong_interpretation(object, slot, value));
        }
        let handle = value as Handle;
        if handle != NULL {
            self.vm.heap.cell(handle)?;
            self.record.insert(handle);
        }
        Ok(handle)
    }

    /// Read a primitive slot.
    pub fn get_data(
        &self,
        object: Handle,
        slot: usize,
    ) -> VMResult<Word> {
        let _scope = self.enter()?;
        self.require_active(object)?;
        let value = self.vm.heap.cell(object)?.get_data(slot)?;
        if value >= 0 {
            return Err(VMError::wrong_interpretation(object, slot, value));
        }
        Ok(value)
    }

    /// Store a reference. `value` must be null or held by this same frame.
    pub fn set_reference(
        &self,
        object: Handle,
        slot: usize,
        value: Handle,
    ) -> VMResult<()> {
        let _scope = self.enter()?;
        self.require_active(object)?;
        if value != NULL {
            self.require_active(value)?;
        }
        self.vm.heap.cell(object)?.set_reference(slot, value)
    }

    /// Store primitive data. `value` must be negative.
    pub fn set_data(
        &self,
        object: Handle,
        slot: usize,
        value: Word,
    ) -> VMResult<()> {
        let _scope = self.enter()?;
        self.require_active(object)?;
        if value >= 0 {
            return Err(VMError::IllegalReference(format!(
                "value = {} >= 0 is not primitive data",
                value
            )));
        }
        self.vm.heap.cell(object)?.set_data(slot, value)
    }

    /// Drop `object` from this frame's roots. It stays alive while anything
    /// else still reaches it.
    pub fn release(
        &self,
        object: Handle,
    ) -> VMResult<()> {
        let _scope = self.enter()?;
        self.require_active(object)?;
        self.record.remove(object);
        Ok(())
    }

    /// Call another method, giving it some arguments.
    ///
    /// Positive arguments must be objects held by this frame; they become
    /// roots of the callee. Negative arguments are primitive values and null
    /// is passed as is. A positive result must be held by the callee when it
    /// returns and is then rooted in this frame.
    pub fn call_method<M>(
        &self,
        method: &M,
        args: &[Word],
    ) -> VMResult<Word>
    where
        M: UserMethod + ?Sized,
    {
        let child = {
            let _scope = self.enter()?;
            if self.stack.depth() >= self.vm.config.max_call_depth {
                return Err(VMError::CallStackOverflow);
            }
            let record = self.stack.push();
            let transferred = args
                .iter()
                .filter(|&&arg| arg > 0)
                .try_for_each(|&arg| -> VMResult<()> {
                    let handle = arg as Handle;
                    self.require_active(handle)?;
                    record.insert(handle);
                    Ok(())
                });
            if let Err(e) = transferred {
                self.stack.pop(&record);
                return Err(e);
            }
            record.set_state(FrameState::Active);
            FrameEnvironment::new(Arc::clone(&self.vm), Arc::clone(&self.stack), record)
        };
        let _unwind = PopOnDrop {
            stack: &self.stack,
            record: &child.record,
        };

        if self.vm.config.trace_execution {
            debug!(
                "frame {}: call {} with {:?}",
                child.depth(),
                method.name(),
                args
            );
        }
        let outcome = method.invoke(&child, args);

        let _scope = self.vm.roots.gate().enter();
        let result = outcome.and_then(|result| {
            if result > 0 {
                let handle = result as Handle;
                child.require_active(handle)?;
                self.record.insert(handle);
            }
            child.record.set_state(FrameState::Returning);
            Ok(result)
        });
        self.stack.pop(&child.record);

        if self.vm.config.trace_execution {
            debug!("frame {}: return {:?}", child.depth(), result);
        }
        result
    }
}

impl fmt::Debug for FrameEnvironment {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("FrameEnvironment")
            .field("stack", &self.stack.id())
            .field("depth", &self.record.depth())
            .field("state", &self.record.state())
            .field("active", &self.record.handles())
            .finish()
    }
}
