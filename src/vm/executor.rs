//! Virtual Machine
//!
//! Wires one heap and one allocator to a stack of frame environments per
//! mutator thread. The allocator is initialized against the heap and a root
//! list that aggregates the active sets of every live frame.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

use super::frames::FrameEnvironment;
use super::method::UserMethod;
use crate::runtime::gc::{GCConfig, GCStats};
use crate::runtime::memory::{Allocator, Handle, Heap, Word};
use crate::runtime::roots::{FrameState, MutatorRoots, RootList, ThreadStack};
use crate::vm::{VMError, VMResult};

/// VM configuration
#[derive(Debug, Clone)]
pub struct VMConfig {
    /// Maximum call depth per mutator thread
    pub max_call_depth: usize,
    /// Log frame pushes, pops and allocations at debug level
    pub trace_execution: bool,
}

impl Default for VMConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            trace_execution: false,
        }
    }
}

/// State shared by every frame of every mutator thread
pub(crate) struct VmShared {
    pub heap: Arc<Heap>,
    pub roots: Arc<MutatorRoots>,
    /// Serializes allocation, and with it collection
    pub allocator: Mutex<Box<dyn Allocator>>,
    pub config: VMConfig,
}

/// Unregisters a mutator stack on every exit path.
struct Registration<'a> {
    roots: &'a MutatorRoots,
    stack: Arc<ThreadStack>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.roots.unregister_stack(self.stack.id());
    }
}

/// Virtual machine driving mutator programs against a pluggable allocator
pub struct VM {
    shared: Arc<VmShared>,
}

impl VM {
    /// Create a VM over `heap` with the default configuration.
    pub fn new(
        heap: Heap,
        allocator: Box<dyn Allocator>,
    ) -> VMResult<Self> {
        Self::with_config(heap, allocator, VMConfig::default())
    }

    /// Create a VM with custom configuration. The allocator is initialized
    /// here, exactly once.
    pub fn with_config(
        heap: Heap,
        mut allocator: Box<dyn Allocator>,
        config: VMConfig,
    ) -> VMResult<Self> {
        let heap = Arc::new(heap);
        let roots = Arc::new(MutatorRoots::new());
        let root_list: Arc<dyn RootList> = roots.clone();
        allocator.initialize(Arc::clone(&heap), root_list)?;
        info!(
            "vm ready: {} cells x {} slots, allocator {}",
            heap.size() - 1,
            heap.cell_size(),
            allocator.name()
        );

        Ok(Self {
            shared: Arc::new(VmShared {
                heap,
                roots,
                allocator: Mutex::new(allocator),
                config,
            }),
        })
    }

    /// Build heap and strategy from a GC configuration.
    pub fn from_gc_config(
        gc: &GCConfig,
        config: VMConfig,
    ) -> VMResult<Self> {
        Self::with_config(gc.build_heap(), gc.strategy.build(gc), config)
    }

    pub fn heap(&self) -> &Arc<Heap> {
        &self.shared.heap
    }

    pub fn roots(&self) -> &Arc<MutatorRoots> {
        &self.shared.roots
    }

    pub fn config(&self) -> &VMConfig {
        &self.shared.config
    }

    /// Name of the plugged-in strategy.
    pub fn allocator_name(&self) -> &'static str {
        self.shared.allocator.lock().name()
    }

    /// Collection statistics of the allocator.
    pub fn gc_stats(&self) -> GCStats {
        self.shared.allocator.lock().stats()
    }

    /// Force a full collection. Returns the number of cells reclaimed.
    pub fn collect(&self) -> VMResult<usize> {
        self.shared.allocator.lock().collect()
    }

    /// Mutator threads currently running.
    pub fn thread_count(&self) -> usize {
        self.shared.roots.thread_count()
    }

    /// Run a program to completion on the calling thread, in a fresh
    /// parentless frame on a fresh stack.
    ///
    /// The entry frame has no caller to receive objects from, so positive
    /// arguments are rejected.
    pub fn run<M>(
        &self,
        method: &M,
        args: &[Word],
    ) -> VMResult<Word>
    where
        M: UserMethod + ?Sized,
    {
        if let Some(&arg) = args.iter().find(|&&arg| arg > 0) {
            return Err(VMError::not_referenced(arg as Handle));
        }

        let registration = Registration {
            roots: &self.shared.roots,
            stack: self.shared.roots.register_stack(),
        };
        let stack = Arc::clone(&registration.stack);

        let env = {
            let _scope = self.shared.roots.gate().enter();
            let record = stack.push();
            record.set_state(FrameState::Active);
            FrameEnvironment::new(Arc::clone(&self.shared), Arc::clone(&stack), record)
        };
        debug!("mutator stack {}: enter {}", stack.id(), method.name());

        let outcome = method.invoke(&env, args);

        let _scope = self.shared.roots.gate().enter();
        let result = outcome.and_then(|result| {
            if result > 0 && !env.is_active(result as Handle) {
                return Err(VMError::not_referenced(result as Handle));
            }
            Ok(result)
        });
        stack.pop(env.record());
        debug!("mutator stack {}: exit with {:?}", stack.id(), result);
        result
    }

    /// Run each program on its own mutator thread and collect the results
    /// in program order.
    pub fn run_concurrent(
        &self,
        programs: &[Box<dyn UserMethod>],
    ) -> Vec<VMResult<Word>> {
        thread::scope(|s| {
            let handles: Vec<_> = programs
                .iter()
                .map(|program| s.spawn(move || self.run(program.as_ref(), &[])))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(VMError::RuntimeError("mutator thread panicked".to_string()))
                    })
                })
                .collect()
        })
    }
}

impl fmt::Debug for VM {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("VM")
            .field("heap_size", &self.shared.heap.size())
            .field("cell_size", &self.shared.heap.cell_size())
            .field("threads", &self.thread_count())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
