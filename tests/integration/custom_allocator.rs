//! A strategy defined outside the crate, plugged in through the public
//! `Allocator` trait.

use std::sync::Arc;

use gcharness::runtime::gc::GCStats;
use gcharness::runtime::memory::{Allocator, Handle, Heap};
use gcharness::runtime::roots::{MutatorRoots, RootList};
use gcharness::vm::{user_method, VMError, VMResult, VM};

/// Scans the whole heap on every allocation and hands out the lowest cell
/// nothing reaches.
#[derive(Default)]
struct ScanEveryTime {
    heap: Option<Arc<Heap>>,
    roots: Option<Arc<dyn RootList>>,
    handed_out: Vec<bool>,
    stats: GCStats,
}

impl std::fmt::Debug for ScanEveryTime {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ScanEveryTime")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Allocator for ScanEveryTime {
    fn initialize(
        &mut self,
        heap: Arc<Heap>,
        roots: Arc<dyn RootList>,
    ) -> VMResult<()> {
        self.handed_out = vec![false; heap.size()];
        self.heap = Some(heap);
        self.roots = Some(roots);
        Ok(())
    }

    fn allocate_object(&mut self) -> VMResult<Handle> {
        let (Some(heap), Some(roots)) = (&self.heap, &self.roots) else {
            return Err(VMError::InvalidState("not initialized".to_string()));
        };
        let mut live = vec![false; heap.size()];
        {
            let pause = roots.pause();
            let mut worklist = pause.roots()?;
            while let Some(handle) = worklist.pop() {
                if heap.contains(handle) && !live[handle] {
                    live[handle] = true;
                    worklist.extend(heap.cell(handle)?.references());
                }
            }
        }
        let handle = heap
            .handles()
            .find(|&h| !live[h])
            .ok_or(VMError::OutOfMemory)?;
        if self.handed_out[handle] {
            self.stats.reclaimed += 1;
        }
        self.handed_out[handle] = true;
        heap.cell(handle)?.clear();
        self.stats.allocations += 1;
        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "scan-every-time"
    }

    fn stats(&self) -> GCStats {
        self.stats.clone()
    }
}

fn custom_vm(heap_size: usize) -> VM {
    VM::new(Heap::new(heap_size, 2), Box::new(ScanEveryTime::default())).unwrap()
}

#[test]
fn test_custom_strategy_reuses_lowest_free_cell() {
    let vm = custom_vm(4);
    assert_eq!(vm.allocator_name(), "scan-every-time");
    let program = user_method(|env, _| {
        let a = env.new_object()?;
        let b = env.new_object()?;
        let c = env.new_object()?;
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(env.new_object(), Err(VMError::OutOfMemory));

        env.release(b)?;
        assert_eq!(env.new_object()?, 2);
        Ok(0)
    });
    assert_eq!(vm.run(&program, &[]), Ok(0));
    assert_eq!(vm.gc_stats().reclaimed, 1);
    // The default collect of a strategy without one reclaims nothing.
    assert_eq!(vm.collect(), Ok(0));
}

#[test]
fn test_custom_strategy_respects_reachability() {
    let vm = custom_vm(3);
    let program = user_method(|env, _| {
        let a = env.new_object()?;
        let b = env.new_object()?;
        env.set_reference(a, 0, b)?;
        env.release(b)?;
        assert_eq!(env.new_object(), Err(VMError::OutOfMemory));

        env.set_reference(a, 0, 0)?;
        assert_eq!(env.new_object()?, b);
        Ok(0)
    });
    assert_eq!(vm.run(&program, &[]), Ok(0));
}

#[test]
fn test_custom_strategy_sees_every_thread() {
    let vm = custom_vm(9);
    let programs: Vec<Box<dyn gcharness::UserMethod>> = (0..4)
        .map(|_| {
            Box::new(user_method(|env, _| {
                for _ in 0..25 {
                    let obj = env.new_object()?;
                    env.set_data(obj, 1, -1)?;
                    assert_eq!(env.get_data(obj, 1)?, -1);
                    env.release(obj)?;
                }
                Ok(0)
            })) as Box<dyn gcharness::UserMethod>
        })
        .collect();
    for outcome in vm.run_concurrent(&programs) {
        assert_eq!(outcome, Ok(0));
    }
    assert_eq!(vm.gc_stats().allocations, 100);
}

#[test]
fn test_initialize_sees_empty_roots() {
    let roots = Arc::new(MutatorRoots::new());
    let mut allocator = ScanEveryTime::default();
    allocator
        .initialize(Arc::new(Heap::new(3, 1)), roots.clone())
        .unwrap();
    assert_eq!(allocator.allocate_object(), Ok(1));
    // Nothing roots cell 1, so it is handed out again.
    assert_eq!(allocator.allocate_object(), Ok(1));
    assert!(!roots.is_stopped());
}

/// Breaks the contract: keeps handing out cell 1 whether or not it is held.
#[derive(Debug, Default)]
struct AlwaysFirst;

impl Allocator for AlwaysFirst {
    fn initialize(
        &mut self,
        _heap: Arc<Heap>,
        _roots: Arc<dyn RootList>,
    ) -> VMResult<()> {
        Ok(())
    }

    fn allocate_object(&mut self) -> VMResult<Handle> {
        Ok(1)
    }

    fn name(&self) -> &'static str {
        "always-first"
    }
}

#[test]
fn test_held_cell_from_allocator_is_an_error() {
    let vm = VM::new(Heap::new(3, 1), Box::new(AlwaysFirst)).unwrap();
    let program = user_method(|env, _| {
        let first = env.new_object()?;
        env.set_data(first, 0, -7)?;
        let again = env.new_object();
        assert!(
            matches!(&again, Err(VMError::InvalidState(msg)) if msg.contains("cell 1")),
            "{:?}",
            again
        );
        // The frame keeps its single hold on the cell and stays usable.
        assert_eq!(env.active_handles(), vec![first]);
        assert_eq!(env.get_data(first, 0)?, -7);
        Ok(0)
    });
    assert_eq!(vm.run(&program, &[]), Ok(0));
    assert_eq!(vm.thread_count(), 0);
}
