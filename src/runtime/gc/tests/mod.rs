//! GC 单元测试
//!
//! 测试垃圾回收器的配置、状态和回收行为

use crate::runtime::gc::{AllocatorKind, BumpAllocator, GCConfig, GCState, GCStats, MarkSweepAllocator};
use crate::runtime::memory::{Allocator, Heap};
use crate::runtime::roots::{MutatorRoots, RootList};
use crate::vm::VMError;
use std::sync::Arc;
use std::time::Duration;

fn setup(
    size: usize,
    cell_size: usize,
) -> (Arc<Heap>, Arc<MutatorRoots>) {
    (
        Arc::new(Heap::new(size, cell_size)),
        Arc::new(MutatorRoots::new()),
    )
}

fn init(
    allocator: &mut dyn Allocator,
    heap: &Arc<Heap>,
    roots: &Arc<MutatorRoots>,
) {
    let roots: Arc<dyn RootList> = roots.clone();
    allocator.initialize(Arc::clone(heap), roots).unwrap();
}

#[cfg(test)]
mod gc_config_tests {
    use super::*;

    #[test]
    fn test_gc_config_default() {
        let config = GCConfig::default();
        assert_eq!(config.heap_size, 1024);
        assert_eq!(config.cell_size, 4);
        assert_eq!(config.strategy, AllocatorKind::MarkSweep);
        assert_eq!(config.max_pause, Duration::from_millis(10));
    }

    #[test]
    fn test_gc_config_build_heap() {
        let config = GCConfig {
            heap_size: 8,
            cell_size: 3,
            ..GCConfig::default()
        };
        let heap = config.build_heap();
        assert_eq!(heap.size(), 8);
        assert_eq!(heap.cell_size(), 3);
    }

    #[test]
    fn test_allocator_kind_parse() {
        assert_eq!("bump".parse::<AllocatorKind>(), Ok(AllocatorKind::Bump));
        assert_eq!(
            "Mark-Sweep".parse::<AllocatorKind>(),
            Ok(AllocatorKind::MarkSweep)
        );
        assert!("copying".parse::<AllocatorKind>().is_err());
        assert_eq!(AllocatorKind::MarkSweep.to_string(), "mark-sweep");
    }

    #[test]
    fn test_allocator_kind_build() {
        let config = GCConfig::default();
        assert_eq!(AllocatorKind::Bump.build(&config).name(), "bump");
        assert_eq!(AllocatorKind::MarkSweep.build(&config).name(), "mark-sweep");
    }
}

#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    fn test_allocate_before_initialize() {
        for mut allocator in [
            Box::new(BumpAllocator::new()) as Box<dyn Allocator>,
            Box::new(MarkSweepAllocator::new()),
        ] {
            assert!(matches!(
                allocator.allocate_object(),
                Err(VMError::InvalidState(_))
            ));
        }
    }

    #[test]
    fn test_initialize_twice() {
        let (heap, roots) = setup(4, 1);
        let mut allocator = MarkSweepAllocator::new();
        init(&mut allocator, &heap, &roots);
        let roots: Arc<dyn RootList> = roots;
        assert!(matches!(
            allocator.initialize(heap, roots),
            Err(VMError::InvalidState(_))
        ));
    }

    #[test]
    fn test_allocated_cells_are_cleared() {
        let (heap, roots) = setup(3, 2);
        heap.cell(1).unwrap().set_data(0, -9).unwrap();
        for mut allocator in [
            Box::new(BumpAllocator::new()) as Box<dyn Allocator>,
            Box::new(MarkSweepAllocator::new()),
        ] {
            let (heap, roots) = (Arc::clone(&heap), Arc::clone(&roots));
            init(allocator.as_mut(), &heap, &roots);
            let handle = allocator.allocate_object().unwrap();
            assert_eq!(heap.cell(handle).unwrap().snapshot(), vec![0, 0]);
            heap.cell(handle).unwrap().set_data(0, -9).unwrap();
        }
    }
}

#[cfg(test)]
mod bump_tests {
    use super::*;

    #[test]
    fn test_bump_hands_out_every_cell_once() {
        let (heap, roots) = setup(5, 1);
        let mut allocator = BumpAllocator::new();
        init(&mut allocator, &heap, &roots);
        let handles: Vec<_> = (0..4).map(|_| allocator.allocate_object().unwrap()).collect();
        assert_eq!(handles, vec![1, 2, 3, 4]);
        assert_eq!(allocator.remaining(), 0);
        assert_eq!(allocator.allocate_object(), Err(VMError::OutOfMemory));
        assert_eq!(allocator.collect(), Ok(0));
        assert_eq!(allocator.stats().allocations, 4);
    }
}

#[cfg(test)]
mod mark_sweep_tests {
    use super::*;

    #[test]
    fn test_mark_sweep_initial_state() {
        let allocator = MarkSweepAllocator::default();
        assert_eq!(allocator.state(), GCState::Idle);
        assert_eq!(allocator.stats(), GCStats::default());
    }

    #[test]
    fn test_mark_sweep_reclaims_unrooted() {
        let (heap, roots) = setup(4, 1);
        let mut allocator = MarkSweepAllocator::new();
        init(&mut allocator, &heap, &roots);

        let stack = roots.register_stack();
        let frame = stack.push();
        let kept = allocator.allocate_object().unwrap();
        frame.insert(kept);
        let dropped = allocator.allocate_object().unwrap();
        let _third = allocator.allocate_object().unwrap();
        assert_eq!(allocator.free_cells(), 0);

        // Only `kept` is rooted.
        assert_eq!(allocator.allocate_object().unwrap(), dropped);
        let stats = allocator.stats();
        assert_eq!(stats.collections, 1);
        assert_eq!(stats.reclaimed, 2);
        assert_eq!(allocator.state(), GCState::Idle);
    }

    #[test]
    fn test_mark_sweep_follows_references() {
        let (heap, roots) = setup(4, 2);
        let mut allocator = MarkSweepAllocator::new();
        init(&mut allocator, &heap, &roots);

        let stack = roots.register_stack();
        let frame = stack.push();
        let a = allocator.allocate_object().unwrap();
        let b = allocator.allocate_object().unwrap();
        let c = allocator.allocate_object().unwrap();
        frame.insert(a);
        heap.cell(a).unwrap().set_reference(1, b).unwrap();
        heap.cell(b).unwrap().set_reference(0, c).unwrap();
        heap.cell(b).unwrap().set_data(1, -1).unwrap();

        assert_eq!(allocator.collect(), Ok(0));
        assert_eq!(allocator.allocate_object(), Err(VMError::OutOfMemory));

        heap.cell(a).unwrap().set_reference(1, 0).unwrap();
        assert_eq!(allocator.collect(), Ok(2));
        assert_eq!(allocator.free_cells(), 2);
    }

    #[test]
    fn test_mark_sweep_handles_cycles() {
        let (heap, roots) = setup(3, 1);
        let mut allocator = MarkSweepAllocator::new();
        init(&mut allocator, &heap, &roots);

        let a = allocator.allocate_object().unwrap();
        let b = allocator.allocate_object().unwrap();
        heap.cell(a).unwrap().set_reference(0, b).unwrap();
        heap.cell(b).unwrap().set_reference(0, a).unwrap();

        // Unrooted cycle is garbage.
        assert_eq!(allocator.collect(), Ok(2));
    }

    #[test]
    fn test_mark_sweep_ignores_out_of_heap_slots() {
        let (heap, roots) = setup(3, 1);
        let mut allocator = MarkSweepAllocator::new();
        init(&mut allocator, &heap, &roots);

        let stack = roots.register_stack();
        let a = allocator.allocate_object().unwrap();
        stack.push().insert(a);
        heap.cell(a).unwrap().set_reference(0, 99).unwrap();
        assert_eq!(allocator.collect(), Ok(0));
    }

    #[test]
    fn test_collection_resumes_mutators() {
        let (heap, roots) = setup(2, 1);
        let mut allocator = MarkSweepAllocator::new();
        init(&mut allocator, &heap, &roots);
        allocator.collect().unwrap();
        assert!(!roots.gate().is_stopped());
        assert_eq!(roots.gate().pauses(), 1);
    }
}
