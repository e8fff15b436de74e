//! Property tests using proptest

use proptest::prelude::*;

use gcharness::runtime::gc::{AllocatorKind, GCConfig};
use gcharness::runtime::memory::{Handle, Heap, Word};
use gcharness::vm::{user_method, VMConfig, VMError, VM};

fn vm(
    strategy: AllocatorKind,
    heap_size: usize,
    cell_size: usize,
) -> VM {
    let gc = GCConfig {
        heap_size,
        cell_size,
        strategy,
        ..GCConfig::default()
    };
    VM::from_gc_config(&gc, VMConfig::default()).unwrap()
}

/// Strategy for generating primitive slot values
fn primitive_strategy() -> impl Strategy<Value = Word> {
    i64::MIN..0
}

/// One step of a mutator program over a small pool of held objects
#[derive(Debug, Clone)]
enum Op {
    Allocate,
    Release(usize),
    Link(usize, usize),
    Unlink(usize),
    Follow(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Allocate),
        2 => any::<usize>().prop_map(Op::Release),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Link(a, b)),
        1 => any::<usize>().prop_map(Op::Unlink),
        2 => any::<usize>().prop_map(Op::Follow),
    ]
}

proptest! {
    #[test]
    fn prop_allocations_are_distinct(count in 1usize..64) {
        let vm = vm(AllocatorKind::MarkSweep, count + 1, 1);
        let program = user_method(move |env, _| {
            let mut seen = Vec::new();
            for _ in 0..count {
                let handle = env.new_object()?;
                assert!(handle >= 1 && handle <= count);
                assert!(!seen.contains(&handle));
                seen.push(handle);
            }
            assert_eq!(env.new_object(), Err(VMError::OutOfMemory));
            Ok(0)
        });
        prop_assert_eq!(vm.run(&program, &[]), Ok(0));
    }

    #[test]
    fn prop_copy_to_is_independent(
        values in prop::collection::vec(primitive_strategy(), 1..8),
        overwrite in primitive_strategy(),
    ) {
        let heap = Heap::new(3, values.len());
        let source = heap.cell(1).unwrap();
        let target = heap.cell(2).unwrap();
        for (slot, &value) in values.iter().enumerate() {
            source.set_data(slot, value).unwrap();
        }
        source.copy_to(target).unwrap();
        prop_assert_eq!(target.snapshot(), values.clone());

        source.set_data(0, overwrite).unwrap();
        prop_assert_eq!(target.get_data(0).unwrap(), values[0]);
        target.set_reference(0, 1).unwrap();
        prop_assert_eq!(source.get_data(0).unwrap(), overwrite);
    }

    #[test]
    fn prop_live_data_survives_collection(ops in prop::collection::vec(op_strategy(), 1..200)) {
        // Two slots: 0 carries a tag, 1 links to another object.
        let vm = vm(AllocatorKind::MarkSweep, 17, 2);
        let program = user_method(move |env, _| {
            let mut next_tag: Word = -1;
            for op in &ops {
                let held: Vec<Handle> = env.active_handles();
                let pick = |i: usize| held[i % held.len()];
                match *op {
                    Op::Allocate => match env.new_object() {
                        Ok(obj) => {
                            env.set_data(obj, 0, next_tag)?;
                            next_tag -= 1;
                        }
                        Err(VMError::OutOfMemory) => {}
                        Err(e) => return Err(e),
                    },
                    _ if held.is_empty() => {}
                    Op::Release(i) => env.release(pick(i))?,
                    Op::Link(a, b) => env.set_reference(pick(a), 1, pick(b))?,
                    Op::Unlink(a) => env.set_reference(pick(a), 1, 0)?,
                    Op::Follow(a) => {
                        env.get_reference(pick(a), 1)?;
                    }
                }
                // Every object this frame can reach still carries a tag.
                for handle in env.active_handles() {
                    let tag = env.get_data(handle, 0)?;
                    assert!(tag < 0 && tag > next_tag);
                }
            }
            Ok(0)
        });
        prop_assert_eq!(vm.run(&program, &[]), Ok(0));
    }

    #[test]
    fn prop_mark_sweep_never_exhausts_with_one_held(
        rounds in 1usize..100,
        heap_size in 2usize..10,
    ) {
        let vm = vm(AllocatorKind::MarkSweep, heap_size, 1);
        let program = user_method(move |env, _| {
            for _ in 0..rounds {
                let obj = env.new_object()?;
                env.release(obj)?;
            }
            Ok(0)
        });
        prop_assert_eq!(vm.run(&program, &[]), Ok(0));
        prop_assert_eq!(vm.gc_stats().allocations, rounds);
    }
}
