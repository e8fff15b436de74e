//! Memory 单元测试
//!
//! 测试堆和内存单元的实现和行为

use crate::runtime::memory::{Heap, MemoryCell, NULL};
use crate::vm::VMError;

#[cfg(test)]
mod heap_tests {
    use super::*;

    #[test]
    fn test_heap_new() {
        let heap = Heap::new(5, 2);
        assert_eq!(heap.size(), 5);
        assert_eq!(heap.cell_size(), 2);
        assert_eq!(heap.handles(), 1..5);
    }

    #[test]
    fn test_heap_positions_match_indexes() {
        let heap = Heap::new(17, 3);
        for i in heap.handles() {
            assert_eq!(heap.cell(i).unwrap().position(), i);
        }
        let positions: Vec<_> = heap.cells().map(|c| c.position()).collect();
        assert_eq!(positions, (1..17).collect::<Vec<_>>());
    }

    #[test]
    fn test_heap_null_index_is_out_of_range() {
        let heap = Heap::new(5, 2);
        assert_eq!(
            heap.cell(NULL).unwrap_err(),
            VMError::IndexOutOfRange {
                index: 0,
                lower: 1,
                upper: 5
            }
        );
    }

    #[test]
    fn test_heap_upper_bound_is_exclusive() {
        let heap = Heap::new(5, 2);
        assert!(heap.cell(4).is_ok());
        assert!(matches!(
            heap.cell(5),
            Err(VMError::IndexOutOfRange { index: 5, .. })
        ));
    }

    #[test]
    fn test_heap_zero_size_has_only_null() {
        let heap = Heap::new(0, 2);
        assert_eq!(heap.size(), 1);
        assert!(heap.handles().is_empty());
        assert!(!heap.contains(1));
    }

    #[test]
    fn test_heap_debug() {
        let heap = Heap::new(2, 1);
        let debug = format!("{:?}", heap);
        assert!(debug.contains("Heap"));
        assert!(debug.contains("MemoryCell"));
    }
}

#[cfg(test)]
mod cell_tests {
    use super::*;

    fn cell(size: usize) -> MemoryCell {
        MemoryCell::new(size, 1)
    }

    #[test]
    fn test_cell_starts_null() {
        let c = cell(3);
        assert_eq!(c.snapshot(), vec![0, 0, 0]);
        assert!(c.is_reference(0).unwrap());
    }

    #[test]
    fn test_cell_write_read() {
        let c = cell(2);
        c.set_data(0, -42).unwrap();
        c.set_reference(1, 3).unwrap();
        assert_eq!(c.get_data(0).unwrap(), -42);
        assert_eq!(c.get_reference(1).unwrap(), 3);
        assert!(!c.is_reference(0).unwrap());
        assert!(c.is_reference(1).unwrap());
        assert_eq!(c.references().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_cell_slot_out_of_range() {
        let c = cell(2);
        assert!(matches!(
            c.get_reference(2),
            Err(VMError::IndexOutOfRange {
                index: 2,
                lower: 0,
                upper: 2
            })
        ));
        assert!(c.set_data(7, -1).is_err());
    }

    #[test]
    fn test_cell_clear() {
        let c = cell(3);
        c.set_data(0, -1).unwrap();
        c.set_reference(2, 9).unwrap();
        c.clear();
        assert_eq!(c.snapshot(), vec![0, 0, 0]);
    }

    #[test]
    fn test_copy_to_is_independent() {
        let heap = Heap::new(3, 2);
        let source = heap.cell(1).unwrap();
        let target = heap.cell(2).unwrap();
        source.set_data(0, -5).unwrap();
        source.set_reference(1, 2).unwrap();

        source.copy_to(target).unwrap();
        assert_eq!(target.snapshot(), vec![-5, 2]);

        source.set_data(0, -6).unwrap();
        assert_eq!(target.get_data(0).unwrap(), -5);
        assert_eq!(target.position(), 2);
    }

    #[test]
    fn test_copy_to_size_mismatch() {
        let a = MemoryCell::new(2, 1);
        let b = MemoryCell::new(3, 2);
        assert_eq!(
            a.copy_to(&b).unwrap_err(),
            VMError::SizeMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_copy_to_self_is_noop() {
        let c = cell(2);
        c.set_data(1, -3).unwrap();
        c.copy_to(&c).unwrap();
        assert_eq!(c.snapshot(), vec![0, -3]);
    }
}
