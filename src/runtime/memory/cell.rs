//! Memory cells
//!
//! A cell is one object's storage: a fixed-width vector of slots. Slot values
//! `>= 0` are handles to other cells (0 is null), values `< 0` are primitive
//! data. Which interpretation applies is decided by whoever writes the slot;
//! this layer does no liveness or type checking.

use parking_lot::RwLock;
use std::fmt;

use crate::vm::{VMError, VMResult};

/// Index of a cell in the heap. 0 is the null handle.
pub type Handle = usize;

/// Raw slot value.
pub type Word = i64;

/// The null handle
pub const NULL: Handle = 0;

/// Whether a raw value is a handle (including null) rather than primitive data.
#[inline]
pub fn is_reference_word(value: Word) -> bool {
    value >= 0
}

/// One object's storage
pub struct MemoryCell {
    /// Slot values, locked so the heap can be shared across mutator threads
    slots: RwLock<Box<[Word]>>,
    /// Index of this cell in its heap
    position: Handle,
}

impl MemoryCell {
    /// Only the heap creates cells.
    pub(crate) fn new(
        cell_size: usize,
        position: Handle,
    ) -> Self {
        Self {
            slots: RwLock::new(vec![0; cell_size].into_boxed_slice()),
            position,
        }
    }

    /// The handle under which this cell is stored.
    #[inline]
    pub fn position(&self) -> Handle {
        self.position
    }

    /// Number of slots.
    #[inline]
    pub fn size(&self) -> usize {
        self.slots.read().len()
    }

    fn check_slot(
        &self,
        slot: usize,
        len: usize,
    ) -> VMResult<()> {
        if slot < len {
            Ok(())
        } else {
            Err(VMError::IndexOutOfRange {
                index: slot,
                lower: 0,
                upper: len,
            })
        }
    }

    /// Raw read of a slot expected to hold a reference.
    pub fn get_reference(
        &self,
        slot: usize,
    ) -> VMResult<Word> {
        let slots = self.slots.read();
        self.check_slot(slot, slots.len())?;
        Ok(slots[slot])
    }

    /// Raw read of a slot expected to hold primitive data.
    pub fn get_data(
        &self,
        slot: usize,
    ) -> VMResult<Word> {
        self.get_reference(slot)
    }

    /// Whether the slot currently holds a handle (or null).
    pub fn is_reference(
        &self,
        slot: usize,
    ) -> VMResult<bool> {
        self.get_reference(slot).map(is_reference_word)
    }

    /// Raw write of a handle.
    pub fn set_reference(
        &self,
        slot: usize,
        handle: Handle,
    ) -> VMResult<()> {
        let value = Word::try_from(handle).map_err(|_| VMError::IndexOutOfRange {
            index: handle,
            lower: 0,
            upper: Word::MAX as usize,
        })?;
        self.write(slot, value)
    }

    /// Raw write of primitive data.
    pub fn set_data(
        &self,
        slot: usize,
        value: Word,
    ) -> VMResult<()> {
        self.write(slot, value)
    }

    fn write(
        &self,
        slot: usize,
        value: Word,
    ) -> VMResult<()> {
        let mut slots = self.slots.write();
        self.check_slot(slot, slots.len())?;
        slots[slot] = value;
        Ok(())
    }

    /// Reset every slot to null.
    pub fn clear(&self) {
        self.slots.write().fill(0);
    }

    /// Copy of all slot values.
    pub fn snapshot(&self) -> Vec<Word> {
        self.slots.read().to_vec()
    }

    /// Handles stored in this cell, nulls and primitives skipped.
    pub fn references(&self) -> impl Iterator<Item = Handle> {
        self.snapshot()
            .into_iter()
            .filter(|&value| value > 0)
            .map(|value| value as Handle)
    }

    /// Copy the contents of this cell into `other`.
    ///
    /// The copy is by value: later writes to either cell do not show up in
    /// the other, and references that pointed at this cell are left alone.
    pub fn copy_to(
        &self,
        other: &MemoryCell,
    ) -> VMResult<()> {
        if std::ptr::eq(self, other) {
            return Ok(());
        }
        // Snapshot first so two cell locks are never held together.
        let source = self.snapshot();
        let mut target = other.slots.write();
        if target.len() != source.len() {
            return Err(VMError::SizeMismatch {
                expected: source.len(),
                found: target.len(),
            });
        }
        target.copy_from_slice(&source);
        Ok(())
    }
}

impl fmt::Debug for MemoryCell {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MemoryCell")
            .field("position", &self.position)
            .field("slots", &self.snapshot())
            .finish()
    }
}
