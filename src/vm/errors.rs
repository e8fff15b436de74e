//! VM errors

use thiserror::Error;

use crate::runtime::memory::{Handle, Word};

/// VM result
pub type VMResult<T> = Result<T, VMError>;

/// VM errors
///
/// Every variant is a programming error or a resource exhaustion surfaced to
/// the immediate caller. Nothing in the harness retries on any of them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VMError {
    /// A mutator touched a handle it does not hold, stored a handle it does
    /// not hold, or read a slot under the wrong interpretation.
    #[error("Illegal reference: {0}")]
    IllegalReference(String),

    #[error("Index out of range: {index} not in [{lower}, {upper})")]
    IndexOutOfRange {
        index: usize,
        lower: usize,
        upper: usize,
    },

    #[error("Cell size mismatch: {expected} slots vs {found} slots")]
    SizeMismatch { expected: usize, found: usize },

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Inactive frame at depth {0}")]
    InactiveFrame(usize),

    /// The allocator enumerated roots without holding the stop bracket.
    #[error("Root scan contract violation: roots enumerated outside stop/resume")]
    RootScanContractViolation,

    #[error("Call stack overflow")]
    CallStackOverflow,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl VMError {
    /// Handle `object` is not a member of the calling frame's active set.
    pub(crate) fn not_referenced(object: Handle) -> Self {
        VMError::IllegalReference(format!("object {} not referenced", object))
    }

    /// Slot holds a reference where primitive data was expected, or the
    /// other way around.
    pub(crate) fn wrong_interpretation(
        object: Handle,
        slot: usize,
        value: Word,
    ) -> Self {
        let kind = if value < 0 { "primitive" } else { "reference" };
        VMError::IllegalReference(format!(
            "slot {} of object {} holds {} value {}",
            slot, object, kind, value
        ))
    }

    /// Whether the error is the allocator giving up.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, VMError::OutOfMemory)
    }
}
