//! Garbage collection strategies
//!
//! Concrete implementations of [`Allocator`]. They differ only in policy;
//! the contract in `runtime::memory::Allocator` holds for all of them.

mod bump;
mod mark_sweep;

pub use bump::BumpAllocator;
pub use mark_sweep::MarkSweepAllocator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::runtime::memory::{Allocator, Heap};
use crate::runtime::roots::RootList;
use crate::vm::{VMError, VMResult};

/// Which strategy to plug into the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocatorKind {
    /// Hand out each cell once, never collect
    Bump,
    /// Stop-the-world mark-sweep
    #[default]
    MarkSweep,
}

impl AllocatorKind {
    /// Instantiate the strategy (not yet initialized).
    pub fn build(
        self,
        config: &GCConfig,
    ) -> Box<dyn Allocator> {
        match self {
            AllocatorKind::Bump => Box::new(BumpAllocator::new()),
            AllocatorKind::MarkSweep => Box::new(MarkSweepAllocator::with_max_pause(config.max_pause)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AllocatorKind::Bump => "bump",
            AllocatorKind::MarkSweep => "mark-sweep",
        }
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bump" | "none" => Ok(AllocatorKind::Bump),
            "mark-sweep" | "marksweep" | "ms" => Ok(AllocatorKind::MarkSweep),
            other => Err(format!("unknown allocator strategy: {}", other)),
        }
    }
}

/// GC configuration
#[derive(Debug, Clone)]
pub struct GCConfig {
    /// Heap size in cells, including the reserved null index
    pub heap_size: usize,
    /// Slots per cell
    pub cell_size: usize,
    /// Strategy
    pub strategy: AllocatorKind,
    /// Pauses longer than this are logged as warnings
    pub max_pause: Duration,
}

impl Default for GCConfig {
    fn default() -> Self {
        Self {
            heap_size: 1024,
            cell_size: 4,
            strategy: AllocatorKind::MarkSweep,
            max_pause: Duration::from_millis(10),
        }
    }
}

impl GCConfig {
    /// Create the heap described by this configuration.
    pub fn build_heap(&self) -> Heap {
        Heap::new(self.heap_size, self.cell_size)
    }
}

/// GC state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GCState {
    Idle,
    Marking,
    Sweeping,
}

/// Collection statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GCStats {
    /// Cells handed out
    pub allocations: usize,
    /// Completed collection cycles
    pub collections: usize,
    /// Cells returned to the free pool by collections
    pub reclaimed: usize,
    /// Sum of all stop-the-world pauses
    pub total_pause: Duration,
    /// Most recent pause
    pub last_pause: Duration,
}

impl GCStats {
    pub(crate) fn record_pause(
        &mut self,
        pause: Duration,
        reclaimed: usize,
    ) {
        self.collections += 1;
        self.reclaimed += reclaimed;
        self.total_pause += pause;
        self.last_pause = pause;
    }
}

/// Heap and roots an allocator was initialized against
#[derive(Clone)]
pub(crate) struct Binding {
    pub heap: Arc<Heap>,
    pub roots: Arc<dyn RootList>,
}

impl Binding {
    pub fn bind(
        slot: &mut Option<Binding>,
        heap: Arc<Heap>,
        roots: Arc<dyn RootList>,
    ) -> VMResult<()> {
        if slot.is_some() {
            return Err(VMError::InvalidState(
                "allocator initialized twice".to_string(),
            ));
        }
        *slot = Some(Binding { heap, roots });
        Ok(())
    }

    pub fn get(slot: &Option<Binding>) -> VMResult<&Binding> {
        slot.as_ref().ok_or_else(|| {
            VMError::InvalidState("allocator used before initialize".to_string())
        })
    }
}

impl fmt::Debug for Binding {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Binding")
            .field("heap_size", &self.heap.size())
            .field("cell_size", &self.heap.cell_size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
