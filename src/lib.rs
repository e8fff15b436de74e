//! gcharness
//!
//! A harness for plugging garbage collection strategies into a small
//! handle-based VM. Mutator programs run against per-frame environments that
//! track which heap cells they hold; strategies implement
//! [`runtime::memory::Allocator`] and collect from the roots those frames
//! expose.
//!
//! # Example
//!
//! ```
//! use gcharness::runtime::gc::GCConfig;
//! use gcharness::vm::{user_method, VMConfig, VM};
//!
//! fn main() -> gcharness::Result<()> {
//!     let vm = VM::from_gc_config(&GCConfig::default(), VMConfig::default())?;
//!     let program = user_method(|env, _| {
//!         let obj = env.new_object()?;
//!         env.set_data(obj, 0, -42)?;
//!         env.get_data(obj, 0)
//!     });
//!     assert_eq!(vm.run(&program, &[])?, -42);
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;
pub mod vm;
pub mod workload;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::gc::{AllocatorKind, GCConfig, GCStats};
pub use runtime::memory::{Allocator, Handle, Heap, MemoryCell, Word};
pub use runtime::roots::RootList;
pub use vm::{FrameEnvironment, UserMethod, VMError, VMResult, VM};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Harness name
pub const NAME: &str = "gcharness";
