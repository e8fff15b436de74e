//! Virtual Machine and mutator API
//!
//! This module contains the frame environments mutator programs run
//! against and the VM that wires them to a heap and an allocator.

pub use errors::{VMError, VMResult};
pub use executor::{VMConfig, VM};
pub use frames::FrameEnvironment;
pub use method::{user_method, Named, UserMethod};

pub use crate::runtime::roots::FrameState;

mod errors;
mod executor;
mod frames;
mod method;
