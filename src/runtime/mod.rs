//! Runtime system
//!
//! This module contains the heap, root enumeration and the collection
//! strategies that plug into the VM.

pub mod gc;
pub mod memory;
pub mod roots;
