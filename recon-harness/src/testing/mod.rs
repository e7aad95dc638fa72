//! Testing utilities for harness code.
//!
//! This module provides:
//! - Panicking assertions over labeled arrays
//! - A recording stage runner that never spawns a process

mod assertions;
mod runner;

pub use assertions::{assert_attr_shape, assert_contract, assert_dims, assert_shape};
pub use runner::RecordingRunner;
