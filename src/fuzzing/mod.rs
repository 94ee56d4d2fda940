/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Generators and check harnesses shared by the fuzz targets and the
//! `arbtest` smoke tests.

pub mod allocator;
pub mod block;
pub mod rename;

pub use ::arbitrary;
#[cfg(feature = "fuzzing")]
pub use libfuzzer_sys::fuzz_target;
