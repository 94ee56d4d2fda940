/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

#![no_main]
use iloc_regalloc::fuzzing::allocator::{check, TestCase};
use iloc_regalloc::fuzzing::fuzz_target;

fuzz_target!(|testcase: TestCase| {
    let _ = env_logger::try_init();
    check(testcase);
});
