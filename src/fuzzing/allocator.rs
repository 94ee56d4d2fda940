/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Fuzz the allocator and verify its output with the [`checker`].
//!
//! [`checker`]: crate::checker

use super::block::{arbitrary_block_with_options, Options};
use super::rename::rename_and_check;
use crate::checker::Checker;
use crate::{allocator, Block, RegAllocError, RegNames, RegallocOptions};
use arbitrary::{Arbitrary, Result, Unstructured};

#[derive(Clone, Debug)]
pub struct TestCase {
    block: Block,
    num_regs: usize,
    victim_window: u32,
}

impl Arbitrary<'_> for TestCase {
    fn arbitrary(u: &mut Unstructured) -> Result<TestCase> {
        let opts = Options {
            live_in: bool::arbitrary(u)?,
            ..Options::DEFAULT
        };
        Ok(TestCase {
            block: arbitrary_block_with_options(u, &opts)?,
            num_regs: u.int_in_range(2..=10)?,
            victim_window: u.int_in_range(0..=3)?,
        })
    }
}

/// Renames and allocates one block, then:
/// - runs the [`Checker`] on the result
/// - requires that no code was inserted when the registers suffice
/// - allows `TooManyLiveRegs` only with a single usable register
pub fn check(t: TestCase) {
    let TestCase {
        mut block,
        num_regs,
        victim_window,
    } = t;
    log::trace!("block (k = {}):\n{}", num_regs, block.display(RegNames::Source));

    let renamed = rename_and_check(&mut block);
    let options = RegallocOptions {
        victim_window,
        ..RegallocOptions::default()
    };
    let len = block.len();
    let output = match allocator::run(&mut block, &renamed, num_regs, &options) {
        Ok(output) => output,
        Err(RegAllocError::TooManyLiveRegs { .. }) => {
            assert!(num_regs == 2 && renamed.max_pressure > 2);
            return;
        }
        Err(err) => panic!("regalloc did not succeed: {}", err),
    };
    log::trace!("allocated:\n{}", block.display(RegNames::Physical));

    Checker::new(&block, &output)
        .run()
        .expect("checker failed");
    assert_eq!(block.len(), len + output.stats.inserted_insts);
    assert_eq!(block.num_synthetic(), output.stats.inserted_insts);
    if num_regs >= renamed.max_pressure {
        assert_eq!(output.addr_reg, None);
        assert_eq!(output.stats, Default::default());
    }
}

#[test]
fn smoke() {
    arbtest::arbtest(|u| {
        let test_case = TestCase::arbitrary(u)?;
        check(test_case);
        Ok(())
    })
    .budget_ms(1_000);
}
