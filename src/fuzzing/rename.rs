/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Fuzz the renamer against the reference liveness.

use super::block::{arbitrary_block_with_options, Options};
use crate::{frontend, liveness, rename, Block, RegNames, Renamed};
use arbitrary::{Arbitrary, Result, Unstructured};

#[derive(Clone, Debug)]
pub struct TestCase {
    block: Block,
}

impl Arbitrary<'_> for TestCase {
    fn arbitrary(u: &mut Unstructured) -> Result<TestCase> {
        let opts = Options {
            live_in: bool::arbitrary(u)?,
            ..Options::DEFAULT
        };
        Ok(TestCase {
            block: arbitrary_block_with_options(u, &opts)?,
        })
    }
}

/// Renames `block` in place and checks the result:
/// - the printed block parses back to the same text
/// - MaxLive matches the reference dataflow
/// - the next-use annotations describe exactly the reference live ranges
pub fn rename_and_check(block: &mut Block) -> Renamed {
    let text = block.display(RegNames::Source).to_string();
    let reparsed = frontend::parse(&text).expect("printed block does not parse");
    assert_eq!(reparsed.display(RegNames::Source).to_string(), text);

    let reference = liveness::max_live(block);
    let renamed = rename::rename(block);
    log::trace!("renamed:\n{}", block.display(RegNames::Virtual));
    assert_eq!(renamed.max_live, reference);
    assert!(renamed.max_pressure >= renamed.max_live);
    assert_eq!(
        liveness::live_in_from_next_use(block),
        liveness::live_in_sets(block)
    );
    for data in block.insts() {
        for op in data.uses().chain(data.def()) {
            assert!(op.vreg.is_valid());
            assert!(op.vreg.vreg() < renamed.num_vregs);
        }
    }
    renamed
}

pub fn check(t: TestCase) {
    let TestCase { mut block } = t;
    log::trace!("block:\n{}", block.display(RegNames::Source));
    rename_and_check(&mut block);
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
