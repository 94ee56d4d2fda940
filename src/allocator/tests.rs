/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

use super::*;
use crate::checker::Checker;
use crate::{frontend, liveness, rename, RegNames};

fn parse(src: &str) -> Block {
    frontend::parse(src).unwrap()
}

fn alloc_with(src: &str, k: usize, options: &RegallocOptions) -> (Block, Result<Output, RegAllocError>) {
    let mut block = parse(src);
    let renamed = rename::rename(&mut block);
    let result = run(&mut block, &renamed, k, options);
    (block, result)
}

/// Allocates `src`, checks the result, and returns the allocated block.
fn alloc(src: &str, k: usize) -> (Block, Output) {
    let (block, result) = alloc_with(src, k, &RegallocOptions::default());
    let output = result.unwrap();
    Checker::new(&block, &output).run().unwrap();
    (block, output)
}

fn physical(block: &Block) -> String {
    block.display(RegNames::Physical).to_string()
}

const SIMPLE: &str = "\
loadI 2 => r1
loadI 3 => r2
add r1, r2 => r3
store r3 => r1
";

// MaxLive is 5, reached on entry to the last `load` and to the first `add`.
const FIVE_LIVE: &str = "\
loadI 1024 => r0
load r0 => r1
load r0 => r2
loadI 4 => r3
loadI 8 => r4
load r0 => r5
add r1, r2 => r6
add r6, r3 => r7
add r7, r4 => r8
add r8, r5 => r9
loadI 2048 => r10
store r9 => r10
";

#[test]
fn test_no_spill_when_registers_suffice() {
    let (block, output) = alloc(SIMPLE, 3);
    assert_eq!(output.addr_reg, None);
    assert_eq!(output.usable_regs, 3);
    assert_eq!(output.stats, Stats::default());
    assert_eq!(
        physical(&block),
        "loadI 2 => r0\n\
         loadI 3 => r1\n\
         add r0, r1 => r1\n\
         store r1 => r0\n"
    );
}

#[test]
fn test_five_live_with_three_registers() {
    let (block, output) = alloc(FIVE_LIVE, 3);
    assert_eq!(output.addr_reg, Some(PReg::new(2)));
    assert_eq!(output.usable_regs, 2);
    assert_eq!(output.num_spillslots, 2);
    assert_eq!(
        output.stats,
        Stats {
            evictions: 5,
            spill_stores: 2,
            restores: 2,
            remats: 3,
            inserted_insts: 11,
        }
    );
    assert_eq!(
        physical(&block),
        "loadI 1024 => r0\n\
         load r0 => r1\n\
         load r0 => r0\n\
         loadI 32768 => r2\n\
         store r0 => r2\n\
         loadI 4 => r0\n\
         loadI 8 => r0\n\
         loadI 1024 => r0\n\
         load r0 => r0\n\
         loadI 32772 => r2\n\
         store r0 => r2\n\
         loadI 32768 => r2\n\
         load r2 => r0\n\
         add r1, r0 => r0\n\
         loadI 4 => r1\n\
         add r0, r1 => r1\n\
         loadI 8 => r0\n\
         add r1, r0 => r0\n\
         loadI 32772 => r2\n\
         load r2 => r1\n\
         add r0, r1 => r1\n\
         loadI 2048 => r0\n\
         store r1 => r0\n"
    );
}

#[test]
fn test_remat_values_are_never_stored() {
    let (block, _) = alloc(FIVE_LIVE, 3);
    let remat_consts = [1024, 4, 8, 2048];
    // Every inserted store is preceded by the `loadI` of its spill
    // address; the value stored must come from a `load`.
    let insts: Vec<&InstData> = block.insts().collect();
    for (i, data) in insts.iter().enumerate() {
        if data.synthetic && data.opcode == Opcode::Store {
            let addr = insts[i - 1];
            assert!(addr.synthetic && addr.opcode == Opcode::LoadI);
            assert!(addr.constant >= 32768);
            assert!(!remat_consts.contains(&addr.constant));
        }
    }
}

#[test]
fn test_enough_registers_means_no_inserted_code() {
    for k in 5..=8 {
        let (block, output) = alloc(FIVE_LIVE, k);
        assert_eq!(output.addr_reg, None);
        assert_eq!(output.stats, Stats::default());
        assert_eq!(block.num_synthetic(), 0);
        assert_eq!(block.len(), 12);
    }
}

#[test]
fn test_spill_slots_are_reused_per_vreg() {
    let (block, _) = alloc(FIVE_LIVE, 3);
    let mut stored = vec![];
    let mut loaded = vec![];
    let insts: Vec<&InstData> = block.insts().collect();
    for pair in insts.windows(2) {
        if pair[0].synthetic && pair[1].synthetic {
            match pair[1].opcode {
                Opcode::Store => stored.push(pair[0].constant),
                Opcode::Load => loaded.push(pair[0].constant),
                _ => {}
            }
        }
    }
    stored.sort_unstable();
    loaded.sort_unstable();
    // Each spilled value is stored once and reloaded from that address.
    assert_eq!(stored, vec![32768, 32772]);
    assert_eq!(loaded, stored);
}

#[test]
fn test_spill_base_option() {
    let options = RegallocOptions {
        spill_base: 4096,
        ..RegallocOptions::default()
    };
    let (block, result) = alloc_with(FIVE_LIVE, 3, &options);
    let output = result.unwrap();
    Checker::new(&block, &output).run().unwrap();
    let addrs: Vec<u32> = block
        .insts()
        .filter(|data| data.synthetic && data.opcode == Opcode::LoadI && data.constant >= 4096)
        .map(|data| data.constant)
        .collect();
    assert!(addrs.contains(&4096));
    assert!(addrs.contains(&4100));
}

#[test]
fn test_spill_addresses_start_over_each_run() {
    let (first, _) = alloc(FIVE_LIVE, 3);
    let (second, _) = alloc(FIVE_LIVE, 3);
    assert_eq!(physical(&first), physical(&second));
}

#[test]
fn test_victim_window() {
    // With a window of 1, the rematerializable address in r0 (next use
    // 5) ties with r1 (next use 6) and is evicted for free at line 3.
    // With a window of 0 only r1 qualifies, and it must be stored.
    let first_inserted_line = |window| {
        let options = RegallocOptions {
            victim_window: window,
            ..RegallocOptions::default()
        };
        let (block, result) = alloc_with(FIVE_LIVE, 3, &options);
        let output = result.unwrap();
        Checker::new(&block, &output).run().unwrap();
        let line = block
            .insts()
            .find(|data| data.synthetic)
            .map(|data| data.line)
            .unwrap();
        line
    };
    assert_eq!(first_inserted_line(1), 4);
    assert_eq!(first_inserted_line(0), 3);
}

#[test]
fn test_single_usable_register_spills() {
    // Three loaded values are live at once, but no instruction reads two
    // of them.
    let src = "\
loadI 1024 => r0
load r0 => r1
load r0 => r2
load r0 => r3
mult r1, r1 => r4
mult r2, r2 => r5
mult r3, r3 => r6
output 1024
";
    let (block, output) = alloc(src, 2);
    assert_eq!(output.usable_regs, 1);
    assert_eq!(output.addr_reg, Some(PReg::new(1)));
    assert!(output.stats.spill_stores >= 2);
    assert!(output.stats.restores >= 2);
    for data in block.insts().filter(|data| !data.synthetic) {
        for op in data.uses().chain(data.def()) {
            assert_eq!(op.preg, PReg::new(0));
        }
    }
}

#[test]
fn test_single_usable_register_two_sources() {
    let src = "\
loadI 1024 => r0
load r0 => r1
load r0 => r2
add r1, r2 => r3
store r3 => r0
";
    let (_, result) = alloc_with(src, 2, &RegallocOptions::default());
    match result {
        Err(RegAllocError::TooManyLiveRegs { line, .. }) => assert_eq!(line, 4),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_too_few_registers() {
    for k in 0..=1 {
        let (block, result) = alloc_with(FIVE_LIVE, k, &RegallocOptions::default());
        assert_eq!(
            result,
            Err(RegAllocError::TooFewRegisters { k, max_live: 5 })
        );
        // Nothing was touched.
        assert_eq!(block.num_synthetic(), 0);
        assert!(block.insts().all(|data| data.operands.iter().all(|op| op.preg.is_invalid())));
    }
}

#[test]
fn test_dead_definitions_release_their_register() {
    // r3 is never read while r1 and r2 are live across it.
    let src = "\
loadI 1 => r1
loadI 2 => r2
loadI 3 => r3
add r1, r2 => r4
store r4 => r1
";
    let (block, output) = alloc(src, 3);
    assert_eq!(output.addr_reg, None);
    assert_eq!(block.num_synthetic(), 0);
    assert_eq!(
        physical(&block),
        "loadI 1 => r0\n\
         loadI 2 => r1\n\
         loadI 3 => r2\n\
         add r0, r1 => r1\n\
         store r1 => r0\n"
    );

    // The dead r3 forces the address register to be reserved, leaving
    // one register for the add's two sources.
    let (_, result) = alloc_with(src, 2, &RegallocOptions::default());
    match result {
        Err(RegAllocError::TooManyLiveRegs { line, .. }) => assert_eq!(line, 4),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_dead_definition_reserves_address_register() {
    // MaxLive is 3, but the dead r9 needs a fourth register while r0,
    // r1 and r2 are live across it.
    let src = "\
loadI 1024 => r0
load r0 => r1
load r0 => r2
loadI 7 => r9
add r1, r2 => r3
store r3 => r0
";
    let mut block = parse(src);
    let renamed = rename::rename(&mut block);
    assert_eq!(renamed.max_live, 3);
    assert_eq!(renamed.max_pressure, 4);

    let (block, output) = alloc(src, 3);
    assert_eq!(output.addr_reg, Some(PReg::new(2)));
    assert_eq!(output.usable_regs, 2);
    assert_eq!(output.num_spillslots, 1);
    assert_eq!(
        output.stats,
        Stats {
            evictions: 2,
            spill_stores: 1,
            restores: 1,
            remats: 1,
            inserted_insts: 5,
        }
    );
    assert_eq!(
        physical(&block),
        "loadI 1024 => r0\n\
         load r0 => r1\n\
         load r0 => r0\n\
         loadI 32768 => r2\n\
         store r0 => r2\n\
         loadI 7 => r0\n\
         loadI 32768 => r2\n\
         load r2 => r0\n\
         add r1, r0 => r0\n\
         loadI 1024 => r1\n\
         store r0 => r1\n"
    );

    let (block, output) = alloc(src, 4);
    assert_eq!(output.addr_reg, None);
    assert_eq!(output.stats, Stats::default());
    assert_eq!(block.num_synthetic(), 0);
}

#[test]
fn test_live_in_value_evicted_by_same_instruction() {
    // r0, r1, r2 and r4 are read before any definition. At the add, the
    // dead r3 evicts r1, which was bound with no code a moment earlier.
    let src = "\
store r4 => r0
add r0, r1 => r3
rshift r0, r2 => r7
rshift r7, r2 => r6
rshift r1, r4 => r0
";
    let (block, output) = alloc(src, 3);
    assert_eq!(output.addr_reg, Some(PReg::new(2)));
    assert!(output.stats.spill_stores > 0);
    assert!(output.stats.restores > 0);
    assert_eq!(block.len(), 5 + output.stats.inserted_insts);
}

#[test]
fn test_long_block_with_spills() {
    let mut src = String::from("loadI 1024 => r0\n");
    for _ in 0..2000 {
        src.push_str(
            "load r0 => r1\n\
             load r0 => r2\n\
             load r0 => r3\n\
             add r1, r2 => r4\n\
             add r4, r3 => r5\n\
             store r5 => r0\n",
        );
    }
    let (block, output) = alloc(&src, 3);
    assert_eq!(output.addr_reg, Some(PReg::new(2)));
    assert!(output.stats.spill_stores >= 2000);
    assert_eq!(block.len(), 12_001 + output.stats.inserted_insts);
    assert_eq!(block.len() - block.num_synthetic(), 12_001);
}

#[test]
fn test_empty_block() {
    let (block, output) = alloc("", 3);
    assert!(block.is_empty());
    assert_eq!(output.usable_regs, 3);
    assert_eq!(output.stats, Stats::default());
}

#[test]
fn test_same_vreg_read_twice() {
    let src = "\
loadI 3 => r1
load r1 => r2
mult r2, r2 => r2
store r2 => r1
";
    let (block, _) = alloc(src, 3);
    let mult = block
        .insts()
        .find(|data| data.opcode == Opcode::Mult)
        .unwrap();
    assert_eq!(mult.operands[0].preg, mult.operands[1].preg);
}

#[test]
fn test_every_slot_allocated_and_maxlive_matches() {
    for src in [SIMPLE, FIVE_LIVE].iter() {
        let mut block = parse(src);
        let renamed = rename::rename(&mut block);
        assert_eq!(renamed.max_live, liveness::max_live(&block));
        for k in 3..=6 {
            let mut block = block.clone();
            let output = run(&mut block, &renamed, k, &RegallocOptions::default()).unwrap();
            Checker::new(&block, &output).run().unwrap();
            for data in block.insts() {
                for op in data.uses().chain(data.def()) {
                    assert!(op.preg.is_valid());
                    assert!(op.preg.hw_enc() < k);
                }
            }
        }
    }
}
