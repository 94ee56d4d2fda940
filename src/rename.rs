/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Bottom-up renaming.
//!
//! One backward walk over the block splits every source register into
//! its live ranges, gives each range a fresh [`VReg`], and annotates
//! every operand slot with the position of the next read of its range.
//! The walk also tracks how many ranges are open at once, which yields
//! MaxLive.
//!
//! At each instruction the definition is handled before the reads: a
//! definition closes the range opened by reads further down (or mints
//! a dead range if there were none), and each read opens a range if it
//! is the last read seen so far. Afterwards every register read here
//! has its next use set to this instruction.

use crate::{Block, FxHashMap, NextUse, SReg, VReg};

/// Summary produced by [`rename`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Renamed {
    /// Peak number of simultaneously live virtual registers.
    pub max_live: usize,
    /// Number of virtual registers minted; names are `0..num_vregs`.
    pub num_vregs: usize,
    /// Registers needed at once, also counting the destination of a
    /// dead definition while other ranges are live across it. Never
    /// less than `max_live`.
    pub max_pressure: usize,
}

/// Scratch state for one renaming pass.
///
/// Source register numbers are arbitrary `u32`s, so the per-register
/// state is keyed by hash map rather than indexed by register number.
struct Env {
    /// Range currently open for each source register, if any.
    open: FxHashMap<SReg, VReg>,
    /// Next read of each source register below the current position.
    next_use: FxHashMap<SReg, NextUse>,
    num_vregs: usize,
    live: usize,
    max_live: usize,
    max_pressure: usize,
}

impl Env {
    fn new() -> Self {
        Env {
            open: FxHashMap::default(),
            next_use: FxHashMap::default(),
            num_vregs: 0,
            live: 0,
            max_live: 0,
            max_pressure: 0,
        }
    }

    fn mint(&mut self) -> VReg {
        let vreg = VReg::new(self.num_vregs);
        self.num_vregs += 1;
        vreg
    }

    fn next_use(&self, sreg: SReg) -> NextUse {
        self.next_use.get(&sreg).copied().unwrap_or(NextUse::NEVER)
    }
}

/// Renames `block` in place, filling in `vreg` and `next_use` on every
/// operand slot the opcode reads or writes.
///
/// Instructions are neither reordered nor inserted. The block must only
/// contain original (source-register) instructions.
pub fn rename(block: &mut Block) -> Renamed {
    let mut env = Env::new();
    let insts: Vec<_> = block.iter().collect();

    for (pos, &inst) in insts.iter().enumerate().rev() {
        let data = &mut block[inst];
        debug_assert!(!data.synthetic);

        if let Some(slot) = data.opcode.def() {
            let sreg = data.operands[slot].sreg;
            let vreg = match env.open.remove(&sreg) {
                Some(vreg) => {
                    env.live -= 1;
                    vreg
                }
                None => {
                    env.max_pressure = core::cmp::max(env.max_pressure, env.live + 1);
                    env.mint()
                }
            };
            data.operands[slot].vreg = vreg;
            data.operands[slot].next_use = env.next_use(sreg);
            env.next_use.remove(&sreg);
        }

        for &slot in data.opcode.uses() {
            let sreg = data.operands[slot].sreg;
            let vreg = match env.open.get(&sreg) {
                Some(&vreg) => vreg,
                None => {
                    let vreg = env.mint();
                    env.open.insert(sreg, vreg);
                    env.live += 1;
                    env.max_live = core::cmp::max(env.max_live, env.live);
                    vreg
                }
            };
            data.operands[slot].vreg = vreg;
            data.operands[slot].next_use = env.next_use(sreg);
        }

        for &slot in data.opcode.uses() {
            env.next_use.insert(data.operands[slot].sreg, NextUse::at(pos));
        }

        trace!(
            "rename {:?} @ {}: {:?} live={}",
            inst,
            pos,
            data.operands,
            env.live
        );
    }

    trace!(
        "rename done: {} vregs, MaxLive {}",
        env.num_vregs,
        env.max_live
    );

    Renamed {
        max_live: env.max_live,
        num_vregs: env.num_vregs,
        max_pressure: core::cmp::max(env.max_pressure, env.max_live),
    }
}
