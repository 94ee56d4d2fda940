/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Top-down local allocation.
//!
//! The block is walked once in program order. Reads are resolved first:
//! a value that is not in a register is given one, evicting another value
//! if necessary, and is brought back either by re-issuing its `loadI`
//! (rematerialization) or by loading it from its spill slot. Registers
//! whose value is read for the last time are released, then the
//! definition is given a register. All spill, restore and
//! rematerialization code is spliced into the block right before the
//! instruction being allocated.
//!
//! When MaxLive exceeds the number of registers, register `k - 1` is set
//! aside to hold spill addresses and only `k - 1` registers carry values.

use crate::{
    Block, Inst, InstData, NextUse, Opcode, PReg, RegAllocError, RegallocOptions, Renamed,
    SpillSlot, VReg,
};
use pregset::PRegSet;
use smallvec::{smallvec, SmallVec};

mod pregset;

#[cfg(test)]
mod tests;

/// Counters describing the code inserted by one allocation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Stats {
    /// Values pushed out of their register to make room.
    pub evictions: usize,
    /// `store`s of dirty values to spill slots.
    pub spill_stores: usize,
    /// Values reloaded from spill slots.
    pub restores: usize,
    /// Values recomputed with `loadI` instead of reloaded.
    pub remats: usize,
    /// Total instructions spliced into the block.
    pub inserted_insts: usize,
}

/// The result of a successful allocation run.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Output {
    /// Registers `p0 .. p(usable_regs - 1)` carry values.
    pub usable_regs: usize,
    /// The register set aside for spill addresses, when spilling was
    /// possible.
    pub addr_reg: Option<PReg>,
    /// Number of spill slots handed out.
    pub num_spillslots: usize,
    pub stats: Stats,
}

/// Whether a value still has to be written back before its register
/// can be reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueState {
    /// Not yet placed in a register.
    Unknown,
    /// The spill slot holds the current value.
    Clean,
    /// Only the register holds the current value.
    Dirty,
}

/// Eviction preference; higher is cheaper to evict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SpillCost {
    Dirty,
    Clean,
    Remat,
}

#[derive(Clone, Copy, Debug)]
struct VRegInfo {
    spillslot: SpillSlot,
    /// The immediate of the defining `loadI`, if any.
    remat: Option<u32>,
    state: ValueState,
}

impl Default for VRegInfo {
    fn default() -> Self {
        VRegInfo {
            spillslot: SpillSlot::invalid(),
            remat: None,
            state: ValueState::Unknown,
        }
    }
}

impl VRegInfo {
    fn cost(&self) -> SpillCost {
        if self.remat.is_some() {
            SpillCost::Remat
        } else if self.state == ValueState::Clean {
            SpillCost::Clean
        } else {
            SpillCost::Dirty
        }
    }
}

/// Size of one spill slot in bytes.
const SPILL_SLOT_SIZE: u32 = 4;

struct Env<'a> {
    block: &'a mut Block,
    options: &'a RegallocOptions,

    usable_regs: usize,
    addr_reg: Option<PReg>,

    /// The register currently holding each virtual register.
    vreg_preg: Vec<PReg>,
    /// The virtual register currently held by each usable register.
    preg_vreg: Vec<VReg>,
    /// Next read of the value held by each usable register.
    preg_next_use: Vec<NextUse>,
    /// Unoccupied registers; the last entry is handed out first.
    freepregs: Vec<PReg>,
    /// Registers read by the instruction being allocated.
    protected: PRegSet,
    vregs: Vec<VRegInfo>,

    next_spill_addr: u32,
    num_spillslots: usize,
    stats: Stats,
}

impl<'a> Env<'a> {
    fn new(
        block: &'a mut Block,
        renamed: &Renamed,
        usable_regs: usize,
        addr_reg: Option<PReg>,
        options: &'a RegallocOptions,
    ) -> Self {
        Env {
            block,
            options,
            usable_regs,
            addr_reg,
            vreg_preg: vec![PReg::invalid(); renamed.num_vregs],
            preg_vreg: vec![VReg::invalid(); usable_regs],
            preg_next_use: vec![NextUse::NEVER; usable_regs],
            freepregs: (0..usable_regs).rev().map(PReg::new).collect(),
            protected: PRegSet::empty(),
            vregs: vec![VRegInfo::default(); renamed.num_vregs],
            next_spill_addr: options.spill_base,
            num_spillslots: 0,
            stats: Stats::default(),
        }
    }

    fn insert_before(&mut self, at: Inst, data: InstData) {
        trace!("  insert before {:?}: {:?}", at, data);
        self.block.insert_before(at, data);
        self.stats.inserted_insts += 1;
    }

    /// The spill slot of `vreg`, handing out a fresh one on first use.
    fn spillslot(&mut self, vreg: VReg) -> SpillSlot {
        let info = &mut self.vregs[vreg.vreg()];
        if info.spillslot.is_invalid() {
            info.spillslot = SpillSlot::new(self.next_spill_addr);
            self.next_spill_addr += SPILL_SLOT_SIZE;
            self.num_spillslots += 1;
            trace!("  {} gets spill slot {}", vreg, info.spillslot);
        }
        info.spillslot
    }

    fn spill_addr_reg(&self, inst: Inst, vreg: VReg) -> Result<PReg, RegAllocError> {
        self.addr_reg.ok_or(RegAllocError::UnexpectedSpill {
            line: self.block[inst].line,
            vreg,
        })
    }

    fn bind(&mut self, vreg: VReg, preg: PReg, next_use: NextUse) {
        debug_assert!(self.vreg_preg[vreg.vreg()].is_invalid());
        debug_assert!(self.preg_vreg[preg.hw_enc()].is_invalid());
        self.vreg_preg[vreg.vreg()] = preg;
        self.preg_vreg[preg.hw_enc()] = vreg;
        self.preg_next_use[preg.hw_enc()] = next_use;
    }

    fn unbind(&mut self, preg: PReg) -> VReg {
        let vreg = self.preg_vreg[preg.hw_enc()];
        self.vreg_preg[vreg.vreg()] = PReg::invalid();
        self.preg_vreg[preg.hw_enc()] = VReg::invalid();
        self.preg_next_use[preg.hw_enc()] = NextUse::NEVER;
        vreg
    }

    /// Releases the register of `vreg`, if it has one.
    fn free_vreg(&mut self, vreg: VReg) {
        let preg = self.vreg_preg[vreg.vreg()];
        if preg.is_valid() {
            trace!("  free {} from {}", vreg, preg);
            self.unbind(preg);
            self.freepregs.push(preg);
        }
    }

    /// Chooses the register to evict among those not read by the current
    /// instruction.
    ///
    /// Candidates whose next use is within `victim_window` of the
    /// farthest next use are ranked by how cheap they are to evict, then
    /// by next use. Remaining ties go to the lowest register.
    fn choose_victim(&self, inst: Inst) -> Result<PReg, RegAllocError> {
        let candidates = || {
            (0..self.usable_regs)
                .map(PReg::new)
                .filter(move |&preg| !self.protected.contains(preg))
        };
        let too_many = || RegAllocError::TooManyLiveRegs {
            inst,
            line: self.block[inst].line,
        };
        let max = candidates()
            .map(|preg| self.preg_next_use[preg.hw_enc()])
            .max()
            .ok_or_else(too_many)?;

        let mut best: Option<(PReg, SpillCost, NextUse)> = None;
        for preg in candidates() {
            let next_use = self.preg_next_use[preg.hw_enc()];
            if !next_use.within(self.options.victim_window, max) {
                continue;
            }
            let vreg = self.preg_vreg[preg.hw_enc()];
            debug_assert!(vreg.is_valid());
            let cost = self.vregs[vreg.vreg()].cost();
            let better = match best {
                None => true,
                Some((_, best_cost, best_next_use)) => {
                    cost > best_cost || (cost == best_cost && next_use > best_next_use)
                }
            };
            if better {
                best = Some((preg, cost, next_use));
            }
        }
        let (preg, cost, next_use) = best.ok_or_else(too_many)?;
        trace!(
            "  victim {} holding {} ({:?}, next use {})",
            preg,
            self.preg_vreg[preg.hw_enc()],
            cost,
            next_use
        );
        Ok(preg)
    }

    /// Empties `preg` so it can be reused, storing its value first if
    /// the spill slot does not already hold it.
    fn evict(&mut self, inst: Inst, preg: PReg) -> Result<(), RegAllocError> {
        let vreg = self.preg_vreg[preg.hw_enc()];
        let line = self.block[inst].line;
        self.stats.evictions += 1;
        let info = self.vregs[vreg.vreg()];
        if info.remat.is_some() {
            trace!("  evict {} from {}: rematerializable", vreg, preg);
            self.vregs[vreg.vreg()].state = ValueState::Clean;
        } else if info.state == ValueState::Clean {
            trace!("  evict {} from {}: clean", vreg, preg);
        } else {
            let addr_reg = self.spill_addr_reg(inst, vreg)?;
            let slot = self.spillslot(vreg);
            trace!("  evict {} from {}: store to {}", vreg, preg, slot);
            self.insert_before(inst, InstData::spill_load_imm(line, slot.addr(), addr_reg));
            self.insert_before(inst, InstData::spill_store(line, preg, addr_reg));
            self.vregs[vreg.vreg()].state = ValueState::Clean;
            self.stats.spill_stores += 1;
        }
        self.unbind(preg);
        Ok(())
    }

    /// Finds a register for `vreg` and binds it.
    fn alloc_reg(
        &mut self,
        inst: Inst,
        vreg: VReg,
        next_use: NextUse,
    ) -> Result<PReg, RegAllocError> {
        let preg = match self.freepregs.pop() {
            Some(preg) => {
                debug_assert!(!self.protected.contains(preg));
                preg
            }
            None => {
                let preg = self.choose_victim(inst)?;
                self.evict(inst, preg)?;
                preg
            }
        };
        trace!("  {} -> {}", vreg, preg);
        self.bind(vreg, preg, next_use);
        Ok(preg)
    }

    /// Brings the value of `vreg` back into `preg` ahead of `inst`.
    fn restore(&mut self, inst: Inst, vreg: VReg, preg: PReg) -> Result<(), RegAllocError> {
        let line = self.block[inst].line;
        let info = self.vregs[vreg.vreg()];
        if let Some(constant) = info.remat {
            trace!("  rematerialize {} = {} into {}", vreg, constant, preg);
            self.insert_before(inst, InstData::spill_load_imm(line, constant, preg));
            self.vregs[vreg.vreg()].state = ValueState::Dirty;
            self.stats.remats += 1;
        } else if info.state == ValueState::Unknown {
            // Read before any definition in this block. The value is
            // undefined, so any register will do.
            trace!("  {} is live into the block", vreg);
            self.vregs[vreg.vreg()].state = ValueState::Dirty;
        } else {
            debug_assert_eq!(info.state, ValueState::Clean);
            let addr_reg = self.spill_addr_reg(inst, vreg)?;
            let slot = self.spillslot(vreg);
            trace!("  restore {} from {} into {}", vreg, slot, preg);
            self.insert_before(inst, InstData::spill_load_imm(line, slot.addr(), addr_reg));
            self.insert_before(inst, InstData::spill_load(line, addr_reg, preg));
            self.vregs[vreg.vreg()].state = ValueState::Clean;
            self.stats.restores += 1;
        }
        Ok(())
    }

    fn alloc_inst(&mut self, inst: Inst) -> Result<(), RegAllocError> {
        let opcode = self.block[inst].opcode;
        let operands = self.block[inst].operands;
        trace!("alloc {:?}: {} {:?}", inst, opcode, operands);

        self.protected.clear();
        let mut last_uses: SmallVec<[VReg; 2]> = smallvec![];
        for &slot in opcode.uses() {
            let op = operands[slot];
            let mut preg = self.vreg_preg[op.vreg.vreg()];
            if preg.is_invalid() {
                preg = self.alloc_reg(inst, op.vreg, op.next_use)?;
                self.restore(inst, op.vreg, preg)?;
            }
            self.block[inst].operands[slot].preg = preg;
            self.protected.insert(preg);
            self.preg_next_use[preg.hw_enc()] = op.next_use;
            if op.next_use.is_never() {
                last_uses.push(op.vreg);
            }
        }
        for vreg in last_uses {
            self.free_vreg(vreg);
        }

        self.protected.clear();
        if let Some(slot) = opcode.def() {
            let op = operands[slot];
            let preg = self.alloc_reg(inst, op.vreg, op.next_use)?;
            self.block[inst].operands[slot].preg = preg;
            let info = &mut self.vregs[op.vreg.vreg()];
            info.remat = match opcode {
                Opcode::LoadI => Some(self.block[inst].constant),
                _ => None,
            };
            info.state = ValueState::Dirty;
            if op.next_use.is_never() {
                self.free_vreg(op.vreg);
            }
        }

        if self.options.verbose_log && trace_enabled!() {
            self.dump_state();
        }
        #[cfg(debug_assertions)]
        self.validate();
        Ok(())
    }

    fn run(&mut self) -> Result<(), RegAllocError> {
        let mut cursor = self.block.first();
        while let Some(inst) = cursor {
            // Anything spliced in lands before `inst`, so `next` still
            // names the following original instruction.
            cursor = self.block.next(inst);
            self.alloc_inst(inst)?;
        }
        #[cfg(debug_assertions)]
        self.validate_all();
        Ok(())
    }

    fn dump_state(&self) {
        trace!("state:");
        for (hw, &vreg) in self.preg_vreg.iter().enumerate() {
            if vreg.is_valid() {
                let info = &self.vregs[vreg.vreg()];
                trace!(
                    "  p{}: {} next use {} {:?} {}",
                    hw,
                    vreg,
                    self.preg_next_use[hw],
                    info.state,
                    info.spillslot
                );
            }
        }
        trace!("  free: {:?}", self.freepregs);
    }

    /// Checks that every occupied register is mapped back to by its
    /// value and that the free list holds exactly the unoccupied
    /// registers. Runs after each instruction, so it only looks at the
    /// `k` registers.
    fn validate(&self) {
        for (hw, &vreg) in self.preg_vreg.iter().enumerate() {
            if vreg.is_valid() && self.vreg_preg[vreg.vreg()] != PReg::new(hw) {
                panic!(
                    "p{} holds {} but {} maps to {:?}",
                    hw,
                    vreg,
                    vreg,
                    self.vreg_preg[vreg.vreg()]
                );
            }
        }

        let mut free = PRegSet::empty();
        for &preg in &self.freepregs {
            if self.preg_vreg[preg.hw_enc()].is_valid() || free.contains(preg) {
                panic!("Invalid free list: {:?}", self.freepregs);
            }
            free.insert(preg);
        }
        let occupied = self.preg_vreg.iter().filter(|v| v.is_valid()).count();
        if occupied + free.len() != self.usable_regs {
            panic!(
                "{} occupied + {} free registers, expected {}",
                occupied,
                free.len(),
                self.usable_regs
            );
        }
    }

    /// Full check of both register maps and the instruction stream, run
    /// once after the last instruction.
    fn validate_all(&self) {
        self.validate();
        for (v, &preg) in self.vreg_preg.iter().enumerate() {
            if Some(preg) == self.addr_reg {
                panic!("v{} is in the spill address register", v);
            }
            if preg.is_valid() && self.preg_vreg[preg.hw_enc()] != VReg::new(v) {
                panic!(
                    "v{} maps to {} but {} holds {:?}",
                    v,
                    preg,
                    preg,
                    self.preg_vreg[preg.hw_enc()]
                );
            }
        }
        self.block.validate();
    }
}

/// Allocates the renamed `block` onto `num_regs` physical registers.
///
/// On error the block may have been partially rewritten and must be
/// discarded.
pub fn run(
    block: &mut Block,
    renamed: &Renamed,
    num_regs: usize,
    options: &RegallocOptions,
) -> Result<Output, RegAllocError> {
    assert!(num_regs <= PReg::MAX + 1, "at most {} registers", PReg::MAX + 1);

    let may_spill = renamed.max_pressure > num_regs;
    let (usable_regs, addr_reg) = if may_spill && num_regs > 0 {
        (num_regs - 1, Some(PReg::new(num_regs - 1)))
    } else {
        (num_regs, None)
    };
    if usable_regs == 0 {
        return Err(RegAllocError::TooFewRegisters {
            k: num_regs,
            max_live: renamed.max_live,
        });
    }
    trace!(
        "allocating {} instructions: k = {}, MaxLive = {}, usable = {}, address register {:?}",
        block.len(),
        num_regs,
        renamed.max_live,
        usable_regs,
        addr_reg
    );

    let mut env = Env::new(block, renamed, usable_regs, addr_reg, options);
    env.run()?;

    trace!("allocation done: {:?}", env.stats);
    Ok(Output {
        usable_regs,
        addr_reg,
        num_spillslots: env.num_spillslots,
        stats: env.stats,
    })
}
