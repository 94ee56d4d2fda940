/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Checker: verifies that allocated code computes the same values as
//! the renamed block it was produced from.
//!
//! The block is re-executed symbolically. Every physical register and
//! every spill address holds a symbolic value: the virtual register
//! whose value it carries, a known constant, or nothing known. The
//! transfer functions are:
//!
//!   - original instruction `v_d := op v_a, v_b` allocated as
//!     `p_d := op p_a, p_b`: each `p_a` must hold `v_a` (or, when `v_a`
//!     is defined by `loadI c`, the constant `c`); afterwards `p_d`
//!     holds `v_d`.
//!   - inserted `loadI c => p`: `p` holds `c`.
//!   - inserted `load pa => p`: `pa` must be the address register
//!     holding a constant address `a`; `p` takes the value at `a`.
//!   - inserted `store p => pa`: the value at `a` becomes that of `p`.
//!
//! Original stores are assumed not to write the spill area.
//!
//! A virtual register that is read but never defined in the block
//! holds an undefined value: its reads accept whatever the register
//! holds.

use crate::{Block, FxHashMap, FxHashSet, Inst, InstData, Opcode, Output, PReg, VReg};
use core::fmt;

/// A symbolic value in a register or spill slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckerValue {
    Unknown,
    VReg(VReg),
    Const(u32),
}

/// A set of errors detected by the checker.
#[derive(Clone, Debug)]
pub struct CheckerErrors {
    errors: Vec<CheckerError>,
}

impl CheckerErrors {
    pub fn errors(&self) -> &[CheckerError] {
        &self.errors
    }
}

impl fmt::Display for CheckerErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} allocation error(s):", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CheckerErrors {}

/// A single error detected by the checker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckerError {
    MissingAllocation {
        inst: Inst,
        slot: usize,
    },
    AllocationOutOfRange {
        inst: Inst,
        slot: usize,
        preg: PReg,
    },
    AddressRegisterInOriginal {
        inst: Inst,
        slot: usize,
    },
    IncorrectValue {
        inst: Inst,
        slot: usize,
        preg: PReg,
        expected: VReg,
        actual: CheckerValue,
    },
    BadSpillAddress {
        inst: Inst,
        preg: PReg,
        actual: CheckerValue,
    },
    UnexpectedInsertedInst {
        inst: Inst,
        opcode: Opcode,
    },
}

impl fmt::Display for CheckerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CheckerError::MissingAllocation { inst, slot } => {
                write!(f, "{:?} slot {}: no physical register", inst, slot)
            }
            CheckerError::AllocationOutOfRange { inst, slot, preg } => {
                write!(f, "{:?} slot {}: {} is out of range", inst, slot, preg)
            }
            CheckerError::AddressRegisterInOriginal { inst, slot } => write!(
                f,
                "{:?} slot {}: original instruction uses the spill address register",
                inst, slot
            ),
            CheckerError::IncorrectValue {
                inst,
                slot,
                preg,
                expected,
                actual,
            } => write!(
                f,
                "{:?} slot {}: {} should hold {} but holds {:?}",
                inst, slot, preg, expected, actual
            ),
            CheckerError::BadSpillAddress { inst, preg, actual } => write!(
                f,
                "{:?}: spill address register {} holds {:?}",
                inst, preg, actual
            ),
            CheckerError::UnexpectedInsertedInst { inst, opcode } => {
                write!(f, "{:?}: unexpected inserted {}", inst, opcode)
            }
        }
    }
}

pub struct Checker<'a> {
    block: &'a Block,
    usable_regs: usize,
    addr_reg: Option<PReg>,
    regs: Vec<CheckerValue>,
    memory: FxHashMap<u32, CheckerValue>,
    /// Constant of each virtual register defined by `loadI`.
    remat: FxHashMap<VReg, u32>,
    /// Virtual registers defined somewhere in the block.
    defined: FxHashSet<VReg>,
    errors: Vec<CheckerError>,
}

impl<'a> Checker<'a> {
    /// Create a checker for the allocated `block`.
    pub fn new(block: &'a Block, output: &Output) -> Checker<'a> {
        let mut remat = FxHashMap::default();
        let mut defined = FxHashSet::default();
        for data in block.insts().filter(|data| !data.synthetic) {
            if let Some(def) = data.def() {
                defined.insert(def.vreg);
                if data.opcode == Opcode::LoadI {
                    remat.insert(def.vreg, data.constant);
                }
            }
        }
        let num_regs = output.usable_regs + output.addr_reg.map_or(0, |_| 1);
        Checker {
            block,
            usable_regs: output.usable_regs,
            addr_reg: output.addr_reg,
            regs: vec![CheckerValue::Unknown; num_regs],
            memory: FxHashMap::default(),
            remat,
            defined,
            errors: vec![],
        }
    }

    /// Does `value` carry the value of `vreg`?
    fn holds(&self, value: CheckerValue, vreg: VReg) -> bool {
        match value {
            CheckerValue::VReg(v) => v == vreg,
            CheckerValue::Const(c) => self.remat.get(&vreg) == Some(&c),
            CheckerValue::Unknown => false,
        }
    }

    /// The register in `slot`, which must be one of the first `limit`
    /// registers.
    fn preg(
        &self,
        inst: Inst,
        data: &InstData,
        slot: usize,
        limit: usize,
    ) -> Result<PReg, CheckerError> {
        let preg = data.operands[slot].preg;
        if preg.is_invalid() {
            return Err(CheckerError::MissingAllocation { inst, slot });
        }
        if !data.synthetic && Some(preg) == self.addr_reg {
            return Err(CheckerError::AddressRegisterInOriginal { inst, slot });
        }
        if preg.hw_enc() >= limit {
            return Err(CheckerError::AllocationOutOfRange { inst, slot, preg });
        }
        Ok(preg)
    }

    fn spill_addr(&self, inst: Inst, data: &InstData, slot: usize) -> Result<u32, CheckerError> {
        let preg = self.preg(inst, data, slot, self.regs.len())?;
        let actual = self.regs[preg.hw_enc()];
        match actual {
            CheckerValue::Const(addr) if Some(preg) == self.addr_reg => Ok(addr),
            _ => Err(CheckerError::BadSpillAddress { inst, preg, actual }),
        }
    }

    fn check_original(&mut self, inst: Inst, data: &InstData) -> Result<(), CheckerError> {
        for &slot in data.opcode.uses() {
            let preg = self.preg(inst, data, slot, self.usable_regs)?;
            let vreg = data.operands[slot].vreg;
            if !self.defined.contains(&vreg) {
                continue;
            }
            let actual = self.regs[preg.hw_enc()];
            if !self.holds(actual, vreg) {
                return Err(CheckerError::IncorrectValue {
                    inst,
                    slot,
                    preg,
                    expected: vreg,
                    actual,
                });
            }
        }
        if let Some(slot) = data.opcode.def() {
            let preg = self.preg(inst, data, slot, self.usable_regs)?;
            self.regs[preg.hw_enc()] = CheckerValue::VReg(data.operands[slot].vreg);
        }
        Ok(())
    }

    fn check_inserted(&mut self, inst: Inst, data: &InstData) -> Result<(), CheckerError> {
        let num_regs = self.regs.len();
        match data.opcode {
            Opcode::LoadI => {
                let dst = self.preg(inst, data, 2, num_regs)?;
                self.regs[dst.hw_enc()] = CheckerValue::Const(data.constant);
            }
            Opcode::Load => {
                let addr = self.spill_addr(inst, data, 0)?;
                let dst = self.preg(inst, data, 2, num_regs)?;
                let value = self
                    .memory
                    .get(&addr)
                    .copied()
                    .unwrap_or(CheckerValue::Unknown);
                self.regs[dst.hw_enc()] = value;
            }
            Opcode::Store => {
                let src = self.preg(inst, data, 0, num_regs)?;
                let addr = self.spill_addr(inst, data, 2)?;
                self.memory.insert(addr, self.regs[src.hw_enc()]);
            }
            opcode => return Err(CheckerError::UnexpectedInsertedInst { inst, opcode }),
        }
        Ok(())
    }

    /// Find any errors, returning `Err(CheckerErrors)` with all errors
    /// found.
    pub fn run(mut self) -> Result<(), CheckerErrors> {
        let block = self.block;
        for inst in block.iter() {
            let data = &block[inst];
            let result = if data.synthetic {
                self.check_inserted(inst, data)
            } else {
                self.check_original(inst, data)
            };
            if let Err(err) = result {
                trace!("checker: {}", err);
                self.errors.push(err);
            }
        }
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CheckerErrors {
                errors: self.errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{allocator, frontend, rename, RegallocOptions, Stats};

    fn allocated(src: &str, k: usize) -> (Block, Output) {
        let mut block = frontend::parse(src).unwrap();
        let renamed = rename::rename(&mut block);
        let output = allocator::run(&mut block, &renamed, k, &RegallocOptions::default()).unwrap();
        (block, output)
    }

    const PRESSURE: &str = "\
loadI 1024 => r0
load r0 => r1
load r0 => r2
add r1, r2 => r3
store r3 => r0
";

    #[test]
    fn accepts_allocator_output() {
        for k in 3..=5 {
            let (block, output) = allocated(PRESSURE, k);
            Checker::new(&block, &output).run().unwrap();
        }
    }

    #[test]
    fn detects_swapped_operands() {
        let (mut block, output) = allocated(PRESSURE, 4);
        let add = block
            .iter()
            .find(|&inst| block[inst].opcode == Opcode::Add)
            .unwrap();
        let ops = &mut block[add].operands;
        let (a, b) = (ops[0].preg, ops[1].preg);
        assert_ne!(a, b);
        ops[0].preg = b;
        ops[1].preg = a;
        let errors = Checker::new(&block, &output).run().unwrap_err();
        assert!(matches!(
            errors.errors()[0],
            CheckerError::IncorrectValue { slot: 0, .. }
        ));
    }

    #[test]
    fn detects_clobbered_register() {
        let (mut block, output) = allocated(PRESSURE, 4);
        let add = block
            .iter()
            .find(|&inst| block[inst].opcode == Opcode::Add)
            .unwrap();
        let preg = block[add].operands[0].preg;
        block.insert_before(add, InstData::spill_load_imm(4, 99, preg));
        assert!(Checker::new(&block, &output).run().is_err());
    }

    #[test]
    fn detects_missing_allocation() {
        let mut block = frontend::parse(PRESSURE).unwrap();
        rename::rename(&mut block);
        let output = Output {
            usable_regs: 4,
            addr_reg: None,
            num_spillslots: 0,
            stats: Stats::default(),
        };
        let errors = Checker::new(&block, &output).run().unwrap_err();
        assert!(matches!(
            errors.errors()[0],
            CheckerError::MissingAllocation { slot: 2, .. }
        ));
    }

    #[test]
    fn live_in_values() {
        // r7 is never defined, so any register contents will do.
        let (block, output) = allocated("load r7 => r1\nstore r1 => r7\n", 3);
        Checker::new(&block, &output).run().unwrap();
    }

    #[test]
    fn undefined_reads_accept_any_contents() {
        let (mut block, output) = allocated("load r7 => r1\nstore r1 => r7\n", 3);
        let store = block
            .iter()
            .find(|&inst| block[inst].opcode == Opcode::Store)
            .unwrap();
        // The store reads r7 again; clobber its register first.
        let preg = block[store].operands[2].preg;
        block.insert_before(store, InstData::spill_load_imm(2, 99, preg));
        Checker::new(&block, &output).run().unwrap();

        // A defined value is still checked.
        let val = block[store].operands[0].preg;
        block.insert_before(store, InstData::spill_load_imm(2, 99, val));
        assert!(Checker::new(&block, &output).run().is_err());
    }
}
