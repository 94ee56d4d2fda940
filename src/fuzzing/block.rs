/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

use crate::{Block, InstData, Opcode, SReg};
use arbitrary::{Arbitrary, Result, Unstructured};
use smallvec::SmallVec;

/// Knobs for generating blocks.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Source registers are drawn from `r0 .. r(num_sregs - 1)`.
    pub num_sregs: u32,
    pub max_insts: usize,
    /// Allow reads of registers not yet defined in the block.
    pub live_in: bool,
}

impl Options {
    pub const DEFAULT: Options = Options {
        num_sregs: 8,
        max_insts: 40,
        live_in: false,
    };
}

impl Default for Options {
    fn default() -> Self {
        Options::DEFAULT
    }
}

const OPCODES: &[Opcode] = &[
    Opcode::LoadI,
    Opcode::LoadI,
    Opcode::Load,
    Opcode::Store,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mult,
    Opcode::LShift,
    Opcode::RShift,
    Opcode::Output,
    Opcode::Nop,
];

/// Generator state: the registers a read may name.
struct Gen<'a, 'b> {
    u: &'a mut Unstructured<'b>,
    opts: &'a Options,
    defined: SmallVec<[SReg; 16]>,
}

impl<'a, 'b> Gen<'a, 'b> {
    fn def(&mut self) -> Result<SReg> {
        let sreg = SReg::new(self.u.int_in_range(0..=self.opts.num_sregs - 1)?);
        if !self.defined.contains(&sreg) {
            self.defined.push(sreg);
        }
        Ok(sreg)
    }

    fn read(&mut self) -> Result<SReg> {
        if self.opts.live_in || self.defined.is_empty() {
            return Ok(SReg::new(self.u.int_in_range(0..=self.opts.num_sregs - 1)?));
        }
        Ok(*self.u.choose(&self.defined)?)
    }

    fn constant(&mut self) -> Result<u32> {
        // Mostly small values, occasionally anything.
        if self.u.ratio(7, 8)? {
            Ok(self.u.int_in_range(0..=4096)?)
        } else {
            u32::arbitrary(self.u)
        }
    }

    fn inst(&mut self, line: u32) -> Result<InstData> {
        let mut opcode = *self.u.choose(OPCODES)?;
        if !self.opts.live_in && self.defined.is_empty() && !opcode.uses().is_empty() {
            opcode = Opcode::LoadI;
        }
        // Reads are drawn before the definition so an instruction never
        // reads a register it is the first to define.
        Ok(match opcode {
            Opcode::LoadI => {
                let constant = self.constant()?;
                InstData::load_imm(line, constant, self.def()?)
            }
            Opcode::Load => {
                let addr = self.read()?;
                InstData::load(line, addr, self.def()?)
            }
            Opcode::Store => {
                let val = self.read()?;
                let addr = self.read()?;
                InstData::store(line, val, addr)
            }
            Opcode::Output => InstData::output(line, self.constant()?),
            Opcode::Nop => InstData::nop(line),
            op => {
                let lhs = self.read()?;
                let rhs = self.read()?;
                InstData::arith(line, op, lhs, rhs, self.def()?)
            }
        })
    }
}

/// Generates a straight-line block of original instructions.
pub fn arbitrary_block_with_options(u: &mut Unstructured, opts: &Options) -> Result<Block> {
    assert!(opts.num_sregs > 0);
    let len = u.int_in_range(0..=opts.max_insts)?;
    let mut gen = Gen {
        u,
        opts,
        defined: SmallVec::new(),
    };
    let mut block = Block::with_capacity(len);
    for i in 0..len {
        block.push(gen.inst(i as u32 + 1)?);
    }
    Ok(block)
}

/// A block generated with [`Options::DEFAULT`].
#[derive(Clone, Debug)]
pub struct TestBlock(pub Block);

impl Arbitrary<'_> for TestBlock {
    fn arbitrary(u: &mut Unstructured) -> Result<TestBlock> {
        Ok(TestBlock(arbitrary_block_with_options(u, &Options::DEFAULT)?))
    }
}
