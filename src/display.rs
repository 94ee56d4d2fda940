/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Textual renderings of a block.

use crate::{Block, InstData, Opcode, Operand};
use core::fmt;

/// Which register annotation to print for original instructions.
///
/// Allocator-inserted instructions only carry physical registers and
/// always print those.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegNames {
    /// Registers as written in the source.
    Source,
    /// Virtual registers assigned by renaming.
    Virtual,
    /// Physical registers assigned by allocation.
    Physical,
}

impl Block {
    /// Renders the block in ILOC syntax, one instruction per line.
    pub fn display(&self, names: RegNames) -> DisplayBlock<'_> {
        DisplayBlock { block: self, names }
    }

    /// Renders the block as an operand table.
    pub fn display_table(&self) -> DisplayTable<'_> {
        DisplayTable { block: self }
    }
}

pub struct DisplayBlock<'a> {
    block: &'a Block,
    names: RegNames,
}

struct Reg(Option<usize>);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, "r{}", n),
            None => write!(f, "r?"),
        }
    }
}

fn reg(data: &InstData, names: RegNames, slot: usize) -> Reg {
    let op = &data.operands[slot];
    let names = if data.synthetic {
        RegNames::Physical
    } else {
        names
    };
    Reg(match names {
        RegNames::Source => op.sreg.is_valid().then(|| op.sreg.index()),
        RegNames::Virtual => op.vreg.is_valid().then(|| op.vreg.vreg()),
        RegNames::Physical => op.preg.is_valid().then(|| op.preg.hw_enc()),
    })
}

fn write_inst(f: &mut fmt::Formatter, data: &InstData, names: RegNames) -> fmt::Result {
    let r = |slot| reg(data, names, slot);
    match data.opcode {
        Opcode::LoadI => write!(f, "loadI {} => {}", data.constant, r(2)),
        Opcode::Load | Opcode::Store => {
            write!(f, "{} {} => {}", data.opcode, r(0), r(2))
        }
        Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::LShift | Opcode::RShift => {
            write!(f, "{} {}, {} => {}", data.opcode, r(0), r(1), r(2))
        }
        Opcode::Output => write!(f, "output {}", data.constant),
        Opcode::Nop => write!(f, "nop"),
    }
}

impl<'a> fmt::Display for DisplayBlock<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for data in self.block.insts() {
            write_inst(f, data, self.names)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

pub struct DisplayTable<'a> {
    block: &'a Block,
}

/// One cell of the table: `[ sr3 ]`, `[ val 7 ]`, or `[ ]`.
struct Cell<'a>(Option<CellValue<'a>>);

enum CellValue<'a> {
    Reg(&'a Operand),
    Val(u32),
}

impl<'a> fmt::Display for Cell<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0 {
            Some(CellValue::Reg(op)) => write!(f, "[ {} ]", op.sreg),
            Some(CellValue::Val(v)) => write!(f, "[ val {} ]", v),
            None => write!(f, "[ ]"),
        }
    }
}

impl<'a> fmt::Display for DisplayTable<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for data in self.block.insts() {
            let reg = |slot: usize| Cell(Some(CellValue::Reg(&data.operands[slot])));
            let cells = match data.opcode {
                Opcode::LoadI => [
                    Cell(Some(CellValue::Val(data.constant))),
                    Cell(None),
                    reg(2),
                ],
                Opcode::Output => [Cell(Some(CellValue::Val(data.constant))), Cell(None), Cell(None)],
                Opcode::Load | Opcode::Store => [reg(0), Cell(None), reg(2)],
                Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::LShift | Opcode::RShift => {
                    [reg(0), reg(1), reg(2)]
                }
                Opcode::Nop => [Cell(None), Cell(None), Cell(None)],
            };
            writeln!(
                f,
                "{:<7} {}, {}, {}",
                data.opcode.mnemonic(),
                cells[0],
                cells[1],
                cells[2]
            )?;
        }
        Ok(())
    }
}
