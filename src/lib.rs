/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Renaming and local register allocation for straight-line ILOC.
//!
//! A block of ILOC (`loadI`, `load`, `store`, `add`, `sub`, `mult`,
//! `lshift`, `rshift`, `output`, `nop`) is parsed into a [`Block`],
//! renamed bottom-up into virtual registers annotated with next-use
//! distances (see [`rename`]), and then allocated top-down onto `k`
//! physical registers (see [`allocator`]). The allocator splices spill,
//! restore and rematerialization code directly into the block.

#![allow(dead_code)]

macro_rules! trace {
    ($($tt:tt)*) => {
        if cfg!(feature = "trace-log") {
            ::log::trace!($($tt)*);
        }
    };
}

macro_rules! trace_enabled {
    () => {
        cfg!(feature = "trace-log") && ::log::log_enabled!(::log::Level::Trace)
    };
}

pub(crate) type FxHashMap<K, V> = hashbrown::HashMap<K, V, rustc_hash::FxBuildHasher>;
pub(crate) type FxHashSet<V> = hashbrown::HashSet<V, rustc_hash::FxBuildHasher>;

#[macro_use]
mod index;

mod block;
pub use block::{Block, BlockIter, Inst, Node};

pub mod allocator;
pub mod checker;
mod display;
pub use display::{DisplayBlock, DisplayTable, RegNames};
pub mod frontend;
pub mod liveness;
pub mod rename;
pub use rename::Renamed;

#[cfg(any(test, feature = "fuzzing"))]
pub mod fuzzing;

pub use allocator::{Output, Stats};

/// A register as written in the source text.
///
/// Source registers are reused freely by the program: the same `SReg`
/// may name many unrelated values over the course of a block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SReg(u32);

impl SReg {
    #[inline(always)]
    pub const fn new(reg: u32) -> Self {
        SReg(reg)
    }

    #[inline(always)]
    pub fn index(self) -> usize {
        debug_assert!(self.is_valid());
        self.0 as usize
    }

    #[inline(always)]
    pub fn invalid() -> Self {
        SReg(u32::MAX)
    }

    #[inline(always)]
    pub fn is_valid(self) -> bool {
        self != Self::invalid()
    }
}

impl std::fmt::Debug for SReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SReg({})", self.0)
    }
}

impl std::fmt::Display for SReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "sr{}", self.0)
    }
}

/// A virtual register: one live range, named uniquely by the renamer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct VReg(u32);

impl VReg {
    pub const MAX: usize = (u32::MAX - 1) as usize;

    #[inline(always)]
    pub fn new(vreg: usize) -> Self {
        debug_assert!(vreg <= Self::MAX);
        VReg(vreg as u32)
    }

    #[inline(always)]
    pub fn vreg(self) -> usize {
        debug_assert!(self.is_valid());
        self.0 as usize
    }

    #[inline(always)]
    pub fn invalid() -> Self {
        VReg(u32::MAX)
    }

    #[inline(always)]
    pub fn is_valid(self) -> bool {
        self != Self::invalid()
    }

    #[inline(always)]
    pub fn is_invalid(self) -> bool {
        self == Self::invalid()
    }
}

impl std::fmt::Debug for VReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "VReg({})", self.0)
        } else {
            write!(f, "VReg(invalid)")
        }
    }
}

impl std::fmt::Display for VReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A physical register, one of the `k` registers being allocated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PReg(u8);

impl PReg {
    pub const MAX_BITS: usize = 6;
    pub const MAX: usize = (1 << Self::MAX_BITS) - 1;

    #[inline(always)]
    pub fn new(hw_enc: usize) -> Self {
        assert!(hw_enc <= Self::MAX);
        PReg(hw_enc as u8)
    }

    /// The physical register number.
    #[inline(always)]
    pub fn hw_enc(self) -> usize {
        debug_assert!(self.is_valid());
        self.0 as usize
    }

    #[inline(always)]
    pub fn invalid() -> Self {
        PReg(u8::MAX)
    }

    #[inline(always)]
    pub fn is_valid(self) -> bool {
        self != Self::invalid()
    }

    #[inline(always)]
    pub fn is_invalid(self) -> bool {
        self == Self::invalid()
    }
}

impl std::fmt::Debug for PReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "PReg({})", self.0)
        } else {
            write!(f, "PReg(invalid)")
        }
    }
}

impl std::fmt::Display for PReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Position of the next instruction that reads a live range.
///
/// Positions are 0-based indices in original program order. A range
/// with no further reads has a next use of [`NextUse::NEVER`], which
/// compares greater than every real position.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NextUse(u32);

impl NextUse {
    pub const NEVER: NextUse = NextUse(u32::MAX);

    #[inline(always)]
    pub fn at(pos: usize) -> Self {
        debug_assert!(pos < u32::MAX as usize);
        NextUse(pos as u32)
    }

    #[inline(always)]
    pub fn is_never(self) -> bool {
        self == Self::NEVER
    }

    /// The position, or `None` when there is no further use.
    #[inline(always)]
    pub fn pos(self) -> Option<usize> {
        if self.is_never() {
            None
        } else {
            Some(self.0 as usize)
        }
    }

    /// Is this next use no more than `window` positions short of `max`?
    #[inline(always)]
    pub fn within(self, window: u32, max: NextUse) -> bool {
        self.0 >= max.0.saturating_sub(window)
    }
}

impl std::fmt::Debug for NextUse {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl std::fmt::Display for NextUse {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.pos() {
            Some(pos) => write!(f, "{}", pos),
            None => write!(f, "inf"),
        }
    }
}

/// A spill-memory address permanently associated with one virtual
/// register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SpillSlot {
    addr: u32,
}

impl SpillSlot {
    #[inline(always)]
    pub fn new(addr: u32) -> Self {
        SpillSlot { addr }
    }

    #[inline(always)]
    pub fn addr(self) -> u32 {
        self.addr
    }

    #[inline(always)]
    pub fn invalid() -> Self {
        SpillSlot { addr: u32::MAX }
    }

    #[inline(always)]
    pub fn is_invalid(self) -> bool {
        self == Self::invalid()
    }

    #[inline(always)]
    pub fn is_valid(self) -> bool {
        self != Self::invalid()
    }
}

impl std::fmt::Display for SpillSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "spill@{}", self.addr)
    }
}

/// The ten ILOC operations a block may contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Opcode {
    LoadI,
    Load,
    Store,
    Add,
    Sub,
    Mult,
    LShift,
    RShift,
    Output,
    Nop,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::LoadI => "loadI",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mult => "mult",
            Opcode::LShift => "lshift",
            Opcode::RShift => "rshift",
            Opcode::Output => "output",
            Opcode::Nop => "nop",
        }
    }

    #[inline(always)]
    pub fn is_arith(self) -> bool {
        matches!(
            self,
            Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::LShift | Opcode::RShift
        )
    }

    /// Operand slots read by this opcode, in the order they are
    /// resolved.
    ///
    /// `store` reads both of its registers: slot 0 holds the value and
    /// slot 2 the address.
    #[inline(always)]
    pub fn uses(self) -> &'static [usize] {
        match self {
            Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::LShift | Opcode::RShift => &[0, 1],
            Opcode::Load => &[0],
            Opcode::Store => &[0, 2],
            Opcode::LoadI | Opcode::Output | Opcode::Nop => &[],
        }
    }

    /// Operand slot written by this opcode, if any.
    #[inline(always)]
    pub fn def(self) -> Option<usize> {
        match self {
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mult
            | Opcode::LShift
            | Opcode::RShift
            | Opcode::Load
            | Opcode::LoadI => Some(2),
            Opcode::Store | Opcode::Output | Opcode::Nop => None,
        }
    }

    /// Does this opcode carry an immediate in `InstData::constant`?
    #[inline(always)]
    pub fn has_constant(self) -> bool {
        matches!(self, Opcode::LoadI | Opcode::Output)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// The annotations attached to one operand slot.
///
/// The parser fills in `sreg`, the renamer `vreg` and `next_use`, and
/// the allocator `preg`. Slots the opcode does not use keep the invalid
/// sentinels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Operand {
    pub sreg: SReg,
    pub vreg: VReg,
    pub preg: PReg,
    pub next_use: NextUse,
}

impl Operand {
    #[inline(always)]
    pub fn source(sreg: SReg) -> Self {
        Operand {
            sreg,
            ..Operand::default()
        }
    }

    #[inline(always)]
    pub fn physical(preg: PReg) -> Self {
        Operand {
            preg,
            ..Operand::default()
        }
    }
}

impl Default for Operand {
    fn default() -> Self {
        Operand {
            sreg: SReg::invalid(),
            vreg: VReg::invalid(),
            preg: PReg::invalid(),
            next_use: NextUse::NEVER,
        }
    }
}

/// One instruction of the block.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct InstData {
    /// Source line this instruction came from. Allocator-inserted
    /// instructions copy the line of the instruction they precede.
    pub line: u32,
    pub opcode: Opcode,
    /// Immediate of `loadI` and `output`; zero otherwise.
    pub constant: u32,
    pub operands: [Operand; 3],
    /// Inserted by the allocator; such instructions only carry physical
    /// registers.
    pub synthetic: bool,
}

impl InstData {
    fn new(line: u32, opcode: Opcode) -> Self {
        InstData {
            line,
            opcode,
            constant: 0,
            operands: [Operand::default(); 3],
            synthetic: false,
        }
    }

    pub fn load_imm(line: u32, constant: u32, dst: SReg) -> Self {
        let mut inst = InstData::new(line, Opcode::LoadI);
        inst.constant = constant;
        inst.operands[2] = Operand::source(dst);
        inst
    }

    pub fn load(line: u32, addr: SReg, dst: SReg) -> Self {
        let mut inst = InstData::new(line, Opcode::Load);
        inst.operands[0] = Operand::source(addr);
        inst.operands[2] = Operand::source(dst);
        inst
    }

    pub fn store(line: u32, val: SReg, addr: SReg) -> Self {
        let mut inst = InstData::new(line, Opcode::Store);
        inst.operands[0] = Operand::source(val);
        inst.operands[2] = Operand::source(addr);
        inst
    }

    pub fn arith(line: u32, opcode: Opcode, lhs: SReg, rhs: SReg, dst: SReg) -> Self {
        assert!(opcode.is_arith());
        let mut inst = InstData::new(line, opcode);
        inst.operands[0] = Operand::source(lhs);
        inst.operands[1] = Operand::source(rhs);
        inst.operands[2] = Operand::source(dst);
        inst
    }

    pub fn output(line: u32, constant: u32) -> Self {
        let mut inst = InstData::new(line, Opcode::Output);
        inst.constant = constant;
        inst
    }

    pub fn nop(line: u32) -> Self {
        InstData::new(line, Opcode::Nop)
    }

    /// `loadI constant => dst`, inserted by the allocator.
    pub fn spill_load_imm(line: u32, constant: u32, dst: PReg) -> Self {
        let mut inst = InstData::new(line, Opcode::LoadI);
        inst.constant = constant;
        inst.operands[2] = Operand::physical(dst);
        inst.synthetic = true;
        inst
    }

    /// `load addr => dst`, inserted by the allocator.
    pub fn spill_load(line: u32, addr: PReg, dst: PReg) -> Self {
        let mut inst = InstData::new(line, Opcode::Load);
        inst.operands[0] = Operand::physical(addr);
        inst.operands[2] = Operand::physical(dst);
        inst.synthetic = true;
        inst
    }

    /// `store src => addr`, inserted by the allocator.
    pub fn spill_store(line: u32, src: PReg, addr: PReg) -> Self {
        let mut inst = InstData::new(line, Opcode::Store);
        inst.operands[0] = Operand::physical(src);
        inst.operands[2] = Operand::physical(addr);
        inst.synthetic = true;
        inst
    }

    /// The slots read by this instruction.
    #[inline(always)]
    pub fn uses(&self) -> impl Iterator<Item = &Operand> + '_ {
        self.opcode.uses().iter().map(move |&slot| &self.operands[slot])
    }

    /// The slot written by this instruction, if any.
    #[inline(always)]
    pub fn def(&self) -> Option<&Operand> {
        self.opcode.def().map(|slot| &self.operands[slot])
    }
}

/// Errors that stop allocation. Nothing is emitted when one of these is
/// returned: the block must be discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegAllocError {
    /// Reserving the spill address register leaves no register to
    /// allocate with.
    TooFewRegisters { k: usize, max_live: usize },
    /// Every physical register is already claimed by the operands of
    /// the instruction at `line`, so none can be evicted. Only possible
    /// with `k = 2`: a dead definition can force the address register to
    /// be reserved even when MaxLive is 2, and the one register left
    /// cannot hold two sources.
    TooManyLiveRegs { inst: Inst, line: u32 },
    /// A value had to go through spill memory although the block was
    /// proven to fit in registers. This is a bookkeeping bug, never a
    /// property of the input.
    UnexpectedSpill { line: u32, vreg: VReg },
}

impl std::fmt::Display for RegAllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RegAllocError::TooFewRegisters { k, max_live } => write!(
                f,
                "k = {} is too small: no allocatable registers remain (MaxLive = {})",
                k, max_live
            ),
            RegAllocError::TooManyLiveRegs { line, .. } => write!(
                f,
                "line {}: too many operands live at once for the available registers",
                line
            ),
            RegAllocError::UnexpectedSpill { line, vreg } => write!(
                f,
                "line {}: internal error: {} spilled without a spill address register",
                line, vreg
            ),
        }
    }
}

impl std::error::Error for RegAllocError {}

/// Options for allocation.
#[derive(Clone, Copy, Debug)]
pub struct RegallocOptions {
    /// Dump the allocator state after every instruction when trace
    /// logging is enabled.
    pub verbose_log: bool,
    /// Registers whose next use is at most this far short of the
    /// farthest next use are treated as tied when choosing a victim.
    pub victim_window: u32,
    /// Address of the first spill slot.
    pub spill_base: u32,
}

impl Default for RegallocOptions {
    fn default() -> Self {
        RegallocOptions {
            verbose_log: false,
            victim_window: 1,
            spill_base: 32768,
        }
    }
}

/// Rename `block` and allocate it onto `num_regs` physical registers.
///
/// On success every operand slot of `block` carries a physical
/// register and any spill code has been inserted.
pub fn run(
    block: &mut Block,
    num_regs: usize,
    options: &RegallocOptions,
) -> Result<Output, RegAllocError> {
    let renamed = rename::rename(block);
    allocator::run(block, &renamed, num_regs, options)
}
