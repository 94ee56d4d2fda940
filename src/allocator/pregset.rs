/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

use crate::PReg;
use core::fmt;

type Frame = u64;
const BITS_PER_FRAME: usize = core::mem::size_of::<Frame>() * 8;

/// A set of physical registers, one bit per hardware register.
///
/// Every `PReg` fits in a single frame.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct PRegSet {
    bits: Frame,
}

impl PRegSet {
    pub fn empty() -> Self {
        Self { bits: 0 }
    }

    #[inline(always)]
    fn mask(preg: PReg) -> Frame {
        debug_assert!(preg.hw_enc() < BITS_PER_FRAME);
        1 << preg.hw_enc()
    }

    pub fn insert(&mut self, preg: PReg) {
        self.bits |= Self::mask(preg);
    }

    pub fn remove(&mut self, preg: PReg) {
        self.bits &= !Self::mask(preg);
    }

    pub fn contains(&self, preg: PReg) -> bool {
        self.bits & Self::mask(preg) != 0
    }

    pub fn clear(&mut self) {
        self.bits = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn iter(&self) -> PRegSetIter {
        PRegSetIter { curr_frame: self.bits }
    }
}

pub struct PRegSetIter {
    curr_frame: Frame,
}

impl Iterator for PRegSetIter {
    type Item = PReg;

    fn next(&mut self) -> Option<PReg> {
        if self.curr_frame == 0 {
            return None;
        }
        let skip = self.curr_frame.trailing_zeros();
        self.curr_frame &= !(1 << skip);
        Some(PReg::new(skip as usize))
    }
}

impl fmt::Debug for PRegSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for preg in self.iter() {
            write!(f, "{} ", preg)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations() {
        let mut set = PRegSet::empty();
        assert!(set.is_empty());
        for &hw in &[10, 0, 63, 23] {
            set.insert(PReg::new(hw));
        }
        let els: Vec<usize> = set.iter().map(|p| p.hw_enc()).collect();
        assert_eq!(els, vec![0, 10, 23, 63]);
        assert!(set.contains(PReg::new(63)));
        assert!(!set.contains(PReg::new(62)));
        assert_eq!(set.len(), 4);
        set.remove(PReg::new(23));
        assert!(!set.contains(PReg::new(23)));
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn debug_format() {
        let mut set = PRegSet::empty();
        set.insert(PReg::new(1));
        set.insert(PReg::new(4));
        assert_eq!(format!("{:?}", set), "{ p1 p4 }");
    }
}
