/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! The instruction stream: one straight-line basic block.
//!
//! Instructions live in an arena and are linked into program order by
//! `prev`/`next` handles, so the allocator can splice new instructions
//! in front of the one it is visiting without disturbing any handle it
//! already holds.

use crate::{FxHashSet, InstData};
use core::iter::FromIterator;
use core::ops::{Index, IndexMut};

define_index!(Inst, Nodes, Node);

/// An instruction together with its position in the stream.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) data: InstData,
    pub(crate) prev: Inst,
    pub(crate) next: Inst,
}

/// An ordered, mutable sequence of instructions with O(1) append and
/// O(1) insertion before any node.
#[derive(Clone, Debug)]
pub struct Block {
    nodes: Nodes,
    head: Inst,
    tail: Inst,
    len: usize,
}

impl Default for Block {
    fn default() -> Self {
        Block::new()
    }
}

impl Block {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(n: usize) -> Self {
        Block {
            nodes: Nodes::with_capacity(n),
            head: Inst::invalid(),
            tail: Inst::invalid(),
            len: 0,
        }
    }

    /// Number of instructions in the stream.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn first(&self) -> Option<Inst> {
        self.head.valid()
    }

    #[inline(always)]
    pub fn last(&self) -> Option<Inst> {
        self.tail.valid()
    }

    #[inline(always)]
    pub fn next(&self, inst: Inst) -> Option<Inst> {
        self.nodes[inst].next.valid()
    }

    #[inline(always)]
    pub fn prev(&self, inst: Inst) -> Option<Inst> {
        self.nodes[inst].prev.valid()
    }

    /// Appends `data` at the end of the stream.
    pub fn push(&mut self, data: InstData) -> Inst {
        let inst = self.nodes.push(Node {
            data,
            prev: self.tail,
            next: Inst::invalid(),
        });
        if self.tail.is_valid() {
            self.nodes[self.tail].next = inst;
        } else {
            self.head = inst;
        }
        self.tail = inst;
        self.len += 1;
        inst
    }

    /// Splices `data` into the stream immediately before `at`.
    ///
    /// Handles held by the caller stay valid, and a forward walk that is
    /// currently positioned at `at` will not visit the new node.
    pub fn insert_before(&mut self, at: Inst, data: InstData) -> Inst {
        let prev = self.nodes[at].prev;
        debug_assert!(prev.is_invalid() || self.nodes[prev].next == at);
        let inst = self.nodes.push(Node {
            data,
            prev,
            next: at,
        });
        if prev.is_valid() {
            self.nodes[prev].next = inst;
        } else {
            debug_assert_eq!(self.head, at);
            self.head = inst;
        }
        self.nodes[at].prev = inst;
        self.len += 1;
        trace!("inserted {:?} before {:?}", inst, at);
        inst
    }

    /// Handles of all instructions, in program order.
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            block: self,
            front: self.head,
            back: self.tail,
            remaining: self.len,
        }
    }

    /// All instructions, in program order.
    pub fn insts(&self) -> impl DoubleEndedIterator<Item = &InstData> + '_ {
        self.iter().map(move |inst| &self.nodes[inst].data)
    }

    /// Number of instructions inserted by the allocator.
    pub fn num_synthetic(&self) -> usize {
        self.insts().filter(|data| data.synthetic).count()
    }

    /// Checks that the links form one acyclic chain from `head` to
    /// `tail` covering exactly `len` nodes.
    ///
    /// This walks the whole stream; callers run it once per pass, not
    /// per insertion.
    pub fn validate(&self) {
        let mut seen = FxHashSet::default();
        let mut prev = Inst::invalid();
        let mut node = self.head;
        while node.is_valid() {
            if !seen.insert(node) {
                panic!("Cycle detected in block at {:?}", node);
            }
            if self.nodes[node].prev != prev {
                panic!(
                    "Invalid block: {:?} prev is {:?}, expected {:?}",
                    node, self.nodes[node].prev, prev
                );
            }
            prev = node;
            node = self.nodes[node].next;
        }
        if prev != self.tail {
            panic!("Invalid block: chain ends at {:?}, tail is {:?}", prev, self.tail);
        }
        if seen.len() != self.len {
            panic!(
                "Invalid block: {} linked nodes but len is {}",
                seen.len(),
                self.len
            );
        }
    }
}

impl Index<Inst> for Block {
    type Output = InstData;

    #[inline(always)]
    fn index(&self, inst: Inst) -> &InstData {
        &self.nodes[inst].data
    }
}

impl IndexMut<Inst> for Block {
    #[inline(always)]
    fn index_mut(&mut self, inst: Inst) -> &mut InstData {
        &mut self.nodes[inst].data
    }
}

impl FromIterator<InstData> for Block {
    fn from_iter<I: IntoIterator<Item = InstData>>(iter: I) -> Self {
        let mut block = Block::new();
        for data in iter {
            block.push(data);
        }
        block
    }
}

/// Iterator over the handles of a [`Block`] in program order.
#[derive(Clone, Debug)]
pub struct BlockIter<'a> {
    block: &'a Block,
    front: Inst,
    back: Inst,
    remaining: usize,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        if self.remaining == 0 {
            return None;
        }
        let inst = self.front;
        self.front = self.block.nodes[inst].next;
        self.remaining -= 1;
        Some(inst)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> DoubleEndedIterator for BlockIter<'a> {
    fn next_back(&mut self) -> Option<Inst> {
        if self.remaining == 0 {
            return None;
        }
        let inst = self.back;
        self.back = self.block.nodes[inst].prev;
        self.remaining -= 1;
        Some(inst)
    }
}

impl<'a> ExactSizeIterator for BlockIter<'a> {}
