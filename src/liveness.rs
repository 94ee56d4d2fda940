/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Reference liveness on source-register names.
//!
//! This is a plain backward dataflow over the block, independent of the
//! renamer, used to cross-check the renamer's MaxLive and next-use
//! annotations. Nothing is live out of the block. Allocator-inserted
//! instructions are skipped.

use crate::{Block, FxHashMap, FxHashSet, InstData, SReg};

fn original_insts(block: &Block) -> impl DoubleEndedIterator<Item = &InstData> + '_ {
    block.insts().filter(|data| !data.synthetic)
}

/// The set of source registers live on entry to each original
/// instruction, in program order.
pub fn live_in_sets(block: &Block) -> Vec<FxHashSet<SReg>> {
    let mut live: FxHashSet<SReg> = FxHashSet::default();
    let mut sets = vec![];
    for data in original_insts(block).rev() {
        if let Some(def) = data.def() {
            live.remove(&def.sreg);
        }
        for op in data.uses() {
            live.insert(op.sreg);
        }
        sets.push(live.clone());
    }
    sets.reverse();
    sets
}

/// Peak number of simultaneously live source registers; zero for a
/// block with no reads.
pub fn max_live(block: &Block) -> usize {
    live_in_sets(block)
        .iter()
        .map(|set| set.len())
        .max()
        .unwrap_or(0)
}

/// Rebuilds the live-in sets from the renamer's annotations alone.
///
/// A source register is live into position `p` when the most recent
/// operand naming it before `p` carries a next use at or after `p`, or
/// when its first appearance at or after `p` is a read and nothing
/// named it earlier. Agreement with [`live_in_sets`] shows that the
/// next-use distances describe exactly the reference live ranges.
pub fn live_in_from_next_use(block: &Block) -> Vec<FxHashSet<SReg>> {
    let insts: Vec<&InstData> = original_insts(block).collect();

    // Upward-exposed registers: live from the top of the block through
    // their first read.
    let mut first_read: FxHashMap<SReg, usize> = FxHashMap::default();
    let mut seen: FxHashSet<SReg> = FxHashSet::default();
    for (pos, data) in insts.iter().enumerate() {
        for op in data.uses() {
            if seen.insert(op.sreg) {
                first_read.insert(op.sreg, pos);
            }
        }
        if let Some(def) = data.def() {
            seen.insert(def.sreg);
        }
    }

    let mut pending: FxHashMap<SReg, usize> = FxHashMap::default();
    let mut sets = Vec::with_capacity(insts.len());
    for (pos, data) in insts.iter().enumerate() {
        let mut live: FxHashSet<SReg> = FxHashSet::default();
        for (&sreg, &next) in &pending {
            if next >= pos {
                live.insert(sreg);
            }
        }
        for (&sreg, &first) in &first_read {
            if first >= pos {
                live.insert(sreg);
            }
        }
        for op in data.uses() {
            live.insert(op.sreg);
        }
        sets.push(live);

        for op in data.uses() {
            first_read.remove(&op.sreg);
            record(&mut pending, op.sreg, op.next_use.pos());
        }
        if let Some(def) = data.def() {
            first_read.remove(&def.sreg);
            record(&mut pending, def.sreg, def.next_use.pos());
        }
    }
    sets
}

fn record(pending: &mut FxHashMap<SReg, usize>, sreg: SReg, next: Option<usize>) {
    match next {
        Some(pos) => {
            pending.insert(sreg, pos);
        }
        None => {
            pending.remove(&sreg);
        }
    }
}
