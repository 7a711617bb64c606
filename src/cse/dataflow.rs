// Copyright 2026 The jitopt developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Available-expressions dataflow over the candidate set.
//!
//! A forward must-analysis (meet = intersection) computes, per block, which
//! candidates are guaranteed already evaluated on every incoming path. Each
//! candidate owns two bits: *available*, and *available across a call* —
//! the latter survives only when no call intervenes between the value's
//! computation and the block exit. Calls kill every cross-call bit; a
//! candidate occurrence placed after the last call of its block
//! re-establishes its own.

use crate::{
    cse::CandidateTable,
    ir::{CandidateIndex, MethodIr},
    utils::BitSet,
};

/// Bit position of a candidate's plain availability.
#[must_use]
pub fn avail_bit(index: CandidateIndex) -> usize {
    index.index0() * 2
}

/// Bit position of a candidate's across-call availability.
#[must_use]
pub fn cross_call_bit(index: CandidateIndex) -> usize {
    index.index0() * 2 + 1
}

/// The converged per-block availability sets.
#[derive(Debug)]
pub struct AvailabilitySets {
    /// Availability on entry to each block.
    pub ins: Vec<BitSet>,
    /// Availability on exit from each block.
    pub outs: Vec<BitSet>,
}

impl AvailabilitySets {
    /// Width of each set in bits: two per indexed candidate.
    #[must_use]
    pub fn width(table: &CandidateTable) -> usize {
        table.indexed_count() * 2
    }
}

/// Builds the per-block `Gen` sets.
///
/// Any occurrence of a candidate in a block sets its availability bit; the
/// across-call bit is set only when the occurrence lies at or after the
/// block's last call (including the case where the occurrence is that call).
pub(crate) fn build_gen_sets(ir: &MethodIr, table: &CandidateTable) -> Vec<BitSet> {
    let width = AvailabilitySets::width(table);
    let mut gens = vec![BitSet::empty(width); ir.block_count()];

    for desc in table.indexed() {
        let index = desc.index.expect("indexed descriptor without index");
        for occ in &desc.occurrences {
            let gen = &mut gens[occ.block.index()];
            gen.insert(avail_bit(index));
            let survives_calls = match table.last_call_seq(occ.block) {
                Some(last_call) => occ.seq >= last_call,
                None => true,
            };
            if survives_calls {
                gen.insert(cross_call_bit(index));
            }
        }
    }
    gens
}

/// A mask holding only the availability bits; intersecting with it models a
/// call killing every cross-call bit.
pub(crate) fn call_survive_mask(table: &CandidateTable) -> BitSet {
    let width = AvailabilitySets::width(table);
    let mut mask = BitSet::empty(width);
    for desc in table.indexed() {
        let index = desc.index.expect("indexed descriptor without index");
        mask.insert(avail_bit(index));
    }
    mask
}

fn transfer(block_has_call: bool, inset: &BitSet, gen: &BitSet, survive: &BitSet) -> BitSet {
    let mut out = inset.clone();
    if block_has_call {
        out.intersect_with(survive);
    }
    out.union_with(gen);
    out
}

/// Runs the forward fixed-point and returns the converged `In`/`Out` sets.
///
/// `Out` starts at top (all bits) everywhere except the entry block and
/// handler entries, whose `In` is pinned to bottom; iteration only shrinks
/// `Out`, so termination follows from the finite bit domain.
pub fn compute_availability(ir: &MethodIr, table: &CandidateTable) -> AvailabilitySets {
    let width = AvailabilitySets::width(table);
    let block_count = ir.block_count();
    let gens = build_gen_sets(ir, table);
    let survive = call_survive_mask(table);

    let mut ins = vec![BitSet::empty(width); block_count];
    let mut outs = vec![BitSet::full(width); block_count];

    loop {
        let mut changed = false;
        for (i, block) in ir.blocks().iter().enumerate() {
            let pinned_entry = i == 0 || block.is_handler_entry();
            let mut inset = if pinned_entry || block.preds.is_empty() {
                BitSet::empty(width)
            } else {
                let mut inset = outs[block.preds[0].index()].clone();
                for pred in &block.preds[1..] {
                    inset.intersect_with(&outs[pred.index()]);
                }
                inset
            };

            let new_out = transfer(block.has_call(), &inset, &gens[i], &survive);
            debug_assert!(
                gens[i].is_subset_of(&new_out),
                "gen must be a subset of out for {}",
                block.id
            );
            debug_assert!(
                new_out.is_subset_of(&outs[i]),
                "out must never grow across iterations for {}",
                block.id
            );
            if new_out != outs[i] {
                outs[i] = new_out;
                changed = true;
            }
            std::mem::swap(&mut ins[i], &mut inset);
        }
        if !changed {
            break;
        }
    }

    AvailabilitySets { ins, outs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cse::{collect_candidates, CseConfig},
        ir::{BinOp, CallEffect, CandidateIndex, MethodIrBuilder, ValueNumber, ValueType},
    };

    fn sum(b: &mut MethodIrBuilder, x: crate::ir::LocalId, vn: u32) -> crate::ir::NodeId {
        let lhs = b.local_read(x, ValueNumber(10));
        let rhs = b.local_read(x, ValueNumber(10));
        b.binary(BinOp::Add, ValueType::Int, ValueNumber(vn), lhs, rhs)
    }

    #[test]
    fn test_straight_line_availability() {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        let b0 = b.block(100.0);
        let s = sum(&mut b, x, 12);
        b.stmt(s);
        let b1 = b.block(100.0);
        let s = sum(&mut b, x, 12);
        b.stmt(s);
        b.edge(b0, b1);

        let mut ir = b.finish();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        let avail = compute_availability(&ir, &table);

        let idx = CandidateIndex::new(1);
        assert!(!avail.ins[0].contains(avail_bit(idx)));
        assert!(avail.outs[0].contains(avail_bit(idx)));
        assert!(avail.ins[1].contains(avail_bit(idx)));
        assert!(avail.ins[1].contains(cross_call_bit(idx)));
    }

    #[test]
    fn test_diamond_meet_is_intersection() {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        let b0 = b.block(100.0);
        let s = sum(&mut b, x, 12);
        b.stmt(s);
        // Only the left arm recomputes the value.
        let b1 = b.block(50.0);
        let s = sum(&mut b, x, 13);
        b.stmt(s);
        let b2 = b.block(50.0);
        let b3 = b.block(100.0);
        let s = sum(&mut b, x, 12);
        b.stmt(s);
        b.edge(b0, b1);
        b.edge(b0, b2);
        b.edge(b1, b3);
        b.edge(b2, b3);

        let mut ir = b.finish();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        let avail = compute_availability(&ir, &table);

        // VN 12 is generated in b0, flows through both arms into b3.
        let idx = CandidateIndex::new(1);
        assert!(avail.ins[3].contains(avail_bit(idx)));
    }

    #[test]
    fn test_call_kills_cross_call_bit() {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        let b0 = b.block(100.0);
        let s = sum(&mut b, x, 12);
        b.stmt(s);
        let call = b.call(CallEffect::General, ValueType::Void, ValueNumber::NONE, vec![]);
        b.stmt(call);
        let b1 = b.block(100.0);
        let s = sum(&mut b, x, 12);
        b.stmt(s);
        b.edge(b0, b1);

        let mut ir = b.finish();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        let avail = compute_availability(&ir, &table);

        let idx = CandidateIndex::new(1);
        // Still available after the call, but not across it.
        assert!(avail.ins[1].contains(avail_bit(idx)));
        assert!(!avail.ins[1].contains(cross_call_bit(idx)));
    }

    #[test]
    fn test_handler_entry_starts_empty() {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        let b0 = b.block(100.0);
        let s = sum(&mut b, x, 12);
        b.stmt(s);
        let b1 = b.block(10.0);
        let s = sum(&mut b, x, 12);
        b.stmt(s);
        b.edge(b0, b1);
        b.mark_handler_entry(b1);

        let mut ir = b.finish();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        let avail = compute_availability(&ir, &table);

        let idx = CandidateIndex::new(1);
        assert!(!avail.ins[1].contains(avail_bit(idx)));
        assert!(avail.outs[1].contains(avail_bit(idx)));
    }

    #[test]
    fn test_occurrence_after_last_call_survives() {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        b.block(100.0);
        let call = b.call(CallEffect::General, ValueType::Void, ValueNumber::NONE, vec![]);
        b.stmt(call);
        let s = sum(&mut b, x, 12);
        b.stmt(s);
        let s = sum(&mut b, x, 12);
        b.stmt(s);

        let mut ir = b.finish();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        let gens = build_gen_sets(&ir, &table);

        let idx = CandidateIndex::new(1);
        assert!(gens[0].contains(avail_bit(idx)));
        assert!(gens[0].contains(cross_call_bit(idx)));
    }
}
