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

//! Candidate collection and indexing.
//!
//! A single walk over every statement of every block finds eligible
//! expressions, groups them by liberal value number, and assigns a dense
//! [`CandidateIndex`] to each group the moment a second occurrence confirms
//! the duplication. Groups seen only once never become candidates; groups
//! discovered after the cap keep their extra occurrences untagged.

use std::collections::HashMap;

use crate::{
    cse::CseConfig,
    ir::{
        BlockFlags, BlockId, CandidateIndex, CseTag, MethodIr, NodeFlags, NodeId, Oper,
        ValueNumber, ValueType,
    },
};

/// One occurrence of a candidate expression.
#[derive(Debug, Clone, Copy)]
pub struct Occurrence {
    /// The occurrence node.
    pub node: NodeId,
    /// The enclosing block.
    pub block: BlockId,
    /// The statement's position within the block.
    pub statement: usize,
    /// Global walk sequence number; orders occurrences and calls across the
    /// whole method.
    pub seq: u32,
}

/// The common conservative value number shared by a candidate's definitions.
///
/// Collapses to [`DefinedValue::Mixed`] the moment two definitions disagree;
/// the degrade is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefinedValue {
    /// No definition classified yet.
    #[default]
    Unseen,
    /// All definitions so far share this conservative value number.
    Single(ValueNumber),
    /// Definitions disagree; no single value number can be propagated.
    Mixed,
}

impl DefinedValue {
    /// Folds in one definition's conservative value number.
    pub fn record(&mut self, vn: ValueNumber) {
        *self = match *self {
            Self::Unseen => Self::Single(vn),
            Self::Single(existing) if existing == vn => Self::Single(existing),
            Self::Single(_) | Self::Mixed => Self::Mixed,
        };
    }

    /// Returns the single shared value number, if any.
    #[must_use]
    pub fn single(self) -> Option<ValueNumber> {
        match self {
            Self::Single(vn) => Some(vn),
            Self::Unseen | Self::Mixed => None,
        }
    }
}

/// Everything known about one value-numbered expression group.
#[derive(Debug, Clone)]
pub struct CandidateDescriptor {
    /// Dense index, assigned when a duplicate confirms the group.
    pub index: Option<CandidateIndex>,
    /// The liberal value number keying this group.
    pub key: ValueNumber,
    /// The value type of the expression.
    pub ty: ValueType,
    /// Code-size cost of one recomputation.
    pub size_cost: u8,
    /// Execution-time cost of one recomputation.
    pub speed_cost: u8,
    /// Occurrences in discovery (= program) order.
    pub occurrences: Vec<Occurrence>,
    /// Raw definition count, filled by classification.
    pub def_count: u32,
    /// Raw use count, filled by classification.
    pub use_count: u32,
    /// Block-weighted definition count.
    pub def_weight: f64,
    /// Block-weighted use count.
    pub use_weight: f64,
    /// The cached value must survive at least one call boundary.
    pub live_across_call: bool,
    /// The shared conservative value number of the definitions.
    pub defined_value: DefinedValue,
}

impl CandidateDescriptor {
    fn new(key: ValueNumber, ty: ValueType, size_cost: u8, speed_cost: u8) -> Self {
        Self {
            index: None,
            key,
            ty,
            size_cost,
            speed_cost,
            occurrences: Vec::new(),
            def_count: 0,
            use_count: 0,
            def_weight: 0.0,
            use_weight: 0.0,
            live_across_call: false,
            defined_value: DefinedValue::Unseen,
        }
    }
}

/// The candidate table built by [`collect_candidates`].
#[derive(Debug, Default)]
pub struct CandidateTable {
    descriptors: Vec<CandidateDescriptor>,
    by_key: HashMap<ValueNumber, usize>,
    /// Descriptor slot per assigned index, in index order.
    index_slots: Vec<usize>,
    /// Walk sequence number of the last call in each block.
    last_call_seq: Vec<Option<u32>>,
    cap_reached: bool,
}

impl CandidateTable {
    /// Number of indexed candidates.
    #[must_use]
    pub fn indexed_count(&self) -> usize {
        self.index_slots.len()
    }

    /// Returns `true` if no expression group was confirmed as a candidate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index_slots.is_empty()
    }

    /// Returns `true` if the candidate cap cut off later groups.
    #[must_use]
    pub fn cap_reached(&self) -> bool {
        self.cap_reached
    }

    /// Returns the descriptor of the candidate with the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` was never assigned.
    #[must_use]
    pub fn by_index(&self, index: CandidateIndex) -> &CandidateDescriptor {
        &self.descriptors[self.index_slots[index.index0()]]
    }

    /// Returns the descriptor of the candidate with the given index, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index` was never assigned.
    pub fn by_index_mut(&mut self, index: CandidateIndex) -> &mut CandidateDescriptor {
        &mut self.descriptors[self.index_slots[index.index0()]]
    }

    /// Iterates over indexed candidates in index order.
    pub fn indexed(&self) -> impl Iterator<Item = &CandidateDescriptor> {
        self.index_slots.iter().map(|&slot| &self.descriptors[slot])
    }

    /// The walk sequence number of the last call in `block`, if any.
    #[must_use]
    pub fn last_call_seq(&self, block: BlockId) -> Option<u32> {
        self.last_call_seq[block.index()]
    }
}

/// Returns `true` if `node` may be cached in a temporary.
fn is_eligible(ir: &MethodIr, node: NodeId, config: &CseConfig) -> bool {
    let n = ir.node(node);

    if n.flags.contains(NodeFlags::ASG_TARGET) || n.flags.contains(NodeFlags::NEVER_CSE) {
        return false;
    }
    if matches!(n.ty, ValueType::Struct | ValueType::Void) {
        return false;
    }
    if n.vn.liberal.is_none() {
        return false;
    }
    let cost = if config.optimize_for_size {
        n.size_cost
    } else {
        n.speed_cost
    };
    if cost < config.policy.min_candidate_cost {
        return false;
    }
    if n.is_effect_anchor() {
        return false;
    }
    if n.flags.contains(NodeFlags::IS_CONSTANT) && !config.const_cse {
        return false;
    }
    // Prefer caching the element address over a load through it; the address
    // subsumes the narrower loaded value.
    if matches!(n.oper, Oper::Load)
        && matches!(ir.node(n.children[0]).oper, Oper::IndexAddr)
    {
        return false;
    }
    true
}

/// Walks the method and builds the candidate table.
///
/// Tags nodes `PendingFirstSight` on first sighting and `Candidate(idx)`
/// once duplicated; also sets the `HAS_CALL` flag on blocks containing
/// calls. Unconfirmed first sightings are reverted before returning.
pub fn collect_candidates(ir: &mut MethodIr, config: &CseConfig) -> CandidateTable {
    let mut table = CandidateTable {
        last_call_seq: vec![None; ir.block_count()],
        ..CandidateTable::default()
    };

    let mut seq: u32 = 0;
    for block_index in 0..ir.block_count() {
        let block_id = BlockId(block_index as u32);
        let stmt_count = ir.block(block_id).statements.len();
        for stmt_index in 0..stmt_count {
            let root = ir.block(block_id).statements[stmt_index].root;
            for node in ir.postorder(root) {
                seq += 1;
                if ir.node(node).is_call() {
                    table.last_call_seq[block_index] = Some(seq);
                    ir.block_mut(block_id).flags |= BlockFlags::HAS_CALL;
                }
                if !is_eligible(ir, node, config) {
                    continue;
                }

                let occurrence = Occurrence {
                    node,
                    block: block_id,
                    statement: stmt_index,
                    seq,
                };
                record_occurrence(ir, &mut table, occurrence, config);
            }
        }
    }

    // Groups with a single sighting never became candidates; drop their
    // provisional tags.
    for desc in &table.descriptors {
        if desc.index.is_none() {
            for occ in &desc.occurrences {
                ir.node_mut(occ.node).cse_tag = CseTag::NotACandidate;
            }
        }
    }

    table
}

fn record_occurrence(
    ir: &mut MethodIr,
    table: &mut CandidateTable,
    occurrence: Occurrence,
    config: &CseConfig,
) {
    let node = occurrence.node;
    let key = ir.node(node).vn.liberal;

    let slot = match table.by_key.get(&key) {
        Some(&slot) => slot,
        None => {
            let n = ir.node(node);
            let slot = table.descriptors.len();
            table
                .descriptors
                .push(CandidateDescriptor::new(key, n.ty, n.size_cost, n.speed_cost));
            table.by_key.insert(key, slot);
            table.descriptors[slot].occurrences.push(occurrence);
            ir.node_mut(node).cse_tag = CseTag::PendingFirstSight;
            return;
        }
    };

    match table.descriptors[slot].index {
        Some(index) => {
            table.descriptors[slot].occurrences.push(occurrence);
            ir.node_mut(node).cse_tag = CseTag::Candidate(index);
        }
        None => {
            if table.index_slots.len() >= config.policy.max_candidates {
                // Cap reached: this sighting stays untagged.
                table.cap_reached = true;
                return;
            }
            let raw = u8::try_from(table.index_slots.len() + 1)
                .expect("candidate cap exceeds u8 range");
            let index = CandidateIndex::new(raw);
            table.index_slots.push(slot);

            let desc = &mut table.descriptors[slot];
            desc.index = Some(index);
            let first = desc.occurrences[0].node;
            desc.occurrences.push(occurrence);
            ir.node_mut(first).cse_tag = CseTag::Candidate(index);
            ir.node_mut(node).cse_tag = CseTag::Candidate(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, CallEffect, MethodIrBuilder, ValueNumber};

    fn two_sums() -> (MethodIr, NodeId, NodeId) {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        let y = b.local("y", ValueType::Int);
        b.block(100.0);
        let s1 = {
            let lhs = b.local_read(x, ValueNumber(10));
            let rhs = b.local_read(y, ValueNumber(11));
            b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs)
        };
        b.stmt(s1);
        let s2 = {
            let lhs = b.local_read(x, ValueNumber(10));
            let rhs = b.local_read(y, ValueNumber(11));
            b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs)
        };
        b.stmt(s2);
        (b.finish(), s1, s2)
    }

    #[test]
    fn test_duplicate_expression_is_indexed() {
        let (mut ir, s1, s2) = two_sums();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());

        assert_eq!(table.indexed_count(), 1);
        let idx = CandidateIndex::new(1);
        assert_eq!(table.by_index(idx).occurrences.len(), 2);
        assert_eq!(ir.node(s1).cse_tag, CseTag::Candidate(idx));
        assert_eq!(ir.node(s2).cse_tag, CseTag::Candidate(idx));
    }

    #[test]
    fn test_single_sighting_is_reverted() {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        b.block(100.0);
        let lhs = b.local_read(x, ValueNumber(10));
        let rhs = b.int_const(1);
        let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
        b.stmt(sum);

        let mut ir = b.finish();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        assert!(table.is_empty());
        assert_eq!(ir.node(sum).cse_tag, CseTag::NotACandidate);
    }

    #[test]
    fn test_side_effecting_call_is_never_a_candidate() {
        let mut b = MethodIrBuilder::new("m");
        b.block(100.0);
        let c1 = b.call(CallEffect::General, ValueType::Int, ValueNumber(20), vec![]);
        b.stmt(c1);
        let c2 = b.call(CallEffect::General, ValueType::Int, ValueNumber(20), vec![]);
        b.stmt(c2);

        let mut ir = b.finish();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        assert!(table.is_empty());
        assert!(ir.blocks()[0].has_call());
    }

    #[test]
    fn test_distinct_value_numbers_never_merge() {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        b.block(100.0);
        let s1 = {
            let lhs = b.local_read(x, ValueNumber(10));
            let rhs = b.local_read(x, ValueNumber(10));
            b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs)
        };
        b.stmt(s1);
        // Syntactically identical but numbered differently, as after a
        // possibly aliasing store.
        let s2 = {
            let lhs = b.local_read(x, ValueNumber(30));
            let rhs = b.local_read(x, ValueNumber(30));
            b.binary(BinOp::Add, ValueType::Int, ValueNumber(31), lhs, rhs)
        };
        b.stmt(s2);

        let mut ir = b.finish();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        assert!(table.is_empty());
    }

    #[test]
    fn test_load_prefers_address_computation() {
        let mut b = MethodIrBuilder::new("m");
        let a = b.local("a", ValueType::Ref);
        let i = b.local("i", ValueType::Int);
        b.block(100.0);
        for vn_load in [40u32, 41] {
            let arr = b.local_read(a, ValueNumber(10));
            let idx = b.local_read(i, ValueNumber(11));
            let addr = b.index_addr(ValueNumber(12), arr, idx);
            let load = b.load(ValueType::Int, ValueNumber(vn_load), addr);
            b.stmt(load);
        }

        let mut ir = b.finish();
        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        assert_eq!(table.indexed_count(), 1);
        let desc = table.by_index(CandidateIndex::new(1));
        assert_eq!(desc.key, ValueNumber(12));
    }

    #[test]
    fn test_constants_gated_by_policy() {
        let mut b = MethodIrBuilder::new("m");
        b.block(100.0);
        let c1 = b.int_const(1234);
        b.costs(c1, 4, 2);
        b.stmt(c1);
        let c2 = b.int_const(1234);
        b.costs(c2, 4, 2);
        b.stmt(c2);
        let mut ir = b.finish();

        let table = collect_candidates(&mut ir, &CseConfig::enabled());
        assert!(table.is_empty());

        let mut config = CseConfig::enabled();
        config.const_cse = true;
        // Tags were reverted, safe to re-collect.
        let table = collect_candidates(&mut ir, &config);
        assert_eq!(table.indexed_count(), 1);
    }

    #[test]
    fn test_cap_leaves_extra_groups_untagged() {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        b.block(100.0);
        let mut roots = Vec::new();
        // Three distinct duplicated groups, cap of two.
        for group in 0u32..3 {
            for _ in 0..2 {
                let lhs = b.local_read(x, ValueNumber(10));
                let rhs = b.local_read(x, ValueNumber(10));
                let sum = b.binary(
                    BinOp::Add,
                    ValueType::Int,
                    ValueNumber(100 + group),
                    lhs,
                    rhs,
                );
                roots.push(sum);
                b.stmt(sum);
            }
        }
        let mut ir = b.finish();

        let mut config = CseConfig::enabled();
        config.policy.max_candidates = 2;
        let table = collect_candidates(&mut ir, &config);

        assert_eq!(table.indexed_count(), 2);
        assert!(table.cap_reached());
        assert_eq!(ir.node(roots[4]).cse_tag, CseTag::NotACandidate);
        assert_eq!(ir.node(roots[5]).cse_tag, CseTag::NotACandidate);
    }
}
