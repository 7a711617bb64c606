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

//! Def/use classification of candidate occurrences.
//!
//! A second full walk, in the same order as collection, carries a working
//! availability set seeded from each block's converged `In`. The first
//! occurrence on a path becomes a `Def` and publishes its bits; later
//! occurrences become `Use`s. A use whose value did not survive an
//! intervening call marks the candidate live-across-call. Definitions inside
//! a conditionally evaluated arm are reverted: hoisting them would turn a
//! guarded computation into an unconditional one.

use crate::{
    cse::{
        dataflow::{avail_bit, cross_call_bit, AvailabilitySets},
        CandidateTable,
    },
    ir::{BlockId, CseTag, MethodIr, NodeFlags},
};

/// Labels every indexed occurrence as `Def` or `Use` and accumulates the
/// per-candidate counts the heuristic consumes.
pub fn classify(ir: &mut MethodIr, table: &mut CandidateTable, avail: &AvailabilitySets) {
    let survive = super::dataflow::call_survive_mask(table);

    for block_index in 0..ir.block_count() {
        let block_id = BlockId(block_index as u32);
        let weight = ir.block(block_id).weight;
        let mut available = avail.ins[block_index].clone();

        let stmt_count = ir.block(block_id).statements.len();
        for stmt_index in 0..stmt_count {
            let root = ir.block(block_id).statements[stmt_index].root;
            for node in ir.postorder(root) {
                let is_call = ir.node(node).is_call();

                let CseTag::Candidate(index) = ir.node(node).cse_tag else {
                    if is_call {
                        available.intersect_with(&survive);
                    }
                    continue;
                };

                if available.contains(avail_bit(index)) {
                    // A use-call suppresses the kill entirely: the killed
                    // values are the ones consumed while producing it.
                    ir.node_mut(node).cse_tag = CseTag::Use(index);
                    let live_across_call = !available.contains(cross_call_bit(index));
                    let desc = table.by_index_mut(index);
                    desc.use_count += 1;
                    desc.use_weight += weight;
                    if live_across_call {
                        desc.live_across_call = true;
                    }
                } else if ir
                    .node(node)
                    .flags
                    .contains(NodeFlags::CONDITIONALLY_EVALUATED)
                {
                    // Cannot safely become an unconditional definition.
                    ir.node_mut(node).cse_tag = CseTag::NotACandidate;
                    if is_call {
                        available.intersect_with(&survive);
                    }
                } else {
                    // A def-call kills first and then publishes its own bits.
                    if is_call {
                        available.intersect_with(&survive);
                    }
                    let conservative_vn = ir.node(node).vn.conservative;
                    ir.node_mut(node).cse_tag = CseTag::Def(index);
                    available.insert(avail_bit(index));
                    available.insert(cross_call_bit(index));
                    let desc = table.by_index_mut(index);
                    desc.def_count += 1;
                    desc.def_weight += weight;
                    desc.defined_value.record(conservative_vn);
                }
            }
        }
    }
}
