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

//! IR rewriting for promoted candidates.
//!
//! A def becomes `Comma(StoreLocal(temp, expr), LocalRead(temp))` so the
//! position still yields its value while publishing it; a use becomes a read
//! of the temp, prefixed by any side effects of the replaced subtree that
//! must still execute. Candidate tags nested purely inside the discarded
//! part of a replaced use are unmarked, with their counts decremented so
//! later promotion decisions see the loss.

use crate::{
    cse::{CandidateTable, DefinedValue},
    ir::{
        CandidateIndex, CseTag, ExprNode, LocalId, MethodIr, NodeFlags, NodeId, Oper,
        ValueNumPair,
    },
};

/// Splits the subtree rooted at `root` into the side-effect roots that must
/// be kept and the pure interior nodes that the rewrite discards.
///
/// Kept roots are the shallowest effect-anchoring nodes, in evaluation
/// order; their subtrees (nested candidate tags included) are preserved
/// whole. Everything above and between them is returned as discarded.
pub(crate) fn split_side_effects(ir: &MethodIr, root: NodeId) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut kept = Vec::new();
    let mut discarded = Vec::new();
    split_into(ir, root, &mut kept, &mut discarded);
    (kept, discarded)
}

fn split_into(ir: &MethodIr, node: NodeId, kept: &mut Vec<NodeId>, discarded: &mut Vec<NodeId>) {
    if ir.node(node).is_effect_anchor() {
        kept.push(node);
        return;
    }
    discarded.push(node);
    for i in 0..ir.node(node).children.len() {
        let child = ir.node(node).children[i];
        split_into(ir, child, kept, discarded);
    }
}

/// Unmarks candidate tags on the discarded pure nodes of a replaced use,
/// decrementing the owning candidates' counts. The occurrence being
/// rewritten itself (`exclude`) is left alone.
fn unmark_discarded(
    ir: &mut MethodIr,
    table: &mut CandidateTable,
    discarded: &[NodeId],
    exclude: NodeId,
    weight: f64,
) {
    for &node in discarded {
        if node == exclude {
            continue;
        }
        let tag = ir.node(node).cse_tag;
        let Some(index) = tag.index() else {
            continue;
        };
        ir.node_mut(node).cse_tag = CseTag::NotACandidate;
        let desc = table.by_index_mut(index);
        match tag {
            CseTag::Def(_) => {
                desc.def_count = desc.def_count.saturating_sub(1);
                desc.def_weight = (desc.def_weight - weight).max(0.0);
            }
            CseTag::Use(_) => {
                desc.use_count = desc.use_count.saturating_sub(1);
                desc.use_weight = (desc.use_weight - weight).max(0.0);
            }
            _ => {}
        }
    }
}

fn read_node(ir: &MethodIr, temp: LocalId, occurrence: NodeId, defined_value: DefinedValue) -> ExprNode {
    let original = ir.node(occurrence);
    let mut vn = original.vn;
    if let Some(single) = defined_value.single() {
        // All defs agree, so the read provably computes that exact value;
        // downstream passes can treat it as the defining computation.
        vn.conservative = single;
    }
    ExprNode {
        oper: Oper::LocalRead(temp),
        children: Vec::new(),
        vn,
        ty: original.ty,
        size_cost: 1,
        speed_cost: 1,
        flags: NodeFlags::empty(),
        cse_tag: CseTag::NotACandidate,
    }
}

/// Rewrites one definition occurrence in place.
///
/// The original expression relocates into the store's operand position;
/// the occurrence slot becomes the comma yielding the temp.
pub(crate) fn rewrite_def(
    ir: &mut MethodIr,
    table: &CandidateTable,
    index: CandidateIndex,
    occurrence: NodeId,
    temp: LocalId,
    weight: f64,
) {
    let desc = table.by_index(index);
    let read = read_node(ir, temp, occurrence, desc.defined_value);
    let comma_vn = read.vn;
    let ty = read.ty;

    let comma = ExprNode {
        oper: Oper::Comma,
        children: Vec::new(),
        vn: comma_vn,
        ty,
        size_cost: 0,
        speed_cost: 0,
        flags: NodeFlags::empty(),
        cse_tag: CseTag::NotACandidate,
    };
    let relocated = ir.replace_node(occurrence, comma);
    ir.node_mut(relocated).cse_tag = CseTag::NotACandidate;

    let store = ir.push_node(ExprNode {
        oper: Oper::StoreLocal(temp),
        children: vec![relocated],
        vn: ValueNumPair::NONE,
        ty: crate::ir::ValueType::Void,
        size_cost: 1,
        speed_cost: 1,
        flags: NodeFlags::empty(),
        cse_tag: CseTag::NotACandidate,
    });
    let read = ir.push_node(read);
    ir.node_mut(occurrence).children = vec![store, read];

    // A def references the temp twice: the store and the yielded read.
    ir.record_local_referenced(temp, weight);
    ir.record_local_referenced(temp, weight);
}

/// Rewrites one use occurrence in place, preserving side effects.
pub(crate) fn rewrite_use(
    ir: &mut MethodIr,
    table: &mut CandidateTable,
    index: CandidateIndex,
    occurrence: NodeId,
    temp: LocalId,
    weight: f64,
) {
    let (kept, discarded) = split_side_effects(ir, occurrence);
    unmark_discarded(ir, table, &discarded, occurrence, weight);

    let desc = table.by_index(index);
    let read = read_node(ir, temp, occurrence, desc.defined_value);

    if kept.is_empty() {
        ir.replace_node(occurrence, read);
    } else {
        // sequence(effect_1, ... sequence(effect_n, read(temp)))
        let vn = read.vn;
        let ty = read.ty;
        let mut tail = ir.push_node(read);
        for &effect in kept.iter().skip(1).rev() {
            tail = ir.push_node(ExprNode {
                oper: Oper::Comma,
                children: vec![effect, tail],
                vn,
                ty,
                size_cost: 0,
                speed_cost: 0,
                flags: NodeFlags::empty(),
                cse_tag: CseTag::NotACandidate,
            });
        }
        let outer = ExprNode {
            oper: Oper::Comma,
            children: vec![kept[0], tail],
            vn,
            ty,
            size_cost: 0,
            speed_cost: 0,
            flags: NodeFlags::empty(),
            cse_tag: CseTag::NotACandidate,
        };
        ir.replace_node(occurrence, outer);
    }

    ir.record_local_referenced(temp, weight);
}
