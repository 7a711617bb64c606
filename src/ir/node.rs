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

//! Expression nodes and the per-node state consumed by the CSE pass.
//!
//! Nodes live in a per-method arena ([`crate::ir::MethodIr`]) and are
//! referenced positionally by [`NodeId`]. Each node carries the surface the
//! value-numbering collaborator is expected to supply: operator, operand
//! children, a (conservative, liberal) value-number pair, precomputed
//! size/speed costs, a type tag, and the flag word. The pass itself only
//! adds the [`CseTag`].

use bitflags::bitflags;
use strum::Display;

/// Index of an expression node within a method's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the arena slot of this node.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:06}]", self.0)
    }
}

/// Index of a local variable within a method's local-variable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub(crate) u32);

impl LocalId {
    /// Returns the table slot of this local.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "V{:02}", self.0)
    }
}

/// A value number assigned by the external value-numbering analysis.
///
/// Two nodes sharing a value number are known to compute equal values at
/// runtime. [`ValueNumber::NONE`] is the reserved sentinel for nodes the
/// analysis did not number; such nodes are never CSE candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueNumber(pub u32);

impl ValueNumber {
    /// Reserved sentinel: no value number assigned.
    pub const NONE: ValueNumber = ValueNumber(0);

    /// Returns `true` if this is the reserved sentinel.
    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl std::fmt::Display for ValueNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "$VN{}", self.0)
    }
}

/// The (conservative, liberal) value-number pair of a node.
///
/// The liberal number assumes no aliasing interference and is used to group
/// CSE candidates; the conservative number is what gets propagated to
/// rewritten reads when all definitions agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueNumPair {
    /// The conservative value number.
    pub conservative: ValueNumber,
    /// The liberal value number.
    pub liberal: ValueNumber,
}

impl ValueNumPair {
    /// A pair with both sides set to the reserved sentinel.
    pub const NONE: ValueNumPair = ValueNumPair {
        conservative: ValueNumber::NONE,
        liberal: ValueNumber::NONE,
    };

    /// Creates a pair with both sides set to `vn`.
    #[must_use]
    pub fn both(vn: ValueNumber) -> Self {
        Self {
            conservative: vn,
            liberal: vn,
        }
    }
}

/// The static type of a node's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ValueType {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// Object reference.
    Ref,
    /// Managed pointer / interior reference.
    ByRef,
    /// Value type with no primitive representation.
    Struct,
    /// No value.
    Void,
}

impl ValueType {
    /// Returns `true` for the floating-point types.
    #[must_use]
    pub fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Returns the stack slot size of this type in bytes.
    #[must_use]
    pub fn slot_size(self, pointer_size: u32) -> u32 {
        match self {
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
            Self::Ref | Self::ByRef => pointer_size,
            // Struct sizes are layout-dependent; two slots is a workable
            // estimate for frame-size purposes.
            Self::Struct => pointer_size * 2,
            Self::Void => 0,
        }
    }
}

/// The externally observable effect class of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CallEffect {
    /// No observable effect; the result depends only on the arguments.
    Pure,
    /// A runtime helper whose only effect is benign (allocation-free lookup,
    /// lazy initialization); safe to elide when its value is cached.
    Helper,
    /// Arbitrary observable side effects; must always execute.
    General,
}

/// Binary operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Left shift.
    Shl,
    /// Right shift.
    Shr,
    /// Less-than comparison.
    Lt,
    /// Greater-than comparison.
    Gt,
    /// Equality comparison.
    Eq,
}

/// Unary operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Not,
}

/// The operator of an expression node.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum Oper {
    /// Integer constant.
    IntConst(i64),
    /// Floating-point constant.
    FloatConst(f64),
    /// Read of a local variable.
    LocalRead(LocalId),
    /// Store of the single child into a local variable. Produces no value.
    StoreLocal(LocalId),
    /// Binary operation over two children.
    Binary(BinOp),
    /// Unary operation over one child.
    Unary(UnOp),
    /// Length of the array referenced by the single child.
    ArrayLength,
    /// Address of an array element: children are (array, index).
    IndexAddr,
    /// Memory load through the address computed by the single child.
    Load,
    /// Bounds check: children are (index, length). Produces no value,
    /// throws on failure.
    BoundsCheck,
    /// Call with the given effect class; children are the arguments.
    Call(CallEffect),
    /// Evaluate the first child for effect, yield the second.
    Comma,
}

bitflags! {
    /// Per-node flag word supplied by the IR producer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// This node is the target of an assignment.
        const ASG_TARGET = 1 << 0;
        /// This node has a persistent side effect that must always execute.
        const SIDE_EFFECT = 1 << 1;
        /// This node is a constant.
        const IS_CONSTANT = 1 << 2;
        /// The producer forbids caching this node.
        const NEVER_CSE = 1 << 3;
        /// This node sits in the conditionally evaluated arm of a
        /// ternary-style expression.
        const CONDITIONALLY_EVALUATED = 1 << 4;
    }
}

/// Dense index of an indexed CSE candidate, 1-based.
///
/// At most [`crate::cse::TargetPolicy::max_candidates`] of these exist per
/// method; the dataflow bit sets and the allow mask are addressed by the
/// zero-based [`CandidateIndex::index0`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateIndex(u8);

impl CandidateIndex {
    /// Creates a candidate index.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is zero; candidate indices are 1-based.
    #[must_use]
    pub fn new(raw: u8) -> Self {
        assert!(raw != 0, "candidate indices are 1-based");
        Self(raw)
    }

    /// Returns the 1-based raw value.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Returns the zero-based value used to address bit sets.
    #[must_use]
    pub fn index0(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl std::fmt::Display for CandidateIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CSE #{:02}", self.0)
    }
}

/// Per-node CSE state, advanced by the pass stages.
///
/// Lifecycle: `NotACandidate → PendingFirstSight → Candidate(idx) →
/// {Def(idx), Use(idx)}`, with reversion to `NotACandidate` when an
/// occurrence is invalidated (conditional-arm definitions, nested
/// occurrences discarded by an enclosing rewrite, candidate cap reached).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CseTag {
    /// Not a candidate occurrence.
    #[default]
    NotACandidate,
    /// First sighting of an eligible expression; becomes a candidate only if
    /// a duplicate is found.
    PendingFirstSight,
    /// Indexed candidate occurrence awaiting def/use classification.
    Candidate(CandidateIndex),
    /// Classified as the first computation on some path.
    Def(CandidateIndex),
    /// Classified as a re-computation of an already available value.
    Use(CandidateIndex),
}

impl CseTag {
    /// Returns the candidate index if this tag carries one.
    #[must_use]
    pub fn index(self) -> Option<CandidateIndex> {
        match self {
            Self::NotACandidate | Self::PendingFirstSight => None,
            Self::Candidate(idx) | Self::Def(idx) | Self::Use(idx) => Some(idx),
        }
    }
}

/// One expression node in a method's IR.
#[derive(Debug, Clone)]
pub struct ExprNode {
    /// The operator.
    pub oper: Oper,
    /// Operand children, in evaluation order.
    pub children: Vec<NodeId>,
    /// The (conservative, liberal) value-number pair.
    pub vn: ValueNumPair,
    /// The static type of the produced value.
    pub ty: ValueType,
    /// Precomputed code-size cost of recomputing this node.
    pub size_cost: u8,
    /// Precomputed execution-time cost of recomputing this node.
    pub speed_cost: u8,
    /// Producer-supplied flags.
    pub flags: NodeFlags,
    /// CSE state, owned by the pass.
    pub cse_tag: CseTag,
}

impl ExprNode {
    /// Returns `true` if this node itself anchors a persistent side effect
    /// (as opposed to merely containing one in its subtree).
    #[must_use]
    pub fn is_effect_anchor(&self) -> bool {
        self.flags.contains(NodeFlags::SIDE_EFFECT)
            || matches!(
                self.oper,
                Oper::StoreLocal(_) | Oper::BoundsCheck | Oper::Call(CallEffect::General)
            )
    }

    /// Returns `true` if this node is a call of any effect class.
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self.oper, Oper::Call(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_index_is_one_based() {
        let idx = CandidateIndex::new(1);
        assert_eq!(idx.index0(), 0);
        assert_eq!(idx.to_string(), "CSE #01");
    }

    #[test]
    #[should_panic(expected = "1-based")]
    fn test_candidate_index_rejects_zero() {
        let _ = CandidateIndex::new(0);
    }

    #[test]
    fn test_tag_index_extraction() {
        let idx = CandidateIndex::new(3);
        assert_eq!(CseTag::Def(idx).index(), Some(idx));
        assert_eq!(CseTag::Use(idx).index(), Some(idx));
        assert_eq!(CseTag::NotACandidate.index(), None);
        assert_eq!(CseTag::PendingFirstSight.index(), None);
    }

    #[test]
    fn test_effect_anchor() {
        let store = ExprNode {
            oper: Oper::StoreLocal(LocalId(0)),
            children: vec![NodeId(1)],
            vn: ValueNumPair::NONE,
            ty: ValueType::Void,
            size_cost: 1,
            speed_cost: 1,
            flags: NodeFlags::empty(),
            cse_tag: CseTag::NotACandidate,
        };
        assert!(store.is_effect_anchor());

        let pure_call = ExprNode {
            oper: Oper::Call(CallEffect::Pure),
            children: Vec::new(),
            vn: ValueNumPair::NONE,
            ty: ValueType::Int,
            size_cost: 4,
            speed_cost: 10,
            flags: NodeFlags::empty(),
            cse_tag: CseTag::NotACandidate,
        };
        assert!(!pure_call.is_effect_anchor());
        assert!(pure_call.is_call());
    }
}
