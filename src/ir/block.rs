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

//! Basic blocks and statements.

use bitflags::bitflags;

use crate::ir::NodeId;

/// The execution weight of a block that runs exactly once per method call.
///
/// Block weights are multiples (or fractions) of this unit, estimated by the
/// producer from profile data or loop nesting. The heuristic cutoffs are
/// expressed in the same unit.
pub const BLOCK_UNITY_WEIGHT: f64 = 100.0;

/// Index of a basic block within a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// Returns the position of this block in method order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BB{:02}", self.0)
    }
}

bitflags! {
    /// Per-block flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u8 {
        /// This block is the entry of an exception handler or filter.
        /// Availability is cleared on entry to such blocks.
        const HANDLER_ENTRY = 1 << 0;
        /// This block contains at least one call. Maintained by the
        /// candidate collector during its walk.
        const HAS_CALL = 1 << 1;
    }
}

/// A statement: one rooted expression tree executed for its effects.
#[derive(Debug, Clone)]
pub struct Statement {
    /// The root node of the statement's expression tree.
    pub root: NodeId,
}

/// A basic block: an ordered statement list with CFG edges and a weight.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// This block's id.
    pub id: BlockId,
    /// Statements in execution order.
    pub statements: Vec<Statement>,
    /// Predecessor blocks.
    pub preds: Vec<BlockId>,
    /// Successor blocks.
    pub succs: Vec<BlockId>,
    /// Estimated execution weight, in [`BLOCK_UNITY_WEIGHT`] units.
    pub weight: f64,
    /// Block flags.
    pub flags: BlockFlags,
}

impl BasicBlock {
    /// Creates an empty block with the given id and weight.
    #[must_use]
    pub fn new(id: BlockId, weight: f64) -> Self {
        Self {
            id,
            statements: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            weight,
            flags: BlockFlags::empty(),
        }
    }

    /// Returns `true` if this block contains a call.
    #[must_use]
    pub fn has_call(&self) -> bool {
        self.flags.contains(BlockFlags::HAS_CALL)
    }

    /// Returns `true` if this block starts an exception handler.
    #[must_use]
    pub fn is_handler_entry(&self) -> bool {
        self.flags.contains(BlockFlags::HANDLER_ENTRY)
    }
}
