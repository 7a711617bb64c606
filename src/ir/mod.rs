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

//! Method intermediate representation.
//!
//! A [`MethodIr`] owns three arenas: expression nodes, basic blocks, and the
//! local-variable table. The representation is deliberately post-analysis:
//! value numbers, costs, and flags are supplied by the producer, and the
//! optimization passes in [`crate::cse`] only read them and rewrite trees.

mod block;
mod builder;
mod method;
mod node;

pub use block::{BasicBlock, BlockFlags, BlockId, Statement, BLOCK_UNITY_WEIGHT};
pub use builder::MethodIrBuilder;
pub use method::{LocalTable, LocalVar, MethodIr};
pub use node::{
    BinOp, CallEffect, CandidateIndex, CseTag, ExprNode, LocalId, NodeFlags, NodeId, Oper, UnOp,
    ValueNumPair, ValueNumber, ValueType,
};
