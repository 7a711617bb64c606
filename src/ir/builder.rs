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

//! Convenience builder for assembling method IR.
//!
//! The builder keeps a current block and offers one constructor per operator
//! with workable default costs, so producers (and tests) can assemble trees
//! without spelling out every [`ExprNode`] field. Value numbers are supplied
//! per node the way a value-numbering analysis would have assigned them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jitopt::ir::{MethodIrBuilder, ValueNumber, ValueType, BinOp};
//!
//! let mut b = MethodIrBuilder::new("example");
//! let x = b.local("x", ValueType::Int);
//! let entry = b.block(100.0);
//! let lhs = b.local_read(x, ValueNumber(10));
//! let rhs = b.int_const(4);
//! let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(11), lhs, rhs);
//! b.stmt(sum);
//! let ir = b.finish();
//! ```

use crate::ir::{
    BasicBlock, BinOp, BlockFlags, BlockId, CallEffect, CseTag, ExprNode, LocalId, MethodIr,
    NodeFlags, NodeId, Oper, Statement, UnOp, ValueNumPair, ValueNumber, ValueType,
};

/// Builder for [`MethodIr`].
#[derive(Debug)]
pub struct MethodIrBuilder {
    ir: MethodIr,
    current_block: Option<BlockId>,
}

impl MethodIrBuilder {
    /// Creates a builder for a method with the default local-table capacity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            ir: MethodIr::new(name),
            current_block: None,
        }
    }

    /// Creates a builder with an explicit local-table capacity.
    #[must_use]
    pub fn with_local_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            ir: MethodIr::with_local_capacity(name, capacity),
            current_block: None,
        }
    }

    /// Declares a user-visible local variable.
    ///
    /// # Panics
    ///
    /// Panics if the local table is full.
    pub fn local(&mut self, name: impl Into<String>, ty: ValueType) -> LocalId {
        self.ir
            .locals_mut()
            .push(crate::ir::LocalVar {
                name: name.into(),
                ty,
                ref_count: 0,
                weighted_ref_count: 0.0,
                is_param: false,
                do_not_enregister: false,
                compiler_introduced: false,
            })
            .expect("local table full")
    }

    /// Opens a new basic block with the given weight; subsequent statements
    /// are appended to it.
    pub fn block(&mut self, weight: f64) -> BlockId {
        let id = BlockId(u32::try_from(self.ir.block_count()).expect("block list overflow"));
        self.ir.push_block(BasicBlock::new(id, weight));
        self.current_block = Some(id);
        id
    }

    /// Switches statement appending back to an already opened block.
    pub fn select_block(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    /// Adds a CFG edge from `from` to `to`.
    pub fn edge(&mut self, from: BlockId, to: BlockId) {
        self.ir.block_mut(from).succs.push(to);
        self.ir.block_mut(to).preds.push(from);
    }

    /// Marks `block` as the entry of an exception handler.
    pub fn mark_handler_entry(&mut self, block: BlockId) {
        self.ir.block_mut(block).flags |= BlockFlags::HANDLER_ENTRY;
    }

    /// Appends a statement rooted at `root` to the current block.
    ///
    /// # Panics
    ///
    /// Panics if no block has been opened.
    pub fn stmt(&mut self, root: NodeId) {
        let block = self.current_block.expect("no current block");
        self.ir.block_mut(block).statements.push(Statement { root });
    }

    fn push(
        &mut self,
        oper: Oper,
        children: Vec<NodeId>,
        ty: ValueType,
        vn: ValueNumPair,
        size_cost: u8,
        speed_cost: u8,
        flags: NodeFlags,
    ) -> NodeId {
        self.ir.push_node(ExprNode {
            oper,
            children,
            vn,
            ty,
            size_cost,
            speed_cost,
            flags,
            cse_tag: CseTag::NotACandidate,
        })
    }

    /// Creates an integer constant node.
    pub fn int_const(&mut self, value: i64) -> NodeId {
        self.push(
            Oper::IntConst(value),
            Vec::new(),
            ValueType::Int,
            ValueNumPair::both(ValueNumber(0x4000_0000 | (value as u32 & 0xFFFF))),
            1,
            1,
            NodeFlags::IS_CONSTANT,
        )
    }

    /// Creates a floating-point constant node.
    pub fn float_const(&mut self, value: f64, vn: ValueNumber) -> NodeId {
        self.push(
            Oper::FloatConst(value),
            Vec::new(),
            ValueType::Double,
            ValueNumPair::both(vn),
            2,
            1,
            NodeFlags::IS_CONSTANT,
        )
    }

    /// Creates a read of a local variable.
    pub fn local_read(&mut self, local: LocalId, vn: ValueNumber) -> NodeId {
        let ty = self.ir.locals().get(local).ty;
        self.push(
            Oper::LocalRead(local),
            Vec::new(),
            ty,
            ValueNumPair::both(vn),
            1,
            1,
            NodeFlags::empty(),
        )
    }

    /// Creates a store of `value` into `local`.
    pub fn store_local(&mut self, local: LocalId, value: NodeId) -> NodeId {
        self.push(
            Oper::StoreLocal(local),
            vec![value],
            ValueType::Void,
            ValueNumPair::NONE,
            1,
            1,
            NodeFlags::empty(),
        )
    }

    /// Creates a binary operation node.
    pub fn binary(
        &mut self,
        op: BinOp,
        ty: ValueType,
        vn: ValueNumber,
        lhs: NodeId,
        rhs: NodeId,
    ) -> NodeId {
        self.push(
            Oper::Binary(op),
            vec![lhs, rhs],
            ty,
            ValueNumPair::both(vn),
            2,
            2,
            NodeFlags::empty(),
        )
    }

    /// Creates a unary operation node.
    pub fn unary(&mut self, op: UnOp, ty: ValueType, vn: ValueNumber, operand: NodeId) -> NodeId {
        self.push(
            Oper::Unary(op),
            vec![operand],
            ty,
            ValueNumPair::both(vn),
            1,
            1,
            NodeFlags::empty(),
        )
    }

    /// Creates an array-length node.
    pub fn array_length(&mut self, vn: ValueNumber, array: NodeId) -> NodeId {
        self.push(
            Oper::ArrayLength,
            vec![array],
            ValueType::Int,
            ValueNumPair::both(vn),
            2,
            2,
            NodeFlags::empty(),
        )
    }

    /// Creates an array element address node.
    pub fn index_addr(&mut self, vn: ValueNumber, array: NodeId, index: NodeId) -> NodeId {
        self.push(
            Oper::IndexAddr,
            vec![array, index],
            ValueType::ByRef,
            ValueNumPair::both(vn),
            3,
            3,
            NodeFlags::empty(),
        )
    }

    /// Creates a memory load through `address`.
    pub fn load(&mut self, ty: ValueType, vn: ValueNumber, address: NodeId) -> NodeId {
        self.push(
            Oper::Load,
            vec![address],
            ty,
            ValueNumPair::both(vn),
            3,
            2,
            NodeFlags::empty(),
        )
    }

    /// Creates a bounds check of `index` against `length`.
    pub fn bounds_check(&mut self, index: NodeId, length: NodeId) -> NodeId {
        self.push(
            Oper::BoundsCheck,
            vec![index, length],
            ValueType::Void,
            ValueNumPair::NONE,
            2,
            2,
            NodeFlags::empty(),
        )
    }

    /// Creates a call node with the given effect class.
    pub fn call(
        &mut self,
        effect: CallEffect,
        ty: ValueType,
        vn: ValueNumber,
        args: Vec<NodeId>,
    ) -> NodeId {
        let vn = if effect == CallEffect::General {
            // A general call's result is not a stable value.
            ValueNumPair::NONE
        } else {
            ValueNumPair::both(vn)
        };
        self.push(Oper::Call(effect), args, ty, vn, 8, 10, NodeFlags::empty())
    }

    /// Creates a comma node: evaluate `effect` for its effects, yield `value`.
    pub fn comma(&mut self, effect: NodeId, value: NodeId) -> NodeId {
        let ty = self.ir.node(value).ty;
        let vn = self.ir.node(value).vn;
        self.push(Oper::Comma, vec![effect, value], ty, vn, 0, 0, NodeFlags::empty())
    }

    /// Overrides the precomputed costs of `node`.
    pub fn costs(&mut self, node: NodeId, size_cost: u8, speed_cost: u8) {
        let n = self.ir.node_mut(node);
        n.size_cost = size_cost;
        n.speed_cost = speed_cost;
    }

    /// Sets a differing (conservative, liberal) value-number pair on `node`.
    pub fn vn_pair(&mut self, node: NodeId, conservative: ValueNumber, liberal: ValueNumber) {
        self.ir.node_mut(node).vn = ValueNumPair {
            conservative,
            liberal,
        };
    }

    /// Adds producer flags to `node`.
    pub fn add_flags(&mut self, node: NodeId, flags: NodeFlags) {
        self.ir.node_mut(node).flags |= flags;
    }

    /// Consumes the builder and returns the finished method IR.
    #[must_use]
    pub fn finish(self) -> MethodIr {
        self.ir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_single_block() {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        b.block(100.0);
        let lhs = b.local_read(x, ValueNumber(10));
        let rhs = b.int_const(4);
        let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(11), lhs, rhs);
        b.stmt(sum);

        let ir = b.finish();
        assert_eq!(ir.block_count(), 1);
        assert_eq!(ir.blocks()[0].statements.len(), 1);
        assert_eq!(ir.node(sum).children, vec![lhs, rhs]);
        assert_eq!(ir.node(sum).vn, ValueNumPair::both(ValueNumber(11)));
    }

    #[test]
    fn test_edges_and_flags() {
        let mut b = MethodIrBuilder::new("m");
        let b0 = b.block(100.0);
        let b1 = b.block(50.0);
        b.edge(b0, b1);
        b.mark_handler_entry(b1);

        let ir = b.finish();
        assert_eq!(ir.block(b0).succs, vec![b1]);
        assert_eq!(ir.block(b1).preds, vec![b0]);
        assert!(ir.block(b1).is_handler_entry());
    }

    #[test]
    fn test_general_call_has_no_value_number() {
        let mut b = MethodIrBuilder::new("m");
        b.block(100.0);
        let call = b.call(CallEffect::General, ValueType::Int, ValueNumber(99), vec![]);
        b.stmt(call);

        let ir = b.finish();
        assert_eq!(ir.node(call).vn, ValueNumPair::NONE);
        assert!(ir.node(call).is_effect_anchor());
    }
}
