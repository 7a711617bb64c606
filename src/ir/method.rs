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

//! Per-method IR: node arena, block list, and local-variable table.

use crate::ir::{
    BasicBlock, BlockId, CseTag, ExprNode, LocalId, NodeId, Oper, ValueType,
};

/// One entry in a method's local-variable table.
#[derive(Debug, Clone)]
pub struct LocalVar {
    /// Variable name, for dumps and debugging.
    pub name: String,
    /// Static type.
    pub ty: ValueType,
    /// Raw reference count.
    pub ref_count: u32,
    /// Execution-weighted reference count.
    pub weighted_ref_count: f64,
    /// This local is an incoming parameter.
    pub is_param: bool,
    /// This local must live on the stack (address taken, pinned, ...).
    pub do_not_enregister: bool,
    /// This local was introduced by the compiler; debug-scope logic and
    /// user-visible variable views must exclude it.
    pub compiler_introduced: bool,
}

/// The local-variable table of a method.
///
/// The table keeps a `needs_sort` dirty flag: later pipeline stages hold a
/// weight-sorted view of the locals, and any pass that appends entries or
/// changes ref counts raises the flag so that view gets rebuilt before
/// register allocation.
#[derive(Debug, Clone)]
pub struct LocalTable {
    vars: Vec<LocalVar>,
    capacity: usize,
    needs_sort: bool,
}

impl LocalTable {
    /// Creates an empty table with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            vars: Vec::new(),
            capacity,
            needs_sort: false,
        }
    }

    /// Appends a local. Returns `None` when the table is full.
    pub fn push(&mut self, var: LocalVar) -> Option<LocalId> {
        if self.vars.len() >= self.capacity {
            return None;
        }
        let id = LocalId(u32::try_from(self.vars.len()).ok()?);
        self.vars.push(var);
        Some(id)
    }

    /// Returns the local with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of bounds.
    #[must_use]
    pub fn get(&self, id: LocalId) -> &LocalVar {
        &self.vars[id.index()]
    }

    /// Returns the local with the given id, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of bounds.
    pub fn get_mut(&mut self, id: LocalId) -> &mut LocalVar {
        &mut self.vars[id.index()]
    }

    /// Iterates over all locals in table order.
    pub fn iter(&self) -> impl Iterator<Item = (LocalId, &LocalVar)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| (LocalId(i as u32), v))
    }

    /// Returns the number of locals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Returns how many more locals the table can hold.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.vars.len()
    }

    /// Raises the dirty flag for weight-sorted views of this table.
    pub fn mark_needs_sort(&mut self) {
        self.needs_sort = true;
    }

    /// Returns `true` if a weight-sorted view must be rebuilt.
    #[must_use]
    pub fn needs_sort(&self) -> bool {
        self.needs_sort
    }
}

/// The intermediate representation of one method under compilation.
///
/// Nodes are owned by an arena and referenced positionally; replacing a node
/// keeps its [`NodeId`] stable so parent links survive rewrites.
#[derive(Debug, Clone)]
pub struct MethodIr {
    /// Method name, for dumps.
    pub name: String,
    nodes: Vec<ExprNode>,
    blocks: Vec<BasicBlock>,
    locals: LocalTable,
    temp_count: u32,
}

impl MethodIr {
    /// Creates an empty method with the default local-table capacity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_local_capacity(name, u16::MAX as usize)
    }

    /// Creates an empty method with an explicit local-table capacity.
    ///
    /// Tests use a tiny capacity to exercise the out-of-temps path.
    #[must_use]
    pub fn with_local_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            blocks: Vec::new(),
            locals: LocalTable::with_capacity(capacity),
            temp_count: 0,
        }
    }

    /// Appends a node to the arena.
    pub fn push_node(&mut self, node: ExprNode) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("node arena overflow"));
        self.nodes.push(node);
        id
    }

    /// Returns the node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of bounds.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    /// Returns the node with the given id, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of bounds.
    pub fn node_mut(&mut self, id: NodeId) -> &mut ExprNode {
        &mut self.nodes[id.index()]
    }

    /// Returns the number of nodes in the arena.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Replaces the node at `target` with `replacement`, relocating the
    /// original node to a fresh arena slot.
    ///
    /// Parents referencing `target` now see the replacement; the returned id
    /// is the original node's new home and can be linked as a child of the
    /// replacement.
    pub fn replace_node(&mut self, target: NodeId, replacement: ExprNode) -> NodeId {
        let original = std::mem::replace(&mut self.nodes[target.index()], replacement);
        self.push_node(original)
    }

    /// Appends a block.
    pub fn push_block(&mut self, block: BasicBlock) -> BlockId {
        let id = BlockId(u32::try_from(self.blocks.len()).expect("block list overflow"));
        debug_assert_eq!(block.id, id, "blocks must be appended in id order");
        self.blocks.push(block);
        id
    }

    /// Returns all blocks in method order.
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Returns the block with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of bounds.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Returns the block with the given id, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of bounds.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The local-variable table.
    #[must_use]
    pub fn locals(&self) -> &LocalTable {
        &self.locals
    }

    /// The local-variable table, mutably.
    pub fn locals_mut(&mut self) -> &mut LocalTable {
        &mut self.locals
    }

    /// Allocates a compiler-introduced temporary of the given type.
    ///
    /// Returns `None` when the local table is full; callers must treat that
    /// as "stop optimizing", never as a compilation failure.
    pub fn alloc_temp(&mut self, ty: ValueType) -> Option<LocalId> {
        let name = format!("cse{}", self.temp_count);
        let id = self.locals.push(LocalVar {
            name,
            ty,
            ref_count: 0,
            weighted_ref_count: 0.0,
            is_param: false,
            do_not_enregister: false,
            compiler_introduced: true,
        })?;
        self.temp_count += 1;
        Some(id)
    }

    /// Records one reference to `local` with the given execution weight.
    ///
    /// This is the liveness-collaborator seam: ref counts stay consistent
    /// without re-deriving liveness from scratch.
    pub fn record_local_referenced(&mut self, local: LocalId, weight: f64) {
        let var = self.locals.get_mut(local);
        var.ref_count += 1;
        var.weighted_ref_count += weight;
    }

    /// Collects the nodes of the tree rooted at `root` in post-order
    /// (operands before operators), the single walk order shared by the
    /// collection and classification passes.
    #[must_use]
    pub fn postorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        self.postorder_into(root, &mut order);
        order
    }

    fn postorder_into(&self, node: NodeId, order: &mut Vec<NodeId>) {
        for &child in &self.node(node).children {
            self.postorder_into(child, order);
        }
        order.push(node);
    }

    /// Renders the method as a deterministic text dump.
    ///
    /// Used by tests to compare IR shapes across runs.
    #[must_use]
    pub fn dump(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "method {}", self.name);
        for block in &self.blocks {
            let _ = writeln!(out, "{} weight={}", block.id, block.weight);
            for stmt in &block.statements {
                let mut line = String::new();
                self.dump_node(stmt.root, &mut line);
                let _ = writeln!(out, "  {line}");
            }
        }
        out
    }

    fn dump_node(&self, id: NodeId, out: &mut String) {
        use std::fmt::Write;

        let node = self.node(id);
        match &node.oper {
            Oper::IntConst(v) => {
                let _ = write!(out, "{v}");
            }
            Oper::FloatConst(v) => {
                let _ = write!(out, "{v}");
            }
            Oper::LocalRead(l) => {
                let _ = write!(out, "{l}");
            }
            Oper::StoreLocal(l) => {
                let _ = write!(out, "{l} = ");
                self.dump_node(node.children[0], out);
            }
            other => {
                let _ = write!(out, "{other}(");
                for (i, &child) in node.children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.dump_node(child, out);
                }
                out.push(')');
            }
        }
        if !matches!(node.cse_tag, CseTag::NotACandidate) {
            let _ = write!(out, "{{{:?}}}", node.cse_tag);
        }
    }
}
