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

//! End-to-end scenarios for the CSE pass: build a method with the IR
//! builder, run the pass, and check the rewritten shape and the promotion
//! decisions.

use jitopt::{
    cse::{run_cse, CseConfig},
    ir::{
        BinOp, CallEffect, ExprNode, MethodIr, MethodIrBuilder, Oper, ValueNumber, ValueType,
    },
};

/// Counts reachable nodes matching `pred`, walking every statement tree.
fn count_reachable(ir: &MethodIr, pred: impl Fn(&ExprNode) -> bool) -> usize {
    ir.blocks()
        .iter()
        .flat_map(|b| &b.statements)
        .flat_map(|s| ir.postorder(s.root))
        .filter(|&n| pred(ir.node(n)))
        .count()
}

/// Two `a.Length` reads in straight-line code: the first becomes the
/// definition, the second a use, and exactly one length access survives.
#[test]
fn test_duplicated_array_length_is_cached() {
    let mut b = MethodIrBuilder::new("length_twice");
    let a = b.local("a", ValueType::Ref);
    let l1 = b.local("l1", ValueType::Int);
    let l2 = b.local("l2", ValueType::Int);
    b.block(100.0);
    for target in [l1, l2] {
        let arr = b.local_read(a, ValueNumber(10));
        let len = b.array_length(ValueNumber(50), arr);
        let store = b.store_local(target, len);
        b.stmt(store);
    }
    let mut ir = b.finish();

    let promoted = run_cse(&mut ir, &CseConfig::enabled()).unwrap();
    assert_eq!(promoted, 1);
    assert_eq!(
        count_reachable(&ir, |n| matches!(n.oper, Oper::ArrayLength)),
        1
    );
    // The second store now reads the temp.
    let temp = ir
        .locals()
        .iter()
        .find(|(_, v)| v.compiler_introduced)
        .map(|(id, _)| id)
        .unwrap();
    assert_eq!(
        count_reachable(&ir, |n| matches!(n.oper, Oper::LocalRead(t) if t == temp)),
        2
    );
}

fn def_and_weighted_use(use_weight: f64) -> MethodIr {
    let mut b = MethodIrBuilder::new("weighted");
    let x = b.local("x", ValueType::Int);
    let b0 = b.block(100.0);
    let lhs = b.local_read(x, ValueNumber(10));
    let rhs = b.local_read(x, ValueNumber(10));
    let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
    b.stmt(sum);
    let b1 = b.block(use_weight);
    let lhs = b.local_read(x, ValueNumber(10));
    let rhs = b.local_read(x, ValueNumber(10));
    let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
    b.stmt(sum);
    b.edge(b0, b1);
    b.edge(b1, b1);
    b.finish()
}

/// The promotion decision follows the weighted counts: the same expression
/// pair is worth caching when the use sits in a hot loop and not when the
/// loop is cold, and cooling the loop never turns a rejection into a
/// promotion.
#[test]
fn test_promotion_follows_block_weights() {
    let mut hot = def_and_weighted_use(1000.0);
    let promoted_hot = run_cse(&mut hot, &CseConfig::enabled()).unwrap();
    assert_eq!(promoted_hot, 1);

    let mut cold = def_and_weighted_use(10.0);
    let promoted_cold = run_cse(&mut cold, &CseConfig::enabled()).unwrap();
    assert_eq!(promoted_cold, 0);
    assert!(promoted_cold <= promoted_hot);
}

/// A call with observable side effects is never a candidate, even when
/// invoked twice with identical arguments.
#[test]
fn test_side_effecting_call_is_not_merged() {
    let mut b = MethodIrBuilder::new("effectful_call");
    b.block(100.0);
    for _ in 0..2 {
        let arg = b.int_const(7);
        let call = b.call(CallEffect::General, ValueType::Int, ValueNumber(60), vec![arg]);
        b.stmt(call);
    }
    let mut ir = b.finish();
    let before = ir.dump();

    let promoted = run_cse(&mut ir, &CseConfig::enabled()).unwrap();
    assert_eq!(promoted, 0);
    assert_eq!(ir.dump(), before);
    assert_eq!(
        count_reachable(&ir, |n| matches!(n.oper, Oper::Call(_))),
        2
    );
}

/// Syntactically identical expressions with different value numbers, as
/// after a possibly aliasing store, never merge.
#[test]
fn test_different_value_numbers_never_merge() {
    let mut b = MethodIrBuilder::new("aliasing");
    let p = b.local("p", ValueType::ByRef);
    b.block(100.0);
    let addr = b.local_read(p, ValueNumber(10));
    let load = b.load(ValueType::Int, ValueNumber(40), addr);
    b.stmt(load);
    // An intervening store through an aliasing pointer gives the reload a
    // fresh value number.
    let value = b.int_const(0);
    let addr = b.local_read(p, ValueNumber(10));
    let dst = b.load(ValueType::Int, ValueNumber(41), addr);
    let assign = b.binary(BinOp::Eq, ValueType::Int, ValueNumber::NONE, dst, value);
    b.stmt(assign);
    let addr = b.local_read(p, ValueNumber(10));
    let load = b.load(ValueType::Int, ValueNumber(42), addr);
    b.stmt(load);
    let mut ir = b.finish();
    let before = ir.dump();

    let promoted = run_cse(&mut ir, &CseConfig::enabled()).unwrap();
    assert_eq!(promoted, 0);
    assert_eq!(ir.dump(), before);
}

fn mixed_defs_method() -> (MethodIr, jitopt::ir::NodeId) {
    let mut b = MethodIrBuilder::new("mixed_defs");
    let x = b.local("x", ValueType::Int);
    let b0 = b.block(100.0);
    let b1 = b.block(50.0);
    let b2 = b.block(50.0);
    let b3 = b.block(100.0);
    b.edge(b0, b1);
    b.edge(b0, b2);
    b.edge(b1, b3);
    b.edge(b2, b3);
    let mut use_root = None;
    for (block, cons_vn) in [(b1, 21u32), (b2, 22), (b3, 23)] {
        b.select_block(block);
        let lhs = b.local_read(x, ValueNumber(10));
        let rhs = b.local_read(x, ValueNumber(10));
        let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
        b.costs(sum, 4, 4);
        b.vn_pair(sum, ValueNumber(cons_vn), ValueNumber(12));
        b.stmt(sum);
        if block == b3 {
            use_root = Some(sum);
        }
    }
    (b.finish(), use_root.unwrap())
}

/// A candidate whose two definitions disagree on their conservative value
/// number is still promoted; the rewritten use keeps its own value number
/// instead of inheriting one definition's arbitrarily.
#[test]
fn test_mixed_definitions_promote_without_vn_propagation() {
    let (mut ir, use_root) = mixed_defs_method();
    let promoted = run_cse(&mut ir, &CseConfig::enabled()).unwrap();
    assert_eq!(promoted, 1);

    let read = ir.node(use_root);
    assert!(matches!(read.oper, Oper::LocalRead(_)));
    assert_eq!(read.vn.conservative, ValueNumber(23));
}

/// With a single definition the rewritten use does inherit the defining
/// conservative value number.
#[test]
fn test_single_definition_propagates_conservative_vn() {
    let mut b = MethodIrBuilder::new("single_def");
    let x = b.local("x", ValueType::Int);
    b.block(100.0);
    let mut use_root = None;
    for cons_vn in [21u32, 23] {
        let lhs = b.local_read(x, ValueNumber(10));
        let rhs = b.local_read(x, ValueNumber(10));
        let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
        b.costs(sum, 4, 4);
        b.vn_pair(sum, ValueNumber(cons_vn), ValueNumber(12));
        b.stmt(sum);
        use_root = Some(sum);
    }
    let mut ir = b.finish();

    let promoted = run_cse(&mut ir, &CseConfig::enabled()).unwrap();
    assert_eq!(promoted, 1);

    let read = ir.node(use_root.unwrap());
    assert!(matches!(read.oper, Oper::LocalRead(_)));
    // The def's conservative number, not the occurrence's own 23.
    assert_eq!(read.vn.conservative, ValueNumber(21));
}

/// More duplicated groups than the cap: the first N by discovery order are
/// considered, the rest stay un-rewritten, and compilation succeeds.
#[test]
fn test_candidate_cap_leaves_overflow_untouched() {
    let mut b = MethodIrBuilder::new("capped");
    let x = b.local("x", ValueType::Int);
    b.block(100.0);
    for (op, vn) in [(BinOp::Add, 30u32), (BinOp::Sub, 31), (BinOp::Mul, 32)] {
        for _ in 0..2 {
            let lhs = b.local_read(x, ValueNumber(10));
            let rhs = b.local_read(x, ValueNumber(11));
            let node = b.binary(op, ValueType::Int, ValueNumber(vn), lhs, rhs);
            b.costs(node, 4, 4);
            b.stmt(node);
        }
    }
    let mut ir = b.finish();

    let mut config = CseConfig::enabled();
    config.policy.max_candidates = 2;
    let promoted = run_cse(&mut ir, &config).unwrap();

    assert_eq!(promoted, 2);
    // The third group (Mul) never became a candidate and still computes
    // twice.
    assert_eq!(
        count_reachable(&ir, |n| matches!(n.oper, Oper::Binary(BinOp::Mul))),
        2
    );
    assert_eq!(
        count_reachable(&ir, |n| matches!(n.oper, Oper::Binary(BinOp::Add))),
        1
    );
}

/// Identical input produces bit-identical output across repeated runs.
#[test]
fn test_determinism_across_runs() {
    let dumps: Vec<String> = (0..2)
        .map(|_| {
            let (mut ir, _) = mixed_defs_method();
            run_cse(&mut ir, &CseConfig::enabled()).unwrap();
            ir.dump()
        })
        .collect();
    assert_eq!(dumps[0], dumps[1]);
}

/// The promoted count feeds the caller's re-sort decision, and the local
/// table flags it too.
#[test]
fn test_needs_sort_raised_only_when_promoting() {
    let (mut ir, _) = mixed_defs_method();
    assert!(!ir.locals().needs_sort());
    let promoted = run_cse(&mut ir, &CseConfig::enabled()).unwrap();
    assert!(promoted > 0);
    assert!(ir.locals().needs_sort());

    let mut b = MethodIrBuilder::new("nothing_to_do");
    let x = b.local("x", ValueType::Int);
    b.block(100.0);
    let rd = b.local_read(x, ValueNumber(10));
    b.stmt(rd);
    let mut ir = b.finish();
    assert_eq!(run_cse(&mut ir, &CseConfig::enabled()).unwrap(), 0);
    assert!(!ir.locals().needs_sort());
}
