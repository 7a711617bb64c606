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

//! Value-numbering based common subexpression elimination.
//!
//! The pass runs six stages over one method: candidate collection and
//! indexing, available-expressions dataflow, def/use classification, the
//! profitability heuristic, and the rewrite. All state is scoped to a single
//! [`CsePass::run`] invocation; nothing survives across methods.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jitopt::cse::{run_cse, CseConfig};
//!
//! let promoted = run_cse(&mut ir, &CseConfig::enabled())?;
//! if promoted > 0 {
//!     // re-sort the weight-ordered local view before register allocation
//! }
//! ```

mod classify;
mod collect;
mod config;
mod dataflow;
mod heuristic;
mod rewrite;

pub use classify::classify;
pub use collect::{
    collect_candidates, CandidateDescriptor, CandidateTable, DefinedValue, Occurrence,
};
pub use config::{CseConfig, TargetPolicy, MAX_CSE_COUNT};
pub use dataflow::{avail_bit, compute_availability, cross_call_bit, AvailabilitySets};
pub use heuristic::{
    adjust_after_promotion, compute_cutoffs, evaluate, sort_candidates, Cutoffs,
    DeterministicPromotion, PromotionEvaluation, PromotionStrategy, StressPromotion, Tier,
};

use crate::{
    events::{EventKind, EventLog},
    ir::{CseTag, MethodIr},
    Error, Result,
};

/// The CSE pass with an injectable promotion strategy.
pub struct CsePass {
    config: CseConfig,
    strategy: Box<dyn PromotionStrategy>,
    events: EventLog,
}

impl CsePass {
    /// Creates a pass with the deterministic production strategy.
    #[must_use]
    pub fn new(config: CseConfig) -> Self {
        Self::with_strategy(config, Box::new(DeterministicPromotion))
    }

    /// Creates a pass with an explicit promotion strategy.
    #[must_use]
    pub fn with_strategy(config: CseConfig, strategy: Box<dyn PromotionStrategy>) -> Self {
        Self {
            config,
            strategy,
            events: EventLog::new(),
        }
    }

    /// The events recorded by the most recent run.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Runs the pass over one method and returns the number of promoted
    /// candidates.
    ///
    /// # Errors
    ///
    /// Returns an error only when the IR itself is malformed (empty method,
    /// dangling references, CFG edges out of range). Unprofitable or
    /// capped-out methods return `Ok(0)` with the IR unchanged.
    pub fn run(&mut self, ir: &mut MethodIr) -> Result<usize> {
        validate(ir)?;

        if !self.config.enabled {
            self.events.record(EventKind::PassDisabled);
            return Ok(0);
        }

        let mut table = collect_candidates(ir, &self.config);
        if table.is_empty() {
            self.events.record(EventKind::NoCandidates);
            return Ok(0);
        }

        // Promotion needs at least one fresh temp; detect exhaustion before
        // any rewrite so the IR is returned untouched.
        if ir.locals().remaining_capacity() == 0 {
            self.events
                .record(EventKind::OutOfTemps)
                .message("local table full before promotion");
            clear_tags(ir, &table);
            return Ok(0);
        }

        let avail = compute_availability(ir, &table);
        classify(ir, &mut table, &avail);

        let mut cutoffs = compute_cutoffs(ir, &self.config);
        let order = sort_candidates(&table, &self.config);

        let mut promoted = 0usize;
        for index in order {
            if !self.config.candidate_allowed(index.index0()) {
                self.events
                    .record(EventKind::CandidateSkipped)
                    .message(format!("{index} filtered by allow mask"));
                continue;
            }
            let desc = table.by_index(index);
            if desc.def_count == 0 || desc.use_count == 0 {
                // Both sides of the pairing must survive classification.
                // Rewriting a lone use would read a temp nothing stores;
                // a lone def would store a temp nothing reads.
                self.events
                    .record(EventKind::CandidateSkipped)
                    .message(format!("{index} has no surviving def/use pairing"));
                continue;
            }

            let evaluation = evaluate(desc, &cutoffs, &self.config);
            if !self.strategy.decide(&evaluation) {
                self.events
                    .record(EventKind::CandidateRejected)
                    .message(format!(
                        "{index} yes={:.1} no={:.1}",
                        evaluation.yes_cost, evaluation.no_cost
                    ));
                continue;
            }

            let Some(temp) = ir.alloc_temp(desc.ty) else {
                self.events
                    .record(EventKind::OutOfTemps)
                    .message(format!("no temp left for {index}"));
                break;
            };

            let occurrences = table.by_index(index).occurrences.clone();
            for occ in occurrences {
                let weight = ir.block(occ.block).weight;
                match ir.node(occ.node).cse_tag {
                    CseTag::Def(i) if i == index => {
                        rewrite::rewrite_def(ir, &table, index, occ.node, temp, weight);
                    }
                    CseTag::Use(i) if i == index => {
                        rewrite::rewrite_use(ir, &mut table, index, occ.node, temp, weight);
                    }
                    // Reverted by classification or unmarked by an earlier
                    // enclosing rewrite.
                    _ => {}
                }
            }

            adjust_after_promotion(&mut cutoffs, table.by_index(index), &self.config);
            self.events
                .record(EventKind::CandidatePromoted)
                .message(format!("{index} cached in {}", ir.locals().get(temp).name));
            promoted += 1;
        }

        clear_tags(ir, &table);
        if promoted > 0 {
            ir.locals_mut().mark_needs_sort();
        }
        Ok(promoted)
    }
}

/// Runs the pass once with the deterministic strategy.
///
/// # Errors
///
/// See [`CsePass::run`].
pub fn run_cse(ir: &mut MethodIr, config: &CseConfig) -> Result<usize> {
    CsePass::new(config.clone()).run(ir)
}

/// Clears every remaining candidate tag; the tags are pass-internal state
/// and must not leak to later pipeline stages.
fn clear_tags(ir: &mut MethodIr, table: &CandidateTable) {
    let occurrences: Vec<_> = table
        .indexed()
        .flat_map(|d| d.occurrences.iter().map(|o| o.node))
        .collect();
    for node in occurrences {
        ir.node_mut(node).cse_tag = CseTag::NotACandidate;
    }
}

/// Checks the structural invariants the pass relies on.
fn validate(ir: &MethodIr) -> Result<()> {
    if ir.block_count() == 0 {
        return Err(Error::EmptyMethod);
    }
    let blocks = ir.block_count();
    let nodes = ir.node_count();
    for block in ir.blocks() {
        for edge in block.preds.iter().chain(&block.succs) {
            if edge.index() >= blocks {
                return Err(Error::MalformedCfg {
                    message: format!("{} references nonexistent {edge}", block.id),
                });
            }
        }
        for stmt in &block.statements {
            if stmt.root.index() >= nodes {
                return Err(Error::DanglingReference {
                    message: format!("statement root {} outside node arena", stmt.root),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, MethodIrBuilder, ValueNumber, ValueType};

    fn duplicated_sum_method() -> MethodIr {
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        b.block(100.0);
        for _ in 0..3 {
            let lhs = b.local_read(x, ValueNumber(10));
            let rhs = b.local_read(x, ValueNumber(10));
            let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
            b.costs(sum, 4, 4);
            b.stmt(sum);
        }
        b.finish()
    }

    #[test]
    fn test_disabled_pass_is_a_no_op() {
        let mut ir = duplicated_sum_method();
        let before = ir.dump();

        let mut pass = CsePass::new(CseConfig::default());
        assert_eq!(pass.run(&mut ir).unwrap(), 0);
        assert_eq!(ir.dump(), before);
        assert_eq!(pass.events().count_of(EventKind::PassDisabled), 1);
    }

    #[test]
    fn test_promotes_and_reports() {
        let mut ir = duplicated_sum_method();
        let mut pass = CsePass::new(CseConfig::enabled());
        let promoted = pass.run(&mut ir).unwrap();

        assert_eq!(promoted, 1);
        assert_eq!(pass.events().count_of(EventKind::CandidatePromoted), 1);
        assert!(ir.locals().needs_sort());
        // One compiler temp was appended.
        let temps: Vec<_> = ir
            .locals()
            .iter()
            .filter(|(_, v)| v.compiler_introduced)
            .collect();
        assert_eq!(temps.len(), 1);
        assert_eq!(temps[0].1.name, "cse0");
    }

    #[test]
    fn test_full_local_table_abandons_promotion() {
        let mut b = MethodIrBuilder::with_local_capacity("m", 1);
        let x = b.local("x", ValueType::Int);
        b.block(100.0);
        for _ in 0..2 {
            let lhs = b.local_read(x, ValueNumber(10));
            let rhs = b.local_read(x, ValueNumber(10));
            let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
            b.stmt(sum);
        }
        let mut ir = b.finish();
        let before = ir.dump();

        let mut pass = CsePass::new(CseConfig::enabled());
        assert_eq!(pass.run(&mut ir).unwrap(), 0);
        assert_eq!(ir.dump(), before);
        assert_eq!(pass.events().count_of(EventKind::OutOfTemps), 1);
    }

    #[test]
    fn test_candidate_without_def_is_not_promoted() {
        // The only would-be def sits in a conditionally evaluated arm and is
        // reverted during classification; the successor block still sees the
        // value as available and classifies its occurrence as a use. That
        // use must never be rewritten: there is no store feeding the temp.
        let mut b = MethodIrBuilder::new("m");
        let x = b.local("x", ValueType::Int);
        let b0 = b.block(100.0);
        let b1 = b.block(100.0);
        b.edge(b0, b1);

        b.select_block(b0);
        let lhs = b.local_read(x, ValueNumber(10));
        let rhs = b.local_read(x, ValueNumber(10));
        let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
        b.costs(sum, 4, 4);
        b.add_flags(sum, crate::ir::NodeFlags::CONDITIONALLY_EVALUATED);
        b.stmt(sum);

        b.select_block(b1);
        let lhs = b.local_read(x, ValueNumber(10));
        let rhs = b.local_read(x, ValueNumber(10));
        let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
        b.costs(sum, 4, 4);
        b.stmt(sum);

        let mut ir = b.finish();
        let before = ir.dump();

        let mut pass = CsePass::new(CseConfig::enabled());
        assert_eq!(pass.run(&mut ir).unwrap(), 0);
        assert_eq!(ir.dump(), before);
        assert!(ir.locals().iter().all(|(_, v)| !v.compiler_introduced));
        assert_eq!(pass.events().count_of(EventKind::CandidateSkipped), 1);
    }

    #[test]
    fn test_allow_mask_filters_candidates() {
        let mut ir = duplicated_sum_method();
        let mut config = CseConfig::enabled();
        config.candidate_allow_mask = Some(crate::utils::BitSet::empty(MAX_CSE_COUNT));

        let mut pass = CsePass::new(config);
        assert_eq!(pass.run(&mut ir).unwrap(), 0);
        assert_eq!(pass.events().count_of(EventKind::CandidateSkipped), 1);
    }

    #[test]
    fn test_empty_method_is_an_error() {
        let mut ir = MethodIr::new("m");
        let mut pass = CsePass::new(CseConfig::enabled());
        assert!(matches!(pass.run(&mut ir), Err(Error::EmptyMethod)));
    }
}
