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

//! Promotion profitability heuristic.
//!
//! Candidates are bucketed into three tiers by comparing their projected
//! temp ref count against two register-pressure cutoffs derived from the
//! method's local-variable population. Each tier assigns per-def and per-use
//! costs for the cached value; promotion happens when the cached cost does
//! not exceed the cost of recomputing the expression at every use.

use crate::{
    cse::{CandidateDescriptor, CandidateTable, CseConfig},
    ir::{CandidateIndex, MethodIr, BLOCK_UNITY_WEIGHT},
};

/// Register-pressure cutoffs and frame-size classification for one method.
#[derive(Debug, Clone)]
pub struct Cutoffs {
    /// Ref count above which candidates get the aggressive (enregistered)
    /// cost model.
    pub aggressive: f64,
    /// Ref count above which candidates get the moderate cost model.
    pub moderate: f64,
    /// Number of locals expected to be enregistered.
    pub enreg_count: u32,
    /// Stack displacements will need a wider encoding.
    pub large_frame: bool,
    /// Stack displacements will need the widest encoding.
    pub huge_frame: bool,
}

/// Estimates the cutoffs from the method's local-variable table.
///
/// The frame size sums the slot sizes of locals expected to live on the
/// stack, consuming an available-register estimate as it goes. The cutoffs
/// are then keyed off the ref counts of the locals at the positions where
/// the callee-saved and callee-trash budgets run out, walking locals in
/// descending weighted-ref-count order.
#[must_use]
pub fn compute_cutoffs(ir: &MethodIr, config: &CseConfig) -> Cutoffs {
    let policy = &config.policy;

    let mut frame_size: u32 = 0;
    let mut reg_avail_estimate = policy.moderate_enreg_num() + 1;
    let mut large_frame = false;
    let mut huge_frame = false;

    for (_, var) in ir.locals().iter() {
        if var.ref_count == 0 {
            continue;
        }
        let on_stack = var.do_not_enregister || reg_avail_estimate == 0;
        if on_stack {
            frame_size += var.ty.slot_size(policy.pointer_size);
        } else if var.ref_count <= 2 {
            // A single-use single-def local only occupies one register.
            reg_avail_estimate -= 1;
        } else if reg_avail_estimate >= 2 {
            reg_avail_estimate -= 2;
        } else {
            reg_avail_estimate = 0;
        }

        if frame_size > policy.large_frame_size {
            large_frame = true;
        }
        if frame_size > policy.huge_frame_size {
            huge_frame = true;
            break;
        }
    }

    // Visit locals in descending weighted-ref-count order: the heaviest
    // locals claim registers first, and the cutoff is the ref count of the
    // local at which each register budget runs out.
    let mut by_weight: Vec<_> = ir
        .locals()
        .iter()
        .filter(|(_, v)| v.ref_count > 0 && !v.do_not_enregister)
        .collect();
    by_weight.sort_by(|(ida, a), (idb, b)| {
        b.weighted_ref_count
            .partial_cmp(&a.weighted_ref_count)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(ida.cmp(idb))
    });

    let mut enreg_count: u32 = 0;
    let mut aggressive: f64 = 0.0;
    let mut moderate: f64 = 0.0;
    for (_, var) in by_weight {
        if !var.ty.is_floating() {
            enreg_count += 1;
        }
        let cutoff_source = if config.optimize_for_size {
            f64::from(var.ref_count)
        } else {
            var.weighted_ref_count
        };
        if aggressive == 0.0 && enreg_count > policy.aggressive_enreg_num() {
            aggressive = cutoff_source + BLOCK_UNITY_WEIGHT;
        }
        if moderate == 0.0 && enreg_count > policy.moderate_enreg_num() {
            moderate = cutoff_source + BLOCK_UNITY_WEIGHT / 2.0;
        }
    }

    Cutoffs {
        aggressive: aggressive.max(BLOCK_UNITY_WEIGHT * 2.0),
        moderate: moderate.max(BLOCK_UNITY_WEIGHT),
        enreg_count,
        large_frame,
        huge_frame,
    }
}

/// The tier a candidate was bucketed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Expected to be enregistered; minimum cached costs.
    Aggressive,
    /// Likely enregistered; small cached costs.
    Moderate,
    /// Likely on the stack; full cached costs plus spill allowance.
    Conservative,
}

/// The outcome of evaluating one candidate.
#[derive(Debug, Clone)]
pub struct PromotionEvaluation {
    /// The candidate's index.
    pub index: CandidateIndex,
    /// The selected tier.
    pub tier: Tier,
    /// Projected cost if the candidate is cached.
    pub yes_cost: f64,
    /// Projected cost if every use keeps recomputing.
    pub no_cost: f64,
}

impl PromotionEvaluation {
    /// The deterministic profitability verdict.
    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.yes_cost <= self.no_cost
    }
}

/// Evaluates one candidate against the cutoffs.
#[must_use]
pub fn evaluate(
    desc: &CandidateDescriptor,
    cutoffs: &Cutoffs,
    config: &CseConfig,
) -> PromotionEvaluation {
    let index = desc.index.expect("evaluating an unindexed candidate");
    let (def_count, use_count) = if config.optimize_for_size {
        (f64::from(desc.def_count), f64::from(desc.use_count))
    } else {
        (desc.def_weight, desc.use_weight)
    };

    // Each def of the temp is a store plus a yielded read, each use one read.
    let cse_ref_cnt = def_count * 2.0 + use_count;

    let (tier, mut def_cost, mut use_cost) = if config.optimize_for_size {
        size_tier_costs(desc, cutoffs, cse_ref_cnt)
    } else {
        speed_tier_costs(desc, cutoffs, config, cse_ref_cnt)
    };

    if !config.optimize_for_size {
        // Wider displacement encodings make every cached access pricier.
        if cutoffs.large_frame {
            def_cost += 1;
            use_cost += 1;
        }
        if cutoffs.huge_frame {
            def_cost += 1;
            use_cost += 1;
        }
    }

    let mut extra_yes_cost = 0.0;
    if desc.live_across_call {
        // The cached value may force a caller-saved register spill around
        // the call when register pressure is already high.
        if cutoffs.enreg_count < config.policy.aggressive_enreg_num() || desc.ty.is_floating() {
            extra_yes_cost = BLOCK_UNITY_WEIGHT;
            if tier == Tier::Conservative {
                extra_yes_cost *= 2.0;
            }
        }
    }

    let expr_cost = if config.optimize_for_size {
        f64::from(desc.size_cost)
    } else {
        f64::from(desc.speed_cost)
    };

    // Lost code-size reduction when we leave every use recomputing.
    let mut extra_no_cost = 0.0;
    if u32::from(desc.size_cost) > use_cost {
        extra_no_cost =
            f64::from(u32::from(desc.size_cost) - use_cost) * f64::from(desc.use_count) * 2.0;
    }

    let no_cost = use_count * expr_cost + extra_no_cost;
    let yes_cost = def_count * f64::from(def_cost) + use_count * f64::from(use_cost) + extra_yes_cost;

    PromotionEvaluation {
        index,
        tier,
        yes_cost,
        no_cost,
    }
}

fn size_tier_costs(
    desc: &CandidateDescriptor,
    cutoffs: &Cutoffs,
    cse_ref_cnt: f64,
) -> (Tier, u32, u32) {
    let (tier, mut def_cost, mut use_cost) = if cse_ref_cnt >= cutoffs.aggressive {
        let (mut d, mut u) = (1, 1);
        if desc.live_across_call {
            if cutoffs.large_frame {
                d += 1;
                u += 1;
            }
            if cutoffs.huge_frame {
                d += 1;
                u += 1;
            }
        }
        (Tier::Aggressive, d, u)
    } else if cutoffs.large_frame {
        // mov [rbp-0x1FC], reg / [rbp-0x1FC] operand encodings.
        (Tier::Conservative, 6, 5)
    } else {
        (Tier::Conservative, 3, 2)
    };

    if desc.ty.is_floating() {
        // Floating-point spills encode larger.
        def_cost += 2;
        use_cost += 1;
    }
    (tier, def_cost, use_cost)
}

fn speed_tier_costs(
    desc: &CandidateDescriptor,
    cutoffs: &Cutoffs,
    config: &CseConfig,
    cse_ref_cnt: f64,
) -> (Tier, u32, u32) {
    if cse_ref_cnt >= cutoffs.aggressive {
        (Tier::Aggressive, 1, 1)
    } else if cse_ref_cnt >= cutoffs.moderate {
        if desc.live_across_call {
            let use_cost = if cutoffs.enreg_count < config.policy.aggressive_enreg_num() {
                1
            } else {
                2
            };
            (Tier::Moderate, 2, use_cost)
        } else {
            (Tier::Moderate, 2, 1)
        }
    } else if desc.live_across_call {
        (Tier::Conservative, 2, 3)
    } else {
        (Tier::Conservative, 2, 2)
    }
}

/// Raises the cutoffs after a successful promotion of a candidate that is
/// live across a call: the new temp occupies a register, so later
/// candidates face more pressure.
pub fn adjust_after_promotion(
    cutoffs: &mut Cutoffs,
    desc: &CandidateDescriptor,
    config: &CseConfig,
) {
    if !desc.live_across_call {
        return;
    }
    let (def_count, use_count) = if config.optimize_for_size {
        (f64::from(desc.def_count), f64::from(desc.use_count))
    } else {
        (desc.def_weight, desc.use_weight)
    };
    let cse_ref_cnt = def_count * 2.0 + use_count;

    if cse_ref_cnt > cutoffs.aggressive {
        cutoffs.aggressive += BLOCK_UNITY_WEIGHT;
    }
    if cse_ref_cnt > cutoffs.moderate {
        cutoffs.moderate += BLOCK_UNITY_WEIGHT / 2.0;
    }
}

/// Returns the candidate indices in consideration order: descending
/// recomputation cost, then descending use count, then ascending def count,
/// then ascending index for a stable total order.
#[must_use]
pub fn sort_candidates(table: &CandidateTable, config: &CseConfig) -> Vec<CandidateIndex> {
    let mut indices: Vec<CandidateIndex> = table
        .indexed()
        .map(|d| d.index.expect("indexed descriptor without index"))
        .collect();

    indices.sort_by(|&a, &b| {
        let da = table.by_index(a);
        let db = table.by_index(b);
        let (cost_a, cost_b, use_a, use_b, def_a, def_b) = if config.optimize_for_size {
            (
                da.size_cost,
                db.size_cost,
                f64::from(da.use_count),
                f64::from(db.use_count),
                f64::from(da.def_count),
                f64::from(db.def_count),
            )
        } else {
            (
                da.speed_cost,
                db.speed_cost,
                da.use_weight,
                db.use_weight,
                da.def_weight,
                db.def_weight,
            )
        };

        cost_b
            .cmp(&cost_a)
            .then_with(|| use_b.partial_cmp(&use_a).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| def_a.partial_cmp(&def_b).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.cmp(&b))
    });
    indices
}

/// Pluggable promotion decision.
///
/// The deterministic strategy is the production behavior; the stress
/// strategy exists to exercise rewriting of marginal candidates in fuzzing
/// and must never be required for correctness.
pub trait PromotionStrategy {
    /// Decides whether to promote the evaluated candidate.
    fn decide(&mut self, evaluation: &PromotionEvaluation) -> bool;
}

/// Promote exactly when caching is no more expensive than recomputing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeterministicPromotion;

impl PromotionStrategy for DeterministicPromotion {
    fn decide(&mut self, evaluation: &PromotionEvaluation) -> bool {
        evaluation.is_profitable()
    }
}

/// Seeded stress strategy: additionally promotes failing candidates with a
/// probability proportional to how close they came to passing.
#[derive(Debug, Clone)]
pub struct StressPromotion {
    state: u64,
}

impl StressPromotion {
    /// Creates a stress strategy from a non-zero seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next(&mut self) -> u64 {
        // xorshift64
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

impl PromotionStrategy for StressPromotion {
    fn decide(&mut self, evaluation: &PromotionEvaluation) -> bool {
        if evaluation.is_profitable() {
            return true;
        }
        if evaluation.yes_cost <= 0.0 {
            return false;
        }
        let percentage = (evaluation.no_cost * 100.0 / evaluation.yes_cost).min(100.0);
        (self.next() % 100) < percentage as u64
    }
}
