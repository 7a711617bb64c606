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

//! Configuration for the CSE pass.
//!
//! The numeric constants that drive the profitability heuristic are tuned
//! per instruction set and ABI, so they live in a replaceable
//! [`TargetPolicy`] table rather than as hard-coded values in the heuristic
//! itself. The defaults model a 64-bit x86 target.

use crate::utils::BitSet;

/// The hard upper bound on indexed candidates per method.
///
/// Occurrences discovered after the cap are left untagged; the pass never
/// fails because a method has too many duplicated expressions.
pub const MAX_CSE_COUNT: usize = 64;

/// Target-specific tuning constants for the promotion heuristic.
#[derive(Debug, Clone)]
pub struct TargetPolicy {
    /// Number of callee-saved integer registers.
    pub callee_saved_regs: u32,
    /// Number of callee-trashed (caller-saved) integer registers.
    pub callee_trash_regs: u32,
    /// Frame-size threshold past which stack displacements need a wider
    /// encoding.
    pub large_frame_size: u32,
    /// Frame-size threshold past which displacements need the widest
    /// encoding.
    pub huge_frame_size: u32,
    /// Minimum recomputation cost for an expression to be considered.
    pub min_candidate_cost: u8,
    /// Maximum number of indexed candidates, at most [`MAX_CSE_COUNT`].
    pub max_candidates: usize,
    /// Pointer size in bytes, used to estimate local slot sizes.
    pub pointer_size: u32,
}

impl Default for TargetPolicy {
    fn default() -> Self {
        Self {
            callee_saved_regs: 6,
            callee_trash_regs: 7,
            large_frame_size: 0x80,
            huge_frame_size: 0x10000,
            min_candidate_cost: 2,
            max_candidates: MAX_CSE_COUNT,
            pointer_size: 8,
        }
    }
}

impl TargetPolicy {
    /// Enregisterable-local count at which promotion stops being aggressive.
    #[must_use]
    pub fn aggressive_enreg_num(&self) -> u32 {
        self.callee_saved_regs * 3 / 2
    }

    /// Enregisterable-local count at which promotion stops being moderate.
    #[must_use]
    pub fn moderate_enreg_num(&self) -> u32 {
        self.callee_saved_regs * 3 + self.callee_trash_regs * 2
    }
}

/// Configuration of one CSE pass invocation.
#[derive(Debug, Clone, Default)]
pub struct CseConfig {
    /// Master switch; when `false` the pass records a single event and
    /// returns without touching the IR.
    pub enabled: bool,
    /// Use code-size costs and unweighted ref counts instead of execution
    /// costs and weighted counts.
    pub optimize_for_size: bool,
    /// Allow constant expressions as candidates.
    pub const_cse: bool,
    /// When set, only candidates whose zero-based index is in the mask are
    /// considered for promotion. Exists for differential testing of
    /// individual candidates.
    pub candidate_allow_mask: Option<BitSet>,
    /// Target tuning table.
    pub policy: TargetPolicy,
}

impl CseConfig {
    /// A configuration with the pass enabled and default policy.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Returns `true` if the candidate with the given zero-based index may
    /// be promoted under the allow mask.
    #[must_use]
    pub fn candidate_allowed(&self, index0: usize) -> bool {
        match &self.candidate_allow_mask {
            Some(mask) => index0 < mask.len() && mask.contains(index0),
            None => true,
        }
    }
}
