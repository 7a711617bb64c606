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

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # jitopt
//!
//! A value-numbering based common subexpression elimination (CSE) pass for a
//! method JIT compiler, built in pure Rust. Given a method's intermediate
//! representation annotated with value numbers, block weights, and node
//! costs, the pass finds redundant re-evaluations of equal-valued
//! expressions, decides with a register-pressure-aware heuristic which are
//! worth caching in a temporary, and rewrites the IR in place while
//! preserving every side effect.
//!
//! ## Features
//!
//! - **Available-expressions dataflow** - A forward must-analysis over the
//!   control-flow graph with a two-bit scheme tracking availability across
//!   call boundaries
//! - **Tiered profitability heuristic** - Aggressive, moderate, and
//!   conservative cost models keyed off an estimated register budget and
//!   frame size
//! - **Side-effect-preserving rewrites** - Replaced subtrees keep their
//!   observable effects, in order, exactly once
//! - **Deterministic output** - Stable candidate ordering and tie-breaks;
//!   identical input always produces identical IR
//! - **Injectable promotion strategy** - A seeded stress strategy can stand
//!   in for the deterministic decision during fuzzing
//!
//! ## Quick Start
//!
//! ```rust
//! use jitopt::{
//!     cse::{run_cse, CseConfig},
//!     ir::{BinOp, MethodIrBuilder, ValueNumber, ValueType},
//! };
//!
//! # fn main() -> jitopt::Result<()> {
//! let mut b = MethodIrBuilder::new("example");
//! let x = b.local("x", ValueType::Int);
//! b.block(100.0);
//! for _ in 0..2 {
//!     let lhs = b.local_read(x, ValueNumber(10));
//!     let rhs = b.local_read(x, ValueNumber(10));
//!     let sum = b.binary(BinOp::Add, ValueType::Int, ValueNumber(12), lhs, rhs);
//!     b.costs(sum, 4, 4);
//!     b.stmt(sum);
//! }
//! let mut ir = b.finish();
//!
//! let promoted = run_cse(&mut ir, &CseConfig::enabled())?;
//! assert_eq!(promoted, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - The method IR surface the pass consumes: expression-node
//!   arena, basic blocks, local-variable table, and a builder for producers
//!   and tests
//! - [`cse`] - The pass itself: candidate collection and indexing, the
//!   dataflow engine, def/use classification, the heuristic, and the
//!   rewriter
//! - [`events`] - Structured change tracking; the pass records what it did
//!   instead of printing
//! - [`utils`] - The fixed-width bit set backing the dataflow
//!
//! The pass owns no cross-method state: every run builds its candidate
//! table and bit sets fresh and discards them on return, so separate
//! methods can be compiled concurrently from separate contexts.

pub mod cse;
pub mod events;
pub mod ir;
pub mod utils;

mod error;

pub use error::{Error, Result};
