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

use thiserror::Error;

/// The generic Error type covering all failures this library can return.
///
/// The CSE pass is strictly an optimization, so most unfavorable conditions
/// (pass disabled, candidate cap reached, local table full) are handled by
/// doing less work rather than by failing. Errors are reserved for misuse of
/// the IR surface by the caller: malformed graphs that the pass cannot even
/// begin to analyze.
#[derive(Error, Debug)]
pub enum Error {
    /// A block references a predecessor or successor that does not exist.
    #[error("malformed control flow graph: {message}")]
    MalformedCfg {
        /// Description of the offending edge or block.
        message: String,
    },

    /// A statement or node reference points outside the method's arenas.
    #[error("dangling IR reference: {message}")]
    DanglingReference {
        /// Description of the dangling reference.
        message: String,
    },

    /// The method has no basic blocks.
    #[error("method has no basic blocks")]
    EmptyMethod,
}

/// Convenience `Result` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
