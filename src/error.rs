// Copyright 2024 Nathan Hoos
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
use thiserror::Error;

/// Construction-time failures. The guide runtime itself has no error paths:
/// every query resolves to a state or the dead sentinel.
#[derive(Debug, Error)]
pub enum Error {
    /// The regex could not be parsed.
    #[error("invalid regex pattern: {0}")]
    BadPattern(String),

    /// The regex parsed but uses a construct outside the regular-language
    /// subset (lookaround, backreferences, word boundaries).
    #[error("unsupported regex construct: {0}")]
    UnsupportedPattern(String),

    /// A vocabulary token could not be decoded to bytes.
    #[error("cannot convert token `{token}` ({id}) to bytes")]
    BadToken { token: String, id: u32 },

    /// No sequence of vocabulary tokens reaches a final state of the FSM.
    #[error("vocabulary cannot produce any string matching the pattern")]
    UnsatisfiableVocabulary,

    /// The same token id appeared under more than one decoded string while
    /// constructing a vocabulary.
    #[error("token id {0} appears under more than one decoded string")]
    DuplicateTokenId(u32),

    /// Index construction was cancelled between per-state scans.
    #[error("index construction cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
