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

//! Token-level regex guides for constrained LLM decoding.
//!
//! A regex is compiled into a character-level DFA, lifted to a byte-level
//! DFA so multi-byte tokens can be consumed byte by byte, canonically
//! renumbered, and finally indexed against a normalized tokenizer
//! vocabulary. The resulting [`Index`] answers, for every reachable state,
//! which token ids keep the output inside the regex language and where each
//! one leads; [`RegexGuide`] wraps it for samplers.
//!
//! ```no_run
//! # use token_guide_rs::{build_index, Tokenizer};
//! # fn demo(tokenizer: &impl Tokenizer) -> token_guide_rs::Result<()> {
//! let index = build_index("0|[1-9][0-9]*", tokenizer, &[])?;
//! let state = index.initial_state();
//! let allowed = index.allowed_tokens(state);
//! # let _ = allowed;
//! # Ok(())
//! # }
//! ```

mod byte_fsm;
mod caching;
mod determinize;
mod environment;
mod error;
mod fsm;
mod guide;
mod index;
mod regex;
mod tokenizer;
mod tokenizer_index;
mod vocab;

pub use crate::byte_fsm::make_byte_level_fsm;
pub use crate::determinize::make_deterministic_fsm;
pub use crate::error::{Error, Result};
pub use crate::fsm::{byte_symbol, bytes_to_symbols, split_symbols, Alphabet, Fsm, FsmInfo, StateId, TransitionKey};
pub use crate::guide::{Generate, Guide, Instruction, RegexGuide, StopAtEosGuide, Write};
pub use crate::index::{Index, DEAD_STATE};
pub use crate::regex::{parse_pattern, parse_pattern_to_fsm, Anchor, Ast, CharSet};
pub use crate::tokenizer::{Token, Tokenizer};
pub use crate::tokenizer_index::{
    get_token_transition_keys, get_vocabulary_transition_keys, walk_fsm, TransitionKeySeq,
};
pub use crate::vocab::{reduced_vocabulary, TokenVocabulary};

use crate::caching::{get_cached_index, get_index_cache_key, insert_index_to_cache};
use rustc_hash::FxHashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Build the token-level index for `regex` against `tokenizer`.
///
/// Results are memoized on the pattern source and the tokenizer
/// fingerprint, so repeated builds for the same pair return a shared index.
pub fn build_index(
    regex: &str,
    tokenizer: &impl Tokenizer,
    frozen_tokens: &[String],
) -> Result<Arc<Index>> {
    build_index_inner(regex, tokenizer, frozen_tokens, None)
}

/// [`build_index`] with cooperative cancellation, checked between per-state
/// scan waves. A cancelled build returns [`Error::Cancelled`] and leaves no
/// partial index behind.
pub fn build_index_with_cancellation(
    regex: &str,
    tokenizer: &impl Tokenizer,
    frozen_tokens: &[String],
    cancel: &AtomicBool,
) -> Result<Arc<Index>> {
    build_index_inner(regex, tokenizer, frozen_tokens, Some(cancel))
}

/// Build an index from a precomputed character-level FSM, skipping the
/// parser. Not memoized: a caller-supplied FSM carries no pattern source to
/// key a cache on.
pub fn build_index_from_fsm(
    fsm: &Fsm,
    tokenizer: &impl Tokenizer,
    frozen_tokens: &[String],
) -> Result<Arc<Index>> {
    index_from_char_fsm(fsm, "", tokenizer, frozen_tokens, None)
}

fn build_index_inner(
    regex: &str,
    tokenizer: &impl Tokenizer,
    frozen_tokens: &[String],
    cancel: Option<&AtomicBool>,
) -> Result<Arc<Index>> {
    let cache_key = get_index_cache_key(regex, tokenizer.fingerprint());
    if let Some(cached) = get_cached_index(cache_key) {
        return Ok(cached);
    }

    let char_fsm = parse_pattern_to_fsm(regex)?;
    let index = index_from_char_fsm(&char_fsm, regex, tokenizer, frozen_tokens, cancel)?;
    insert_index_to_cache(Arc::clone(&index), cache_key);
    Ok(index)
}

fn index_from_char_fsm(
    char_fsm: &Fsm,
    pattern: &str,
    tokenizer: &impl Tokenizer,
    frozen_tokens: &[String],
    cancel: Option<&AtomicBool>,
) -> Result<Arc<Index>> {
    let frozen: FxHashSet<String> = frozen_tokens.iter().cloned().collect();

    let byte_level = make_byte_level_fsm(char_fsm, true, &frozen);
    let (canonical, _) = make_deterministic_fsm(&byte_level);
    let fsm_info = canonical.fsm_info(pattern);
    tracing::debug!(
        states = fsm_info.states.len(),
        symbols = fsm_info.alphabet_symbol_mapping.len(),
        "canonical byte-level FSM ready"
    );

    let (vocabulary, empty_token_ids) = reduced_vocabulary(tokenizer)?;
    tracing::debug!(
        entries = vocabulary.len(),
        empty = empty_token_ids.len(),
        "vocabulary normalized"
    );

    let index = Index::from_fsm_info(
        &fsm_info,
        &vocabulary,
        empty_token_ids,
        tokenizer.eos_token_id(),
        &frozen,
        cancel,
    )?;
    Ok(Arc::new(index))
}
