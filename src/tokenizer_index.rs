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

//! Token-level index construction.
//!
//! Every vocabulary string is translated once into a sequence of the FSM's
//! transition keys; each reachable state is then scanned against the whole
//! vocabulary by walking those sequences through the flat transition table.
//! States are discovered breadth-first from the initial state, and the
//! states of one frontier wave are scanned in parallel: a `(state, token)`
//! walk only reads the FSM and writes into its own state's map.

use crate::error::{Error, Result};
use crate::fsm::{split_symbols, FsmInfo, StateId, TransitionKey};
use crate::vocab::TokenVocabulary;
use fixedbitset::FixedBitSet;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};

/// Key sequences are almost always short; token strings beyond eight atoms
/// spill to the heap.
pub type TransitionKeySeq = SmallVec<[TransitionKey; 8]>;

/// Translate one vocabulary string into transition keys, atom by atom.
/// Atoms absent from the symbol mapping take the "anything else" key.
pub fn get_token_transition_keys(
    alphabet_symbol_mapping: &FxHashMap<String, TransitionKey>,
    alphabet_anything_value: TransitionKey,
    token_str: &str,
) -> TransitionKeySeq {
    split_symbols(token_str)
        .iter()
        .map(|atom| {
            alphabet_symbol_mapping
                .get(atom)
                .copied()
                .unwrap_or(alphabet_anything_value)
        })
        .collect()
}

/// Key sequences for the whole vocabulary, in vocabulary order. A frozen
/// token is looked up whole and yields a single key instead of being split
/// into atoms.
pub fn get_vocabulary_transition_keys(
    alphabet_symbol_mapping: &FxHashMap<String, TransitionKey>,
    alphabet_anything_value: TransitionKey,
    vocabulary: &TokenVocabulary,
    frozen_tokens: &FxHashSet<String>,
) -> Vec<TransitionKeySeq> {
    vocabulary
        .iter()
        .map(|(token_str, _)| {
            if frozen_tokens.contains(token_str) {
                let mut keys = TransitionKeySeq::new();
                keys.push(
                    alphabet_symbol_mapping
                        .get(token_str)
                        .copied()
                        .unwrap_or(alphabet_anything_value),
                );
                keys
            } else {
                get_token_transition_keys(
                    alphabet_symbol_mapping,
                    alphabet_anything_value,
                    token_str,
                )
            }
        })
        .collect()
}

/// Walk the FSM from `start_state` over `token_transition_keys`, returning
/// the state visited after each consumed key.
///
/// With `full_match` the walk only counts when it ends exactly on a final
/// state; this mode is a debugging helper. Index construction uses
/// `full_match = false` and accepts any walk that consumes every key, which
/// is the "full walk, no early termination" rule: a dead end anywhere
/// rejects the token, finality along the way does not matter.
pub fn walk_fsm(
    fsm_info: &FsmInfo,
    token_transition_keys: &[TransitionKey],
    start_state: StateId,
    full_match: bool,
) -> Vec<StateId> {
    let mut state = start_state;
    let mut accepted_states = Vec::new();
    let mut last_final_idx = 0;

    for (i, &trans_key) in token_transition_keys.iter().enumerate() {
        match fsm_info.transitions.get(&(state, trans_key)) {
            Some(&new_state) => {
                state = new_state;
                if fsm_info.finals.contains(&state) {
                    last_final_idx = i + 1;
                }
                accepted_states.push(state);
            }
            None => {
                if !full_match && last_final_idx > 0 {
                    accepted_states.truncate(last_final_idx);
                    return accepted_states;
                }
                return Vec::new();
            }
        }
    }

    if full_match && last_final_idx != token_transition_keys.len() {
        return Vec::new();
    }

    accepted_states
}

/// All `(token_id, end_state)` pairs valid from `start_state`: a token
/// qualifies when its whole key sequence can be consumed. Ids that share a
/// decoded string share the end state.
fn state_scan_tokens(
    fsm_info: &FsmInfo,
    vocabulary: &TokenVocabulary,
    vocabulary_transition_keys: &[TransitionKeySeq],
    start_state: StateId,
) -> Vec<(u32, StateId)> {
    let mut token_ids_end_states = Vec::new();

    for ((_, token_ids), token_transition_keys) in
        vocabulary.iter().zip(vocabulary_transition_keys.iter())
    {
        let state_seq = walk_fsm(fsm_info, token_transition_keys, start_state, false);
        if state_seq.len() < token_transition_keys.len() {
            continue;
        }
        let last_state = *state_seq.last().expect("walk consumed at least one key");
        for &token_id in token_ids {
            token_ids_end_states.push((token_id, last_state));
        }
    }

    token_ids_end_states.sort_unstable();
    token_ids_end_states
}

/// Build the state -> (token id -> next state) maps for every state
/// reachable from the initial one. Cancellation is honored between frontier
/// waves; on cancellation nothing is returned.
pub(crate) fn create_fsm_index_end_to_end(
    fsm_info: &FsmInfo,
    vocabulary: &TokenVocabulary,
    frozen_tokens: &FxHashSet<String>,
    cancel: Option<&AtomicBool>,
) -> Result<FxHashMap<StateId, FxHashMap<u32, StateId>>> {
    let vocabulary_transition_keys = get_vocabulary_transition_keys(
        &fsm_info.alphabet_symbol_mapping,
        fsm_info.alphabet_anything_value,
        vocabulary,
        frozen_tokens,
    );

    let num_states = fsm_info
        .states
        .iter()
        .copied()
        .max()
        .map(|max| max as usize + 1)
        .unwrap_or(0);
    let mut seen = FixedBitSet::with_capacity(num_states);
    let mut frontier = vec![fsm_info.initial];
    seen.insert(fsm_info.initial as usize);

    let mut states_to_token_maps: FxHashMap<StateId, FxHashMap<u32, StateId>> =
        FxHashMap::default();

    while !frontier.is_empty() {
        if let Some(cancel) = cancel {
            if cancel.load(Ordering::Acquire) {
                return Err(Error::Cancelled);
            }
        }

        let wave: Vec<(StateId, Vec<(u32, StateId)>)> = frontier
            .par_iter()
            .map(|&start_state| {
                (
                    start_state,
                    state_scan_tokens(
                        fsm_info,
                        vocabulary,
                        &vocabulary_transition_keys,
                        start_state,
                    ),
                )
            })
            .collect();

        let mut next_frontier = Vec::new();
        for (start_state, token_ids_end_states) in wave {
            if token_ids_end_states.is_empty() {
                continue;
            }
            for &(_, end_state) in &token_ids_end_states {
                if !seen.contains(end_state as usize) {
                    seen.insert(end_state as usize);
                    next_frontier.push(end_state);
                }
            }
            states_to_token_maps
                .insert(start_state, token_ids_end_states.into_iter().collect());
        }

        tracing::trace!(
            scanned = frontier.len(),
            discovered = next_frontier.len(),
            "index scan wave"
        );
        frontier = next_frontier;
    }

    Ok(states_to_token_maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::determinize::make_deterministic_fsm;
    use crate::regex::parse_pattern_to_fsm;

    fn canonical_info(pattern: &str) -> FsmInfo {
        let fsm = parse_pattern_to_fsm(pattern).unwrap();
        let (canonical, _) = make_deterministic_fsm(&fsm);
        canonical.fsm_info(pattern)
    }

    fn keys_for(fsm_info: &FsmInfo, s: &str) -> TransitionKeySeq {
        get_token_transition_keys(
            &fsm_info.alphabet_symbol_mapping,
            fsm_info.alphabet_anything_value,
            s,
        )
    }

    #[test]
    fn test_walk_fsm_digit_pattern() {
        let info = canonical_info("0|[1-9][2-9]*");

        let res = walk_fsm(&info, &keys_for(&info, "0"), info.initial, true);
        assert_eq!(res, vec![1]);

        let res = walk_fsm(&info, &keys_for(&info, "00"), info.initial, false);
        assert_eq!(res, vec![1]);

        let res = walk_fsm(&info, &keys_for(&info, "!"), info.initial, true);
        assert!(res.is_empty());

        let res = walk_fsm(&info, &keys_for(&info, "00"), info.initial, true);
        assert!(res.is_empty());

        // State 1 reads nothing, so nothing can be consumed from it.
        let res = walk_fsm(&info, &keys_for(&info, "0"), 1, true);
        assert!(res.is_empty());
    }

    #[test]
    fn test_walk_fsm_full_match_needs_final_landing() {
        let info = canonical_info("0|[1-9][2-9]+");

        let res = walk_fsm(&info, &keys_for(&info, "1"), info.initial, true);
        assert!(res.is_empty());

        let res = walk_fsm(&info, &keys_for(&info, "1"), info.initial, false);
        assert_eq!(res, vec![2]);

        let res = walk_fsm(&info, &keys_for(&info, "12"), info.initial, true);
        assert_eq!(res, vec![2, 3]);
    }

    #[test]
    fn test_trans_key_identity_for_interchangeable_tokens() {
        // `a` and `b` behave identically in `z[ab]z`; their key sequences
        // must agree, and `z`'s must differ.
        let info = canonical_info("z[ab]z");
        assert_eq!(keys_for(&info, "a"), keys_for(&info, "b"));
        assert_ne!(keys_for(&info, "a"), keys_for(&info, "z"));
    }

    #[test]
    fn test_trans_key_walk_acceptance() {
        let info = canonical_info("a[bc]z");
        let acceptance = [("ab", true), ("ac", true), ("az", false)];
        for (token, should_accept) in acceptance {
            let keys = keys_for(&info, token);
            let state_seq = walk_fsm(&info, &keys, info.initial, false);
            assert_eq!(
                state_seq.len() >= keys.len(),
                should_accept,
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn test_cancellation_aborts_cleanly() {
        let info = canonical_info("[a-z]+");
        let mut map = FxHashMap::default();
        map.insert("a".to_string(), vec![1u32]);
        let vocabulary = TokenVocabulary::from_map(map).unwrap();

        let cancel = AtomicBool::new(true);
        let res = create_fsm_index_end_to_end(
            &info,
            &vocabulary,
            &FxHashSet::default(),
            Some(&cancel),
        );
        assert!(matches!(res, Err(Error::Cancelled)));
    }
}
