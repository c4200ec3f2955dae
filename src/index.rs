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
use crate::error::{Error, Result};
use crate::fsm::{FsmInfo, StateId};
use crate::tokenizer_index::create_fsm_index_end_to_end;
use crate::vocab::TokenVocabulary;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

/// Runtime sentinel: the pattern cannot be satisfied from here, only
/// end-of-sequence may follow.
pub const DEAD_STATE: i32 = -1;

/// The token-level index: for every live FSM state, the tokens acceptable
/// there and the state each one leads to.
///
/// Immutable once built and safe to query from any number of generation
/// threads. States with no outgoing entries are not stored; the runtime
/// reads their absence as "only end-of-sequence" when the state is final
/// and as a dead end otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    initial: StateId,
    finals: Vec<StateId>,
    states_to_token_maps: FxHashMap<StateId, FxHashMap<u32, StateId>>,
    eos_token_id: u32,
    empty_token_ids: FxHashSet<u32>,
}

impl Index {
    /// Scan the vocabulary against the FSM and assemble the index.
    /// Construction is transactional: any error leaves nothing behind.
    pub(crate) fn from_fsm_info(
        fsm_info: &FsmInfo,
        vocabulary: &TokenVocabulary,
        empty_token_ids: FxHashSet<u32>,
        eos_token_id: u32,
        frozen_tokens: &FxHashSet<String>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Self> {
        let states_to_token_maps =
            create_fsm_index_end_to_end(fsm_info, vocabulary, frozen_tokens, cancel)?;

        // At least one trajectory must be able to finish a match.
        let satisfiable = states_to_token_maps
            .values()
            .flat_map(|token_map| token_map.values())
            .any(|&end_state| fsm_info.is_final(end_state));
        if !satisfiable {
            return Err(Error::UnsatisfiableVocabulary);
        }

        tracing::debug!(
            states = states_to_token_maps.len(),
            finals = fsm_info.finals.len(),
            "token index built"
        );

        Ok(Index {
            initial: fsm_info.initial,
            finals: fsm_info.finals.clone(),
            states_to_token_maps,
            eos_token_id,
            empty_token_ids,
        })
    }

    pub fn initial_state(&self) -> i32 {
        self.initial as i32
    }

    /// Token ids acceptable at `state`, ascending. `None` means only the
    /// end-of-sequence token is permitted: the dead sentinel, or a state
    /// with no outgoing entries.
    pub fn allowed_tokens(&self, state: i32) -> Option<Vec<u32>> {
        if state == DEAD_STATE {
            return None;
        }
        self.states_to_token_maps.get(&(state as StateId)).map(|token_map| {
            let mut tokens: Vec<u32> = token_map.keys().copied().collect();
            tokens.sort_unstable();
            tokens
        })
    }

    /// Successor of `state` on `token_id`. End-of-sequence and unknown
    /// tokens drive to the dead sentinel; the dead sentinel absorbs.
    pub fn next_state(&self, state: i32, token_id: u32) -> i32 {
        if state == DEAD_STATE {
            return DEAD_STATE;
        }
        if token_id == self.eos_token_id {
            return DEAD_STATE;
        }
        match self
            .states_to_token_maps
            .get(&(state as StateId))
            .and_then(|token_map| token_map.get(&token_id))
        {
            Some(&next) => next as i32,
            None => DEAD_STATE,
        }
    }

    pub fn is_final(&self, state: i32) -> bool {
        state == DEAD_STATE || self.finals.contains(&(state as StateId))
    }

    /// The full `state -> (token id -> state)` table.
    pub fn transitions(&self) -> &FxHashMap<StateId, FxHashMap<u32, StateId>> {
        &self.states_to_token_maps
    }

    pub fn final_states(&self) -> &[StateId] {
        &self.finals
    }

    pub fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    /// Token ids whose decoded string is empty. Exposed for downstream
    /// samplers; the guide itself never consults them.
    pub fn empty_token_ids(&self) -> &FxHashSet<u32> {
        &self.empty_token_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::determinize::make_deterministic_fsm;
    use crate::regex::parse_pattern_to_fsm;

    fn build(pattern: &str, entries: &[(&str, &[u32])], eos: u32) -> Result<Index> {
        let fsm = parse_pattern_to_fsm(pattern).unwrap();
        let (canonical, _) = make_deterministic_fsm(&fsm);
        let info = canonical.fsm_info(pattern);

        let mut map = FxHashMap::default();
        for (s, ids) in entries {
            map.insert(s.to_string(), ids.to_vec());
        }
        let vocabulary = TokenVocabulary::from_map(map).unwrap();
        Index::from_fsm_info(
            &info,
            &vocabulary,
            FxHashSet::default(),
            eos,
            &FxHashSet::default(),
            None,
        )
    }

    #[test]
    fn test_digit_index_layout() {
        let index = build(
            "0|[1-9][0-9]*",
            &[("blah", &[0]), ("1a", &[1]), ("2", &[2]), ("0", &[3]), ("<EOS>", &[4])],
            4,
        )
        .unwrap();

        let transitions = index.transitions();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[&0], FxHashMap::from_iter([(2, 2), (3, 1)]));
        assert_eq!(transitions[&2], FxHashMap::from_iter([(2, 2), (3, 2)]));

        assert_eq!(index.allowed_tokens(0), Some(vec![2, 3]));
        assert_eq!(index.next_state(0, 3), 1);
        assert!(index.is_final(1));
        // State 1 is final-only: no entries, only EOS is legal.
        assert_eq!(index.allowed_tokens(1), None);
    }

    #[test]
    fn test_unsatisfiable_vocabulary() {
        match build("x+", &[("a", &[1])], 0) {
            Err(Error::UnsatisfiableVocabulary) => {}
            other => panic!("expected UnsatisfiableVocabulary, got {:?}", other),
        }
    }

    #[test]
    fn test_eos_and_dead_state_semantics() {
        let index = build("ab", &[("a", &[1]), ("b", &[2])], 7).unwrap();

        assert_eq!(index.next_state(index.initial_state(), 7), DEAD_STATE);
        assert_eq!(index.next_state(DEAD_STATE, 1), DEAD_STATE);
        assert_eq!(index.allowed_tokens(DEAD_STATE), None);
        assert!(index.is_final(DEAD_STATE));
        // An id the state does not accept also falls to the sentinel.
        assert_eq!(index.next_state(index.initial_state(), 2), DEAD_STATE);
    }

    #[test]
    fn test_offered_tokens_never_dead_end() {
        let index = build(
            "z[ab]z",
            &[("a", &[1]), ("b", &[2]), ("z", &[3]), ("za", &[4]), ("zaz", &[5])],
            9,
        )
        .unwrap();

        let mut stack = vec![index.initial_state()];
        let mut visited = FxHashSet::default();
        while let Some(state) = stack.pop() {
            if !visited.insert(state) {
                continue;
            }
            let Some(tokens) = index.allowed_tokens(state) else {
                assert!(index.is_final(state));
                continue;
            };
            assert!(!tokens.is_empty() || index.is_final(state));
            for token in tokens {
                let next = index.next_state(state, token);
                assert_ne!(next, DEAD_STATE);
                stack.push(next);
            }
        }
    }

    #[test]
    fn test_identical_tokens_share_targets() {
        // `a` and `b` are interchangeable in `z[ab]z`, so their columns in
        // the index agree everywhere.
        let index = build(
            "z[ab]z",
            &[("a", &[1]), ("b", &[2]), ("z", &[3])],
            9,
        )
        .unwrap();

        let after_z = index.next_state(index.initial_state(), 3);
        assert_ne!(after_z, DEAD_STATE);
        let via_a = index.next_state(after_z, 1);
        let via_b = index.next_state(after_z, 2);
        assert_eq!(via_a, via_b);
        assert_ne!(via_a, DEAD_STATE);
        assert_ne!(index.next_state(index.initial_state(), 3), via_a);

        for token_map in index.transitions().values() {
            assert_eq!(token_map.get(&1), token_map.get(&2));
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let index = build(
            "0|[1-9][0-9]*",
            &[("2", &[2]), ("0", &[3])],
            4,
        )
        .unwrap();

        let encoded = serde_json::to_string(&index).unwrap();
        let decoded: Index = serde_json::from_str(&encoded).unwrap();
        assert_eq!(index, decoded);
        assert_eq!(decoded.initial_state(), 0);
        assert_eq!(decoded.allowed_tokens(0), index.allowed_tokens(0));
    }
}
