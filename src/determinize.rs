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

//! Canonical relabeling of an FSM.
//!
//! The transition function is already deterministic per `(state, key)`;
//! what this pass pins down is the numbering. Keys are renumbered densely
//! in the order of their classes' sorted symbol lists (the "anything else"
//! class last), then states are renumbered from the initial state: a stack
//! walk expands states LIFO, visits successors in ascending new-key order,
//! and hands out indices in first-seen order. Applying the pass twice is
//! the identity.

use crate::fsm::{Alphabet, Fsm, StateId, TransitionKey};
use rustc_hash::{FxHashMap, FxHashSet};

/// Canonicalize `fsm`. Also returns the old-state -> new-state dictionary
/// so callers can translate externally recorded states.
pub fn make_deterministic_fsm(fsm: &Fsm) -> (Fsm, FxHashMap<StateId, StateId>) {
    // Key classes ordered by their sorted symbol lists; the catch-all class
    // carries no symbols and sorts last.
    let by_transition = fsm.alphabet.by_transition();
    let mut classes: Vec<(Vec<&str>, TransitionKey)> = by_transition
        .into_iter()
        .map(|(key, symbols)| (symbols, key))
        .collect();
    classes.sort();

    let mut old_to_new_trans_keys: FxHashMap<TransitionKey, TransitionKey> = FxHashMap::default();
    for (i, (_, old_key)) in classes.iter().enumerate() {
        old_to_new_trans_keys.insert(*old_key, i as TransitionKey);
    }
    let new_anything_value = classes.len() as TransitionKey;
    old_to_new_trans_keys.insert(fsm.alphabet.anything_value(), new_anything_value);

    let new_symbol_mapping: FxHashMap<String, TransitionKey> = fsm
        .alphabet
        .symbol_mapping()
        .iter()
        .map(|(symbol, key)| (symbol.clone(), old_to_new_trans_keys[key]))
        .collect();

    let renumbered_map: FxHashMap<StateId, FxHashMap<TransitionKey, StateId>> = fsm
        .map
        .iter()
        .map(|(&from_state, trans_map)| {
            (
                from_state,
                trans_map
                    .iter()
                    .map(|(key, &to_state)| (old_to_new_trans_keys[key], to_state))
                    .collect(),
            )
        })
        .collect();

    let mut old_to_new_states: FxHashMap<StateId, StateId> = FxHashMap::default();
    old_to_new_states.insert(fsm.initial, 0);

    let mut i: StateId = 0;
    let mut seen: FxHashSet<StateId> = FxHashSet::from_iter([fsm.initial]);
    let mut stack = vec![fsm.initial];
    while let Some(old_state) = stack.pop() {
        let Some(transitions) = renumbered_map.get(&old_state) else {
            continue;
        };
        let mut sorted_transitions: Vec<(TransitionKey, StateId)> =
            transitions.iter().map(|(&k, &s)| (k, s)).collect();
        sorted_transitions.sort_unstable();

        for (_, to_state) in sorted_transitions {
            if seen.insert(to_state) {
                stack.push(to_state);
            }
            if !old_to_new_states.contains_key(&to_state) {
                i += 1;
                old_to_new_states.insert(to_state, i);
            }
        }
    }

    // Unreachable states drop out here.
    let new_map: FxHashMap<StateId, FxHashMap<TransitionKey, StateId>> = renumbered_map
        .iter()
        .filter_map(|(from_state, trans_map)| {
            let new_from = *old_to_new_states.get(from_state)?;
            let new_trans: FxHashMap<TransitionKey, StateId> = trans_map
                .iter()
                .map(|(&key, to_state)| (key, old_to_new_states[to_state]))
                .collect();
            Some((new_from, new_trans))
        })
        .collect();

    let new_finals: FxHashSet<StateId> = fsm
        .finals
        .iter()
        .filter_map(|old_state| old_to_new_states.get(old_state).copied())
        .collect();
    let mut new_states: Vec<StateId> = new_map.keys().copied().collect();
    new_states.sort_unstable();

    let new_fsm = Fsm {
        alphabet: Alphabet::new(new_symbol_mapping, new_anything_value),
        states: new_states,
        initial: 0,
        finals: new_finals,
        map: new_map,
    };

    (new_fsm, old_to_new_states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::parse_pattern_to_fsm;

    fn canonical(pattern: &str) -> Fsm {
        let fsm = parse_pattern_to_fsm(pattern).unwrap();
        make_deterministic_fsm(&fsm).0
    }

    #[test]
    fn test_initial_is_zero_and_keys_are_dense() {
        let fsm = canonical("0|[1-9][0-9]*");
        assert_eq!(fsm.initial, 0);

        let mut keys: Vec<_> = fsm
            .alphabet
            .symbol_mapping()
            .values()
            .copied()
            .chain([fsm.alphabet.anything_value()])
            .collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys, (0..keys.len() as u32).collect::<Vec<_>>());
        // The catch-all class sorts after every symbol class.
        assert_eq!(fsm.alphabet.anything_value(), *keys.last().unwrap());
    }

    #[test]
    fn test_digit_pattern_numbering() {
        // `0` gets the lowest key, so the `0`-successor is numbered before
        // the `[1-9]`-successor.
        let fsm = canonical("0|[1-9][0-9]*");
        let zero_key = fsm.alphabet.key_for("0");
        let nonzero_key = fsm.alphabet.key_for("5");
        assert!(zero_key < nonzero_key);
        assert_eq!(fsm.map[&0][&zero_key], 1);
        assert_eq!(fsm.map[&0][&nonzero_key], 2);
        assert!(fsm.finals.contains(&1) && fsm.finals.contains(&2));
        assert_eq!(fsm.map[&2][&zero_key], 2);
        assert_eq!(fsm.map[&2][&nonzero_key], 2);
        assert!(fsm.map[&1].is_empty());
    }

    #[test]
    fn test_idempotence() {
        for pattern in ["0|[1-9][0-9]*", "foo(bar|baz)*qux", "[^aeiou]{2,4}", "😀+"] {
            let once = canonical(pattern);
            let (twice, state_dict) = make_deterministic_fsm(&once);

            assert_eq!(once.initial, twice.initial);
            assert_eq!(once.states, twice.states);
            assert_eq!(once.finals, twice.finals);
            assert_eq!(once.map, twice.map);
            assert_eq!(
                once.alphabet.symbol_mapping(),
                twice.alphabet.symbol_mapping()
            );
            for (old, new) in state_dict {
                assert_eq!(old, new);
            }
        }
    }

    #[test]
    fn test_old_to_new_dictionary_translates_finals() {
        let fsm = parse_pattern_to_fsm("a|bc").unwrap();
        let (canonical, old_to_new) = make_deterministic_fsm(&fsm);
        for old_final in &fsm.finals {
            assert!(canonical.finals.contains(&old_to_new[old_final]));
        }
    }
}
