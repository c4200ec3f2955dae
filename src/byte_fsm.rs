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

//! Character-level FSM -> byte-level FSM.
//!
//! Multi-byte characters become chains of fresh intermediate states, one
//! edge per UTF-8 byte. Chains starting at the same origin state share
//! their structure through a per-state transition trie, and identical
//! suffix subtrees collapse to a single intermediate state (hash-consed by
//! their outgoing transition set). The "anything else" edge grows the full
//! two-, three- and four-byte UTF-8 subtrees so unmentioned characters stay
//! representable byte-by-byte.

use crate::fsm::{byte_symbol, Alphabet, Fsm, StateId, TransitionKey};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};

/// UTF-8 byte ranges by role: continuation bytes, then two-, three- and
/// four-byte lead bytes.
const UTF8_RANGES: [(u8, u8); 4] = [(0x80, 0xC0), (0xC0, 0xE0), (0xE0, 0xF0), (0xF0, 0xF8)];

/// Per-state transition trie used while chains are being merged. A
/// `Target(None)` leaf blocks the catch-all merge from claiming a byte
/// sequence that belongs to an explicit symbol of the alphabet.
#[derive(Debug, Clone)]
enum TrieNode {
    Branch(BTreeMap<TransitionKey, TrieNode>),
    Target(Option<StateId>),
}

fn trie_insert(
    map: &mut BTreeMap<TransitionKey, TrieNode>,
    seq: &[TransitionKey],
    value: Option<StateId>,
    overwrite: bool,
) {
    if seq.len() == 1 {
        if overwrite || !map.contains_key(&seq[0]) {
            map.insert(seq[0], TrieNode::Target(value));
        }
        return;
    }
    let node = map
        .entry(seq[0])
        .or_insert_with(|| TrieNode::Branch(BTreeMap::new()));
    if let TrieNode::Branch(child) = node {
        trie_insert(child, &seq[1..], value, overwrite);
    }
}

// Merge `default` into `map`, only filling entries the trie does not
// already have.
fn trie_setdefault(
    map: &mut BTreeMap<TransitionKey, TrieNode>,
    default: &BTreeMap<TransitionKey, TrieNode>,
) {
    for (key, default_node) in default {
        match map.get_mut(key) {
            Some(TrieNode::Branch(child)) => {
                if let TrieNode::Branch(default_child) = default_node {
                    trie_setdefault(child, default_child);
                }
            }
            Some(TrieNode::Target(_)) => {}
            None => {
                map.insert(*key, default_node.clone());
            }
        }
    }
}

struct Expander {
    map: FxHashMap<StateId, FxHashMap<TransitionKey, StateId>>,
    states: Vec<StateId>,
    max_state: StateId,
    /// Intermediate states hash-consed by their sorted transition set.
    state_cache: FxHashMap<Vec<(TransitionKey, StateId)>, StateId>,
}

impl Expander {
    /// Materialize a trie into transitions, creating (or reusing) one
    /// intermediate state per distinct subtree. Keys are visited ascending
    /// and subtrees bottom-up, so intermediate state numbering is
    /// reproducible.
    fn create_seq_transitions(
        &mut self,
        trie: &BTreeMap<TransitionKey, TrieNode>,
    ) -> FxHashMap<TransitionKey, StateId> {
        let mut result = FxHashMap::default();

        for (&next_key, node) in trie {
            match node {
                TrieNode::Branch(child) => {
                    let next_transitions = self.create_seq_transitions(child);
                    if next_transitions.is_empty() {
                        continue;
                    }
                    let mut cache_key: Vec<(TransitionKey, StateId)> =
                        next_transitions.iter().map(|(&k, &s)| (k, s)).collect();
                    cache_key.sort_unstable();

                    let next_state = match self.state_cache.get(&cache_key) {
                        Some(&cached) => cached,
                        None => {
                            self.max_state += 1;
                            let fresh = self.max_state;
                            self.map.insert(fresh, next_transitions);
                            self.states.push(fresh);
                            self.state_cache.insert(cache_key, fresh);
                            fresh
                        }
                    };
                    result.insert(next_key, next_state);
                }
                TrieNode::Target(Some(to_state)) => {
                    result.insert(next_key, *to_state);
                }
                TrieNode::Target(None) => {}
            }
        }

        result
    }
}

/// Expand a character-level FSM into a byte-level FSM.
///
/// With `keep_utf8` the original multi-byte symbol keys survive alongside
/// their byte chains, so callers can traverse with whole characters or with
/// single bytes and land in the same states. Frozen tokens are carried as
/// opaque single-key transitions and never expanded.
pub fn make_byte_level_fsm(fsm: &Fsm, keep_utf8: bool, frozen_tokens: &FxHashSet<String>) -> Fsm {
    let anything_else_key = fsm.alphabet.anything_value();
    let mut symbol_mapping: FxHashMap<String, TransitionKey> = FxHashMap::default();
    let mut max_key = fsm.alphabet.max_key();

    // Identify multi-byte characters and assign byte-level keys, reusing a
    // byte's key across symbols that share it.
    let mut key_to_key_seqs: FxHashMap<TransitionKey, BTreeSet<Vec<TransitionKey>>> =
        FxHashMap::default();
    let mut all_key_seqs: BTreeSet<Vec<TransitionKey>> = BTreeSet::new();

    for symbol in fsm.alphabet.sorted_symbols() {
        let transition_key = fsm.alphabet.key_for(symbol);
        let is_single_ascii = {
            let mut chars = symbol.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if (c as u32) < 0x80)
        };
        if frozen_tokens.contains(symbol) || is_single_ascii {
            symbol_mapping.insert(symbol.to_string(), transition_key);
            continue;
        }

        if keep_utf8 {
            symbol_mapping.insert(symbol.to_string(), transition_key);
        }
        let mut key_seq = Vec::new();
        for byte in symbol.bytes() {
            let byte_sym = byte_symbol(byte);
            let byte_key = match symbol_mapping.get(&byte_sym) {
                Some(&existing) => existing,
                None => {
                    max_key += 1;
                    symbol_mapping.insert(byte_sym, max_key);
                    max_key
                }
            };
            key_seq.push(byte_key);
        }
        key_to_key_seqs
            .entry(transition_key)
            .or_default()
            .insert(key_seq.clone());
        all_key_seqs.insert(key_seq);
    }

    // The remaining UTF-8 bytes enter the alphabet through per-range keys;
    // they are what represents "anything else" at the byte level.
    let mut utf8_all_keys: [BTreeSet<TransitionKey>; 4] = std::array::from_fn(|_| BTreeSet::new());
    for (n, &(start, end)) in UTF8_RANGES.iter().enumerate() {
        max_key += 1;
        let range_key = max_key;
        for byte in start..end {
            let byte_key = *symbol_mapping.entry(byte_symbol(byte)).or_insert(range_key);
            utf8_all_keys[n].insert(byte_key);
        }
    }

    let mut expander = Expander {
        map: FxHashMap::default(),
        states: fsm.states.clone(),
        max_state: fsm.states.iter().copied().max().unwrap_or(0),
        state_cache: FxHashMap::default(),
    };

    for state in fsm.sorted_states() {
        let Some(transitions) = fsm.map.get(&state) else {
            continue;
        };

        let mut trie: BTreeMap<TransitionKey, TrieNode> = BTreeMap::new();
        let mut state_map: FxHashMap<TransitionKey, StateId> = FxHashMap::default();

        let mut sorted_transitions: Vec<(TransitionKey, StateId)> =
            transitions.iter().map(|(&k, &s)| (k, s)).collect();
        sorted_transitions.sort_unstable();

        for (transition_key, to_state) in sorted_transitions {
            match key_to_key_seqs.get(&transition_key) {
                Some(key_seqs) => {
                    if keep_utf8 {
                        state_map.insert(transition_key, to_state);
                    }
                    for key_seq in key_seqs {
                        trie_insert(&mut trie, key_seq, Some(to_state), true);
                    }
                }
                // Single-byte transitions are carried as-is.
                None => {
                    state_map.insert(transition_key, to_state);
                }
            }
        }

        if let Some(&catch_all_target) = transitions.get(&anything_else_key) {
            // Explicit byte sequences must not be reachable through the
            // catch-all subtrees, so their paths are blocked first. The
            // blocks never displace a target this state already has.
            for key_seq in &all_key_seqs {
                trie_insert(&mut trie, key_seq, None, false);
            }

            let mut anything_else_trie: BTreeMap<TransitionKey, TrieNode> = BTreeMap::new();
            let mut cont_trie = TrieNode::Target(Some(catch_all_target));
            for n in 1..4 {
                let mut level = BTreeMap::new();
                for &key in &utf8_all_keys[0] {
                    level.insert(key, cont_trie.clone());
                }
                cont_trie = TrieNode::Branch(level);
                for &key in &utf8_all_keys[n] {
                    anything_else_trie.insert(key, cont_trie.clone());
                }
            }

            trie_setdefault(&mut trie, &anything_else_trie);
        }

        let next_transitions = expander.create_seq_transitions(&trie);
        state_map.extend(next_transitions);
        expander.map.insert(state, state_map);
    }

    Fsm {
        alphabet: Alphabet::new(symbol_mapping, anything_else_key),
        states: expander.states,
        initial: fsm.initial,
        finals: fsm.finals.clone(),
        map: expander.map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::bytes_to_symbols;
    use crate::regex::parse_pattern_to_fsm;

    fn to_byte_atoms(s: &str) -> Vec<String> {
        s.bytes().map(byte_symbol).collect()
    }

    fn to_char_atoms(s: &str) -> Vec<String> {
        s.chars().map(|c| c.to_string()).collect()
    }

    fn accepts(fsm: &Fsm, atoms: &[String]) -> bool {
        fsm.accepts(atoms.iter().map(|s| s.as_str()))
    }

    #[test]
    fn test_byte_level_acceptance_matches_char_level() {
        let cases: &[(&str, &str, bool)] = &[
            ("[a-c]+", "😀", false),
            ("[^a-c]+", "😀", true),
            ("😀+", "😀😀😀", true),
            ("😀+", "a", false),
            ("[😀-😍]{2}", "😈😈", true),
            ("[😀-😍]{2}", "aa", false),
            ("[^😀-😍]{2}", "aa", true),
            ("[^😀-😍]{2}", "😈😈", false),
            ("[^😀-😍]{2}", "😎😎", true),
            ("[^😀-😍]{2}", "😎😓", true),
            ("[^😀-😍]{2}", "😎😈", false),
            ("[😀-🙌]{2}", "😎😈", true),
            ("[^😀-🙌]{2}", "😎😈", false),
            ("[^😀-🙌]{2}", "🙏🙏", true),
            ("[^😀-🙌]{2}", "🙏😎", false),
        ];
        let frozen = FxHashSet::default();

        for &(pattern, input, should_accept) in cases {
            let char_fsm = parse_pattern_to_fsm(pattern).unwrap();
            let char_atoms = to_char_atoms(input);
            assert_eq!(
                accepts(&char_fsm, &char_atoms),
                should_accept,
                "char-level {} on {:?}",
                pattern,
                input
            );

            let byte_fsm = make_byte_level_fsm(&char_fsm, false, &frozen);
            let byte_atoms = to_byte_atoms(input);
            assert_eq!(
                accepts(&byte_fsm, &byte_atoms),
                should_accept,
                "byte-level {} on {:?}",
                pattern,
                input
            );

            let mix_fsm = make_byte_level_fsm(&char_fsm, true, &frozen);
            assert_eq!(accepts(&mix_fsm, &byte_atoms), should_accept);
            assert_eq!(accepts(&mix_fsm, &char_atoms), should_accept);
        }
    }

    #[test]
    fn test_states_agree_along_the_walk() {
        // With keep_utf8, walking full characters and walking their bytes
        // must land in the same states, step by step.
        let cases = ["😀😀", "😎😓", "a😀b", "🙏🙏"];
        let frozen = FxHashSet::default();
        let char_fsm = parse_pattern_to_fsm("[^😀-😍]*").unwrap();
        let mix_fsm = make_byte_level_fsm(&char_fsm, true, &frozen);

        for input in cases {
            let mut char_state = Some(char_fsm.initial);
            let mut mix_char_state = Some(mix_fsm.initial);
            let mut mix_byte_state = Some(mix_fsm.initial);

            for c in input.chars() {
                let atom = c.to_string();
                char_state = char_state.and_then(|s| char_fsm.advance(s, &atom));
                mix_char_state = mix_char_state.and_then(|s| mix_fsm.advance(s, &atom));
                for byte_atom in to_byte_atoms(&atom) {
                    mix_byte_state = mix_byte_state.and_then(|s| mix_fsm.advance(s, &byte_atom));
                }
                assert_eq!(mix_char_state, char_state);
                assert_eq!(mix_byte_state, char_state);
            }
        }
    }

    #[test]
    fn test_incomplete_utf8_prefix_parks_in_intermediate_state() {
        let frozen = FxHashSet::default();
        let char_fsm = parse_pattern_to_fsm("😀").unwrap();
        let byte_fsm = make_byte_level_fsm(&char_fsm, false, &frozen);

        let mut state = byte_fsm.initial;
        let bytes = "😀".as_bytes();
        for &b in &bytes[..3] {
            state = byte_fsm.advance(state, &byte_symbol(b)).unwrap();
            assert!(!byte_fsm.finals.contains(&state));
        }
        let end = byte_fsm.advance(state, &byte_symbol(bytes[3])).unwrap();
        assert!(byte_fsm.finals.contains(&end));
    }

    #[test]
    fn test_shared_prefix_chains_are_merged() {
        // 😈..😍 differ only in their final byte, so each origin state needs
        // exactly three intermediate states for the shared prefix.
        let frozen = FxHashSet::default();
        let char_fsm = parse_pattern_to_fsm("[😈-😍]").unwrap();
        let byte_fsm = make_byte_level_fsm(&char_fsm, false, &frozen);
        assert_eq!(byte_fsm.states.len(), char_fsm.states.len() + 3);
    }

    #[test]
    fn test_frozen_token_stays_atomic() {
        let frozen: FxHashSet<String> = FxHashSet::from_iter(["😀".to_string()]);
        let char_fsm = parse_pattern_to_fsm("😀").unwrap();
        let byte_fsm = make_byte_level_fsm(&char_fsm, false, &frozen);

        // The frozen symbol keeps its own key and no byte chain appears.
        assert_eq!(
            byte_fsm.alphabet.get("😀"),
            char_fsm.alphabet.get("😀"),
        );
        assert_eq!(byte_fsm.states.len(), char_fsm.states.len());
        let atoms = vec!["😀".to_string()];
        assert!(accepts(&byte_fsm, &atoms));
    }

    #[test]
    fn test_vocab_style_atoms_walk_the_byte_fsm() {
        let frozen = FxHashSet::default();
        let char_fsm = parse_pattern_to_fsm("😇|a😇").unwrap();
        let byte_fsm = make_byte_level_fsm(&char_fsm, true, &frozen);

        let encoded = bytes_to_symbols("a😇".as_bytes());
        let atoms = crate::fsm::split_symbols(&encoded);
        assert!(accepts(&byte_fsm, &atoms));
    }
}
