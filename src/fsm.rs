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
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Identifier for a single FSM state.
pub type StateId = u32;

/// Dense integer labeling an equivalence class of input symbols.
pub type TransitionKey = u32;

/// Encode one byte as an alphabet atom: ASCII bytes stand for themselves,
/// bytes >= 0x80 become the three-char sequence NUL + two uppercase hex
/// digits. Vocabulary strings and byte-level FSM symbols share this scheme,
/// so every decoded token is a sequence of alphabet atoms.
pub fn byte_symbol(byte: u8) -> String {
    if byte < 0x80 {
        (byte as char).to_string()
    } else {
        format!("\x00{:02X}", byte)
    }
}

/// Encode a full byte string as a sequence of atoms concatenated into one
/// string, the exact form vocabulary entries take after normalization.
pub fn bytes_to_symbols(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| byte_symbol(b)).collect()
}

/// Split an atom string back into its atoms. A NUL starts a three-char
/// byte-escape atom when two more chars follow; everything else is a
/// single-char atom.
pub fn split_symbols(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut atoms = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\x00' && i + 2 < chars.len() {
            atoms.push(chars[i..i + 3].iter().collect());
            i += 3;
        } else {
            atoms.push(chars[i].to_string());
            i += 1;
        }
    }
    atoms
}

/// FSM alphabet: a mapping from symbol atoms to transition keys, plus one
/// distinguished key standing for every symbol not present in the mapping.
/// Several symbols may share a key; they then form one equivalence class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alphabet {
    symbol_mapping: FxHashMap<String, TransitionKey>,
    anything_value: TransitionKey,
}

impl Alphabet {
    pub fn new(symbol_mapping: FxHashMap<String, TransitionKey>, anything_value: TransitionKey) -> Self {
        Alphabet {
            symbol_mapping,
            anything_value,
        }
    }

    /// The key for the "anything else" equivalence class.
    pub fn anything_value(&self) -> TransitionKey {
        self.anything_value
    }

    /// Key for `symbol`, falling back to the "anything else" key.
    pub fn key_for(&self, symbol: &str) -> TransitionKey {
        self.symbol_mapping
            .get(symbol)
            .copied()
            .unwrap_or(self.anything_value)
    }

    pub fn get(&self, symbol: &str) -> Option<TransitionKey> {
        self.symbol_mapping.get(symbol).copied()
    }

    pub fn symbol_mapping(&self) -> &FxHashMap<String, TransitionKey> {
        &self.symbol_mapping
    }

    /// Largest key in use, the "anything else" key included.
    pub fn max_key(&self) -> TransitionKey {
        self.symbol_mapping
            .values()
            .copied()
            .chain(std::iter::once(self.anything_value))
            .max()
            .unwrap_or(self.anything_value)
    }

    /// Explicit symbols in lexicographic order. Iteration over the alphabet
    /// always goes through this so that downstream numbering is reproducible.
    pub fn sorted_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.symbol_mapping.keys().map(|s| s.as_str()).collect();
        symbols.sort_unstable();
        symbols
    }

    /// Group explicit symbols by transition key, each group sorted. The
    /// "anything else" class is not included; it has no explicit symbols.
    pub fn by_transition(&self) -> FxHashMap<TransitionKey, Vec<&str>> {
        let mut grouped: FxHashMap<TransitionKey, Vec<&str>> = FxHashMap::default();
        for symbol in self.sorted_symbols() {
            grouped.entry(self.symbol_mapping[symbol]).or_default().push(symbol);
        }
        grouped
    }
}

/// A deterministic FSM over transition keys. The transition function is
/// partial: a missing `(state, key)` entry is a dead end.
///
/// This is the working representation every pipeline stage consumes and
/// produces; [`FsmInfo`] below is the flattened form handed to the index
/// builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fsm {
    pub alphabet: Alphabet,
    pub states: Vec<StateId>,
    pub initial: StateId,
    pub finals: FxHashSet<StateId>,
    pub map: FxHashMap<StateId, FxHashMap<TransitionKey, StateId>>,
}

impl Fsm {
    /// Follow one atom from `state`, or `None` on a dead end.
    pub fn advance(&self, state: StateId, atom: &str) -> Option<StateId> {
        let key = self.alphabet.key_for(atom);
        self.map.get(&state)?.get(&key).copied()
    }

    /// Deterministic acceptance of a sequence of atoms.
    pub fn accepts<'a, I>(&self, atoms: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.initial;
        for atom in atoms {
            match self.advance(state, atom) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.finals.contains(&state)
    }

    /// States in ascending order.
    pub fn sorted_states(&self) -> Vec<StateId> {
        let mut states = self.states.clone();
        states.sort_unstable();
        states
    }

    /// Flatten into the form the index builder walks.
    pub fn fsm_info(&self, pattern: &str) -> FsmInfo {
        let mut transitions = FxHashMap::default();
        for (&from_state, trans_map) in &self.map {
            for (&trans_key, &to_state) in trans_map {
                transitions.insert((from_state, trans_key), to_state);
            }
        }
        let mut finals: Vec<StateId> = self.finals.iter().copied().collect();
        finals.sort_unstable();

        FsmInfo {
            initial: self.initial,
            finals,
            transitions,
            alphabet_symbol_mapping: self.alphabet.symbol_mapping.clone(),
            alphabet_anything_value: self.alphabet.anything_value,
            states: self.sorted_states(),
            pattern: pattern.to_string(),
        }
    }
}

/// Flattened FSM handed to the index builder.
///
/// The flat `(from_state, trans_key) -> to_state` map avoids chasing nested
/// maps in the hot walk loop, and the symbol mapping is what translates
/// vocabulary strings into key sequences. `pattern` carries the regex source
/// for cache keying only; it is empty for caller-supplied FSMs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsmInfo {
    /// Entry state, 0 after canonicalization.
    pub initial: StateId,

    /// Accepting states, ascending.
    pub finals: Vec<StateId>,

    /// Flat transition table.
    pub transitions: FxHashMap<(StateId, TransitionKey), StateId>,

    /// Symbol atom -> transition key. The "anything else" class is carried
    /// separately in `alphabet_anything_value` and never appears here.
    pub alphabet_symbol_mapping: FxHashMap<String, TransitionKey>,

    /// Catch-all key used for every atom absent from the symbol mapping.
    pub alphabet_anything_value: TransitionKey,

    /// All states, ascending. Kept so consumers can size tables without
    /// re-counting a large transition map.
    pub states: Vec<StateId>,

    /// Source pattern, retained for cache key generation.
    pub pattern: String,
}

impl FsmInfo {
    pub fn is_final(&self, state: StateId) -> bool {
        self.finals.contains(&state)
    }
}
