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

//! Pattern AST -> character-level DFA.
//!
//! The alphabet is built first: every character mentioned by the pattern is
//! partitioned into equivalence classes (two characters are equivalent when
//! every character group of the pattern treats them identically), and one
//! extra class stands for "anything else". The AST is then lowered to an
//! epsilon-NFA over class keys by the usual inductive construction, and the
//! NFA is determinized by subset construction.

use crate::error::Result;
use crate::fsm::{Alphabet, Fsm, StateId, TransitionKey};
use crate::regex::charset::CharSet;
use crate::regex::pattern::{parse_pattern, Ast};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Parse a regex and compile it into a character-level DFA.
pub fn parse_pattern_to_fsm(pattern: &str) -> Result<Fsm> {
    let ast = parse_pattern(pattern)?;
    Ok(compile_ast(&ast))
}

/// Compile an already-parsed AST.
pub fn compile_ast(ast: &Ast) -> Fsm {
    let (alphabet, classes) = build_alphabet(ast);

    let mut nfa = Nfa::default();
    let start = nfa.add_state();
    let accept = nfa.build(ast, &classes, alphabet.anything_value(), start);

    determinize_nfa(&nfa, start, accept, alphabet)
}

/// One equivalence class: a representative character and the class key.
/// Uniformity of classes means testing the representative against a
/// character set decides membership for the whole class.
type Class = (char, TransitionKey);

fn build_alphabet(ast: &Ast) -> (Alphabet, Vec<Class>) {
    let mut groups: Vec<CharSet> = Vec::new();
    collect_char_sets(ast, &mut groups);

    let mentioned: BTreeSet<char> = groups.iter().flat_map(|g| g.mentioned()).collect();

    // Partition by membership signature across every group.
    let mut by_signature: BTreeMap<Vec<bool>, BTreeSet<char>> = BTreeMap::new();
    for &c in &mentioned {
        let signature: Vec<bool> = groups.iter().map(|g| g.chars.contains(&c)).collect();
        by_signature.entry(signature).or_default().insert(c);
    }

    let mut class_sets: Vec<BTreeSet<char>> = by_signature.into_values().collect();
    class_sets.sort();

    let mut symbol_mapping = FxHashMap::default();
    let mut classes = Vec::with_capacity(class_sets.len());
    for (key, chars) in class_sets.iter().enumerate() {
        let key = key as TransitionKey;
        for &c in chars {
            symbol_mapping.insert(c.to_string(), key);
        }
        classes.push((*chars.iter().next().expect("classes are non-empty"), key));
    }
    let anything_value = class_sets.len() as TransitionKey;

    (Alphabet::new(symbol_mapping, anything_value), classes)
}

fn collect_char_sets(ast: &Ast, out: &mut Vec<CharSet>) {
    match ast {
        Ast::Literal(c) => out.push(CharSet::single(*c)),
        Ast::CharGroup(set) => out.push(set.clone()),
        Ast::Repeated { element, .. } => collect_char_sets(element, out),
        Ast::Concat(items) | Ast::Alternation(items) => {
            for item in items {
                collect_char_sets(item, out);
            }
        }
        Ast::Capture(inner) | Ast::Group(inner) => collect_char_sets(inner, out),
        Ast::Flagged { element, .. } => collect_char_sets(element, out),
        Ast::Anchor(_) => {}
    }
}

#[derive(Default)]
struct Nfa {
    eps: Vec<Vec<usize>>,
    edges: Vec<Vec<(TransitionKey, usize)>>,
}

impl Nfa {
    fn add_state(&mut self) -> usize {
        self.eps.push(Vec::new());
        self.edges.push(Vec::new());
        self.eps.len() - 1
    }

    fn add_eps(&mut self, from: usize, to: usize) {
        self.eps[from].push(to);
    }

    fn add_edge(&mut self, from: usize, key: TransitionKey, to: usize) {
        self.edges[from].push((key, to));
    }

    /// Thompson construction: lower `ast` starting at `start`, returning the
    /// fragment's accepting state. Bounded repetitions are unrolled, so the
    /// AST is revisited once per copy.
    fn build(
        &mut self,
        ast: &Ast,
        classes: &[Class],
        anything_value: TransitionKey,
        start: usize,
    ) -> usize {
        match ast {
            Ast::Literal(c) => {
                let set = CharSet::single(*c);
                self.char_set_edges(&set, classes, anything_value, start)
            }
            Ast::CharGroup(set) => self.char_set_edges(set, classes, anything_value, start),
            Ast::Concat(items) => {
                let mut cur = start;
                for item in items {
                    cur = self.build(item, classes, anything_value, cur);
                }
                cur
            }
            Ast::Alternation(options) => {
                let end = self.add_state();
                for option in options {
                    let branch = self.add_state();
                    self.add_eps(start, branch);
                    let branch_end = self.build(option, classes, anything_value, branch);
                    self.add_eps(branch_end, end);
                }
                end
            }
            Ast::Repeated { element, min, max } => {
                let mut cur = start;
                for _ in 0..*min {
                    cur = self.build(element, classes, anything_value, cur);
                }
                match max {
                    None => {
                        let hub = self.add_state();
                        self.add_eps(cur, hub);
                        let body_end = self.build(element, classes, anything_value, hub);
                        self.add_eps(body_end, hub);
                        hub
                    }
                    Some(max) => {
                        let end = self.add_state();
                        self.add_eps(cur, end);
                        for _ in *min..*max {
                            cur = self.build(element, classes, anything_value, cur);
                            self.add_eps(cur, end);
                        }
                        end
                    }
                }
            }
            Ast::Capture(inner) | Ast::Group(inner) => {
                self.build(inner, classes, anything_value, start)
            }
            Ast::Flagged { element, .. } => self.build(element, classes, anything_value, start),
            // Anchors carry no language content here.
            Ast::Anchor(_) => start,
        }
    }

    fn char_set_edges(
        &mut self,
        set: &CharSet,
        classes: &[Class],
        anything_value: TransitionKey,
        start: usize,
    ) -> usize {
        let end = self.add_state();
        for &(representative, key) in classes {
            if set.contains(representative) {
                self.add_edge(start, key, end);
            }
        }
        if set.negated {
            self.add_edge(start, anything_value, end);
        }
        end
    }
}

fn eps_closure(nfa: &Nfa, seed: &BTreeSet<usize>) -> BTreeSet<usize> {
    let mut closure = seed.clone();
    let mut stack: Vec<usize> = seed.iter().copied().collect();
    while let Some(state) = stack.pop() {
        for &next in &nfa.eps[state] {
            if closure.insert(next) {
                stack.push(next);
            }
        }
    }
    closure
}

/// Subset construction. DFA state ids are assigned in BFS discovery order
/// with transition keys visited ascending, so the result is a function of
/// the NFA alone.
fn determinize_nfa(nfa: &Nfa, start: usize, accept: usize, alphabet: Alphabet) -> Fsm {
    let start_set = eps_closure(nfa, &BTreeSet::from([start]));

    let mut ids: FxHashMap<BTreeSet<usize>, StateId> = FxHashMap::default();
    ids.insert(start_set.clone(), 0);
    let mut queue = VecDeque::from([start_set]);

    let mut map: FxHashMap<StateId, FxHashMap<TransitionKey, StateId>> = FxHashMap::default();
    let mut finals: FxHashSet<StateId> = FxHashSet::default();

    while let Some(subset) = queue.pop_front() {
        let id = ids[&subset];
        if subset.contains(&accept) {
            finals.insert(id);
        }

        let mut moves: BTreeMap<TransitionKey, BTreeSet<usize>> = BTreeMap::new();
        for &nfa_state in &subset {
            for &(key, target) in &nfa.edges[nfa_state] {
                moves.entry(key).or_default().insert(target);
            }
        }

        let mut transitions = FxHashMap::default();
        for (key, targets) in moves {
            let closure = eps_closure(nfa, &targets);
            let next_id = match ids.get(&closure) {
                Some(&existing) => existing,
                None => {
                    let fresh = ids.len() as StateId;
                    ids.insert(closure.clone(), fresh);
                    queue.push_back(closure);
                    fresh
                }
            };
            transitions.insert(key, next_id);
        }
        map.insert(id, transitions);
    }

    let states: Vec<StateId> = (0..ids.len() as StateId).collect();
    Fsm {
        alphabet,
        states,
        initial: 0,
        finals,
        map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(fsm: &Fsm, input: &str) -> bool {
        let atoms: Vec<String> = input.chars().map(|c| c.to_string()).collect();
        fsm.accepts(atoms.iter().map(|s| s.as_str()))
    }

    #[test]
    fn test_literal_concat() {
        let fsm = parse_pattern_to_fsm("davidholtz").unwrap();
        assert!(accepts(&fsm, "davidholtz"));
        assert!(!accepts(&fsm, "davidholt"));
        assert!(!accepts(&fsm, "davidholtzz"));
    }

    #[test]
    fn test_alternation_and_groups() {
        let fsm = parse_pattern_to_fsm("foo(bar|baz)*qux").unwrap();
        assert!(accepts(&fsm, "fooqux"));
        assert!(accepts(&fsm, "foobarqux"));
        assert!(accepts(&fsm, "foobarbazqux"));
        assert!(!accepts(&fsm, "foobaqux"));
    }

    #[test]
    fn test_quantifiers() {
        let fsm = parse_pattern_to_fsm("a*b+c?").unwrap();
        assert!(accepts(&fsm, "b"));
        assert!(accepts(&fsm, "aabbc"));
        assert!(accepts(&fsm, "bc"));
        assert!(!accepts(&fsm, "a"));
        assert!(!accepts(&fsm, "acc"));
        assert!(!accepts(&fsm, "abcc"));
    }

    #[test]
    fn test_bounded_repetition() {
        let fsm = parse_pattern_to_fsm("(a|b|c){1,3}").unwrap();
        assert!(accepts(&fsm, "a"));
        assert!(accepts(&fsm, "abc"));
        assert!(accepts(&fsm, "cab"));
        assert!(!accepts(&fsm, ""));
        assert!(!accepts(&fsm, "abca"));
    }

    #[test]
    fn test_negated_class_matches_unmentioned() {
        let fsm = parse_pattern_to_fsm("[^aeiou]{2,4}").unwrap();
        assert!(accepts(&fsm, "xy"));
        assert!(accepts(&fsm, "wxyz"));
        assert!(accepts(&fsm, "😀😀"));
        assert!(!accepts(&fsm, "ae"));
        assert!(!accepts(&fsm, "x"));
        assert!(!accepts(&fsm, "vwxyz"));
    }

    #[test]
    fn test_dot_excludes_newline() {
        let fsm = parse_pattern_to_fsm("a.c").unwrap();
        assert!(accepts(&fsm, "abc"));
        assert!(accepts(&fsm, "a😀c"));
        assert!(!accepts(&fsm, "a\nc"));
    }

    #[test]
    fn test_anchors_are_ignored() {
        let fsm = parse_pattern_to_fsm("^ab$").unwrap();
        assert!(accepts(&fsm, "ab"));
        assert!(!accepts(&fsm, "abc"));
    }

    #[test]
    fn test_digit_pattern() {
        let fsm = parse_pattern_to_fsm("0|[1-9][0-9]*").unwrap();
        assert!(accepts(&fsm, "0"));
        assert!(accepts(&fsm, "7"));
        assert!(accepts(&fsm, "10"));
        assert!(accepts(&fsm, "907"));
        assert!(!accepts(&fsm, "07"));
        assert!(!accepts(&fsm, ""));
    }

    #[test]
    fn test_empty_pattern_matches_empty_string() {
        let fsm = parse_pattern_to_fsm("").unwrap();
        assert!(accepts(&fsm, ""));
        assert!(!accepts(&fsm, "a"));
    }

    #[test]
    fn test_equivalence_classes_are_shared() {
        // `a` and `b` are interchangeable everywhere in this pattern, so they
        // must share a transition key; `z` must not.
        let fsm = parse_pattern_to_fsm("z[ab]z").unwrap();
        let a_key = fsm.alphabet.key_for("a");
        assert_eq!(a_key, fsm.alphabet.key_for("b"));
        assert_ne!(a_key, fsm.alphabet.key_for("z"));
        assert!(accepts(&fsm, "zaz"));
        assert!(accepts(&fsm, "zbz"));
        assert!(!accepts(&fsm, "zzz"));
    }
}
