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
use std::collections::BTreeSet;

/// A set of characters, possibly complemented. The pair `(chars, negated)`
/// is closed under union, intersection and complement, which is what lets
/// bracket classes combine positive items with `\D`-style complements
/// without enumerating any alphabet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharSet {
    pub chars: BTreeSet<char>,
    pub negated: bool,
}

impl CharSet {
    pub fn empty() -> Self {
        CharSet {
            chars: BTreeSet::new(),
            negated: false,
        }
    }

    pub fn single(c: char) -> Self {
        CharSet {
            chars: BTreeSet::from([c]),
            negated: false,
        }
    }

    pub fn from_chars<I: IntoIterator<Item = char>>(chars: I) -> Self {
        CharSet {
            chars: chars.into_iter().collect(),
            negated: false,
        }
    }

    pub fn from_range(lo: char, hi: char) -> Self {
        CharSet {
            chars: (lo..=hi).collect(),
            negated: false,
        }
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c) != self.negated
    }

    pub fn complement(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn union(self, other: CharSet) -> Self {
        match (self.negated, other.negated) {
            (false, false) => CharSet {
                chars: self.chars.union(&other.chars).copied().collect(),
                negated: false,
            },
            (true, true) => CharSet {
                chars: self.chars.intersection(&other.chars).copied().collect(),
                negated: true,
            },
            // P | !Q == !(Q \ P)
            (false, true) => CharSet {
                chars: other.chars.difference(&self.chars).copied().collect(),
                negated: true,
            },
            (true, false) => CharSet {
                chars: self.chars.difference(&other.chars).copied().collect(),
                negated: true,
            },
        }
    }

    /// Characters explicitly named by the set, complemented or not. These
    /// are the characters that must receive their own alphabet treatment.
    pub fn mentioned(&self) -> impl Iterator<Item = char> + '_ {
        self.chars.iter().copied()
    }
}

/// ASCII interpretations of the perl classes. Unicode-aware tables live in
/// the embedding tokenizer, not in the guide.
pub fn digit_set() -> CharSet {
    CharSet::from_range('0', '9')
}

pub fn word_set() -> CharSet {
    let mut s = CharSet::from_range('a', 'z');
    s = s.union(CharSet::from_range('A', 'Z'));
    s = s.union(CharSet::from_range('0', '9'));
    s.union(CharSet::single('_'))
}

pub fn space_set() -> CharSet {
    CharSet::from_chars([' ', '\t', '\n', '\r', '\x0B', '\x0C'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_positive() {
        let s = CharSet::from_chars(['a', 'b']).union(CharSet::from_chars(['b', 'c']));
        assert!(s.contains('a') && s.contains('b') && s.contains('c'));
        assert!(!s.contains('d'));
    }

    #[test]
    fn test_union_mixed_polarity() {
        // [^\W\d] == \w minus \d == [A-Za-z_]
        let s = word_set()
            .complement()
            .union(digit_set())
            .complement();
        assert!(s.contains('a') && s.contains('Z') && s.contains('_'));
        assert!(!s.contains('7'));
        assert!(!s.contains(' '));
        assert!(!s.contains('é'));
    }

    #[test]
    fn test_negated_contains_unmentioned() {
        let s = CharSet::from_chars(['x']).complement();
        assert!(!s.contains('x'));
        assert!(s.contains('y'));
        assert!(s.contains('😀'));
    }

    #[test]
    fn test_union_two_complements() {
        // [^ab] | [^bc] == [^b]
        let s = CharSet::from_chars(['a', 'b'])
            .complement()
            .union(CharSet::from_chars(['b', 'c']).complement());
        assert!(!s.contains('b'));
        assert!(s.contains('a') && s.contains('c') && s.contains('z'));
    }
}
