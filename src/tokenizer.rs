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
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A raw vocabulary entry. Most tokenizers store text; some (Qwen-style
/// BPE) store the token's bytes directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Token {
    Text(String),
    Bytes(Vec<u8>),
}

impl Token {
    pub fn text(&self) -> Option<&str> {
        match self {
            Token::Text(s) => Some(s),
            Token::Bytes(_) => None,
        }
    }
}

/// The capability surface a model tokenizer must expose to the guide.
///
/// This replaces dynamic dispatch on "model type" in the surrounding glue:
/// anything that can enumerate its vocabulary, name its special tokens and
/// decode a token to a string can drive index construction.
pub trait Tokenizer {
    /// Raw vocabulary, token -> id.
    fn vocabulary(&self) -> &FxHashMap<Token, u32>;

    /// Tokens excluded from the index (padding, BOS/EOS markers, ...).
    fn special_tokens(&self) -> &FxHashSet<String>;

    /// End-of-sequence token id.
    fn eos_token_id(&self) -> u32;

    /// Decoded surface form of one token.
    fn token_to_string(&self, token: &Token) -> String;

    /// Stable fingerprint for memoization: the hash of the sorted
    /// vocabulary, the special-token set and the end-of-sequence id.
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        let mut entries: Vec<(&Token, &u32)> = self.vocabulary().iter().collect();
        entries.sort_unstable();
        for (token, id) in entries {
            token.hash(&mut hasher);
            id.hash(&mut hasher);
        }

        let mut special: Vec<&String> = self.special_tokens().iter().collect();
        special.sort_unstable();
        for token in special {
            token.hash(&mut hasher);
        }

        self.eos_token_id().hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Minimal in-memory tokenizer: decoding is the identity on text tokens
    /// unless an override is registered.
    pub struct MockTokenizer {
        vocabulary: FxHashMap<Token, u32>,
        special_tokens: FxHashSet<String>,
        eos_token_id: u32,
        decode_overrides: FxHashMap<Token, String>,
    }

    impl MockTokenizer {
        pub fn new(entries: &[(&str, u32)], special: &[&str], eos_token_id: u32) -> Self {
            MockTokenizer {
                vocabulary: entries
                    .iter()
                    .map(|(t, id)| (Token::Text(t.to_string()), *id))
                    .collect(),
                special_tokens: special.iter().map(|s| s.to_string()).collect(),
                eos_token_id,
                decode_overrides: FxHashMap::default(),
            }
        }

        pub fn with_byte_token(mut self, bytes: &[u8], id: u32) -> Self {
            self.vocabulary.insert(Token::Bytes(bytes.to_vec()), id);
            self
        }

        pub fn with_decode_override(mut self, token: Token, decoded: &str) -> Self {
            self.decode_overrides.insert(token, decoded.to_string());
            self
        }
    }

    impl Tokenizer for MockTokenizer {
        fn vocabulary(&self) -> &FxHashMap<Token, u32> {
            &self.vocabulary
        }

        fn special_tokens(&self) -> &FxHashSet<String> {
            &self.special_tokens
        }

        fn eos_token_id(&self) -> u32 {
            self.eos_token_id
        }

        fn token_to_string(&self, token: &Token) -> String {
            if let Some(decoded) = self.decode_overrides.get(token) {
                return decoded.clone();
            }
            match token {
                Token::Text(s) => s.clone(),
                Token::Bytes(_) => "\u{FFFD}".to_string(),
            }
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = MockTokenizer::new(&[("a", 1), ("b", 2)], &["<eos>"], 0);
        let b = MockTokenizer::new(&[("b", 2), ("a", 1)], &["<eos>"], 0);
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = MockTokenizer::new(&[("a", 1), ("b", 3)], &["<eos>"], 0);
        assert_ne!(a.fingerprint(), c.fingerprint());

        let d = MockTokenizer::new(&[("a", 1), ("b", 2)], &["<eos>"], 9);
        assert_ne!(a.fingerprint(), d.fingerprint());
    }
}
