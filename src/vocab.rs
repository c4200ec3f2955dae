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

//! Vocabulary normalization: tokenizer vocabulary -> decoded byte-strings.
//!
//! Every surviving vocabulary entry is a string of alphabet atoms (ASCII
//! bytes verbatim, other bytes as NUL + hex escapes), so index construction
//! can translate tokens to transition-key sequences without touching the
//! tokenizer again.

use crate::error::{Error, Result};
use crate::fsm::bytes_to_symbols;
use crate::tokenizer::{Token, Tokenizer};
use ::regex::Regex;
use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Llama-style byte-fallback tokens: one token per byte >= 0x80, spelled
/// `<0xXX>`.
static RE_BYTE_FALLBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<0x[0-9A-F]{2}>$").expect("literal pattern"));

/// Tokens that legitimately spell the replacement character. The `▁*`
/// prefix shows up in Gemma/GPT-SW3 vocabularies, the `\.*` suffix in
/// NorwAI's.
static RE_REPLACEMENT_SEQ: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^▁*�+\.*$").expect("literal pattern"));

/// The reversible byte <-> unicode table BPE vocabularies are stored in:
/// printable bytes map to themselves, everything else to points above
/// 0x100, avoiding whitespace and control characters.
static GPT2_BYTES_TO_UNICODE: Lazy<FxHashMap<u8, char>> = Lazy::new(|| {
    let mut bytes: Vec<u32> = (0x21..=0x7E).chain(0xA1..=0xAC).chain(0xAE..=0xFF).collect();
    let mut chars: Vec<u32> = bytes.clone();
    let mut n = 0;
    for b in 0..=0xFF {
        if !bytes.contains(&b) {
            bytes.push(b);
            chars.push(0x100 + n);
            n += 1;
        }
    }
    bytes
        .into_iter()
        .zip(chars)
        .map(|(b, c)| (b as u8, char::from_u32(c).expect("in-range code point")))
        .collect()
});

static GPT2_UNICODE_TO_BYTES: Lazy<FxHashMap<char, u8>> = Lazy::new(|| {
    GPT2_BYTES_TO_UNICODE.iter().map(|(&b, &c)| (c, b)).collect()
});

/// Normalized vocabulary: decoded byte-string -> token ids, sorted by
/// string with ascending id lists, so every later iteration over it is
/// reproducible. Token ids are unique across the whole mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenVocabulary {
    tokens: Vec<(String, Vec<u32>)>,
}

impl TokenVocabulary {
    /// Build from an explicit decoded-string -> ids map.
    pub fn from_map(map: FxHashMap<String, Vec<u32>>) -> Result<Self> {
        let mut seen_ids: FxHashSet<u32> = FxHashSet::default();
        for (token_str, ids) in &map {
            if token_str.is_empty() {
                return Err(Error::BadToken {
                    token: String::new(),
                    id: ids.first().copied().unwrap_or(0),
                });
            }
            for &id in ids {
                if !seen_ids.insert(id) {
                    return Err(Error::DuplicateTokenId(id));
                }
            }
        }

        let mut tokens: Vec<(String, Vec<u32>)> = map.into_iter().collect();
        for (_, ids) in &mut tokens {
            ids.sort_unstable();
        }
        tokens.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        Ok(TokenVocabulary { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Vec<u32>)> {
        self.tokens.iter()
    }

    pub fn get(&self, token_str: &str) -> Option<&[u32]> {
        self.tokens
            .binary_search_by(|(s, _)| s.as_str().cmp(token_str))
            .ok()
            .map(|i| self.tokens[i].1.as_slice())
    }
}

impl<'a> IntoIterator for &'a TokenVocabulary {
    type Item = &'a (String, Vec<u32>);
    type IntoIter = std::slice::Iter<'a, (String, Vec<u32>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

/// Map a tokenizer's vocabulary to decoded byte-strings, grouping token ids
/// whose strings collide. Also returns the ids whose decoded string is
/// empty; those cannot advance any FSM and are kept aside for downstream
/// use.
pub fn reduced_vocabulary(
    tokenizer: &impl Tokenizer,
) -> Result<(TokenVocabulary, FxHashSet<u32>)> {
    let mut empty_token_ids: FxHashSet<u32> = FxHashSet::default();
    let mut vocabulary: FxHashMap<String, Vec<u32>> = FxHashMap::default();
    let mut seen_ids: FxHashSet<u32> = FxHashSet::default();

    // Ids are unique, so scanning in id order fixes the processing order
    // regardless of the vocabulary map's iteration order.
    let mut entries: Vec<(&Token, u32)> = tokenizer
        .vocabulary()
        .iter()
        .map(|(token, &id)| (token, id))
        .collect();
    entries.sort_unstable_by_key(|&(_, id)| id);

    for (token, token_id) in entries {
        if !seen_ids.insert(token_id) {
            return Err(Error::DuplicateTokenId(token_id));
        }
        if let Some(text) = token.text() {
            if tokenizer.special_tokens().contains(text) {
                continue;
            }
        }

        let token_str = tokenizer.token_to_string(token);
        if token_str.is_empty() {
            empty_token_ids.insert(token_id);
            continue;
        }

        let decoded = match token {
            // Byte-stored tokens need no unicode round trip.
            Token::Bytes(bytes) => bytes_to_symbols(bytes),
            Token::Text(text) => {
                if token_str.contains('\u{FFFD}') && !RE_REPLACEMENT_SEQ.is_match(text) {
                    // The decoder replaced an invalid UTF-8 sequence; recover
                    // the real bytes from the raw token.
                    let token_bytes = recover_token_bytes(text, token_id)?;
                    bytes_to_symbols(&token_bytes)
                } else {
                    token_str
                }
            }
        };

        vocabulary.entry(decoded).or_default().push(token_id);
    }

    let token_vocabulary = TokenVocabulary::from_map(vocabulary)?;
    Ok((token_vocabulary, empty_token_ids))
}

fn recover_token_bytes(token: &str, token_id: u32) -> Result<Vec<u8>> {
    if RE_BYTE_FALLBACK.is_match(token) {
        let byte = u8::from_str_radix(&token[3..5], 16).map_err(|_| Error::BadToken {
            token: token.to_string(),
            id: token_id,
        })?;
        return Ok(vec![byte]);
    }

    token
        .chars()
        .map(|c| {
            GPT2_UNICODE_TO_BYTES
                .get(&c)
                .copied()
                .ok_or_else(|| Error::BadToken {
                    token: token.to_string(),
                    id: token_id,
                })
        })
        .collect()
}
