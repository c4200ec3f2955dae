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
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Cache key for one (pattern, tokenizer) pair. The tokenizer side is its
/// stable fingerprint, so the key survives process restarts as long as the
/// vocabulary does.
pub(crate) fn get_index_cache_key(pattern: &str, tokenizer_fingerprint: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    pattern.hash(&mut hasher);
    tokenizer_fingerprint.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_separates_patterns_and_tokenizers() {
        let a = get_index_cache_key("[0-9]+", 1);
        let b = get_index_cache_key("[0-9]*", 1);
        let c = get_index_cache_key("[0-9]+", 2);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, get_index_cache_key("[0-9]+", 1));
    }
}
