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
use crate::environment::{DISABLE_CACHE, INDEX_CACHE_SIZE};
use crate::index::Index;
use lru::LruCache;
use once_cell::sync::Lazy;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

pub(crate) struct ModuleState {
    pub index_cache: Mutex<LruCache<u64, Arc<Index>>>,
}

pub(crate) static MODULE_STATE: Lazy<ModuleState> = Lazy::new(|| ModuleState {
    index_cache: Mutex::new(LruCache::new(
        NonZeroUsize::new((*INDEX_CACHE_SIZE).max(1)).unwrap(),
    )),
});

pub(crate) fn get_cached_index(hash: u64) -> Option<Arc<Index>> {
    if *DISABLE_CACHE {
        return None;
    }

    let mut cache = MODULE_STATE.index_cache.lock().unwrap();
    let hit = cache.get(&hash).map(Arc::clone);
    if hit.is_some() {
        tracing::debug!(key = hash, "index cache hit");
    }
    hit
}

pub(crate) fn insert_index_to_cache(index: Arc<Index>, cache_key: u64) {
    if *DISABLE_CACHE {
        return;
    }

    let mut cache = MODULE_STATE.index_cache.lock().unwrap();
    cache.put(cache_key, index);
}
