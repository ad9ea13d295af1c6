use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use url::Url;

use super::ResultCache;

#[derive(Default)]
pub struct MemoryResultCache {
    cache: Mutex<HashMap<Url, Bytes>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<Url, Bytes>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache().is_empty()
    }
}

impl ResultCache for MemoryResultCache {
    fn get(&self, url: &Url) -> Option<Bytes> {
        self.cache().get(url).cloned()
    }

    fn put(&self, url: Url, data: Bytes) {
        let mut cache = self.cache();
        if cache.contains_key(&url) {
            tracing::debug!("{url} already cached, ignoring.");
            return;
        }
        cache.insert(url, data);
    }
}
