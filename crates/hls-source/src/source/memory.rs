use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use url::Url;

use super::{ByteSource, OpenedSource};
use crate::error::{HlsError, HlsResult};

#[derive(Default)]
struct MemoryEntries {
    bodies: HashMap<Url, Bytes>,
    opened: HashMap<Url, usize>,
}

/// Serves pre-registered bodies keyed by url. Bodies may be replaced at any
/// time, which is how a live playlist moves forward.
#[derive(Clone, Default)]
pub struct MemorySource {
    entries: Arc<Mutex<MemoryEntries>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, MemoryEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, url: Url, body: impl Into<Bytes>) {
        self.entries().bodies.insert(url, body.into());
    }

    pub fn remove(&self, url: &Url) -> Option<Bytes> {
        self.entries().bodies.remove(url)
    }

    /// How many times `url` has been opened.
    pub fn open_count(&self, url: &Url) -> usize {
        self.entries().opened.get(url).copied().unwrap_or(0)
    }
}

impl ByteSource for MemorySource {
    async fn open(&self, url: &Url) -> HlsResult<OpenedSource> {
        let mut entries = self.entries();
        *entries.opened.entry(url.clone()).or_default() += 1;
        let body = entries
            .bodies
            .get(url)
            .cloned()
            .ok_or_else(|| HlsError::NotFound(url.clone()))?;
        let length = body.len() as u64;
        Ok(OpenedSource::new(Box::new(Cursor::new(body)), Some(length)))
    }
}
