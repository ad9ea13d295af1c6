pub mod memory;

use std::sync::Arc;

use bytes::Bytes;
use url::Url;

pub use memory::MemoryResultCache;

/// Fetch-once storage for small resources keyed by their resolved url.
///
/// The session only stores container headers here, so implementations can
/// stay simple and in-memory.
pub trait ResultCache: Send + Sync + 'static {
    fn get(&self, url: &Url) -> Option<Bytes>;

    fn put(&self, url: Url, data: Bytes);
}

impl<C> ResultCache for Arc<C>
where
    C: ResultCache,
{
    fn get(&self, url: &Url) -> Option<Bytes> {
        self.as_ref().get(url)
    }

    fn put(&self, url: Url, data: Bytes) {
        self.as_ref().put(url, data)
    }
}
