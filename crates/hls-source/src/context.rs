use std::sync::Arc;

use crate::{cache::ResultCache, options::HlsOptions, source::ByteSource};

/// Everything a session needs from its embedder, passed explicitly instead
/// of living in process-wide state.
pub struct HlsContext<S> {
    pub source: S,
    pub cache: Option<Arc<dyn ResultCache>>,
    pub options: HlsOptions,
}

impl<S> HlsContext<S>
where
    S: ByteSource,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: None,
            options: HlsOptions::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_options(mut self, options: HlsOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn header_cache(&self) -> Option<&dyn ResultCache> {
        if self.options.cache_headers {
            self.cache.as_deref()
        } else {
            None
        }
    }
}
