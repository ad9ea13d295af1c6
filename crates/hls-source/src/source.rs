pub mod file;
pub mod http;
pub mod memory;

use std::future::Future;

use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

use crate::error::{HlsError, HlsResult};

pub use file::FileSource;
pub use http::HttpSource;
pub use memory::MemorySource;

pub type SourceReader = Box<dyn AsyncRead + Unpin + Send + 'static>;

/// An opened byte stream. Dropping it closes the underlying connection.
pub struct OpenedSource {
    pub reader: SourceReader,
    /// Content length announced by the source, if any.
    pub content_length: Option<u64>,
}

impl OpenedSource {
    pub fn new(reader: SourceReader, content_length: Option<u64>) -> Self {
        Self {
            reader,
            content_length,
        }
    }

    pub async fn read_to_end(mut self) -> HlsResult<Vec<u8>> {
        let mut data = Vec::with_capacity(self.content_length.unwrap_or(0) as usize);
        self.reader.read_to_end(&mut data).await?;
        Ok(data)
    }
}

/// Where playlists and segments are read from.
///
/// Implementations do not retry: failures are reported to the caller of the
/// session operation that triggered the fetch.
pub trait ByteSource: Send + Sync + 'static {
    fn open(&self, url: &Url) -> impl Future<Output = HlsResult<OpenedSource>> + Send;

    /// Reads a whole text resource, used for playlists.
    fn fetch_text(&self, url: &Url) -> impl Future<Output = HlsResult<String>> + Send {
        async move {
            let data = self.open(url).await?.read_to_end().await?;
            String::from_utf8(data).map_err(|_| {
                HlsError::MalformedPlaylist(format!("playlist {url} is not valid utf-8"))
            })
        }
    }
}

impl<S> ByteSource for std::sync::Arc<S>
where
    S: ByteSource,
{
    fn open(&self, url: &Url) -> impl Future<Output = HlsResult<OpenedSource>> + Send {
        self.as_ref().open(url)
    }
}

/// Picks a source by url scheme: `http`/`https` go to the network, `file`
/// to the local filesystem.
#[derive(Clone, Default)]
pub struct DefaultSource {
    http: HttpSource,
    file: FileSource,
}

impl DefaultSource {
    pub fn new(http: HttpSource) -> Self {
        Self {
            http,
            file: FileSource,
        }
    }
}

impl ByteSource for DefaultSource {
    async fn open(&self, url: &Url) -> HlsResult<OpenedSource> {
        match url.scheme() {
            "http" | "https" => self.http.open(url).await,
            "file" => self.file.open(url).await,
            scheme => Err(HlsError::UnsupportedScheme(scheme.to_string())),
        }
    }
}
