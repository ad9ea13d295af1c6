use url::Url;

use super::{ByteSource, OpenedSource};
use crate::error::{HlsError, HlsResult};

/// Reads `file://` playlists and segments from the local filesystem.
#[derive(Clone, Copy, Default)]
pub struct FileSource;

impl ByteSource for FileSource {
    async fn open(&self, url: &Url) -> HlsResult<OpenedSource> {
        let path = url
            .to_file_path()
            .map_err(|_| HlsError::UnsupportedScheme(url.scheme().to_string()))?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HlsError::NotFound(url.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let content_length = file.metadata().await.ok().map(|m| m.len());
        Ok(OpenedSource::new(Box::new(file), content_length))
    }
}
