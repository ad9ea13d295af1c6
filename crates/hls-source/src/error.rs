use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HlsError {
    #[error("Invalid m3u8 playlist: {0}")]
    MalformedPlaylist(String),

    #[error("Seeking to {0}s is not supported on a live playlist")]
    SeekUnsupported(f64),

    #[error("Seek position {0}s is outside of the playlist")]
    SeekOutOfRange(f64),

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode),

    #[error("Resource not found: {0}")]
    NotFound(url::Url),

    #[error("Unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Playlist loader exited before the playlist was ready")]
    LoaderGone,

    #[error("Session is closed")]
    Closed,

    #[error("Failed to load the playlist tree: {0}")]
    Init(Arc<HlsError>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

impl HlsError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPlaylist(reason.into())
    }

    /// Whether the error came from the byte source rather than from the
    /// playlist state machine.
    pub fn is_transport(&self) -> bool {
        if let Self::Init(inner) = self {
            return inner.is_transport();
        }
        matches!(
            self,
            Self::Http(_)
                | Self::NotFound(_)
                | Self::UnsupportedScheme(_)
                | Self::Io(_)
                | Self::Request(_)
        )
    }
}

pub type HlsResult<T> = Result<T, HlsError>;
