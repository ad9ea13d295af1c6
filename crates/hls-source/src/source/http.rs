use futures::TryStreamExt;
use reqwest::header::ACCEPT;
use url::Url;

use super::{ByteSource, OpenedSource};
use crate::{
    error::{HlsError, HlsResult},
    util::http::HttpClient,
};

/// Streams playlists and segments over http(s).
#[derive(Clone, Default)]
pub struct HttpSource {
    client: HttpClient,
}

impl HttpSource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

impl ByteSource for HttpSource {
    async fn open(&self, url: &Url) -> HlsResult<OpenedSource> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "*/*")
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::warn!("Error body: {body}");
            }
            return Err(HlsError::Http(status));
        }

        let content_length = response.content_length();
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = tokio_util::io::StreamReader::new(stream);
        Ok(OpenedSource::new(Box::new(reader), content_length))
    }
}
