//! Resolving host-stored files into message content.
//!
//! The host application owns file storage; adapters only see a [`FileUrlProvider`].
//! [`HttpFileUrlProvider`] is the default for hosts that serve files over HTTP.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::streaming::StreamFactory;
use crate::types::{FileRef, NeutralContent};
use crate::utils::mime::resolve_media_type;

#[async_trait]
pub trait FileUrlProvider: Send + Sync {
    /// Image content for `file`: a URL part, or the downloaded bytes when
    /// `force_download` is set or the provider cannot fetch URLs itself.
    async fn image_part(
        &self,
        file: &FileRef,
        force_download: bool,
    ) -> Result<NeutralContent, LlmError>;

    /// A text part carrying the file's URL, for models without vision.
    async fn text_url(&self, file: &FileRef) -> Result<NeutralContent, LlmError>;

    /// Fetch `url`. Returns the bytes and their media type.
    async fn download(&self, url: &str) -> Result<(Vec<u8>, String), LlmError>;
}

/// Files served at `{base_url}/{file.id}`.
#[derive(Debug, Clone)]
pub struct HttpFileUrlProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFileUrlProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, file: &FileRef) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(&file.id))
    }
}

#[async_trait]
impl FileUrlProvider for HttpFileUrlProvider {
    async fn image_part(
        &self,
        file: &FileRef,
        force_download: bool,
    ) -> Result<NeutralContent, LlmError> {
        let url = self.url_for(file);
        if !force_download {
            return Ok(NeutralContent::FileUrl { url });
        }
        let (bytes, sniffed) = self.download(&url).await?;
        Ok(NeutralContent::FileBlob {
            media_type: file.media_type.clone().unwrap_or(sniffed),
            bytes,
        })
    }

    async fn text_url(&self, file: &FileRef) -> Result<NeutralContent, LlmError> {
        Ok(NeutralContent::text(self.url_for(file)))
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, String), LlmError> {
        tracing::debug!(url, "downloading file");
        let response = StreamFactory::send("file", self.client.get(url)).await?;
        let header = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LlmError::StreamError(format!("Failed to read {url}: {e}")))?;
        let media_type = resolve_media_type(header.as_deref(), &bytes, url);
        Ok((bytes.to_vec(), media_type))
    }
}
