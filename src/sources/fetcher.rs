//! Playlist document retrieval
//!
//! [`PlaylistFetcher`] is the seam between the resolver and the outside world.
//! [`DocumentFetcher`] reads remote documents over HTTP(S) and local ones from
//! disk, always under the configured timeout and size limit.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::config::defaults::DEFAULT_MAX_DOCUMENT_BYTES;
use crate::errors::{AppResult, SourceError, SourceResult};
use crate::utils::{CompressionFormat, DecompressionService, HttpClientBuilder, UrlUtils};

/// Retrieves the text of a playlist document
#[async_trait]
pub trait PlaylistFetcher: Send + Sync {
    async fn fetch(&self, address: &str) -> SourceResult<String>;
}

/// Fetches `http(s)://` addresses over the network and everything else from disk
pub struct DocumentFetcher {
    client: Client,
    timeout: Duration,
    max_bytes: usize,
}

impl DocumentFetcher {
    pub fn new(config: &ResolverConfig) -> AppResult<Self> {
        let client = HttpClientBuilder::new(config.user_agent.clone())
            .connect_timeout(config.fetch_timeout)
            .build()?;
        Ok(Self::with_client(client, config.fetch_timeout).max_document_bytes(config.max_document_bytes))
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            max_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }

    /// Reject documents larger than `max_bytes`, raw or decompressed
    pub fn max_document_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn too_large(&self, address: &str) -> SourceError {
        SourceError::Decode {
            address: address.to_string(),
            reason: format!("document larger than {} bytes", self.max_bytes),
        }
    }

    async fn fetch_remote(&self, address: &str) -> SourceResult<Bytes> {
        let request = async {
            let mut response = self
                .client
                .get(address)
                .send()
                .await
                .map_err(|e| network_error(address, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SourceError::HttpStatus {
                    address: address.to_string(),
                    status: status.as_u16(),
                });
            }
            if response.content_length().is_some_and(|len| len > self.max_bytes as u64) {
                return Err(self.too_large(address));
            }

            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await.map_err(|e| network_error(address, e))? {
                if body.len() + chunk.len() > self.max_bytes {
                    return Err(self.too_large(address));
                }
                body.extend_from_slice(&chunk);
            }
            Ok(Bytes::from(body))
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| SourceError::timeout(address, self.timeout))?
    }

    async fn fetch_local(&self, address: &str) -> SourceResult<Bytes> {
        let path = local_path(address)?;
        let read = async {
            let file = tokio::fs::File::open(&path).await?;
            let mut data = Vec::new();
            file.take(self.max_bytes as u64 + 1).read_to_end(&mut data).await?;
            Ok::<_, std::io::Error>(data)
        };

        match tokio::time::timeout(self.timeout, read).await {
            Ok(Ok(data)) if data.len() > self.max_bytes => Err(self.too_large(address)),
            Ok(Ok(data)) => Ok(Bytes::from(data)),
            Ok(Err(e)) => Err(SourceError::unavailable(address, e)),
            Err(_) => Err(SourceError::timeout(address, self.timeout)),
        }
    }
}

#[async_trait]
impl PlaylistFetcher for DocumentFetcher {
    async fn fetch(&self, address: &str) -> SourceResult<String> {
        debug!("Fetching playlist {}", UrlUtils::obfuscate_credentials(address));

        let raw = if UrlUtils::is_remote(address) {
            self.fetch_remote(address).await?
        } else {
            self.fetch_local(address).await?
        };

        decode_document(address, raw, self.max_bytes)
    }
}

/// Decompress if needed and decode leniently as UTF-8
pub fn decode_document(address: &str, raw: Bytes, max_bytes: usize) -> SourceResult<String> {
    let format = DecompressionService::detect_compression_format(&raw);
    let data = match format {
        CompressionFormat::Uncompressed => raw.to_vec(),
        _ => {
            debug!("Decompressing {:?} playlist {}", format, UrlUtils::obfuscate_credentials(address));
            DecompressionService::decompress(raw, max_bytes).map_err(|e| SourceError::Decode {
                address: address.to_string(),
                reason: e.to_string(),
            })?
        }
    };

    if data.contains(&0) {
        return Err(SourceError::Decode {
            address: address.to_string(),
            reason: "binary content".to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn local_path(address: &str) -> SourceResult<PathBuf> {
    match UrlUtils::parse_absolute(address) {
        Some(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| SourceError::unavailable(address, "invalid file URL")),
        Some(url) => Err(SourceError::unavailable(
            address,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        None => Ok(PathBuf::from(address)),
    }
}

fn network_error(address: &str, err: reqwest::Error) -> SourceError {
    // reqwest embeds the URL in its message
    SourceError::unavailable(address, UrlUtils::obfuscate_credentials(&err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(timeout: Duration) -> DocumentFetcher {
        let client = HttpClientBuilder::new("m3u-curator/test").build().unwrap();
        DocumentFetcher::with_client(client, timeout)
    }

    #[tokio::test]
    async fn test_fetch_remote_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list.m3u"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\nhttp://x/a.ts\n"))
            .mount(&server)
            .await;

        let body = fetcher(Duration::from_secs(2))
            .fetch(&format!("{}/list.m3u", server.uri()))
            .await
            .unwrap();
        assert!(body.starts_with("#EXTM3U"));
    }

    #[tokio::test]
    async fn test_fetch_remote_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher(Duration::from_secs(2))
            .fetch(&format!("{}/missing.m3u", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_remote_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("#EXTM3U\n")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = fetcher(Duration::from_millis(200))
            .fetch(&format!("{}/slow.m3u", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_fetch_local_file_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("local.m3u");
        std::fs::write(&file, "#EXTM3U\nhttp://x/b.ts\n").unwrap();

        let fetcher = fetcher(Duration::from_secs(1));
        let body = fetcher.fetch(&file.to_string_lossy()).await.unwrap();
        assert!(body.contains("http://x/b.ts"));

        let err = fetcher
            .fetch(&dir.path().join("absent.m3u").to_string_lossy())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn test_decode_rejects_binary() {
        let err = decode_document("x", Bytes::from_static(&[0x47, 0x00, 0x11, 0x10]), 1024).unwrap_err();
        assert!(matches!(err, SourceError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_oversized_documents_rejected() {
        let server = MockServer::start().await;
        let body = format!("#EXTM3U\n{}", "#EXTINF:-1,Filler\nhttp://x/f.ts\n".repeat(200));
        Mock::given(method("GET"))
            .and(path("/huge.m3u"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("huge.m3u");
        std::fs::write(&file, &body).unwrap();

        let fetcher = fetcher(Duration::from_secs(2)).max_document_bytes(1024);
        let remote = fetcher.fetch(&format!("{}/huge.m3u", server.uri())).await.unwrap_err();
        assert!(matches!(remote, SourceError::Decode { .. }));
        assert!(remote.reason().contains("larger than 1024 bytes"));

        let local = fetcher.fetch(&file.to_string_lossy()).await.unwrap_err();
        assert!(matches!(local, SourceError::Decode { .. }));

        let roomy = fetcher.max_document_bytes(body.len());
        assert!(roomy.fetch(&file.to_string_lossy()).await.is_ok());
    }
}
