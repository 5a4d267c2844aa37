//! Tier 1: cheap existence check
//!
//! A HEAD request under a short timeout. Servers that answer HEAD with an
//! unacceptable status (many IPTV origins reply 405 or 403) get one streaming
//! GET whose body is dropped after the headers arrive.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response};
use std::time::Duration;
use tracing::trace;

use crate::errors::{ProbeFailure, ProbeResult};
use crate::utils::status_code_matcher::is_status_acceptable;

use super::{is_hls_address, network_failure};

#[derive(Debug, Clone)]
pub struct HttpPrecheck {
    client: Client,
    acceptable_status_codes: Vec<String>,
}

impl HttpPrecheck {
    pub fn new(client: Client, acceptable_status_codes: Vec<String>) -> Self {
        Self {
            client,
            acceptable_status_codes,
        }
    }

    /// Check that the address answers with an acceptable, non-HTML response
    pub async fn check(&self, address: &str, timeout: Duration) -> ProbeResult<()> {
        let head = self.request(Method::HEAD, address, timeout).await?;
        let response = if is_status_acceptable(&head.status(), &self.acceptable_status_codes) {
            head
        } else {
            trace!("HEAD returned {} for {}, retrying with GET", head.status(), address);
            drop(head);
            self.request(Method::GET, address, timeout).await?
        };

        let status = response.status();
        if !is_status_acceptable(&status, &self.acceptable_status_codes) {
            return Err(ProbeFailure::Status(status.as_u16()));
        }

        if let Some(content_type) = content_type(&response)
            && content_type.starts_with("text/html")
            && !is_hls_address(address)
        {
            return Err(ProbeFailure::UnexpectedContentType(content_type));
        }

        Ok(())
    }

    async fn request(&self, method: Method, address: &str, timeout: Duration) -> ProbeResult<Response> {
        let send = self.client.request(method, address).send();
        match tokio::time::timeout(timeout, send).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(network_failure(e)),
            Err(_) => Err(ProbeFailure::Timeout(timeout)),
        }
    }
}

/// Lower-cased media type without parameters
pub(crate) fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::HttpClientBuilder;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn precheck() -> HttpPrecheck {
        let client = HttpClientBuilder::new("m3u-curator/test").build().unwrap();
        HttpPrecheck::new(client, vec!["2xx".to_string()])
    }

    #[tokio::test]
    async fn test_head_success() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/live.ts"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "video/mp2t"))
            .mount(&server)
            .await;

        let result = precheck()
            .check(&format!("{}/live.ts", server.uri()), Duration::from_secs(1))
            .await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_head_rejected_falls_back_to_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x47u8; 376]))
            .expect(1)
            .mount(&server)
            .await;

        let result = precheck()
            .check(&format!("{}/live.ts", server.uri()), Duration::from_secs(1))
            .await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_not_found() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = precheck()
            .check(&format!("{}/gone.ts", server.uri()), Duration::from_secs(1))
            .await;
        assert_eq!(result, Err(ProbeFailure::Status(404)));
    }

    #[tokio::test]
    async fn test_html_rejected_unless_hls() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html; charset=utf-8"))
            .mount(&server)
            .await;

        let check = precheck();
        let page = check
            .check(&format!("{}/index.php", server.uri()), Duration::from_secs(1))
            .await;
        assert_eq!(page, Err(ProbeFailure::UnexpectedContentType("text/html".into())));

        let manifest = check
            .check(&format!("{}/live/index.m3u8", server.uri()), Duration::from_secs(1))
            .await;
        assert_eq!(manifest, Ok(()));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let result = precheck()
            .check(&format!("{}/slow.ts", server.uri()), Duration::from_millis(200))
            .await;
        assert_eq!(result, Err(ProbeFailure::Timeout(Duration::from_millis(200))));
    }
}
