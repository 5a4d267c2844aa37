//! Shared reqwest client construction
//!
//! One client is built per stage and cloned into tasks; reqwest clients are
//! reference counted and pool connections internally.

use reqwest::Client;
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::debug;

use crate::errors::AppResult;

/// Redirect hops followed before a request is treated as failed
pub const MAX_REDIRECTS: usize = 10;

/// Builder for the HTTP clients used by the fetcher and the probes
#[derive(Debug, Clone)]
pub struct HttpClientBuilder {
    user_agent: String,
    connect_timeout: Option<Duration>,
    accept_invalid_certs: bool,
}

impl HttpClientBuilder {
    pub fn new<S: Into<String>>(user_agent: S) -> Self {
        Self {
            user_agent: user_agent.into(),
            connect_timeout: None,
            accept_invalid_certs: false,
        }
    }

    /// Bound the TCP/TLS handshake separately from per-request timeouts
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// IPTV origins frequently serve self-signed certificates; probes only
    /// check reachability so they may opt out of verification
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> AppResult<Client> {
        debug!(
            "Building HTTP client (user agent: {}, connect timeout: {:?})",
            self.user_agent, self.connect_timeout
        );

        let mut builder = Client::builder()
            .user_agent(self.user_agent)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .danger_accept_invalid_certs(self.accept_invalid_certs);

        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(builder.build()?)
    }
}
