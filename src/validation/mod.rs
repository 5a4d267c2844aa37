//! Stream liveness validation
//!
//! Every candidate goes through up to two tiers:
//!
//! - **Tier 1** ([`precheck`]): HEAD (or a short GET) under a short timeout,
//!   eliminating dead addresses quickly. HTTP(S) only.
//! - **Tier 2**: either [`sniff`] (ranged GET and format recognition) or
//!   [`ffprobe`] (external probe, also used for RTMP/RTSP/UDP addresses).
//!
//! [`validator`] runs the probes on a bounded worker pool and applies the
//! quota-aware second pass.

use async_trait::async_trait;
use tracing::info;

pub mod ffprobe;
pub mod precheck;
pub mod sniff;
pub mod validator;

use crate::config::{ProbeMethod, TimeoutProfile, ValidationConfig};
use crate::errors::{AppError, AppResult, ProbeFailure, ProbeResult};
use crate::utils::{HttpClientBuilder, UrlUtils};
use crate::utils::url::STREAM_SCHEMES;

pub use ffprobe::FfprobeProbe;
pub use precheck::HttpPrecheck;
pub use sniff::{HttpSniffer, MediaKind};
pub use validator::LivenessValidator;

/// Decides whether one address is live
///
/// Implementations report every failure as a [`ProbeFailure`]; they never panic
/// on bad input.
#[async_trait]
pub trait StreamProbe: Send + Sync {
    async fn probe(&self, address: &str, timeouts: TimeoutProfile) -> ProbeResult<()>;
}

/// Tier 2 implementation chosen for the run
#[derive(Debug, Clone)]
pub enum DeepCheck {
    Sniff(HttpSniffer),
    Ffprobe(FfprobeProbe),
}

/// Tier 1 followed by the configured Tier 2
#[derive(Debug, Clone)]
pub struct TieredProbe {
    precheck: HttpPrecheck,
    deep: DeepCheck,
}

impl TieredProbe {
    pub fn new(precheck: HttpPrecheck, deep: DeepCheck) -> Self {
        Self { precheck, deep }
    }

    /// Build the probe described by the configuration
    ///
    /// `auto` picks ffprobe when the executable answers `-version` and HTTP
    /// sniffing otherwise. An explicit `ffprobe` that cannot run is a
    /// configuration error.
    pub async fn from_config(config: &ValidationConfig) -> AppResult<Self> {
        let client = HttpClientBuilder::new(config.user_agent.clone())
            .accept_invalid_certs(true)
            .build()?;

        let method = match config.method {
            ProbeMethod::Http => ProbeMethod::Http,
            ProbeMethod::Ffprobe => {
                if !FfprobeProbe::is_available(&config.ffprobe_command).await {
                    return Err(AppError::configuration(format!(
                        "validation.method is ffprobe but '{}' cannot be executed",
                        config.ffprobe_command
                    )));
                }
                ProbeMethod::Ffprobe
            }
            ProbeMethod::Auto => {
                if FfprobeProbe::is_available(&config.ffprobe_command).await {
                    ProbeMethod::Ffprobe
                } else {
                    ProbeMethod::Http
                }
            }
        };
        info!("Tier 2 probing via {}", method);

        let deep = match method {
            ProbeMethod::Ffprobe => DeepCheck::Ffprobe(FfprobeProbe::new(
                config.ffprobe_command.clone(),
                config.user_agent.clone(),
            )),
            _ => DeepCheck::Sniff(HttpSniffer::new(
                client.clone(),
                config.acceptable_status_codes.clone(),
                config.sniff_bytes,
            )),
        };

        Ok(Self::new(
            HttpPrecheck::new(client, config.acceptable_status_codes.clone()),
            deep,
        ))
    }

    pub fn uses_ffprobe(&self) -> bool {
        matches!(self.deep, DeepCheck::Ffprobe(_))
    }
}

#[async_trait]
impl StreamProbe for TieredProbe {
    async fn probe(&self, address: &str, timeouts: TimeoutProfile) -> ProbeResult<()> {
        let parsed = UrlUtils::parse_absolute(address)
            .filter(|u| u.host_str().is_some_and(|h| !h.is_empty()))
            .ok_or_else(|| ProbeFailure::InvalidAddress(address.to_string()))?;
        let scheme = parsed.scheme();

        match scheme {
            "http" | "https" => self.precheck.check(address, timeouts.precheck).await?,
            other if STREAM_SCHEMES.contains(&other) && self.uses_ffprobe() => {}
            other => return Err(ProbeFailure::UnsupportedScheme(other.to_string())),
        }

        match &self.deep {
            DeepCheck::Sniff(sniffer) => sniffer.sniff(address, timeouts.probe).await.map(|_| ()),
            DeepCheck::Ffprobe(ffprobe) => ffprobe.probe(address, timeouts.probe).await.map(|_| ()),
        }
    }
}

pub(crate) fn is_hls_address(address: &str) -> bool {
    UrlUtils::has_extension(address, &["m3u8".to_string()])
}

pub(crate) fn network_failure(err: reqwest::Error) -> ProbeFailure {
    ProbeFailure::Network(UrlUtils::obfuscate_credentials(&err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_probe() -> TieredProbe {
        let client = HttpClientBuilder::new("m3u-curator/test").build().unwrap();
        let codes = vec!["2xx".to_string()];
        TieredProbe::new(
            HttpPrecheck::new(client.clone(), codes.clone()),
            DeepCheck::Sniff(HttpSniffer::new(client, codes, 512)),
        )
    }

    fn timeouts() -> TimeoutProfile {
        TimeoutProfile {
            precheck: Duration::from_secs(1),
            probe: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_invalid_and_unsupported_addresses() {
        let probe = http_probe();
        assert!(matches!(
            probe.probe("not an address", timeouts()).await,
            Err(ProbeFailure::InvalidAddress(_))
        ));
        assert_eq!(
            probe.probe("rtmp://live.example/app/key", timeouts()).await,
            Err(ProbeFailure::UnsupportedScheme("rtmp".into()))
        );
    }

    #[tokio::test]
    async fn test_both_tiers_pass_for_hls_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/vnd.apple.mpegurl"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nlow.m3u8\n"))
            .mount(&server)
            .await;

        let result = http_probe()
            .probe(&format!("{}/live/index.m3u8", server.uri()), timeouts())
            .await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_explicit_ffprobe_unavailable_is_configuration_error() {
        let config = ValidationConfig {
            method: ProbeMethod::Ffprobe,
            ffprobe_command: "definitely-not-an-ffprobe-binary".to_string(),
            ..Default::default()
        };
        let err = TieredProbe::from_config(&config).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_sniffing() {
        let config = ValidationConfig {
            method: ProbeMethod::Auto,
            ffprobe_command: "definitely-not-an-ffprobe-binary".to_string(),
            ..Default::default()
        };
        let probe = TieredProbe::from_config(&config).await.unwrap();
        assert!(!probe.uses_ffprobe());
    }
}
