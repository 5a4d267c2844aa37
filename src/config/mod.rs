use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::{debug, info};

pub mod defaults;
pub mod duration_serde;

use crate::errors::{AppError, AppResult};
use crate::utils::status_code_matcher;
use defaults::*;

/// Complete run configuration
///
/// Built once at startup and handed by reference to each stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub keywords: KeywordConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsConfig {
    /// Source list (CSV with a `url` column, or a plain text list)
    #[serde(default = "default_sources_path")]
    pub sources: PathBuf,
    /// Channel keyword table
    #[serde(default = "default_keywords_path")]
    pub keywords: PathBuf,
    /// Local directories scanned recursively for playlist files
    #[serde(default)]
    pub playlist_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_playlist_path")]
    pub playlist: PathBuf,
    #[serde(default = "default_validation_log_path")]
    pub validation_log: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Timeout for fetching a single playlist document
    #[serde(default = "default_fetch_timeout", with = "duration_serde::duration")]
    pub fetch_timeout: Duration,
    /// Maximum nesting of sub-playlists below a source
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Largest playlist document accepted, before and after decompression
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    /// Number of sources fetched at once
    #[serde(default = "default_source_concurrency")]
    pub source_concurrency: usize,
    /// Address extensions treated as nested playlists rather than streams
    #[serde(default = "default_nested_extensions")]
    pub nested_extensions: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Variants beyond this count are ignored per channel
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Upper bound of candidates kept per channel before probing
    #[serde(default)]
    pub max_candidates_per_channel: Option<usize>,
}

/// Tier 2 strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProbeMethod {
    /// ffprobe when the executable is available, HTTP sniffing otherwise
    Auto,
    Http,
    Ffprobe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Width of the probe worker pool
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_precheck_timeout", with = "duration_serde::duration")]
    pub precheck_timeout: Duration,
    #[serde(default = "default_probe_timeout", with = "duration_serde::duration")]
    pub probe_timeout: Duration,
    /// Re-probe failed candidates of channels still under quota
    #[serde(default = "default_second_pass")]
    pub second_pass: bool,
    #[serde(
        default = "default_second_pass_precheck_timeout",
        with = "duration_serde::duration"
    )]
    pub second_pass_precheck_timeout: Duration,
    #[serde(
        default = "default_second_pass_probe_timeout",
        with = "duration_serde::duration"
    )]
    pub second_pass_probe_timeout: Duration,
    #[serde(default = "default_probe_method")]
    pub method: ProbeMethod,
    #[serde(default = "default_ffprobe_command")]
    pub ffprobe_command: String,
    /// Status patterns such as "2xx" or "206"
    #[serde(default = "default_acceptable_status_codes")]
    pub acceptable_status_codes: Vec<String>,
    /// Bytes read from the stream head when sniffing the container format
    #[serde(default = "default_sniff_bytes")]
    pub sniff_bytes: usize,
    /// Log progress every N completed probes
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Maximum validated addresses kept per channel
    #[serde(default = "default_max_per_channel")]
    pub max_per_channel: usize,
}

/// Timeouts applied to one validation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutProfile {
    pub precheck: Duration,
    pub probe: Duration,
}

fn default_sources_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOURCES_PATH)
}

fn default_keywords_path() -> PathBuf {
    PathBuf::from(DEFAULT_KEYWORDS_PATH)
}

fn default_playlist_path() -> PathBuf {
    PathBuf::from(DEFAULT_PLAYLIST_PATH)
}

fn default_validation_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_VALIDATION_LOG_PATH)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_document_bytes() -> usize {
    DEFAULT_MAX_DOCUMENT_BYTES
}

fn default_source_concurrency() -> usize {
    DEFAULT_SOURCE_CONCURRENCY
}

fn default_nested_extensions() -> Vec<String> {
    DEFAULT_NESTED_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn default_max_variants() -> usize {
    DEFAULT_MAX_KEYWORD_VARIANTS
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_precheck_timeout() -> Duration {
    Duration::from_millis(DEFAULT_PRECHECK_TIMEOUT_MS)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS)
}

fn default_second_pass() -> bool {
    DEFAULT_SECOND_PASS
}

fn default_second_pass_precheck_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SECOND_PASS_PRECHECK_TIMEOUT_SECS)
}

fn default_second_pass_probe_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SECOND_PASS_PROBE_TIMEOUT_SECS)
}

fn default_probe_method() -> ProbeMethod {
    ProbeMethod::Auto
}

fn default_ffprobe_command() -> String {
    DEFAULT_FFPROBE_COMMAND.to_string()
}

fn default_acceptable_status_codes() -> Vec<String> {
    DEFAULT_ACCEPTABLE_STATUS_CODES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sniff_bytes() -> usize {
    DEFAULT_SNIFF_BYTES
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

fn default_max_per_channel() -> usize {
    DEFAULT_MAX_PER_CHANNEL
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            sources: default_sources_path(),
            keywords: default_keywords_path(),
            playlist_dirs: Vec::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            playlist: default_playlist_path(),
            validation_log: default_validation_log_path(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: default_fetch_timeout(),
            max_depth: default_max_depth(),
            max_document_bytes: default_max_document_bytes(),
            source_concurrency: default_source_concurrency(),
            nested_extensions: default_nested_extensions(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            max_variants: default_max_variants(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            precheck_timeout: default_precheck_timeout(),
            probe_timeout: default_probe_timeout(),
            second_pass: default_second_pass(),
            second_pass_precheck_timeout: default_second_pass_precheck_timeout(),
            second_pass_probe_timeout: default_second_pass_probe_timeout(),
            method: default_probe_method(),
            ffprobe_command: default_ffprobe_command(),
            acceptable_status_codes: default_acceptable_status_codes(),
            sniff_bytes: default_sniff_bytes(),
            progress_interval: default_progress_interval(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_per_channel: default_max_per_channel(),
        }
    }
}

impl ValidationConfig {
    pub fn first_pass_timeouts(&self) -> TimeoutProfile {
        TimeoutProfile {
            precheck: self.precheck_timeout,
            probe: self.probe_timeout,
        }
    }

    pub fn second_pass_timeouts(&self) -> TimeoutProfile {
        TimeoutProfile {
            precheck: self.second_pass_precheck_timeout,
            probe: self.second_pass_probe_timeout,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the environment
    ///
    /// An explicitly requested file must exist; the default file name is optional.
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        let (path, required) = match config_file {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if required && !path.exists() {
            return Err(AppError::configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment
            .extract()
            .map_err(|e| AppError::configuration(format!("invalid configuration: {e}")))?;

        if path.exists() {
            info!("Configuration loaded from: {}", path.display());
        } else {
            debug!("No config file at {}, using defaults and environment", path.display());
        }

        Ok(config)
    }

    /// Reject settings that would make a run meaningless or unbounded
    pub fn validate(&self) -> AppResult<()> {
        if self.validation.workers == 0 {
            return Err(AppError::configuration("validation.workers must be at least 1"));
        }
        if self.resolver.source_concurrency == 0 {
            return Err(AppError::configuration(
                "resolver.source_concurrency must be at least 1",
            ));
        }
        if self.selection.max_per_channel == 0 {
            return Err(AppError::configuration(
                "selection.max_per_channel must be at least 1",
            ));
        }
        if self.keywords.max_variants == 0 {
            return Err(AppError::configuration("keywords.max_variants must be at least 1"));
        }
        if self.filter.max_candidates_per_channel == Some(0) {
            return Err(AppError::configuration(
                "filter.max_candidates_per_channel must be at least 1 when set",
            ));
        }
        if self.validation.sniff_bytes < 16 {
            return Err(AppError::configuration("validation.sniff_bytes must be at least 16"));
        }
        if self.validation.precheck_timeout.is_zero() || self.validation.probe_timeout.is_zero() {
            return Err(AppError::configuration("validation timeouts must be non-zero"));
        }
        if self.resolver.max_document_bytes == 0 {
            return Err(AppError::configuration(
                "resolver.max_document_bytes must be at least 1",
            ));
        }
        if self.resolver.fetch_timeout.is_zero() {
            return Err(AppError::configuration("resolver.fetch_timeout must be non-zero"));
        }
        if self.validation.second_pass {
            let first = self.validation.first_pass_timeouts();
            let second = self.validation.second_pass_timeouts();
            if second.precheck < first.precheck || second.probe < first.probe {
                return Err(AppError::configuration(format!(
                    "second pass timeouts ({:?}/{:?}) must not be shorter than first pass ({:?}/{:?})",
                    second.precheck, second.probe, first.precheck, first.probe
                )));
            }
        }
        if self.validation.acceptable_status_codes.is_empty() {
            return Err(AppError::configuration(
                "validation.acceptable_status_codes must not be empty",
            ));
        }
        for pattern in &self.validation.acceptable_status_codes {
            if !status_code_matcher::is_valid_pattern(pattern) {
                return Err(AppError::configuration(format!(
                    "invalid status code pattern '{pattern}'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.selection.max_per_channel, 3);
        assert_eq!(config.resolver.max_depth, 5);
        assert_eq!(config.resolver.nested_extensions, vec!["m3u".to_string()]);
        assert_eq!(config.resolver.max_document_bytes, 32 * 1024 * 1024);
        assert_eq!(config.validation.precheck_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.validation.workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_second_pass_must_escalate() {
        let mut config = Config::default();
        config.validation.second_pass_probe_timeout = Duration::from_secs(2);
        assert!(config.validate().is_err());

        config.validation.second_pass = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_status_pattern_rejected() {
        let mut config = Config::default();
        config.validation.acceptable_status_codes = vec!["2xx".into(), "abc".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curator.toml");
        std::fs::write(
            &path,
            r#"
[validation]
workers = 32
probe_timeout = "12s"
method = "http"

[selection]
max_per_channel = 5

[filter]
max_candidates_per_channel = 20
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.validation.workers, 32);
        assert_eq!(config.validation.probe_timeout, Duration::from_secs(12));
        assert_eq!(config.validation.method, ProbeMethod::Http);
        assert_eq!(config.selection.max_per_channel, 5);
        assert_eq!(config.filter.max_candidates_per_channel, Some(20));
        // untouched sections keep their defaults
        assert_eq!(config.resolver.max_depth, 5);
        assert_eq!(config.output.playlist, PathBuf::from(DEFAULT_PLAYLIST_PATH));
    }

    #[test]
    fn test_explicit_missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_probe_method_parsing() {
        assert_eq!(ProbeMethod::from_str("ffprobe").unwrap(), ProbeMethod::Ffprobe);
        assert_eq!(ProbeMethod::from_str("HTTP").unwrap(), ProbeMethod::Http);
        assert_eq!(ProbeMethod::Auto.to_string(), "auto");
        assert!(ProbeMethod::from_str("guess").is_err());
    }
}
