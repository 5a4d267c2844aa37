/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Input defaults
pub const DEFAULT_SOURCES_PATH: &str = "data/sources.csv";
pub const DEFAULT_KEYWORDS_PATH: &str = "data/channels_keywords.csv";

// Output defaults
pub const DEFAULT_PLAYLIST_PATH: &str = "playlist/playlist_filtered.m3u";
pub const DEFAULT_VALIDATION_LOG_PATH: &str = "playlist/validation_log.txt";

// Resolver defaults
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_DEPTH: usize = 5;
pub const DEFAULT_SOURCE_CONCURRENCY: usize = 4;
pub const DEFAULT_NESTED_EXTENSIONS: &[&str] = &["m3u"];
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 32 * 1024 * 1024;

// Keyword defaults
pub const DEFAULT_MAX_KEYWORD_VARIANTS: usize = 5;

// Validation defaults
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_PRECHECK_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_SECOND_PASS: bool = true;
pub const DEFAULT_SECOND_PASS_PRECHECK_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_SECOND_PASS_PROBE_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_FFPROBE_COMMAND: &str = "ffprobe";
pub const DEFAULT_ACCEPTABLE_STATUS_CODES: &[&str] = &["2xx"];
pub const DEFAULT_SNIFF_BYTES: usize = 4096;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 50;

// Selection defaults
pub const DEFAULT_MAX_PER_CHANNEL: usize = 3;

// Environment
pub const ENV_PREFIX: &str = "M3U_CURATOR_";
pub const DEFAULT_CONFIG_FILE: &str = "m3u-curator.toml";
