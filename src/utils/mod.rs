//! Utility modules shared by the pipeline stages

pub mod decompression;
pub mod http_client;
pub mod human_format;
pub mod status_code_matcher;
pub mod url;

pub use decompression::{CompressionFormat, DecompressionService};
pub use http_client::HttpClientBuilder;
pub use self::url::UrlUtils;
