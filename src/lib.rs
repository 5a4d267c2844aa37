//! Aggregates IPTV playlist sources, validates stream liveness and writes a
//! curated, per-channel capped playlist plus a validation log.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod playlist;
pub mod selection;
pub mod sources;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use errors::{AppError, AppResult};
pub use pipeline::Pipeline;
