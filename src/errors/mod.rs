//! Centralized error handling for the curator
//!
//! Errors are split by the boundary they are allowed to cross:
//!
//! - **AppError**: fatal conditions that abort a run (configuration, output I/O)
//! - **SourceError**: a playlist source could not be fetched or expanded; recovered
//!   by the resolver and reported as a [`SourceIssue`](crate::models::SourceIssue)
//! - **ProbeFailure**: a single liveness probe failed; recovered as an invalid
//!   [`ValidationResult`](crate::models::ValidationResult)
//!
//! # Usage
//!
//! ```rust
//! use m3u_curator::errors::{AppError, AppResult};
//!
//! fn require_workers(workers: usize) -> AppResult<usize> {
//!     if workers == 0 {
//!         return Err(AppError::configuration("validation.workers must be at least 1"));
//!     }
//!     Ok(workers)
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for source fetch Results
pub type SourceResult<T> = Result<T, SourceError>;

/// Convenience type alias for probe Results
pub type ProbeResult<T> = Result<T, ProbeFailure>;
