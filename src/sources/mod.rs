//! Source handling: loading inputs, fetching and resolving playlists,
//! and matching their entries to channels

pub mod fetcher;
pub mod loader;
pub mod matcher;
pub mod resolver;

pub use fetcher::{DocumentFetcher, PlaylistFetcher};
pub use matcher::{CandidateFilter, FilterStats};
pub use resolver::{PlaylistResolver, Resolution, SourceResolution};
