//! M3U wire format: parsing source documents and rendering the curated output

pub mod parser;
pub mod writer;

pub use parser::{ParsedPlaylist, parse_playlist};
pub use writer::{render_entries, write_atomic};
