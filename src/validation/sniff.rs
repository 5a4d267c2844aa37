//! Tier 2 over HTTP: fetch the head of the stream and recognise its format
//!
//! A candidate passes when the first bytes are a known media container or an
//! HLS/DASH manifest, or when the server answers with a media content type and
//! a non-empty body.

use reqwest::Client;
use reqwest::header::RANGE;
use std::fmt;
use std::time::Duration;
use tracing::trace;

use crate::errors::{ProbeFailure, ProbeResult};
use crate::utils::status_code_matcher::is_status_acceptable;

use super::network_failure;
use super::precheck::content_type;

const TS_SYNC_BYTE: u8 = 0x47;
const TS_PACKET_LEN: usize = 188;
const TS_MIN_SYNC_PACKETS: usize = 2;

/// What the head of a stream turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    HlsManifest,
    DashManifest,
    MpegTs,
    /// A container recognised by its magic bytes, by MIME type
    Container(&'static str),
    /// Unrecognised bytes served with a media content type
    Declared(String),
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::HlsManifest => write!(f, "hls"),
            MediaKind::DashManifest => write!(f, "dash"),
            MediaKind::MpegTs => write!(f, "mpegts"),
            MediaKind::Container(mime) => write!(f, "{mime}"),
            MediaKind::Declared(mime) => write!(f, "declared {mime}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSniffer {
    client: Client,
    acceptable_status_codes: Vec<String>,
    sniff_bytes: usize,
}

impl HttpSniffer {
    pub fn new(client: Client, acceptable_status_codes: Vec<String>, sniff_bytes: usize) -> Self {
        Self {
            client,
            acceptable_status_codes,
            sniff_bytes,
        }
    }

    pub async fn sniff(&self, address: &str, timeout: Duration) -> ProbeResult<MediaKind> {
        match tokio::time::timeout(timeout, self.sniff_inner(address)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::Timeout(timeout)),
        }
    }

    async fn sniff_inner(&self, address: &str) -> ProbeResult<MediaKind> {
        let mut response = self
            .client
            .get(address)
            .header(RANGE, format!("bytes=0-{}", self.sniff_bytes.saturating_sub(1)))
            .send()
            .await
            .map_err(network_failure)?;

        let status = response.status();
        if !is_status_acceptable(&status, &self.acceptable_status_codes) {
            return Err(ProbeFailure::Status(status.as_u16()));
        }
        let declared = content_type(&response);

        let mut head: Vec<u8> = Vec::with_capacity(self.sniff_bytes);
        while head.len() < self.sniff_bytes {
            match response.chunk().await.map_err(network_failure)? {
                Some(chunk) => head.extend_from_slice(&chunk),
                None => break,
            }
        }
        head.truncate(self.sniff_bytes);
        trace!("Read {} bytes from {} ({:?})", head.len(), address, declared);

        if head.is_empty() {
            return Err(ProbeFailure::EmptyBody);
        }

        if let Some(kind) = detect_media(&head) {
            return Ok(kind);
        }

        match declared {
            Some(mime) if is_media_content_type(&mime) => Ok(MediaKind::Declared(mime)),
            Some(mime) if mime.starts_with("text/html") => Err(ProbeFailure::UnexpectedContentType(mime)),
            _ => Err(ProbeFailure::UnrecognizedFormat),
        }
    }
}

/// Recognise a media container or streaming manifest from its first bytes
pub fn detect_media(head: &[u8]) -> Option<MediaKind> {
    let text_start = head
        .strip_prefix(b"\xEF\xBB\xBF")
        .unwrap_or(head)
        .trim_ascii_start();

    if text_start.starts_with(b"#EXTM3U") {
        return Some(MediaKind::HlsManifest);
    }
    if text_start.starts_with(b"<?xml") || text_start.starts_with(b"<MPD") {
        let window = &text_start[..text_start.len().min(512)];
        if window.windows(4).any(|w| w == b"<MPD") {
            return Some(MediaKind::DashManifest);
        }
    }

    if is_mpeg_ts(head) {
        return Some(MediaKind::MpegTs);
    }

    infer::get(head)
        .filter(|kind| {
            matches!(
                kind.matcher_type(),
                infer::MatcherType::Video | infer::MatcherType::Audio
            )
        })
        .map(|kind| MediaKind::Container(kind.mime_type()))
}

// Sync byte at the start of every 188-byte packet that fits in the head.
// A lone 0x47 is just an ASCII 'G', so at least two packets must line up.
fn is_mpeg_ts(head: &[u8]) -> bool {
    if head.len() < TS_MIN_SYNC_PACKETS * TS_PACKET_LEN {
        return false;
    }
    head.iter()
        .step_by(TS_PACKET_LEN)
        .all(|&b| b == TS_SYNC_BYTE)
}

fn is_media_content_type(mime: &str) -> bool {
    mime.starts_with("video/")
        || mime.starts_with("audio/")
        || matches!(
            mime,
            "application/vnd.apple.mpegurl"
                | "application/x-mpegurl"
                | "application/dash+xml"
                | "application/octet-stream"
                | "binary/octet-stream"
        )
}
