//! M3U playlist parser
//!
//! Line-oriented: `#EXTINF` starts a pending entry and the next non-blank,
//! non-comment line is its address. Bare address lines without metadata are
//! kept, named after the caller's hint or the address itself. Other `#` lines
//! are comments, except `#EXTGRP` which supplies a group for the pending entry.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::{EntryAttributes, RawEntry};
use crate::utils::UrlUtils;

pub const HEADER_MARKER: &str = "#EXTM3U";
pub const INFO_MARKER: &str = "#EXTINF";
const GROUP_MARKER: &str = "#EXTGRP:";

/// Entries of one document plus the count of malformed lines skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPlaylist {
    pub entries: Vec<RawEntry>,
    pub anomalies: usize,
}

/// Metadata of an `#EXTINF` line waiting for its address
#[derive(Debug)]
struct PendingEntry {
    title: String,
    attributes: EntryAttributes,
    line_number: usize,
}

/// Parse a playlist document
///
/// `name_hint` names entries that have no metadata line of their own; it is
/// the source label for top-level documents and the parent entry's name for
/// nested ones.
pub fn parse_playlist(content: &str, name_hint: Option<&str>) -> ParsedPlaylist {
    let mut parsed = ParsedPlaylist::default();
    let mut pending: Option<PendingEntry> = None;

    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    for (line_num, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();

        if line.is_empty() {
            continue;
        }

        if is_info_line(line) {
            if let Some(previous) = pending.take() {
                warn!(
                    "Metadata at line {} has no address, skipping entry '{}'",
                    previous.line_number, previous.title
                );
                parsed.anomalies += 1;
            }
            let (title, attributes) = parse_extinf_line(line);
            pending = Some(PendingEntry {
                title,
                attributes,
                line_number: line_num + 1,
            });
            continue;
        }

        if let Some(group) = line.strip_prefix(GROUP_MARKER) {
            if let Some(entry) = pending.as_mut()
                && entry.attributes.group_title.is_none()
                && !group.trim().is_empty()
            {
                entry.attributes.group_title = Some(group.trim().to_string());
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let address = line.to_string();
        let entry = match pending.take() {
            Some(meta) => {
                let name = if meta.title.is_empty() {
                    fallback_name(name_hint, &address)
                } else {
                    meta.title
                };
                RawEntry::new(name, address).with_attributes(meta.attributes)
            }
            None => {
                debug!(
                    "Stream address without metadata at line {}: {}",
                    line_num + 1,
                    UrlUtils::obfuscate_credentials(&address)
                );
                RawEntry::new(fallback_name(name_hint, &address), address)
            }
        };
        parsed.entries.push(entry);
    }

    if let Some(trailing) = pending {
        warn!(
            "Metadata at line {} has no address, skipping entry '{}'",
            trailing.line_number, trailing.title
        );
        parsed.anomalies += 1;
    }

    parsed
}

fn is_info_line(line: &str) -> bool {
    line.get(..INFO_MARKER.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(INFO_MARKER))
}

fn fallback_name(name_hint: Option<&str>, address: &str) -> String {
    match name_hint.map(str::trim) {
        Some(hint) if !hint.is_empty() => hint.to_string(),
        _ => address.to_string(),
    }
}

/// Split an `#EXTINF` line into its display title and attributes
///
/// The title follows the first comma outside a quoted attribute value, so
/// commas inside `group-title="News, Sport"` or inside the title both survive.
pub fn parse_extinf_line(line: &str) -> (String, EntryAttributes) {
    let content = line
        .get(INFO_MARKER.len()..)
        .unwrap_or_default()
        .trim_start_matches(':');

    let (header, title) = match find_title_separator(content) {
        Some(pos) => (&content[..pos], content[pos + 1..].trim()),
        None => (content, ""),
    };

    // "-1 tvg-id=..." : the leading token is the duration
    let attrs_part = header
        .trim_start()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest)
        .unwrap_or("");

    let raw = parse_extinf_attributes(attrs_part);
    let take = |key: &str| raw.get(key).filter(|v| !v.is_empty()).cloned();

    let attributes = EntryAttributes {
        tvg_id: take("tvg-id"),
        tvg_name: take("tvg-name"),
        tvg_logo: take("tvg-logo"),
        tvg_language: take("tvg-language"),
        tvg_country: take("tvg-country"),
        group_title: take("group-title"),
    };

    (title.to_string(), attributes)
}

fn find_title_separator(content: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (idx, ch) in content.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Parse `key="value"` pairs; keys are lower-cased, unquoted values end at whitespace
fn parse_extinf_attributes(attrs_part: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();

    let mut chars = attrs_part.chars().peekable();
    let mut current_key = String::new();
    let mut current_value = String::new();
    let mut in_quotes = false;
    let mut in_value = false;

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' if !in_quotes => {
                if in_value && !current_key.is_empty() {
                    attributes.insert(current_key.to_lowercase(), current_value.clone());
                }
                current_key.clear();
                current_value.clear();
                in_value = false;
            }
            '=' if !in_value => {
                in_value = true;
                if chars.peek() == Some(&'"') {
                    chars.next();
                    in_quotes = true;
                }
            }
            '"' if in_value && in_quotes => {
                in_quotes = false;
                if !current_key.is_empty() {
                    attributes.insert(current_key.to_lowercase(), current_value.clone());
                }
                current_key.clear();
                current_value.clear();
                in_value = false;
            }
            _ => {
                if in_value {
                    current_value.push(ch);
                } else {
                    current_key.push(ch);
                }
            }
        }
    }

    if in_value && !current_key.is_empty() {
        attributes.insert(current_key.to_lowercase(), current_value);
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_playlist() {
        let content = "#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"news.us\" tvg-logo=\"http://logo/n.png\" group-title=\"News\",Live NEWS247 Feed\n\
            http://x/a.m3u8\n\
            \n\
            #EXTINF:-1,Movies One\n\
            http://x/movies.ts\n";

        let parsed = parse_playlist(content, None);
        assert_eq!(parsed.anomalies, 0);
        assert_eq!(parsed.entries.len(), 2);

        let first = &parsed.entries[0];
        assert_eq!(first.name, "Live NEWS247 Feed");
        assert_eq!(first.address, "http://x/a.m3u8");
        assert_eq!(first.attributes.tvg_id.as_deref(), Some("news.us"));
        assert_eq!(first.attributes.tvg_logo.as_deref(), Some("http://logo/n.png"));
        assert_eq!(first.attributes.group_title.as_deref(), Some("News"));

        assert_eq!(parsed.entries[1].name, "Movies One");
    }

    #[test]
    fn test_bare_addresses_use_hint_or_address() {
        let content = "http://x/one.ts\n# just a comment\nhttp://x/two.ts\n";

        let hinted = parse_playlist(content, Some("Parent Channel"));
        assert_eq!(hinted.entries.len(), 2);
        assert!(hinted.entries.iter().all(|e| e.name == "Parent Channel"));

        let unhinted = parse_playlist(content, None);
        assert_eq!(unhinted.entries[0].name, "http://x/one.ts");
    }

    #[test]
    fn test_metadata_without_address_is_anomaly() {
        let content = "#EXTM3U\n#EXTINF:-1,Orphan\n#EXTINF:-1,Kept\nhttp://x/kept.ts\n#EXTINF:-1,Trailing\n";
        let parsed = parse_playlist(content, None);
        assert_eq!(parsed.anomalies, 2);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].name, "Kept");
    }

    #[test]
    fn test_commas_inside_quotes_and_title() {
        let (title, attrs) =
            parse_extinf_line("#EXTINF:-1 group-title=\"News, Sport\" tvg-name=\"A\",Title, With Comma");
        assert_eq!(title, "Title, With Comma");
        assert_eq!(attrs.group_title.as_deref(), Some("News, Sport"));
        assert_eq!(attrs.tvg_name.as_deref(), Some("A"));
    }

    #[test]
    fn test_extgrp_and_crlf() {
        let content = "#EXTM3U\r\n#EXTINF:-1,Channel\r\n#EXTGRP:Kids\r\nhttp://x/c.ts\r\n";
        let parsed = parse_playlist(content, None);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].address, "http://x/c.ts");
        assert_eq!(parsed.entries[0].attributes.group_title.as_deref(), Some("Kids"));
    }

    #[test]
    fn test_empty_title_falls_back_to_hint() {
        let parsed = parse_playlist("#EXTINF:-1 tvg-id=\"x\",\nhttp://x/c.ts\n", Some("Hint"));
        assert_eq!(parsed.entries[0].name, "Hint");
    }

    #[test]
    fn test_unquoted_and_mixed_case_attributes() {
        let (_, attrs) = parse_extinf_line("#extinf:0 TVG-LANGUAGE=English tvg-country=\"US\",X");
        assert_eq!(attrs.tvg_language.as_deref(), Some("English"));
        assert_eq!(attrs.tvg_country.as_deref(), Some("US"));
    }
}
