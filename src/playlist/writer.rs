//! M3U rendering and atomic output writes

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::parser::{HEADER_MARKER, INFO_MARKER};
use crate::errors::{AppError, AppResult};
use crate::models::RawEntry;

/// Build the `#EXTINF` line for an entry, without the trailing newline
pub fn format_extinf(entry: &RawEntry) -> String {
    let mut line = format!("{INFO_MARKER}:-1");

    let attrs = &entry.attributes;
    let pairs = [
        ("tvg-id", &attrs.tvg_id),
        ("tvg-name", &attrs.tvg_name),
        ("tvg-logo", &attrs.tvg_logo),
        ("tvg-language", &attrs.tvg_language),
        ("tvg-country", &attrs.tvg_country),
        ("group-title", &attrs.group_title),
    ];
    for (key, value) in pairs {
        if let Some(value) = value.as_deref().map(sanitize_attribute)
            && !value.is_empty()
        {
            let _ = write!(line, " {key}=\"{value}\"");
        }
    }

    let _ = write!(line, ",{}", sanitize_line(&entry.name));
    line
}

/// Render a complete playlist document
pub fn render_entries(entries: &[RawEntry]) -> String {
    let mut out = String::with_capacity(16 + entries.len() * 96);
    out.push_str(HEADER_MARKER);
    out.push('\n');

    for entry in entries {
        out.push_str(&format_extinf(entry));
        out.push('\n');
        out.push_str(entry.address.trim());
        out.push('\n');
    }
    out
}

// Quotes would end the attribute early; line breaks would split the entry.
fn sanitize_attribute(value: &str) -> String {
    sanitize_line(value).replace('"', "'")
}

fn sanitize_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Write `contents` to `path` without ever exposing a partial file
///
/// Missing parent directories are created. The data goes to a temporary file
/// in the destination directory, is synced, then renamed over the target.
pub async fn write_atomic(path: &Path, contents: String) -> AppResult<()> {
    let path: PathBuf = path.to_path_buf();
    let bytes = contents.len();

    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&target, contents.as_bytes()))
        .await
        .map_err(|e| AppError::internal(format!("output writer task failed: {e}")))??;

    info!("Wrote {} bytes to {}", bytes, path.display());
    Ok(())
}

fn write_atomic_blocking(path: &Path, contents: &[u8]) -> AppResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&parent)
        .map_err(|e| AppError::io(format!("creating directory {}", parent.display()), e))?;

    let mut temp = NamedTempFile::new_in(&parent)
        .map_err(|e| AppError::io(format!("creating temporary file in {}", parent.display()), e))?;
    debug!("Staging output in {}", temp.path().display());

    let staged: std::io::Result<()> = (|| {
        temp.write_all(contents)?;
        temp.flush()?;
        temp.as_file().sync_all()
    })();
    staged.map_err(|e| AppError::io(format!("writing {}", path.display()), e))?;

    temp.persist(path)
        .map_err(|e| AppError::io(format!("replacing {}", path.display()), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryAttributes;
    use crate::playlist::parser::parse_playlist;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_format_extinf_with_attributes() {
        let entry = RawEntry::new("News \"HD\"", "http://x/a.m3u8").with_attributes(EntryAttributes {
            tvg_logo: Some("http://logo/n.png".into()),
            group_title: Some("News \"Live\"".into()),
            ..Default::default()
        });
        assert_eq!(
            format_extinf(&entry),
            "#EXTINF:-1 tvg-logo=\"http://logo/n.png\" group-title=\"News 'Live'\",News \"HD\""
        );
    }

    #[test]
    fn test_render_empty_has_header_only() {
        assert_eq!(render_entries(&[]), "#EXTM3U\n");
    }

    #[tokio::test]
    async fn test_write_atomic_creates_directories_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.m3u");

        write_atomic(&path, "#EXTM3U\nfirst\n".to_string()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#EXTM3U\nfirst\n");

        write_atomic(&path, "#EXTM3U\n".to_string()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#EXTM3U\n");

        // only the target remains, no stray temporaries
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    fn entry_strategy() -> impl Strategy<Value = RawEntry> {
        (
            "[A-Za-z0-9][A-Za-z0-9 ,._()-]{0,24}[A-Za-z0-9]",
            "(http|https|rtmp)://[a-z]{1,10}\\.example/[a-z0-9]{1,12}\\.(ts|m3u8)",
            proptest::option::of("[A-Za-z ,]{1,12}"),
        )
            .prop_map(|(name, address, group)| {
                RawEntry::new(name, address).with_attributes(EntryAttributes {
                    group_title: group.map(|g| g.trim().to_string()),
                    ..Default::default()
                })
            })
    }

    proptest! {
        #[test]
        fn prop_render_then_parse_preserves_name_address_pairs(
            entries in proptest::collection::vec(entry_strategy(), 0..30)
        ) {
            let rendered = render_entries(&entries);
            let parsed = parse_playlist(&rendered, None);

            prop_assert_eq!(parsed.anomalies, 0);
            let expected: BTreeSet<_> = entries.iter().map(|e| (e.name.clone(), e.address.clone())).collect();
            let actual: BTreeSet<_> = parsed.entries.iter().map(|e| (e.name.clone(), e.address.clone())).collect();
            prop_assert_eq!(expected, actual);
        }
    }
}
