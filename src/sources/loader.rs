//! Loading of the run's tabular inputs
//!
//! Source lists are either CSV (an `url`/`address` column with optional
//! `name` and `group`) or plain text with one address per line. Keyword tables
//! are CSV with a `channel` column and one or more `keyword*` columns whose
//! cells may hold several `|`-separated variants, which covers both the
//! `channel,keywords` and the wide `Channel,Keyword1..Keyword5` layouts.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::{AppError, AppResult};
use crate::models::{KeywordTable, Source, SourceKind};
use crate::utils::UrlUtils;

const ADDRESS_COLUMNS: &[&str] = &["url", "address", "source", "link"];
const LABEL_COLUMNS: &[&str] = &["name", "label", "title", "description"];
const GROUP_COLUMNS: &[&str] = &["group", "group-title", "group_title", "category"];
const CHANNEL_COLUMNS: &[&str] = &["channel", "channel_name", "name"];
const VARIANT_SEPARATOR: char = '|';

/// Load the source list at `path`
pub fn load_sources(path: &Path) -> AppResult<Vec<Source>> {
    let content = read_input(path, "source list")?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let sources = match csv_address_column(content) {
        Some(_) => parse_source_csv(content, path)?,
        None => parse_source_text(content),
    };

    let sources = dedup_sources(sources);
    let remote = sources.iter().filter(|s| s.kind() == SourceKind::Remote).count();
    info!(
        "Loaded {} sources from {} ({} remote, {} local)",
        sources.len(),
        path.display(),
        remote,
        sources.len() - remote
    );
    Ok(sources)
}

/// Load the channel keyword table at `path`
pub fn load_keywords(path: &Path, max_variants: usize) -> AppResult<KeywordTable> {
    let content = read_input(path, "keyword table")?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    let table = parse_keyword_csv(content, path, max_variants)?;

    info!(
        "Loaded {} channels with keywords from {}",
        table.len(),
        path.display()
    );
    Ok(table)
}

/// Playlist files found recursively below the given directories
///
/// Missing directories are skipped with a warning. Results are sorted so runs
/// over the same tree process sources in the same order.
pub fn scan_playlist_dirs(dirs: &[PathBuf], extensions: &[String]) -> Vec<Source> {
    let mut found: Vec<PathBuf> = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            warn!("Playlist directory not found: {}", dir.display());
            continue;
        }

        let mut dir_files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| UrlUtils::has_extension(&e.path().to_string_lossy(), extensions))
            .map(|e| e.path().to_path_buf())
            .collect();
        dir_files.sort();

        debug!("Found {} playlist files in {}", dir_files.len(), dir.display());
        found.extend(dir_files);
    }

    found
        .into_iter()
        .map(|path| Source::new(path.to_string_lossy()))
        .collect()
}

fn read_input(path: &Path, what: &str) -> AppResult<String> {
    fs::read_to_string(path).map_err(|e| {
        AppError::configuration(format!("cannot read {what} {}: {e}", path.display()))
    })
}

fn csv_reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(content.as_bytes())
}

fn header_index(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
}

/// Index of the address column when the first line is a CSV header
fn csv_address_column(content: &str) -> Option<usize> {
    let first_line = content.lines().find(|l| !l.trim().is_empty())?;
    if UrlUtils::parse_absolute(first_line.trim()).is_some() {
        return None;
    }
    let mut reader = csv_reader(content);
    let headers = reader.headers().ok()?;
    header_index(headers, ADDRESS_COLUMNS)
}

fn parse_source_csv(content: &str, path: &Path) -> AppResult<Vec<Source>> {
    let mut reader = csv_reader(content);
    let csv_error = |source| AppError::Csv {
        path: path.display().to_string(),
        source,
    };

    let headers = reader.headers().map_err(csv_error)?.clone();
    let address_idx = header_index(&headers, ADDRESS_COLUMNS)
        .ok_or_else(|| AppError::configuration(format!("{} has no url column", path.display())))?;
    let label_idx = header_index(&headers, LABEL_COLUMNS);
    let group_idx = header_index(&headers, GROUP_COLUMNS);

    let mut sources = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable row {} in {}: {}", row + 2, path.display(), e);
                continue;
            }
        };

        let Some(address) = record.get(address_idx).filter(|a| !a.is_empty()) else {
            continue;
        };
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::to_string);

        sources.push(
            Source::new(address)
                .with_label(cell(label_idx))
                .with_group(cell(group_idx)),
        );
    }
    Ok(sources)
}

fn parse_source_text(content: &str) -> Vec<Source> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Source::new)
        .collect()
}

fn dedup_sources(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(UrlUtils::dedup_key(&s.address)))
        .collect()
}

fn parse_keyword_csv(content: &str, path: &Path, max_variants: usize) -> AppResult<KeywordTable> {
    let mut reader = csv_reader(content);
    let csv_error = |source| AppError::Csv {
        path: path.display().to_string(),
        source,
    };

    let headers = reader.headers().map_err(csv_error)?.clone();
    let channel_idx = header_index(&headers, CHANNEL_COLUMNS).ok_or_else(|| {
        AppError::configuration(format!("{} has no channel column", path.display()))
    })?;
    let group_idx = header_index(&headers, GROUP_COLUMNS);
    let keyword_idxs: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.to_ascii_lowercase().starts_with("keyword"))
        .map(|(i, _)| i)
        .collect();

    if keyword_idxs.is_empty() {
        return Err(AppError::configuration(format!(
            "{} has no keyword column",
            path.display()
        )));
    }

    let mut table = KeywordTable::new();
    for (row, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable row {} in {}: {}", row + 2, path.display(), e);
                continue;
            }
        };

        let Some(channel) = record.get(channel_idx).filter(|c| !c.is_empty()) else {
            continue;
        };
        let variants: Vec<&str> = keyword_idxs
            .iter()
            .filter_map(|&i| record.get(i))
            .flat_map(|cell| cell.split(VARIANT_SEPARATOR))
            .collect();

        if variants.iter().all(|v| v.trim().is_empty()) {
            debug!("Channel '{}' has no keywords, skipping", channel);
            continue;
        }

        let group = group_idx.and_then(|i| record.get(i)).map(str::to_string);
        table.insert(channel, variants, group, max_variants);
    }

    Ok(table)
}
