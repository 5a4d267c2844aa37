//! Recursive playlist resolution
//!
//! Each source is fetched, parsed and flattened into [`RawEntry`] values.
//! Entries whose address carries a nested-playlist extension are expanded in
//! place, depth-first, sharing one visited set per source so self-referencing
//! or mutually-referencing playlists terminate. Expansion deeper than
//! `max_depth` is truncated at that branch.
//!
//! Nothing here returns an error: failures are collected as [`SourceIssue`]s
//! and the affected source or branch simply contributes no entries.

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::fetcher::PlaylistFetcher;
use crate::config::ResolverConfig;
use crate::errors::SourceError;
use crate::models::{EntryAttributes, RawEntry, Source, SourceIssue};
use crate::playlist::parse_playlist;
use crate::utils::UrlUtils;
use crate::utils::human_format::format_duration;

/// Flattened result of resolving one source
#[derive(Debug, Clone, Default)]
pub struct SourceResolution {
    pub entries: Vec<RawEntry>,
    pub issues: Vec<SourceIssue>,
    /// The top-level document itself could not be read
    pub failed: bool,
    /// Malformed entries skipped across all documents of this source
    pub anomalies: usize,
}

/// Flattened result of resolving every source
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub entries: Vec<RawEntry>,
    pub issues: Vec<SourceIssue>,
    pub sources_total: usize,
    pub sources_failed: usize,
}

/// Mutable state of one source's expansion
struct Expansion<'a> {
    root: &'a str,
    visited: HashSet<String>,
    out: SourceResolution,
}

pub struct PlaylistResolver<F: PlaylistFetcher> {
    fetcher: Arc<F>,
    max_depth: usize,
    nested_extensions: Vec<String>,
    concurrency: usize,
}

impl<F: PlaylistFetcher> PlaylistResolver<F> {
    pub fn new(fetcher: Arc<F>, config: &ResolverConfig) -> Self {
        Self {
            fetcher,
            max_depth: config.max_depth,
            nested_extensions: config.nested_extensions.clone(),
            concurrency: config.source_concurrency.max(1),
        }
    }

    /// Resolve all sources, a bounded number at a time, keeping source order
    pub async fn resolve_all(&self, sources: &[Source]) -> Resolution {
        let started = Instant::now();
        info!(
            "Resolving {} sources ({} at a time, max depth {})",
            sources.len(),
            self.concurrency,
            self.max_depth
        );

        let per_source: Vec<SourceResolution> = stream::iter(sources)
            .map(|source| self.resolve_source(source))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut resolution = Resolution {
            sources_total: sources.len(),
            ..Default::default()
        };
        let mut seen = HashSet::new();
        let mut duplicates = 0usize;

        for result in per_source {
            if result.failed {
                resolution.sources_failed += 1;
            }
            resolution.issues.extend(result.issues);
            for entry in result.entries {
                if seen.insert(UrlUtils::dedup_key(&entry.address)) {
                    resolution.entries.push(entry);
                } else {
                    duplicates += 1;
                }
            }
        }

        info!(
            "Resolved {} unique entries from {} sources in {} ({} duplicates dropped, {} sources failed, {} issues)",
            resolution.entries.len(),
            resolution.sources_total,
            format_duration(started.elapsed()),
            duplicates,
            resolution.sources_failed,
            resolution.issues.len()
        );
        resolution
    }

    /// Resolve one source into a flat, deduplicated entry list
    pub async fn resolve_source(&self, source: &Source) -> SourceResolution {
        let mut expansion = Expansion {
            root: &source.address,
            visited: HashSet::new(),
            out: SourceResolution::default(),
        };

        let inherited = EntryAttributes {
            group_title: source.group.clone(),
            ..Default::default()
        };

        self.expand(
            source.address.clone(),
            source.label.clone(),
            inherited,
            0,
            &mut expansion,
        )
        .await;

        let mut out = expansion.out;
        let before = out.entries.len();
        let mut seen = HashSet::new();
        out.entries
            .retain(|entry| seen.insert(UrlUtils::dedup_key(&entry.address)));

        debug!(
            "Source {} yielded {} entries ({} duplicates)",
            source,
            out.entries.len(),
            before - out.entries.len()
        );
        out
    }

    fn expand<'a>(
        &'a self,
        address: String,
        name_hint: Option<String>,
        inherited: EntryAttributes,
        depth: usize,
        state: &'a mut Expansion<'_>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if !state.visited.insert(UrlUtils::dedup_key(&address)) {
                debug!(
                    "Skipping already visited playlist {}",
                    UrlUtils::obfuscate_credentials(&address)
                );
                record(state, SourceError::Cycle { address }, depth);
                return;
            }

            let document = match self.fetcher.fetch(&address).await {
                Ok(document) => document,
                Err(err) => {
                    if depth == 0 && err.is_fetch_failure() {
                        state.out.failed = true;
                    }
                    record(state, err, depth);
                    return;
                }
            };

            let parsed = parse_playlist(&document, name_hint.as_deref());
            if parsed.anomalies > 0 {
                warn!(
                    "Skipped {} malformed entries in {}",
                    parsed.anomalies,
                    UrlUtils::obfuscate_credentials(&address)
                );
            }
            state.out.anomalies += parsed.anomalies;

            for mut entry in parsed.entries {
                let Some(resolved) = UrlUtils::resolve_reference(&address, &entry.address) else {
                    continue;
                };
                entry.address = resolved;
                entry.attributes.inherit(&inherited);

                if !UrlUtils::has_extension(&entry.address, &self.nested_extensions) {
                    state.out.entries.push(entry);
                    continue;
                }

                if depth + 1 > self.max_depth {
                    record(
                        state,
                        SourceError::RecursionLimit {
                            address: entry.address,
                            depth: depth + 1,
                        },
                        depth,
                    );
                    continue;
                }

                debug!(
                    "Expanding nested playlist {} (depth {})",
                    UrlUtils::obfuscate_credentials(&entry.address),
                    depth + 1
                );
                self.expand(entry.address, Some(entry.name), entry.attributes, depth + 1, state)
                    .await;
            }
        })
    }
}

fn record(state: &mut Expansion<'_>, error: SourceError, depth: usize) {
    let message = UrlUtils::obfuscate_credentials(&error.to_string());
    match &error {
        SourceError::Cycle { .. } => debug!("{}", message),
        _ if depth == 0 => warn!("Source failed, contributing no entries: {}", message),
        _ => warn!("Nested playlist skipped: {}", message),
    }
    state.out.issues.push(SourceIssue {
        source: state.root.to_string(),
        error,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory documents keyed by address
    #[derive(Default)]
    struct MapFetcher {
        documents: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl MapFetcher {
        fn with(mut self, address: &str, body: &str) -> Self {
            self.documents.insert(address.to_string(), body.to_string());
            self
        }
    }

    #[async_trait]
    impl PlaylistFetcher for MapFetcher {
        async fn fetch(&self, address: &str) -> SourceResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.documents
                .get(address)
                .cloned()
                .ok_or_else(|| SourceError::unavailable(address, "not found"))
        }
    }

    fn resolver(fetcher: MapFetcher, max_depth: usize) -> PlaylistResolver<MapFetcher> {
        let config = ResolverConfig {
            max_depth,
            ..Default::default()
        };
        PlaylistResolver::new(Arc::new(fetcher), &config)
    }

    fn addresses(entries: &[RawEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.address.as_str()).collect()
    }

    #[tokio::test]
    async fn test_nested_playlists_are_spliced_in_place() {
        let fetcher = MapFetcher::default()
            .with(
                "http://h/root.m3u",
                "#EXTM3U\n#EXTINF:-1,First\nhttp://h/1.ts\n#EXTINF:-1 group-title=\"News\",News Bundle\nsub/news.m3u\n#EXTINF:-1,Last\nhttp://h/3.ts\n",
            )
            .with("http://h/sub/news.m3u", "#EXTM3U\nhttp://h/news-a.m3u8\n#EXTINF:-1,Named\nhttp://h/news-b.ts\n");

        let out = resolver(fetcher, 5)
            .resolve_source(&Source::new("http://h/root.m3u"))
            .await;

        assert!(!out.failed);
        assert_eq!(
            addresses(&out.entries),
            vec!["http://h/1.ts", "http://h/news-a.m3u8", "http://h/news-b.ts", "http://h/3.ts"]
        );
        // bare nested entry inherits the parent's name and group
        assert_eq!(out.entries[1].name, "News Bundle");
        assert_eq!(out.entries[1].attributes.group_title.as_deref(), Some("News"));
        assert_eq!(out.entries[2].name, "Named");
    }

    #[tokio::test]
    async fn test_self_reference_terminates() {
        let fetcher = MapFetcher::default().with(
            "http://h/self.m3u",
            "#EXTM3U\n#EXTINF:-1,Me\nhttp://h/self.m3u\n#EXTINF:-1,Stream\nhttp://h/s.ts\n",
        );

        let resolver = resolver(fetcher, 5);
        let out = resolver.resolve_source(&Source::new("http://h/self.m3u")).await;

        assert_eq!(addresses(&out.entries), vec!["http://h/s.ts"]);
        assert!(out.issues.iter().any(|i| matches!(i.error, SourceError::Cycle { .. })));
        assert_eq!(resolver.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_depth_cap_truncates_chain() {
        // a.m3u -> b.m3u -> c.m3u -> d.m3u, each with one stream
        let fetcher = MapFetcher::default()
            .with("http://h/a.m3u", "http://h/a.ts\nhttp://h/b.m3u\n")
            .with("http://h/b.m3u", "http://h/b.ts\nhttp://h/c.m3u\n")
            .with("http://h/c.m3u", "http://h/c.ts\nhttp://h/d.m3u\n")
            .with("http://h/d.m3u", "http://h/d.ts\n");

        let out = resolver(fetcher, 2).resolve_source(&Source::new("http://h/a.m3u")).await;

        assert_eq!(addresses(&out.entries), vec!["http://h/a.ts", "http://h/b.ts", "http://h/c.ts"]);
        assert!(out.issues.iter().any(|i| matches!(
            &i.error,
            SourceError::RecursionLimit { address, depth: 3 } if address == "http://h/d.m3u"
        )));
    }

    #[tokio::test]
    async fn test_failed_source_contributes_nothing() {
        let fetcher = MapFetcher::default().with("http://h/ok.m3u", "http://h/ok.ts\nhttp://h/ok.ts\n");

        let resolution = resolver(fetcher, 5)
            .resolve_all(&[Source::new("http://h/down.m3u"), Source::new("http://h/ok.m3u")])
            .await;

        assert_eq!(resolution.sources_total, 2);
        assert_eq!(resolution.sources_failed, 1);
        assert_eq!(addresses(&resolution.entries), vec!["http://h/ok.ts"]);
        assert_eq!(resolution.issues.len(), 1);
        assert_eq!(resolution.issues[0].source, "http://h/down.m3u");
    }

    #[tokio::test]
    async fn test_missing_nested_playlist_is_not_a_source_failure() {
        let fetcher = MapFetcher::default().with("http://h/root.m3u", "http://h/gone.m3u\nhttp://h/x.ts\n");

        let out = resolver(fetcher, 5).resolve_source(&Source::new("http://h/root.m3u")).await;
        assert!(!out.failed);
        assert_eq!(addresses(&out.entries), vec!["http://h/x.ts"]);
        assert_eq!(out.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_source_label_names_bare_entries() {
        let fetcher = MapFetcher::default().with("/lists/local.m3u", "stream.ts\nhttp://h/y.ts\n");
        let source = Source::new("/lists/local.m3u").with_label(Some("Local"));

        let out = resolver(fetcher, 5).resolve_source(&source).await;
        assert_eq!(addresses(&out.entries), vec!["/lists/stream.ts", "http://h/y.ts"]);
        assert!(out.entries.iter().all(|e| e.name == "Local"));
    }
}
