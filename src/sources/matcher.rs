//! Keyword matching of playlist entries to canonical channels

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::models::{Candidate, KeywordTable, RawEntry};
use crate::utils::UrlUtils;

/// Outcome counters of one filtering run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub entries: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub invalid_address: usize,
    pub duplicates: usize,
    pub over_limit: usize,
}

/// Turns raw entries into per-channel candidates
pub struct CandidateFilter<'a> {
    keywords: &'a KeywordTable,
    max_candidates_per_channel: Option<usize>,
}

impl<'a> CandidateFilter<'a> {
    pub fn new(keywords: &'a KeywordTable, max_candidates_per_channel: Option<usize>) -> Self {
        Self {
            keywords,
            max_candidates_per_channel,
        }
    }

    /// First channel, in table order, with a variant inside the entry's name or address
    pub fn match_channel(&self, entry: &RawEntry) -> Option<&'a str> {
        let name = entry.name.to_lowercase();
        let address = entry.address.to_lowercase();

        self.keywords
            .channels()
            .iter()
            .find(|channel| {
                channel
                    .variants
                    .iter()
                    .any(|variant| name.contains(variant.as_str()) || address.contains(variant.as_str()))
            })
            .map(|channel| channel.channel.as_str())
    }

    /// Match, validate and deduplicate entries into candidates
    ///
    /// Entry order is preserved; the first entry for an address decides its
    /// channel. Entries matching no channel are dropped silently.
    pub fn filter(&self, entries: Vec<RawEntry>) -> (Vec<Candidate>, FilterStats) {
        let mut stats = FilterStats {
            entries: entries.len(),
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::new();
        let mut per_channel: HashMap<&str, usize> = HashMap::new();
        let mut candidates = Vec::new();

        for entry in entries {
            let Some(channel) = self.match_channel(&entry) else {
                stats.unmatched += 1;
                continue;
            };

            if !UrlUtils::is_stream_address(&entry.address) {
                debug!(
                    "Dropping '{}' match with unusable address {}",
                    channel,
                    UrlUtils::obfuscate_credentials(&entry.address)
                );
                stats.invalid_address += 1;
                continue;
            }

            if !seen.insert(UrlUtils::dedup_key(&entry.address)) {
                stats.duplicates += 1;
                continue;
            }

            let count = per_channel.entry(channel).or_default();
            if let Some(limit) = self.max_candidates_per_channel
                && *count >= limit
            {
                stats.over_limit += 1;
                continue;
            }
            *count += 1;

            stats.matched += 1;
            candidates.push(
                Candidate::new(channel, entry.address.trim()).with_attributes(entry.attributes),
            );
        }

        info!(
            "Filtered {} entries into {} candidates across {} channels ({} unmatched, {} duplicates, {} unusable, {} over limit)",
            stats.entries,
            stats.matched,
            per_channel.len(),
            stats.unmatched,
            stats.duplicates,
            stats.invalid_address,
            stats.over_limit
        );
        (candidates, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &[&str])]) -> KeywordTable {
        let mut table = KeywordTable::new();
        for (channel, variants) in rows {
            table.insert(channel, variants.iter(), None, 5);
        }
        table
    }

    #[test]
    fn test_case_insensitive_name_match() {
        let keywords = table(&[("NewsChannel", &["news247"])]);
        let filter = CandidateFilter::new(&keywords, None);

        let (candidates, _) = filter.filter(vec![RawEntry::new("Live NEWS247 Feed", "http://x/a.m3u8")]);
        assert_eq!(candidates, vec![Candidate::new("NewsChannel", "http://x/a.m3u8")]);
    }

    #[test]
    fn test_address_match_and_first_channel_wins() {
        let keywords = table(&[("Sports", &["sport"]), ("SportsHD", &["sports hd", "sportshd"])]);
        let filter = CandidateFilter::new(&keywords, None);

        let entry = RawEntry::new("Unnamed", "http://cdn/live/SportsHD/index.m3u8");
        assert_eq!(filter.match_channel(&entry), Some("Sports"));
    }

    #[test]
    fn test_unmatched_and_invalid_dropped() {
        let keywords = table(&[("Movies", &["movie"])]);
        let filter = CandidateFilter::new(&keywords, None);

        let (candidates, stats) = filter.filter(vec![
            RawEntry::new("Cooking", "http://x/cook.ts"),
            RawEntry::new("Movie Night", "/local/movie.ts"),
            RawEntry::new("Movie Night", "http://x/movie.ts"),
        ]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.invalid_address, 1);
    }

    #[test]
    fn test_duplicate_addresses_collapse_to_first_channel() {
        let keywords = table(&[("A", &["alpha"]), ("B", &["beta"])]);
        let filter = CandidateFilter::new(&keywords, None);

        let (candidates, stats) = filter.filter(vec![
            RawEntry::new("beta one", "http://x/same.ts"),
            RawEntry::new("alpha one", "http://x/same.ts"),
        ]);
        assert_eq!(candidates, vec![Candidate::new("B", "http://x/same.ts")]);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_per_channel_candidate_limit() {
        let keywords = table(&[("A", &["alpha"])]);
        let filter = CandidateFilter::new(&keywords, Some(2));

        let entries = (0..5)
            .map(|i| RawEntry::new("alpha", format!("http://x/{i}.ts")))
            .collect();
        let (candidates, stats) = filter.filter(entries);
        assert_eq!(candidates.len(), 2);
        assert_eq!(stats.over_limit, 3);
    }
}
