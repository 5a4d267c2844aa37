//! Per-channel selection of validated addresses and rendering of the run's outputs
//!
//! [`ChannelSelection`] is filled by probe tasks as results complete, so it is
//! shared behind a [`tokio::sync::Mutex`]. Once a channel holds
//! `max_per_channel` addresses further valid results for it are discarded.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::errors::SourceError;
use crate::models::{Candidate, EntryAttributes, KeywordTable, Outcome, RawEntry, SourceIssue, ValidationResult};

/// Validated addresses per channel, in completion order, capped
#[derive(Debug, Clone)]
pub struct ChannelSelection {
    max_per_channel: usize,
    channels: HashMap<String, Vec<Candidate>>,
}

pub type SharedSelection = Arc<Mutex<ChannelSelection>>;

impl ChannelSelection {
    pub fn new(max_per_channel: usize) -> Self {
        Self {
            max_per_channel,
            channels: HashMap::new(),
        }
    }

    pub fn shared(max_per_channel: usize) -> SharedSelection {
        Arc::new(Mutex::new(Self::new(max_per_channel)))
    }

    /// Retain a validated candidate unless its channel is full
    ///
    /// Returns whether the candidate was retained.
    pub fn offer(&mut self, candidate: &Candidate) -> bool {
        let retained = self.channels.entry(candidate.channel.clone()).or_default();
        if retained.len() >= self.max_per_channel || retained.iter().any(|c| c.address == candidate.address) {
            return false;
        }
        retained.push(candidate.clone());
        true
    }

    pub fn retained(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    pub fn is_full(&self, channel: &str) -> bool {
        self.retained(channel) >= self.max_per_channel
    }

    pub fn total_retained(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    /// Channels with at least one retained address
    pub fn channel_count(&self) -> usize {
        self.channels.values().filter(|v| !v.is_empty()).count()
    }

    /// Finalise into channels sorted by name
    pub fn into_sorted(self) -> BTreeMap<String, Vec<Candidate>> {
        self.channels
            .into_iter()
            .filter(|(_, retained)| !retained.is_empty())
            .collect()
    }
}

/// Playlist entries for the retained addresses
///
/// The first address of a channel carries the channel name; later ones get a
/// `_2`, `_3`, ... suffix. The group comes from the keyword table, then from
/// the source entry, and falls back to the channel name.
pub fn build_playlist_entries(selection: &BTreeMap<String, Vec<Candidate>>, keywords: &KeywordTable) -> Vec<RawEntry> {
    let mut entries = Vec::with_capacity(selection.values().map(Vec::len).sum());

    for (channel, retained) in selection {
        let table_group = keywords.get(channel).and_then(|k| k.group.clone());

        for (idx, candidate) in retained.iter().enumerate() {
            let name = if idx == 0 {
                channel.clone()
            } else {
                format!("{}_{}", channel, idx + 1)
            };

            let source = &candidate.attributes;
            let attributes = EntryAttributes {
                tvg_id: source.tvg_id.clone(),
                tvg_name: Some(channel.clone()),
                tvg_logo: source.tvg_logo.clone(),
                tvg_language: source.tvg_language.clone(),
                tvg_country: source.tvg_country.clone(),
                group_title: table_group
                    .clone()
                    .or_else(|| source.group_title.clone())
                    .or_else(|| Some(channel.clone())),
            };

            entries.push(RawEntry::new(name, candidate.address.clone()).with_attributes(attributes));
        }
    }
    entries
}

/// Totals written as the validation log's last line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub candidates: usize,
    pub valid: usize,
    pub invalid: usize,
    pub retained: usize,
    pub channels: usize,
    pub sources: usize,
    pub failed_sources: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SUMMARY candidates={} valid={} invalid={} retained={} channels={} sources={} failed_sources={}",
            self.candidates,
            self.valid,
            self.invalid,
            self.retained,
            self.channels,
            self.sources,
            self.failed_sources
        )
    }
}

/// Render the validation log
///
/// Source failures come first as `SOURCE-ERROR <address> -> <reason>`, then
/// one `<VALID|INVALID> <channel> -> <address>` line per candidate, then the
/// summary line.
pub fn render_validation_log(results: &[ValidationResult], issues: &[SourceIssue], summary: &RunSummary) -> String {
    let mut out = String::new();

    for issue in issues {
        if matches!(issue.error, SourceError::Cycle { .. }) {
            continue;
        }
        out.push_str(&format!(
            "SOURCE-ERROR {} -> {}\n",
            issue.error.address(),
            issue.error.reason()
        ));
    }

    for result in results {
        out.push_str(&format!(
            "{} {} -> {}\n",
            result.outcome, result.candidate.channel, result.candidate.address
        ));
    }

    out.push_str(&summary.to_string());
    out.push('\n');
    out
}

/// Count valid and invalid outcomes
pub fn tally(results: &[ValidationResult]) -> (usize, usize) {
    let valid = results.iter().filter(|r| r.outcome == Outcome::Valid).count();
    (valid, results.len() - valid)
}
