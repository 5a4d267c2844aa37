use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use strum::{Display, EnumString};

use crate::errors::{ProbeFailure, SourceError};
use crate::utils::UrlUtils;

/// Where a playlist document is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceKind {
    Remote,
    Local,
}

/// A playlist document address from the source list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub address: String,
    /// Display label, used as the name hint for bare entries
    pub label: Option<String>,
    /// Default group for entries that carry none
    pub group: Option<String>,
}

impl Source {
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self {
            address: address.into().trim().to_string(),
            label: None,
            group: None,
        }
    }

    pub fn with_label<S: Into<String>>(mut self, label: Option<S>) -> Self {
        self.label = label.map(Into::into).filter(|l: &String| !l.trim().is_empty());
        self
    }

    pub fn with_group<S: Into<String>>(mut self, group: Option<S>) -> Self {
        self.group = group.map(Into::into).filter(|g: &String| !g.trim().is_empty());
        self
    }

    pub fn kind(&self) -> SourceKind {
        if UrlUtils::is_remote(&self.address) {
            SourceKind::Remote
        } else {
            SourceKind::Local
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({})", label, UrlUtils::obfuscate_credentials(&self.address)),
            None => write!(f, "{}", UrlUtils::obfuscate_credentials(&self.address)),
        }
    }
}

/// `key="value"` attributes of an `#EXTINF` line that survive into the output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAttributes {
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub tvg_logo: Option<String>,
    pub tvg_language: Option<String>,
    pub tvg_country: Option<String>,
    pub group_title: Option<String>,
}

impl EntryAttributes {
    /// Fill unset fields from another attribute set
    pub fn inherit(&mut self, parent: &EntryAttributes) {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.tvg_id, &parent.tvg_id);
        fill(&mut self.tvg_name, &parent.tvg_name);
        fill(&mut self.tvg_logo, &parent.tvg_logo);
        fill(&mut self.tvg_language, &parent.tvg_language);
        fill(&mut self.tvg_country, &parent.tvg_country);
        fill(&mut self.group_title, &parent.group_title);
    }
}

/// One playlist entry: an optional metadata line plus its address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Display name from the metadata line, or the inherited name hint
    pub name: String,
    pub address: String,
    pub attributes: EntryAttributes,
}

impl RawEntry {
    pub fn new<N: Into<String>, A: Into<String>>(name: N, address: A) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            attributes: EntryAttributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: EntryAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Keyword variants for one canonical channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKeywords {
    pub channel: String,
    /// Lower-cased, non-empty variants in table order
    pub variants: Vec<String>,
    pub group: Option<String>,
}

/// Canonical channel names mapped to their keyword variants
///
/// Channel order is the table's row order and decides which channel wins
/// when an entry matches several.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordTable {
    channels: Vec<ChannelKeywords>,
}

impl KeywordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel row; repeated channel names extend the existing row
    ///
    /// Variants are trimmed and lower-cased, blanks and duplicates dropped, and
    /// at most `max_variants` are kept per channel.
    pub fn insert<I, S>(&mut self, channel: &str, variants: I, group: Option<String>, max_variants: usize)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let channel = channel.trim();
        if channel.is_empty() {
            return;
        }

        let index = match self.channels.iter().position(|c| c.channel == channel) {
            Some(index) => index,
            None => {
                self.channels.push(ChannelKeywords {
                    channel: channel.to_string(),
                    variants: Vec::new(),
                    group: None,
                });
                self.channels.len() - 1
            }
        };

        let entry = &mut self.channels[index];
        if entry.group.is_none() {
            entry.group = group.filter(|g| !g.trim().is_empty());
        }
        for variant in variants {
            let variant = variant.as_ref().trim().to_lowercase();
            if variant.is_empty() || entry.variants.contains(&variant) {
                continue;
            }
            if entry.variants.len() >= max_variants {
                break;
            }
            entry.variants.push(variant);
        }
    }

    pub fn channels(&self) -> &[ChannelKeywords] {
        &self.channels
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelKeywords> {
        self.channels.iter().find(|c| c.channel == channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// A stream address proposed for validation under one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub channel: String,
    pub address: String,
    /// Metadata of the entry the candidate came from
    pub attributes: EntryAttributes,
}

impl Candidate {
    pub fn new<C: Into<String>, A: Into<String>>(channel: C, address: A) -> Self {
        Self {
            channel: channel.into(),
            address: address.into(),
            attributes: EntryAttributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: EntryAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Outcome {
    Valid,
    Invalid,
}

/// Which validation pass produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ProbePass {
    First,
    Second,
}

/// Final verdict for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub candidate: Candidate,
    pub outcome: Outcome,
    /// Why the candidate is invalid; `None` when valid
    pub failure: Option<ProbeFailure>,
    pub elapsed: Duration,
    pub pass: ProbePass,
}

impl ValidationResult {
    pub fn valid(candidate: Candidate, elapsed: Duration, pass: ProbePass) -> Self {
        Self {
            candidate,
            outcome: Outcome::Valid,
            failure: None,
            elapsed,
            pass,
        }
    }

    pub fn invalid(candidate: Candidate, failure: ProbeFailure, elapsed: Duration, pass: ProbePass) -> Self {
        Self {
            candidate,
            outcome: Outcome::Invalid,
            failure: Some(failure),
            elapsed,
            pass,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.outcome == Outcome::Valid
    }
}

/// A recovered source failure, kept for the validation log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIssue {
    /// Top-level source the failure was found under
    pub source: String,
    pub error: SourceError,
}
