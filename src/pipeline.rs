//! Single batch run: load inputs, resolve sources, match candidates, validate,
//! select and write the outputs.
//!
//! Everything that can stop a run (unreadable inputs, invalid settings, an
//! unusable ffprobe) is checked before the first network request. After that
//! only a failure to write the outputs is fatal.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::models::{KeywordTable, Source};
use crate::playlist::{render_entries, write_atomic};
use crate::selection::{self, ChannelSelection, RunSummary};
use crate::sources::loader::{load_keywords, load_sources, scan_playlist_dirs};
use crate::sources::{CandidateFilter, DocumentFetcher, PlaylistFetcher, PlaylistResolver};
use crate::utils::human_format::format_duration;
use crate::validation::validator::LivenessValidator;
use crate::validation::{StreamProbe, TieredProbe};

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run with the network fetcher and the configured probe
    pub async fn run(&self) -> AppResult<RunSummary> {
        self.config.validate()?;

        let keywords = self.load_keywords()?;
        let sources = self.load_sources()?;

        let probe = Arc::new(TieredProbe::from_config(&self.config.validation).await?);
        let fetcher = Arc::new(DocumentFetcher::new(&self.config.resolver)?);

        self.execute(sources, keywords, fetcher, probe).await
    }

    /// Load and check the keyword table
    pub fn load_keywords(&self) -> AppResult<KeywordTable> {
        let keywords = load_keywords(&self.config.inputs.keywords, self.config.keywords.max_variants)?;
        if keywords.is_empty() {
            return Err(AppError::configuration(format!(
                "keyword table {} defines no channels",
                self.config.inputs.keywords.display()
            )));
        }
        Ok(keywords)
    }

    /// Load the source list plus any playlist files found in the configured directories
    pub fn load_sources(&self) -> AppResult<Vec<Source>> {
        let mut sources = load_sources(&self.config.inputs.sources)?;

        if !self.config.inputs.playlist_dirs.is_empty() {
            let local = scan_playlist_dirs(
                &self.config.inputs.playlist_dirs,
                &self.config.resolver.nested_extensions,
            );
            info!("Found {} local playlist files", local.len());
            sources.extend(local);
        }

        if sources.is_empty() {
            return Err(AppError::configuration(format!(
                "no playlist sources in {}",
                self.config.inputs.sources.display()
            )));
        }
        Ok(sources)
    }

    /// Run the stages with the given fetcher and probe
    pub async fn execute<F, P>(
        &self,
        sources: Vec<Source>,
        keywords: KeywordTable,
        fetcher: Arc<F>,
        probe: Arc<P>,
    ) -> AppResult<RunSummary>
    where
        F: PlaylistFetcher,
        P: StreamProbe + 'static,
    {
        let started = Instant::now();
        let config = &self.config;

        let resolver = PlaylistResolver::new(fetcher, &config.resolver);
        let resolution = resolver.resolve_all(&sources).await;
        if resolution.sources_failed == resolution.sources_total && resolution.sources_total > 0 {
            warn!("No source could be read, the playlist will be empty");
        }

        let filter = CandidateFilter::new(&keywords, config.filter.max_candidates_per_channel);
        let (candidates, stats) = filter.filter(resolution.entries);
        if stats.matched == 0 && stats.entries > 0 {
            warn!("None of {} entries matched a channel keyword", stats.entries);
        }
        let candidate_count = candidates.len();

        let shared = ChannelSelection::shared(config.selection.max_per_channel);
        let validator = LivenessValidator::new(probe, &config.validation);
        let results = validator.validate(candidates, &shared).await;

        let selection = {
            let guard = shared.lock().await;
            guard.clone()
        };
        let retained = selection.total_retained();
        let channel_count = selection.channel_count();
        let channels = selection.into_sorted();

        let (valid, invalid) = selection::tally(&results);
        let summary = RunSummary {
            candidates: candidate_count,
            valid,
            invalid,
            retained,
            channels: channel_count,
            sources: resolution.sources_total,
            failed_sources: resolution.sources_failed,
        };

        let playlist = render_entries(&selection::build_playlist_entries(&channels, &keywords));
        let log = selection::render_validation_log(&results, &resolution.issues, &summary);

        write_atomic(&config.output.playlist, playlist).await?;
        write_atomic(&config.output.validation_log, log).await?;

        for (channel, retained) in &channels {
            info!("  {}: {} streams", channel, retained.len());
        }
        let missing: Vec<&str> = keywords
            .channels()
            .iter()
            .map(|c| c.channel.as_str())
            .filter(|c| !channels.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            info!("{} channels without a live stream: {}", missing.len(), missing.join(", "));
        }

        info!(
            "Run complete in {}: {} channels, {} streams retained, {} of {} candidates valid ({} of {} sources failed)",
            format_duration(started.elapsed()),
            summary.channels,
            summary.retained,
            summary.valid,
            summary.candidates,
            summary.failed_sources,
            summary.sources
        );
        Ok(summary)
    }
}
