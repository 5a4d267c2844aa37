//! Bounded, two-pass liveness validation
//!
//! Pass one probes every candidate with the first-pass timeouts. Pass two
//! re-probes the still-invalid candidates of channels that have not reached
//! their cap, with the longer second-pass timeouts. Malformed addresses and
//! unsupported schemes are not retried. A second-pass probe is
//! skipped when its channel fills up before the probe starts.
//!
//! Probes run as tokio tasks, at most `workers` at a time. Valid results are
//! offered to the shared [`ChannelSelection`](crate::selection::ChannelSelection)
//! as they complete. A task that dies is reported as an invalid result, so the
//! validator always returns exactly one result per candidate.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::StreamProbe;
use crate::config::{TimeoutProfile, ValidationConfig};
use crate::errors::ProbeFailure;
use crate::models::{Candidate, ProbePass, ValidationResult};
use crate::selection::SharedSelection;
use crate::utils::UrlUtils;
use crate::utils::human_format::{estimate_remaining, format_duration, rate_per_second};

pub struct LivenessValidator<P: StreamProbe + 'static> {
    probe: Arc<P>,
    workers: usize,
    first_pass: TimeoutProfile,
    second_pass: Option<TimeoutProfile>,
    progress_interval: usize,
}

impl<P: StreamProbe + 'static> LivenessValidator<P> {
    pub fn new(probe: Arc<P>, config: &ValidationConfig) -> Self {
        Self {
            probe,
            workers: config.workers.max(1),
            first_pass: config.first_pass_timeouts(),
            second_pass: config.second_pass.then(|| config.second_pass_timeouts()),
            progress_interval: config.progress_interval,
        }
    }

    /// Validate every candidate, offering valid ones to `selection`
    ///
    /// Results are returned in candidate order; each candidate's result is
    /// from the last pass that probed it.
    pub async fn validate(&self, candidates: Vec<Candidate>, selection: &SharedSelection) -> Vec<ValidationResult> {
        let started = Instant::now();
        let total = candidates.len();
        info!(
            "Validating {} candidates with {} workers (timeouts {}/{})",
            total,
            self.workers,
            format_duration(self.first_pass.precheck),
            format_duration(self.first_pass.probe)
        );

        let jobs: Vec<(usize, Candidate)> = candidates.into_iter().enumerate().collect();
        let mut results: Vec<Option<ValidationResult>> = vec![None; total];

        for (idx, result) in self.run_pass(jobs, self.first_pass, ProbePass::First, selection).await {
            results[idx] = result;
        }

        if let Some(timeouts) = self.second_pass {
            let retry = self.second_pass_jobs(&results, selection).await;
            if retry.is_empty() {
                debug!("No channel under quota has failed candidates, skipping second pass");
            } else {
                let channels: HashSet<&str> = retry.iter().map(|(_, c)| c.channel.as_str()).collect();
                info!(
                    "Second pass: re-probing {} candidates for {} channels under quota (timeouts {}/{})",
                    retry.len(),
                    channels.len(),
                    format_duration(timeouts.precheck),
                    format_duration(timeouts.probe)
                );

                for (idx, result) in self.run_pass(retry, timeouts, ProbePass::Second, selection).await {
                    // skipped probes keep their first-pass verdict
                    if result.is_some() {
                        results[idx] = result;
                    }
                }
            }
        }

        let results: Vec<ValidationResult> = results.into_iter().flatten().collect();
        let valid = results.iter().filter(|r| r.is_valid()).count();
        info!(
            "Validation finished in {}: {} valid, {} invalid",
            format_duration(started.elapsed()),
            valid,
            results.len() - valid
        );

        let mut reasons: BTreeMap<&'static str, usize> = BTreeMap::new();
        for failure in results.iter().filter_map(|r| r.failure.as_ref()) {
            *reasons.entry(failure.kind()).or_default() += 1;
        }
        if !reasons.is_empty() {
            let breakdown: Vec<String> = reasons.iter().map(|(kind, n)| format!("{kind}={n}")).collect();
            info!("Failure reasons: {}", breakdown.join(" "));
        }
        results
    }

    /// Invalid candidates whose channel is still below its cap and whose
    /// failure could go away with a longer timeout
    async fn second_pass_jobs(
        &self,
        results: &[Option<ValidationResult>],
        selection: &SharedSelection,
    ) -> Vec<(usize, Candidate)> {
        let selection = selection.lock().await;
        results
            .iter()
            .enumerate()
            .filter_map(|(idx, result)| {
                let result = result.as_ref()?;
                let retryable = result.failure.as_ref().is_some_and(|f| !f.is_permanent());
                (retryable && !selection.is_full(&result.candidate.channel))
                    .then(|| (idx, result.candidate.clone()))
            })
            .collect()
    }

    async fn run_pass(
        &self,
        jobs: Vec<(usize, Candidate)>,
        timeouts: TimeoutProfile,
        pass: ProbePass,
        selection: &SharedSelection,
    ) -> Vec<(usize, Option<ValidationResult>)> {
        let total = jobs.len();
        let started = Instant::now();

        let mut completions = stream::iter(jobs)
            .map(|(idx, candidate)| {
                let probe = Arc::clone(&self.probe);
                let selection = Arc::clone(selection);
                let handle = tokio::spawn(probe_candidate(probe, candidate.clone(), timeouts, pass, selection));

                async move {
                    match handle.await {
                        Ok(result) => (idx, result),
                        Err(e) => {
                            warn!(
                                "Probe task for {} failed: {}",
                                UrlUtils::obfuscate_credentials(&candidate.address),
                                e
                            );
                            let failure = ProbeFailure::Aborted(e.to_string());
                            (idx, Some(ValidationResult::invalid(candidate, failure, Duration::ZERO, pass)))
                        }
                    }
                }
            })
            .buffer_unordered(self.workers);

        let mut out = Vec::with_capacity(total);
        let mut valid = 0usize;
        while let Some((idx, result)) = completions.next().await {
            if result.as_ref().is_some_and(ValidationResult::is_valid) {
                valid += 1;
            }
            out.push((idx, result));
            self.report_progress(pass, out.len(), total, valid, started.elapsed());
        }
        out
    }

    fn report_progress(&self, pass: ProbePass, completed: usize, total: usize, valid: usize, elapsed: Duration) {
        if self.progress_interval == 0 || (completed % self.progress_interval != 0 && completed != total) {
            return;
        }
        let eta = estimate_remaining(completed, total, elapsed)
            .map(format_duration)
            .unwrap_or_else(|| "?".to_string());
        info!(
            "Progress ({} pass): {}/{} ({:.1}%) | {:.1} probes/s | remaining ~{} | valid {}",
            pass,
            completed,
            total,
            completed as f64 * 100.0 / total.max(1) as f64,
            rate_per_second(completed, elapsed),
            eta,
            valid
        );
    }
}

/// Probe one candidate and offer it to the selection when valid
///
/// Returns `None` only for a second-pass probe skipped because the channel
/// is already full.
async fn probe_candidate<P: StreamProbe>(
    probe: Arc<P>,
    candidate: Candidate,
    timeouts: TimeoutProfile,
    pass: ProbePass,
    selection: SharedSelection,
) -> Option<ValidationResult> {
    if pass == ProbePass::Second && selection.lock().await.is_full(&candidate.channel) {
        debug!("Channel '{}' filled up, skipping retry", candidate.channel);
        return None;
    }

    let started = Instant::now();
    let outcome = probe.probe(&candidate.address, timeouts).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(()) => {
            let retained = selection.lock().await.offer(&candidate);
            debug!(
                "VALID {} -> {} in {} ({})",
                candidate.channel,
                UrlUtils::obfuscate_credentials(&candidate.address),
                format_duration(elapsed),
                if retained { "retained" } else { "channel full" }
            );
            Some(ValidationResult::valid(candidate, elapsed, pass))
        }
        Err(failure) => {
            debug!(
                "INVALID {} -> {} in {}: {}",
                candidate.channel,
                UrlUtils::obfuscate_credentials(&candidate.address),
                format_duration(elapsed),
                failure
            );
            Some(ValidationResult::invalid(candidate, failure, elapsed, pass))
        }
    }
}
