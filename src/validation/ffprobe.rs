//! Tier 2 via an external `ffprobe`
//!
//! The executable is asked for the container format and stream types as
//! JSON. A candidate passes when ffprobe names a format and finds at least
//! one audio or video stream. The process is killed when the timeout fires.

use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::errors::{ProbeFailure, ProbeResult};

/// Time allowed for `ffprobe -version` when checking availability
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed answer of a successful probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfprobeReport {
    pub format_name: String,
    pub video_streams: usize,
    pub audio_streams: usize,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
    error: Option<FfprobeError>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeError {
    code: Option<i64>,
    string: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    command: String,
    user_agent: String,
}

impl FfprobeProbe {
    pub fn new<C: Into<String>, U: Into<String>>(command: C, user_agent: U) -> Self {
        Self {
            command: command.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Whether the executable runs at all
    pub async fn is_available(command: &str) -> bool {
        let mut cmd = Command::new(command);
        cmd.arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(VERSION_CHECK_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!("{} is not runnable: {}", command, e);
                false
            }
            Err(_) => false,
        }
    }

    pub async fn probe(&self, address: &str, timeout: Duration) -> ProbeResult<FfprobeReport> {
        let io_timeout_us = timeout.as_micros().to_string();

        let mut cmd = Command::new(&self.command);
        cmd.args(["-v", "error", "-print_format", "json", "-show_error"])
            .args(["-show_entries", "stream=codec_type:format=format_name"])
            .args(["-rw_timeout", &io_timeout_us]);
        if address.starts_with("http://") || address.starts_with("https://") {
            cmd.args(["-user_agent", &self.user_agent]);
        }
        cmd.arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ProbeFailure::Ffprobe(format!("failed to execute {}: {e}", self.command))),
            Err(_) => return Err(ProbeFailure::Timeout(timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("ffprobe output for {}: {}", address, stdout.trim());

        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("no output").trim().to_string();
            return Err(ProbeFailure::Ffprobe(format!(
                "exit {:?}: {reason}",
                output.status.code()
            )));
        }

        parse_report(&stdout)
    }
}

/// Interpret ffprobe's JSON output
pub fn parse_report(json: &str) -> ProbeResult<FfprobeReport> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| ProbeFailure::Ffprobe(format!("unreadable output: {e}")))?;

    if let Some(error) = parsed.error {
        return Err(ProbeFailure::Ffprobe(format!(
            "{} (code {})",
            error.string.as_deref().unwrap_or("unknown error"),
            error.code.unwrap_or(-1)
        )));
    }

    let count = |kind: &str| {
        parsed
            .streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some(kind))
            .count()
    };
    let video_streams = count("video");
    let audio_streams = count("audio");

    let format_name = parsed
        .format
        .and_then(|f| f.format_name)
        .filter(|name| !name.is_empty())
        .ok_or(ProbeFailure::UnrecognizedFormat)?;

    if video_streams + audio_streams == 0 {
        return Err(ProbeFailure::UnrecognizedFormat);
    }

    Ok(FfprobeReport {
        format_name,
        video_streams,
        audio_streams,
    })
}
