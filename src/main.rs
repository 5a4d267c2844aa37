use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3u_curator::{Config, Pipeline, config::ProbeMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "m3u-curator")]
#[command(version)]
#[command(about = "Aggregates M3U sources, validates streams and writes a curated playlist")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (default: m3u-curator.toml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source list (CSV with a url column, or one address per line)
    #[arg(short, long, value_name = "FILE")]
    sources: Option<PathBuf>,

    /// Channel keyword table
    #[arg(short, long, value_name = "FILE")]
    keywords: Option<PathBuf>,

    /// Directory scanned recursively for local playlists (repeatable)
    #[arg(long = "playlist-dir", value_name = "DIR")]
    playlist_dirs: Vec<PathBuf>,

    /// Output playlist path
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Validation log path
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Maximum validated streams kept per channel
    #[arg(long, value_name = "N")]
    max_per_channel: Option<usize>,

    /// Concurrent probes
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Tier 2 probe method
    #[arg(long, value_name = "METHOD")]
    method: Option<ProbeMethod>,

    /// Skip re-probing failed candidates of channels under quota
    #[arg(long)]
    no_second_pass: bool,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(sources) = self.sources {
            config.inputs.sources = sources;
        }
        if let Some(keywords) = self.keywords {
            config.inputs.keywords = keywords;
        }
        if !self.playlist_dirs.is_empty() {
            config.inputs.playlist_dirs = self.playlist_dirs;
        }
        if let Some(output) = self.output {
            config.output.playlist = output;
        }
        if let Some(log_file) = self.log_file {
            config.output.validation_log = log_file;
        }
        if let Some(max) = self.max_per_channel {
            config.selection.max_per_channel = max;
        }
        if let Some(workers) = self.workers {
            config.validation.workers = workers;
        }
        if let Some(method) = self.method {
            config.validation.method = method;
        }
        if self.no_second_pass {
            config.validation.second_pass = false;
        }
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    let log_filter = format!("m3u_curator={level}");
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    match format {
        LogFormat::Text => registry.with(layer).init(),
        LogFormat::Json => registry.with(layer.json()).init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let summary = Pipeline::new(config).run().await?;
    info!("{}", summary);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    info!("Starting m3u-curator v{}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
