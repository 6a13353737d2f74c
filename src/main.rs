//! Persistent Cognition CLI
//!
//! Starts a stream of thought against a local OpenAI-compatible server and
//! opens an interactive shell for talking to it.

use clap::Parser;
use crossterm::style::Stylize;
use persistent_cognition::config::{interval_from_secs, FileConfig};
use persistent_cognition::shell::{self, format_farewell};
use persistent_cognition::{CognitionConfig, CognitionSession, OpenAiCompatBackend, SeedDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Persistent Cognition - continuous thinking on a local LLM
#[derive(Parser, Debug)]
#[command(name = "cognition")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the OpenAI-compatible server
    #[arg(long)]
    url: Option<String>,

    /// Directory for session logs
    #[arg(long)]
    log: Option<PathBuf>,

    /// Disable the JSON-lines session log
    #[arg(long)]
    no_log: bool,

    /// Seconds between thoughts; 0 thinks continuously
    #[arg(long)]
    interval: Option<f64>,

    /// Built-in seed template
    #[arg(long)]
    seed: Option<String>,

    /// Seed text given inline
    #[arg(long)]
    custom_seed: Option<String>,

    /// Seed file (`.toml` with body/capabilities, or plain text)
    #[arg(long)]
    seed_file: Option<PathBuf>,

    /// Attach the standard tool preamble to the seed
    #[arg(long)]
    tools: bool,

    /// Nominal context ceiling in characters (reported, never enforced on prompts)
    #[arg(long)]
    max_context: Option<usize>,

    /// Context length that triggers compression, in characters
    #[arg(long)]
    compress_at: Option<usize>,

    /// HTTP request timeout in seconds
    #[arg(long)]
    request_timeout: Option<u64>,

    /// How long an interjection waits for its reply, in seconds
    #[arg(long)]
    reply_timeout: Option<u64>,

    /// Config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let file = load_file_config(&cli)?;
    let config = build_config(&cli, &file)?;
    info!("Connecting to {}", config.api_url);
    let backend = Arc::new(OpenAiCompatBackend::new(
        &config.api_url,
        config.request_timeout,
    )?);

    let seed_text = config.seed.initial_context();
    let session = match CognitionSession::start(config, backend).await {
        Ok(session) => session,
        Err(e) => {
            error!("{}", e);
            eprintln!("Load a model in your local server and start it, then try again.");
            std::process::exit(1);
        }
    };

    let stop = session.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    let rule = "=".repeat(60);
    println!("{rule}\n{}\n{rule}", seed_text.trim().magenta());
    let printer = shell::spawn_event_printer(session.subscribe());

    shell::run_shell(&session).await;

    let status = session.stop().await;
    printer.abort();
    println!("\n{}", format_farewell(&status, session.log_path()));
    Ok(())
}

/// Explicit `--config`, else the default location if present.
fn load_file_config(cli: &Cli) -> anyhow::Result<FileConfig> {
    match cli.config.clone().or_else(FileConfig::default_path) {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Ok(FileConfig::load(&path)?)
        }
        None => Ok(FileConfig::default()),
    }
}

/// Defaults, then the config file, then command-line flags.
fn build_config(cli: &Cli, file: &FileConfig) -> anyhow::Result<CognitionConfig> {
    let mut config = CognitionConfig::default().apply_file(file)?;

    if let Some(url) = &cli.url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(log) = &cli.log {
        config = config.with_log_dir(Some(log.clone()));
    }
    if cli.no_log {
        config = config.with_log_dir(None);
    }
    if let Some(secs) = cli.interval {
        config = config.with_interval(interval_from_secs(secs)?);
    }
    let max_context = cli.max_context.unwrap_or(config.max_context_chars);
    let compress_at = cli.compress_at.unwrap_or(config.compress_at_chars);
    config = config.with_thresholds(max_context, compress_at);
    if let Some(secs) = cli.request_timeout {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = cli.reply_timeout {
        config = config.with_reply_timeout(Duration::from_secs(secs));
    }

    let seed_name = cli
        .seed
        .clone()
        .or_else(|| file.seed.clone())
        .unwrap_or_else(|| "default".to_string());
    let seed_file = cli.seed_file.clone().or_else(|| file.seed_file.clone());
    let tools = cli.tools || file.tools.unwrap_or(false);
    let seed = SeedDescriptor::resolve(
        &seed_name,
        cli.custom_seed.as_deref(),
        seed_file.as_deref(),
        tools,
    )?;
    if let Some(path) = &seed_file {
        info!("Seed file {:?} ({} chars)", path, seed.body.chars().count());
    }

    let config = config.with_seed(seed);
    config.validate()?;
    Ok(config)
}
