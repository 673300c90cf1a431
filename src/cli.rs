//! CLI argument definitions and command implementations using clap.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::core::clock::SystemClock;
use crate::core::config::ExtractorConfig;
use crate::core::dispatcher::{Dispatcher, ExtractTask};
use crate::core::pool::KeyPool;
use crate::core::prompt::build_extraction_prompt;
use crate::error::{AbexError, Result};

/// Resilient multi-credential extraction dispatcher.
#[derive(Parser, Debug)]
#[command(name = "abex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Config file path (defaults to the platform config dir)
    #[arg(long, value_name = "PATH", env = "ABEX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract a structured record from an abstract
    Extract(ExtractArgs),

    /// Show credential fingerprints and pool health
    Keys(KeysArgs),
}

/// Arguments for the `extract` command.
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// File holding the abstract text (reads stdin when omitted)
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Original title, pinned into the record verbatim
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,

    /// Pretty-print the JSON record
    #[arg(long)]
    pub pretty: bool,
}

/// Arguments for the `keys` command.
#[derive(Parser, Debug)]
pub struct KeysArgs {
    /// Emit statistics as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Resolve the config file, falling back to the platform default path.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no path resolves or the file is
    /// missing or invalid.
    pub fn load_config(&self) -> Result<ExtractorConfig> {
        let path = self
            .config
            .clone()
            .or_else(ExtractorConfig::default_path)
            .ok_or_else(|| AbexError::ConfigNotFound {
                path: "no config path resolved; pass --config".to_string(),
            })?;
        ExtractorConfig::load(&path)
    }
}

/// Run the `extract` command.
///
/// # Errors
///
/// Fails on configuration or input I/O problems. Provider failures never
/// surface here; they degrade to the review-sentinel record.
pub async fn run_extract(config: &ExtractorConfig, args: &ExtractArgs) -> Result<()> {
    let abstract_text = match &args.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => std::io::read_to_string(std::io::stdin())?,
    };

    let mut task = ExtractTask::new(String::new());
    if let Some(title) = &args.title {
        task = task.with_title(title);
    }

    // Nothing to extract from: skip the network entirely.
    let record = if abstract_text.trim().is_empty() {
        task.fallback_record()
    } else {
        task.prompt = build_extraction_prompt(&abstract_text, args.title.as_deref());
        let dispatcher = Dispatcher::new(config, Arc::new(SystemClock))?;
        dispatcher.extract(&task).await
    };

    let json = record.to_json();
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };
    println!("{rendered}");
    Ok(())
}

/// Run the `keys` command.
///
/// # Errors
///
/// Fails on configuration problems.
pub fn run_keys(config: &ExtractorConfig, args: &KeysArgs) -> Result<()> {
    let pool = KeyPool::new(
        config.api_keys.clone(),
        config.pool.clone(),
        Arc::new(SystemClock),
    )?;
    let stats = pool.statistics();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{:<8} {:<18} {:<9} {:>9} {:>10} {:>6}", "id", "fingerprint", "disabled", "attempts", "successes", "rate");
    for s in &stats {
        println!(
            "{:<8} {:<18} {:<9} {:>9} {:>10} {:>5.0}%",
            s.id,
            s.fingerprint,
            s.disabled,
            s.total_attempts,
            s.total_successes,
            s.success_rate() * 100.0
        );
    }
    Ok(())
}
