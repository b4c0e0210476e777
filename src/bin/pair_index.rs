//! Pair Index - rebuilds a pairing index from a session's capture log
//!
//! Usage:
//!   pair-index captures/<session>/
//!   pair-index captures/<session>/captures.jsonl --ratio 5 --tail strict
//!
//! The index is written next to the capture log as `pairs.json` unless
//! `--output` is given.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use paired_capture::infra::logging::init_logging;
use paired_capture::infra::{AerialSelection, Config, TailPolicy};
use paired_capture::io::capture_log::CAPTURE_LOG_FILE;
use paired_capture::io::read_capture_log;
use paired_capture::services::pairing::PAIRS_FILE;
use paired_capture::services::ImagePairIndexer;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TailArg {
    Truncate,
    Strict,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SelectionArg {
    All,
    Strided,
}

/// Pair Index - aerial/ground pairing for a recorded session
#[derive(Parser, Debug)]
#[command(name = "pair-index", version, about, long_about = None)]
struct Args {
    /// Session directory or capture log file
    input: PathBuf,

    /// TOML configuration supplying pairing defaults (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Ground frames per aerial frame (defaults to pairing.ratio)
    #[arg(short, long)]
    ratio: Option<usize>,

    /// Short final block handling (defaults to pairing.tail)
    #[arg(long, value_enum)]
    tail: Option<TailArg>,

    /// Which aerial frames receive a block (defaults to pairing.aerial_selection)
    #[arg(long, value_enum)]
    selection: Option<SelectionArg>,

    /// Output file for the index
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[])));

    let log_path = if args.input.is_dir() { args.input.join(CAPTURE_LOG_FILE) } else { args.input.clone() };
    let output = args.output.clone().unwrap_or_else(|| match log_path.parent() {
        Some(dir) => dir.join(PAIRS_FILE),
        None => PathBuf::from(PAIRS_FILE),
    });

    let tail = match args.tail {
        Some(TailArg::Truncate) => TailPolicy::Truncate,
        Some(TailArg::Strict) => TailPolicy::Strict,
        None => config.tail_policy(),
    };
    let selection = match args.selection {
        Some(SelectionArg::All) => AerialSelection::All,
        Some(SelectionArg::Strided) => AerialSelection::Strided,
        None => config.aerial_selection(),
    };
    let ratio = args.ratio.unwrap_or_else(|| config.ratio());

    let events = read_capture_log(&log_path).with_context(|| format!("Failed to read {}", log_path.display()))?;
    info!(capture_log = %log_path.display(), events = events.len(), ratio = ratio, "capture_log_loaded");

    let index = ImagePairIndexer::new(ratio)?.with_tail(tail).with_selection(selection).build(&events)?;
    index.write_json(&output)?;

    info!(output = %output.display(), entries = index.len(), "pair-index complete");
    Ok(())
}
