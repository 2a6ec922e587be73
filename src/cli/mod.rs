//! CLI Module
//!
//! Command-line interface for the Somnia mix engine.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::mix::DEFAULT_PREVIEW_MS;

/// Somnia - long-duration sleep mix composer
#[derive(Parser, Debug)]
#[command(name = "somnia")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Profile selection shared by every command that resolves a profile
#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    /// Base profile: sleep, focus, relax, or any custom name
    #[arg(short, long, default_value = "sleep")]
    pub mix_type: String,

    /// JSON file with profile overrides
    #[arg(long)]
    pub overrides: Option<PathBuf>,

    /// Single override as key=value; dotted keys reach nested tables
    /// (e.g. category_weights.rain=0.5)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Binaural protocol: optimized_sleep or anxiety_reduction
    #[arg(long)]
    pub protocol: Option<String>,

    /// JSON file with an explicit phase schedule
    #[arg(long)]
    pub schedule: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a mix from a directory of category sub-directories
    #[command(name = "mix")]
    Mix {
        /// Library root; each sub-directory is one category
        #[arg(short, long)]
        input: PathBuf,

        /// Output WAV path (a .json report is written beside it)
        #[arg(short, long)]
        output: PathBuf,

        /// Mix duration in minutes
        #[arg(short, long, default_value_t = 60.0)]
        duration: f64,

        /// Output bit depth: 16, 24 or 32 (float)
        #[arg(long, default_value_t = 16)]
        bit_depth: u16,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Render a short preview
    #[command(name = "preview")]
    Preview {
        /// Library root; each sub-directory is one category
        #[arg(short, long)]
        input: PathBuf,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,

        /// Preview length in seconds
        #[arg(short, long, default_value_t = DEFAULT_PREVIEW_MS / 1000)]
        seconds: u64,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Print a resolved profile as JSON
    #[command(name = "profile")]
    Profile {
        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Print a protocol's schedule as JSON
    #[command(name = "protocol")]
    Protocol {
        /// Protocol name
        name: String,

        /// Total duration in minutes
        #[arg(short, long, default_value_t = 480.0)]
        duration: f64,
    },
}
