//! Somnia CLI - Sleep Mix Composer
//!
//! Command-line interface for the Somnia mix engine.

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use somnia::cli::{commands, Cli, Commands};
use somnia::SomniaError;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still wins over the default filter
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Somnia v{}", env!("CARGO_PKG_VERSION"));

    let outcome = match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Somnia v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    };

    if let Err(err) = &outcome {
        if let Some(somnia_err) = err.downcast_ref::<SomniaError>() {
            error!("[{}] {}", somnia_err.error_code(), somnia_err);
            for hint in somnia_err.recovery_suggestions() {
                eprintln!("  hint: {}", hint);
            }
        }
    }
    outcome
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Mix {
            input,
            output,
            duration,
            bit_depth,
            profile,
        } => commands::mix(&input, &output, duration, bit_depth, &profile),
        Commands::Preview {
            input,
            output,
            seconds,
            profile,
        } => commands::preview(&input, &output, seconds, &profile),
        Commands::Profile { profile } => commands::profile(&profile),
        Commands::Protocol { name, duration } => commands::protocol(&name, duration),
    }
}
