//! Refrakt CLI - Command-line front end for the Refrakt job engine
//!
//! This CLI provides an `rfk` command that turns a natural-language request
//! into a training configuration, runs the trainer against it and reports the
//! resulting job.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

use commands::{check_model, run};

/// Refrakt CLI - Prompt-driven training jobs
#[derive(Parser, Debug)]
#[command(
    name = "rfk",
    author,
    version,
    about = "Refrakt - prompt-driven training jobs",
    long_about = "Refrakt (rfk) generates a training configuration from a natural-language request,\nlaunches the trainer, streams its output and collects the results into ./jobs/<job-id>/."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Settings file (defaults to ./refrakt.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a configuration from a prompt and train with it
    Run {
        /// What to train, in plain language
        prompt: String,

        /// Caller identifier recorded on the job
        #[arg(long, default_value = "anonymous")]
        user_id: String,

        /// Don't echo trainer output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Train with an existing configuration file
    Exec {
        /// Path to a YAML configuration
        config_file: PathBuf,

        /// Caller identifier recorded on the job
        #[arg(long, default_value = "anonymous")]
        user_id: String,

        /// Don't echo trainer output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Check that the generation model is reachable
    CheckModel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries trainer output and the job record.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = config::load_settings(args.config.as_deref())?;

    let succeeded = match args.command {
        Command::Run { prompt, user_id, quiet } => run::execute_prompt(&settings, prompt, user_id, quiet).await?,
        Command::Exec { config_file, user_id, quiet } => {
            run::execute_file(&settings, &config_file, user_id, quiet).await?
        }
        Command::CheckModel => check_model::execute(&settings).await?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
