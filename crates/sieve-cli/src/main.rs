//! Sieve - screen research articles against inclusion/exclusion criteria.

mod commands;
mod refman;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sieve")]
#[command(about = "Screen research articles against inclusion/exclusion criteria", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen a file of articles (.ris, .txt, .json, .yaml)
    Screen {
        /// Articles to screen
        input: PathBuf,

        /// Criteria file (YAML or JSON)
        #[arg(short, long)]
        criteria: PathBuf,

        /// Engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Provider priority, comma separated (e.g. "groq,classifier")
        #[arg(long)]
        providers: Option<String>,

        /// Confidence threshold for definite decisions
        #[arg(long)]
        threshold: Option<f64>,

        /// Stop after this many articles
        #[arg(long)]
        max_articles: Option<usize>,
    },

    /// Check a criteria file and print what it contains
    ValidateCriteria {
        path: PathBuf,
    },

    /// Resolve the provider chain and report which providers are usable
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print an example criteria file
    SampleCriteria,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    // Logs go to stderr so the JSON report on stdout stays clean
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Screen {
            input,
            criteria,
            config,
            output,
            providers,
            threshold,
            max_articles,
        } => {
            let options = commands::ScreenOptions {
                input,
                criteria,
                config,
                output,
                providers,
                threshold,
                max_articles,
            };
            commands::screen(options).await
        }
        Commands::ValidateCriteria { path } => commands::validate_criteria(&path),
        Commands::CheckConfig { config } => commands::check_config(config.as_deref()).await,
        Commands::SampleCriteria => {
            print!("{}", sieve_core::SAMPLE_CRITERIA_YAML);
            Ok(())
        }
    }
}
