use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod replay;
mod simulate;
mod trace;

use config::Config;

#[derive(Parser)]
#[command(name = "livecheck", version, about = "Challenge-response liveness verification")]
struct Cli {
    /// TOML configuration file; `LIVECHECK_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded landmark trace (JSON lines) through the verifier.
    Replay {
        trace: PathBuf,
        /// Seed for the challenge order; use the seed the trace was recorded with.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Drive the verifier with a synthetic subject.
    Simulate {
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = 1000)]
        max_frames: usize,
        /// Write the generated frames to a trace file.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Present a flat, motionless photo instead of a live subject.
        #[arg(long)]
        photo: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { trace, seed } => replay::run(&config, &trace, seed).await,
        Commands::Simulate {
            seed,
            max_frames,
            output,
            photo,
        } => {
            simulate::run(
                &config,
                simulate::SimulateOptions {
                    seed,
                    max_frames,
                    output,
                    photo,
                },
            )
            .await
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
