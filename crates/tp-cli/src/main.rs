// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

mod commands;
mod inputs;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "tutopanda", version, about = "Incremental narrated-video builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path of the tool configuration file.
    #[arg(long, default_value = tp_config::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the storage root and write the configuration file.
    Init {
        /// Directory all movie state will live under.
        #[arg(long, default_value = "movies")]
        storage_root: PathBuf,

        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Produce or refresh a movie.
    Generate {
        /// Movie to generate.
        #[arg(long)]
        movie_id: Option<String>,

        /// Reuse the movie id of the last successful generate.
        #[arg(long)]
        last: bool,

        /// Input values file (TOML, YAML, or JSON key -> value).
        #[arg(long)]
        inputs: Option<PathBuf>,

        /// Root blueprint document.
        #[arg(long)]
        blueprint: PathBuf,

        /// Plan only; do not execute producers.
        #[arg(long)]
        dry_run: bool,

        /// Producer invocations in flight per layer.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Stop after this layer (inclusive).
        #[arg(long)]
        up_to_layer: Option<usize>,

        /// Environment tag for producer variant selection.
        #[arg(long)]
        environment: Option<String>,
    },

    /// Remove a movie's data after confirmation.
    Clean {
        /// Movie to remove.
        #[arg(long)]
        movie_id: String,

        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Init {
            storage_root,
            force,
        } => commands::init(&cli.config, &storage_root, force).map(|()| 0),
        Commands::Generate {
            movie_id,
            last,
            inputs,
            blueprint,
            dry_run,
            concurrency,
            up_to_layer,
            environment,
        } => {
            commands::generate(
                &cli.config,
                commands::GenerateArgs {
                    movie_id,
                    last,
                    inputs,
                    blueprint,
                    dry_run,
                    concurrency,
                    up_to_layer,
                    environment,
                },
            )
            .await
        }
        Commands::Clean { movie_id, yes } => commands::clean(&cli.config, &movie_id, yes).map(|()| 0),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    }
}
