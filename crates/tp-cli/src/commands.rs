// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations.

use crate::inputs::parse_inputs_file;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tp_config::TutopandaConfig;
use tp_core::SystemClock;
use tp_events::FileEventLog;
use tp_manifest::{ManifestError, ManifestService};
use tp_planner::{PlanRequest, Planner};
use tp_runner::{
    ANY, CancellationToken, EchoProducer, ProducerRegistry, RunOptions, RunStatus, RunnerContext,
    execute,
};
use tp_store::{FileLockManager, LocalBlobStore};
use tracing::{info, warn};

/// Create the storage root and write the configuration file.
pub fn init(config_path: &Path, storage_root: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "configuration already exists at {}; pass --force to overwrite",
            config_path.display()
        );
    }
    std::fs::create_dir_all(storage_root)
        .with_context(|| format!("create storage root {}", storage_root.display()))?;
    let config = TutopandaConfig::new(storage_root);
    config.save(config_path)?;
    println!(
        "initialized: storage root {} ({})",
        storage_root.display(),
        config_path.display()
    );
    Ok(())
}

/// Options of the `generate` verb.
pub struct GenerateArgs {
    /// Movie to generate.
    pub movie_id: Option<String>,
    /// Reuse the last generated movie id.
    pub last: bool,
    /// Inputs file path.
    pub inputs: Option<PathBuf>,
    /// Root blueprint path.
    pub blueprint: PathBuf,
    /// Plan only.
    pub dry_run: bool,
    /// Concurrency override.
    pub concurrency: Option<usize>,
    /// Layer limit.
    pub up_to_layer: Option<usize>,
    /// Producer environment tag.
    pub environment: Option<String>,
}

/// Produce or refresh a movie. Returns the process exit code.
pub async fn generate(config_path: &Path, args: GenerateArgs) -> Result<i32> {
    let mut config = TutopandaConfig::load(config_path)?;
    let movie = resolve_movie_id(&args, &config)?;

    // Load, compile, normalize.
    let tree = tp_blueprint::load_blueprint(&args.blueprint)?;
    let graph = tp_blueprint::compile(&tree, args.environment.as_deref())?;
    let source_map = tp_blueprint::input_source_map(&graph)?;
    let raw_values = match &args.inputs {
        Some(path) => parse_inputs_file(path)?,
        None => BTreeMap::new(),
    };
    let mut values = tp_blueprint::normalize_input_values(&raw_values, &source_map);
    tp_blueprint::seed_defaults(&mut values, &graph, &source_map);
    tp_blueprint::ensure_required(&values, &graph, &source_map)?;

    let producer_graph = tp_graph::project(tp_graph::ProjectionArgs {
        graph: &graph,
        input_values: &values,
        source_map: &source_map,
    })?;

    // Storage backends rooted at the configured directory.
    let store = Arc::new(LocalBlobStore::new(&config.storage_root));
    let events = Arc::new(FileEventLog::new(&config.storage_root));
    let locks = Arc::new(FileLockManager::new(&config.storage_root));
    let clock = Arc::new(SystemClock);
    let manifests = ManifestService::new(store.clone(), clock.clone());

    let current = match manifests.load_current(&movie) {
        Ok((manifest, hash)) => Some((manifest, hash)),
        Err(ManifestError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    let planner = Planner::new(store.clone(), events.clone(), locks, clock.clone());
    let outcome = planner.generate_plan(PlanRequest {
        movie: &movie,
        manifest: current.as_ref().map(|(m, _)| m),
        manifest_hash: current.as_ref().map(|(_, h)| h.as_str()),
        producer_graph: &producer_graph,
        input_values: &values,
        artefact_drafts: Vec::new(),
    })?;

    println!(
        "plan {}: {} layer(s), {} job(s), {} changed input(s)",
        outcome.plan.revision,
        outcome.plan.layers.len(),
        outcome.plan.job_count(),
        outcome.changed_inputs.len()
    );
    for (i, layer) in outcome.plan.layers.iter().enumerate() {
        let ids: Vec<&str> = layer.iter().map(|j| j.job_id.as_str()).collect();
        println!("  layer {i}: {}", ids.join(", "));
    }

    if args.dry_run {
        println!("dry run; producers not invoked");
        return Ok(0);
    }
    if outcome.plan.is_empty() {
        println!("up to date; nothing to run");
        return Ok(0);
    }

    // Provider adapters are external collaborators; the echo producer
    // stands in for whatever is not registered.
    let mut registry = ProducerRegistry::new();
    registry.register(ANY, ANY, ANY, EchoProducer);

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(target: "tutopanda", "interrupt received; finishing in-flight jobs");
            ctrl_c_token.cancel();
        }
    });

    let ctx = RunnerContext {
        movie: movie.clone(),
        store: store.clone(),
        events: events.clone(),
        registry: Arc::new(registry),
        clock: clock.clone(),
        environment: args.environment.clone(),
        base_manifest: current.as_ref().map(|(m, _)| m.clone()),
    };
    let opts = RunOptions {
        concurrency: args.concurrency.unwrap_or(config.default_concurrency),
        up_to_layer: args.up_to_layer,
        cancel,
        ..RunOptions::default()
    };
    let result = execute(&outcome.plan, &ctx, &opts).await?;

    let manifest = result.build_manifest(&manifests, events.as_ref())?;
    let written = manifests.write_current(&movie, &manifest)?;
    info!(
        target: "tutopanda",
        movie = %movie,
        revision = %manifest.revision,
        hash = %written.hash,
        "manifest committed"
    );
    println!(
        "run {}: {:?}, manifest {} ({} artefacts)",
        result.revision,
        result.status,
        written.path,
        manifest.artefacts.len()
    );

    match result.status {
        RunStatus::Succeeded => {
            config.last_movie_id = Some(movie);
            config.save(config_path)?;
            Ok(0)
        }
        RunStatus::Failed => Ok(1),
    }
}

/// Remove a movie's data after confirmation.
pub fn clean(config_path: &Path, movie_id: &str, yes: bool) -> Result<()> {
    let config = TutopandaConfig::load(config_path)?;
    let movie_dir = config.storage_root.join(movie_id);
    if !movie_dir.is_dir() {
        bail!("no data for movie {movie_id} at {}", movie_dir.display());
    }
    if !yes && !confirm(&format!("remove all data for movie {movie_id}?"))? {
        println!("aborted");
        return Ok(());
    }
    std::fs::remove_dir_all(&movie_dir)
        .with_context(|| format!("remove {}", movie_dir.display()))?;
    println!("removed {}", movie_dir.display());
    Ok(())
}

fn resolve_movie_id(args: &GenerateArgs, config: &TutopandaConfig) -> Result<String> {
    match (&args.movie_id, args.last) {
        (Some(_), true) => bail!("--movie-id and --last are mutually exclusive"),
        (Some(id), false) => Ok(id.clone()),
        (None, true) => config
            .last_movie_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--last given but no movie has been generated yet")),
        (None, false) => bail!("one of --movie-id or --last is required"),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
