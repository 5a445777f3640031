//! CLI for the plan critic.
//!
//! Subcommands:
//!  - `train`   : train and calibrate a classifier from logged dialogues and
//!    write a timestamped artifact.
//!  - `decide`  : run the stop/continue gate for one dialogue snapshot.
//!  - `inspect` : print an artifact's metadata and training metrics.
//!
//! Usage examples:
//!  plan-critic train --train json/critic_dataset_train.json --valid json/critic_dataset_valid.json
//!  plan-critic decide --model-dir models --record snapshot.json --turn-count 2
//!
//! `decide` treats an unavailable model as a normal condition: the failure is
//! reported on stderr and the turn-limit fallback picks the outcome instead.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::warn;

use plan_critic::gate::Outcome;
use plan_critic::{
    decide, latest_artifact, load_artifact, load_dataset, save_artifact, utils::logging,
    ClassifierArtifact, ConversationRecord, CriticConfig, CriticError, Trainer,
};

/// CLI entrypoint.
#[derive(Parser)]
#[command(
    name = "plan-critic",
    about = "Plan critic CLI: train the sufficiency classifier and run its stop gate",
    version
)]
struct Cli {
    /// Log level for plan-critic output (RUST_LOG takes precedence).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// TOML configuration file. Command-line flags override its values.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a classifier and save a timestamped artifact.
    Train(TrainArgs),

    /// Decide whether a dialogue snapshot has enough context to stop.
    Decide(DecideArgs),

    /// Show metadata and metrics of a saved artifact.
    Inspect(InspectArgs),
}

/// Arguments for the `train` subcommand.
#[derive(Args, Debug)]
struct TrainArgs {
    /// Training records (.json array or .jsonl).
    #[arg(long, value_name = "PATH")]
    train: PathBuf,

    /// Validation records. May be missing or empty, in which case both pools
    /// are merged and re-split.
    #[arg(long, value_name = "PATH")]
    valid: PathBuf,

    /// Directory the artifact is written to (default: config `model_dir`).
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Validation fraction used when re-splitting.
    #[arg(long)]
    test_size: Option<f64>,

    /// Seed for the stratified split.
    #[arg(long)]
    seed: Option<u64>,

    /// Always merge and re-split the two collections.
    #[arg(long)]
    resplit: bool,

    /// Output the summary as JSON to stdout.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `decide` subcommand.
#[derive(Args, Debug)]
struct DecideArgs {
    /// Artifact file to score with.
    #[arg(long, value_name = "PATH", conflicts_with = "model_dir")]
    model: Option<PathBuf>,

    /// Use the newest artifact in this directory (default: config `model_dir`).
    #[arg(long, value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// JSON file holding one dialogue snapshot.
    #[arg(long, value_name = "PATH")]
    record: PathBuf,

    /// Clarifying turns taken so far.
    #[arg(long)]
    turn_count: usize,

    /// Floor applied to the trained threshold (default 0.60).
    #[arg(long)]
    min_threshold: Option<f64>,

    /// Confidence margin above the threshold (default 0.15).
    #[arg(long)]
    margin: Option<f64>,

    /// Replace the effective threshold entirely.
    #[arg(long)]
    force_threshold: Option<f64>,

    /// Turn limit used when no model is available (default 4).
    #[arg(long)]
    fallback_max_turns: Option<usize>,

    /// Output the decision as JSON to stdout.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
struct InspectArgs {
    /// Artifact file to inspect.
    #[arg(long, value_name = "PATH")]
    model: PathBuf,

    /// Output as JSON.
    #[arg(long)]
    json: bool,
}

/// Application entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Train(args) => run_train(args, config),
        Commands::Decide(args) => run_decide(args, config),
        Commands::Inspect(args) => run_inspect(args),
    }
}

fn load_config(path: Option<&Path>) -> Result<CriticConfig> {
    match path {
        Some(p) => CriticConfig::from_file(p)
            .with_context(|| format!("loading config from {}", p.display())),
        None => Ok(CriticConfig::default()),
    }
}

/// Run the `train` subcommand.
fn run_train(args: TrainArgs, mut config: CriticConfig) -> Result<()> {
    if let Some(t) = args.test_size {
        config.trainer.test_size = t;
    }
    if let Some(s) = args.seed {
        config.trainer.random_seed = s;
    }
    if args.resplit {
        config.trainer.always_resplit = true;
    }
    if let Some(dir) = args.out_dir {
        config.model_dir = dir;
    }
    config.validate().context("validating configuration")?;

    let train = load_dataset(&args.train)
        .with_context(|| format!("loading training records from {}", args.train.display()))?;
    let valid = load_dataset(&args.valid)
        .with_context(|| format!("loading validation records from {}", args.valid.display()))?;

    let artifact = Trainer::new(config.trainer.clone())
        .train(&train, &valid)
        .context("training classifier")?;
    let path = save_artifact(&artifact, &config.model_dir)
        .with_context(|| format!("saving artifact to {}", config.model_dir.display()))?;

    let m = &artifact.metrics;
    if args.json {
        let out = json!({
            "artifact": path.display().to_string(),
            "threshold": artifact.threshold,
            "valid_f1": m.valid_f1,
            "calibration_fallback": m.calibration_fallback,
            "train_size": m.train_size,
            "valid_size": m.valid_size,
            "resplit": m.resplit,
            "vocabulary_size": m.vocabulary_size,
            "converged": m.converged,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "Trained on {} records (validated on {}{}).",
            m.train_size,
            m.valid_size,
            if m.resplit { ", re-split" } else { "" }
        );
        println!(
            "Best threshold ≈ {:.3}  (valid F1={:.3}){}",
            artifact.threshold,
            m.valid_f1,
            if m.calibration_fallback {
                "  [fallback: no positive validation examples]"
            } else {
                ""
            }
        );
        println!("{}", m.report_calibrated);
        println!("Saved artifact to {}", path.display());
    }
    Ok(())
}

/// Run the `decide` subcommand.
fn run_decide(args: DecideArgs, mut config: CriticConfig) -> Result<()> {
    if let Some(v) = args.min_threshold {
        config.gate.min_threshold_floor = v;
    }
    if let Some(v) = args.margin {
        config.gate.margin = v;
    }
    if args.force_threshold.is_some() {
        config.gate.force_threshold = args.force_threshold;
    }
    if let Some(v) = args.fallback_max_turns {
        config.fallback.max_turns = v;
    }
    if let Some(dir) = args.model_dir {
        config.model_dir = dir;
    }
    config.validate().context("validating configuration")?;

    let raw = fs::read_to_string(&args.record)
        .with_context(|| format!("reading record from {}", args.record.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing record JSON in {}", args.record.display()))?;
    let record = ConversationRecord::from_value(&value);

    let decided = resolve_model(args.model.as_deref(), &config.model_dir)
        .and_then(|artifact| decide(&artifact, &record, args.turn_count, &config.gate));

    match decided {
        Ok(d) => {
            if args.json {
                let out = json!({
                    "outcome": d.outcome,
                    "probability": d.probability,
                    "effective_threshold": d.effective_threshold,
                    "fallback": false,
                    "context": d.context,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!(
                    "outcome={} probability={:.3} effective_threshold={:.3}",
                    d.outcome.as_str(),
                    d.probability,
                    d.effective_threshold
                );
            }
            Ok(())
        }
        Err(e) if e.is_model_unavailable() => {
            let outcome = config.fallback.decide(args.turn_count);
            warn!(
                error = %e,
                max_turns = config.fallback.max_turns,
                "model unavailable; applying turn-limit fallback"
            );
            print_fallback(outcome, args.turn_count, config.fallback.max_turns, &e, args.json)
        }
        Err(e) => Err(e).context("running decision gate"),
    }
}

fn resolve_model(model: Option<&Path>, model_dir: &Path) -> plan_critic::Result<ClassifierArtifact> {
    let path = match model {
        Some(p) => p.to_path_buf(),
        None => latest_artifact(model_dir)?.ok_or_else(|| CriticError::ModelUnavailable {
            location: model_dir.display().to_string(),
            reason: "no artifact found".to_string(),
        })?,
    };
    load_artifact(&path)
}

fn print_fallback(
    outcome: Outcome,
    turn_count: usize,
    max_turns: usize,
    error: &CriticError,
    as_json: bool,
) -> Result<()> {
    if as_json {
        let out = json!({
            "outcome": outcome,
            "fallback": true,
            "turn_count": turn_count,
            "max_turns": max_turns,
            "error": error.to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "outcome={} fallback=turn-limit turn_count={} max_turns={}",
            outcome.as_str(),
            turn_count,
            max_turns
        );
    }
    Ok(())
}

/// Run the `inspect` subcommand.
fn run_inspect(args: InspectArgs) -> Result<()> {
    let artifact = load_artifact(&args.model)
        .with_context(|| format!("loading artifact from {}", args.model.display()))?;
    let m = &artifact.metrics;

    if args.json {
        let out = json!({
            "path": args.model.display().to_string(),
            "format_version": artifact.format_version,
            "created_at": artifact.created_at.to_rfc3339(),
            "threshold": artifact.threshold,
            "metrics": m,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("artifact={}", args.model.display());
        println!("format_version={}", artifact.format_version);
        println!("created_at={}", artifact.created_at.to_rfc3339());
        println!("threshold={:.4}", artifact.threshold);
        println!(
            "train_size={} valid_size={} resplit={}",
            m.train_size, m.valid_size, m.resplit
        );
        println!(
            "vocabulary_size={} iterations={} converged={}",
            m.vocabulary_size, m.iterations, m.converged
        );
        println!("\nValidation report at calibrated threshold:\n{}", m.report_calibrated);
        println!("\nValidation report at 0.5:\n{}", m.report_default);
    }
    Ok(())
}
