//! [Command-line interface](Cli) (CLI) of the main binary.

use crate::alphabet::{expand_reference, Alphabet};
use crate::config::{Config, Control};
use crate::model::expand_model_set;
use crate::pipeline::Pipeline;
use crate::region::aggregate_file;
use crate::resolve::{BuildReport, Resolver};
use crate::tools::ToolRunner;
use crate::training::{summarise, to_markdown, training_report, TrainedSample};
use crate::Verbosity;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// CLI Entry Point
// ----------------------------------------------------------------------------

/// The command-line interface (CLI).
/// ---
/// The CLI is intended for parsing user input from the command-line in the main function.
/// Here is a manual example of setting the command-line input:
/// ```rust
/// # use clap::Parser;
/// let input = ["nanometh", "run", "--config", "pipeline.json", "--workers", "4", "--dry-run"];
/// let args = nanometh::Cli::parse_from(input);
/// serde_json::to_string_pretty(&args)?;
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Debug, Deserialize, Parser, Serialize)]
#[clap(name = "nanometh", author, version)]
#[clap(about = "nanometh trains nanopore methylation models, calls methylation, and summarises it over regions.")]
pub struct Cli {
    #[clap(subcommand)]
    #[clap(help = "Set the command.")]
    pub command: Command,

    /// Set the output [Verbosity] level.
    #[clap(short = 'v', long)]
    #[clap(value_enum, default_value_t = Verbosity::default())]
    #[clap(hide_possible_values = false)]
    #[clap(global = true)]
    #[clap(help = "Set the output verbosity level.")]
    pub verbosity: Verbosity,
}

/// CLI [commands](#variants).
#[derive(Debug, Deserialize, Serialize, Subcommand)]
pub enum Command {
    #[clap(about = "Build the requested artifacts of a pipeline, and everything they depend on.")]
    Run(RunArgs),
    #[clap(about = "Print every artifact of a pipeline with its stage and inputs.")]
    Plan(PlanArgs),
    #[clap(about = "Rewrite a reference into a methylation alphabet.")]
    ExpandReference(ExpandReferenceArgs),
    #[clap(about = "Expand a set of nucleotide models into a methylation alphabet.")]
    ExpandModel(ExpandModelArgs),
    #[clap(about = "Summarise site calls over BED regions.")]
    Aggregate(AggregateArgs),
    #[clap(about = "Evaluate calling accuracy on unmethylated and methylated controls.")]
    Evaluate(EvaluateArgs),
    #[clap(about = "Summarise how far training moved each model away from its seed.")]
    TrainingTable(TrainingTableArgs),
}

// ----------------------------------------------------------------------------
// Pipeline Commands
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Parser, Serialize)]
pub struct RunArgs {
    /// Pipeline config (JSON).
    #[clap(short = 'c', long, required = true)]
    pub config: PathBuf,

    /// Artifact to build, may be repeated. Defaults to every final artifact.
    #[clap(short = 't', long = "target")]
    pub targets: Vec<String>,

    /// Number of artifacts built concurrently.
    #[clap(short = 'w', long)]
    pub workers: Option<usize>,

    /// Number of threads given to each external program.
    #[clap(long)]
    pub threads: Option<usize>,

    /// Log-likelihood ratio threshold of a confident call.
    #[clap(long)]
    pub call_threshold: Option<f64>,

    /// Report what would be built, without building it.
    #[clap(long)]
    pub dry_run: bool,

    /// Show a progress bar.
    #[clap(long)]
    pub progress: bool,
}

/// Read a config, apply the command-line overrides, and resolve the requested artifacts.
pub fn run(args: &RunArgs) -> Result<BuildReport, Report> {
    let mut config = Config::read(&args.config)?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(threshold) = args.call_threshold {
        config.call_threshold = threshold;
    }

    let pipeline = Pipeline::plan(&config)?;
    info!("Planned {} artifacts in {:?}", pipeline.len(), pipeline.work_dir);
    Resolver::new(pipeline, Arc::new(ToolRunner))
        .dry_run(args.dry_run)
        .progress(args.progress)
        .resolve(&args.targets)
}

#[derive(Clone, Debug, Default, Deserialize, Parser, Serialize)]
pub struct PlanArgs {
    /// Pipeline config (JSON).
    #[clap(short = 'c', long, required = true)]
    pub config: PathBuf,

    /// Print the dependency graph in Graphviz dot format instead of a table.
    #[clap(long)]
    pub dot: bool,
}

pub fn plan(args: &PlanArgs) -> Result<String, Report> {
    let config = Config::read(&args.config)?;
    let pipeline = Pipeline::plan(&config)?;
    match args.dot {
        true => pipeline.to_dot(),
        false => {
            let mut table = pipeline.to_table()?;
            table.with(tabled::settings::Style::markdown());
            Ok(table.to_string())
        }
    }
}

// ----------------------------------------------------------------------------
// Stage Commands
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct ExpandReferenceArgs {
    /// Nucleotide reference (FASTA).
    #[clap(short = 'i', long, required = true)]
    pub input: PathBuf,

    #[clap(short = 'a', long, value_enum, default_value_t = Alphabet::Cpg)]
    pub alphabet: Alphabet,

    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,
}

pub fn expand_reference_file(args: &ExpandReferenceArgs) -> Result<(), Report> {
    expand_reference(&args.input, args.alphabet, &args.output)
}

#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct ExpandModelArgs {
    /// Manifest of nucleotide seed models (fofn).
    #[clap(short = 's', long, required = true)]
    pub seed: PathBuf,

    #[clap(short = 'a', long, value_enum, default_value_t = Alphabet::Cpg)]
    pub alphabet: Alphabet,

    /// Output manifest, models are written next to it.
    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,
}

pub fn expand_models(args: &ExpandModelArgs) -> Result<(), Report> {
    let models = expand_model_set(&args.seed, args.alphabet, &args.output)?;
    info!("Expanded {} models into {:?}", models.len(), args.output);
    Ok(())
}

#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct AggregateArgs {
    /// Site calls (TSV).
    #[clap(short = 's', long, required = true)]
    pub sites: PathBuf,

    /// Region annotations (BED).
    #[clap(short = 'r', long, required = true)]
    pub regions: PathBuf,

    #[clap(long, default_value_t = crate::config::DEFAULT_CALL_THRESHOLD)]
    pub threshold: f64,

    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,
}

pub fn aggregate(args: &AggregateArgs) -> Result<(), Report> {
    aggregate_file(&args.sites, &args.regions, args.threshold, &args.output)
}

#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct EvaluateArgs {
    /// Site calls of the unmethylated control (TSV).
    #[clap(short = 'u', long, required = true)]
    pub unmethylated: PathBuf,

    /// Site calls of the methylated control (TSV).
    #[clap(short = 'm', long, required = true)]
    pub methylated: PathBuf,

    #[clap(long, default_value_t = crate::config::DEFAULT_CALL_THRESHOLD)]
    pub threshold: f64,

    /// Output prefix of the `.roc.tsv`, `.pr.tsv` and `.kmers.tsv` tables.
    #[clap(short = 'o', long, required = true)]
    pub prefix: String,
}

/// Returns the area under the ROC curve.
pub fn evaluate(args: &EvaluateArgs) -> Result<f64, Report> {
    let table = |name: &str| PathBuf::from(format!("{}.{name}.tsv", args.prefix));
    crate::evaluate::evaluate_files(
        &args.unmethylated,
        &args.methylated,
        args.threshold,
        &table("roc"),
        &table("pr"),
        &table("kmers"),
    )
}

#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct TrainingTableArgs {
    /// Sample name.
    #[clap(short = 'n', long, required = true)]
    pub sample: String,

    /// Training summary written by the trainer (TSV).
    #[clap(short = 's', long, required = true)]
    pub summary: PathBuf,

    /// Manifest of the models training started from (fofn).
    #[clap(long, required = true)]
    pub seed: PathBuf,

    #[clap(short = 'a', long, value_enum, default_value_t = Alphabet::Cpg)]
    pub alphabet: Alphabet,

    #[clap(long, value_enum)]
    pub control: Option<Control>,

    /// Write the table as TSV instead of printing it as markdown.
    #[clap(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Returns the training table as markdown, or writes it as TSV if an output is given.
pub fn training_table(args: &TrainingTableArgs) -> Result<Option<String>, Report> {
    let sample = TrainedSample {
        sample: args.sample.clone(),
        control: args.control,
        alphabet: args.alphabet,
        summary: args.summary.clone(),
        seed: args.seed.clone(),
    };
    match &args.output {
        Some(output) => {
            training_report(&[sample], output)?;
            Ok(None)
        }
        None => Ok(Some(to_markdown(&summarise(&sample)?))),
    }
}

#[cfg(test)]
mod tests;
