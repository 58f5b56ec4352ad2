use crate::alphabet::{expand_reference, Alphabet};
use crate::call::split_calls;
use crate::evaluate::evaluate_files;
use crate::model::{expand_model_set, model_paths, write_manifest};
use crate::pipeline::Stage;
use crate::region::bisulfite::aggregate_bisulfite_file;
use crate::region::compare::compare_files;
use crate::region::tss::tss_profile_file;
use crate::region::aggregate_file;
use crate::tools::Staging;
use crate::training::{training_report, TrainedSample};

use color_eyre::eyre::{Report, Result};
use std::path::PathBuf;

/// A step that runs in-process.
#[derive(Clone, Debug, PartialEq)]
pub enum Task {
    ExpandReference {
        input: PathBuf,
        alphabet: Alphabet,
        output: PathBuf,
    },
    ExpandModel {
        seed: PathBuf,
        alphabet: Alphabet,
        output: PathBuf,
    },
    /// List the models written by the trainer in a manifest.
    WriteManifest {
        output: PathBuf,
        count: usize,
    },
    /// Reduce raw caller output into the site, read and strand views.
    SplitCalls {
        raw: PathBuf,
        threshold: f64,
        sites: PathBuf,
        reads: PathBuf,
        strands: PathBuf,
    },
    Aggregate {
        sites: PathBuf,
        regions: PathBuf,
        threshold: f64,
        output: PathBuf,
    },
    BisulfiteAggregate {
        coverage: PathBuf,
        regions: PathBuf,
        output: PathBuf,
    },
    Compare {
        nanopore: PathBuf,
        bisulfite: PathBuf,
        output: PathBuf,
    },
    TssProfile {
        sites: PathBuf,
        tss: PathBuf,
        bin_width: u64,
        max_distance: u64,
        threshold: f64,
        output: PathBuf,
    },
    Evaluate {
        unmethylated: PathBuf,
        methylated: PathBuf,
        threshold: f64,
        roc: PathBuf,
        pr: PathBuf,
        kmers: PathBuf,
    },
    TrainingReport {
        samples: Vec<TrainedSample>,
        output: PathBuf,
    },
}

impl Task {
    pub fn stage(&self) -> Stage {
        match self {
            Task::ExpandReference { .. } => Stage::ExpandReference,
            Task::ExpandModel { .. } => Stage::ExpandModel,
            Task::WriteManifest { .. } => Stage::Train,
            Task::SplitCalls { .. } => Stage::Call,
            Task::Aggregate { .. } => Stage::Aggregate,
            Task::BisulfiteAggregate { .. } => Stage::BisulfiteAggregate,
            Task::Compare { .. } => Stage::Compare,
            Task::TssProfile { .. } => Stage::TssProfile,
            Task::Evaluate { .. } => Stage::Evaluate,
            Task::TrainingReport { .. } => Stage::TrainingReport,
        }
    }

    /// Returns the task with every output replaced by its staged path.
    pub fn staged(&self, staging: &Staging) -> Task {
        let mut task = self.clone();
        match &mut task {
            Task::ExpandReference { output, .. }
            | Task::ExpandModel { output, .. }
            | Task::WriteManifest { output, .. }
            | Task::Aggregate { output, .. }
            | Task::BisulfiteAggregate { output, .. }
            | Task::Compare { output, .. }
            | Task::TssProfile { output, .. }
            | Task::TrainingReport { output, .. } => *output = staging.path(&output),
            Task::SplitCalls { sites, reads, strands, .. } => {
                *sites = staging.path(&sites);
                *reads = staging.path(&reads);
                *strands = staging.path(&strands);
            }
            Task::Evaluate { roc, pr, kmers, .. } => {
                *roc = staging.path(&roc);
                *pr = staging.path(&pr);
                *kmers = staging.path(&kmers);
            }
        }
        task
    }

    pub fn run(&self) -> Result<(), Report> {
        match self {
            Task::ExpandReference { input, alphabet, output } => expand_reference(input, *alphabet, output),
            Task::ExpandModel { seed, alphabet, output } => expand_model_set(seed, *alphabet, output).map(|_| ()),
            Task::WriteManifest { output, count } => write_manifest(output, &model_paths(output, *count)),
            Task::SplitCalls { raw, threshold, sites, reads, strands } => {
                split_calls(raw, *threshold, sites, reads, strands)
            }
            Task::Aggregate { sites, regions, threshold, output } => {
                aggregate_file(sites, regions, *threshold, output)
            }
            Task::BisulfiteAggregate { coverage, regions, output } => {
                aggregate_bisulfite_file(coverage, regions, output)
            }
            Task::Compare { nanopore, bisulfite, output } => {
                compare_files(nanopore, bisulfite, output).map(|_| ())
            }
            Task::TssProfile { sites, tss, bin_width, max_distance, threshold, output } => {
                tss_profile_file(sites, tss, *bin_width, *max_distance, *threshold, output)
            }
            Task::Evaluate { unmethylated, methylated, threshold, roc, pr, kmers } => {
                evaluate_files(unmethylated, methylated, *threshold, roc, pr, kmers).map(|_| ())
            }
            Task::TrainingReport { samples, output } => training_report(samples, output),
        }
    }
}
