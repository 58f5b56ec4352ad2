use crate::config::Tools;
use crate::tools::{Action, Invocation, Staging, Task};

use serde::Serialize;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter};

/// The kind of step that produces an artifact.
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    /// A file supplied by the user, never built.
    Source,
    #[serde(rename = "index")]
    #[strum(serialize = "index")]
    IndexReference,
    Align,
    SortIndex,
    ExpandReference,
    ExpandModel,
    Train,
    /// Training without updating the models, for held-out diagnostics.
    Score,
    Call,
    Aggregate,
    BisulfiteAggregate,
    Compare,
    TssProfile,
    Evaluate,
    TrainingReport,
}

/// How an artifact is produced from its inputs.
///
/// Paths are the published paths, outputs are mapped to staged paths by [`Recipe::actions`].
#[derive(Clone, Debug, PartialEq)]
pub enum Recipe {
    Source,
    Index {
        reference: PathBuf,
        /// Index prefix, the index files are `{prefix}.bwt` etc.
        prefix: PathBuf,
    },
    Align {
        prefix: PathBuf,
        reads: PathBuf,
        output: PathBuf,
    },
    SortIndex {
        sam: PathBuf,
        output: PathBuf,
    },
    Train {
        reads: PathBuf,
        bam: PathBuf,
        reference: PathBuf,
        models: PathBuf,
        region: Option<String>,
        /// Output prefix of the models and summary.
        prefix: PathBuf,
        /// Number of models, with `no_update` no manifest is written.
        count: usize,
        no_update: bool,
    },
    Call {
        reads: PathBuf,
        bam: PathBuf,
        reference: PathBuf,
        models: PathBuf,
        region: Option<String>,
        threshold: f64,
        raw: PathBuf,
        sites: PathBuf,
        reads_view: PathBuf,
        strands_view: PathBuf,
    },
    Task(Task),
}

impl Recipe {
    /// Returns the actions that build the artifact into `staging`.
    pub fn actions(&self, tools: &Tools, threads: usize, staging: &Staging) -> Vec<Action> {
        match self {
            Recipe::Source => Vec::new(),
            Recipe::Index { reference, prefix } => vec![Action::Exec(
                Invocation::new(&tools.aligner).arg("index").arg("-p").path(staging.path(prefix)).path(reference),
            )],
            Recipe::Align { prefix, reads, output } => vec![Action::Exec(
                Invocation::new(&tools.aligner)
                    .arg("mem")
                    .arg("-x")
                    .arg(&tools.aligner_mode)
                    .arg("-t")
                    .arg(threads)
                    .path(prefix)
                    .path(reads)
                    .stdout(staging.path(output)),
            )],
            Recipe::SortIndex { sam, output } => {
                let bam = staging.path(output);
                vec![
                    Action::Exec(
                        Invocation::new(&tools.samtools).arg("sort").arg("-@").arg(threads).arg("-o").path(&bam).path(sam),
                    ),
                    Action::Exec(Invocation::new(&tools.samtools).arg("index").path(&bam)),
                ]
            }
            Recipe::Train { reads, bam, reference, models, region, prefix, count, no_update } => {
                let prefix = staging.path(prefix);
                let mut invocation = caller_invocation(tools, "methyltrain", threads, models, bam, reads, reference)
                    .arg("--out-prefix")
                    .path(&prefix);
                if let Some(region) = region {
                    invocation = invocation.arg("-w").arg(region);
                }
                match no_update {
                    true => vec![Action::Exec(invocation.arg("--no-update"))],
                    false => vec![
                        Action::Exec(invocation),
                        Action::Task(Task::WriteManifest { output: manifest_of(&prefix), count: *count }),
                    ],
                }
            }
            Recipe::Call { reads, bam, reference, models, region, threshold, raw, sites, reads_view, strands_view } => {
                let mut invocation = caller_invocation(tools, "call-methylation", threads, models, bam, reads, reference);
                if let Some(region) = region {
                    invocation = invocation.arg("-w").arg(region);
                }
                let invocation = invocation.arg("--threshold").arg(threshold).stdout(staging.path(raw));
                let split = Task::SplitCalls {
                    raw: staging.path(raw),
                    threshold: *threshold,
                    sites: sites.clone(),
                    reads: reads_view.clone(),
                    strands: strands_view.clone(),
                };
                vec![Action::Exec(invocation), Action::Task(split.staged(staging))]
            }
            Recipe::Task(task) => vec![Action::Task(task.staged(staging))],
        }
    }
}

fn caller_invocation(
    tools: &Tools,
    subcommand: &str,
    threads: usize,
    models: &Path,
    bam: &Path,
    reads: &Path,
    reference: &Path,
) -> Invocation {
    Invocation::new(&tools.caller)
        .arg(subcommand)
        .arg("-t")
        .arg(threads)
        .arg("-m")
        .path(models)
        .arg("-b")
        .path(bam)
        .arg("-r")
        .path(reads)
        .arg("-g")
        .path(reference)
}

/// Returns the manifest written next to the models of an output prefix.
pub fn manifest_of(prefix: &Path) -> PathBuf {
    let mut manifest = prefix.as_os_str().to_os_string();
    manifest.push(".fofn");
    PathBuf::from(manifest)
}

/// A node of the pipeline: one artifact and how to build it.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    /// Artifact name, unique within the pipeline.
    pub name: String,
    pub stage: Stage,
    /// The primary output, whose modification time is the artifact's validity record.
    pub output: PathBuf,
    /// Outputs published alongside, and before, the primary output.
    pub companions: Vec<PathBuf>,
    pub recipe: Recipe,
}

impl Step {
    pub fn source<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Step {
            name: path.to_string_lossy().into_owned(),
            stage: Stage::Source,
            output: path,
            companions: Vec::new(),
            recipe: Recipe::Source,
        }
    }

    /// Returns a derived step named after its primary output.
    pub fn derived(stage: Stage, output: PathBuf, companions: Vec<PathBuf>, recipe: Recipe) -> Self {
        let name = output.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Step { name, stage, output, companions, recipe }
    }

    pub fn is_source(&self) -> bool {
        self.stage == Stage::Source
    }

    /// Returns every output, companions first and the primary output last.
    pub fn outputs(&self) -> Vec<&Path> {
        self.companions.iter().map(PathBuf::as_path).chain(std::iter::once(self.output.as_path())).collect()
    }
}
