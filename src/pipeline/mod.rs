//! The dependency graph of every artifact a [`Config`] asks for.
//!
//! Planning instantiates one subtree of steps per (sample, alphabet) pair. Every derived path
//! is a pure function of the stage and the ids involved:
//!
//! | Stage                 | Primary output                                   |
//! |-----------------------|--------------------------------------------------|
//! | `index`               | `{reference}.fasta.bwt`                          |
//! | `align`               | `{sample}.sam`                                   |
//! | `sort-index`          | `{sample}.sorted.bam`                            |
//! | `expand-reference`    | `{reference}.{alphabet}.fasta`                   |
//! | `expand-model`        | `{seed}.{alphabet}.fofn`                         |
//! | `train`               | `{sample}.{alphabet}.trained.fofn`               |
//! | `score`               | `{sample}.{alphabet}.heldout.summary.tsv`        |
//! | `call`                | `{sample}.{alphabet}.sites.tsv`                  |
//! | `aggregate`           | `{sample}.{alphabet}.{regions}.summary.tsv`      |
//! | `tss-profile`         | `{sample}.{alphabet}.{regions}.tss_profile.tsv`  |
//! | `bisulfite-aggregate` | `{bisulfite}.bisulfite.{regions}.summary.tsv`    |
//! | `compare`             | `{sample}.{alphabet}.{bisulfite}.{regions}.comparison.tsv` |
//! | `evaluate`            | `evaluation.{alphabet}.{unmethylated}.{methylated}.roc.tsv` |
//! | `training-report`     | `training.{alphabet}.tsv`                        |

pub mod step;

#[doc(inline)]
pub use step::{manifest_of, Recipe, Stage, Step};

use crate::alphabet::Alphabet;
use crate::config::{Config, Control, ReferenceRegistry, RegionKind, Sample, Tools};
use crate::model::{model_paths, read_manifest};
use crate::tools::{Job, Staging, Task};
use crate::training::TrainedSample;

use color_eyre::eyre::{eyre, ContextCompat, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::debug;
use nanometh_graph::{Dag, NodeIndex, ToDot};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tabled::Table;

/// Every artifact, the steps that build them, and the dependencies between them.
#[derive(Clone, Debug)]
pub struct Pipeline {
    /// Absolute directory derived artifacts are published to.
    pub work_dir: PathBuf,
    pub threads: usize,
    pub workers: usize,
    pub tools: Tools,
    dag: Dag<String>,
    steps: HashMap<String, Step>,
    /// Artifact name of the step writing each path.
    owners: HashMap<PathBuf, String>,
}

impl Pipeline {
    /// Plan every artifact of a [`Config`].
    ///
    /// The config is validated first, and every sample must be bound to a declared reference.
    pub fn plan(config: &Config) -> Result<Pipeline, Report> {
        config.validate()?;
        let registry = config.registry()?;

        let mut work_dir = config.resolve_path(&config.work_dir);
        if work_dir.is_relative() {
            work_dir = std::env::current_dir()?.join(work_dir);
        }

        let mut pipeline = Pipeline {
            work_dir,
            threads: config.threads,
            workers: config.workers,
            tools: config.tools.clone(),
            dag: Dag::new(),
            steps: HashMap::new(),
            owners: HashMap::new(),
        };

        // trained models can be used by samples declared before the trained sample
        for sample in &config.samples {
            pipeline.plan_training(config, &registry, sample)?;
        }
        for sample in &config.samples {
            pipeline.plan_calling(config, &registry, sample)?;
        }
        pipeline.plan_bisulfite(config)?;
        pipeline.plan_evaluations(config)?;
        pipeline.plan_training_reports(config)?;

        debug!("Planned {} artifacts, {} targets.", pipeline.dag.len(), pipeline.targets().len());
        Ok(pipeline)
    }

    // ------------------------------------------------------------------------
    // Planning

    fn artifact(&self, file_name: String) -> PathBuf {
        self.work_dir.join(file_name)
    }

    /// Add a step and its inputs, in declaration order, returning the step's name.
    ///
    /// Steps shared between subtrees (ex. a reference index) are added once. Two different
    /// steps claiming the same name or the same output path are an error.
    fn add(&mut self, step: Step, inputs: &[&str]) -> Result<String, Report> {
        let name = step.name.clone();
        if let Some(existing) = self.steps.get(&name) {
            if existing != &step {
                return Err(eyre!(
                    "Artifact {name} is planned by two different steps: {} and {}",
                    existing.stage,
                    step.stage
                ))
                .suggestion("Rename the region, bisulfite or sample id that repeats a stage suffix.");
            }
            return Ok(name);
        }
        if let Some(input) = inputs.iter().find(|input| !self.dag.contains(&input.to_string())) {
            return Err(eyre!("Artifact {name} depends on {input}, which is not planned."));
        }
        for output in step.outputs() {
            if let Some(owner) = self.owners.get(output) {
                return Err(eyre!("{output:?} is written by both {owner} and {name}"))
                    .suggestion("Rename the region, bisulfite or sample id that repeats a stage suffix.");
            }
        }
        for output in step.outputs() {
            self.owners.insert(output.to_path_buf(), name.clone());
        }
        self.dag.add_node(name.clone());
        for input in inputs {
            self.dag.add_edge(input.to_string(), name.clone())?;
        }
        self.steps.insert(name.clone(), step);
        Ok(name)
    }

    fn add_source(&mut self, path: &Path) -> Result<String, Report> {
        self.add(Step::source(path), &[])
    }

    fn seed_paths(&self, config: &Config, sample: &Sample) -> Result<(PathBuf, usize), Report> {
        let seed = config
            .seed_models
            .get(&sample.seed)
            .wrap_err_with(|| format!("Sample {} uses undeclared seed models {}.", sample.id, sample.seed))?;
        let seed = config.resolve_path(seed);
        let count = read_manifest(&seed)
            .wrap_err_with(|| format!("Failed to read seed models {} of sample {}", sample.seed, sample.id))?
            .len();
        Ok((seed, count))
    }

    fn expanded_reference_name(reference: &str, alphabet: Alphabet) -> String {
        format!("{reference}.{alphabet}.fasta")
    }

    fn expanded_model_name(seed: &str, alphabet: Alphabet) -> String {
        format!("{seed}.{alphabet}.fofn")
    }

    fn trained_name(sample: &str, alphabet: Alphabet) -> String {
        format!("{sample}.{alphabet}.trained.fofn")
    }

    fn sites_name(sample: &str, alphabet: Alphabet) -> String {
        format!("{sample}.{alphabet}.sites.tsv")
    }

    fn summary_name(sample: &str, alphabet: Alphabet, regions: &str) -> String {
        format!("{sample}.{alphabet}.{regions}.summary.tsv")
    }

    /// Index, alignment, alphabet expansion and training of one sample.
    fn plan_training(&mut self, config: &Config, registry: &ReferenceRegistry, sample: &Sample) -> Result<(), Report> {
        let reference_id = registry.reference_of(&sample.id)?;
        let reference_path = registry.path_of(reference_id)?.to_path_buf();
        let reference = self.add_source(&reference_path)?;
        let reads = self.add_source(&config.resolve_path(&sample.reads))?;

        // index
        let prefix = self.artifact(format!("{reference_id}.fasta"));
        let index_file = |ext: &str| self.artifact(format!("{reference_id}.fasta.{ext}"));
        let companions = ["amb", "ann", "pac", "sa"].iter().map(|ext| index_file(ext)).collect_vec();
        let recipe = Recipe::Index { reference: reference_path.clone(), prefix: prefix.clone() };
        let step = Step::derived(Stage::IndexReference, index_file("bwt"), companions, recipe);
        let index = self.add(step, &[&reference])?;

        // align, sort and index
        let sam = self.artifact(format!("{}.sam", sample.id));
        let recipe = Recipe::Align { prefix, reads: config.resolve_path(&sample.reads), output: sam.clone() };
        let align = self.add(Step::derived(Stage::Align, sam.clone(), Vec::new(), recipe), &[&index, &reads])?;

        let bam = self.artifact(format!("{}.sorted.bam", sample.id));
        let bai = self.artifact(format!("{}.sorted.bam.bai", sample.id));
        let recipe = Recipe::SortIndex { sam, output: bam.clone() };
        let sorted = self.add(Step::derived(Stage::SortIndex, bam.clone(), vec![bai], recipe), &[&align])?;

        let (seed_path, count) = self.seed_paths(config, sample)?;
        let seed = self.add_source(&seed_path)?;

        for alphabet in config.alphabets_of(sample) {
            let expanded_reference = self.artifact(Self::expanded_reference_name(reference_id, alphabet));
            let task = Task::ExpandReference {
                input: reference_path.clone(),
                alphabet,
                output: expanded_reference.clone(),
            };
            let step = Step::derived(Stage::ExpandReference, expanded_reference.clone(), Vec::new(), Recipe::Task(task));
            let expanded_reference_name = self.add(step, &[&reference])?;

            let expanded_model = self.artifact(Self::expanded_model_name(&sample.seed, alphabet));
            let task = Task::ExpandModel { seed: seed_path.clone(), alphabet, output: expanded_model.clone() };
            let companions = model_paths(&expanded_model, count);
            let step = Step::derived(Stage::ExpandModel, expanded_model.clone(), companions, Recipe::Task(task));
            let expanded_model_name = self.add(step, &[&seed])?;

            if !sample.train {
                continue;
            }
            let prefix = self.artifact(format!("{}.{alphabet}.trained", sample.id));
            let manifest = manifest_of(&prefix);
            let mut companions = model_paths(&manifest, count);
            companions.push(self.artifact(format!("{}.{alphabet}.trained.summary.tsv", sample.id)));
            let recipe = Recipe::Train {
                reads: config.resolve_path(&sample.reads),
                bam: bam.clone(),
                reference: expanded_reference,
                models: expanded_model,
                region: sample.region.clone(),
                prefix,
                count,
                no_update: false,
            };
            let step = Step::derived(Stage::Train, manifest, companions, recipe);
            self.add(step, &[&reads, &sorted, &expanded_reference_name, &expanded_model_name])?;
        }

        Ok(())
    }

    /// Held-out scoring, calling and region summaries of one sample.
    fn plan_calling(&mut self, config: &Config, registry: &ReferenceRegistry, sample: &Sample) -> Result<(), Report> {
        let reference_id = registry.reference_of(&sample.id)?;
        let reads_path = config.resolve_path(&sample.reads);
        let reads = reads_path.to_string_lossy().into_owned();
        let bam = self.artifact(format!("{}.sorted.bam", sample.id));
        let sorted = format!("{}.sorted.bam", sample.id);
        let (_, count) = self.seed_paths(config, sample)?;

        for alphabet in config.alphabets_of(sample) {
            let expanded_reference = Self::expanded_reference_name(reference_id, alphabet);
            let models = match (&sample.models_from, sample.train) {
                (Some(source), _) => Self::trained_name(source, alphabet),
                (None, true) => Self::trained_name(&sample.id, alphabet),
                (None, false) => Self::expanded_model_name(&sample.seed, alphabet),
            };
            if !self.steps.contains_key(&models) {
                return Err(eyre!(
                    "Sample {} takes models from {}, which are not trained in the {alphabet} alphabet.",
                    sample.id,
                    sample.models_from.as_deref().unwrap_or(&sample.id)
                ));
            }
            let models_path = self.artifact(models.clone());

            let held_out = !sample.train
                && sample.control == Some(Control::Unmethylated)
                && config.evaluations.iter().any(|e| e.unmethylated == sample.id && e.alphabet == alphabet);
            if held_out {
                let prefix = self.artifact(format!("{}.{alphabet}.heldout", sample.id));
                let output = self.artifact(format!("{}.{alphabet}.heldout.summary.tsv", sample.id));
                let recipe = Recipe::Train {
                    reads: reads_path.clone(),
                    bam: bam.clone(),
                    reference: self.artifact(expanded_reference.clone()),
                    models: models_path.clone(),
                    region: sample.region.clone(),
                    prefix,
                    count,
                    no_update: true,
                };
                let step = Step::derived(Stage::Score, output, Vec::new(), recipe);
                self.add(step, &[&reads, &sorted, &expanded_reference, &models])?;
            }

            if !alphabet.is_methylation_aware() {
                continue;
            }
            let view = |name: &str| self.artifact(format!("{}.{alphabet}.{name}.tsv", sample.id));
            let (sites, raw, reads_view, strands_view) = (view("sites"), view("calls"), view("reads"), view("strands"));
            let recipe = Recipe::Call {
                reads: reads_path.clone(),
                bam: bam.clone(),
                reference: self.artifact(expanded_reference.clone()),
                models: models_path,
                region: sample.region.clone(),
                threshold: config.call_threshold,
                raw: raw.clone(),
                sites: sites.clone(),
                reads_view: reads_view.clone(),
                strands_view: strands_view.clone(),
            };
            let step = Step::derived(Stage::Call, sites.clone(), vec![raw, reads_view, strands_view], recipe);
            let calls = self.add(step, &[&sorted, &expanded_reference, &models, &reads])?;

            for (id, set) in &config.regions {
                let bed_path = config.resolve_path(&set.path);
                let bed = self.add_source(&bed_path)?;

                let output = self.artifact(Self::summary_name(&sample.id, alphabet, id));
                let task = Task::Aggregate {
                    sites: sites.clone(),
                    regions: bed_path.clone(),
                    threshold: config.call_threshold,
                    output: output.clone(),
                };
                self.add(Step::derived(Stage::Aggregate, output, Vec::new(), Recipe::Task(task)), &[&calls, &bed])?;

                let Some(options) = config.tss_profile.as_ref().filter(|_| set.kind == RegionKind::Tss) else {
                    continue;
                };
                let output = self.artifact(format!("{}.{alphabet}.{id}.tss_profile.tsv", sample.id));
                let task = Task::TssProfile {
                    sites: sites.clone(),
                    tss: bed_path,
                    bin_width: options.bin_width,
                    max_distance: options.max_distance,
                    threshold: config.call_threshold,
                    output: output.clone(),
                };
                self.add(Step::derived(Stage::TssProfile, output, Vec::new(), Recipe::Task(task)), &[&calls, &bed])?;
            }
        }

        Ok(())
    }

    /// Bisulfite summaries per region set, and their comparison with nanopore summaries.
    fn plan_bisulfite(&mut self, config: &Config) -> Result<(), Report> {
        for (bisulfite_id, set) in &config.bisulfite {
            let coverage_path = config.resolve_path(&set.path);
            let coverage = self.add_source(&coverage_path)?;
            let sample = config.sample(&set.sample)?;

            for (regions_id, regions) in &config.regions {
                let bed_path = config.resolve_path(&regions.path);
                let bed = self.add_source(&bed_path)?;

                let output = self.artifact(format!("{bisulfite_id}.bisulfite.{regions_id}.summary.tsv"));
                let task = Task::BisulfiteAggregate {
                    coverage: coverage_path.clone(),
                    regions: bed_path,
                    output: output.clone(),
                };
                let step = Step::derived(Stage::BisulfiteAggregate, output.clone(), Vec::new(), Recipe::Task(task));
                let bisulfite_summary = self.add(step, &[&coverage, &bed])?;

                for alphabet in config.alphabets_of(sample).into_iter().filter(Alphabet::is_methylation_aware) {
                    let nanopore = Self::summary_name(&sample.id, alphabet, regions_id);
                    let comparison = self.artifact(format!(
                        "{}.{alphabet}.{bisulfite_id}.{regions_id}.comparison.tsv",
                        sample.id
                    ));
                    let task = Task::Compare {
                        nanopore: self.artifact(nanopore.clone()),
                        bisulfite: output.clone(),
                        output: comparison.clone(),
                    };
                    let step = Step::derived(Stage::Compare, comparison, Vec::new(), Recipe::Task(task));
                    self.add(step, &[&nanopore, &bisulfite_summary])?;
                }
            }
        }
        Ok(())
    }

    fn plan_evaluations(&mut self, config: &Config) -> Result<(), Report> {
        for evaluation in &config.evaluations {
            let (alphabet, unmethylated, methylated) =
                (evaluation.alphabet, &evaluation.unmethylated, &evaluation.methylated);
            let prefix = format!("evaluation.{alphabet}.{unmethylated}.{methylated}");
            let table = |name: &str| self.artifact(format!("{prefix}.{name}.tsv"));
            let (roc, pr, kmers) = (table("roc"), table("pr"), table("kmers"));

            let negatives = Self::sites_name(unmethylated, alphabet);
            let positives = Self::sites_name(methylated, alphabet);
            let task = Task::Evaluate {
                unmethylated: self.artifact(negatives.clone()),
                methylated: self.artifact(positives.clone()),
                threshold: config.call_threshold,
                roc: roc.clone(),
                pr: pr.clone(),
                kmers: kmers.clone(),
            };
            let step = Step::derived(Stage::Evaluate, roc, vec![pr, kmers], Recipe::Task(task));
            self.add(step, &[&negatives, &positives])?;
        }
        Ok(())
    }

    /// One training report per alphabet any sample is trained in.
    fn plan_training_reports(&mut self, config: &Config) -> Result<(), Report> {
        let trained = config.samples.iter().filter(|sample| sample.train).collect_vec();
        let alphabets: BTreeSet<Alphabet> =
            trained.iter().flat_map(|sample| config.alphabets_of(sample)).collect();

        for alphabet in alphabets {
            let mut samples = Vec::new();
            let mut inputs = Vec::new();
            for sample in trained.iter().filter(|s| config.alphabets_of(s).contains(&alphabet)) {
                let models = Self::trained_name(&sample.id, alphabet);
                let seed = Self::expanded_model_name(&sample.seed, alphabet);
                samples.push(TrainedSample {
                    sample: sample.id.clone(),
                    control: sample.control,
                    alphabet,
                    summary: self.artifact(format!("{}.{alphabet}.trained.summary.tsv", sample.id)),
                    seed: self.artifact(seed.clone()),
                });
                inputs.extend([models, seed]);
            }
            let output = self.artifact(format!("training.{alphabet}.tsv"));
            let task = Task::TrainingReport { samples, output: output.clone() };
            let step = Step::derived(Stage::TrainingReport, output, Vec::new(), Recipe::Task(task));
            let inputs = inputs.iter().map(String::as_str).unique().collect_vec();
            self.add(step, &inputs)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries

    pub fn dag(&self) -> &Dag<String> {
        &self.dag
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, name: &str) -> Result<&Step, Report> {
        self.steps.get(name).wrap_err_with(|| format!("Unknown artifact: {name}"))
    }

    pub fn step_at(&self, node_index: NodeIndex) -> Result<&Step, Report> {
        let name = self.dag.get_node(&node_index)?;
        self.step(name)
    }

    /// Returns the direct inputs of an artifact, in declaration order.
    pub fn inputs(&self, name: &str) -> Result<Vec<&Step>, Report> {
        self.dag.get_inputs(&name.to_string())?.into_iter().map(|input| self.step(input)).collect()
    }

    /// Returns the derived artifacts nothing else depends on, in planning order.
    pub fn targets(&self) -> Vec<String> {
        self.dag
            .graph
            .node_indices()
            .filter(|i| self.dag.get_dependent_indices(*i).is_empty())
            .filter_map(|i| self.step_at(i).ok())
            .filter(|step| !step.is_source())
            .map(|step| step.name.clone())
            .collect()
    }

    /// Returns the job that builds an artifact into `staging`.
    pub fn job(&self, name: &str, staging: &Staging) -> Result<Job, Report> {
        let step = self.step(name)?;
        Ok(Job {
            target: step.name.clone(),
            stage: step.stage,
            work_dir: self.work_dir.clone(),
            actions: step.recipe.actions(&self.tools, self.threads, staging),
            outputs: step.outputs().iter().map(|output| staging.path(output)).collect(),
        })
    }

    /// Returns a table of every artifact with its stage and inputs, inputs first.
    pub fn to_table(&self) -> Result<Table, Report> {
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(vec!["artifact", "stage", "inputs"]);
        for node_index in self.dag.topological_order()? {
            let step = self.step_at(node_index)?;
            let inputs = self.inputs(&step.name)?.iter().map(|input| &input.name).join(", ");
            builder.push_record(vec![step.name.clone(), step.stage.to_string(), inputs]);
        }
        Ok(builder.build())
    }

    /// Returns the dependency graph in Graphviz dot format.
    pub fn to_dot(&self) -> Result<String, Report> {
        self.dag.to_dot()
    }
}

#[cfg(test)]
pub(crate) mod tests;
