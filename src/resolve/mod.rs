//! Resolve requested artifacts, rebuilding exactly those that are stale.
//!
//! ## Validity
//!
//! An artifact is rebuilt iff one of its outputs is absent, an input's primary output is newer
//! than its primary output, or an input was rebuilt by this resolver after the artifact was last
//! built. Sources are never built, an absent source fails the run.
//!
//! The decision is taken by the worker while it holds the artifact's lock, so concurrent
//! resolutions sharing a resolver build each stale artifact once.
//!
//! ## Scheduling
//!
//! Artifacts are ranked in depth-first post-order from the targets. Whenever a worker is free,
//! the lowest-ranked artifact whose inputs are resolved is dispatched, so a one-worker run
//! builds artifacts in the same order as a recursive resolution. The first failure stops
//! dispatching, in-flight builds are drained, and the failure is returned.
//!
//! ## Publishing
//!
//! A job writes into a fresh staging directory inside the work directory. Only once the job
//! succeeds and every declared output exists are the outputs renamed into place, companions
//! first and the primary output last. A failed job's staging directory is removed.

use crate::error::BuildError;
use crate::pipeline::{Pipeline, Step};
use crate::tools::{Runner, Staging};

use chrono::{DateTime, Local};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use nanometh_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// File name of the [`BuildReport`] written into the work directory.
pub const BUILD_REPORT: &str = "build-report.json";

// ----------------------------------------------------------------------------
// Build Report
// ----------------------------------------------------------------------------

/// The artifacts a run built, and those it found fresh.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BuildReport {
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
    /// Artifacts built (or with `dry_run`, that would be built), in build order.
    pub built: Vec<String>,
    /// Artifacts that were already valid, including sources.
    pub fresh: Vec<String>,
    pub dry_run: bool,
}

impl BuildReport {
    pub fn read<P>(path: &P) -> Result<BuildReport, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let report = std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read build report: {path:?}"))?;
        serde_json::from_str(&report).wrap_err_with(|| format!("Failed to parse build report: {path:?}"))
    }

    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        let report = serde_json::to_string_pretty(self)?;
        std::fs::write(path, report).wrap_err_with(|| format!("Failed to write build report: {path:?}"))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Outcome {
    Built,
    Fresh,
}

type Locks = Mutex<HashMap<NodeIndex, Arc<Mutex<()>>>>;

/// Order in which a resolver built its artifacts.
#[derive(Debug, Default)]
struct Generations {
    last: u64,
    built: HashMap<NodeIndex, u64>,
}

impl Generations {
    /// Returns the generation an artifact was last built in, 0 if never.
    fn of(&self, node_index: NodeIndex) -> u64 {
        self.built.get(&node_index).copied().unwrap_or_default()
    }

    fn bump(&mut self, node_index: NodeIndex) {
        self.last += 1;
        self.built.insert(node_index, self.last);
    }
}

// ----------------------------------------------------------------------------
// Resolver
// ----------------------------------------------------------------------------

/// Resolves the artifacts of a [`Pipeline`] with a [`Runner`].
pub struct Resolver {
    pipeline: Arc<Pipeline>,
    runner: Arc<dyn Runner>,
    workers: usize,
    dry_run: bool,
    progress: bool,
    /// One lock per artifact, held while deciding whether to build it and building it.
    locks: Arc<Locks>,
    generations: Arc<Mutex<Generations>>,
}

impl Resolver {
    pub fn new(pipeline: Pipeline, runner: Arc<dyn Runner>) -> Self {
        Resolver {
            workers: pipeline.workers.max(1),
            pipeline: Arc::new(pipeline),
            runner,
            dry_run: false,
            progress: false,
            locks: Arc::new(Mutex::new(HashMap::new())),
            generations: Arc::new(Mutex::new(Generations::default())),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Report what would be built, without building it.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Resolve artifacts by name, or every target of the pipeline if `targets` is empty.
    pub fn resolve(&self, targets: &[String]) -> Result<BuildReport, Report> {
        let started = Local::now();
        let targets = match targets.is_empty() {
            true => self.pipeline.targets(),
            false => targets.to_vec(),
        };
        let dag = self.pipeline.dag();
        let target_indices = targets.iter().map(|t| dag.get_node_index(t)).collect::<Result<Vec<_>, _>>()?;

        let order = dag.post_order(&target_indices);
        let rank: HashMap<NodeIndex, usize> = order.iter().enumerate().map(|(r, i)| (*i, r)).collect();
        let mut pending: HashMap<NodeIndex, usize> =
            order.iter().map(|i| (*i, dag.get_input_indices(*i).len())).collect();
        let mut ready: BTreeMap<usize, NodeIndex> =
            order.iter().filter(|i| pending[*i] == 0).map(|i| (rank[i], *i)).collect();
        let mut outcomes: HashMap<NodeIndex, Outcome> = HashMap::new();
        let (mut built, mut fresh) = (Vec::new(), Vec::new());

        let progress_bar = match self.progress {
            true => ProgressBar::new(order.len() as u64),
            false => ProgressBar::hidden(),
        };
        let style = ProgressStyle::with_template("{bar:40} {pos}/{len} ({percent}%) | {msg} | Elapsed: {elapsed_precise}")
            .wrap_err("Failed to create progress bar from template.")?;
        progress_bar.set_style(style);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .wrap_err("Failed to create worker pool.")?;
        let (sender, receiver) = mpsc::channel::<(NodeIndex, Result<Outcome, Report>)>();
        let mut in_flight = 0;
        let mut failure: Option<Report> = None;

        loop {
            while failure.is_none() && in_flight < self.workers {
                let Some((_, node_index)) = ready.pop_first() else { break };
                let step = self.pipeline.step_at(node_index)?;

                // sources and dry runs are resolved without a worker
                let outcome = if step.is_source() {
                    Some(self.check_source(step, node_index, &rank))
                } else if self.dry_run {
                    let rebuilt_input = dag
                        .get_input_indices(node_index)
                        .iter()
                        .any(|i| outcomes.get(i) == Some(&Outcome::Built));
                    Some(is_stale(&self.pipeline, step, rebuilt_input).map(|stale| match stale {
                        true => Outcome::Built,
                        false => Outcome::Fresh,
                    }))
                } else {
                    let (pipeline, runner, locks) = (self.pipeline.clone(), self.runner.clone(), self.locks.clone());
                    let generations = self.generations.clone();
                    let sender = sender.clone();
                    pool.spawn(move || {
                        let result = build(&pipeline, runner.as_ref(), &locks, &generations, node_index);
                        // the receiver outlives every worker
                        let _ = sender.send((node_index, result));
                    });
                    in_flight += 1;
                    None
                };

                match outcome {
                    Some(Ok(outcome)) => {
                        outcomes.insert(node_index, outcome);
                        self.record(step, outcome, &mut built, &mut fresh, &progress_bar);
                        release(node_index, &self.pipeline, &rank, &mut pending, &mut ready);
                    }
                    Some(Err(e)) => failure = Some(e),
                    None => (),
                }
            }

            if in_flight == 0 {
                break;
            }
            let (node_index, result) = receiver.recv().wrap_err("A worker stopped without reporting.")?;
            in_flight -= 1;
            match result {
                Ok(outcome) => {
                    let step = self.pipeline.step_at(node_index)?;
                    outcomes.insert(node_index, outcome);
                    self.record(step, outcome, &mut built, &mut fresh, &progress_bar);
                    release(node_index, &self.pipeline, &rank, &mut pending, &mut ready);
                }
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }
        progress_bar.finish_and_clear();

        if let Some(e) = failure {
            return Err(e);
        }
        if outcomes.len() != order.len() {
            return Err(eyre!("Resolved {} of {} artifacts.", outcomes.len(), order.len()));
        }

        let report = BuildReport { started, finished: Local::now(), built, fresh, dry_run: self.dry_run };
        match self.dry_run {
            true => info!("Dry run: {} artifacts would be built, {} are fresh.", report.built.len(), report.fresh.len()),
            false => {
                info!("Built {} artifacts, {} were fresh.", report.built.len(), report.fresh.len());
                std::fs::create_dir_all(&self.pipeline.work_dir)?;
                report.write(&self.pipeline.work_dir.join(BUILD_REPORT))?;
            }
        }
        Ok(report)
    }

    fn check_source(
        &self,
        step: &Step,
        node_index: NodeIndex,
        rank: &HashMap<NodeIndex, usize>,
    ) -> Result<Outcome, Report> {
        if step.output.exists() {
            return Ok(Outcome::Fresh);
        }
        // blame the first artifact of this run that needs the source
        let target = self
            .pipeline
            .dag()
            .get_dependent_indices(node_index)
            .into_iter()
            .filter_map(|i| rank.get(&i).map(|r| (*r, i)))
            .min()
            .and_then(|(_, i)| self.pipeline.step_at(i).ok())
            .map(|dependent| dependent.name.clone())
            .unwrap_or_else(|| step.name.clone());
        Err(BuildError::InputMissing { target, path: step.output.clone() }.into())
    }

    fn record(
        &self,
        step: &Step,
        outcome: Outcome,
        built: &mut Vec<String>,
        fresh: &mut Vec<String>,
        progress_bar: &ProgressBar,
    ) {
        match (outcome, self.dry_run) {
            (Outcome::Built, false) => info!("Built {} ({})", step.name, step.stage),
            (Outcome::Built, true) => info!("Would build {} ({})", step.name, step.stage),
            (Outcome::Fresh, _) => debug!("Fresh: {}", step.name),
        }
        match outcome {
            Outcome::Built => built.push(step.name.clone()),
            Outcome::Fresh => fresh.push(step.name.clone()),
        }
        progress_bar.set_message(step.name.clone());
        progress_bar.inc(1);
    }
}

/// Mark an artifact as resolved, readying the dependents whose inputs are now all resolved.
fn release(
    node_index: NodeIndex,
    pipeline: &Pipeline,
    rank: &HashMap<NodeIndex, usize>,
    pending: &mut HashMap<NodeIndex, usize>,
    ready: &mut BTreeMap<usize, NodeIndex>,
) {
    for dependent in pipeline.dag().get_dependent_indices(node_index) {
        let Some(count) = pending.get_mut(&dependent) else { continue };
        *count -= 1;
        if *count == 0 {
            ready.insert(rank[&dependent], dependent);
        }
    }
}

fn modified(path: &Path) -> Result<SystemTime, Report> {
    std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .wrap_err_with(|| format!("Failed to read modification time: {path:?}"))
}

/// Returns true if an artifact must be rebuilt.
fn is_stale(pipeline: &Pipeline, step: &Step, rebuilt_input: bool) -> Result<bool, Report> {
    if rebuilt_input {
        return Ok(true);
    }
    if let Some(missing) = step.outputs().into_iter().find(|output| !output.exists()) {
        debug!("{} is missing output {missing:?}", step.name);
        return Ok(true);
    }
    let output_modified = modified(&step.output)?;
    for input in pipeline.inputs(&step.name)? {
        if modified(&input.output)? > output_modified {
            debug!("{} is older than its input {}", step.name, input.name);
            return Ok(true);
        }
    }
    Ok(false)
}

/// Build one artifact if it is stale, on a worker thread.
fn build(
    pipeline: &Pipeline,
    runner: &dyn Runner,
    locks: &Locks,
    generations: &Mutex<Generations>,
    node_index: NodeIndex,
) -> Result<Outcome, Report> {
    let step = pipeline.step_at(node_index)?;
    let lock = {
        let mut locks = locks.lock().map_err(|_| eyre!("Artifact locks are poisoned."))?;
        locks.entry(node_index).or_default().clone()
    };
    let _guard = lock.lock().map_err(|_| eyre!("Lock of {} is poisoned.", step.name))?;

    // decide under the lock, another resolution may have just built it
    let rebuilt_input = {
        let generations = generations.lock().map_err(|_| eyre!("Build generations are poisoned."))?;
        let own = generations.of(node_index);
        pipeline.dag().get_input_indices(node_index).iter().any(|i| generations.of(*i) > own)
    };
    if !is_stale(pipeline, step, rebuilt_input)? {
        return Ok(Outcome::Fresh);
    }

    std::fs::create_dir_all(&pipeline.work_dir)
        .wrap_err_with(|| format!("Failed to create work directory: {:?}", pipeline.work_dir))?;
    let staging_dir = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&pipeline.work_dir)
        .wrap_err("Failed to create staging directory.")?;
    let staging = Staging::new(staging_dir.path());

    let job = pipeline.job(&step.name, &staging)?;
    runner.run(&job)?;
    publish(step, &staging)?;
    generations.lock().map_err(|_| eyre!("Build generations are poisoned."))?.bump(node_index);
    Ok(Outcome::Built)
}

/// Move every staged output into place, the primary output last.
fn publish(step: &Step, staging: &Staging) -> Result<(), Report> {
    let outputs = step.outputs();
    if let Some(missing) = outputs.iter().find(|output| !staging.path(output).exists()) {
        return Err(BuildError::OutputMissing { target: step.name.clone(), path: missing.to_path_buf() }.into());
    }
    for output in outputs {
        std::fs::rename(staging.path(output), output)
            .wrap_err_with(|| format!("Failed to publish {output:?}"))?;
    }
    Ok(())
}
