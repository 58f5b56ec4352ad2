//! The declarative pipeline [`Config`], read from JSON.
//!
//! ```json
//! {
//!   "requires": ">=0.1.0",
//!   "work_dir": "work",
//!   "threads": 8,
//!   "workers": 2,
//!   "call_threshold": 2.5,
//!   "references": { "ecoli": "data/ecoli_k12.fasta" },
//!   "alphabets": ["nucleotide", "cpg"],
//!   "seed_models": { "r9": "models/r9.nucleotide.fofn" },
//!   "samples": [
//!     { "id": "ecoli.sssi", "reads": "data/sssi.fasta", "reference": "ecoli", "seed": "r9",
//!       "train": true, "region": "gi|556503834|ref|NC_000913.3|:50000-250000", "control": "methylated" },
//!     { "id": "ecoli.pcr", "reads": "data/pcr.fasta", "reference": "ecoli", "seed": "r9",
//!       "models_from": "ecoli.sssi", "control": "unmethylated" }
//!   ],
//!   "regions": { "cpg-islands": { "path": "data/islands.bed", "kind": "cpg-island" } },
//!   "evaluations": [ { "alphabet": "cpg", "unmethylated": "ecoli.pcr", "methylated": "ecoli.sssi" } ],
//!   "tools": { "aligner": "bwa", "aligner_mode": "ont2d", "samtools": "samtools", "caller": "nanopolish" }
//! }
//! ```

pub mod registry;

#[doc(inline)]
pub use registry::ReferenceRegistry;

use crate::alphabet::Alphabet;

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, warn};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The default log-likelihood ratio threshold, below which (in absolute value) a site is ambiguous.
pub const DEFAULT_CALL_THRESHOLD: f64 = 2.5;

// ----------------------------------------------------------------------------
// Config
// ----------------------------------------------------------------------------

/// A declarative pipeline: inputs, samples, and which summaries to produce.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Optional semantic version requirement on the CLI (ex. ">=0.1.0").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
    /// Directory every derived artifact is written to.
    pub work_dir: PathBuf,
    /// Threads passed to each external tool.
    pub threads: usize,
    /// Number of artifacts built in parallel.
    pub workers: usize,
    /// Log-likelihood ratio threshold for calling a site.
    pub call_threshold: f64,
    /// Reference id to fasta path.
    pub references: BTreeMap<String, PathBuf>,
    /// Alphabets every sample is processed in, unless the sample restricts them.
    pub alphabets: Vec<Alphabet>,
    /// Seed model-set id to manifest path.
    pub seed_models: BTreeMap<String, PathBuf>,
    pub samples: Vec<Sample>,
    /// Region annotation id to BED file.
    pub regions: BTreeMap<String, RegionSet>,
    /// Bisulfite call-set id to coverage file.
    pub bisulfite: BTreeMap<String, BisulfiteSet>,
    pub evaluations: Vec<Evaluation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tss_profile: Option<TssProfileOptions>,
    pub tools: Tools,
    /// Directory relative paths are resolved against, the config file's directory.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Returns a new [`Config`] with no inputs and default settings.
    ///
    /// ```rust
    /// let config = nanometh::Config::new();
    /// assert_eq!(config.call_threshold, 2.5);
    /// assert_eq!(config.workers, 1);
    /// ```
    pub fn new() -> Self {
        Config {
            requires: None,
            work_dir: PathBuf::from("work"),
            threads: 1,
            workers: 1,
            call_threshold: DEFAULT_CALL_THRESHOLD,
            references: BTreeMap::new(),
            alphabets: vec![Alphabet::Cpg],
            seed_models: BTreeMap::new(),
            samples: Vec::new(),
            regions: BTreeMap::new(),
            bisulfite: BTreeMap::new(),
            evaluations: Vec::new(),
            tss_profile: None,
            tools: Tools::default(),
            base_dir: PathBuf::new(),
        }
    }

    /// Read a [`Config`] from a JSON file.
    ///
    /// Relative paths in the file are later resolved against the file's directory.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use nanometh::Config;
    ///
    /// let dir = tempfile::tempdir()?;
    /// let path = dir.path().join("pipeline.json");
    /// Config::new().write(&path)?;
    ///
    /// let config = Config::read(&path)?;
    /// assert_eq!(config.base_dir, dir.path().canonicalize()?);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn read<P>(path: &P) -> Result<Config, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("Failed to open config file: {path:?}."))?;
        let reader = std::io::BufReader::new(file);
        let mut config: Config = serde_json::from_reader(reader)
            .wrap_err_with(|| format!("Failed to deserialize config file: {path:?}."))?;

        let parent = match path.as_ref().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        config.base_dir = parent
            .canonicalize()
            .wrap_err_with(|| format!("Failed to resolve config directory: {parent:?}"))?;
        debug!("Read config {path:?} with {} samples", config.samples.len());

        config.check_version()?;
        Ok(config)
    }

    /// Write a [`Config`] to a JSON file.
    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        let mut file = std::fs::File::create(path)
            .wrap_err_with(|| format!("Failed to create config file: {path:?}"))?;
        let output = serde_json::to_string_pretty(self)
            .wrap_err_with(|| format!("Failed to serialize config: {self:?}"))?;
        file.write_all(format!("{}\n", output).as_bytes())
            .wrap_err_with(|| format!("Failed to write config file: {path:?}"))?;
        Ok(())
    }

    /// Returns an error if the CLI version does not satisfy [`Config::requires`].
    ///
    /// ```rust
    /// let mut config = nanometh::Config::new();
    /// config.requires = Some(">=0.1.0".to_string());
    /// assert!(config.check_version().is_ok());
    /// config.requires = Some(">=99.0.0".to_string());
    /// assert!(config.check_version().is_err());
    /// ```
    pub fn check_version(&self) -> Result<(), Report> {
        let Some(requires) = &self.requires else { return Ok(()) };
        let current_version = Version::parse(env!("CARGO_PKG_VERSION"))?;
        let required_version = VersionReq::parse(requires)
            .wrap_err_with(|| format!("Invalid version requirement: {requires:?}"))?;
        if !required_version.matches(&current_version) {
            return Err(eyre!(
                "CLI version {current_version} does not satisfy the config requirement {required_version}."
            ))
            .suggestion("Install a compatible version of the CLI, or update the config's requires field.");
        }
        Ok(())
    }

    /// Returns `path` resolved against the config's directory.
    pub fn resolve_path<P>(&self, path: &P) -> PathBuf
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        match path.is_absolute() {
            true => path.to_path_buf(),
            false => self.base_dir.join(path),
        }
    }

    /// Returns a sample by id.
    pub fn sample(&self, id: &str) -> Result<&Sample, Report> {
        self.samples
            .iter()
            .find(|sample| sample.id == id)
            .ok_or_else(|| eyre!("Sample {id} is not declared."))
            .suggestion(format!(
                "Declared samples: {}",
                self.samples.iter().map(|s| &s.id).join(", ")
            ))
    }

    /// Returns the alphabets a sample is processed in.
    pub fn alphabets_of(&self, sample: &Sample) -> Vec<Alphabet> {
        match &sample.alphabets {
            Some(alphabets) => alphabets.iter().copied().unique().collect(),
            None => self.alphabets.iter().copied().unique().collect(),
        }
    }

    /// Build the [`ReferenceRegistry`], binding every sample to its reference.
    pub fn registry(&self) -> Result<ReferenceRegistry, Report> {
        let mut registry = ReferenceRegistry::new();
        for (id, path) in &self.references {
            registry.declare(id, self.resolve_path(path))?;
        }
        for sample in &self.samples {
            registry.bind(&sample.id, &sample.reference)?;
        }
        Ok(registry)
    }

    /// Returns an error describing the first inconsistency in the config.
    pub fn validate(&self) -> Result<(), Report> {
        if self.threads == 0 || self.workers == 0 {
            return Err(eyre!("Threads and workers must be at least 1."));
        }
        if !self.call_threshold.is_finite() || self.call_threshold < 0.0 {
            return Err(eyre!("Call threshold must be a non-negative number, found {}.", self.call_threshold));
        }
        if self.alphabets.is_empty() {
            warn!("No alphabets are configured, samples without their own alphabets are skipped.");
        }

        let mut ids = HashSet::new();
        for sample in &self.samples {
            if !ids.insert(sample.id.as_str()) {
                return Err(eyre!("Sample {} is declared more than once.", sample.id));
            }
            if sample.id.is_empty() || sample.id.contains(['/', '\\']) {
                return Err(eyre!("Invalid sample id {:?}, ids become file names.", sample.id));
            }
            if !self.seed_models.contains_key(&sample.seed) {
                return Err(eyre!("Sample {} uses undeclared seed models {}.", sample.id, sample.seed));
            }
        }
        for sample in &self.samples {
            if let Some(source) = &sample.models_from {
                let source = self.sample(source)?;
                if !source.train {
                    return Err(eyre!(
                        "Sample {} takes models from {}, which is not trained.",
                        sample.id,
                        source.id
                    ))
                    .suggestion(format!("Set \"train\": true on sample {}.", source.id));
                }
            }
        }

        for evaluation in &self.evaluations {
            if !evaluation.alphabet.is_methylation_aware() {
                return Err(eyre!("Evaluations need a methylation alphabet, found {}.", evaluation.alphabet));
            }
            for id in [&evaluation.unmethylated, &evaluation.methylated] {
                let sample = self.sample(id)?;
                if !self.alphabets_of(sample).contains(&evaluation.alphabet) {
                    return Err(eyre!("Sample {id} is not processed in the {} alphabet.", evaluation.alphabet));
                }
            }
        }
        // region and bisulfite ids are single dot-separated fields of artifact names
        for id in self.regions.keys().chain(self.bisulfite.keys()) {
            if id.is_empty() || id.contains(['.', '/', '\\']) {
                return Err(eyre!("Invalid region or bisulfite id {id:?}, ids must not contain '.' or '/'."));
            }
        }
        for (id, set) in &self.bisulfite {
            self.sample(&set.sample).wrap_err_with(|| format!("Invalid bisulfite set {id}"))?;
        }
        if let Some(profile) = &self.tss_profile {
            if profile.bin_width == 0 {
                return Err(eyre!("TSS profile bin width must be at least 1."));
            }
        }

        // every sample must resolve to a declared reference
        self.registry()?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Sample
// ----------------------------------------------------------------------------

/// A named set of sequencing reads.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Sample {
    pub id: String,
    /// Raw reads (fasta/fastq), as expected by the aligner and caller.
    pub reads: PathBuf,
    /// Reference id the sample is aligned to.
    pub reference: String,
    /// Seed model-set id, expanded into each alphabet.
    pub seed: String,
    /// Train a model set on this sample.
    #[serde(default)]
    pub train: bool,
    /// Call with the models trained on another sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_from: Option<String>,
    /// Region restriction passed to training and calling (ex. "chr20:5000000-10000000").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<Control>,
    /// Restrict the sample to these alphabets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alphabets: Option<Vec<Alphabet>>,
}

/// The known methylation state of a control sample.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Control {
    Methylated,
    Unmethylated,
}

impl Display for Control {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let control = match self {
            Control::Methylated => "methylated",
            Control::Unmethylated => "unmethylated",
        };
        write!(f, "{control}")
    }
}

// ----------------------------------------------------------------------------
// Annotations and Comparisons
// ----------------------------------------------------------------------------

/// A BED file of region annotations.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RegionSet {
    pub path: PathBuf,
    pub kind: RegionKind,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionKind {
    CpgIsland,
    Tss,
}

/// Bisulfite coverage compared against the calls of one sample.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BisulfiteSet {
    pub path: PathBuf,
    pub sample: String,
}

/// An accuracy evaluation of two control samples.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Evaluation {
    pub alphabet: Alphabet,
    pub unmethylated: String,
    pub methylated: String,
}

/// Binning of sites by signed distance to the closest TSS.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TssProfileOptions {
    pub bin_width: u64,
    pub max_distance: u64,
}

/// External programs.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Tools {
    pub aligner: String,
    /// Read-type preset passed to the aligner (`mem -x MODE`).
    pub aligner_mode: String,
    pub samtools: String,
    /// Program providing the `methyltrain` and `call-methylation` subcommands.
    pub caller: String,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            aligner: "bwa".to_string(),
            aligner_mode: "ont2d".to_string(),
            samtools: "samtools".to_string(),
            caller: "nanopolish".to_string(),
        }
    }
}

#[cfg(test)]
mod tests;
