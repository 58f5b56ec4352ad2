//! Per-k-mer signal models, model-set manifests, and their expansion into an [`Alphabet`].
//!
//! A model file is a set of `#key<TAB>value` header lines followed by one row per k-mer:
//!
//! ```text
//! #alphabet	nucleotide
//! #kmer_size	6
//! AAAAAA	53.28	1.43	0.97	0.26
//! ```
//!
//! A model-set manifest (fofn) lists one model path per line, the role of each model is given
//! by its position: template, complement population 1, complement population 2.

use crate::alphabet::Alphabet;
use crate::utils::create_parent_dir;

use color_eyre::eyre::{eyre, ContextCompat, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::{EnumIter, EnumProperty, IntoEnumIterator};

// ----------------------------------------------------------------------------
// Model Role
// ----------------------------------------------------------------------------

/// The strand/population a model describes, determined by its position in a manifest.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    EnumIter,
    EnumProperty,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum ModelRole {
    #[strum(props(short = "t"))]
    Template,
    #[strum(props(short = "c.p1"))]
    ComplementPop1,
    #[strum(props(short = "c.p2"))]
    ComplementPop2,
}

impl Display for ModelRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let role = match self {
            ModelRole::Template => "template",
            ModelRole::ComplementPop1 => "complement.pop1",
            ModelRole::ComplementPop2 => "complement.pop2",
        };
        write!(f, "{role}")
    }
}

impl FromStr for ModelRole {
    type Err = Report;

    /// Parse either the long or the short name of a role.
    ///
    /// ```rust
    /// use nanometh::model::ModelRole;
    /// use std::str::FromStr;
    ///
    /// assert_eq!(ModelRole::from_str("c.p1")?, ModelRole::ComplementPop1);
    /// assert_eq!(ModelRole::from_str("template")?, ModelRole::Template);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    fn from_str(name: &str) -> Result<Self, Report> {
        ModelRole::iter()
            .find(|role| role.short() == name || role.to_string() == name)
            .ok_or_else(|| eyre!("Unknown model role: {name}"))
            .suggestion("Please choose from: t, c.p1, c.p2")
    }
}

impl ModelRole {
    /// Returns the short name used in file names and training summaries.
    pub fn short(&self) -> &'static str {
        self.get_str("short").unwrap_or_default()
    }

    /// Returns the role of the model at `position` in a manifest.
    pub fn from_position(position: usize) -> Result<Self, Report> {
        ModelRole::iter()
            .nth(position)
            .ok_or_else(|| eyre!("A model set holds at most 3 models, found model {}.", position + 1))
    }
}

// ----------------------------------------------------------------------------
// K-mer Level
// ----------------------------------------------------------------------------

/// The signal level distribution of one k-mer.
#[derive(Clone, Debug, PartialEq)]
pub struct KmerLevel {
    pub kmer: String,
    pub level_mean: f64,
    pub level_stdv: f64,
    pub sd_mean: f64,
    pub sd_stdv: f64,
}

impl KmerLevel {
    /// Parse a whitespace-separated model row, extra trailing columns are ignored.
    fn parse(line: &str) -> Result<Self, Report> {
        let fields = line.split_whitespace().collect_vec();
        if fields.len() < 5 {
            return Err(eyre!("Expected at least 5 columns in model row: {line:?}"));
        }
        let value = |i: usize| -> Result<f64, Report> {
            fields[i].parse::<f64>().wrap_err_with(|| format!("Invalid number {:?} in model row: {line:?}", fields[i]))
        };
        Ok(KmerLevel {
            kmer: fields[0].to_string(),
            level_mean: value(1)?,
            level_stdv: value(2)?,
            sd_mean: value(3)?,
            sd_stdv: value(4)?,
        })
    }

    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.kmer, self.level_mean, self.level_stdv, self.sd_mean, self.sd_stdv
        )
    }
}

// ----------------------------------------------------------------------------
// Pore Model
// ----------------------------------------------------------------------------

/// A per-k-mer signal model for one [`ModelRole`].
///
/// Rows keep the exact text they were read from, so rewriting a model never perturbs rows
/// that were not changed.
#[derive(Clone, Debug, Default)]
pub struct PoreModel {
    /// Header `(key, value)` pairs, in file order, without the leading `#`.
    pub headers: Vec<(String, String)>,
    pub alphabet: Alphabet,
    pub kmer_size: usize,
    /// An optional column header row (ex. `kmer level_mean ...`).
    column_names: Option<String>,
    rows: Vec<(KmerLevel, String)>,
    index: HashMap<String, usize>,
}

impl PoreModel {
    /// Read a model file.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use nanometh::model::PoreModel;
    ///
    /// let dir = tempfile::tempdir()?;
    /// let path = dir.path().join("r9.template.model");
    /// std::fs::write(&path, "#kmer_size\t2\nAA\t50.0\t1.0\t1.0\t0.1\nAC\t60.5\t1.2\t1.0\t0.1\n")?;
    ///
    /// let model = PoreModel::read(&path)?;
    /// assert_eq!(model.kmer_size, 2);
    /// assert_eq!(model.get("AC").map(|l| l.level_mean), Some(60.5));
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn read<P>(path: &P) -> Result<Self, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read model: {path:?}"))?;
        PoreModel::parse(&contents).wrap_err_with(|| format!("Failed to parse model: {path:?}"))
    }

    /// Parse model text, see [`PoreModel::read`].
    pub fn parse(contents: &str) -> Result<Self, Report> {
        let mut model = PoreModel::default();

        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('#') {
                let mut split = header.splitn(2, |c: char| c.is_whitespace());
                let key = split.next().unwrap_or_default().to_string();
                let value = split.next().unwrap_or_default().trim().to_string();
                model.headers.push((key, value));
            } else if line.split_whitespace().next() == Some("kmer") {
                model.column_names = Some(line.to_string());
            } else {
                let level = KmerLevel::parse(line)?;
                model.push(level, line.to_string())?;
            }
        }

        model.alphabet = match model.header("alphabet") {
            Some(alphabet) => Alphabet::from_str(alphabet)?,
            None => Alphabet::Nucleotide,
        };
        let first_kmer = model.rows.first().map(|(level, _)| level.kmer.len()).unwrap_or_default();
        model.kmer_size = match model.header("kmer_size").or_else(|| model.header("k")) {
            Some(k) => k.parse().wrap_err_with(|| format!("Invalid k-mer size: {k:?}"))?,
            None => first_kmer,
        };
        if let Some((level, _)) = model.rows.iter().find(|(level, _)| level.kmer.len() != model.kmer_size) {
            return Err(eyre!(
                "K-mer {} does not match the model k-mer size {}.",
                level.kmer,
                model.kmer_size
            ));
        }

        Ok(model)
    }

    fn push(&mut self, level: KmerLevel, line: String) -> Result<(), Report> {
        if self.index.contains_key(&level.kmer) {
            return Err(eyre!("Duplicate k-mer in model: {}", level.kmer));
        }
        self.index.insert(level.kmer.clone(), self.rows.len());
        self.rows.push((level, line));
        Ok(())
    }

    /// Returns the value of a header key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, key: &str, value: String) {
        match self.headers.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.headers.push((key.to_string(), value)),
        }
    }

    /// Returns the level distribution of a k-mer.
    pub fn get(&self, kmer: &str) -> Option<&KmerLevel> {
        self.index.get(kmer).map(|i| &self.rows[*i].0)
    }

    /// Returns every k-mer level, in file order.
    pub fn levels(&self) -> impl Iterator<Item = &KmerLevel> {
        self.rows.iter().map(|(level, _)| level)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns a model over `alphabet`, derived from this nucleotide model.
    ///
    /// - The result has one row per k-mer of the expanded alphabet.
    /// - Rows for unmodified k-mers are copied byte-for-byte.
    /// - Rows for k-mers with a methylated symbol take the parameters of the unmodified
    ///   k-mer they are derived from.
    ///
    /// ```rust
    /// use nanometh::{model::PoreModel, Alphabet};
    ///
    /// let seed = PoreModel::parse("AA 1 0.1 1 0.1\nAC 2 0.1 1 0.1\nAG 3 0.1 1 0.1\nAT 4 0.1 1 0.1\n\
    ///                              CA 5 0.1 1 0.1\nCC 6 0.1 1 0.1\nCG 7 0.1 1 0.1\nCT 8 0.1 1 0.1\n\
    ///                              GA 9 0.1 1 0.1\nGC 10 0.1 1 0.1\nGG 11 0.1 1 0.1\nGT 12 0.1 1 0.1\n\
    ///                              TA 13 0.1 1 0.1\nTC 14 0.1 1 0.1\nTG 15 0.1 1 0.1\nTT 16 0.1 1 0.1\n")?;
    /// let expanded = seed.expand(Alphabet::Cpg)?;
    /// assert_eq!(expanded.len(), 25);
    /// assert_eq!(expanded.get("MG").map(|l| l.level_mean), Some(7.0));
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn expand(&self, alphabet: Alphabet) -> Result<PoreModel, Report> {
        if self.alphabet == alphabet {
            return Ok(self.clone());
        }
        if self.alphabet != Alphabet::Nucleotide {
            return Err(eyre!(
                "Cannot expand a {} model into the {alphabet} alphabet.",
                self.alphabet
            ))
            .suggestion("Seed models must use the nucleotide alphabet.");
        }

        let mut expanded = PoreModel {
            headers: self.headers.clone(),
            alphabet,
            kmer_size: self.kmer_size,
            column_names: self.column_names.clone(),
            ..Default::default()
        };
        expanded.set_header("alphabet", alphabet.to_string());

        for kmer in alphabet.kmers(self.kmer_size) {
            let source = alphabet.unmodified_kmer(&kmer);
            let i = self
                .index
                .get(&source)
                .wrap_err_with(|| format!("Seed model is missing k-mer {source}"))?;
            let (level, line) = &self.rows[*i];
            if alphabet.is_modified_kmer(&kmer) {
                let derived = KmerLevel { kmer, ..level.clone() };
                let line = derived.to_line();
                expanded.push(derived, line)?;
            } else {
                expanded.push(level.clone(), line.clone())?;
            }
        }

        Ok(expanded)
    }

    /// Write the model, headers first.
    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        create_parent_dir(path)?;
        let mut output = String::new();
        for (key, value) in &self.headers {
            output.push_str(&format!("#{key}\t{value}\n"));
        }
        if let Some(column_names) = &self.column_names {
            output.push_str(column_names);
            output.push('\n');
        }
        for (_, line) in &self.rows {
            output.push_str(line);
            output.push('\n');
        }
        std::fs::write(path, output).wrap_err_with(|| format!("Failed to write model: {path:?}"))
    }
}

// ----------------------------------------------------------------------------
// Model Set Manifest
// ----------------------------------------------------------------------------

/// Read a model-set manifest, returning each model with its role.
///
/// Relative paths are resolved against the manifest's own directory.
pub fn read_manifest<P>(path: &P) -> Result<Vec<(ModelRole, PathBuf)>, Report>
where
    P: AsRef<Path> + Debug,
{
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read model manifest: {path:?}"))?;
    let dir = path.as_ref().parent().unwrap_or(Path::new(""));

    let models = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .map(|(i, line)| {
            let model = Path::new(line);
            let model = if model.is_absolute() { model.to_path_buf() } else { dir.join(model) };
            Ok((ModelRole::from_position(i)?, model))
        })
        .collect::<Result<Vec<_>, Report>>()
        .wrap_err_with(|| format!("Invalid model manifest: {path:?}"))?;

    if models.is_empty() {
        return Err(eyre!("Model manifest lists no models: {path:?}"));
    }
    Ok(models)
}

/// Write a model-set manifest listing `models` in role order.
///
/// Models in the same directory as the manifest are written as bare file names, so the
/// manifest stays valid after the directory is moved.
pub fn write_manifest<P>(path: &P, models: &[PathBuf]) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    create_parent_dir(path)?;
    let dir = path.as_ref().parent().unwrap_or(Path::new(""));
    let lines = models
        .iter()
        .map(|model| match (model.parent(), model.file_name()) {
            (Some(parent), Some(name)) if parent == dir => name.to_string_lossy().into_owned(),
            _ => model.to_string_lossy().into_owned(),
        })
        .collect_vec();
    std::fs::write(path, format!("{}\n", lines.join("\n")))
        .wrap_err_with(|| format!("Failed to write model manifest: {path:?}"))
}

/// Returns the model paths that belong to a manifest, one per role.
///
/// ```rust
/// use nanometh::model::model_paths;
/// use std::path::PathBuf;
///
/// let paths = model_paths(&"work/r9.cpg.fofn", 2);
/// assert_eq!(paths, [PathBuf::from("work/r9.cpg.t.model"), PathBuf::from("work/r9.cpg.c.p1.model")]);
/// ```
pub fn model_paths<P>(manifest: &P, count: usize) -> Vec<PathBuf>
where
    P: AsRef<Path> + Debug,
{
    let manifest = manifest.as_ref();
    let stem = manifest.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    ModelRole::iter()
        .take(count)
        .map(|role| manifest.with_file_name(format!("{stem}.{}.model", role.short())))
        .collect()
}

/// Expand every model of a seed manifest into `alphabet`.
///
/// Writes one model per role next to `output` (see [`model_paths`]) and the manifest itself,
/// returning the model paths written.
///
/// ## Arguments
///
/// - `seed` - Manifest of the nucleotide seed models.
/// - `alphabet` - Alphabet to expand into.
/// - `output` - Output manifest path.
pub fn expand_model_set<P, Q>(seed: &P, alphabet: Alphabet, output: &Q) -> Result<Vec<PathBuf>, Report>
where
    P: AsRef<Path> + Debug,
    Q: AsRef<Path> + Debug,
{
    let seeds = read_manifest(seed)?;
    let outputs = model_paths(output, seeds.len());

    for ((role, seed_model), output_model) in seeds.iter().zip(&outputs) {
        if alphabet.is_methylation_aware() {
            let model = PoreModel::read(seed_model)?;
            let expanded = model.expand(alphabet)?;
            debug!(
                "Expanded {role} model {seed_model:?} from {} to {} k-mers",
                model.len(),
                expanded.len()
            );
            expanded.write(output_model)?;
        } else {
            create_parent_dir(output_model)?;
            std::fs::copy(seed_model, output_model)
                .wrap_err_with(|| format!("Failed to copy model {seed_model:?} to {output_model:?}"))?;
        }
    }
    write_manifest(output, &outputs)?;

    Ok(outputs)
}
