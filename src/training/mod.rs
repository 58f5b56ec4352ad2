//! Model training results: how far each trained model moved from its seed.

use crate::alphabet::Alphabet;
use crate::config::Control;
use crate::model::{read_manifest, ModelRole, PoreModel};
use crate::utils::{read_table, write_table};

use color_eyre::eyre::{eyre, ContextCompat, Report, Result, WrapErr};
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tabled::settings::Style;

/// Differences (pA) between trained and seed level means that are counted per model.
pub const DIFF_CUTS: [f64; 5] = [0.1, 0.5, 1.0, 2.0, 4.0];

// ----------------------------------------------------------------------------
// Training Summary
// ----------------------------------------------------------------------------

/// One row of the summary written by the trainer.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SummaryRow {
    /// Short role name of the model (`t`, `c.p1`, `c.p2`).
    pub model: String,
    pub kmer: String,
    pub level_mean: f64,
    pub level_stdv: f64,
    pub num_events: u64,
    pub was_trained: u8,
}

/// Read a training summary, grouping rows by model role.
pub fn read_summary<P>(path: &P) -> Result<BTreeMap<ModelRole, Vec<SummaryRow>>, Report>
where
    P: AsRef<Path> + Debug,
{
    let rows: Vec<SummaryRow> = read_table(path)?;
    let mut models: BTreeMap<ModelRole, Vec<SummaryRow>> = BTreeMap::new();
    for row in rows {
        let role = ModelRole::from_str(&row.model)
            .wrap_err_with(|| format!("Invalid training summary: {path:?}"))?;
        models.entry(role).or_default().push(row);
    }
    Ok(models)
}

// ----------------------------------------------------------------------------
// Training Report
// ----------------------------------------------------------------------------

/// Training results of one model of one sample.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TrainingRow {
    pub sample: String,
    pub control: Option<Control>,
    pub alphabet: Alphabet,
    /// Short role name of the model.
    pub model: String,
    pub total_events: u64,
    pub total_kmers: usize,
    pub trained_kmers: usize,
    pub d0_1: usize,
    pub d0_5: usize,
    pub d1_0: usize,
    pub d2_0: usize,
    pub d4_0: usize,
}

/// A trained sample, and the expanded seed models it was trained from.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainedSample {
    pub sample: String,
    pub control: Option<Control>,
    pub alphabet: Alphabet,
    /// Training summary written by the trainer.
    pub summary: PathBuf,
    /// Manifest of the expanded seed models.
    pub seed: PathBuf,
}

/// Compare the trained levels of one model against its seed.
///
/// Every k-mer of the seed must appear in the summary, and no others.
pub fn summarise_model(
    sample: &TrainedSample,
    role: ModelRole,
    rows: &[SummaryRow],
    seed: &PoreModel,
) -> Result<TrainingRow, Report> {
    if rows.len() != seed.len() {
        return Err(eyre!(
            "The {role} training summary of {} has {} k-mers, but the seed model has {}.",
            sample.sample,
            rows.len(),
            seed.len()
        ));
    }

    let mut cuts = [0; DIFF_CUTS.len()];
    let (mut total_events, mut trained_kmers) = (0, 0);
    for row in rows {
        let level = seed
            .get(&row.kmer)
            .wrap_err_with(|| format!("K-mer {} of the {role} training summary is not in the seed model.", row.kmer))?;
        let diff = (row.level_mean - level.level_mean).abs();
        cuts.iter_mut().zip(DIFF_CUTS).filter(|(_, cut)| diff >= *cut).for_each(|(count, _)| *count += 1);
        total_events += row.num_events;
        trained_kmers += usize::from(row.was_trained > 0);
    }

    Ok(TrainingRow {
        sample: sample.sample.clone(),
        control: sample.control,
        alphabet: sample.alphabet,
        model: role.short().to_string(),
        total_events,
        total_kmers: seed.len(),
        trained_kmers,
        d0_1: cuts[0],
        d0_5: cuts[1],
        d1_0: cuts[2],
        d2_0: cuts[3],
        d4_0: cuts[4],
    })
}

/// Summarise every model of a trained sample.
pub fn summarise(sample: &TrainedSample) -> Result<Vec<TrainingRow>, Report> {
    let summary = read_summary(&sample.summary)?;
    let seeds: BTreeMap<ModelRole, PathBuf> = read_manifest(&sample.seed)?.into_iter().collect();

    summary
        .iter()
        .map(|(role, rows)| {
            let seed = seeds
                .get(role)
                .wrap_err_with(|| format!("No seed {role} model for sample {}.", sample.sample))?;
            let seed = PoreModel::read(seed)?;
            summarise_model(sample, *role, rows, &seed)
        })
        .collect()
}

/// Summarise every trained sample of an alphabet into one table.
pub fn training_report<P>(samples: &[TrainedSample], output: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    let mut rows = Vec::new();
    for sample in samples {
        rows.extend(summarise(sample).wrap_err_with(|| format!("Failed to summarise training of {}", sample.sample))?);
    }
    info!("Summarised {} trained models of {} samples.", rows.len(), samples.len());
    write_table(output, &rows)
}

/// Render training rows as a markdown table, grouped by model role.
///
/// ```rust
/// use nanometh::alphabet::Alphabet;
/// use nanometh::training::{to_markdown, TrainingRow};
///
/// let row = TrainingRow {
///     sample: "ecoli.sssi".into(), control: None, alphabet: Alphabet::Cpg, model: "t".into(),
///     total_events: 1200, total_kmers: 4096, trained_kmers: 3900,
///     d0_1: 3000, d0_5: 1200, d1_0: 300, d2_0: 20, d4_0: 1,
/// };
/// let table = to_markdown(&[row]);
/// assert!(table.contains("| model | sample"));
/// assert!(table.contains("ecoli.sssi"));
/// ```
pub fn to_markdown(rows: &[TrainingRow]) -> String {
    let mut builder = tabled::builder::Builder::default();
    let mut header = vec!["model", "sample", "control", "alphabet", "training events", "trained kmers"]
        .into_iter()
        .map(String::from)
        .collect_vec();
    header.extend(DIFF_CUTS.iter().map(|cut| cut.to_string()));
    builder.push_record(header);

    rows.iter()
        .sorted_by_key(|row| (ModelRole::from_str(&row.model).ok(), row.sample.clone()))
        .for_each(|row| {
            let control = row.control.map(|c| c.to_string()).unwrap_or_default();
            builder.push_record(vec![
                row.model.clone(),
                row.sample.clone(),
                control,
                row.alphabet.to_string(),
                row.total_events.to_string(),
                row.trained_kmers.to_string(),
                row.d0_1.to_string(),
                row.d0_5.to_string(),
                row.d1_0.to_string(),
                row.d2_0.to_string(),
                row.d4_0.to_string(),
            ]);
        });

    builder.build().with(Style::markdown()).to_string()
}

#[cfg(test)]
mod tests;
