//! Methylation calls, and the per-site, per-read and per-strand views of them.
//!
//! Every log-likelihood ratio reported by the caller is stored once, keyed by
//! site, then strand, then read. The three views are all folds over that table:
//!
//! - a strand score is the sum of its reads' ratios, in read-name order,
//! - a site score is the sum of its strand scores, in strand order.
//!
//! [`reduce_reads`] and [`reduce_strands`] fold a view back into site scores with
//! the same reducer, so every view reduces to the exact same value per site.

use crate::utils::read_table;
use crate::utils::write_table;

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

// ----------------------------------------------------------------------------
// Strand and Site
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
    /// Both strands, or no strand information.
    #[serde(rename = ".")]
    Unstranded,
}

impl Display for Strand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let strand = match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
            Strand::Unstranded => ".",
        };
        write!(f, "{strand}")
    }
}

/// The identity of a candidate site: contig and 0-based position.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SiteKey {
    pub contig: String,
    pub position: u64,
}

/// A discrete call made from a site's score.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallLabel {
    Methylated,
    Unmethylated,
    Ambiguous,
}

impl CallLabel {
    /// Classify a log-likelihood ratio against a threshold.
    ///
    /// Scores strictly inside `(-threshold, threshold)` are ambiguous.
    ///
    /// ```rust
    /// use nanometh::call::CallLabel;
    ///
    /// assert_eq!(CallLabel::classify(5.0, 2.5), CallLabel::Methylated);
    /// assert_eq!(CallLabel::classify(-2.5, 2.5), CallLabel::Unmethylated);
    /// assert_eq!(CallLabel::classify(-1.9, 2.5), CallLabel::Ambiguous);
    /// ```
    pub fn classify(score: f64, threshold: f64) -> Self {
        if score >= threshold {
            CallLabel::Methylated
        } else if score <= -threshold {
            CallLabel::Unmethylated
        } else {
            CallLabel::Ambiguous
        }
    }
}

// ----------------------------------------------------------------------------
// Raw Caller Output
// ----------------------------------------------------------------------------

/// One row of caller output: the ratio of one read at one site.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RawCall {
    pub chromosome: String,
    pub strand: Strand,
    pub start: u64,
    pub end: u64,
    pub read_name: String,
    pub log_lik_ratio: f64,
    pub log_lik_methylated: f64,
    pub log_lik_unmethylated: f64,
    pub num_calling_strands: u32,
    pub num_motifs: u32,
    pub sequence: String,
}

// ----------------------------------------------------------------------------
// Views
// ----------------------------------------------------------------------------

/// One row per site.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SiteCall {
    pub contig: String,
    pub position: u64,
    pub end: u64,
    pub strand: Strand,
    pub score: f64,
    pub call: CallLabel,
    pub num_reads: usize,
    pub num_motifs: u32,
    /// Sequence context reported by the caller, the unit of the per-k-mer breakdown.
    pub context: String,
}

impl SiteCall {
    pub fn key(&self) -> SiteKey {
        SiteKey { contig: self.contig.clone(), position: self.position }
    }
}

/// One row per (site, strand, read).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ReadCall {
    pub contig: String,
    pub position: u64,
    pub strand: Strand,
    pub read_name: String,
    pub score: f64,
}

/// One row per (site, strand).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StrandCall {
    pub contig: String,
    pub position: u64,
    pub strand: Strand,
    pub num_reads: usize,
    pub score: f64,
}

/// The single reducer every view is folded with.
fn fold_scores(scores: impl Iterator<Item = f64>) -> f64 {
    scores.fold(0.0, |total, score| total + score)
}

type StrandReads = BTreeMap<Strand, BTreeMap<String, f64>>;

fn strand_score(reads: &BTreeMap<String, f64>) -> f64 {
    fold_scores(reads.values().copied())
}

fn site_score(strands: &StrandReads) -> f64 {
    fold_scores(strands.values().map(strand_score))
}

/// Fold a per-read view back into one score per site.
pub fn reduce_reads(reads: &[ReadCall]) -> BTreeMap<SiteKey, f64> {
    let mut sites: BTreeMap<SiteKey, StrandReads> = BTreeMap::new();
    for read in reads {
        let key = SiteKey { contig: read.contig.clone(), position: read.position };
        sites
            .entry(key)
            .or_default()
            .entry(read.strand)
            .or_default()
            .insert(read.read_name.clone(), read.score);
    }
    sites.into_iter().map(|(key, strands)| (key, site_score(&strands))).collect()
}

/// Fold a per-strand view back into one score per site.
pub fn reduce_strands(strands: &[StrandCall]) -> BTreeMap<SiteKey, f64> {
    let mut sites: BTreeMap<SiteKey, BTreeMap<Strand, f64>> = BTreeMap::new();
    for strand in strands {
        let key = SiteKey { contig: strand.contig.clone(), position: strand.position };
        sites.entry(key).or_default().insert(strand.strand, strand.score);
    }
    sites.into_iter().map(|(key, strands)| (key, fold_scores(strands.into_values()))).collect()
}

// ----------------------------------------------------------------------------
// Call Table
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct SiteEvidence {
    end: u64,
    num_motifs: u32,
    context: String,
    strands: StrandReads,
}

/// Every per-read ratio, stored once per (site, strand, read).
#[derive(Clone, Debug, Default)]
pub struct CallTable {
    sites: BTreeMap<SiteKey, SiteEvidence>,
}

impl CallTable {
    pub fn new() -> Self {
        CallTable::default()
    }

    /// Read raw caller output.
    pub fn read<P>(path: &P) -> Result<Self, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let records: Vec<RawCall> = read_table(path)?;
        CallTable::from_records(records).wrap_err_with(|| format!("Invalid calls in {path:?}"))
    }

    /// Build the table from raw caller rows.
    ///
    /// A read may report each (site, strand) once, a repeated report is an error.
    pub fn from_records<I>(records: I) -> Result<Self, Report>
    where
        I: IntoIterator<Item = RawCall>,
    {
        let mut table = CallTable::new();
        for record in records {
            if !record.log_lik_ratio.is_finite() {
                return Err(eyre!(
                    "Read {} reports a non-finite ratio at {}:{}.",
                    record.read_name,
                    record.chromosome,
                    record.start
                ));
            }
            let key = SiteKey { contig: record.chromosome, position: record.start };
            let site = table.sites.entry(key).or_insert_with(|| SiteEvidence {
                end: record.end,
                num_motifs: record.num_motifs,
                context: record.sequence,
                ..Default::default()
            });
            let reads = site.strands.entry(record.strand).or_default();
            if reads.insert(record.read_name.clone(), record.log_lik_ratio).is_some() {
                return Err(eyre!(
                    "Read {} reports the same site twice on strand {}.",
                    record.read_name,
                    record.strand
                ));
            }
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Returns the per-site view, classified with `threshold`.
    pub fn sites(&self, threshold: f64) -> Vec<SiteCall> {
        self.sites
            .iter()
            .map(|(key, site)| {
                let score = site_score(&site.strands);
                let strands: Vec<&Strand> = site.strands.keys().collect();
                let strand = match strands.as_slice() {
                    [strand] => **strand,
                    _ => Strand::Unstranded,
                };
                SiteCall {
                    contig: key.contig.clone(),
                    position: key.position,
                    end: site.end,
                    strand,
                    score,
                    call: CallLabel::classify(score, threshold),
                    num_reads: site.strands.values().map(BTreeMap::len).sum(),
                    num_motifs: site.num_motifs,
                    context: site.context.clone(),
                }
            })
            .collect()
    }

    /// Returns the per-read view, in site, strand, read order.
    pub fn reads(&self) -> Vec<ReadCall> {
        self.sites
            .iter()
            .flat_map(|(key, site)| {
                site.strands.iter().flat_map(move |(strand, reads)| {
                    reads.iter().map(move |(read_name, score)| ReadCall {
                        contig: key.contig.clone(),
                        position: key.position,
                        strand: *strand,
                        read_name: read_name.clone(),
                        score: *score,
                    })
                })
            })
            .collect()
    }

    /// Returns the per-strand view, in site, strand order.
    pub fn strands(&self) -> Vec<StrandCall> {
        self.sites
            .iter()
            .flat_map(|(key, site)| {
                site.strands.iter().map(move |(strand, reads)| StrandCall {
                    contig: key.contig.clone(),
                    position: key.position,
                    strand: *strand,
                    num_reads: reads.len(),
                    score: strand_score(reads),
                })
            })
            .collect()
    }
}

/// Split raw caller output into the site, read and strand views.
///
/// ## Arguments
///
/// - `raw` - Raw caller output.
/// - `threshold` - Log-likelihood ratio call threshold.
/// - `sites`, `reads`, `strands` - Output tables.
pub fn split_calls<P>(raw: &P, threshold: f64, sites: &P, reads: &P, strands: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    let table = CallTable::read(raw)?;
    let site_calls = table.sites(threshold);
    let read_calls = table.reads();
    debug!("Read {} calls over {} sites from {raw:?}", read_calls.len(), site_calls.len());

    write_table(reads, &read_calls)?;
    write_table(strands, &table.strands())?;
    write_table(sites, &site_calls)?;

    let methylated = site_calls.iter().filter(|s| s.call == CallLabel::Methylated).count();
    let ambiguous = site_calls.iter().filter(|s| s.call == CallLabel::Ambiguous).count();
    info!(
        "Called {} sites: {methylated} methylated, {} unmethylated, {ambiguous} ambiguous.",
        site_calls.len(),
        site_calls.len() - methylated - ambiguous
    );
    Ok(())
}

/// Read a per-site view written by [`split_calls`].
pub fn read_sites<P>(path: &P) -> Result<Vec<SiteCall>, Report>
where
    P: AsRef<Path> + Debug,
{
    read_table(path)
}

#[cfg(test)]
mod tests;
