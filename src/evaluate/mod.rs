//! Accuracy of site calls on a known-unmethylated and a known-methylated control.
//!
//! The unmethylated control is all-negative ground truth, the methylated control is
//! all-positive. A site is called positive at threshold `t` iff its score is `>= t`.

use crate::call::{read_sites, CallLabel, SiteCall};
use crate::utils::write_table;

use color_eyre::eyre::{Report, Result};
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

// ----------------------------------------------------------------------------
// Curves
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub tpr: f64,
    pub fpr: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PrPoint {
    pub threshold: f64,
    /// Undefined when nothing is called positive.
    pub precision: Option<f64>,
    pub recall: f64,
}

/// Number of `sorted` values that are `>= threshold`.
fn count_at_least(sorted: &[f64], threshold: f64) -> usize {
    sorted.len() - sorted.partition_point(|score| *score < threshold)
}

fn rate(count: usize, total: usize) -> f64 {
    match total {
        0 => 0.0,
        _ => count as f64 / total as f64,
    }
}

/// Returns every distinct score in ascending order, followed by `+∞`.
fn thresholds(negatives: &[f64], positives: &[f64]) -> Vec<f64> {
    negatives
        .iter()
        .chain(positives)
        .copied()
        .filter(|score| !score.is_nan())
        .sorted_by(|a, b| a.total_cmp(b))
        .dedup()
        .chain(std::iter::once(f64::INFINITY))
        .dedup()
        .collect()
}

fn sorted(scores: &[f64]) -> Vec<f64> {
    scores.iter().copied().filter(|score| !score.is_nan()).sorted_by(|a, b| a.total_cmp(b)).collect()
}

/// Sweep the threshold over every distinct score, returning one ROC point per threshold.
///
/// Thresholds increase along the curve, so both rates are non-increasing.
///
/// ```rust
/// use nanometh::evaluate::roc;
///
/// let curve = roc(&[-3.0, -1.0, 1.0], &[-1.0, 2.0, 4.0]);
/// assert_eq!(curve.first().map(|p| (p.tpr, p.fpr)), Some((1.0, 1.0)));
/// assert_eq!(curve.last().map(|p| (p.tpr, p.fpr)), Some((0.0, 0.0)));
/// ```
pub fn roc(negatives: &[f64], positives: &[f64]) -> Vec<RocPoint> {
    let (negatives_sorted, positives_sorted) = (sorted(negatives), sorted(positives));
    thresholds(negatives, positives)
        .into_iter()
        .map(|threshold| RocPoint {
            threshold,
            tpr: rate(count_at_least(&positives_sorted, threshold), positives_sorted.len()),
            fpr: rate(count_at_least(&negatives_sorted, threshold), negatives_sorted.len()),
        })
        .collect()
}

/// Sweep the threshold over every distinct score, returning one precision-recall point per threshold.
pub fn precision_recall(negatives: &[f64], positives: &[f64]) -> Vec<PrPoint> {
    let (negatives_sorted, positives_sorted) = (sorted(negatives), sorted(positives));
    thresholds(negatives, positives)
        .into_iter()
        .map(|threshold| {
            let true_positives = count_at_least(&positives_sorted, threshold);
            let false_positives = count_at_least(&negatives_sorted, threshold);
            let called = true_positives + false_positives;
            PrPoint {
                threshold,
                precision: (called > 0).then(|| true_positives as f64 / called as f64),
                recall: rate(true_positives, positives_sorted.len()),
            }
        })
        .collect()
}

/// Area under a ROC curve by the trapezoid rule.
///
/// ```rust
/// use nanometh::evaluate::{auc, roc};
///
/// assert_eq!(auc(&roc(&[-2.0, -1.0], &[1.0, 2.0])), 1.0);
/// assert_eq!(auc(&roc(&[1.0, 2.0], &[-2.0, -1.0])), 0.0);
/// ```
pub fn auc(curve: &[RocPoint]) -> f64 {
    curve
        .iter()
        .tuple_windows()
        .map(|(a, b)| (a.fpr - b.fpr).abs() * (a.tpr + b.tpr) / 2.0)
        .sum()
}

// ----------------------------------------------------------------------------
// Per K-mer Breakdown
// ----------------------------------------------------------------------------

/// Calls at the configured threshold, stratified by the sequence context of each site.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct KmerBreakdown {
    /// Whole sequence context reported by the caller, upper-cased. A group of nearby motifs
    /// shares one context.
    pub context: String,
    pub positives: usize,
    pub negatives: usize,
    pub true_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub ambiguous: usize,
    /// Accuracy over non-ambiguous calls.
    pub accuracy: Option<f64>,
}

/// Break down calls of both controls by their sequence context, at `threshold`.
pub fn kmer_breakdown(
    unmethylated: &[SiteCall],
    methylated: &[SiteCall],
    threshold: f64,
) -> Vec<KmerBreakdown> {
    let mut contexts: BTreeMap<String, KmerBreakdown> = BTreeMap::new();

    let mut tally = |site: &SiteCall, positive: bool| {
        let context = site.context.to_ascii_uppercase();
        let row = contexts
            .entry(context.clone())
            .or_insert_with(|| KmerBreakdown { context, ..Default::default() });
        match positive {
            true => row.positives += 1,
            false => row.negatives += 1,
        }
        match (CallLabel::classify(site.score, threshold), positive) {
            (CallLabel::Ambiguous, _) => row.ambiguous += 1,
            (CallLabel::Methylated, true) => row.true_positives += 1,
            (CallLabel::Unmethylated, true) => row.false_negatives += 1,
            (CallLabel::Unmethylated, false) => row.true_negatives += 1,
            (CallLabel::Methylated, false) => row.false_positives += 1,
        }
    };
    unmethylated.iter().for_each(|site| tally(site, false));
    methylated.iter().for_each(|site| tally(site, true));

    contexts
        .into_values()
        .map(|mut row| {
            let correct = row.true_positives + row.true_negatives;
            let called = correct + row.false_positives + row.false_negatives;
            row.accuracy = (called > 0).then(|| correct as f64 / called as f64);
            row
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Evaluation
// ----------------------------------------------------------------------------

/// The curves and breakdown of one evaluation.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub roc: Vec<RocPoint>,
    pub precision_recall: Vec<PrPoint>,
    pub kmers: Vec<KmerBreakdown>,
    pub auc: f64,
}

/// Evaluate the sites of an unmethylated and a methylated control.
pub fn evaluate(unmethylated: &[SiteCall], methylated: &[SiteCall], threshold: f64) -> Evaluation {
    let negatives = unmethylated.iter().map(|s| s.score).collect_vec();
    let positives = methylated.iter().map(|s| s.score).collect_vec();
    let roc = roc(&negatives, &positives);
    Evaluation {
        auc: auc(&roc),
        roc,
        precision_recall: precision_recall(&negatives, &positives),
        kmers: kmer_breakdown(unmethylated, methylated, threshold),
    }
}

/// Evaluate two site tables, writing the ROC, precision-recall and k-mer tables.
///
/// Returns the area under the ROC curve.
pub fn evaluate_files<P>(
    unmethylated: &P,
    methylated: &P,
    threshold: f64,
    roc_output: &P,
    pr_output: &P,
    kmers_output: &P,
) -> Result<f64, Report>
where
    P: AsRef<Path> + Debug,
{
    let unmethylated = read_sites(unmethylated)?;
    let methylated = read_sites(methylated)?;
    let evaluation = evaluate(&unmethylated, &methylated, threshold);
    info!(
        "Evaluated {} unmethylated and {} methylated sites: AUC = {:.4}",
        unmethylated.len(),
        methylated.len(),
        evaluation.auc
    );
    write_table(kmers_output, &evaluation.kmers)?;
    write_table(pr_output, &evaluation.precision_recall)?;
    write_table(roc_output, &evaluation.roc)?;
    Ok(evaluation.auc)
}

#[cfg(test)]
mod tests;
