//! Comparison of nanopore and bisulfite region summaries.

use crate::region::bisulfite::BisulfiteSummary;
use crate::region::RegionSummary;
use crate::utils::{read_table, write_table};

use color_eyre::eyre::{Report, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;

/// One region summarised by both sources.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub region: String,
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub nanopore_sites: usize,
    pub bisulfite_sites: usize,
    pub nanopore_fraction: f64,
    pub bisulfite_fraction: f64,
    /// Nanopore minus bisulfite fraction.
    pub difference: f64,
}

/// Returns the Pearson correlation of two samples, or [`None`] if it is undefined.
///
/// ```rust
/// use nanometh::region::compare::pearson;
///
/// assert_eq!(pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), Some(1.0));
/// assert_eq!(pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), Some(-1.0));
/// assert_eq!(pearson(&[1.0, 1.0], &[2.0, 3.0]), None);
/// ```
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean = |values: &[f64]| values[..n].iter().sum::<f64>() / n as f64;
    let (mean_x, mean_y) = (mean(xs), mean(ys));

    let (mut covariance, mut variance_x, mut variance_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys).take(n) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        covariance += dx * dy;
        variance_x += dx * dx;
        variance_y += dy * dy;
    }
    if variance_x == 0.0 || variance_y == 0.0 {
        return None;
    }
    Some((covariance / (variance_x * variance_y).sqrt()).clamp(-1.0, 1.0))
}

/// Inner join of nanopore and bisulfite summaries on region, in nanopore order.
///
/// Returns the joined rows and the correlation of the two methylated fractions.
pub fn compare(
    nanopore: &[RegionSummary],
    bisulfite: &[BisulfiteSummary],
) -> (Vec<ComparisonRow>, Option<f64>) {
    let bisulfite: HashMap<_, _> = bisulfite
        .iter()
        .map(|b| ((b.region.as_str(), b.contig.as_str(), b.start, b.end), b))
        .collect();

    let rows: Vec<ComparisonRow> = nanopore
        .iter()
        .filter_map(|n| {
            let b = bisulfite.get(&(n.region.as_str(), n.contig.as_str(), n.start, n.end))?;
            Some(ComparisonRow {
                region: n.region.clone(),
                contig: n.contig.clone(),
                start: n.start,
                end: n.end,
                nanopore_sites: n.num_sites,
                bisulfite_sites: b.num_sites,
                nanopore_fraction: n.fraction_methylated,
                bisulfite_fraction: b.fraction_methylated,
                difference: n.fraction_methylated - b.fraction_methylated,
            })
        })
        .collect();

    let xs: Vec<f64> = rows.iter().map(|r| r.nanopore_fraction).collect();
    let ys: Vec<f64> = rows.iter().map(|r| r.bisulfite_fraction).collect();
    let correlation = pearson(&xs, &ys);
    (rows, correlation)
}

/// Compare two summary tables, writing the joined rows and returning the correlation.
pub fn compare_files<P>(nanopore: &P, bisulfite: &P, output: &P) -> Result<Option<f64>, Report>
where
    P: AsRef<Path> + Debug,
{
    let nanopore: Vec<RegionSummary> = read_table(nanopore)?;
    let bisulfite: Vec<BisulfiteSummary> = read_table(bisulfite)?;
    let (rows, correlation) = compare(&nanopore, &bisulfite);
    match correlation {
        Some(r) => info!("Compared {} regions, pearson r = {r:.4}", rows.len()),
        None => warn!("Compared {} regions, correlation is undefined.", rows.len()),
    }
    write_table(output, &rows)?;
    Ok(correlation)
}
