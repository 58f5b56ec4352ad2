//! Bisulfite calls in Bismark coverage format, summarised over regions.

use crate::region::{overlaps, read_bed, Positioned, Region};
use crate::utils::write_table;

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;

/// Methylated and unmethylated read counts at one cytosine.
#[derive(Clone, Debug, PartialEq)]
pub struct BisulfiteSite {
    pub contig: String,
    /// 0-based position.
    pub position: u64,
    pub methylated: u64,
    pub unmethylated: u64,
}

impl Positioned for BisulfiteSite {
    fn contig(&self) -> &str {
        &self.contig
    }
    fn position(&self) -> u64 {
        self.position
    }
}

/// Read a Bismark coverage file: `contig start end percent methylated unmethylated`.
///
/// Coverage files are 1-based, positions are converted to 0-based.
///
/// ```rust
/// use nanometh::region::bisulfite::read_coverage;
///
/// let dir = tempfile::tempdir()?;
/// let path = dir.path().join("NA12878.cov");
/// std::fs::write(&path, "chr20\t60118\t60118\t75.0\t3\t1\n")?;
///
/// let sites = read_coverage(&path)?;
/// assert_eq!(sites[0].position, 60117);
/// assert_eq!((sites[0].methylated, sites[0].unmethylated), (3, 1));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn read_coverage<P>(path: &P) -> Result<Vec<BisulfiteSite>, Report>
where
    P: AsRef<Path> + Debug,
{
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_path(path)
        .wrap_err_with(|| format!("Failed to open coverage file: {path:?}"))?;

    reader
        .records()
        .map(|record| {
            let record = record?;
            if record.len() < 6 {
                return Err(eyre!("Expected 6 columns, found {}.", record.len()));
            }
            let field = |i: usize| -> Result<u64, Report> {
                let value = record.get(i).unwrap_or_default().trim();
                value.parse().wrap_err_with(|| format!("Invalid count: {value:?}"))
            };
            let start = field(1)?;
            if start == 0 {
                return Err(eyre!("Coverage positions are 1-based, found position 0."));
            }
            Ok(BisulfiteSite {
                contig: record.get(0).unwrap_or_default().to_string(),
                position: start - 1,
                methylated: field(4)?,
                unmethylated: field(5)?,
            })
        })
        .enumerate()
        .map(|(i, site)| site.wrap_err_with(|| format!("Invalid line {} of {path:?}", i + 1)))
        .collect()
}

/// The pooled bisulfite coverage over one region.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BisulfiteSummary {
    pub region: String,
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub num_sites: usize,
    pub methylated: u64,
    pub unmethylated: u64,
    pub fraction_methylated: f64,
}

/// Summarise coverage per region as `Σ methylated / Σ (methylated + unmethylated)`.
///
/// Regions without coverage produce no summary.
pub fn aggregate_bisulfite(sites: &[BisulfiteSite], regions: &[Region]) -> Vec<BisulfiteSummary> {
    regions
        .iter()
        .zip(overlaps(sites, regions))
        .filter_map(|(region, sites)| {
            let methylated: u64 = sites.iter().map(|s| s.methylated).sum();
            let unmethylated: u64 = sites.iter().map(|s| s.unmethylated).sum();
            let coverage = methylated + unmethylated;
            (coverage > 0).then(|| BisulfiteSummary {
                region: region.id(),
                contig: region.contig.clone(),
                start: region.start,
                end: region.end,
                num_sites: sites.len(),
                methylated,
                unmethylated,
                fraction_methylated: methylated as f64 / coverage as f64,
            })
        })
        .collect()
}

/// Aggregate a coverage file over a BED file.
pub fn aggregate_bisulfite_file<P>(coverage: &P, regions: &P, output: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    let sites = read_coverage(coverage)?;
    let regions = read_bed(regions)?;
    let summaries = aggregate_bisulfite(&sites, &regions);
    info!("Summarised bisulfite coverage over {} of {} regions.", summaries.len(), regions.len());
    write_table(output, &summaries)
}
