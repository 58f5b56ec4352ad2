//! Region annotations, and the spatial join of site calls against them.
//!
//! Intervals are 0-based and half-open: a site at `position` is in a region iff
//! `start <= position < end` on the same contig. Sites are sorted internally
//! before joining, so callers may pass them in any order.

pub mod bisulfite;
pub mod compare;
pub mod tss;

use crate::call::{read_sites, CallLabel, SiteCall, Strand};
use crate::utils::write_table;

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;

// ----------------------------------------------------------------------------
// Region
// ----------------------------------------------------------------------------

/// A named genomic interval, such as a CpG island or a TSS window.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub name: Option<String>,
    pub strand: Option<Strand>,
}

impl Region {
    /// Returns the region's name, or its coordinates if it is unnamed.
    ///
    /// ```rust
    /// use nanometh::region::Region;
    /// let region = Region { contig: "chr1".into(), start: 10, end: 20, name: None, strand: None };
    /// assert_eq!(region.id(), "chr1:10-20");
    /// ```
    pub fn id(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}:{}-{}", self.contig, self.start, self.end),
        }
    }
}

/// Read regions from a BED file.
///
/// Comment, `track` and `browser` lines are skipped. Columns after the third are optional,
/// a name or strand of `.` is treated as missing.
pub fn read_bed<P>(path: &P) -> Result<Vec<Region>, Report>
where
    P: AsRef<Path> + Debug,
{
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_path(path)
        .wrap_err_with(|| format!("Failed to open BED file: {path:?}"))?;

    let mut regions = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.wrap_err_with(|| format!("Failed to parse line {} of {path:?}", i + 1))?;
        let first = record.get(0).unwrap_or_default();
        if first.is_empty() || first.starts_with("track") || first.starts_with("browser") {
            continue;
        }
        let region = parse_bed_record(&record)
            .wrap_err_with(|| format!("Invalid BED line {} of {path:?}", i + 1))?;
        regions.push(region);
    }
    debug!("Read {} regions from {path:?}", regions.len());
    Ok(regions)
}

fn parse_bed_record(record: &csv::StringRecord) -> Result<Region, Report> {
    if record.len() < 3 {
        return Err(eyre!("Expected at least 3 columns, found {}.", record.len()));
    }
    let coordinate = |i: usize| -> Result<u64, Report> {
        let field = record.get(i).unwrap_or_default().trim();
        field.parse().wrap_err_with(|| format!("Invalid coordinate: {field:?}"))
    };
    let (start, end) = (coordinate(1)?, coordinate(2)?);
    if start > end {
        return Err(eyre!("Region start {start} is after its end {end}."));
    }
    let name = record.get(3).map(str::trim).filter(|n| !n.is_empty() && *n != ".").map(String::from);
    let strand = match record.get(5).map(str::trim) {
        Some("+") => Some(Strand::Forward),
        Some("-") => Some(Strand::Reverse),
        _ => None,
    };
    Ok(Region { contig: record.get(0).unwrap_or_default().to_string(), start, end, name, strand })
}

// ----------------------------------------------------------------------------
// Spatial Join
// ----------------------------------------------------------------------------

/// Anything with a genomic position that can be joined against [`Region`]s.
pub trait Positioned {
    fn contig(&self) -> &str;
    fn position(&self) -> u64;
}

impl Positioned for SiteCall {
    fn contig(&self) -> &str {
        &self.contig
    }
    fn position(&self) -> u64 {
        self.position
    }
}

/// Returns, for each region in order, the sites it contains.
///
/// A site inside several overlapping regions is attributed to each of them.
///
/// ```rust
/// use nanometh::region::{overlaps, Positioned, Region};
///
/// struct Site(&'static str, u64);
/// impl Positioned for Site {
///     fn contig(&self) -> &str { self.0 }
///     fn position(&self) -> u64 { self.1 }
/// }
///
/// let sites = [Site("chr1", 20), Site("chr1", 5), Site("chr2", 5), Site("chr1", 10)];
/// let regions = [Region { contig: "chr1".into(), start: 5, end: 20, name: None, strand: None }];
/// let joined = overlaps(&sites, &regions);
/// assert_eq!(joined[0].iter().map(|s| s.1).collect::<Vec<_>>(), [5, 10]);
/// ```
pub fn overlaps<'a, T>(sites: &'a [T], regions: &[Region]) -> Vec<Vec<&'a T>>
where
    T: Positioned,
{
    let sorted = sites.iter().sorted_by(|a, b| (a.contig(), a.position()).cmp(&(b.contig(), b.position()))).collect_vec();

    regions
        .iter()
        .map(|region| {
            let contig = region.contig.as_str();
            let lower = sorted.partition_point(|s| (s.contig(), s.position()) < (contig, region.start));
            let upper = sorted.partition_point(|s| (s.contig(), s.position()) < (contig, region.end));
            sorted[lower..upper.max(lower)].to_vec()
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Region Summary
// ----------------------------------------------------------------------------

/// The calls over one region.
///
/// Ambiguous sites are counted, and contribute to the mean score, but are excluded from the
/// methylated fraction.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RegionSummary {
    pub region: String,
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub num_sites: usize,
    pub methylated: usize,
    pub unmethylated: usize,
    pub ambiguous: usize,
    pub mean_score: f64,
    pub fraction_methylated: f64,
}

/// Methylated, unmethylated and ambiguous site counts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CallCounts {
    pub methylated: usize,
    pub unmethylated: usize,
    pub ambiguous: usize,
}

impl CallCounts {
    pub fn add(&mut self, score: f64, threshold: f64) {
        match CallLabel::classify(score, threshold) {
            CallLabel::Methylated => self.methylated += 1,
            CallLabel::Unmethylated => self.unmethylated += 1,
            CallLabel::Ambiguous => self.ambiguous += 1,
        }
    }

    /// Returns the methylated fraction of non-ambiguous sites, or [`None`] if all are ambiguous.
    pub fn fraction_methylated(&self) -> Option<f64> {
        let called = self.methylated + self.unmethylated;
        (called > 0).then(|| self.methylated as f64 / called as f64)
    }
}

/// Summarise sites per region, classifying each site with `threshold`.
///
/// Regions without a single non-ambiguous site produce no summary.
///
/// ## Examples
///
/// ```rust
/// use nanometh::call::{CallLabel, SiteCall, Strand};
/// use nanometh::region::{aggregate, Region};
///
/// let site = |position, score| SiteCall {
///     contig: "chr1".into(), position, end: position + 1, strand: Strand::Forward, score,
///     call: CallLabel::Ambiguous, num_reads: 1, num_motifs: 1, context: "CG".into(),
/// };
/// let sites = [site(10, 5.0), site(11, -1.9), site(12, 0.2), site(100, 0.1)];
/// let regions = [
///     Region { contig: "chr1".into(), start: 0, end: 50, name: Some("island".into()), strand: None },
///     Region { contig: "chr1".into(), start: 90, end: 110, name: Some("ambiguous".into()), strand: None },
///     Region { contig: "chr2".into(), start: 0, end: 50, name: Some("empty".into()), strand: None },
/// ];
///
/// let summaries = aggregate(&sites, &regions, 2.5);
/// assert_eq!(summaries.len(), 1);
/// assert_eq!(summaries[0].fraction_methylated, 1.0);
/// assert_eq!(summaries[0].ambiguous, 2);
/// ```
pub fn aggregate(sites: &[SiteCall], regions: &[Region], threshold: f64) -> Vec<RegionSummary> {
    regions
        .iter()
        .zip(overlaps(sites, regions))
        .filter_map(|(region, sites)| {
            let mut counts = CallCounts::default();
            sites.iter().for_each(|site| counts.add(site.score, threshold));
            let fraction_methylated = counts.fraction_methylated()?;
            let mean_score = sites.iter().map(|s| s.score).sum::<f64>() / sites.len() as f64;
            Some(RegionSummary {
                region: region.id(),
                contig: region.contig.clone(),
                start: region.start,
                end: region.end,
                num_sites: sites.len(),
                methylated: counts.methylated,
                unmethylated: counts.unmethylated,
                ambiguous: counts.ambiguous,
                mean_score,
                fraction_methylated,
            })
        })
        .collect()
}

/// Aggregate a site table over a BED file, writing one summary row per covered region.
pub fn aggregate_file<P>(sites: &P, regions: &P, threshold: f64, output: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    let sites = read_sites(sites)?;
    let regions = read_bed(regions)?;
    let summaries = aggregate(&sites, &regions, threshold);
    info!("Summarised {} of {} regions with {} sites.", summaries.len(), regions.len(), sites.len());
    write_table(output, &summaries)
}
