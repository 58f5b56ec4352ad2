//! Methylation as a function of signed distance to the closest transcription start site.

use crate::call::{read_sites, SiteCall, Strand};
use crate::region::{read_bed, CallCounts, Region};
use crate::utils::write_table;

use color_eyre::eyre::{Report, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::Path;

/// Sites binned by distance to their closest TSS.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ProfileBin {
    /// Inclusive lower bound of the signed distance.
    pub bin_start: i64,
    /// Exclusive upper bound of the signed distance.
    pub bin_end: i64,
    pub num_sites: usize,
    pub methylated: usize,
    pub unmethylated: usize,
    pub ambiguous: usize,
    pub fraction_methylated: f64,
}

/// Returns the TSS coordinate of a region: its start, or its last base on the reverse strand.
fn tss_position(region: &Region) -> u64 {
    match region.strand {
        Some(Strand::Reverse) => region.end.saturating_sub(1).max(region.start),
        _ => region.start,
    }
}

/// Returns the signed distance from `position` to the closest TSS on its contig.
///
/// Distances are negative upstream of the TSS and positive downstream, with respect to the
/// TSS strand. Ties go to the TSS with the lower coordinate.
///
/// ```rust
/// use nanometh::call::Strand;
/// use nanometh::region::{tss::closest_tss, Region};
///
/// let tss = [
///     Region { contig: "chr1".into(), start: 1000, end: 1001, name: None, strand: Some(Strand::Forward) },
///     Region { contig: "chr1".into(), start: 4999, end: 5000, name: None, strand: Some(Strand::Reverse) },
/// ];
/// assert_eq!(closest_tss(&tss, "chr1", 900), Some(-100));
/// assert_eq!(closest_tss(&tss, "chr1", 4900), Some(99));
/// assert_eq!(closest_tss(&tss, "chr2", 900), None);
/// ```
pub fn closest_tss(tss: &[Region], contig: &str, position: u64) -> Option<i64> {
    let index = TssIndex::new(tss);
    index.closest(contig, position)
}

/// TSS coordinates sorted per contig.
struct TssIndex {
    contigs: HashMap<String, Vec<(u64, Strand)>>,
}

impl TssIndex {
    fn new(tss: &[Region]) -> Self {
        let mut contigs: HashMap<String, Vec<(u64, Strand)>> = HashMap::new();
        for region in tss {
            let strand = region.strand.unwrap_or(Strand::Forward);
            contigs.entry(region.contig.clone()).or_default().push((tss_position(region), strand));
        }
        contigs.values_mut().for_each(|positions| positions.sort());
        TssIndex { contigs }
    }

    fn closest(&self, contig: &str, position: u64) -> Option<i64> {
        let positions = self.contigs.get(contig)?;
        let i = positions.partition_point(|(tss, _)| *tss < position);
        let distance = |(tss, strand): &(u64, Strand)| -> i64 {
            let d = position as i64 - *tss as i64;
            match strand {
                Strand::Reverse => -d,
                _ => d,
            }
        };
        let before = i.checked_sub(1).and_then(|j| positions.get(j));
        let after = positions.get(i);
        match (before, after) {
            (Some(b), Some(a)) => match position - b.0 <= a.0 - position {
                true => Some(distance(b)),
                false => Some(distance(a)),
            },
            (Some(b), None) => Some(distance(b)),
            (None, Some(a)) => Some(distance(a)),
            (None, None) => None,
        }
    }
}

/// Bin sites by signed distance to their closest TSS.
///
/// Sites further than `max_distance` from every TSS are dropped, and bins without a single
/// non-ambiguous site produce no row.
pub fn tss_profile(
    sites: &[SiteCall],
    tss: &[Region],
    bin_width: u64,
    max_distance: u64,
    threshold: f64,
) -> Vec<ProfileBin> {
    let width = bin_width.max(1) as i64;
    let index = TssIndex::new(tss);
    let mut bins: BTreeMap<i64, (usize, CallCounts)> = BTreeMap::new();

    for site in sites {
        let Some(distance) = index.closest(&site.contig, site.position) else { continue };
        if distance.unsigned_abs() > max_distance {
            continue;
        }
        let (num_sites, counts) = bins.entry(distance.div_euclid(width) * width).or_default();
        *num_sites += 1;
        counts.add(site.score, threshold);
    }

    bins.into_iter()
        .filter_map(|(bin_start, (num_sites, counts))| {
            Some(ProfileBin {
                bin_start,
                bin_end: bin_start + width,
                num_sites,
                methylated: counts.methylated,
                unmethylated: counts.unmethylated,
                ambiguous: counts.ambiguous,
                fraction_methylated: counts.fraction_methylated()?,
            })
        })
        .collect()
}

/// Profile a site table against a BED file of TSS.
pub fn tss_profile_file<P>(
    sites: &P,
    tss: &P,
    bin_width: u64,
    max_distance: u64,
    threshold: f64,
    output: &P,
) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    let sites = read_sites(sites)?;
    let tss = read_bed(tss)?;
    let bins = tss_profile(&sites, &tss, bin_width, max_distance, threshold);
    info!("Profiled {} sites around {} TSS into {} bins.", sites.len(), tss.len(), bins.len());
    write_table(output, &bins)
}
