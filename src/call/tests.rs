use crate::call::*;
use crate::utils::{read_table, write_table};

use color_eyre::eyre::{Report, Result};

fn raw(contig: &str, strand: Strand, start: u64, read: &str, ratio: f64) -> RawCall {
    RawCall {
        chromosome: contig.to_string(),
        strand,
        start,
        end: start + 1,
        read_name: read.to_string(),
        log_lik_ratio: ratio,
        log_lik_methylated: -100.0 + ratio,
        log_lik_unmethylated: -100.0,
        num_calling_strands: 1,
        num_motifs: 1,
        sequence: "ATCGGA".to_string(),
    }
}

/// Ratios with awkward binary expansions, so that summation order matters.
fn records() -> Vec<RawCall> {
    let mut records = Vec::new();
    for site in 0..20_u64 {
        for read in 0..7_u64 {
            let ratio = ((site * 7 + read) as f64 * 0.1 - 3.3) / 3.0;
            let strand = if (site + read) % 3 == 0 { Strand::Reverse } else { Strand::Forward };
            // reads arrive in reverse name order
            records.push(raw("chr1", strand, site * 10, &format!("read_{}", 6 - read), ratio));
        }
    }
    records.push(raw("chr2", Strand::Forward, 5, "read_9", 4.25));
    records
}

#[test]
fn views_reduce_to_site_scores() -> Result<(), Report> {
    let table = CallTable::from_records(records())?;
    let sites = table.sites(2.5);
    let from_reads = reduce_reads(&table.reads());
    let from_strands = reduce_strands(&table.strands());

    assert_eq!(sites.len(), 21);
    assert_eq!(from_reads.len(), sites.len());
    for site in &sites {
        assert_eq!(from_reads[&site.key()].to_bits(), site.score.to_bits());
        assert_eq!(from_strands[&site.key()].to_bits(), site.score.to_bits());
    }
    Ok(())
}

#[test]
fn split_views_agree_after_round_trip() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let raw_path = dir.path().join("calls.tsv");
    let sites_path = dir.path().join("sites.tsv");
    let reads_path = dir.path().join("reads.tsv");
    let strands_path = dir.path().join("strands.tsv");
    write_table(&raw_path, &records())?;

    split_calls(&raw_path, 2.5, &sites_path, &reads_path, &strands_path)?;
    let sites = read_sites(&sites_path)?;
    let reads: Vec<ReadCall> = read_table(&reads_path)?;
    let strands: Vec<StrandCall> = read_table(&strands_path)?;

    assert_eq!(reads.len(), 141);
    let from_reads = reduce_reads(&reads);
    let from_strands = reduce_strands(&strands);
    for site in &sites {
        assert_eq!(from_reads[&site.key()], site.score);
        assert_eq!(from_strands[&site.key()], site.score);
    }
    Ok(())
}

#[test]
fn site_strand_and_labels() -> Result<(), Report> {
    let table = CallTable::from_records(vec![
        raw("chr1", Strand::Forward, 100, "a", 3.0),
        raw("chr1", Strand::Forward, 100, "b", 1.0),
        raw("chr1", Strand::Reverse, 200, "a", -1.0),
        raw("chr1", Strand::Forward, 300, "a", 1.0),
        raw("chr1", Strand::Reverse, 300, "b", 0.5),
    ])?;
    let sites = table.sites(2.5);

    assert_eq!(sites[0].strand, Strand::Forward);
    assert_eq!(sites[0].score, 4.0);
    assert_eq!(sites[0].num_reads, 2);
    assert_eq!(sites[0].call, CallLabel::Methylated);

    assert_eq!(sites[1].strand, Strand::Reverse);
    assert_eq!(sites[1].call, CallLabel::Ambiguous);

    assert_eq!(sites[2].strand, Strand::Unstranded);
    assert_eq!(sites[2].score, 1.5);
    assert_eq!(table.strands().len(), 4);
    Ok(())
}

#[test]
fn repeated_read_is_error() {
    let records = vec![
        raw("chr1", Strand::Forward, 100, "a", 3.0),
        raw("chr1", Strand::Forward, 100, "a", 1.0),
    ];
    assert!(CallTable::from_records(records).is_err());
    assert!(CallTable::from_records(vec![raw("chr1", Strand::Forward, 1, "a", f64::NAN)]).is_err());
}

#[test]
fn empty_calls_produce_empty_views() -> Result<(), Report> {
    let table = CallTable::from_records(Vec::new())?;
    assert!(table.is_empty());
    assert!(table.sites(2.5).is_empty());
    assert!(reduce_reads(&table.reads()).is_empty());
    Ok(())
}
