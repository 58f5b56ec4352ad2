use crate::call::{CallLabel, SiteCall, Strand};
use crate::evaluate::*;
use crate::utils::{read_table, write_table};

use color_eyre::eyre::{Report, Result};
use itertools::Itertools;

fn site(position: u64, score: f64, context: &str) -> SiteCall {
    SiteCall {
        contig: "chr20".to_string(),
        position,
        end: position + 1,
        strand: Strand::Forward,
        score,
        call: CallLabel::classify(score, 2.5),
        num_reads: 1,
        num_motifs: 1,
        context: context.to_string(),
    }
}

#[test]
fn roc_is_monotone() {
    let negatives = [-7.2, -3.1, -3.1, -0.4, 0.0, 1.2, 2.6, f64::NAN];
    let positives = [-2.0, 0.0, 0.9, 3.3, 4.8, 4.8, 11.0];
    let curve = roc(&negatives, &positives);

    assert!(curve.iter().tuple_windows().all(|(a, b)| a.threshold < b.threshold));
    assert!(curve.iter().tuple_windows().all(|(a, b)| b.tpr <= a.tpr && b.fpr <= a.fpr));
    assert_eq!(curve.last().map(|p| p.threshold), Some(f64::INFINITY));
    assert_eq!((curve[0].tpr, curve[0].fpr), (1.0, 1.0));
}

#[test]
fn roc_thresholds_are_distinct_scores() {
    let curve = roc(&[-1.0, 0.0], &[0.0, 2.0]);
    let thresholds = curve.iter().map(|p| p.threshold).collect_vec();
    assert_eq!(thresholds, [-1.0, 0.0, 2.0, f64::INFINITY]);

    // at 0.0: positives {0, 2} and negatives {0} are called
    assert_eq!((curve[1].tpr, curve[1].fpr), (1.0, 0.5));
    assert_eq!((curve[2].tpr, curve[2].fpr), (0.5, 0.0));
}

#[test]
fn empty_controls() {
    let curve = roc(&[], &[1.0]);
    assert!(curve.iter().all(|p| p.fpr == 0.0));
    assert_eq!(roc(&[], &[]).len(), 1);
    assert_eq!(auc(&roc(&[], &[])), 0.0);
}

#[test]
fn precision_recall_points() {
    let curve = precision_recall(&[-1.0, 1.0], &[1.0, 3.0]);
    assert_eq!(curve.len(), 4);
    assert_eq!(curve[1], PrPoint { threshold: 1.0, precision: Some(2.0 / 3.0), recall: 1.0 });
    assert_eq!(curve[2], PrPoint { threshold: 3.0, precision: Some(1.0), recall: 0.5 });
    assert_eq!(curve[3], PrPoint { threshold: f64::INFINITY, precision: None, recall: 0.0 });
}

#[test]
fn auc_of_partial_overlap() {
    // negatives -1, 1 and positives 0, 2: 3 of 4 pairs ranked correctly
    let area = auc(&roc(&[-1.0, 1.0], &[0.0, 2.0]));
    assert!((area - 0.75).abs() < 1e-12);
}

#[test]
fn kmer_breakdown_by_context() {
    let unmethylated = [site(1, -5.0, "aaCGtt"), site(2, 3.0, "AACGTT"), site(3, 0.1, "GGCGCC")];
    let methylated = [site(1, 5.0, "AACGTT"), site(2, -3.0, "GGCGCC"), site(3, 4.0, "GGCGCC")];
    let rows = kmer_breakdown(&unmethylated, &methylated, 2.5);

    assert_eq!(rows.iter().map(|r| r.context.as_str()).collect_vec(), ["AACGTT", "GGCGCC"]);
    let aacgtt = &rows[0];
    assert_eq!((aacgtt.positives, aacgtt.negatives), (1, 2));
    assert_eq!((aacgtt.true_positives, aacgtt.true_negatives, aacgtt.false_positives), (1, 1, 1));
    assert_eq!(aacgtt.accuracy, Some(2.0 / 3.0));

    let ggcgcc = &rows[1];
    assert_eq!((ggcgcc.ambiguous, ggcgcc.false_negatives, ggcgcc.true_positives), (1, 1, 1));
    assert_eq!(ggcgcc.accuracy, Some(0.5));
}

#[test]
fn ambiguous_only_kmer_has_no_accuracy() {
    let rows = kmer_breakdown(&[site(1, 0.5, "TTCGAA")], &[], 2.5);
    assert_eq!(rows[0].ambiguous, 1);
    assert_eq!(rows[0].accuracy, None);
}

#[test]
fn evaluate_files_writes_tables() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let path = |name: &str| dir.path().join(name);
    write_table(&path("pcr.sites.tsv"), &[site(1, -4.0, "AACGTT"), site(2, -0.5, "AACGTT")])?;
    write_table(&path("sssi.sites.tsv"), &[site(1, 6.0, "AACGTT"), site(2, 3.0, "GGCGCC")])?;

    let area = evaluate_files(
        &path("pcr.sites.tsv"),
        &path("sssi.sites.tsv"),
        2.5,
        &path("eval.roc.tsv"),
        &path("eval.pr.tsv"),
        &path("eval.kmers.tsv"),
    )?;
    assert_eq!(area, 1.0);

    let roc: Vec<RocPoint> = read_table(&path("eval.roc.tsv"))?;
    assert_eq!(roc.len(), 5);
    let pr: Vec<PrPoint> = read_table(&path("eval.pr.tsv"))?;
    assert_eq!(pr.last().and_then(|p| p.precision), None);
    let kmers: Vec<KmerBreakdown> = read_table(&path("eval.kmers.tsv"))?;
    assert_eq!(kmers.len(), 2);
    let header = std::fs::read_to_string(path("eval.kmers.tsv"))?;
    assert!(header.starts_with("context\tpositives\t"));
    Ok(())
}

#[test]
fn grouped_sites_share_their_whole_context() {
    // two motifs called as one group are one stratum, distinct from either motif alone
    let group = "AACGTTACGTT";
    let rows = kmer_breakdown(&[site(1, -4.0, group)], &[site(1, 4.0, group), site(2, 4.0, "AACGTT")], 2.5);
    assert_eq!(rows.iter().map(|r| r.context.as_str()).collect_vec(), ["AACGTT", group]);
    assert_eq!((rows[1].positives, rows[1].negatives, rows[1].accuracy), (1, 1, Some(1.0)));
}
