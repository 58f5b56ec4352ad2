use crate::alphabet::{expand_reference, Alphabet};

use color_eyre::eyre::{Report, Result};
use std::str::FromStr;
use strum::IntoEnumIterator;

#[test]
fn display_round_trips_from_str() -> Result<(), Report> {
    for alphabet in Alphabet::iter() {
        assert_eq!(Alphabet::from_str(&alphabet.to_string())?, alphabet);
    }
    Ok(())
}

#[test]
fn no_motif_is_unchanged() {
    let sequence = b"AAGCTTGCATTTGCAAGC";
    assert_eq!(Alphabet::Cpg.expand_sequence(sequence), sequence);
}

#[test]
fn all_motifs_rewritten() {
    let sequence = b"CGCGCGCG";
    let expanded = Alphabet::Cpg.expand_sequence(sequence);
    assert_eq!(expanded.len(), sequence.len());
    assert_eq!(expanded, b"MGMGMGMG");
}

#[test]
fn motif_at_edges() {
    assert_eq!(Alphabet::Cpg.expand_sequence(b"CGA"), b"MGA");
    assert_eq!(Alphabet::Cpg.expand_sequence(b"AACG"), b"AAMG");
    assert_eq!(Alphabet::Cpg.expand_sequence(b"C"), b"C");
    assert_eq!(Alphabet::Cpg.expand_sequence(b""), b"");
    assert_eq!(Alphabet::Cpg.expand_sequence(b"cG"), b"mG");
}

#[test]
fn modified_kmers() {
    assert!(Alphabet::Cpg.is_modified_kmer("AAMGTT"));
    assert!(!Alphabet::Cpg.is_modified_kmer("AACGTT"));
    assert!(!Alphabet::Nucleotide.is_modified_kmer("AAMGTT"));
    assert_eq!(Alphabet::Cpg.unmodified_kmer("MGMGAA"), "CGCGAA");
    assert_eq!(Alphabet::Nucleotide.kmers(2).len(), 16);
    assert!(Alphabet::Cpg.kmers(0).is_empty());
}

#[test]
fn nucleotide_reference_is_byte_identical() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("ref.fasta");
    let output = dir.path().join("ref.nucleotide.fasta");
    // unusual line width is kept by the copy
    let contents = ">chr1 test\nACGTA\nCGTTT\n>chr2\nGGCC\n";
    std::fs::write(&input, contents)?;

    expand_reference(&input, Alphabet::Nucleotide, &output)?;
    assert_eq!(std::fs::read_to_string(&output)?, contents);
    Ok(())
}

#[test]
fn cpg_reference_keeps_records_and_lengths() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("ref.fasta");
    let output = dir.path().join("out").join("ref.cpg.fasta");
    // a motif split over a line break is still rewritten
    std::fs::write(&input, ">chr1 test\nACGTAC\nGTTT\n>chr2\nGGCC\n")?;

    expand_reference(&input, Alphabet::Cpg, &output)?;
    let observed = std::fs::read_to_string(&output)?;
    assert_eq!(observed, ">chr1 test\nAMGTAMGTTT\n>chr2\nGGCC\n");
    Ok(())
}

#[test]
fn missing_reference_is_error() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let result = expand_reference(
        &dir.path().join("absent.fasta"),
        Alphabet::Cpg,
        &dir.path().join("absent.cpg.fasta"),
    );
    assert!(result.is_err());
    Ok(())
}

#[test]
fn large_reference_is_written_completely() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("ref.fasta");
    let output = dir.path().join("ref.cpg.fasta");
    // several records, together larger than the write buffer
    let contents: String = (1..=4).map(|i| format!(">chr{i}\n{}\n", "TTCGAACGTA".repeat(1000))).collect();
    std::fs::write(&input, contents)?;

    expand_reference(&input, Alphabet::Cpg, &output)?;
    let observed = std::fs::read_to_string(&output)?;
    assert_eq!(observed.lines().filter(|line| line.starts_with('>')).count(), 4);
    let last: String = observed.split(">chr4\n").nth(1).unwrap_or_default().lines().collect();
    assert_eq!(last, "TTMGAAMGTA".repeat(1000));
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn failed_final_write_is_an_error() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("ref.fasta");
    std::fs::write(&input, ">chr1\nTTCGAACG\n")?;
    // the record fits in the write buffer, so the device is only written on flush
    assert!(expand_reference(&input, Alphabet::Cpg, &std::path::PathBuf::from("/dev/full")).is_err());
    Ok(())
}
