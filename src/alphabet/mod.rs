//! Recognition alphabets, and expansion of reference sequences into them.

use crate::utils::create_parent_dir;

use clap::ValueEnum;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::debug;
use noodles::fasta;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use strum::EnumIter;

// ----------------------------------------------------------------------------
// Alphabet
// ----------------------------------------------------------------------------

/// The symbol set that references and models are expressed in.
///
/// - [`Alphabet::Nucleotide`] is the plain `ACGT` alphabet. Expansion into it is the identity.
/// - [`Alphabet::Cpg`] adds `M`, a methylated cytosine in a `CG` context.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    EnumIter,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Alphabet {
    #[default]
    Nucleotide,
    Cpg,
}

impl Display for Alphabet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Alphabet::Nucleotide => "nucleotide",
            Alphabet::Cpg => "cpg",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Alphabet {
    type Err = Report;

    /// ```rust
    /// use nanometh::Alphabet;
    /// use std::str::FromStr;
    ///
    /// assert_eq!(Alphabet::from_str("cpg")?, Alphabet::Cpg);
    /// assert_eq!(Alphabet::from_str("nucleotide")?, Alphabet::Nucleotide);
    /// assert!(Alphabet::from_str("gpc").is_err());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    fn from_str(name: &str) -> Result<Self, Report> {
        let alphabet = match name {
            "nucleotide" => Alphabet::Nucleotide,
            "cpg" => Alphabet::Cpg,
            _ => Err(eyre!("Unknown alphabet: {name}"))
                .suggestion("Please choose from: nucleotide, cpg")?,
        };
        Ok(alphabet)
    }
}

impl Alphabet {
    /// Returns the symbols of the alphabet, in the order k-mers are enumerated.
    pub fn symbols(&self) -> &'static [u8] {
        match self {
            Alphabet::Nucleotide => b"ACGT",
            Alphabet::Cpg => b"ACGMT",
        }
    }

    /// Returns the distinguished symbol for a methylated base, if the alphabet has one.
    pub fn methylated_symbol(&self) -> Option<u8> {
        match self {
            Alphabet::Nucleotide => None,
            Alphabet::Cpg => Some(b'M'),
        }
    }

    /// Returns true if sites can be called as methylated in this alphabet.
    pub fn is_methylation_aware(&self) -> bool {
        self.methylated_symbol().is_some()
    }

    /// Returns a copy of `sequence` with every recognition motif rewritten to the alphabet.
    ///
    /// The output always has the same length as the input, so coordinates are unchanged.
    /// Lowercase (soft-masked) bases stay lowercase.
    ///
    /// ```rust
    /// use nanometh::Alphabet;
    ///
    /// assert_eq!(Alphabet::Cpg.expand_sequence(b"ACGTTCGcg"), b"AMGTTMGmg");
    /// assert_eq!(Alphabet::Nucleotide.expand_sequence(b"ACGT"), b"ACGT");
    /// ```
    pub fn expand_sequence(&self, sequence: &[u8]) -> Vec<u8> {
        let mut expanded = sequence.to_vec();
        if let Alphabet::Cpg = self {
            for i in 0..sequence.len().saturating_sub(1) {
                let (base, next) = (sequence[i], sequence[i + 1]);
                if base.eq_ignore_ascii_case(&b'C') && next.eq_ignore_ascii_case(&b'G') {
                    expanded[i] = if base.is_ascii_lowercase() { b'm' } else { b'M' };
                }
            }
        }
        expanded
    }

    /// Returns the unmodified k-mer a k-mer of this alphabet is derived from.
    ///
    /// ```rust
    /// use nanometh::Alphabet;
    /// assert_eq!(Alphabet::Cpg.unmodified_kmer("AMGTTA"), "ACGTTA");
    /// ```
    pub fn unmodified_kmer(&self, kmer: &str) -> String {
        match self.methylated_symbol() {
            Some(symbol) => kmer.replace(symbol as char, "C"),
            None => kmer.to_string(),
        }
    }

    /// Returns true if the k-mer contains the alphabet's methylated symbol.
    pub fn is_modified_kmer(&self, kmer: &str) -> bool {
        self.methylated_symbol().is_some_and(|symbol| kmer.as_bytes().contains(&symbol))
    }

    /// Returns every k-mer of length `k` over the alphabet, in lexicographic symbol order.
    ///
    /// ```rust
    /// use nanometh::Alphabet;
    ///
    /// assert_eq!(Alphabet::Nucleotide.kmers(1), ["A", "C", "G", "T"]);
    /// assert_eq!(Alphabet::Cpg.kmers(3).len(), 125);
    /// assert_eq!(Alphabet::Cpg.kmers(2)[..6], ["AA", "AC", "AG", "AM", "AT", "CA"]);
    /// ```
    pub fn kmers(&self, k: usize) -> Vec<String> {
        if k == 0 {
            return Vec::new();
        }
        (0..k)
            .map(|_| self.symbols().iter().copied())
            .multi_cartesian_product()
            .map(|symbols| String::from_utf8_lossy(&symbols).into_owned())
            .collect_vec()
    }
}

// ----------------------------------------------------------------------------
// Reference Expansion
// ----------------------------------------------------------------------------

/// Expand a fasta reference into an alphabet, writing the result to `output`.
///
/// For [`Alphabet::Nucleotide`] the output is a byte-identical copy of the input. Otherwise
/// every record is rewritten with [`Alphabet::expand_sequence`], keeping names, descriptions
/// and lengths.
///
/// ## Arguments
///
/// - `input` - Fasta reference.
/// - `alphabet` - Alphabet to expand into.
/// - `output` - Output fasta path.
///
/// ## Examples
///
/// ```rust
/// use nanometh::alphabet::{expand_reference, Alphabet};
///
/// let dir = tempfile::tempdir()?;
/// let input = dir.path().join("reference.fasta");
/// let output = dir.path().join("reference.cpg.fasta");
/// std::fs::write(&input, ">chr1\nTTCGAACG\n")?;
///
/// expand_reference(&input, Alphabet::Cpg, &output)?;
/// assert_eq!(std::fs::read_to_string(&output)?, ">chr1\nTTMGAAMG\n");
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn expand_reference<P, Q>(input: &P, alphabet: Alphabet, output: &Q) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
    Q: AsRef<Path> + Debug,
{
    create_parent_dir(output)?;

    if !alphabet.is_methylation_aware() {
        debug!("Copying reference {input:?} to {output:?}");
        std::fs::copy(input, output)
            .wrap_err_with(|| format!("Failed to copy reference {input:?} to {output:?}"))?;
        return Ok(());
    }

    let mut reader = File::open(input)
        .map(BufReader::new)
        .map(fasta::Reader::new)
        .wrap_err_with(|| format!("Failed to read reference: {input:?}"))?;
    let mut file = File::create(output)
        .map(BufWriter::new)
        .wrap_err_with(|| format!("Failed to create reference: {output:?}"))?;
    let mut writer = fasta::Writer::new(&mut file);

    for result in reader.records() {
        let record = result.wrap_err_with(|| format!("Failed to parse record in {input:?}"))?;
        let sequence = alphabet.expand_sequence(record.sequence().as_ref());
        debug!("Expanded {} ({} bp) into the {alphabet} alphabet", record.name(), sequence.len());
        let expanded =
            fasta::Record::new(record.definition().clone(), fasta::record::Sequence::from(sequence));
        writer
            .write_record(&expanded)
            .wrap_err_with(|| format!("Failed to write record {} to {output:?}", record.name()))?;
    }

    // errors on the final write would be lost when the buffer is dropped
    file.flush().wrap_err_with(|| format!("Failed to write reference: {output:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests;
