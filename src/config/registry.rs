use crate::error::BuildError;

use color_eyre::eyre::{eyre, Report, Result};
use color_eyre::Help;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Binds each sample to exactly one reference.
///
/// The registry is populated once, when the pipeline is planned, and lookups of an unbound
/// sample fail instead of resolving to an empty reference.
///
/// ## Examples
///
/// ```rust
/// use nanometh::config::ReferenceRegistry;
///
/// let mut registry = ReferenceRegistry::new();
/// registry.declare("ecoli", "ecoli_k12.fasta")?;
/// registry.bind("ecoli.sssi", "ecoli")?;
///
/// assert_eq!(registry.reference_of("ecoli.sssi")?, "ecoli");
/// assert!(registry.bind("ecoli.sssi", "human").is_err());
///
/// let error = registry.reference_of("NA12878").unwrap_err();
/// assert_eq!(error.to_string(), "No reference bound for sample NA12878");
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct ReferenceRegistry {
    references: BTreeMap<String, PathBuf>,
    bindings: BTreeMap<String, String>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        ReferenceRegistry::default()
    }

    /// Declare a reference by id.
    pub fn declare<P>(&mut self, reference: &str, path: P) -> Result<(), Report>
    where
        P: AsRef<Path>,
    {
        if self.references.contains_key(reference) {
            return Err(eyre!("Reference {reference} is declared more than once."));
        }
        self.references.insert(reference.to_string(), path.as_ref().to_path_buf());
        Ok(())
    }

    /// Bind a sample to a declared reference.
    ///
    /// Re-binding a sample to the same reference is a no-op, binding it to a different one is
    /// an error.
    pub fn bind(&mut self, sample: &str, reference: &str) -> Result<(), Report> {
        if !self.references.contains_key(reference) {
            return Err(eyre!("Sample {sample} is bound to undeclared reference {reference}."))
                .suggestion(format!(
                    "Declared references: {}",
                    self.references.keys().join(", ")
                ));
        }
        match self.bindings.get(sample) {
            Some(bound) if bound != reference => Err(eyre!(
                "Sample {sample} is already bound to reference {bound}, cannot bind it to {reference}."
            )),
            _ => {
                self.bindings.insert(sample.to_string(), reference.to_string());
                Ok(())
            }
        }
    }

    /// Returns the reference id a sample is bound to.
    pub fn reference_of(&self, sample: &str) -> Result<&str, Report> {
        self.bindings
            .get(sample)
            .map(String::as_str)
            .ok_or_else(|| BuildError::UnboundSample { sample: sample.to_string() }.into())
    }

    /// Returns the path of a declared reference.
    pub fn path_of(&self, reference: &str) -> Result<&Path, Report> {
        self.references
            .get(reference)
            .map(PathBuf::as_path)
            .ok_or_else(|| eyre!("Reference {reference} is not declared."))
    }
}
