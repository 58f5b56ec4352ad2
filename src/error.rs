//! Fatal build errors, typed so callers can inspect them with [`Report::downcast_ref`](color_eyre::eyre::Report::downcast_ref).

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// An artifact that could not be produced.
///
/// Every variant names the `target` artifact, so the first line of a failed run tells the
/// user which file is missing and why.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required source file is absent, and no step produces it.
    #[error("Failed to build {target}: input {path:?} does not exist and no step produces it.")]
    InputMissing { target: String, path: PathBuf },

    /// An external program exited unsuccessfully, its partial outputs were discarded.
    #[error("Failed to build {target}: {program} exited with {status}.")]
    ProcessFailed { target: String, program: String, status: ExitStatus },

    /// A step reported success but one of its declared outputs was never written.
    #[error("Failed to build {target}: declared output {path:?} was not produced.")]
    OutputMissing { target: String, path: PathBuf },

    /// A sample was used before being bound to a reference.
    #[error("No reference bound for sample {sample}")]
    UnboundSample { sample: String },
}

impl BuildError {
    /// Returns the name of the artifact that could not be produced, if the error concerns one.
    pub fn target(&self) -> Option<&str> {
        match self {
            BuildError::InputMissing { target, .. }
            | BuildError::ProcessFailed { target, .. }
            | BuildError::OutputMissing { target, .. } => Some(target),
            BuildError::UnboundSample { .. } => None,
        }
    }
}
