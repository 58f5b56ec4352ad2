//! `nanometh` orchestrates nanopore **METH**ylation calling, from raw reads to per-region summaries.
//!
//! ## Overview
//!
//! 1. Every derived file is an artifact whose name encodes the sample, alphabet and stage that
//!    produced it. An artifact is valid iff it exists and is newer than every artifact it was
//!    derived from, otherwise it is rebuilt.
//!
//! 1. The pipeline is declared in a JSON [`Config`]. Each (sample, alphabet) pair expands into a
//!    subtree of steps: index, align, sort, expand the reference and models into the alphabet,
//!    train, call, and aggregate over region annotations.
//!
//! 1. Alignment, training and calling are delegated to external programs through a [`Runner`].
//!    Alphabet expansion, call views, region aggregation and accuracy evaluation run in-process.
//!
//! ```json
//! {
//!   "work_dir": "work",
//!   "references": { "ecoli": "ecoli_k12.fasta" },
//!   "seed_models": { "r9": "r9.nucleotide.fofn" },
//!   "alphabets": ["cpg"],
//!   "samples": [
//!     { "id": "ecoli.sssi", "reads": "sssi.fasta", "reference": "ecoli", "seed": "r9", "train": true }
//!   ]
//! }
//! ```

pub mod alphabet;
pub mod call;
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod pipeline;
pub mod region;
pub mod resolve;
pub mod tools;
pub mod training;
pub mod utils;

#[doc(inline)]
pub use crate::alphabet::Alphabet;
#[doc(inline)]
pub use crate::cli::Cli;
#[doc(inline)]
pub use crate::config::Config;
#[doc(inline)]
pub use crate::error::BuildError;
#[doc(inline)]
pub use crate::pipeline::Pipeline;
#[doc(inline)]
pub use crate::resolve::Resolver;
#[doc(inline)]
pub use crate::tools::Runner;
#[doc(inline)]
pub use utils::verbosity::Verbosity;
