//! A directed acyclic graph of artifacts and the inputs they are derived from.
//!
//! Edges point from an input to the artifact derived from it. The graph is
//! built once, up front, and is never mutated while artifacts are being
//! resolved: build status lives in a separate side-table owned by the caller.

use color_eyre::eyre::{Report, Result};

mod dag;

#[doc(inline)]
pub use dag::Dag;
#[doc(inline)]
pub use petgraph::graph::NodeIndex;

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// Returns a [Graphviz](https://graphviz.org/) dot [`String`] created from an object.
pub trait ToDot {
    fn to_dot(&self) -> Result<String, Report>;
}

/// Returns a [Mermaid](https://mermaid.js.org/) [`String`] created from an object.
pub trait ToMermaid {
    fn to_mermaid(&self) -> Result<String, Report>;
}
