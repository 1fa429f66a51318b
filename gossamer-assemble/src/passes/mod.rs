//! The four graph-editing passes, each following the same shape: scan an
//! immutable [`crate::graph::Graph`], mark deletions/overrides through a
//! [`crate::graph::GraphTrimmer`], and emit a fresh graph.

pub mod contig_extractor;
pub mod coverage_trimmer;
pub mod tip_pruner;
pub mod tour_bus;

pub use contig_extractor::{extract_contigs, Contig};
pub use coverage_trimmer::{trim_graph, CoverageTrimResult};
pub use tip_pruner::prune_tips;
pub use tour_bus::{pop_bubbles, TourBusResult};
