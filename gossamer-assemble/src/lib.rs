//! The gossamer assembly engine: k-mer counting, the succinct de Bruijn
//! graph, the trim/prune/pop editing passes, and contig extraction.
//!
//! Modules are layered leaves-first, matching the dependency order laid
//! out in the crate's design ledger: [`bitops`] and [`concurrent`] are
//! the succinct-storage and parallelism primitives; [`kmer`] is 2-bit DNA
//! packing; [`graph`] is the immutable succinct de Bruijn graph and its
//! builder/trimmer; [`passes`] are the four graph-editing/extraction
//! operations; [`config`] collects every pass's options; [`pipeline`]
//! composes them into the build → trim → prune → pop → contigs flow.

pub mod bitops;
pub mod concurrent;
pub mod config;
pub mod graph;
pub mod kmer;
pub mod passes;
pub mod pipeline;

pub use config::PipelineConfig;
pub use graph::{Graph, GraphBuilder, GraphTrimmer};
pub use pipeline::run_pipeline;
