//! Traces maximal linear paths and emits assembled contigs
//! (`print-contigs`, linear-segment mode).
//!
//! Supergraph mode (consuming a previously built scaffold structure) is
//! out of scope here; only the interface it would consume — an edge
//! list plus a sequence assembler — is modelled, via [`assemble_sequence`].

use gossamer_common::{Edge, RankType, Result};

use crate::config::ContigExtractConfig;
use crate::graph::Graph;
use crate::kmer;

/// One assembled contig: its base sequence plus summary coverage stats.
#[derive(Debug, Clone)]
pub struct Contig {
    pub sequence: Vec<u8>,
    pub min_coverage: u32,
    pub max_coverage: u32,
    pub mean_coverage: f64,
}

/// Seed the sequence with the `k` bases of the first edge's from-node,
/// then append the last base of every edge in order (including the
/// first), per the spec's sequence-assembly rule.
pub fn assemble_sequence(graph: &Graph, edges: &[Edge]) -> Vec<u8> {
    if edges.is_empty() {
        return Vec::new();
    }
    let mut seq = kmer::to_bases(graph.from(edges[0]).value(), graph.k());
    for &e in edges {
        let last_base = e.value() & 0b11;
        seq.push(match last_base {
            0b00 => b'A',
            0b01 => b'C',
            0b10 => b'G',
            _ => b'T',
        });
    }
    seq
}

fn coverage_stats(graph: &Graph, ranks: &[RankType]) -> Result<(u32, u32, f64)> {
    let mut min = u32::MAX;
    let mut max = 0u32;
    let mut sum = 0u64;
    for &r in ranks {
        let m = graph.multiplicity(r)?;
        min = min.min(m);
        max = max.max(m);
        sum += m as u64;
    }
    let mean = if ranks.is_empty() {
        0.0
    } else {
        sum as f64 / ranks.len() as f64
    };
    Ok((min, max, mean))
}

/// Walk every linear path in the graph once, skipping already-visited
/// strands, and emit a [`Contig`] per path meeting the length/coverage
/// thresholds.
pub fn extract_contigs(graph: &Graph, config: &ContigExtractConfig) -> Result<Vec<Contig>> {
    let mut seen = vec![false; graph.count() as usize];
    let mut contigs = Vec::new();

    for start_rank in 0..graph.count() {
        if seen[start_rank as usize] {
            continue;
        }
        let start_edge = graph.select(start_rank);
        let from = graph.from(start_edge);
        // Only walk from an edge whose from-node is branching (or the
        // start of an as-yet-unseen path); everything else gets visited
        // as part of some other edge's walk.
        if graph.in_degree(from) == 1 && graph.out_degree(from) == 1 {
            continue;
        }

        let mut edges = Vec::new();
        let mut ranks = Vec::new();
        graph.linear_path(start_edge, |e, r| {
            edges.push(e);
            ranks.push(r);
        });

        for &r in &ranks {
            seen[r as usize] = true;
            let rc_rank = graph.reverse_complement_rank(r);
            seen[rc_rank as usize] = true;
        }

        let (min_cov, max_cov, mean_cov) = coverage_stats(graph, &ranks)?;
        let length = graph.k() + edges.len() as u64;
        if length < config.min_length || min_cov < config.min_coverage {
            continue;
        }

        contigs.push(Contig {
            sequence: assemble_sequence(graph, &edges),
            min_coverage: min_cov,
            max_coverage: max_cov,
            mean_coverage: mean_cov,
        });
    }

    Ok(contigs)
}
