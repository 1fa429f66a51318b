//! Drives the whole assembly flow: k-mer counting, graph construction,
//! and the ordered trim → prune → pop → extract editing passes.

use std::cmp::Ordering;

use anyhow::Context as _;
use rayon::prelude::*;
use tracing::info;

use gossamer_common::Result;

use crate::concurrent::{blended_sort, BackyardHash};
use crate::config::{BuildConfig, PipelineConfig};
use crate::graph::{Graph, GraphBuilder};
use crate::kmer;
use crate::passes::{extract_contigs, pop_bubbles, prune_tips, trim_graph, Contig};

/// Count every (k+1)-mer across `reads`, sort them ascending by key,
/// fold symmetric-mode duplicates, and stream the result into a fresh
/// [`Graph`].
///
/// Counting runs one [`BackyardHash`] per input read in parallel (each
/// thread owns a private accumulator keyed only by the read it's
/// processing — no cross-read synchronisation needed there), then
/// merges all the per-read tallies into one shared table before the
/// final sort, matching the "independent producers, one drain" shape
/// the counting hash itself is built for.
pub fn build_graph(reads: &[Vec<u8>], config: &BuildConfig) -> Result<Graph> {
    kmer::check_k(config.k)?;
    let item_bits = (2 * (config.k + 1)).min(64) as u32;
    let table = BackyardHash::new(item_bits, config.capacity_hint, config.ways_per_slot);

    reads.par_iter().for_each(|read| {
        for edge in kmer::edges_of_read(read, config.k, !config.asymmetric) {
            table.insert(edge);
        }
    });

    info!(stats = ?table.stats(), "k-mer counting complete");
    let counted = table.sort(config.threads)?;

    // The counting hash only ever sees canonical keys (each read window
    // already folded to its canonical strand before insertion), so a
    // symmetric graph needs its other strand expanded back in before
    // it can be built: every canonical edge's reverse complement gets
    // the same count, then the combined set is re-sorted by key.
    let mut expanded: Vec<(u64, u32)> = Vec::with_capacity(counted.len() * 2);
    for (edge, count) in counted {
        let clamped = count.min(u32::MAX as u64) as u32;
        expanded.push((edge, clamped));
        if !config.asymmetric {
            let rc = kmer::reverse_complement(edge, config.k + 1);
            if rc != edge {
                expanded.push((rc, clamped));
            }
        }
    }
    blended_sort::sort(&mut expanded, 64, config.threads, |item| item.0, |a, b| a.0.cmp(&b.0));

    let mut builder = GraphBuilder::new(config.k, config.asymmetric, true)?;
    for (edge, count) in expanded {
        builder.push_back(edge, count)?;
    }
    builder.end()
}

pub struct PipelineResult {
    pub graph: Graph,
    pub contigs: Vec<Contig>,
}

/// Run the whole `build → [trim-graph] → [prune-tips] → [pop-bubbles]
/// → print-contigs` flow, skipping any stage whose config is `None`.
///
/// Each stage's typed [`gossamer_common::Error`] is wrapped with
/// `anyhow::Context` naming the stage it came from, so a failure deep in
/// (say) `pop-bubbles` isn't reported bare — the caller sees which
/// pipeline stage it belongs to, the way the teacher's orchestration
/// steps attach context at each call site.
pub fn run_pipeline(reads: &[Vec<u8>], config: &PipelineConfig) -> anyhow::Result<PipelineResult> {
    config.validate().context("validating pipeline config")?;

    let mut graph = build_graph(reads, &config.build).context("build-graph stage")?;
    info!(edges = graph.count(), "graph built");

    if let Some(trim) = &config.coverage_trim {
        let result = trim_graph(&graph, trim).context("trim-graph stage")?;
        info!(cutoff = result.cutoff, "coverage trim complete");
        if let Some(trimmed) = result.graph {
            graph = trimmed;
        }
    }

    if let Some(prune) = &config.tip_prune {
        graph = prune_tips(&graph, prune).context("prune-tips stage")?;
        info!(edges = graph.count(), "tip pruning complete");
    }

    if let Some(tour_bus) = &config.tour_bus {
        let result = pop_bubbles(&graph, tour_bus).context("pop-bubbles stage")?;
        info!(
            popped = result.bubbles_popped,
            edges = result.graph.count(),
            "bubble popping complete"
        );
        graph = result.graph;
    }

    let contigs = extract_contigs(&graph, &config.contig_extract).context("print-contigs stage")?;
    info!(contigs = contigs.len(), "contig extraction complete");

    Ok(PipelineResult { graph, contigs })
}

/// Stable ordering helper used when a caller wants contigs sorted
/// longest-first before reporting them (FASTA output, summaries).
pub fn sort_contigs_by_length_desc(contigs: &mut [Contig]) {
    contigs.sort_by(|a, b| match b.sequence.len().cmp(&a.sequence.len()) {
        Ordering::Equal => b.mean_coverage.partial_cmp(&a.mean_coverage).unwrap_or(Ordering::Equal),
        other => other,
    });
}
