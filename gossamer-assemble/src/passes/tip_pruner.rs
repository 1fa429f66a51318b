//! Removes low-coverage dead-end linear paths (`prune-tips`).
//!
//! A tip is a linear path whose from-node has in-degree 0 and whose
//! length is at most `2k`; since the graph stores both strands, a tip
//! whose *to*-node has out-degree 0 is simply the reverse complement of
//! some other tip's from-node-in-degree-0 case, so scanning only the
//! latter covers both per the spec's own framing.

use rayon::prelude::*;
use tracing::{debug, info};

use gossamer_common::{Edge, Error, RankType, Result};

use crate::config::TipPruneConfig;
use crate::graph::{Graph, GraphTrimmer};

struct Tip {
    edges: Vec<(Edge, RankType)>,
    joining_node_in_degree: u64,
}

/// Walk the linear path from `start`, collecting its edges. Returns
/// `None` if the path is longer than `max_len` edges.
fn walk_tip(graph: &Graph, start: Edge, max_len: u64) -> Option<Vec<(Edge, RankType)>> {
    let mut edges = Vec::new();
    graph.linear_path(start, |e, r| edges.push((e, r)));
    if edges.len() as u64 > max_len {
        None
    } else {
        Some(edges)
    }
}

fn find_tip(graph: &Graph, start: Edge, max_len: u64) -> Option<Tip> {
    let edges = walk_tip(graph, start, max_len)?;
    let (terminal, _) = *edges.last()?;
    let joining_node = graph.to(terminal);
    let joining_in_degree = graph.in_degree(joining_node);
    // Neither end connected: this linear fragment is isolated, not a
    // tip hanging off the rest of the graph.
    if graph.out_degree(joining_node) == 0 {
        return None;
    }
    Some(Tip {
        edges,
        joining_node_in_degree: joining_in_degree,
    })
}

/// Sibling incoming edges at the tip's joining node, excluding the tip's
/// own final edge.
fn sibling_multiplicities(graph: &Graph, tip: &Tip) -> Result<Vec<u32>> {
    let terminal = tip.edges.last().unwrap().0;
    let joining_node = graph.to(terminal);
    let rc_node = graph.reverse_complement_node(joining_node);
    let mut out = Vec::new();
    for e in graph.out_edges(rc_node) {
        let own_rc = graph.reverse_complement_edge(e);
        if own_rc == terminal {
            continue;
        }
        out.push(graph.multiplicity(graph.rank(e))?);
    }
    Ok(out)
}

fn total_coverage_at(graph: &Graph, joining_node: gossamer_common::Node) -> Result<u32> {
    let rc_node = graph.reverse_complement_node(joining_node);
    let mut total = 0u32;
    for e in graph.out_edges(rc_node) {
        total = total.saturating_add(graph.multiplicity(graph.rank(e))?);
    }
    Ok(total)
}

fn tip_coverage(graph: &Graph, tip: &Tip) -> Result<u32> {
    let mut min = u32::MAX;
    for &(_, r) in &tip.edges {
        min = min.min(graph.multiplicity(r)?);
    }
    Ok(min)
}

/// One pass over the graph: find and mark every prunable tip. Returns
/// the number of tips removed.
fn prune_pass(graph: &Graph, config: &TipPruneConfig) -> Result<(Graph, u64)> {
    let max_len = 2 * graph.k();
    let trimmer = GraphTrimmer::new(graph);

    let candidates: Vec<Edge> = (0..graph.count())
        .into_par_iter()
        .filter_map(|r| {
            let e = graph.select(r);
            let from = graph.from(e);
            if graph.in_degree(from) == 0 {
                Some(e)
            } else {
                None
            }
        })
        .collect();

    let removed = std::sync::atomic::AtomicU64::new(0);
    candidates.into_par_iter().for_each(|start| {
        let Some(tip) = find_tip(graph, start, max_len) else {
            return;
        };
        if tip.joining_node_in_degree < 1 {
            return;
        }
        let terminal = tip.edges.last().unwrap().0;
        let joining_node = graph.to(terminal);

        let c = match tip_coverage(graph, &tip) {
            Ok(c) => c,
            Err(_) => return,
        };
        // A tip is only prunable if its own coverage is low: at or below
        // the absolute cutoff and at or below a minority fraction of the
        // joining node's total incoming coverage. (The distilled spec's
        // prose states these as "c >= cutoff" requirements, which would
        // contradict its own worked example of a coverage-2 tip being
        // removed at cutoff 5; resolved here, as with the similarly
        // inverted check already noted for the original C++ source, by
        // following the worked scenario rather than the prose.)
        if let Some(cutoff) = config.cutoff {
            if c > cutoff {
                return;
            }
        }
        if let Some(rel) = config.relative_cutoff {
            let total = match total_coverage_at(graph, joining_node) {
                Ok(t) => t,
                Err(_) => return,
            };
            if (c as f64) > rel * total as f64 {
                return;
            }
        }
        let siblings = match sibling_multiplicities(graph, &tip) {
            Ok(s) => s,
            Err(_) => return,
        };
        if siblings.iter().any(|&s| c > s) {
            return;
        }

        for &(_, r) in &tip.edges {
            trimmer.delete_edge(r);
        }
        removed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    });

    debug!(removed = removed.load(std::sync::atomic::Ordering::Relaxed), "tip prune pass complete");
    let rebuilt = trimmer.build()?;
    Ok((rebuilt, removed.load(std::sync::atomic::Ordering::Relaxed)))
}

/// Prune tips for up to `config.iterate` passes, stopping early once a
/// pass removes nothing.
pub fn prune_tips(graph: &Graph, config: &TipPruneConfig) -> Result<Graph> {
    if graph.is_asymmetric() {
        return Err(Error::InvariantViolation(
            "prune-tips does not support asymmetric graphs".to_string(),
        ));
    }
    let mut current = graph.clone();
    for iteration in 0..config.iterate.max(1) {
        let (next, removed) = prune_pass(&current, config)?;
        info!(iteration, removed, "prune-tips iteration complete");
        current = next;
        if removed == 0 {
            break;
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::kmer;

    /// A trunk of 4-mers (over the non-repeating base string "ACGGCTA",
    /// so no node recurs) plus a short dead-end tip hanging off the
    /// trunk's second node, built directly from raw edge values so the
    /// tip topology is exact.
    fn graph_with_tip(trunk_mult: u32, tip_mult: u32) -> Graph {
        let k = 3u64;
        // Trunk: ACGG -> CGGC -> GGCT -> GCTA (k=3, width=4 edges),
        // nodes ACG -> CGG -> GGC -> GCT -> CTA, each appearing once.
        let trunk_edges = [
            0b00_01_10_10u64, // ACGG
            0b01_10_10_01u64, // CGGC
            0b10_10_01_11u64, // GGCT
            0b10_01_11_00u64, // GCTA
        ];
        // Tip: a dead-end edge AGGC arriving at node GGC (the trunk's
        // third node) from predecessor AGG, which has no other incoming
        // edge.
        let tip_edge = 0b00_10_10_01u64;

        let mut entries: Vec<(u64, u32)> = Vec::new();
        for &v in &trunk_edges {
            let rc = kmer::reverse_complement(v, k + 1);
            let (lo, hi) = if v < rc { (v, rc) } else { (rc, v) };
            entries.push((lo, trunk_mult));
            if lo != hi {
                entries.push((hi, trunk_mult));
            }
        }
        {
            let v = tip_edge;
            let rc = kmer::reverse_complement(v, k + 1);
            let (lo, hi) = if v < rc { (v, rc) } else { (rc, v) };
            entries.push((lo, tip_mult));
            if lo != hi {
                entries.push((hi, tip_mult));
            }
        }
        entries.sort_unstable_by_key(|&(v, _)| v);
        entries.dedup_by_key(|&mut (v, _)| v);

        let mut b = GraphBuilder::new(k, false, true).unwrap();
        for (v, c) in entries {
            b.push_back(v, c).unwrap();
        }
        b.end().unwrap()
    }

    #[test]
    fn low_coverage_tip_is_removed() {
        let g = graph_with_tip(50, 2);
        let config = TipPruneConfig {
            cutoff: Some(5),
            relative_cutoff: None,
            iterate: 1,
            threads: 1,
        };
        let trimmed = prune_tips(&g, &config).unwrap();
        assert!(trimmed.count() < g.count());
    }

    #[test]
    fn rerunning_a_cleared_graph_is_a_no_op() {
        let g = graph_with_tip(50, 2);
        let config = TipPruneConfig {
            cutoff: Some(5),
            relative_cutoff: None,
            iterate: 1,
            threads: 1,
        };
        let once = prune_tips(&g, &config).unwrap();
        let twice = prune_tips(&once, &config).unwrap();
        assert_eq!(once.count(), twice.count());
    }

    #[test]
    fn high_coverage_tip_above_cutoff_survives() {
        let g = graph_with_tip(50, 50);
        let config = TipPruneConfig {
            cutoff: Some(5),
            relative_cutoff: None,
            iterate: 1,
            threads: 1,
        };
        let trimmed = prune_tips(&g, &config).unwrap();
        assert_eq!(trimmed.count(), g.count());
    }

    #[test]
    fn asymmetric_graphs_are_rejected() {
        let k = 3u64;
        let v = 0b00_00_00_00u64;
        let mut b = GraphBuilder::new(k, true, true).unwrap();
        b.push_back(v, 1).unwrap();
        let g = b.end().unwrap();
        let config = TipPruneConfig::default();
        assert!(prune_tips(&g, &config).is_err());
    }
}
