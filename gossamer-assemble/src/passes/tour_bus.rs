//! Bubble detection via a bounded, per-seed Dijkstra exploration
//! (`pop-bubbles`).
//!
//! For each branching node, explore outward along linear-path segments,
//! tracking the fastest (highest-coverage-weighted) way to reach every
//! node within `2 * maxSequenceLength` bases. Whenever two different
//! ways to reach the same node are found, the pair is a bubble
//! candidate: reconstruct both branches back to their lowest common
//! ancestor, compare the two sequences, and delete the minority branch
//! if they are within the configured length/edit-distance tolerance.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};

use priority_queue::PriorityQueue;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use gossamer_common::{Edge, Node, RankType, Result};

use crate::config::TourBusConfig;
use crate::graph::{Graph, GraphTrimmer};

pub struct TourBusResult {
    pub graph: Graph,
    pub bubbles_popped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Time(f64);
impl Eq for Time {}
impl Ord for Time {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A linear-path segment walked from a branching node: its head edge,
/// its full edge list, and summary stats used for Dijkstra weighting.
struct Segment {
    head: Edge,
    edges: Vec<Edge>,
    ranks: Vec<RankType>,
    mean_coverage: f64,
}

fn walk_segment(graph: &Graph, head: Edge) -> Result<Segment> {
    let mut edges = Vec::new();
    let mut ranks = Vec::new();
    graph.linear_path(head, |e, r| {
        edges.push(e);
        ranks.push(r);
    });
    let mut sum = 0u64;
    for &r in &ranks {
        sum += graph.multiplicity(r)? as u64;
    }
    let mean_coverage = sum as f64 / ranks.len().max(1) as f64;
    Ok(Segment {
        head,
        edges,
        ranks,
        mean_coverage,
    })
}

/// Every node with in-degree != 1 or out-degree != 1 becomes a seed,
/// ordered descending by the maximum multiplicity among its incoming
/// edges so popular branches are explored first.
fn select_seeds(graph: &Graph) -> Result<Vec<Node>> {
    let mut seeds = Vec::new();
    let mut r = 0;
    while r < graph.count() {
        let n = graph.from(graph.select(r));
        let end = graph.end_rank(n);
        if graph.in_degree(n) != 1 || graph.out_degree(n) != 1 {
            seeds.push(n);
        }
        r = end.max(r + 1);
    }

    let mut keyed = Vec::with_capacity(seeds.len());
    for n in seeds {
        let rc = graph.reverse_complement_node(n);
        let mut max_in = 0u32;
        for e in graph.out_edges(rc) {
            max_in = max_in.max(graph.multiplicity(graph.rank(e))?);
        }
        keyed.push((n, max_in));
    }
    keyed.sort_by_key(|&(_, m)| Reverse(m));
    Ok(keyed.into_iter().map(|(n, _)| n).collect())
}

fn node_chain(predecessor: &FxHashMap<Node, (Node, Edge)>, mut node: Node, start: Node) -> Vec<Node> {
    let mut nodes = vec![node];
    while node != start {
        let (parent, _) = predecessor[&node];
        node = parent;
        nodes.push(node);
    }
    nodes.reverse();
    nodes
}

fn head_edge_chain(predecessor: &FxHashMap<Node, (Node, Edge)>, mut node: Node, start: Node) -> Vec<Edge> {
    let mut edges = Vec::new();
    while node != start {
        let (parent, edge) = predecessor[&node];
        edges.push(edge);
        node = parent;
    }
    edges.reverse();
    edges
}

fn expand_segment_edges(graph: &Graph, heads: &[Edge]) -> Vec<Edge> {
    let mut out = Vec::new();
    for &h in heads {
        graph.linear_path(h, |e, _r| out.push(e));
    }
    out
}

fn edit_distance(a: &[u8], b: &[u8]) -> usize {
    let (n, m) = (a.len(), b.len());
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut cur = vec![0usize; m + 1];
    for i in 1..=n {
        cur[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[m]
}

fn mean_coverage_of(graph: &Graph, edges: &[Edge]) -> Result<f64> {
    if edges.is_empty() {
        return Ok(0.0);
    }
    let mut sum = 0u64;
    for &e in edges {
        sum += graph.multiplicity(graph.rank(e))? as u64;
    }
    Ok(sum as f64 / edges.len() as f64)
}

/// Compare the two branches between the LCA and the meeting node; if
/// within tolerance, mark the minority branch (lower mean coverage) for
/// deletion and return whether a bubble was popped.
fn try_pop_bubble(
    graph: &Graph,
    trimmer: &GraphTrimmer,
    config: &TourBusConfig,
    majority_heads: &[Edge],
    minority_heads: &[Edge],
) -> Result<bool> {
    let majority_edges = expand_segment_edges(graph, majority_heads);
    let minority_edges = expand_segment_edges(graph, minority_heads);
    if majority_edges.is_empty() && minority_edges.is_empty() {
        return Ok(false);
    }

    let seq_a = super::contig_extractor::assemble_sequence(graph, &majority_edges);
    let seq_b = super::contig_extractor::assemble_sequence(graph, &minority_edges);

    if seq_a.len() as u64 > config.max_sequence_length || seq_b.len() as u64 > config.max_sequence_length {
        return Ok(false);
    }
    let len_diff = (seq_a.len() as i64 - seq_b.len() as i64).unsigned_abs();
    if len_diff > config.max_edit_distance {
        return Ok(false);
    }
    let dist = edit_distance(&seq_a, &seq_b) as u64;
    if dist > config.max_edit_distance {
        return Ok(false);
    }
    let max_len = seq_a.len().max(seq_b.len()).max(1) as f64;
    if dist as f64 / max_len > config.max_relative_errors {
        return Ok(false);
    }

    let major_cov = mean_coverage_of(graph, &majority_edges)?;
    let minor_cov = mean_coverage_of(graph, &minority_edges)?;
    if let Some(cutoff) = config.cutoff {
        if minor_cov < cutoff as f64 {
            return Ok(false);
        }
    }
    if let Some(rel) = config.relative_cutoff {
        if minor_cov < rel * major_cov {
            return Ok(false);
        }
    }

    for e in &minority_edges {
        trimmer.delete_edge(graph.rank(*e));
    }
    Ok(true)
}

fn explore_from(
    graph: &Graph,
    trimmer: &GraphTrimmer,
    start: Node,
    config: &TourBusConfig,
    bubbles_popped: &AtomicU64,
) -> Result<()> {
    let mut distance: FxHashMap<Node, f64> = FxHashMap::default();
    let mut base_distance: FxHashMap<Node, u64> = FxHashMap::default();
    let mut predecessor: FxHashMap<Node, (Node, Edge)> = FxHashMap::default();
    let mut queue: PriorityQueue<Node, Reverse<Time>> = PriorityQueue::new();

    distance.insert(start, 0.0);
    base_distance.insert(start, 0);
    queue.push(start, Reverse(Time(0.0)));

    let mut dequeues = 0u64;
    while let Some((n, _)) = queue.pop() {
        dequeues += 1;
        if dequeues > config.max_passes {
            warn!(?start, dequeues, "tour bus exploration exceeded max_passes; abandoning");
            break;
        }
        let time_n = distance[&n];
        let dist_n = base_distance[&n];

        for head in graph.out_edges(n) {
            if trimmer.is_deleted(graph.rank(head)) {
                continue;
            }
            let segment = walk_segment(graph, head)?;
            if segment.edges.is_empty() {
                continue;
            }
            let edge_time = segment.edges.len() as f64 / segment.mean_coverage.max(1e-9);
            let total_time = time_n + edge_time;
            let total_dist = dist_n + segment.edges.len() as u64;
            if total_dist > 2 * config.max_sequence_length {
                continue;
            }
            let m = graph.to(*segment.edges.last().unwrap());

            match distance.get(&m) {
                None => {
                    distance.insert(m, total_time);
                    base_distance.insert(m, total_dist);
                    predecessor.insert(m, (n, head));
                    queue.push(m, Reverse(Time(total_time)));
                }
                Some(&existing_time) if total_time < existing_time => {
                    // The new path wins: compare it (majority-to-be)
                    // against the path currently recorded to `m`.
                    let new_chain_nodes = {
                        let mut chain = node_chain(&predecessor, n, start);
                        chain.push(m);
                        chain
                    };
                    let old_chain_nodes = node_chain(&predecessor, m, start);
                    let lca_index = new_chain_nodes
                        .iter()
                        .zip(old_chain_nodes.iter())
                        .take_while(|(a, b)| a == b)
                        .count()
                        .saturating_sub(1);

                    let mut new_heads = head_edge_chain(&predecessor, n, start);
                    new_heads.push(head);
                    let old_heads = head_edge_chain(&predecessor, m, start);

                    let lca = new_chain_nodes[lca_index.min(new_chain_nodes.len() - 1)];
                    let new_from_lca: Vec<Edge> = new_heads
                        .iter()
                        .skip(node_chain(&predecessor, n, start).iter().position(|&x| x == lca).unwrap_or(0))
                        .copied()
                        .collect();
                    let old_from_lca: Vec<Edge> = old_heads
                        .iter()
                        .skip(old_chain_nodes.iter().position(|&x| x == lca).unwrap_or(0))
                        .copied()
                        .collect();

                    if try_pop_bubble(graph, trimmer, config, &new_from_lca, &old_from_lca)? {
                        bubbles_popped.fetch_add(1, Ordering::Relaxed);
                    }

                    distance.insert(m, total_time);
                    base_distance.insert(m, total_dist);
                    predecessor.insert(m, (n, head));
                    queue.push(m, Reverse(Time(total_time)));
                }
                Some(_) => {
                    // The new path loses: the recorded path to `m` is
                    // the majority, the new one is the minority.
                    let new_chain_nodes = {
                        let mut chain = node_chain(&predecessor, n, start);
                        chain.push(m);
                        chain
                    };
                    let old_chain_nodes = node_chain(&predecessor, m, start);
                    let lca_index = new_chain_nodes
                        .iter()
                        .zip(old_chain_nodes.iter())
                        .take_while(|(a, b)| a == b)
                        .count()
                        .saturating_sub(1);
                    let lca = new_chain_nodes[lca_index.min(new_chain_nodes.len() - 1)];

                    let mut new_heads = head_edge_chain(&predecessor, n, start);
                    new_heads.push(head);
                    let old_heads = head_edge_chain(&predecessor, m, start);
                    let new_from_lca: Vec<Edge> = new_heads
                        .iter()
                        .skip(node_chain(&predecessor, n, start).iter().position(|&x| x == lca).unwrap_or(0))
                        .copied()
                        .collect();
                    let old_from_lca: Vec<Edge> = old_heads
                        .iter()
                        .skip(old_chain_nodes.iter().position(|&x| x == lca).unwrap_or(0))
                        .copied()
                        .collect();

                    if try_pop_bubble(graph, trimmer, config, &old_from_lca, &new_from_lca)? {
                        bubbles_popped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
    Ok(())
}

pub fn pop_bubbles(graph: &Graph, config: &TourBusConfig) -> Result<TourBusResult> {
    let trimmer = GraphTrimmer::new(graph);
    let seeds = select_seeds(graph)?;
    info!(seeds = seeds.len(), "tour bus seed selection complete");

    let bubbles_popped = AtomicU64::new(0);
    let errors: Vec<_> = seeds
        .into_par_iter()
        .filter_map(|seed| explore_from(graph, &trimmer, seed, config, &bubbles_popped).err())
        .collect();
    if let Some(e) = errors.into_iter().next() {
        return Err(e);
    }

    debug!(
        popped = bubbles_popped.load(Ordering::Relaxed),
        "tour bus pass complete"
    );
    let rebuilt = trimmer.build()?;
    Ok(TourBusResult {
        graph: rebuilt,
        bubbles_popped: bubbles_popped.load(Ordering::Relaxed),
    })
}
