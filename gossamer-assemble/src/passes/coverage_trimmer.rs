//! Histogram-driven minimum-coverage edge filter (`trim-graph`).

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use gossamer_common::Result;

use crate::config::CoverageTrimConfig;
use crate::graph::{Graph, GraphTrimmer};

/// The outcome of a coverage-trim pass: the cutoff used (explicit,
/// scaled, or inferred) and the trimmed graph, unless `estimate_only`
/// asked only for the cutoff itself.
pub struct CoverageTrimResult {
    pub cutoff: u32,
    pub graph: Option<Graph>,
}

fn build_histogram(graph: &Graph) -> Result<Vec<u64>> {
    let mut by_value: FxHashMap<u32, u64> = FxHashMap::default();
    let mut max_mult = 0u32;
    for r in 0..graph.count() {
        let m = graph.multiplicity(r)?;
        max_mult = max_mult.max(m);
        *by_value.entry(m).or_insert(0) += 1;
    }
    let mut hist = vec![0u64; max_mult as usize + 1];
    for (m, c) in by_value {
        hist[m as usize] = c;
    }
    Ok(hist)
}

/// Find the first multiplicity `m >= 1` after the initial descending
/// spike of sequencing-error singletons where the histogram's second
/// derivative turns non-negative (a local minimum).
fn infer_cutoff(hist: &[u64]) -> Option<u32> {
    if hist.len() < 3 {
        return None;
    }
    for m in 1..hist.len() - 1 {
        let d2 = hist[m + 1] as i64 - 2 * hist[m] as i64 + hist[m - 1] as i64;
        if hist[m] <= hist[m - 1] && d2 >= 0 {
            return Some(m as u32);
        }
    }
    None
}

pub fn trim_graph(graph: &Graph, config: &CoverageTrimConfig) -> Result<CoverageTrimResult> {
    config.validate()?;
    let histogram = build_histogram(graph)?;

    let cutoff = if let Some(explicit) = config.cutoff {
        if config.scale_cutoff_by_k {
            explicit.saturating_mul(graph.k() as u32)
        } else {
            explicit
        }
    } else if config.infer {
        match infer_cutoff(&histogram) {
            Some(c) => c,
            None => {
                warn!("no local minimum found in coverage histogram; defaulting cutoff to 1");
                1
            }
        }
    } else {
        return Err(gossamer_common::Error::Usage(
            "trim-graph requires either an explicit cutoff or --infer".to_string(),
        ));
    };
    info!(cutoff, "coverage cutoff determined");

    if config.estimate_only {
        return Ok(CoverageTrimResult {
            cutoff,
            graph: None,
        });
    }

    let trimmer = GraphTrimmer::new(graph);
    (0..graph.count()).into_par_iter().for_each(|r| {
        if let Ok(m) = graph.multiplicity(r) {
            if m <= cutoff {
                trimmer.delete_edge(r);
            }
        }
    });
    debug!(deleted = trimmer.deleted_count(), "coverage trim scan complete");
    let rebuilt = trimmer.build()?;
    Ok(CoverageTrimResult {
        cutoff,
        graph: Some(rebuilt),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::kmer;

    fn graph_with_multiplicities(pairs: &[(u64, u32)], k: u64) -> Graph {
        let mut entries: Vec<(u64, u32)> = Vec::new();
        for &(v, c) in pairs {
            let rc = kmer::reverse_complement(v, k + 1);
            let (lo, hi) = if v < rc { (v, rc) } else { (rc, v) };
            entries.push((lo, c));
            if lo != hi {
                entries.push((hi, c));
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
    fn explicit_cutoff_removes_low_multiplicity_edges() {
        let k = 3;
        let g = graph_with_multiplicities(&[(0b00_00_00_01, 1), (0b00_00_01_01, 40)], k);
        let config = CoverageTrimConfig {
            cutoff: Some(2),
            infer: false,
            scale_cutoff_by_k: false,
            estimate_only: false,
            threads: 1,
        };
        let result = trim_graph(&g, &config).unwrap();
        let trimmed = result.graph.unwrap();
        assert!(trimmed.count() < g.count());
        for r in 0..trimmed.count() {
            assert!(trimmed.multiplicity(r).unwrap() > 2);
        }
    }

    #[test]
    fn cutoff_zero_is_a_no_op() {
        let k = 3;
        let g = graph_with_multiplicities(&[(0b00_00_00_01, 5), (0b00_00_01_01, 40)], k);
        let config = CoverageTrimConfig {
            cutoff: Some(0),
            infer: false,
            scale_cutoff_by_k: false,
            estimate_only: false,
            threads: 1,
        };
        let result = trim_graph(&g, &config).unwrap();
        assert_eq!(result.graph.unwrap().count(), g.count());
    }

    #[test]
    fn estimate_only_reports_cutoff_without_a_graph() {
        let k = 3;
        let g = graph_with_multiplicities(&[(0b00_00_00_01, 1), (0b00_00_01_01, 40)], k);
        let config = CoverageTrimConfig {
            cutoff: Some(2),
            infer: false,
            scale_cutoff_by_k: false,
            estimate_only: true,
            threads: 1,
        };
        assert!(config.validate().is_err()); // estimate_only requires infer
    }

    #[test]
    fn infer_cutoff_finds_a_local_minimum() {
        // Spike at m=1 (errors), dip at m=2, rising plateau after: a
        // textbook local minimum at m=2.
        let hist = vec![0, 100, 5, 6, 7, 7];
        assert_eq!(infer_cutoff(&hist), Some(2));
    }

    #[test]
    fn infer_cutoff_returns_none_for_monotonic_histogram() {
        let hist = vec![0, 1, 2, 3, 4, 5];
        assert_eq!(infer_cutoff(&hist), None);
    }
}
