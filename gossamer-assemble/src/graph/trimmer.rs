//! Records edge deletions and count overrides against an immutable
//! [`Graph`], then emits a rebuilt graph that applies them.
//!
//! Every editing pass follows the same pattern: scan (in parallel, over
//! disjoint rank ranges) marking deletions/overrides through a shared
//! `GraphTrimmer`, then call [`GraphTrimmer::build`] once to stream the
//! surviving edges into a fresh [`Graph`]. Marking is serialised under a
//! single mutex; critical sections are bounded (`O(path length)` per
//! call), matching the bound the concurrency model promises.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use gossamer_common::RankType;

use super::{Graph, GraphBuilder};
use gossamer_common::Result;

struct State {
    deleted: Vec<bool>,
    overrides: FxHashMap<RankType, u32>,
}

pub struct GraphTrimmer<'g> {
    graph: &'g Graph,
    state: Mutex<State>,
}

impl<'g> GraphTrimmer<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        let count = graph.count() as usize;
        GraphTrimmer {
            graph,
            state: Mutex::new(State {
                deleted: vec![false; count],
                overrides: FxHashMap::default(),
            }),
        }
    }

    /// Mark `rank` and its reverse complement's rank deleted. A rank
    /// marked deleted ignores any count override recorded for it — the
    /// override is meaningless once the edge is gone.
    pub fn delete_edge(&self, rank: RankType) {
        let rc_rank = self.graph.reverse_complement_rank(rank);
        let mut state = self.state.lock();
        state.deleted[rank as usize] = true;
        state.deleted[rc_rank as usize] = true;
    }

    /// Override the emitted count for `rank` and its reverse complement.
    pub fn change_count(&self, rank: RankType, count: u32) {
        let rc_rank = self.graph.reverse_complement_rank(rank);
        let mut state = self.state.lock();
        state.overrides.insert(rank, count);
        state.overrides.insert(rc_rank, count);
    }

    pub fn is_deleted(&self, rank: RankType) -> bool {
        self.state.lock().deleted[rank as usize]
    }

    pub fn deleted_count(&self) -> u64 {
        self.state.lock().deleted.iter().filter(|&&d| d).count() as u64
    }

    /// Stream every surviving rank, in ascending order, into a fresh
    /// [`Graph`]: deleted ranks are skipped; a count override replaces
    /// the original multiplicity for ranks that survive.
    pub fn build(&self) -> Result<Graph> {
        let with_counts = self.graph.count() == 0 || self.graph.multiplicity(0).is_ok();
        let mut builder =
            GraphBuilder::new(self.graph.k(), self.graph.is_asymmetric(), with_counts)?;
        let state = self.state.lock();
        for r in 0..self.graph.count() {
            if state.deleted[r as usize] {
                continue;
            }
            let edge = self.graph.select(r);
            let count = match state.overrides.get(&r) {
                Some(&c) => c,
                None => {
                    if with_counts {
                        self.graph.multiplicity(r)?
                    } else {
                        0
                    }
                }
            };
            builder.push_back(edge.value(), count)?;
        }
        builder.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::kmer;

    fn tiny_symmetric_graph() -> Graph {
        let k = 3;
        let e1 = 0b00_00_00_01u64;
        let rc1 = kmer::reverse_complement(e1, k + 1);
        let (lo, hi) = if e1 < rc1 { (e1, rc1) } else { (rc1, e1) };
        let mut b = GraphBuilder::new(k, false, true).unwrap();
        b.push_back(lo, 5).unwrap();
        b.push_back(hi, 5).unwrap();
        b.end().unwrap()
    }

    #[test]
    fn deleting_an_edge_also_deletes_its_reverse_complement() {
        let g = tiny_symmetric_graph();
        let trimmer = GraphTrimmer::new(&g);
        trimmer.delete_edge(0);
        assert!(trimmer.is_deleted(0));
        assert!(trimmer.is_deleted(1));
        let rebuilt = trimmer.build().unwrap();
        assert_eq!(rebuilt.count(), 0);
    }

    #[test]
    fn count_override_survives_into_rebuilt_graph() {
        let g = tiny_symmetric_graph();
        let trimmer = GraphTrimmer::new(&g);
        trimmer.change_count(0, 99);
        let rebuilt = trimmer.build().unwrap();
        assert_eq!(rebuilt.count(), 2);
        assert_eq!(rebuilt.multiplicity(0).unwrap(), 99);
        assert_eq!(rebuilt.multiplicity(1).unwrap(), 99);
    }

    #[test]
    fn deletion_takes_precedence_over_an_override_on_the_same_rank() {
        let g = tiny_symmetric_graph();
        let trimmer = GraphTrimmer::new(&g);
        trimmer.change_count(0, 99);
        trimmer.delete_edge(0);
        let rebuilt = trimmer.build().unwrap();
        assert_eq!(rebuilt.count(), 0);
    }

    #[test]
    fn cutoff_zero_trim_is_a_no_op() {
        let g = tiny_symmetric_graph();
        let trimmer = GraphTrimmer::new(&g);
        // No deletions, no overrides: rebuilt graph equals the input.
        let rebuilt = trimmer.build().unwrap();
        assert_eq!(rebuilt.count(), g.count());
        for r in 0..g.count() {
            assert_eq!(rebuilt.select(r), g.select(r));
            assert_eq!(
                rebuilt.multiplicity(r).unwrap(),
                g.multiplicity(r).unwrap()
            );
        }
    }
}
