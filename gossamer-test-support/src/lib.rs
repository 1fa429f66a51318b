//! Synthetic genome/read generators and brute-force oracles used to
//! cross-check the succinct/concurrent implementations in
//! `gossamer-assemble` on small random inputs.
//!
//! Deliberately independent of `gossamer-assemble`: every oracle here
//! (rank/select, edit distance, de Bruijn adjacency) is reimplemented
//! from scratch at the byte/`Vec` level rather than by calling the
//! crate it is meant to check, so a shared bug can't hide on both
//! sides of a test.

use std::collections::HashMap;

use rand::Rng;

use gossamer_common::{Position, RankType};

pub const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// A uniformly random genome of `length` bases over `{A,C,G,T}`.
pub fn random_genome(rng: &mut impl Rng, length: usize) -> Vec<u8> {
    (0..length).map(|_| BASES[rng.random_range(0..4)]).collect()
}

/// Reverse-complement a byte sequence. Case-preserving; anything
/// other than `{A,C,G,T,a,c,g,t}` passes through unchanged (matching
/// the engine's "non-base breaks the window" convention rather than
/// rejecting it here).
pub fn reverse_complement_seq(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            b'a' => b't',
            b'c' => b'g',
            b'g' => b'c',
            b't' => b'a',
            other => other,
        })
        .collect()
}

/// Apply independent per-base substitutions at `rate`, each
/// substitution landing on one of the three other bases.
pub fn mutate(seq: &[u8], rng: &mut impl Rng, rate: f64) -> Vec<u8> {
    seq.iter()
        .map(|&b| {
            if rng.random::<f64>() >= rate {
                return b;
            }
            let alternatives: Vec<u8> = BASES.iter().copied().filter(|&c| c != b).collect();
            alternatives[rng.random_range(0..alternatives.len())]
        })
        .collect()
}

/// Parameters for [`generate_reads`].
#[derive(Debug, Clone)]
pub struct ReadSetParams {
    pub read_length: usize,
    pub coverage: usize,
    pub substitution_rate: f64,
}

/// Draw `coverage` reads of `read_length` bases from random offsets in
/// `genome`, each independently mutated at `substitution_rate`. Returns
/// an empty vector if the genome is shorter than one read.
pub fn generate_reads(rng: &mut impl Rng, genome: &[u8], params: &ReadSetParams) -> Vec<Vec<u8>> {
    if genome.len() < params.read_length {
        return Vec::new();
    }
    let max_start = genome.len() - params.read_length;
    (0..params.coverage)
        .map(|_| {
            let start = if max_start == 0 {
                0
            } else {
                rng.random_range(0..=max_start)
            };
            let window = &genome[start..start + params.read_length];
            mutate(window, rng, params.substitution_rate)
        })
        .collect()
}

/// A sequence plus a handful of diverging reads carrying a single-base
/// substitution at its midpoint, matching the bubble scenario in the
/// spec's end-to-end tests: `majority_coverage` copies of the reference
/// and `minority_coverage` copies of the one-base variant.
pub fn bubble_reads(
    reference: &[u8],
    majority_coverage: usize,
    minority_coverage: usize,
) -> Vec<Vec<u8>> {
    let mid = reference.len() / 2;
    let mut variant = reference.to_vec();
    let current = variant[mid];
    variant[mid] = BASES.iter().copied().find(|&b| b != current).unwrap();

    let mut reads = Vec::with_capacity(majority_coverage + minority_coverage);
    reads.extend(std::iter::repeat(reference.to_vec()).take(majority_coverage));
    reads.extend(std::iter::repeat(variant).take(minority_coverage));
    reads
}

/// A reference sequence with a short dead-end tip branching off its
/// midpoint, for the tip-pruning end-to-end scenario. The tip read
/// shares its first half with the trunk (forming one branching node at
/// the shared k-mer immediately before the split) then diverges for
/// `tip_length` bases that are guaranteed to differ from the trunk's
/// actual continuation, leading to a dead end.
pub fn tip_reads(
    trunk: &[u8],
    tip_length: usize,
    trunk_coverage: usize,
    tip_coverage: usize,
) -> Vec<Vec<u8>> {
    let branch_at = (trunk.len() / 2).max(16);
    let mut tip = trunk[..branch_at].to_vec();
    for i in 0..tip_length {
        let original = trunk.get(branch_at + i).copied();
        let diverging = BASES.iter().copied().find(|&b| Some(b) != original).unwrap();
        tip.push(diverging);
    }
    let mut reads = Vec::with_capacity(trunk_coverage + tip_coverage);
    reads.extend(std::iter::repeat(trunk.to_vec()).take(trunk_coverage));
    reads.extend(std::iter::repeat(tip).take(tip_coverage));
    reads
}

/// Brute-force reference `rank`/`select`/`access` over a small,
/// explicitly-materialised bit universe — the oracle
/// `SparseArray` is checked against in property tests.
pub struct BruteForceSparse {
    universe: Position,
    set: Vec<Position>,
}

impl BruteForceSparse {
    /// `positions` need not be sorted or deduplicated; both are done
    /// here so callers can feed raw random samples directly.
    pub fn new(universe: Position, mut positions: Vec<Position>) -> Self {
        positions.sort_unstable();
        positions.dedup();
        BruteForceSparse { universe, set: positions }
    }

    pub fn universe(&self) -> Position {
        self.universe
    }

    pub fn count(&self) -> RankType {
        self.set.len() as RankType
    }

    pub fn access(&self, p: Position) -> bool {
        self.set.binary_search(&p).is_ok()
    }

    /// Count of set bits strictly below `p`.
    pub fn rank(&self, p: Position) -> RankType {
        self.set.partition_point(|&v| v < p) as RankType
    }

    /// Position of the `r`-th set bit, or `universe` past the end.
    pub fn select(&self, r: RankType) -> Position {
        self.set.get(r as usize).copied().unwrap_or(self.universe)
    }
}

/// Reference Levenshtein edit distance, the oracle the Tour Bus
/// bubble-comparison edit-distance bound is checked against.
pub fn edit_distance(a: &[u8], b: &[u8]) -> u64 {
    let (n, m) = (a.len(), b.len());
    let mut prev: Vec<u64> = (0..=m as u64).collect();
    let mut cur = vec![0u64; m + 1];
    for i in 1..=n {
        cur[0] = i as u64;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[m]
}

/// A brute-force, non-succinct de Bruijn graph over byte-string k-mers:
/// a direct `HashMap` adjacency, independent of the packed-integer
/// encoding the real engine uses. Used to cross-check edge counts and
/// extracted contigs on small inputs.
pub struct BruteForceGraph {
    k: usize,
    /// (k+1)-mer -> observed count.
    edges: HashMap<Vec<u8>, u32>,
}

impl BruteForceGraph {
    /// Count every overlapping (k+1)-mer across `reads`. When
    /// `canonicalize` is set, a read and its reverse complement fold
    /// onto the same key (the lexicographically smaller of the two),
    /// mirroring the real engine's symmetric-mode canonicalisation. A
    /// non-ACGT byte breaks the current window, just like
    /// `gossamer_assemble::kmer::edges_of_read`.
    pub fn build(reads: &[Vec<u8>], k: usize, canonicalize: bool) -> Self {
        let width = k + 1;
        let mut edges: HashMap<Vec<u8>, u32> = HashMap::new();
        for read in reads {
            let mut start = 0usize;
            for end in 0..read.len() {
                if !is_base(read[end]) {
                    start = end + 1;
                    continue;
                }
                if end + 1 - start >= width {
                    let window = &read[end + 1 - width..end + 1];
                    let key = if canonicalize {
                        let rc = reverse_complement_seq(window);
                        if rc < window.to_vec() {
                            rc
                        } else {
                            window.to_vec()
                        }
                    } else {
                        window.to_vec()
                    };
                    *edges.entry(key).or_insert(0) += 1;
                }
            }
        }
        BruteForceGraph { k, edges }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn total_observations(&self) -> u64 {
        self.edges.values().map(|&c| c as u64).sum()
    }

    pub fn multiplicity(&self, edge: &[u8]) -> Option<u32> {
        self.edges.get(edge).copied()
    }

    fn from_node(edge: &[u8]) -> &[u8] {
        &edge[..edge.len() - 1]
    }

    fn to_node(edge: &[u8]) -> &[u8] {
        &edge[1..]
    }

    pub fn out_degree(&self, node: &[u8]) -> usize {
        BASES
            .iter()
            .filter(|&&b| {
                let mut e = node.to_vec();
                e.push(b);
                self.edges.contains_key(&e)
            })
            .count()
    }

    pub fn in_degree(&self, node: &[u8]) -> usize {
        BASES
            .iter()
            .filter(|&&b| {
                let mut e = vec![b];
                e.extend_from_slice(node);
                self.edges.contains_key(&e)
            })
            .count()
    }

    /// Every maximal linear path in the graph, walked without any
    /// succinct indexing — a direct transliteration of the spec's
    /// linear-path definition over the adjacency map. Each edge is
    /// visited as the start of a walk at most once (from-node
    /// branching or unseen), matching linear-segment contig
    /// extraction.
    pub fn linear_paths(&self) -> Vec<Vec<Vec<u8>>> {
        let mut visited: std::collections::HashSet<Vec<u8>> = std::collections::HashSet::new();
        let mut paths = Vec::new();
        let mut starts: Vec<Vec<u8>> = self.edges.keys().cloned().collect();
        starts.sort();
        for edge in starts {
            if visited.contains(&edge) {
                continue;
            }
            let from = Self::from_node(&edge).to_vec();
            if self.in_degree(&from) == 1 && self.out_degree(&from) <= 1 {
                continue;
            }
            let mut path = vec![edge.clone()];
            visited.insert(edge.clone());
            let mut current = edge.clone();
            loop {
                let to = Self::to_node(&current).to_vec();
                if self.in_degree(&to) != 1 || self.out_degree(&to) != 1 {
                    break;
                }
                let next = BASES.iter().find_map(|&b| {
                    let mut e = to.clone();
                    e.push(b);
                    self.edges.contains_key(&e).then_some(e)
                });
                match next {
                    Some(next_edge) if next_edge != edge => {
                        visited.insert(next_edge.clone());
                        path.push(next_edge.clone());
                        current = next_edge;
                    }
                    _ => break,
                }
            }
            paths.push(path);
        }
        paths
    }

    /// Assemble the base sequence of a linear path the same way the
    /// real `assemble_sequence` does: seed with the from-node of the
    /// first edge, then append every edge's last base.
    pub fn assemble(&self, path: &[Vec<u8>]) -> Vec<u8> {
        if path.is_empty() {
            return Vec::new();
        }
        let mut seq = Self::from_node(&path[0]).to_vec();
        for edge in path {
            seq.push(*edge.last().unwrap());
        }
        seq
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

fn is_base(b: u8) -> bool {
    matches!(b, b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn random_genome_has_requested_length_and_only_bases() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let g = random_genome(&mut rng, 200);
        assert_eq!(g.len(), 200);
        assert!(g.iter().all(|&b| BASES.contains(&b)));
    }

    #[test]
    fn reverse_complement_is_an_involution() {
        let seq = b"ACGGCTAACGTTGG".to_vec();
        assert_eq!(reverse_complement_seq(&reverse_complement_seq(&seq)), seq);
    }

    #[test]
    fn bubble_reads_differ_at_exactly_one_base() {
        let reference = b"ACGGCTAACGTTGGACGGCTAACGTTGGACGGCTAACGTTGGACGGCTAACGTTGGACGGC".to_vec();
        let reads = bubble_reads(&reference, 10, 3);
        assert_eq!(reads.len(), 13);
        let variant = &reads[10];
        let diffs = reference
            .iter()
            .zip(variant.iter())
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(diffs, 1);
    }

    #[test]
    fn brute_force_sparse_matches_naive_scan() {
        let universe = 1000u64;
        let positions = vec![3, 7, 7, 500, 999];
        let oracle = BruteForceSparse::new(universe, positions);
        assert_eq!(oracle.count(), 4);
        assert!(oracle.access(7));
        assert!(!oracle.access(8));
        assert_eq!(oracle.rank(500), 2);
        assert_eq!(oracle.select(0), 3);
        assert_eq!(oracle.select(4), universe);
    }

    #[test]
    fn edit_distance_matches_known_values() {
        assert_eq!(edit_distance(b"kitten", b"sitting"), 3);
        assert_eq!(edit_distance(b"", b"abc"), 3);
        assert_eq!(edit_distance(b"same", b"same"), 0);
    }

    #[test]
    fn brute_force_graph_counts_overlapping_edges() {
        let reads = vec![b"ACGGCTAACGT".to_vec(); 3];
        let graph = BruteForceGraph::build(&reads, 3, false);
        // 11-base read, k=3 => width 4 => 8 overlapping windows, all identical.
        assert_eq!(graph.edge_count(), 8);
        assert_eq!(graph.total_observations(), 24);
    }

    #[test]
    fn brute_force_graph_extracts_single_contig_for_linear_sequence() {
        let reads = vec![b"ACGGCTAACGTTGGACG".to_vec(); 4];
        let graph = BruteForceGraph::build(&reads, 5, false);
        let paths = graph.linear_paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(graph.assemble(&paths[0]), reads[0]);
    }
}
