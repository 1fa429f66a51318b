//! The succinct de Bruijn graph: query surface, streaming builder, and
//! the four-file persistence layout.
//!
//! An edge is a (k+1)-mer stored as its canonical value (symmetric mode)
//! or as-is (asymmetric mode) in a [`SparseArray`] over the universe of
//! all (k+1)-mers, `4^(k+1)`. Multiplicities are a parallel array aligned
//! to edge rank order, omitted entirely for a k-mer set (no count
//! column). The graph is immutable once built; every editing pass goes
//! through [`trimmer::GraphTrimmer`] and produces a fresh `Graph`.

pub mod trimmer;
pub mod upgrade;

use std::io::{Read, Write};
use std::path::Path;

use gossamer_common::{Edge, Error, Node, Position, RankType, Result};

use crate::bitops::{crc::Digest, varint, SparseArray, SparseArrayBuilder};
use crate::kmer;

pub use trimmer::GraphTrimmer;

const HEADER_MAGIC: u32 = 0x474f_5353; // "GOSS"
pub(crate) const HEADER_VERSION: u64 = 1;
const ASYMMETRIC_FLAG: u64 = 1;

const COUNTS_MAGIC: u32 = 0x434e_5453; // "CNTS"
const COUNTS_VERSION: u64 = 1;

/// The bit-universe of all (k+1)-mers. Caps at `u64::MAX` for `k == MAX_K`
/// (`2*(k+1) == 64`, so the true universe `2^64` does not fit a `u64`);
/// this reserves `u64::MAX` itself as an unreachable edge value, which is
/// an acceptable approximation given the encoding already forbids it from
/// being a real canonical (k+1)-mer only in the degenerate all-ones case.
pub(crate) fn edge_universe(k: u64) -> Position {
    let bits = 2 * (k + 1);
    if bits >= 64 {
        Position::MAX
    } else {
        1u64 << bits
    }
}

/// Diagnostic counters, the Rust analogue of the original's
/// `PropertyTree stat()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub k: u64,
    pub asymmetric: bool,
    pub count: RankType,
    pub has_multiplicities: bool,
}

/// An immutable succinct de Bruijn graph.
#[derive(Debug, Clone)]
pub struct Graph {
    k: u64,
    asymmetric: bool,
    edges: SparseArray,
    multiplicities: Option<Vec<u32>>,
}

impl Graph {
    pub fn k(&self) -> u64 {
        self.k
    }

    pub fn is_asymmetric(&self) -> bool {
        self.asymmetric
    }

    pub fn count(&self) -> RankType {
        self.edges.count()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            k: self.k,
            asymmetric: self.asymmetric,
            count: self.count(),
            has_multiplicities: self.multiplicities.is_some(),
        }
    }

    pub fn select(&self, r: RankType) -> Edge {
        Edge(self.edges.select(r))
    }

    pub fn rank(&self, e: Edge) -> RankType {
        self.edges.rank(e.value())
    }

    pub fn access(&self, e: Edge) -> bool {
        self.edges.access(e.value())
    }

    pub fn access_and_rank(&self, e: Edge) -> (bool, RankType) {
        self.edges.access_and_rank(e.value())
    }

    /// The observed coverage of edge `r`. Fails if this graph is a k-mer
    /// set (no count column) or `r` is out of range — both programming
    /// errors, per the contract's fail-fast policy on out-of-range ranks.
    pub fn multiplicity(&self, r: RankType) -> Result<u32> {
        let counts = self.multiplicities.as_ref().ok_or_else(|| {
            Error::InvariantViolation("multiplicity() called on a k-mer set".to_string())
        })?;
        counts.get(r as usize).copied().ok_or_else(|| {
            Error::InvariantViolation(format!("rank {r} >= count {}", self.count()))
        })
    }

    pub fn from(&self, e: Edge) -> Node {
        e.from_node(self.k)
    }

    pub fn to(&self, e: Edge) -> Node {
        e.to_node(self.k)
    }

    pub fn reverse_complement_edge(&self, e: Edge) -> Edge {
        kmer::reverse_complement_edge(e, self.k)
    }

    pub fn reverse_complement_node(&self, n: Node) -> Node {
        kmer::reverse_complement_node(n, self.k)
    }

    /// The rank of the reverse complement of edge `r`.
    pub fn reverse_complement_rank(&self, r: RankType) -> RankType {
        let e = self.select(r);
        self.rank(self.reverse_complement_edge(e))
    }

    /// The rank of the first outgoing edge of `n` (edges with a common
    /// from-node are contiguous: they differ only in their trailing
    /// extension base).
    pub fn begin_rank(&self, n: Node) -> RankType {
        self.edges.rank(n.extend(0).value())
    }

    /// The rank one past the last outgoing edge of `n`.
    pub fn end_rank(&self, n: Node) -> RankType {
        self.edges.rank(Node(n.value() + 1).extend(0).value())
    }

    pub fn out_degree(&self, n: Node) -> u64 {
        self.end_rank(n) - self.begin_rank(n)
    }

    /// In-degree of `n` equals out-degree of its reverse complement.
    pub fn in_degree(&self, n: Node) -> u64 {
        self.out_degree(self.reverse_complement_node(n))
    }

    /// The sole outgoing edge of `n`. Caller must have checked
    /// `out_degree(n) == 1`; this is a programming error otherwise.
    pub fn only_out_edge(&self, n: Node) -> Edge {
        self.select(self.begin_rank(n))
    }

    /// Every outgoing edge of `n`, in rank order.
    pub fn out_edges(&self, n: Node) -> Vec<Edge> {
        (self.begin_rank(n)..self.end_rank(n))
            .map(|r| self.select(r))
            .collect()
    }

    /// Walk the maximal linear path starting at `begin`: repeatedly
    /// advance through nodes of in-degree 1 and out-degree 1, invoking
    /// `visit(edge, rank)` on every edge along the way (including the
    /// terminal one), and stop on a branching node, a return to the
    /// start (self-loop), or a dead end.
    pub fn linear_path(&self, begin: Edge, mut visit: impl FnMut(Edge, RankType)) -> Edge {
        let mut current = begin;
        loop {
            let n = self.to(current);
            if self.in_degree(n) != 1 || self.out_degree(n) != 1 {
                visit(current, self.rank(current));
                return current;
            }
            let next = self.only_out_edge(n);
            if next == begin {
                visit(current, self.rank(current));
                return current;
            }
            visit(current, self.rank(current));
            current = next;
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            graph: self,
            rank: 0,
        }
    }

    /// Verify the universal symmetric-mode invariant that every edge's
    /// reverse complement is also present with an equal multiplicity.
    /// Expensive (`O(count log count)`); intended for tests, not the hot
    /// path.
    pub fn check_symmetry(&self) -> Result<()> {
        if self.asymmetric {
            return Ok(());
        }
        for r in 0..self.count() {
            let e = self.select(r);
            let rc = self.reverse_complement_edge(e);
            let (found, rc_rank) = self.access_and_rank(rc);
            if !found {
                return Err(Error::InvariantViolation(format!(
                    "edge at rank {r} has no reverse complement in the graph"
                )));
            }
            if let (Ok(c), Ok(rc_c)) = (self.multiplicity(r), self.multiplicity(rc_rank)) {
                if c != rc_c {
                    return Err(Error::InvariantViolation(format!(
                        "multiplicity mismatch between rank {r} ({c}) and its reverse complement rank {rc_rank} ({rc_c})"
                    )));
                }
            }
        }
        Ok(())
    }

    fn header_base(base: &Path) -> std::path::PathBuf {
        let mut p = base.as_os_str().to_owned();
        p.push(".header");
        p.into()
    }

    fn edges_path(base: &Path) -> std::path::PathBuf {
        let mut p = base.as_os_str().to_owned();
        p.push(".edges");
        p.into()
    }

    fn counts_path(base: &Path) -> std::path::PathBuf {
        let mut p = base.as_os_str().to_owned();
        p.push(".edges-counts");
        p.into()
    }

    /// Write the `B.header`/`B.edges`/`B.edges-counts` triple.
    pub fn persist(&self, base: &Path) -> Result<()> {
        let header_path = Self::header_base(base);
        let mut flags = 0u64;
        if self.asymmetric {
            flags |= ASYMMETRIC_FLAG;
        }
        let mut header = Vec::with_capacity(28);
        header.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
        header.extend_from_slice(&HEADER_VERSION.to_le_bytes());
        header.extend_from_slice(&self.k.to_le_bytes());
        header.extend_from_slice(&flags.to_le_bytes());
        std::fs::write(&header_path, &header).map_err(|e| Error::io(&header_path, e))?;

        self.edges.write(Self::edges_path(base))?;

        if let Some(counts) = &self.multiplicities {
            let counts_path = Self::counts_path(base);
            let file =
                std::fs::File::create(&counts_path).map_err(|e| Error::io(&counts_path, e))?;
            let mut w = std::io::BufWriter::new(file);
            let mut digest = Digest::new();

            let mut head = Vec::with_capacity(20);
            head.extend_from_slice(&COUNTS_MAGIC.to_le_bytes());
            head.extend_from_slice(&COUNTS_VERSION.to_le_bytes());
            head.extend_from_slice(&(counts.len() as u64).to_le_bytes());
            w.write_all(&head).map_err(|e| Error::io(&counts_path, e))?;
            digest.update(&head);

            let mut body = Vec::new();
            for &c in counts {
                varint::write(&mut body, c as u64);
            }
            w.write_all(&body).map_err(|e| Error::io(&counts_path, e))?;
            digest.update(&body);

            let crc = digest.finalize();
            w.write_all(&crc.to_le_bytes())
                .map_err(|e| Error::io(&counts_path, e))?;
            w.flush().map_err(|e| Error::io(&counts_path, e))?;
        }
        Ok(())
    }

    /// Read back a graph previously written by [`Graph::persist`].
    pub fn open(base: &Path) -> Result<Graph> {
        // magic (4 bytes) + version/k/flags (8 bytes each), tightly
        // packed — matches the byte layout `persist` actually writes.
        const HEADER_LEN: usize = 4 + 8 + 8 + 8;

        let header_path = Self::header_base(base);
        let raw = std::fs::read(&header_path).map_err(|e| Error::io(&header_path, e))?;
        if raw.len() < HEADER_LEN {
            return Err(Error::io(
                &header_path,
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated header"),
            ));
        }
        let magic = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        if magic != HEADER_MAGIC {
            return Err(Error::InvariantViolation(format!(
                "bad magic reading {}",
                header_path.display()
            )));
        }
        let version = u64::from_le_bytes(raw[4..12].try_into().unwrap());
        if version != HEADER_VERSION {
            return Err(Error::version_mismatch(&header_path, HEADER_VERSION, version));
        }
        let k = u64::from_le_bytes(raw[12..20].try_into().unwrap());
        let flags = u64::from_le_bytes(raw[20..28].try_into().unwrap());
        let asymmetric = flags & ASYMMETRIC_FLAG != 0;

        let edges = SparseArray::read(Self::edges_path(base))?;

        let counts_path = Self::counts_path(base);
        let multiplicities = if counts_path.exists() {
            let buf = std::fs::read(&counts_path).map_err(|e| Error::io(&counts_path, e))?;
            if buf.len() < 20 {
                return Err(Error::io(
                    &counts_path,
                    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated header"),
                ));
            }
            let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
            if magic != COUNTS_MAGIC {
                return Err(Error::InvariantViolation(format!(
                    "bad magic reading {}",
                    counts_path.display()
                )));
            }
            let cversion = u64::from_le_bytes(buf[4..12].try_into().unwrap());
            if cversion != COUNTS_VERSION {
                return Err(Error::version_mismatch(&counts_path, COUNTS_VERSION, cversion));
            }
            let n = u64::from_le_bytes(buf[12..20].try_into().unwrap()) as usize;

            let body_end = buf.len() - 8;
            let mut digest = Digest::new();
            digest.update(&buf[0..body_end]);
            let expected = digest.finalize();
            let stored = u64::from_le_bytes(buf[body_end..].try_into().unwrap());
            if expected != stored {
                return Err(Error::InvariantViolation(format!(
                    "CRC mismatch reading {}",
                    counts_path.display()
                )));
            }

            let mut pos = 20usize;
            let mut counts = Vec::with_capacity(n);
            for _ in 0..n {
                let v = varint::read(&buf, &mut pos).ok_or_else(|| {
                    Error::io(
                        &counts_path,
                        std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated counts"),
                    )
                })?;
                counts.push(v as u32);
            }
            Some(counts)
        } else {
            None
        };

        Ok(Graph {
            k,
            asymmetric,
            edges,
            multiplicities,
        })
    }
}

/// Forward iterator over `(edge, count)` pairs in ascending rank order.
/// `count` is `None` for a k-mer set.
pub struct Iter<'a> {
    graph: &'a Graph,
    rank: RankType,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Edge, RankType, Option<u32>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.rank >= self.graph.count() {
            return None;
        }
        let r = self.rank;
        let e = self.graph.select(r);
        let count = self.graph.multiplicities.as_ref().map(|c| c[r as usize]);
        self.rank += 1;
        Some((e, r, count))
    }
}

/// Streams a monotonically increasing sequence of `(edge value, count)`
/// pairs into a finalised [`Graph`]. The stream must include every
/// edge's reverse complement in symmetric mode; out-of-order input is a
/// programming error, per [`SparseArrayBuilder::push_back`]'s contract.
pub struct GraphBuilder {
    k: u64,
    asymmetric: bool,
    universe: Position,
    edges: SparseArrayBuilder,
    multiplicities: Option<Vec<u32>>,
}

impl GraphBuilder {
    /// `with_counts = false` builds a k-mer set (no multiplicity column).
    pub fn new(k: u64, asymmetric: bool, with_counts: bool) -> Result<Self> {
        kmer::check_k(k)?;
        let universe = edge_universe(k);
        Ok(GraphBuilder {
            k,
            asymmetric,
            universe,
            edges: SparseArrayBuilder::new(universe),
            multiplicities: if with_counts { Some(Vec::new()) } else { None },
        })
    }

    pub fn push_back(&mut self, edge: Position, count: u32) -> Result<()> {
        self.edges.push_back(edge)?;
        if let Some(counts) = &mut self.multiplicities {
            counts.push(count);
        }
        Ok(())
    }

    pub fn end(self) -> Result<Graph> {
        let edges = self.edges.end(self.universe)?;
        Ok(Graph {
            k: self.k,
            asymmetric: self.asymmetric,
            edges,
            multiplicities: self.multiplicities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_symmetric_graph() -> Graph {
        // k=3 edges (4-mers): ACGT (canonical) and its reverse complement
        // ACGT -> rc = ACGT (palindromic under this particular value is
        // not guaranteed; pick two definitely-distinct canonical pairs.
        let k = 3;
        // AAAC = 0b00_00_00_01, rc(AAAC) = GTTT = 0b10_11_11_11
        let e1 = 0b00_00_00_01u64;
        let rc1 = kmer::reverse_complement(e1, k + 1);
        assert_ne!(e1, rc1);
        let (lo, hi) = if e1 < rc1 { (e1, rc1) } else { (rc1, e1) };

        let mut b = GraphBuilder::new(k, false, true).unwrap();
        b.push_back(lo, 5).unwrap();
        b.push_back(hi, 5).unwrap();
        b.end().unwrap()
    }

    #[test]
    fn basic_queries_roundtrip() {
        let g = tiny_symmetric_graph();
        assert_eq!(g.k(), 3);
        assert_eq!(g.count(), 2);
        for r in 0..g.count() {
            let e = g.select(r);
            assert_eq!(g.rank(e), r);
            assert!(g.access(e));
            assert_eq!(g.multiplicity(r).unwrap(), 5);
        }
    }

    #[test]
    fn reverse_complement_edge_is_present_and_symmetric() {
        let g = tiny_symmetric_graph();
        g.check_symmetry().unwrap();
    }

    #[test]
    fn degrees_are_derived_from_adjacent_ranks() {
        let g = tiny_symmetric_graph();
        for r in 0..g.count() {
            let e = g.select(r);
            let from = g.from(e);
            let to = g.to(e);
            assert!(g.out_degree(from) >= 1);
            assert!(g.in_degree(to) >= 1);
        }
    }

    #[test]
    fn persist_then_open_roundtrips() {
        let g = tiny_symmetric_graph();
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("B");
        g.persist(&base).unwrap();
        let restored = Graph::open(&base).unwrap();
        assert_eq!(restored.k(), g.k());
        assert_eq!(restored.count(), g.count());
        for r in 0..g.count() {
            assert_eq!(restored.select(r), g.select(r));
            assert_eq!(restored.multiplicity(r).unwrap(), g.multiplicity(r).unwrap());
        }
    }

    #[test]
    fn open_rejects_a_header_truncated_before_the_flags_word() {
        let g = tiny_symmetric_graph();
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("B");
        g.persist(&base).unwrap();

        let header_path = Graph::header_base(&base);
        let mut bytes = std::fs::read(&header_path).unwrap();
        bytes.truncate(16); // magic + version only, no k/flags
        std::fs::write(&header_path, &bytes).unwrap();

        assert!(Graph::open(&base).is_err());
    }

    #[test]
    fn kmer_set_has_no_multiplicity_column() {
        let k = 3;
        let mut b = GraphBuilder::new(k, false, false).unwrap();
        let e1 = 0b00_00_00_01u64;
        let rc1 = kmer::reverse_complement(e1, k + 1);
        let (lo, hi) = if e1 < rc1 { (e1, rc1) } else { (rc1, e1) };
        b.push_back(lo, 0).unwrap();
        b.push_back(hi, 0).unwrap();
        let g = b.end().unwrap();
        assert!(g.multiplicity(0).is_err());
    }

    #[test]
    fn out_of_range_rank_is_invariant_violation() {
        let g = tiny_symmetric_graph();
        assert!(g.multiplicity(g.count() + 1).is_err());
    }
}
