//! Rank/select succinct bitmap over a universe up to `2 * 4^k`.
//!
//! Two-level structure: the universe is split into fixed-size super-blocks;
//! a cumulative-count array records, per super-block, how many set bits
//! precede it. Within a super-block, the offsets of its set bits (relative
//! to the block's start) are stored in a bit-packed array whose element
//! width is `ceil(log2(blockSize))`. `select` locates the block from the
//! cumulative counts, then indexes directly into the offsets array;
//! `rank` locates the block, then binary-searches the (ascending) offsets
//! within it.

use std::io::{Read, Write};
use std::path::Path;

use gossamer_common::{Error, Position, RankType, Result};

use super::packed::{bits_for, PackedArray};

const BLOCK_BITS: u32 = 16;
const BLOCK_SIZE: u64 = 1 << BLOCK_BITS;

const MAGIC: u32 = 0x5350_4152; // "SPAR"
const VERSION: u64 = 1;

/// Diagnostic counters mirroring the original's `PropertyTree stat()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub count: RankType,
    pub universe: Position,
    pub blocks: usize,
    pub storage_bytes: usize,
}

/// A finalised rank/select index over a sparse ascending set of positions.
#[derive(Debug, Clone)]
pub struct SparseArray {
    universe: Position,
    count: RankType,
    cum_counts: Vec<RankType>,
    offsets: PackedArray,
}

impl SparseArray {
    pub fn universe(&self) -> Position {
        self.universe
    }

    pub fn count(&self) -> RankType {
        self.count
    }

    /// `true` iff `p` is a set position. Requires `p < universe`.
    pub fn access(&self, p: Position) -> bool {
        self.access_and_rank(p).0
    }

    /// Number of set bits in `[0, p)`. `rank(universe) == count`.
    pub fn rank(&self, p: Position) -> RankType {
        self.access_and_rank(p).1
    }

    /// `access` and `rank` in one pass, as the original's combined call.
    pub fn access_and_rank(&self, p: Position) -> (bool, RankType) {
        if p >= self.universe {
            return (false, self.count);
        }
        let block = (p / BLOCK_SIZE) as usize;
        let local = p % BLOCK_SIZE;
        let lo = self.cum_counts[block];
        let hi = self.cum_counts[block + 1];
        // In-block offsets are ascending (built from an ascending stream);
        // binary search the sub-slice for `local`.
        let mut a = lo;
        let mut b = hi;
        while a < b {
            let mid = a + (b - a) / 2;
            if self.offsets.get(mid) < local {
                a = mid + 1;
            } else {
                b = mid;
            }
        }
        let found = a < hi && self.offsets.get(a) == local;
        (found, a)
    }

    /// Rank over a half-open range `[lhs, rhs)`, as `(rank(lhs), rank(rhs))`.
    pub fn rank_range(&self, lhs: Position, rhs: Position) -> (RankType, RankType) {
        (self.rank(lhs), self.rank(rhs))
    }

    /// The position of the `r`-th set bit (0-indexed). Returns `universe`
    /// as a past-the-end sentinel when `r >= count`.
    pub fn select(&self, r: RankType) -> Position {
        if r >= self.count {
            return self.universe;
        }
        // cum_counts is non-decreasing and cum_counts[0] == 0; find the
        // last block whose cumulative count is <= r.
        let block = self.cum_counts.partition_point(|&c| c <= r) - 1;
        (block as u64) * BLOCK_SIZE + self.offsets.get(r)
    }

    pub fn iterator(&self) -> Iter<'_> {
        Iter {
            array: self,
            rank: 0,
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            count: self.count,
            universe: self.universe,
            blocks: self.cum_counts.len().saturating_sub(1),
            storage_bytes: self.offsets.storage_bytes()
                + self.cum_counts.len() * std::mem::size_of::<RankType>(),
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let mut w = std::io::BufWriter::new(file);
        let mut digest = crate::bitops::crc::Digest::new();

        let mut header = Vec::with_capacity(40);
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(&(VERSION).to_le_bytes());
        header.extend_from_slice(&self.universe.to_le_bytes());
        header.extend_from_slice(&self.count.to_le_bytes());
        header.extend_from_slice(&(self.cum_counts.len() as u64).to_le_bytes());
        header.extend_from_slice(&(self.offsets.width() as u64).to_le_bytes());
        w.write_all(&header).map_err(|e| Error::io(path, e))?;
        digest.update(&header);

        for &c in &self.cum_counts {
            let bytes = c.to_le_bytes();
            w.write_all(&bytes).map_err(|e| Error::io(path, e))?;
            digest.update(&bytes);
        }
        for i in 0..self.count {
            let bytes = self.offsets.get(i).to_le_bytes();
            w.write_all(&bytes).map_err(|e| Error::io(path, e))?;
            digest.update(&bytes);
        }

        let crc = digest.finalize();
        w.write_all(&crc.to_le_bytes())
            .map_err(|e| Error::io(path, e))?;
        w.flush().map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|e| Error::io(path, e))?;

        const HEADER_LEN: usize = 44;
        if buf.len() < HEADER_LEN {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated header"),
            ));
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::InvariantViolation(format!(
                "bad magic in {}: {magic:#x}",
                path.display()
            )));
        }
        let version = u64::from_le_bytes(buf[4..12].try_into().unwrap());
        if version != VERSION {
            return Err(Error::version_mismatch(path, VERSION, version));
        }
        let universe = u64::from_le_bytes(buf[12..20].try_into().unwrap());
        let count = u64::from_le_bytes(buf[20..28].try_into().unwrap());
        let num_cum = u64::from_le_bytes(buf[28..36].try_into().unwrap()) as usize;
        let width = u64::from_le_bytes(buf[36..44].try_into().unwrap()) as u32;

        let body_crc_claimed_len = 44 + num_cum * 8 + (count as usize) * 8;
        if buf.len() < body_crc_claimed_len + 8 {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated body"),
            ));
        }

        let mut digest = crate::bitops::crc::Digest::new();
        digest.update(&buf[0..body_crc_claimed_len]);
        let expected_crc = digest.finalize();
        let stored_crc = u64::from_le_bytes(
            buf[body_crc_claimed_len..body_crc_claimed_len + 8]
                .try_into()
                .unwrap(),
        );
        if expected_crc != stored_crc {
            return Err(Error::InvariantViolation(format!(
                "CRC mismatch reading {}",
                path.display()
            )));
        }

        let mut cum_counts = Vec::with_capacity(num_cum);
        let mut off = 44;
        for _ in 0..num_cum {
            cum_counts.push(u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()));
            off += 8;
        }
        let mut offsets = PackedArray::new(width.max(1));
        for _ in 0..count {
            offsets.push(u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()));
            off += 8;
        }

        Ok(SparseArray {
            universe,
            count,
            cum_counts,
            offsets,
        })
    }
}

/// Forward iterator over the set positions, in ascending order.
pub struct Iter<'a> {
    array: &'a SparseArray,
    rank: RankType,
}

impl<'a> Iter<'a> {
    pub fn valid(&self) -> bool {
        self.rank < self.array.count
    }

    pub fn rank(&self) -> RankType {
        self.rank
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Position;

    fn next(&mut self) -> Option<Position> {
        if !self.valid() {
            return None;
        }
        let v = self.array.select(self.rank);
        self.rank += 1;
        Some(v)
    }
}

/// Streams a monotonically increasing sequence of positions into a
/// finalised [`SparseArray`].
pub struct Builder {
    universe: Position,
    cum_counts: Vec<RankType>,
    offsets: PackedArray,
    last: Option<Position>,
    count: RankType,
}

impl Builder {
    pub fn new(universe: Position) -> Self {
        let width = bits_for(BLOCK_SIZE.saturating_sub(1));
        Builder {
            universe,
            cum_counts: vec![0],
            offsets: PackedArray::new(width),
            last: None,
            count: 0,
        }
    }

    /// Append a set position. Must be strictly greater than the previous
    /// one and less than `universe`; violations are `InvariantViolation`,
    /// matching the source's fail-fast contract for out-of-order builder
    /// input.
    pub fn push_back(&mut self, v: Position) -> Result<()> {
        if v >= self.universe {
            return Err(Error::InvariantViolation(format!(
                "SparseArray::Builder: position {v} >= universe {}",
                self.universe
            )));
        }
        if let Some(last) = self.last {
            if v <= last {
                return Err(Error::InvariantViolation(format!(
                    "SparseArray::Builder: position {v} not strictly greater than previous {last}"
                )));
            }
        }
        let block = (v / BLOCK_SIZE) as usize;
        while self.cum_counts.len() <= block {
            self.cum_counts.push(self.count);
        }
        self.offsets.push(v % BLOCK_SIZE);
        self.count += 1;
        self.last = Some(v);
        Ok(())
    }

    /// Finalise the index. `universe` must match the value passed to
    /// [`Builder::new`].
    pub fn end(mut self, universe: Position) -> Result<SparseArray> {
        if universe != self.universe {
            return Err(Error::InvariantViolation(format!(
                "SparseArray::Builder::end: universe {universe} does not match constructor universe {}",
                self.universe
            )));
        }
        let num_blocks = universe.div_ceil(BLOCK_SIZE).max(1) as usize;
        while self.cum_counts.len() <= num_blocks {
            self.cum_counts.push(self.count);
        }
        Ok(SparseArray {
            universe: self.universe,
            count: self.count,
            cum_counts: self.cum_counts,
            offsets: self.offsets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(positions: &[Position], universe: Position) -> SparseArray {
        let mut b = Builder::new(universe);
        for &p in positions {
            b.push_back(p).unwrap();
        }
        b.end(universe).unwrap()
    }

    #[test]
    fn empty_array_select_returns_universe_sentinel() {
        let arr = build(&[], 1000);
        assert_eq!(arr.count(), 0);
        assert_eq!(arr.select(0), 1000);
        assert_eq!(arr.rank(1000), 0);
        assert!(!arr.access(500));
    }

    #[test]
    fn rank_select_access_roundtrip() {
        let positions: Vec<Position> = vec![0, 5, 7, 1000, 1001, 70000, 70001, 999_999];
        let arr = build(&positions, 1_000_000);

        for (i, &p) in positions.iter().enumerate() {
            assert_eq!(arr.select(i as u64), p, "select({i})");
            assert_eq!(arr.rank(p), i as u64, "rank({p})");
            assert!(arr.access(p), "access({p})");
        }
        assert!(!arr.access(6));
        assert_eq!(arr.rank(1_000_000), positions.len() as u64);
    }

    #[test]
    fn iterator_yields_positions_in_order() {
        let positions: Vec<Position> = vec![3, 4, 5, 200_000, 200_001];
        let arr = build(&positions, 1_000_000);
        let collected: Vec<Position> = arr.iterator().collect();
        assert_eq!(collected, positions);
    }

    #[test]
    fn builder_rejects_non_ascending_input() {
        let mut b = Builder::new(100);
        b.push_back(5).unwrap();
        assert!(b.push_back(5).is_err());
        let mut b2 = Builder::new(100);
        b2.push_back(10).unwrap();
        assert!(b2.push_back(3).is_err());
    }

    #[test]
    fn builder_rejects_position_beyond_universe() {
        let mut b = Builder::new(10);
        assert!(b.push_back(10).is_err());
    }

    #[test]
    fn write_then_read_roundtrips() {
        let positions: Vec<Position> = vec![1, 2, 70_000, 140_000];
        let arr = build(&positions, 500_000);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sparse");
        arr.write(&path).unwrap();
        let restored = SparseArray::read(&path).unwrap();
        assert_eq!(restored.count(), arr.count());
        assert_eq!(restored.universe(), arr.universe());
        for &p in &positions {
            assert_eq!(restored.access(p), arr.access(p));
        }
    }

    #[test]
    fn read_rejects_a_file_truncated_inside_the_header() {
        let positions: Vec<Position> = vec![1, 2, 70_000];
        let arr = build(&positions, 500_000);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.sparse");
        arr.write(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(10); // well short of the 44-byte header
        std::fs::write(&path, &bytes).unwrap();

        assert!(SparseArray::read(&path).is_err());
    }

    #[test]
    fn large_random_cross_block_rank_select_matches_brute_force() {
        // Exercise multiple super-blocks (BLOCK_SIZE = 65536).
        let mut positions = Vec::new();
        let mut v: Position = 1;
        for _ in 0..2000 {
            positions.push(v);
            v += 97; // arbitrary ascending stride crossing many blocks
        }
        let universe = v + 1;
        let arr = build(&positions, universe);
        for (i, &p) in positions.iter().enumerate() {
            assert_eq!(arr.rank(p), i as u64);
            assert_eq!(arr.select(i as u64), p);
        }
    }
}
