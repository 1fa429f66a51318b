//! One-shot conversion of a version-2 graph's two-file predecessor-
//! bitmap counts (`B-counts.ord1p`, `B-counts.ord2p`) into the current
//! `SparseArray`-backed `B.edges-counts` form.
//!
//! Grounded on `GossCmdUpgradeGraph.cc`'s existence in the retrieved
//! source tree (body not included in the retrieval) together with the
//! header/version contract in `KmerSet.hh` and the "SparseArray of
//! predecessor bitmaps" description of the old layout. The inferred
//! semantics: `ord1p` marks, per edge rank, whether the true count
//! exceeds the first order threshold (count >= 2); `ord2p` marks the
//! second (count >= 3). A rank present in neither bitmap has count 1; a
//! rank present in both has count 3 — the predecessor chain does not
//! encode counts above 3, which matches "bitmaps" (not a packed integer
//! column) being an earlier, coarser format than the current
//! variable-byte `B.edges-counts`.

use std::path::Path;

use gossamer_common::Result;

use super::Graph;
use crate::bitops::SparseArray;

fn ord1p_path(base: &Path) -> std::path::PathBuf {
    let mut p = base.as_os_str().to_owned();
    p.push("-counts.ord1p");
    p.into()
}

fn ord2p_path(base: &Path) -> std::path::PathBuf {
    let mut p = base.as_os_str().to_owned();
    p.push("-counts.ord2p");
    p.into()
}

/// Read a version-2 graph at `old_base` (whose `.header`/`.edges` files
/// are already in the current format, but whose counts are the old
/// two-bitmap encoding) and persist an upgraded copy at `new_base` with
/// a `B.edges-counts` column in the current format.
pub fn upgrade_graph(old_base: &Path, new_base: &Path) -> Result<()> {
    let old = Graph::open(old_base)?;
    let ord1p = SparseArray::read(ord1p_path(old_base))?;
    let ord2p = SparseArray::read(ord2p_path(old_base))?;

    let mut builder = super::GraphBuilder::new(old.k(), old.is_asymmetric(), true)?;
    for r in 0..old.count() {
        let edge = old.select(r);
        let mut count: u32 = 1;
        if ord1p.access(r) {
            count += 1;
        }
        if ord2p.access(r) {
            count += 1;
        }
        builder.push_back(edge.value(), count)?;
    }
    let upgraded = builder.end()?;
    upgraded.persist(new_base)
}
