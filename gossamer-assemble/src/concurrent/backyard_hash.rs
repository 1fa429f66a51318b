//! Concurrent multi-way cuckoo hash mapping k-mer values to counts.
//!
//! A fixed-capacity table of `slots = 2^slot_bits * ways` cells, each a
//! bit-packed (hash-function index `j`, count, residual) triple in one
//! `u64`. The residual is the upper `item_bits - slot_bits` bits of an
//! *invertible* mixing function applied to the key (itself only
//! `item_bits` wide — a k-mer never needs the full 64 bits) under hash
//! function `j`: given the slot's primary index and `j`, `unhash`
//! recovers the original key exactly from the residual alone, which is
//! what lets a displaced cuckoo entry be reinserted without the table
//! ever storing the full key. The remaining `64 - item_bits + slot_bits`
//! bits of the word are split between the count and the 2-bit hash
//! index, so `residual_bits + count_bits + hash_bits == 64` always,
//! mirroring the source's `mCountBits = 8*sizeof(value_type) - itemBits
//! + min(itemBits, slotBits) - hashNumBits`.
//!
//! A family of `ways` slots at stride `2^slot_bits` starting at the
//! key's mixed slot absorbs local collisions before cuckoo displacement
//! proper kicks in; a bounded number of top-level displacement rounds
//! follow before the key is dropped into the spill map. Every slot
//! update is serialised by the spinlock-style stripe of its *primary*
//! slot index (`lock_stripe`); the spill map is guarded by one mutex.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use gossamer_common::{Error, Result};

use super::blended_sort;

const NUM_HASHES: u64 = 4;
const HASH_BITS: u32 = 2; // log2(NUM_HASHES), stored in the low bits of a slot
const MAX_DISPLACEMENTS: u32 = 64;
const LOCK_STRIPE_BITS: u32 = 10; // 2^L lock buckets

/// Odd multipliers, one per hash function, used as invertible mixers
/// (every odd integer is a unit modulo any power of two).
const MULTIPLIERS: [u64; NUM_HASHES as usize] = [
    0x9E37_79B9_7F4A_7C15,
    0xBF58_476D_1CE4_E5B9,
    0x94D0_49BB_1331_11EB,
    0xD6E8_FEB8_6659_FD93,
];

/// The modular inverse of odd `a` mod `2^bits`, via Newton-Raphson
/// refinement starting from the self-inverse seed: each iteration
/// doubles the number of correct low bits of the mod-2^64 inverse,
/// which is then truncated to `bits` bits (valid because 2^bits
/// divides 2^64, so the inverse mod 2^64 is also correct mod 2^bits).
fn mod_inverse(a: u64, bits: u32) -> u64 {
    let mut x = a;
    for _ in 0..6 {
        x = x.wrapping_mul(2u64.wrapping_sub(a.wrapping_mul(x)));
    }
    mask_to(x, bits)
}

fn mask_to(v: u64, bits: u32) -> u64 {
    if bits >= 64 {
        v
    } else {
        v & ((1u64 << bits) - 1)
    }
}

/// Diagnostic counters, the Rust analogue of the original's
/// `PropertyTree stat()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub distinct_keys: u64,
    pub spilled_keys: u64,
    pub spilled_insertions: u64,
}

struct Slot(AtomicU64);

impl Slot {
    fn empty() -> Self {
        Slot(AtomicU64::new(0))
    }
}

/// A fixed-capacity concurrent multiset of k-mers with counts.
pub struct BackyardHash {
    item_bits: u32,
    slot_bits: u32,
    residual_bits: u32,
    count_bits: u32,
    count_mask: u64,
    ways: u64,
    items: Vec<Slot>,
    locks: Vec<Mutex<()>>,
    inverses: [u64; NUM_HASHES as usize],
    size: AtomicU64,
    spill: Mutex<FxHashMap<u64, u64>>,
    spilled_insertions: AtomicU64,
    round_robin: AtomicU64,
}

impl BackyardHash {
    /// `item_bits` is the number of bits needed to represent a stored
    /// key (`2*(k+1)` for an edge value, always `<= 64`); `capacity_hint`
    /// is the expected number of distinct keys, used to size the table;
    /// `ways` is the number of slots probed per hash family.
    pub fn new(item_bits: u32, capacity_hint: u64, ways: u64) -> Self {
        let item_bits = item_bits.clamp(1, 64);
        let ways = ways.max(1);

        let target_slots = (capacity_hint / ways).max(1);
        let by_capacity = 64 - target_slots.leading_zeros();
        // count_bits = 64 - item_bits + slot_bits - HASH_BITS must stay
        // in [1, 62]; solve for the admissible slot_bits range.
        let min_slot_bits = (item_bits + HASH_BITS).saturating_sub(63);
        let slot_bits = by_capacity.clamp(min_slot_bits.max(1), item_bits).min(30);

        let residual_bits = item_bits - slot_bits;
        let count_bits = 64 - item_bits + slot_bits - HASH_BITS;
        let count_mask = mask_to(u64::MAX, count_bits);

        let num_slots = (1u64 << slot_bits) * ways;
        let items = (0..num_slots).map(|_| Slot::empty()).collect();
        let locks = (0..(1usize << LOCK_STRIPE_BITS))
            .map(|_| Mutex::new(()))
            .collect();
        let inverses = MULTIPLIERS.map(|m| mod_inverse(m, item_bits));

        BackyardHash {
            item_bits,
            slot_bits,
            residual_bits,
            count_bits,
            count_mask,
            ways,
            items,
            locks,
            inverses,
            size: AtomicU64::new(0),
            spill: Mutex::new(FxHashMap::default()),
            spilled_insertions: AtomicU64::new(0),
            round_robin: AtomicU64::new(0),
        }
    }

    fn num_slots(&self) -> u64 {
        (1u64 << self.slot_bits) * self.ways
    }

    fn pack(&self, j: u64, count: u64, residual: u64) -> u64 {
        (residual << (HASH_BITS + self.count_bits)) | (count << HASH_BITS) | j
    }

    fn unpack(&self, word: u64) -> (u64, u64, u64) {
        let j = word & ((1 << HASH_BITS) - 1);
        let count = (word >> HASH_BITS) & self.count_mask;
        let residual = word >> (HASH_BITS + self.count_bits);
        (j, count, residual)
    }

    fn mix(&self, key: u64, j: u64) -> u64 {
        mask_to(key.wrapping_mul(MULTIPLIERS[j as usize]), self.item_bits)
    }

    fn unmix(&self, hashed: u64, j: u64) -> u64 {
        mask_to(hashed.wrapping_mul(self.inverses[j as usize]), self.item_bits)
    }

    /// Recover the original key given a slot's primary index, its
    /// stored hash-function index, and its stored residual.
    fn unhash(&self, primary_slot: u64, j: u64, residual: u64) -> u64 {
        let hashed = (primary_slot << self.residual_bits) | residual;
        self.unmix(hashed, j)
    }

    fn hash_j(&self, key: u64, j: u64) -> (u64, u64) {
        let hashed = self.mix(key, j);
        let primary = hashed >> self.residual_bits;
        let residual = hashed & mask_to(u64::MAX, self.residual_bits);
        (primary, residual)
    }

    fn lock_stripe(&self, primary_slot: u64) -> &Mutex<()> {
        let idx = (primary_slot as usize) & ((1 << LOCK_STRIPE_BITS) - 1);
        &self.locks[idx]
    }

    /// Increment the count for `key`, inserting it on first occurrence.
    pub fn insert(&self, key: u64) {
        // 1. Look for an existing entry across every hash function's
        // slot family.
        for j in 0..NUM_HASHES {
            let (s0, residual) = self.hash_j(key, j);
            if self.try_increment(s0, j, residual) {
                return;
            }
        }

        // 2. Cuckoo insert: evict and reinsert along a rotating choice
        // of hash function, bounded by MAX_DISPLACEMENTS.
        self.size.fetch_add(1, Ordering::Relaxed);
        let mut j = self.round_robin.fetch_add(1, Ordering::Relaxed) % NUM_HASHES;
        let mut displaced_key = key;
        let mut displaced_count: u64 = 1;

        for _ in 0..MAX_DISPLACEMENTS {
            let (s0, mut residual) = self.hash_j(displaced_key, j);
            let mut count = displaced_count;
            let mut cur_j = j;
            let mut placed = false;

            for way in 0..self.ways {
                let s = s0 + way * (1u64 << self.slot_bits);
                let new_word = self.pack(cur_j, count, residual);
                let old_word = {
                    let _g = self.lock_stripe(s0).lock();
                    self.items[s as usize].0.swap(new_word, Ordering::SeqCst)
                };
                let (old_j, old_count, old_residual) = self.unpack(old_word);
                if old_count == 0 {
                    placed = true;
                    break;
                }
                cur_j = old_j;
                count = old_count;
                residual = old_residual;
            }

            if placed {
                return;
            }

            // The whole family was full; the last-evicted entry becomes
            // the new displaced key, tried under the next hash function.
            displaced_key = self.unhash(s0, cur_j, residual);
            displaced_count = count;
            j = (cur_j + 1) % NUM_HASHES;
        }

        // 3. Too hard: spill.
        self.spilled_insertions.fetch_add(1, Ordering::Relaxed);
        let mut spill = self.spill.lock();
        *spill.entry(displaced_key).or_insert(0) += displaced_count;
    }

    /// Try to find `key` (identified by `j`/`residual`) among the
    /// `ways` slots of its family starting at `s0` and increment its
    /// count. Returns `true` if a matching slot was found (whether or
    /// not the increment itself needed to spill on overflow).
    fn try_increment(&self, s0: u64, j: u64, residual: u64) -> bool {
        for way in 0..self.ways {
            let s = s0 + way * (1u64 << self.slot_bits);
            let _g = self.lock_stripe(s0).lock();
            let word = self.items[s as usize].0.load(Ordering::SeqCst);
            let (slot_j, count, slot_residual) = self.unpack(word);
            if count > 0 && slot_j == j && slot_residual == residual {
                let new_count = count + 1;
                if new_count <= self.count_mask {
                    self.items[s as usize]
                        .0
                        .store(self.pack(j, new_count, residual), Ordering::SeqCst);
                } else {
                    let key = self.unhash(s0, j, residual);
                    self.items[s as usize].0.store(0, Ordering::SeqCst);
                    drop(_g);
                    let mut spill = self.spill.lock();
                    *spill.entry(key).or_insert(0) += new_count;
                }
                return true;
            }
        }
        false
    }

    /// Number of distinct keys inserted so far (monotonically
    /// increasing as producers insert; stable once they've all joined).
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            distinct_keys: self.size(),
            spilled_keys: self.spill.lock().len() as u64,
            spilled_insertions: self.spilled_insertions.load(Ordering::SeqCst),
        }
    }

    /// Enumerate every occupied slot's (key, count), sorted ascending
    /// by key via [`blended_sort`], with spilled entries interleaved at
    /// their sorted position.
    pub fn sort(&self, threads: usize) -> Result<Vec<(u64, u64)>> {
        let mut out = Vec::new();
        for s in 0..self.num_slots() {
            let word = self.items[s as usize].0.load(Ordering::SeqCst);
            let (j, count, residual) = self.unpack(word);
            if count > 0 {
                let primary = s & ((1u64 << self.slot_bits) - 1);
                let key = self.unhash(primary, j, residual);
                out.push((key, count));
            }
        }
        {
            let spill = self.spill.lock();
            for (&key, &count) in spill.iter() {
                if count > self.count_mask {
                    return Err(Error::CapacityExceeded(format!(
                        "spilled key count {count} exceeds representable range"
                    )));
                }
                out.push((key, count));
            }
        }

        blended_sort::sort(&mut out, 64, threads, |item| item.0, |a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}
