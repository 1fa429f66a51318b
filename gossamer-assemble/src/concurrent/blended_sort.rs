//! Parallel MSB radix sort with a comparison-sort fallback for small or
//! radix-exhausted sub-ranges.
//!
//! `sort` partitions `items` by the top 8 bits of a `radix_bits`-wide key
//! (`key_fn`), recursing into each non-empty bucket with the window
//! shifted down by 8 bits, and dispatches the recursive buckets across a
//! `rayon` thread pool of the requested size. Once a bucket's remaining
//! radix window is empty, or its length drops below [`FALLBACK_THRESHOLD`],
//! it is finished off with `cmp`, which alone defines the total order:
//! radix bucketing is purely an optimisation, not itself order-bearing.

use std::cmp::Ordering;

const RADIX_BITS_PER_PASS: u32 = 8;
const BUCKETS: usize = 1 << RADIX_BITS_PER_PASS;
const FALLBACK_THRESHOLD: usize = 1024;

/// Sort `items` in place under the total order `cmp` defines, using
/// `key_fn` (an integer of `radix_bits` bits, MSB-first) to bucket.
/// Dispatches recursive work across `threads` rayon workers.
pub fn sort<T, K, C>(items: &mut [T], radix_bits: u32, threads: usize, key_fn: K, cmp: C)
where
    T: Copy + Send,
    K: Fn(&T) -> u64 + Sync,
    C: Fn(&T, &T) -> Ordering + Sync,
{
    if items.len() < 2 {
        return;
    }
    let run = || radix_pass(items, radix_bits, &key_fn, &cmp);
    if threads <= 1 {
        run();
        return;
    }
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(run),
        Err(_) => run(),
    }
}

fn radix_pass<T, K, C>(items: &mut [T], shift: u32, key_fn: &K, cmp: &C)
where
    T: Copy + Send,
    K: Fn(&T) -> u64 + Sync,
    C: Fn(&T, &T) -> Ordering + Sync,
{
    if items.len() < 2 {
        return;
    }
    if shift == 0 || items.len() < FALLBACK_THRESHOLD {
        items.sort_unstable_by(cmp);
        return;
    }

    let chunk = shift.min(RADIX_BITS_PER_PASS);
    let next_shift = shift - chunk;
    let nbuckets = 1usize << chunk;
    let mask = if chunk == 64 { u64::MAX } else { (1u64 << chunk) - 1 };
    let bucket_of = |item: &T| -> usize { ((key_fn(item) >> next_shift) & mask) as usize };

    let mut counts = vec![0usize; nbuckets];
    for item in items.iter() {
        counts[bucket_of(item)] += 1;
    }
    let mut offsets = vec![0usize; nbuckets + 1];
    for i in 0..nbuckets {
        offsets[i + 1] = offsets[i] + counts[i];
    }

    let mut scratch: Vec<T> = Vec::with_capacity(items.len());
    // SAFETY-free scatter: build scratch via cursor offsets, then copy back.
    let mut cursors = offsets.clone();
    scratch.resize(items.len(), items[0]);
    for item in items.iter() {
        let b = bucket_of(item);
        scratch[cursors[b]] = *item;
        cursors[b] += 1;
    }
    items.copy_from_slice(&scratch);

    // Recurse into each non-empty bucket on disjoint sub-slices.
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for b in 0..nbuckets {
        let (start, end) = (offsets[b], offsets[b + 1]);
        if end > start {
            ranges.push((start, end));
        }
    }

    if next_shift == 0 || ranges.len() <= 1 {
        for (start, end) in ranges {
            radix_pass(&mut items[start..end], next_shift, key_fn, cmp);
        }
        return;
    }

    // Split into disjoint mutable slices up front so buckets can recurse
    // concurrently under rayon.
    let mut slices: Vec<&mut [T]> = Vec::with_capacity(ranges.len());
    let mut rest = items;
    let mut prev_end = 0;
    for &(start, end) in &ranges {
        let (_, tail) = rest.split_at_mut(start - prev_end);
        let (piece, new_rest) = tail.split_at_mut(end - start);
        slices.push(piece);
        rest = new_rest;
        prev_end = end;
    }

    use rayon::prelude::*;
    slices.into_par_iter().for_each(|slice| {
        radix_pass(slice, next_shift, key_fn, cmp);
    });
}
