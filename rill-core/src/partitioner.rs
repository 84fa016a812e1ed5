//! # Partitioner
//!
//! Slot selection for routing records to task buffers.
//!
//! Jump consistent hashing keeps per-key affinity under scale changes with
//! minimal reshuffling: growing from `n` to `n + 1` buckets remaps only
//! `~1/(n + 1)` of the key space.

/// Map a 64-bit record id to a bucket in `0..buckets`.
///
/// Lamping–Veach jump consistent hash. Returns 0 when `buckets` is 0.
pub fn jump_consistent_hash(id: u64, buckets: usize) -> usize {
    if buckets == 0 {
        return 0;
    }

    let mut key = id;
    let mut bucket: i64 = -1;
    let mut next: i64 = 0;

    while next < buckets as i64 {
        bucket = next;
        key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
        next = ((bucket.wrapping_add(1) as f64)
            * ((1u64 << 31) as f64 / (((key >> 33) + 1) as f64))) as i64;
    }

    bucket as usize
}
