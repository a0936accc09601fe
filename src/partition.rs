//! Balanced contiguous partitioning of a globally ordered sequence across a
//! rank group.
//!
//! Two primitives: [`local_range`], a pure function assigning rank `r` its
//! contiguous slice of `[0, n)`, and [`global_offset`], a blocking collective
//! returning the exclusive prefix sum of per-rank local counts in rank order.
//! The union of all ranks' slices covers `[0, n)` exactly, with no gaps or
//! overlaps, and slice starts are non-decreasing in rank.

use crate::collective;
use crate::comm::{CommTag, Communicator};
use crate::tlv_error::TlvError;

/// Contiguous half-open slice `[start, end)` of `[0, global_count)` owned by
/// `rank` in a group of `size`.
///
/// Slices are balanced: every rank gets `global_count / size` elements and the
/// remainder is spread one element each over the lowest ranks.
pub fn local_range(rank: usize, size: usize, global_count: u64) -> (u64, u64) {
    assert!(size > 0, "empty rank group");
    assert!(rank < size, "rank {rank} out of range for group of {size}");
    let size = size as u64;
    let rank = rank as u64;
    let per = global_count / size;
    let rem = global_count % size;
    if rank < rem {
        let start = rank * (per + 1);
        (start, start + per + 1)
    } else {
        let start = rem * (per + 1) + (rank - rem) * per;
        (start, start + per)
    }
}

/// This rank's starting index when all ranks' local arrays are concatenated
/// in rank order (exclusive prefix sum of `local_count`).
///
/// Blocking collective: every rank must call it, in the same order.
pub fn global_offset<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local_count: u64,
) -> Result<u64, TlvError> {
    collective::exclusive_scan_sum(comm, tag, local_count)
}
