// THEORY:
// The scanline extractor can split one object into several blobs (a pixel can join
// two blobs, or an object's top can start as two separate fingers). The
// `BlobMerger` folds such fragments back together after the frame has been
// scanned.
//
// Two blobs are mergeable when either:
// - on at least one row they both cover, their spans intersect (containment
//   counts), or
// - one ends exactly one row above where the other starts, and those two
//   boundary rows' spans intersect.
//
// Merging is repeated to a fixed point: after every merge the pair scan starts
// again from the beginning, because the grown blob may now touch blobs it did not
// touch before. The absorbed blob is removed and handed back for pooling.
//
// Once nothing merges, blobs with fewer than `min_points` trimmed points are
// discarded. With `keep_merged` set, blobs built from at least one merge are kept
// regardless of size.

use crate::core_modules::blob::Blob;
use tracing::debug;

/// Whether `a` and `b` belong to the same object.
pub fn mergeable(a: &Blob, b: &Blob) -> bool {
    let shared_top = a.top().max(b.top());
    let shared_bottom = a.bottom().min(b.bottom());
    for y in shared_top..=shared_bottom {
        if let (Some(span_a), Some(span_b)) = (a.row(y), b.row(y)) {
            if span_a.intersects(span_b) {
                return true;
            }
        }
    }

    let touching = |upper: &Blob, lower: &Blob| {
        upper.bottom() + 1 == lower.top()
            && match (upper.row(upper.bottom()), lower.row(lower.top())) {
                (Some(above), Some(below)) => above.intersects(below),
                _ => false,
            }
    };
    touching(a, b) || touching(b, a)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSettings {
    pub min_points: u32,
    pub keep_merged: bool,
}

#[derive(Debug, Default)]
pub struct BlobMerger {
    last_merges: usize,
    last_discarded: usize,
}

impl BlobMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges performed by the most recent `reduce`.
    pub fn last_merges(&self) -> usize {
        self.last_merges
    }

    /// Undersized blobs dropped by the most recent `reduce`.
    pub fn last_discarded(&self) -> usize {
        self.last_discarded
    }

    /// Merges `blobs` to a fixed point, then filters out undersized ones.
    /// Every record removed from `blobs` is pushed onto `retired`.
    pub fn reduce(&mut self, blobs: &mut Vec<Blob>, settings: &MergeSettings, retired: &mut Vec<Blob>) {
        self.last_merges = merge_to_fixed_point(blobs, retired);

        let before = retired.len();
        let mut index = 0;
        while index < blobs.len() {
            let blob = &blobs[index];
            let keep = blob.num_points() >= settings.min_points || (settings.keep_merged && blob.merges() > 0);
            if keep {
                index += 1;
            } else {
                retired.push(blobs.remove(index));
            }
        }
        self.last_discarded = retired.len() - before;

        debug!(
            merges = self.last_merges,
            discarded = self.last_discarded,
            kept = blobs.len(),
            "blobs reduced"
        );
    }
}

fn merge_to_fixed_point(blobs: &mut Vec<Blob>, retired: &mut Vec<Blob>) -> usize {
    let mut merges = 0;
    while let Some((i, j)) = find_mergeable_pair(blobs) {
        let absorbed = blobs.remove(j);
        blobs[i].absorb(&absorbed);
        retired.push(absorbed);
        merges += 1;
    }
    merges
}

fn find_mergeable_pair(blobs: &[Blob]) -> Option<(usize, usize)> {
    for i in 0..blobs.len() {
        for j in i + 1..blobs.len() {
            if mergeable(&blobs[i], &blobs[j]) {
                return Some((i, j));
            }
        }
    }
    None
}
