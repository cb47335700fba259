// THEORY:
// The `IdentityTracker` gives each blob a stable number across ticks. It keeps
// the previous tick's blobs (including ghosts) and reconciles the current tick's
// blobs against them by nearest centroid (squared Euclidean distance, first match
// wins on ties).
//
// 1.  **Nothing to compare with**: every current blob gets a fresh ID.
// 2.  **At least as many blobs as before**: each previous blob claims its nearest
//     unclaimed current blob and passes its ID on. Current blobs left over are
//     new arrivals and get fresh IDs.
// 3.  **Fewer blobs than before**: each current blob claims its nearest
//     unclaimed previous blob and inherits its ID. A previous blob nobody
//     claimed loses one unit of ttl. If ttl is still positive it lives on as a
//     *ghost*: appended to this tick's output with its last known geometry, so a
//     hand briefly hidden keeps its number. Otherwise its ID is released.
//
// Every fresh blob starts with the full ttl, so an object may vanish for
// `max_ttl - 1` ticks and still be recognised when it comes back.
//
// The output of `update` (live blobs followed by ghosts) becomes the previous
// list for the next tick. Previous blobs that were matched or expired are handed
// back to the caller for pooling.

use crate::core_modules::blob::Blob;
use crate::core_modules::identity::{IdentityAllocator, ReservationRule};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct IdentityTracker {
    allocator: IdentityAllocator,
    tracked: Vec<Blob>,
    live: usize,
}

fn distance_sq(a: &Blob, b: &Blob) -> f64 {
    let (ax, ay) = a.centroid();
    let (bx, by) = b.centroid();
    (ax - bx) * (ax - bx) + (ay - by) * (ay - by)
}

/// Index of the blob in `candidates` nearest to `blob` that is not yet taken.
fn nearest_unclaimed(blob: &Blob, candidates: &[Blob]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        if candidate.taken {
            continue;
        }
        let distance = distance_sq(blob, candidate);
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((index, distance));
        }
    }
    best.map(|(index, _)| index)
}

impl IdentityTracker {
    pub fn new(reserved_ids: u32, rule: Box<dyn ReservationRule>) -> Self {
        Self {
            allocator: IdentityAllocator::new(reserved_ids, rule),
            tracked: Vec::new(),
            live: 0,
        }
    }

    pub fn allocator(&self) -> &IdentityAllocator {
        &self.allocator
    }

    /// Every blob from the last update: live ones first, then ghosts.
    pub fn tracked(&self) -> &[Blob] {
        &self.tracked
    }

    /// Blobs seen in the last tick.
    pub fn live(&self) -> &[Blob] {
        &self.tracked[..self.live]
    }

    /// Blobs not seen in the last tick whose ttl has not run out.
    pub fn ghosts(&self) -> &[Blob] {
        &self.tracked[self.live..]
    }

    /// Releases every identity and returns all tracked blobs.
    pub fn reset(&mut self) -> Vec<Blob> {
        self.allocator.clear();
        self.live = 0;
        std::mem::take(&mut self.tracked)
    }

    /// Reconciles this tick's blobs with the previous tick's and returns the
    /// previous blobs that are no longer tracked.
    pub fn update(&mut self, mut current: Vec<Blob>, frame_width: u32) -> Vec<Blob> {
        let mut previous = std::mem::take(&mut self.tracked);
        for blob in current.iter_mut() {
            blob.taken = false;
        }

        let mut ghosts = Vec::new();
        if previous.is_empty() {
            // --- 1. Nothing To Compare With ---
            for blob in current.iter_mut() {
                blob.id = Some(self.allocator.allocate(blob, frame_width));
            }
        } else if current.len() >= previous.len() {
            // --- 2. Previous Blobs Claim Current Ones ---
            for old in &previous {
                if let Some(index) = nearest_unclaimed(old, &current) {
                    current[index].taken = true;
                    current[index].id = old.id;
                }
            }
            for blob in current.iter_mut().filter(|blob| !blob.taken) {
                blob.id = Some(self.allocator.allocate(blob, frame_width));
            }
        } else {
            // --- 3. Current Blobs Claim Previous Ones ---
            for old in previous.iter_mut() {
                old.taken = false;
            }
            for blob in current.iter_mut() {
                if let Some(index) = nearest_unclaimed(blob, &previous) {
                    previous[index].taken = true;
                    blob.id = previous[index].id;
                }
            }

            let mut index = 0;
            while index < previous.len() {
                let old = &mut previous[index];
                if old.taken {
                    index += 1;
                    continue;
                }
                old.ttl = old.ttl.saturating_sub(1);
                if old.ttl > 0 {
                    ghosts.push(previous.remove(index));
                } else {
                    if let Some(id) = old.id {
                        self.allocator.release(id);
                        info!(id, "identity released");
                    }
                    index += 1;
                }
            }
        }

        self.live = current.len();
        debug!(live = self.live, ghosts = ghosts.len(), "identities reconciled");
        current.append(&mut ghosts);
        self.tracked = current;
        previous
    }
}
