// THEORY:
// The `IdentityAllocator` hands out the small integers that name tracked blobs.
// It is owned by one `IdentityTracker`, never shared, so independent tracking
// sessions cannot hand out each other's IDs.
//
// Rules:
// - IDs are non-negative and start at 0.
// - An ID is never held by two active blobs at once.
// - The lowest released ID is reused before any higher one: releasing an ID
//   below the next candidate moves the candidate back down to it.
// - IDs `[0, reserved)` are reserved. Only a blob that satisfies the configured
//   `ReservationRule` may take one; any other blob skips past the reserved range
//   without moving the next candidate, so the reserved IDs stay free for the
//   blob they are meant for.

use crate::core_modules::blob::Blob;
use std::collections::BTreeSet;
use std::fmt;

/// Decides whether a blob may take a reserved ID.
pub trait ReservationRule: Send + Sync + fmt::Debug {
    fn qualifies(&self, blob: &Blob, frame_width: u32) -> bool;
}

/// Qualifies blobs whose rightmost column reaches at least this fraction of the
/// frame width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RightExtentFraction(pub f64);

impl ReservationRule for RightExtentFraction {
    fn qualifies(&self, blob: &Blob, frame_width: u32) -> bool {
        blob.max_right() as f64 >= self.0 * frame_width as f64
    }
}

#[derive(Debug)]
pub struct IdentityAllocator {
    next_candidate: u32,
    active: BTreeSet<u32>,
    reserved: u32,
    rule: Box<dyn ReservationRule>,
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new(0, Box::new(RightExtentFraction(0.66)))
    }
}

impl IdentityAllocator {
    pub fn new(reserved: u32, rule: Box<dyn ReservationRule>) -> Self {
        Self {
            next_candidate: 0,
            active: BTreeSet::new(),
            reserved,
            rule,
        }
    }

    pub fn is_active(&self, id: u32) -> bool {
        self.active.contains(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn next_candidate(&self) -> u32 {
        self.next_candidate
    }

    /// Assigns the lowest ID this blob may hold.
    pub fn allocate(&mut self, blob: &Blob, frame_width: u32) -> u32 {
        let mut id = self.next_candidate;
        while self.active.contains(&id) {
            id += 1;
        }

        if id < self.reserved && !self.rule.qualifies(blob, frame_width) {
            while id < self.reserved || self.active.contains(&id) {
                id += 1;
            }
        } else {
            self.next_candidate = id + 1;
        }

        let inserted = self.active.insert(id);
        debug_assert!(inserted, "identity {id} handed out twice");
        id
    }

    pub fn release(&mut self, id: u32) {
        let removed = self.active.remove(&id);
        debug_assert!(removed, "identity {id} released but not active");
        if self.next_candidate > id {
            self.next_candidate = id;
        }
    }

    /// Forgets every active ID.
    pub fn clear(&mut self) {
        self.active.clear();
        self.next_candidate = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::blob::RowSpan;

    fn blob_reaching(right: i32) -> Blob {
        Blob::from_rows(0, vec![RowSpan::new(0, right)], 5)
    }

    #[test]
    fn ids_count_up_from_zero() {
        let mut allocator = IdentityAllocator::default();
        let blob = blob_reaching(1);
        let ids: Vec<u32> = (0..4).map(|_| allocator.allocate(&blob, 100)).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(allocator.active_count(), 4);
    }

    #[test]
    fn lowest_released_id_is_reused() {
        let mut allocator = IdentityAllocator::default();
        let blob = blob_reaching(1);
        for _ in 0..6 {
            allocator.allocate(&blob, 100);
        }
        allocator.release(3);
        assert!(!allocator.is_active(3));
        assert_eq!(allocator.allocate(&blob, 100), 3);
        // next candidate 4 is active, so the scan moves past it
        assert_eq!(allocator.allocate(&blob, 100), 6);
    }

    #[test]
    fn reserved_ids_wait_for_a_qualifying_blob() {
        let mut allocator = IdentityAllocator::new(2, Box::new(RightExtentFraction(0.66)));
        let narrow = blob_reaching(10);
        let wide = blob_reaching(80);

        assert_eq!(allocator.allocate(&narrow, 100), 2);
        assert_eq!(allocator.allocate(&narrow, 100), 3);
        assert_eq!(allocator.next_candidate(), 0);
        assert_eq!(allocator.allocate(&wide, 100), 0);
        assert_eq!(allocator.allocate(&wide, 100), 1);
        assert_eq!(allocator.allocate(&wide, 100), 4);
    }

    #[test]
    fn clear_starts_over() {
        let mut allocator = IdentityAllocator::default();
        let blob = blob_reaching(1);
        allocator.allocate(&blob, 100);
        allocator.allocate(&blob, 100);
        allocator.clear();
        assert_eq!(allocator.active_count(), 0);
        assert_eq!(allocator.allocate(&blob, 100), 0);
    }
}
