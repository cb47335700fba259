// THEORY:
// The `BlobExtractor` turns one frame's `ClassificationMask` into a list of
// `Blob`s in a single raster pass. It never looks back at the mask: every
// decision is made from the blobs' open rows as the scan goes by.
//
// For each blob candidate pixel (foreground and not background):
// 1.  Every open blob is asked whether it `accepts` the pixel under the configured
//     gap tolerances. The pixel is added to *every* blob that accepts it. Two
//     blobs that both took the same pixel will overlap and are folded together
//     later by the `BlobMerger`.
// 2.  If no blob accepts it, a new blob starts at that pixel.
//
// When the scan ends every blob's open row is closed.
//
// Blob records are pooled. Records handed back through `recycle` are reset and
// reused on later frames instead of being reallocated, so a steady scene stops
// allocating once the pool has warmed up.

use crate::core_modules::blob::Blob;
use crate::core_modules::classifier::ClassificationMask;
use tracing::trace;

/// Scan parameters for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionSettings {
    pub max_gap_x: i32,
    pub max_gap_y: i32,
    pub boundary_fraction: f64,
    /// ttl given to every new blob.
    pub max_ttl: u32,
}

#[derive(Default)]
pub struct BlobExtractor {
    pool: Vec<Blob>,
}

impl BlobExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of idle records waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// Returns finished records to the pool.
    pub fn recycle(&mut self, blobs: impl IntoIterator<Item = Blob>) {
        self.pool.extend(blobs);
    }

    /// Scans the mask and appends the frame's blobs to `blobs`, which must be empty.
    pub fn extract(&mut self, mask: &ClassificationMask, settings: &ExtractionSettings, blobs: &mut Vec<Blob>) {
        debug_assert!(blobs.is_empty(), "extractor output was not drained");
        let width = mask.width() as usize;
        if width == 0 {
            return;
        }

        for (index, flags) in mask.flags().iter().enumerate() {
            if !flags.is_blob_candidate() {
                continue;
            }
            let x = (index % width) as i32;
            let y = (index / width) as i32;

            let mut joined = false;
            for blob in blobs.iter_mut() {
                if blob.accepts(x, y, settings.max_gap_x, settings.max_gap_y) {
                    blob.add(x, y, settings.boundary_fraction);
                    joined = true;
                }
            }
            if !joined {
                blobs.push(self.take(x, y, settings.max_ttl));
            }
        }

        for blob in blobs.iter_mut() {
            blob.close(settings.boundary_fraction);
        }
        trace!(blobs = blobs.len(), pooled = self.pool.len(), "frame scanned");
    }

    fn take(&mut self, x: i32, y: i32, ttl: u32) -> Blob {
        match self.pool.pop() {
            Some(mut blob) => {
                blob.reset(x, y, ttl);
                blob
            }
            None => Blob::new(x, y, ttl),
        }
    }
}
