// THEORY:
// A `Blob` is one connected region of target-coloured pixels. Unlike a blob found
// by flood fill, it is grown while the frame is still being scanned: pixels arrive
// in raster order and the blob only ever sees its own current row plus the rows it
// has already closed.
//
// Lifecycle of a blob inside one frame:
// 1.  **Open row**: matched pixels on the blob's bottom row are appended to
//     `row_coords`. Raster order means they are already sorted by x.
// 2.  **Finalize**: when a pixel arrives on a lower row (or the frame ends) the
//     open row is closed. Only the interior of the row survives: given n pixels
//     and boundary fraction f, indices round((n-1)(1-f)) ..= round((n-1)f) are
//     kept, so stray pixels at either extreme do not stretch the boundary.
// 3.  **Gap rows**: a pixel may join from a few rows further down. The skipped
//     rows are filled by interpolating the left edge towards the new pixel and
//     repeating the previous right edge. They contribute no points.
//
// After the frame the blob is merged, measured (`shape`) and handed to the
// tracker, which owns the identity fields (`id`, `ttl`, `taken`).
//
// Blob records are recycled between frames through `BlobExtractor`'s pool; `reset`
// reinitialises one without dropping its row buffers.

/// An integer point on the frame (or on its mirror image).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The trimmed extent of a blob on one row, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    pub left: i32,
    pub right: i32,
}

impl RowSpan {
    pub fn new(left: i32, right: i32) -> Self {
        debug_assert!(left <= right, "row span {left}..{right} is inverted");
        Self { left, right }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left + 1
    }

    pub fn midpoint(&self) -> f64 {
        (self.left + self.right) as f64 / 2.0
    }

    /// True when the spans share at least one column (containment included).
    pub fn intersects(&self, other: &RowSpan) -> bool {
        self.right >= other.left && other.right >= self.left
    }

    /// Number of shared columns.
    pub fn overlap(&self, other: &RowSpan) -> u32 {
        let shared = self.right.min(other.right) - self.left.max(other.left) + 1;
        shared.max(0) as u32
    }

    pub fn union(&self, other: &RowSpan) -> RowSpan {
        RowSpan::new(self.left.min(other.left), self.right.max(other.right))
    }
}

#[derive(Debug, Clone)]
pub struct Blob {
    // --- Scan State ---
    /// Extent of the open row used for gap tests: first pixel of the row and the
    /// furthest right pixel seen so far.
    left: i32,
    right: i32,
    top: i32,
    bottom: i32,
    row_coords: Vec<i32>,

    // --- Finalized Shape ---
    /// `rows[i]` is the trimmed span of row `top + i`.
    rows: Vec<RowSpan>,
    min_left: i32,
    max_right: i32,
    num_points: u32,
    merges: u32,

    // --- Geometry ---
    pub(crate) centroid: (f64, f64),
    pub(crate) hull: Vec<Point>,

    // --- Identity ---
    pub(crate) id: Option<u32>,
    pub(crate) ttl: u32,
    pub(crate) taken: bool,
}

impl Blob {
    /// Starts a blob whose only pixel is `(x, y)`.
    pub fn new(x: i32, y: i32, ttl: u32) -> Self {
        Self {
            left: x,
            right: x,
            top: y,
            bottom: y,
            row_coords: vec![x],
            rows: Vec::new(),
            min_left: x,
            max_right: x,
            num_points: 0,
            merges: 0,
            centroid: (0.0, 0.0),
            hull: Vec::new(),
            id: None,
            ttl,
            taken: false,
        }
    }

    /// Reinitialises a recycled record, keeping its buffers' capacity.
    pub fn reset(&mut self, x: i32, y: i32, ttl: u32) {
        self.left = x;
        self.right = x;
        self.top = y;
        self.bottom = y;
        self.row_coords.clear();
        self.row_coords.push(x);
        self.rows.clear();
        self.min_left = x;
        self.max_right = x;
        self.num_points = 0;
        self.merges = 0;
        self.centroid = (0.0, 0.0);
        self.hull.clear();
        self.id = None;
        self.ttl = ttl;
        self.taken = false;
    }

    /// Builds a finalized blob directly from row spans. Each row counts its full
    /// width as points.
    #[cfg(test)]
    pub(crate) fn from_rows(top: i32, rows: Vec<RowSpan>, ttl: u32) -> Self {
        let mut blob = Self::new(0, top, ttl);
        blob.row_coords.clear();
        blob.bottom = top + rows.len() as i32 - 1;
        blob.num_points = rows.iter().map(|row| row.width() as u32).sum();
        blob.min_left = rows.iter().map(|row| row.left).min().unwrap_or(0);
        blob.max_right = rows.iter().map(|row| row.right).max().unwrap_or(0);
        if let Some(last) = rows.last() {
            blob.left = last.left;
            blob.right = last.right;
        }
        blob.rows = rows;
        blob
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn bottom(&self) -> i32 {
        self.bottom
    }

    pub fn rows(&self) -> &[RowSpan] {
        &self.rows
    }

    /// The finalized span on frame row `y`, if the blob covers it.
    pub fn row(&self, y: i32) -> Option<&RowSpan> {
        if y < self.top {
            return None;
        }
        self.rows.get((y - self.top) as usize)
    }

    pub fn num_points(&self) -> u32 {
        self.num_points
    }

    /// How many other blobs were folded into this one.
    pub fn merges(&self) -> u32 {
        self.merges
    }

    pub fn min_left(&self) -> i32 {
        self.min_left
    }

    pub fn max_right(&self) -> i32 {
        self.max_right
    }

    pub fn centroid(&self) -> (f64, f64) {
        self.centroid
    }

    pub fn hull(&self) -> &[Point] {
        &self.hull
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn is_taken(&self) -> bool {
        self.taken
    }

    /// Columns between `x` and the open row's extent; zero when inside it.
    pub fn horizontal_gap(&self, x: i32) -> i32 {
        if x < self.left {
            self.left - x
        } else if x > self.right {
            x - self.right
        } else {
            0
        }
    }

    /// Rows between `y` and the blob's bottom row.
    pub fn vertical_gap(&self, y: i32) -> i32 {
        y - self.bottom
    }

    /// Whether a matched pixel at `(x, y)` belongs to this blob. Directly below
    /// (or on the same row) only the horizontal tolerance applies; further down
    /// the pixel must also lie within a diagonal that widens one column per row.
    pub fn accepts(&self, x: i32, y: i32, max_gap_x: i32, max_gap_y: i32) -> bool {
        let dx = self.horizontal_gap(x);
        let dy = self.vertical_gap(y);
        dx <= max_gap_x && (dy <= 1 || (dy <= max_gap_y && dx <= dy))
    }

    /// Adds a matched pixel. Pixels must arrive in raster order.
    pub fn add(&mut self, x: i32, y: i32, boundary_fraction: f64) {
        debug_assert!(y >= self.bottom, "row {y} arrived after row {}", self.bottom);
        if y > self.bottom {
            self.finalize_row(boundary_fraction);
            self.fill_gap_rows(x, y);
            self.bottom = y;
            self.left = x;
        } else {
            debug_assert!(
                self.row_coords.last().is_none_or(|&last| last < x),
                "pixel {x} arrived out of order on row {y}"
            );
        }
        self.right = self.right.max(x);
        self.row_coords.push(x);
    }

    /// Closes the open row, if any. Called once the frame has been scanned.
    pub fn close(&mut self, boundary_fraction: f64) {
        self.finalize_row(boundary_fraction);
        debug_assert_eq!(self.rows.len() as i32, self.bottom - self.top + 1);
    }

    fn finalize_row(&mut self, boundary_fraction: f64) {
        let num_coords = self.row_coords.len();
        if num_coords == 0 {
            return;
        }
        let (lower, upper) = trimmed_range(num_coords, boundary_fraction);
        self.num_points += (upper - lower + 1) as u32;
        let span = RowSpan::new(self.row_coords[lower], self.row_coords[upper]);
        self.push_row(span);
        self.right = self.row_coords[num_coords - 1];
        self.row_coords.clear();
    }

    fn fill_gap_rows(&mut self, x: i32, y: i32) {
        let Some(previous) = self.rows.last().copied() else {
            return;
        };
        let skipped = y - self.bottom;
        let gradient = (x - previous.left) as f64 / skipped as f64;
        for step in 1..skipped {
            let left = (previous.left as f64 + gradient * step as f64).round() as i32;
            self.push_row(RowSpan::new(left.min(previous.right), previous.right));
        }
    }

    fn push_row(&mut self, span: RowSpan) {
        if self.rows.is_empty() {
            self.min_left = span.left;
            self.max_right = span.right;
        } else {
            self.min_left = self.min_left.min(span.left);
            self.max_right = self.max_right.max(span.right);
        }
        self.rows.push(span);
    }

    /// Replaces this blob's rows with the union of itself and `other`.
    /// Used by the merger once it has decided the two belong together.
    pub(crate) fn absorb(&mut self, other: &Blob) {
        let top = self.top.min(other.top);
        let bottom = self.bottom.max(other.bottom);
        let mut rows = Vec::with_capacity((bottom - top + 1) as usize);
        let mut overlap = 0u32;

        for y in top..=bottom {
            let span = match (self.row(y), other.row(y)) {
                (Some(a), Some(b)) => {
                    overlap += a.overlap(b);
                    a.union(b)
                }
                (Some(a), None) => *a,
                (None, Some(b)) => *b,
                (None, None) => {
                    debug_assert!(false, "merged blobs leave row {y} uncovered");
                    continue;
                }
            };
            rows.push(span);
        }

        let combined = (self.num_points + other.num_points).saturating_sub(overlap);
        self.num_points = combined.max(self.num_points.max(other.num_points));
        self.top = top;
        self.bottom = bottom;
        self.min_left = self.min_left.min(other.min_left);
        self.max_right = self.max_right.max(other.max_right);
        self.merges += other.merges + 1;
        self.rows = rows;
    }
}

/// Kept index range `[round((n-1)(1-f)), round((n-1)f)]` for n sorted pixels.
pub fn trimmed_range(num_coords: usize, boundary_fraction: f64) -> (usize, usize) {
    let last = (num_coords - 1) as f64;
    let lower = (last * (1.0 - boundary_fraction)).round() as usize;
    let upper = (last * boundary_fraction).round() as usize;
    (lower.min(upper), upper.max(lower))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_row(blob: &mut Blob, y: i32, xs: &[i32], f: f64) {
        for &x in xs {
            blob.add(x, y, f);
        }
    }

    #[test]
    fn trim_keeps_the_interior_percentile() {
        assert_eq!(trimmed_range(5, 0.8), (1, 3));
        assert_eq!(trimmed_range(5, 1.0), (0, 4));
        assert_eq!(trimmed_range(1, 0.8), (0, 0));
    }

    #[test]
    fn trimmed_row_excludes_both_outliers() {
        let mut blob = Blob::new(5, 0, 5);
        scan_row(&mut blob, 0, &[6, 7, 8, 50], 0.8);
        blob.close(0.8);
        assert_eq!(blob.rows(), &[RowSpan::new(6, 8)]);
        assert_eq!(blob.num_points(), 3);
    }

    #[test]
    fn rows_stay_contiguous_across_gaps() {
        let f = 1.0;
        let mut blob = Blob::new(10, 0, 5);
        scan_row(&mut blob, 0, &[11, 12, 13, 14], f);
        // two skipped rows, then a row starting four columns to the right
        scan_row(&mut blob, 3, &[14, 15, 16], f);
        blob.close(f);

        assert_eq!(blob.top(), 0);
        assert_eq!(blob.bottom(), 3);
        assert_eq!(blob.rows().len(), 4);
        assert_eq!(blob.rows()[0], RowSpan::new(10, 14));
        // left interpolated 10 -> 14 over three steps, right held at 14
        assert_eq!(blob.rows()[1], RowSpan::new(11, 14));
        assert_eq!(blob.rows()[2], RowSpan::new(13, 14));
        assert_eq!(blob.rows()[3], RowSpan::new(14, 16));
        // gap rows contribute no points
        assert_eq!(blob.num_points(), 8);
        for row in blob.rows() {
            assert!(row.left <= row.right);
        }
    }

    #[test]
    fn gap_tests_follow_the_diagonal_rule() {
        let mut blob = Blob::new(10, 0, 5);
        scan_row(&mut blob, 0, &[11, 12], 1.0);
        // directly below and within the horizontal tolerance
        assert!(blob.accepts(15, 1, 3, 4));
        assert!(!blob.accepts(16, 1, 3, 4));
        // three rows down, horizontal gap may not exceed the vertical gap
        assert!(blob.accepts(14, 3, 5, 4));
        assert!(!blob.accepts(16, 3, 5, 4));
        // beyond the vertical tolerance
        assert!(!blob.accepts(11, 5, 5, 4));
    }

    #[test]
    fn spans_overlap_and_union() {
        let a = RowSpan::new(0, 10);
        let b = RowSpan::new(8, 20);
        let c = RowSpan::new(2, 4);
        assert!(a.intersects(&b));
        assert_eq!(a.overlap(&b), 3);
        assert_eq!(a.union(&b), RowSpan::new(0, 20));
        assert!(a.intersects(&c));
        assert_eq!(a.overlap(&c), 3);
        assert!(!b.intersects(&c));
        assert_eq!(b.overlap(&c), 0);
    }

    #[test]
    fn reset_recycles_the_record() {
        let mut blob = Blob::new(3, 3, 5);
        scan_row(&mut blob, 4, &[3, 4, 5], 1.0);
        blob.close(1.0);
        blob.id = Some(7);

        blob.reset(20, 9, 2);
        blob.close(1.0);
        assert_eq!(blob.top(), 9);
        assert_eq!(blob.rows(), &[RowSpan::new(20, 20)]);
        assert_eq!(blob.num_points(), 1);
        assert_eq!(blob.id(), None);
        assert_eq!(blob.ttl(), 2);
    }
}
