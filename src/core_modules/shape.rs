// THEORY:
// The `ShapeAnalyzer` reduces a finalized blob's row spans to the two things a
// consumer draws: a centroid and a convex hull. Both are reported in display
// orientation, which by default is the mirror image of the camera frame
// (x' = width - 1 - x) so that a user sees themselves as in a mirror.
//
// Centroid:
//   y = top + Σ (i + 1)·wᵢ / Σ wᵢ   (area weighted, wᵢ = row width)
//   x = mean of the row midpoints  (not weighted by row width)
// The x and y rules are deliberately not symmetric; see DESIGN.md.
//
// Hull:
// Each row contributes its two boundary points (one when the row is a single
// column). Emitted top to bottom and, within a row, left to right in display
// space, the points are already sorted by (y, x), so the monotone chain runs
// without a sorting pass.

use crate::core_modules::blob::{Blob, Point, RowSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeAnalyzer {
    frame_width: u32,
    mirror: bool,
}

impl ShapeAnalyzer {
    pub fn new(frame_width: u32, mirror: bool) -> Self {
        Self { frame_width, mirror }
    }

    fn display_x(&self, x: f64) -> f64 {
        if self.mirror {
            (self.frame_width as f64 - 1.0) - x
        } else {
            x
        }
    }

    /// Fills in the blob's centroid and hull.
    pub fn analyze(&self, blob: &mut Blob) {
        let (x, y) = centroid(blob.top(), blob.rows());
        blob.centroid = (self.display_x(x), y);

        let mut points = std::mem::take(&mut blob.hull);
        self.boundary_points(blob.top(), blob.rows(), &mut points);
        convex_hull_presorted(&mut points);
        blob.hull = points;
    }

    /// Per-row boundary points in display space, ordered by (y, x).
    pub fn boundary_points(&self, top: i32, rows: &[RowSpan], points: &mut Vec<Point>) {
        points.clear();
        for (offset, row) in rows.iter().enumerate() {
            let y = top + offset as i32;
            let a = self.display_x(row.left as f64) as i32;
            let b = self.display_x(row.right as f64) as i32;
            let (first, second) = if a <= b { (a, b) } else { (b, a) };
            points.push(Point::new(first, y));
            if second != first {
                points.push(Point::new(second, y));
            }
        }
    }
}

/// Centroid in frame coordinates. Returns `(0, 0)` for a blob without rows.
pub fn centroid(top: i32, rows: &[RowSpan]) -> (f64, f64) {
    if rows.is_empty() {
        return (0.0, 0.0);
    }
    let mut midpoints = 0.0;
    let mut weighted_rows = 0.0;
    let mut area = 0.0;
    for (index, row) in rows.iter().enumerate() {
        let width = row.width() as f64;
        midpoints += row.midpoint();
        weighted_rows += (index + 1) as f64 * width;
        area += width;
    }
    let x = midpoints / rows.len() as f64;
    let y = top as f64 + weighted_rows / area;
    (x, y)
}

fn cross(origin: Point, a: Point, b: Point) -> i64 {
    let (ox, oy) = (origin.x as i64, origin.y as i64);
    (a.x as i64 - ox) * (b.y as i64 - oy) - (a.y as i64 - oy) * (b.x as i64 - ox)
}

/// Replaces `points`, which must be sorted by (y, x), with their convex hull.
/// Collinear points are dropped.
pub fn convex_hull_presorted(points: &mut Vec<Point>) {
    debug_assert!(
        points.windows(2).all(|pair| (pair[0].y, pair[0].x) < (pair[1].y, pair[1].x)),
        "hull input is not sorted by (y, x)"
    );
    if points.len() < 3 {
        return;
    }

    let mut hull: Vec<Point> = Vec::with_capacity(points.len() + 1);
    // --- 1. One Chain, Forward ---
    for &point in points.iter() {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], point) <= 0 {
            hull.pop();
        }
        hull.push(point);
    }
    // --- 2. The Other Chain, Backward ---
    let first_chain = hull.len() + 1;
    for &point in points.iter().rev().skip(1) {
        while hull.len() >= first_chain && cross(hull[hull.len() - 2], hull[hull.len() - 1], point) <= 0 {
            hull.pop();
        }
        hull.push(point);
    }
    // the last point repeats the first
    hull.pop();
    *points = hull;
}
