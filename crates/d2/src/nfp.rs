//! No-Fit Polygon (NFP) computation.
//!
//! For a fixed polygon A and a moving polygon B, NFP coordinates are translations of B's local
//! origin: a part placed at `(x, y)` occupies `rotate(B) + (x, y)`.
//!
//! - **Outside NFP**: translations at which B overlaps A, i.e. the Minkowski sum A ⊕ (−B).
//!   Convex pairs use an O(n+m) edge merge; everything else is decomposed into convex pieces
//!   whose pairwise sums are unioned with `i_overlay`.
//! - **Inside NFP** (inner-fit polygon): translations keeping B inside A. Rectangular containers
//!   have a closed form; other containers are eroded by the Minkowski sum of their edges with
//!   the triangles of −B.

use crate::clipper::{self, Shape};
use crate::nfp_cache::NfpKey;
use polynest_core::geometry::{
    convex_hull, is_convex, is_rectangle, point_in_polygon, polygon_area, polygon_bounds,
    rotate_polygon, with_hole_winding, with_outer_winding, Containment, Point,
};
use polynest_core::{Error, Result};
use rayon::prelude::*;
use std::f64::consts::PI;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tolerance for treating a container as an axis-aligned rectangle.
pub const RECTANGLE_TOLERANCE: f64 = 0.001;

/// NFP computation result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Nfp {
    /// Loop 0 is the primary region; later loops are holes of it or secondary regions.
    pub loops: Vec<Vec<Point>>,
}

impl Nfp {
    /// Creates a new empty NFP.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an NFP with a single loop.
    pub fn from_loop(polygon: Vec<Point>) -> Self {
        Self {
            loops: vec![polygon],
        }
    }

    /// Creates an NFP with multiple loops.
    pub fn from_loops(loops: Vec<Vec<Point>>) -> Self {
        Self { loops }
    }

    /// Returns true if the NFP has no loops.
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The loops shifted by `offset`.
    pub fn translated(&self, offset: Point) -> Vec<Vec<Point>> {
        self.loops
            .iter()
            .map(|l| l.iter().map(|&p| p + offset).collect())
            .collect()
    }
}

/// Self-contained input for one NFP computation.
///
/// Polygons are unrotated; the rotations come from the key.
#[derive(Debug, Clone)]
pub struct NfpJob {
    /// Cache key this job answers.
    pub key: NfpKey,
    /// Fixed polygon (bin or placed part).
    pub a: Vec<Point>,
    /// Holes of the fixed polygon, only consulted with `use_holes`.
    pub a_holes: Vec<Vec<Point>>,
    /// Moving part.
    pub b: Vec<Point>,
    /// Keep concave pockets and secondary regions.
    pub explore_concave: bool,
    /// Append inside NFPs of B in A's holes.
    pub use_holes: bool,
}

/// Computes the NFP for one job.
///
/// `Ok(None)` means the pair has no usable NFP (B cannot fit, or the result failed a sanity
/// check); the caller stores that as a "no NFP" entry.
pub fn compute_job(job: &NfpJob) -> Result<Option<Nfp>> {
    if job.a.len() < 3 || job.b.len() < 3 {
        return Err(Error::InvalidGeometry(format!(
            "NFP operands need at least 3 vertices ({:?})",
            job.key
        )));
    }

    let a = rotate_polygon(&job.a, job.key.rotation_a);
    let b = rotate_polygon(&job.b, job.key.rotation_b);
    if a.iter().chain(&b).any(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(Error::NfpError(format!(
            "non-finite coordinates after rotation ({:?})",
            job.key
        )));
    }

    if job.key.inside {
        let loops = inner_fit_loops(&a, &b, job.explore_concave);
        if loops.is_empty() {
            log::warn!("inside NFP is empty for {:?}", job.key);
            return Ok(None);
        }
        return Ok(Some(Nfp::from_loops(loops)));
    }

    let mut loops = minkowski_difference(&a, &b, job.explore_concave);
    let Some(first) = loops.first() else {
        log::warn!("outside NFP is empty for {:?}", job.key);
        return Ok(None);
    };

    // The sum can never be smaller than A itself.
    if polygon_area(first).abs() < polygon_area(&a).abs() {
        log::warn!(
            "outside NFP area {} smaller than fixed polygon area {} for {:?}",
            polygon_area(first).abs(),
            polygon_area(&a).abs(),
            job.key
        );
        return Ok(None);
    }

    normalize_outside_loops(&mut loops);

    if job.use_holes && !job.a_holes.is_empty() {
        if let Some(b_bounds) = polygon_bounds(&b) {
            for hole in &job.a_holes {
                let hole = rotate_polygon(hole, job.key.rotation_a);
                let fits = polygon_bounds(&hole).is_some_and(|hb| {
                    hb.width > b_bounds.width && hb.height > b_bounds.height
                });
                if fits {
                    loops.extend(inner_fit_loops(&hole, &b, job.explore_concave));
                }
            }
        }
    }

    Ok(Some(Nfp::from_loops(loops)))
}

/// Runs every job through `compute` (normally [`compute_job`]) on the current rayon pool.
///
/// Failures and panics are isolated per job and reported as "no NFP". `completed` is bumped
/// as each job finishes.
pub fn compute_batch<F>(
    jobs: Vec<NfpJob>,
    completed: &AtomicUsize,
    compute: F,
) -> Vec<(NfpKey, Option<Nfp>)>
where
    F: Fn(&NfpJob) -> Result<Option<Nfp>> + Sync,
{
    jobs.into_par_iter()
        .map(|job| {
            let key = job.key;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| compute(&job)));
            completed.fetch_add(1, Ordering::Relaxed);
            let nfp = match outcome {
                Ok(Ok(nfp)) => nfp,
                Ok(Err(e)) => {
                    log::error!("NFP computation failed for {:?}: {}", key, e);
                    None
                }
                Err(_) => {
                    log::error!("NFP computation panicked for {:?}", key);
                    None
                }
            };
            (key, nfp)
        })
        .collect()
}

/// Inside-NFP loops of `b` in container `a`, both already rotated, in hole winding.
pub fn inner_fit_loops(a: &[Point], b: &[Point], explore_concave: bool) -> Vec<Vec<Point>> {
    if a.len() < 3 || b.len() < 3 {
        return Vec::new();
    }
    let loops = if is_rectangle(a, RECTANGLE_TOLERANCE) {
        no_fit_polygon_rectangle(a, b).into_iter().collect()
    } else {
        inner_fit_general(a, b, explore_concave)
    };
    loops.into_iter().map(with_hole_winding).collect()
}

/// Closed-form inside NFP of `b` in the bounding box of `a`.
///
/// Returns `None` when `b` is wider or taller than `a`. Exact fits give a degenerate segment
/// or point.
pub fn no_fit_polygon_rectangle(a: &[Point], b: &[Point]) -> Option<Vec<Point>> {
    let ab = polygon_bounds(a)?;
    let bb = polygon_bounds(b)?;
    if bb.width > ab.width || bb.height > ab.height {
        return None;
    }

    let min_x = ab.x - bb.x;
    let max_x = ab.max_x() - bb.max_x();
    let min_y = ab.y - bb.y;
    let max_y = ab.max_y() - bb.max_y();
    Some(vec![
        Point::new(min_x, min_y),
        Point::new(max_x, min_y),
        Point::new(max_x, max_y),
        Point::new(min_x, max_y),
    ])
}

/// Erosion of `a` by `b`: positions of B's first vertex inside A, minus every translation at
/// which B meets A's boundary.
fn inner_fit_general(a: &[Point], b: &[Point], explore_concave: bool) -> Vec<Vec<Point>> {
    let reference = b[0];
    let region: Vec<Point> = a.iter().map(|&p| p - reference).collect();

    let pieces = triangulate(b);
    let n = a.len();
    let mut band: Vec<Vec<Point>> = Vec::with_capacity(n * pieces.len());
    for i in 0..n {
        let (p, q) = (a[i], a[(i + 1) % n]);
        for piece in &pieces {
            let swept: Vec<Point> = piece.iter().flat_map(|&v| [p - v, q - v]).collect();
            let hull = convex_hull(&swept);
            if hull.len() >= 3 {
                band.push(hull);
            }
        }
    }

    let shapes = clipper::difference(&[region], &band);
    select_regions(shapes, explore_concave)
}

fn select_regions(shapes: Vec<Shape>, explore_concave: bool) -> Vec<Vec<Point>> {
    if explore_concave {
        shapes.into_iter().flatten().collect()
    } else {
        clipper::largest_shape(shapes).unwrap_or_default()
    }
}

/// Loops of A ⊕ (−B): the outer loop first, followed by interior pockets when
/// `explore_concave` is set.
pub fn minkowski_difference(a: &[Point], b: &[Point], explore_concave: bool) -> Vec<Vec<Point>> {
    let reflected: Vec<Point> = b.iter().map(|&p| -p).collect();

    if is_convex(a) && is_convex(&reflected) {
        let sum = minkowski_sum_convex(a, &reflected);
        return if sum.len() >= 3 { vec![sum] } else { Vec::new() };
    }

    let pieces_a = triangulate(a);
    let pieces_b = triangulate(&reflected);
    let mut partial: Vec<Vec<Point>> = Vec::with_capacity(pieces_a.len() * pieces_b.len());
    for piece_a in &pieces_a {
        for piece_b in &pieces_b {
            let sum = minkowski_sum_convex(piece_a, piece_b);
            if sum.len() >= 3 {
                partial.push(sum);
            }
        }
    }

    let Some(shape) = clipper::largest_shape(clipper::union_all(&partial)) else {
        return Vec::new();
    };
    if explore_concave {
        shape
    } else {
        shape.into_iter().take(1).collect()
    }
}

/// Loop 0 gets outer winding; loops starting inside it are holes, the rest outer regions.
fn normalize_outside_loops(loops: &mut [Vec<Point>]) {
    let Some((first, rest)) = loops.split_first_mut() else {
        return;
    };
    *first = with_outer_winding(std::mem::take(first));
    for l in rest.iter_mut() {
        let is_hole = l
            .first()
            .is_some_and(|&p| point_in_polygon(p, first) == Containment::Inside);
        let taken = std::mem::take(l);
        *l = if is_hole {
            with_hole_winding(taken)
        } else {
            with_outer_winding(taken)
        };
    }
}

/// Minkowski sum of two convex polygons by merging edge vectors sorted by angle.
fn minkowski_sum_convex(poly_a: &[Point], poly_b: &[Point]) -> Vec<Point> {
    let a = with_outer_winding(drop_collinear(poly_a));
    let b = with_outer_winding(drop_collinear(poly_b));
    if a.len() < 3 || b.len() < 3 {
        return Vec::new();
    }

    let edges_a = edge_vectors(&a);
    let edges_b = edge_vectors(&b);
    let start_a = bottom_left_vertex(&a);
    let start_b = bottom_left_vertex(&b);

    let mut result = Vec::with_capacity(a.len() + b.len());
    let mut current = a[start_a] + b[start_b];
    result.push(current);
    for edge in merge_edge_vectors(&edges_a, start_a, &edges_b, start_b) {
        current = current + edge;
        result.push(current);
    }

    if result.len() > 1 {
        let (first, last) = (result[0], result[result.len() - 1]);
        if first.almost_eq(last, 1e-10) {
            result.pop();
        }
    }
    result
}

/// Ear-clipping triangulation; convex inputs are returned whole.
pub fn triangulate(polygon: &[Point]) -> Vec<Vec<Point>> {
    let cleaned = drop_collinear(polygon);
    if cleaned.len() < 3 {
        return Vec::new();
    }
    if is_convex(&cleaned) {
        return vec![cleaned];
    }

    let mut vertices = with_outer_winding(cleaned);
    let mut triangles = Vec::with_capacity(vertices.len());

    while vertices.len() > 3 {
        let n = vertices.len();
        let ear = (0..n).find(|&i| is_ear(&vertices, (i + n - 1) % n, i, (i + 1) % n));
        let Some(i) = ear else {
            // degenerate input, fall back to the hull
            log::debug!("ear clipping stalled with {} vertices", n);
            return vec![convex_hull(polygon)];
        };
        triangles.push(vec![
            vertices[(i + n - 1) % n],
            vertices[i],
            vertices[(i + 1) % n],
        ]);
        vertices.remove(i);
    }

    if vertices.len() == 3 && polygon_area(&vertices).abs() > 1e-12 {
        triangles.push(vertices);
    }
    triangles
}

fn is_ear(vertices: &[Point], prev: usize, curr: usize, next: usize) -> bool {
    let (a, b, c) = (vertices[prev], vertices[curr], vertices[next]);

    // convex vertex (left turn in a counter-clockwise loop)
    let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
    if cross <= 0.0 {
        return false;
    }

    !vertices.iter().enumerate().any(|(i, &p)| {
        i != prev && i != curr && i != next && point_in_triangle(p, a, b, c)
    })
}

fn point_in_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;

    let dot00 = v0.x * v0.x + v0.y * v0.y;
    let dot01 = v0.x * v1.x + v0.y * v1.y;
    let dot02 = v0.x * v2.x + v0.y * v2.y;
    let dot11 = v1.x * v1.x + v1.y * v1.y;
    let dot12 = v1.x * v2.x + v1.y * v2.y;

    let inv_denom = 1.0 / (dot00 * dot11 - dot01 * dot01);
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

    u > 1e-10 && v > 1e-10 && (u + v) < 1.0 - 1e-10
}

// ============================================================================
// Helper functions
// ============================================================================

/// Removes repeated and collinear vertices.
fn drop_collinear(polygon: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = polygon.to_vec();
    let mut i = 0;
    while out.len() >= 3 && i < out.len() {
        let n = out.len();
        let (a, b, c) = (out[(i + n - 1) % n], out[i], out[(i + 1) % n]);
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        let scale = (b - a).x.abs() + (b - a).y.abs() + (c - b).x.abs() + (c - b).y.abs();
        if b.almost_eq(a, 1e-12) || cross.abs() <= 1e-12 * scale.max(1.0) * scale {
            out.remove(i);
            i = i.saturating_sub(1);
        } else {
            i += 1;
        }
    }
    out
}

fn edge_vectors(polygon: &[Point]) -> Vec<Point> {
    let n = polygon.len();
    (0..n).map(|i| polygon[(i + 1) % n] - polygon[i]).collect()
}

/// Index of the bottom-most (then left-most) vertex.
fn bottom_left_vertex(polygon: &[Point]) -> usize {
    let mut min_idx = 0;
    for (i, p) in polygon.iter().enumerate() {
        let min = polygon[min_idx];
        if p.y < min.y || (p.y == min.y && p.x < min.x) {
            min_idx = i;
        }
    }
    min_idx
}

/// Angle of an edge vector in `[0, 2π)`.
fn edge_angle(edge: Point) -> f64 {
    let angle = edge.y.atan2(edge.x);
    if angle < 0.0 {
        angle + 2.0 * PI
    } else {
        angle
    }
}

fn merge_edge_vectors(
    edges_a: &[Point],
    start_a: usize,
    edges_b: &[Point],
    start_b: usize,
) -> Vec<Point> {
    let (n_a, n_b) = (edges_a.len(), edges_b.len());
    let mut result = Vec::with_capacity(n_a + n_b);
    let (mut i_a, mut i_b) = (0, 0);

    while i_a < n_a || i_b < n_b {
        if i_a >= n_a {
            result.push(edges_b[(start_b + i_b) % n_b]);
            i_b += 1;
        } else if i_b >= n_b {
            result.push(edges_a[(start_a + i_a) % n_a]);
            i_a += 1;
        } else {
            let edge_a = edges_a[(start_a + i_a) % n_a];
            let edge_b = edges_b[(start_b + i_b) % n_b];
            let angle_a = edge_angle(edge_a);
            let angle_b = edge_angle(edge_b);

            if angle_a <= angle_b + 1e-10 {
                result.push(edge_a);
                i_a += 1;
            }
            if angle_b <= angle_a + 1e-10 {
                result.push(edge_b);
                i_b += 1;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfp_cache::NfpOperand;
    use approx::assert_relative_eq;
    use polynest_core::geometry::{l_shape, rectangle, translate_polygon};

    fn key(inside: bool) -> NfpKey {
        NfpKey::new(NfpOperand::Part(0), 1, 0.0, 0.0, inside)
    }

    fn job(a: Vec<Point>, b: Vec<Point>, inside: bool) -> NfpJob {
        NfpJob {
            key: key(inside),
            a,
            a_holes: Vec::new(),
            b,
            explore_concave: false,
            use_holes: false,
        }
    }

    fn triangle() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(5.0, 10.0),
        ]
    }

    #[test]
    fn test_nfp_two_squares() {
        let nfp = compute_job(&job(rectangle(10.0, 10.0), rectangle(5.0, 5.0), false))
            .unwrap()
            .unwrap();
        assert_eq!(nfp.loops.len(), 1);
        let bb = polygon_bounds(&nfp.loops[0]).unwrap();
        assert_relative_eq!(bb.x, -5.0);
        assert_relative_eq!(bb.y, -5.0);
        assert_relative_eq!(bb.max_x(), 10.0);
        assert_relative_eq!(bb.max_y(), 10.0);
        assert_relative_eq!(polygon_area(&nfp.loops[0]), -225.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nfp_with_rotation() {
        let mut j = job(rectangle(10.0, 10.0), rectangle(4.0, 2.0), false);
        j.key.rotation_b = 90.0;
        let nfp = compute_job(&j).unwrap().unwrap();
        let bb = polygon_bounds(&nfp.loops[0]).unwrap();
        // rotated B spans x in [-2, 0], y in [0, 4]
        assert_relative_eq!(bb.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(bb.max_x(), 12.0, epsilon = 1e-9);
        assert_relative_eq!(bb.y, -4.0, epsilon = 1e-9);
        assert_relative_eq!(bb.max_y(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nfp_non_convex_l_shape() {
        let l = l_shape(20.0, 20.0, 10.0, 10.0);
        let nfp = compute_job(&job(l.clone(), rectangle(5.0, 5.0), false))
            .unwrap()
            .unwrap();
        assert_eq!(nfp.loops.len(), 1);
        assert!(polygon_area(&nfp.loops[0]) < 0.0);
        // L dilated by a 5x5 square
        assert_relative_eq!(
            polygon_area(&nfp.loops[0]).abs(),
            25.0 * 15.0 + 15.0 * 10.0,
            epsilon = 1e-6
        );
        // the notch corner region stays free
        let notch = Point::new(17.0, 17.0);
        assert_eq!(point_in_polygon(notch, &nfp.loops[0]), Containment::Outside);
    }

    #[test]
    fn test_inside_rectangle_fast_path() {
        let nfp = compute_job(&job(rectangle(10.0, 8.0), rectangle(3.0, 2.0), true))
            .unwrap()
            .unwrap();
        let bb = polygon_bounds(&nfp.loops[0]).unwrap();
        assert_relative_eq!(bb.x, 0.0);
        assert_relative_eq!(bb.y, 0.0);
        assert_relative_eq!(bb.max_x(), 7.0);
        assert_relative_eq!(bb.max_y(), 6.0);
        assert!(polygon_area(&nfp.loops[0]) > 0.0);
    }

    #[test]
    fn test_inside_exact_fit_is_degenerate() {
        let nfp = compute_job(&job(rectangle(10.0, 10.0), rectangle(5.0, 10.0), true))
            .unwrap()
            .unwrap();
        let bb = polygon_bounds(&nfp.loops[0]).unwrap();
        assert_relative_eq!(bb.width, 5.0);
        assert_relative_eq!(bb.height, 0.0);
    }

    #[test]
    fn test_inside_too_large_is_none() {
        let result = compute_job(&job(rectangle(10.0, 10.0), rectangle(11.0, 11.0), true)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_inside_general_container() {
        let l = l_shape(20.0, 20.0, 10.0, 10.0);
        let b = translate_polygon(&rectangle(4.0, 4.0), Point::new(1.0, 1.0));
        let nfp = compute_job(&job(l, b.clone(), true)).unwrap().unwrap();
        assert!(!nfp.is_empty());

        let inside = |t: Point| {
            nfp.loops
                .iter()
                .any(|l| point_in_polygon(t, l) != Containment::Outside)
        };
        // B's min corner sits at (1, 1); translations are relative to B's local origin
        assert!(inside(Point::new(2.0, 2.0)));
        assert!(inside(Point::new(12.0, 2.0)));
        assert!(inside(Point::new(2.0, 12.0)));
        assert!(!inside(Point::new(12.0, 12.0)));
        assert!(!inside(Point::new(17.0, 2.0)));
    }

    /// 20x20 cup around a 16x16 cavity, open through a 2-wide slot at the top.
    fn cup() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(20.0, 20.0),
            Point::new(11.0, 20.0),
            Point::new(11.0, 18.0),
            Point::new(18.0, 18.0),
            Point::new(18.0, 2.0),
            Point::new(2.0, 2.0),
            Point::new(2.0, 18.0),
            Point::new(9.0, 18.0),
            Point::new(9.0, 20.0),
            Point::new(0.0, 20.0),
        ]
    }

    /// A 10x10 and an 8x8 chamber joined by a 2-high corridor.
    fn dumbbell() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 4.0),
            Point::new(14.0, 4.0),
            Point::new(14.0, 1.0),
            Point::new(22.0, 1.0),
            Point::new(22.0, 9.0),
            Point::new(14.0, 9.0),
            Point::new(14.0, 6.0),
            Point::new(10.0, 6.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]
    }

    #[test]
    fn test_explore_concave_keeps_closed_pocket() {
        let mut j = job(cup(), rectangle(4.0, 4.0), false);
        j.explore_concave = true;
        let nfp = compute_job(&j).unwrap().unwrap();
        assert_eq!(nfp.loops.len(), 2);
        assert_relative_eq!(polygon_area(&nfp.loops[0]), -576.0, epsilon = 1e-3);
        assert_relative_eq!(polygon_area(&nfp.loops[1]), 144.0, epsilon = 1e-3);
        assert_eq!(point_in_polygon(Point::new(8.0, 8.0), &nfp.loops[1]), Containment::Inside);

        // the slot is too narrow for B, so without exploring the cavity is lost
        j.explore_concave = false;
        let nfp = compute_job(&j).unwrap().unwrap();
        assert_eq!(nfp.loops.len(), 1);
    }

    #[test]
    fn test_explore_concave_keeps_every_inside_region() {
        let mut j = job(dumbbell(), rectangle(4.0, 4.0), true);
        j.explore_concave = true;
        let nfp = compute_job(&j).unwrap().unwrap();
        assert_eq!(nfp.loops.len(), 2);
        let mut areas: Vec<f64> = nfp.loops.iter().map(|l| polygon_area(l)).collect();
        areas.sort_by(f64::total_cmp);
        assert_relative_eq!(areas[0], 16.0, epsilon = 1e-3);
        assert_relative_eq!(areas[1], 36.0, epsilon = 1e-3);

        j.explore_concave = false;
        let nfp = compute_job(&j).unwrap().unwrap();
        assert_eq!(nfp.loops.len(), 1);
        assert_relative_eq!(polygon_area(&nfp.loops[0]), 36.0, epsilon = 1e-3);
    }

    #[test]
    fn test_sanity_check_keeps_area() {
        let nfp = compute_job(&job(triangle(), rectangle(1.0, 1.0), false))
            .unwrap()
            .unwrap();
        assert!(polygon_area(&nfp.loops[0]).abs() >= polygon_area(&triangle()).abs());
    }

    #[test]
    fn test_use_holes_appends_inner_loops() {
        let frame = rectangle(30.0, 30.0);
        let hole = translate_polygon(&rectangle(20.0, 20.0), Point::new(5.0, 5.0));
        let mut j = job(frame, rectangle(4.0, 4.0), false);
        j.a_holes = vec![hole.clone()];
        j.use_holes = true;
        let nfp = compute_job(&j).unwrap().unwrap();
        assert_eq!(nfp.loops.len(), 2);
        assert!(polygon_area(&nfp.loops[0]) < 0.0);
        assert!(polygon_area(&nfp.loops[1]) > 0.0);
        let bb = polygon_bounds(&nfp.loops[1]).unwrap();
        assert_relative_eq!(bb.x, 5.0);
        assert_relative_eq!(bb.max_x(), 21.0);

        // a hole smaller than B is skipped
        j.b = rectangle(25.0, 4.0);
        let nfp = compute_job(&j).unwrap().unwrap();
        assert_eq!(nfp.loops.len(), 1);
    }

    #[test]
    fn test_batch_isolates_failures() {
        let jobs: Vec<NfpJob> = (0..8)
            .map(|i| {
                let mut j = job(rectangle(10.0, 10.0), rectangle(2.0, 2.0), false);
                j.key.b = i;
                j
            })
            .collect();
        let completed = AtomicUsize::new(0);
        let results = compute_batch(jobs, &completed, |job| {
            if job.key.b == 3 {
                panic!("boom");
            }
            if job.key.b == 5 {
                return Err(Error::NfpError("bad pair".into()));
            }
            compute_job(job)
        });
        assert_eq!(completed.load(Ordering::SeqCst), 8);
        assert_eq!(results.len(), 8);
        for (key, nfp) in results {
            assert_eq!(nfp.is_none(), key.b == 3 || key.b == 5);
        }
    }

    #[test]
    fn test_invalid_operands_error() {
        let j = job(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)], rectangle(1.0, 1.0), false);
        assert!(compute_job(&j).is_err());
    }

    #[test]
    fn test_non_finite_rotation_errors() {
        let mut j = job(rectangle(10.0, 10.0), rectangle(2.0, 2.0), false);
        j.key.rotation_b = f64::NAN;
        assert!(matches!(compute_job(&j), Err(Error::NfpError(_))));
    }

    #[test]
    fn test_triangulate_polygon_convex() {
        let tris = triangulate(&rectangle(10.0, 10.0));
        assert_eq!(tris.len(), 1);
    }

    #[test]
    fn test_triangulate_polygon_non_convex() {
        let l = l_shape(20.0, 20.0, 10.0, 10.0);
        let tris = triangulate(&l);
        assert_eq!(tris.len(), 4);
        let total: f64 = tris.iter().map(|t| polygon_area(t).abs()).sum();
        assert_relative_eq!(total, 300.0, epsilon = 1e-9);
    }

    #[test]
    fn test_edge_angle() {
        assert_relative_eq!(edge_angle(Point::new(1.0, 0.0)), 0.0, epsilon = 1e-10);
        assert_relative_eq!(edge_angle(Point::new(0.0, 1.0)), PI / 2.0, epsilon = 1e-10);
        assert_relative_eq!(edge_angle(Point::new(-1.0, 0.0)), PI, epsilon = 1e-10);
        assert_relative_eq!(edge_angle(Point::new(0.0, -1.0)), 3.0 * PI / 2.0, epsilon = 1e-10);
    }
}
