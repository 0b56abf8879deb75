//! Planar geometry primitives shared by the NFP engine, the GA and the placement evaluator.
//!
//! Polygons are plain `[Point]` loops without a repeated closing vertex. Signed area follows
//! the outer-loop convention used across the crate: a loop listed counter-clockwise in a y-up
//! frame has *negative* area, holes carry positive area.

use geo::{ConvexHull, Coord, LineString, Polygon as GeoPolygon};
use std::ops::{Add, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default absolute tolerance for coordinate comparisons.
pub const TOL: f64 = 1e-9;

/// A 2D point or translation vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Point {
    /// Creates a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// True when both coordinates agree within `tolerance`.
    pub fn almost_eq(self, other: Point, tolerance: f64) -> bool {
        almost_equal(self.x, other.x, tolerance) && almost_equal(self.y, other.y, tolerance)
    }
}

impl Add for Point {
    type Output = Point;

    #[inline]
    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Point {
    type Output = Point;

    #[inline]
    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

impl Neg for Point {
    type Output = Point;

    #[inline]
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned bounding box of a loop.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    /// Minimum x.
    pub x: f64,
    /// Minimum y.
    pub y: f64,
    /// Extent along x.
    pub width: f64,
    /// Extent along y.
    pub height: f64,
}

impl Bounds {
    /// Maximum x.
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    /// Maximum y.
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// True when the two boxes overlap or touch within `tolerance`.
    pub fn intersects(&self, other: &Bounds, tolerance: f64) -> bool {
        self.x <= other.max_x() + tolerance
            && other.x <= self.max_x() + tolerance
            && self.y <= other.max_y() + tolerance
            && other.y <= self.max_y() + tolerance
    }
}

/// Tri-state result of a point-in-polygon query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Strictly inside.
    Inside,
    /// Strictly outside.
    Outside,
    /// On an edge or vertex (within tolerance).
    OnBoundary,
}

impl Containment {
    /// Inside or on the boundary.
    pub fn is_inside_or_on(self) -> bool {
        !matches!(self, Containment::Outside)
    }
}

/// Returns true if `a` and `b` differ by less than `tolerance`.
#[inline]
pub fn almost_equal(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() < tolerance
}

/// Signed area of a loop; negative for outer-loop winding.
pub fn polygon_area(polygon: &[Point]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    let mut j = n - 1;
    for i in 0..n {
        area += (polygon[j].x + polygon[i].x) * (polygon[j].y - polygon[i].y);
        j = i;
    }
    0.5 * area
}

/// Bounding box of a loop, `None` when empty.
pub fn polygon_bounds(polygon: &[Point]) -> Option<Bounds> {
    let first = polygon.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &polygon[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Bounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

/// Rotates a loop about the origin by `degrees`.
///
/// Sine and cosine values within 1e-12 of zero are snapped, so quarter turns stay exact.
pub fn rotate_polygon(polygon: &[Point], degrees: f64) -> Vec<Point> {
    if degrees == 0.0 {
        return polygon.to_vec();
    }
    let angle = degrees.to_radians();
    let snap = |v: f64| if v.abs() < 1e-12 { 0.0 } else { v };
    let (sin, cos) = (snap(angle.sin()), snap(angle.cos()));
    polygon
        .iter()
        .map(|p| Point::new(p.x * cos - p.y * sin, p.x * sin + p.y * cos))
        .collect()
}

/// Translates a loop by `offset`.
pub fn translate_polygon(polygon: &[Point], offset: Point) -> Vec<Point> {
    polygon.iter().map(|&p| p + offset).collect()
}

/// Returns the loop with outer-loop (negative area) winding.
pub fn with_outer_winding(mut polygon: Vec<Point>) -> Vec<Point> {
    if polygon_area(&polygon) > 0.0 {
        polygon.reverse();
    }
    polygon
}

/// Returns the loop with hole (positive area) winding.
pub fn with_hole_winding(mut polygon: Vec<Point>) -> Vec<Point> {
    if polygon_area(&polygon) < 0.0 {
        polygon.reverse();
    }
    polygon
}

/// Distance from `p` to the segment `a`-`b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

/// True when `p` lies on segment `a`-`b` strictly between its endpoints.
pub fn on_segment(a: Point, b: Point, p: Point) -> bool {
    // vertical line
    if almost_equal(a.x, b.x, TOL) && almost_equal(p.x, a.x, TOL) {
        return !almost_equal(p.y, b.y, TOL)
            && !almost_equal(p.y, a.y, TOL)
            && p.y < b.y.max(a.y)
            && p.y > b.y.min(a.y);
    }
    // horizontal line
    if almost_equal(a.y, b.y, TOL) && almost_equal(p.y, a.y, TOL) {
        return !almost_equal(p.x, b.x, TOL)
            && !almost_equal(p.x, a.x, TOL)
            && p.x < b.x.max(a.x)
            && p.x > b.x.min(a.x);
    }
    // range check
    if (p.x < a.x && p.x < b.x)
        || (p.x > a.x && p.x > b.x)
        || (p.y < a.y && p.y < b.y)
        || (p.y > a.y && p.y > b.y)
    {
        return false;
    }
    // exclude end points
    if p.almost_eq(a, TOL) || p.almost_eq(b, TOL) {
        return false;
    }
    let cross = (p.y - a.y) * (b.x - a.x) - (p.x - a.x) * (b.y - a.y);
    if cross.abs() > TOL {
        return false;
    }
    let dot = (p.x - a.x) * (b.x - a.x) + (p.y - a.y) * (b.y - a.y);
    if dot < 0.0 || almost_equal(dot, 0.0, TOL) {
        return false;
    }
    let len2 = (b.x - a.x) * (b.x - a.x) + (b.y - a.y) * (b.y - a.y);
    !(dot > len2 || almost_equal(dot, len2, TOL))
}

/// Tri-state point-in-polygon test with the default tolerance.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> Containment {
    point_in_polygon_with_tolerance(point, polygon, TOL)
}

/// Tri-state point-in-polygon test; points within `tolerance` of an edge are on the boundary.
///
/// Degenerate loops (segments, points) have no interior: a query is either on them or outside.
pub fn point_in_polygon_with_tolerance(
    point: Point,
    polygon: &[Point],
    tolerance: f64,
) -> Containment {
    let n = polygon.len();
    if n == 0 {
        return Containment::Outside;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if distance_to_segment(point, pj, pi) <= tolerance {
            return Containment::OnBoundary;
        }
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    if inside {
        Containment::Inside
    } else {
        Containment::Outside
    }
}

/// Intersection point of segments `a1`-`a2` and `b1`-`b2`, endpoints included.
///
/// Parallel and collinear pairs yield `None`; their shared points are already loop vertices
/// wherever the caller needs them.
pub fn segment_intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<Point> {
    let r = a2 - a1;
    let s = b2 - b1;
    let denom = r.x * s.y - r.y * s.x;
    if denom.abs() < 1e-12 {
        return None;
    }
    let q = b1 - a1;
    let t = (q.x * s.y - q.y * s.x) / denom;
    let u = (q.x * r.y - q.y * r.x) / denom;
    let eps = 1e-12;
    if t < -eps || t > 1.0 + eps || u < -eps || u > 1.0 + eps {
        return None;
    }
    Some(Point::new(a1.x + t * r.x, a1.y + t * r.y))
}

/// True when every vertex lies on the loop's bounding box within `tolerance`.
pub fn is_rectangle(polygon: &[Point], tolerance: f64) -> bool {
    let Some(bb) = polygon_bounds(polygon) else {
        return false;
    };
    if polygon.len() < 4 {
        return false;
    }
    polygon.iter().all(|p| {
        (almost_equal(p.x, bb.x, tolerance) || almost_equal(p.x, bb.max_x(), tolerance))
            && (almost_equal(p.y, bb.y, tolerance) || almost_equal(p.y, bb.max_y(), tolerance))
    })
}

/// True when all turns of the loop have the same orientation.
pub fn is_convex(polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut sign = 0i32;
    for i in 0..n {
        let p1 = polygon[i];
        let p2 = polygon[(i + 1) % n];
        let p3 = polygon[(i + 2) % n];

        let cross = (p2.x - p1.x) * (p3.y - p2.y) - (p2.y - p1.y) * (p3.x - p2.x);

        if cross.abs() > 1e-10 {
            let current_sign = if cross > 0.0 { 1 } else { -1 };
            if sign == 0 {
                sign = current_sign;
            } else if sign != current_sign {
                return false;
            }
        }
    }

    true
}

/// Convex hull of a point set, counter-clockwise in a y-up frame, without closing vertex.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let line = LineString::from(
        points
            .iter()
            .map(|p| Coord { x: p.x, y: p.y })
            .collect::<Vec<_>>(),
    );
    let hull: GeoPolygon<f64> = line.convex_hull();
    let mut result: Vec<Point> = hull
        .exterior()
        .points()
        .map(|p| Point::new(p.x(), p.y()))
        .collect();
    if result.len() > 1 && result.first() == result.last() {
        result.pop();
    }
    result
}

/// Removes consecutive duplicate vertices and a repeated closing vertex.
pub fn dedup_vertices(polygon: &[Point], tolerance: f64) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(polygon.len());
    for &p in polygon {
        if out.last().map_or(true, |last| !last.almost_eq(p, tolerance)) {
            out.push(p);
        }
    }
    while out.len() > 1 {
        match (out.first(), out.last()) {
            (Some(first), Some(last)) if first.almost_eq(*last, tolerance) => {
                out.pop();
            }
            _ => break,
        }
    }
    out
}

// ============================================================================
// Shape constructors
// ============================================================================

/// Axis-aligned rectangle with its minimum corner at the origin.
pub fn rectangle(width: f64, height: f64) -> Vec<Point> {
    vec![
        Point::new(0.0, 0.0),
        Point::new(width, 0.0),
        Point::new(width, height),
        Point::new(0.0, height),
    ]
}

/// Regular `n`-gon approximating a circle of `radius` around `center`.
pub fn circle(center: Point, radius: f64, n: usize) -> Vec<Point> {
    let n = n.max(8);
    let step = std::f64::consts::TAU / n as f64;
    (0..n)
        .map(|i| {
            let angle = i as f64 * step;
            Point::new(
                center.x + radius * angle.cos(),
                center.y + radius * angle.sin(),
            )
        })
        .collect()
}

/// L-shaped loop: a `width` x `height` box with the upper-right notch removed.
pub fn l_shape(width: f64, height: f64, notch_width: f64, notch_height: f64) -> Vec<Point> {
    vec![
        Point::new(0.0, 0.0),
        Point::new(width, 0.0),
        Point::new(width, notch_height),
        Point::new(notch_width, notch_height),
        Point::new(notch_width, height),
        Point::new(0.0, height),
    ]
}
