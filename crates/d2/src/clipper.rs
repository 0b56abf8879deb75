//! Polygon clipping adapters over `i_overlay`.
//!
//! Boolean operations return [`Shape`]s: the outer contour first, followed by its holes.
//! Contour winding of the output is not relied upon; callers re-normalize with
//! `with_outer_winding` / `with_hole_winding` from `polynest_core::geometry`.

use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use polynest_core::geometry::{
    dedup_vertices, distance_to_segment, is_rectangle, polygon_area, polygon_bounds,
    with_outer_winding, Point,
};

/// Outer contour followed by hole contours.
pub type Shape = Vec<Vec<Point>>;

fn to_contour(polygon: &[Point]) -> Vec<[f64; 2]> {
    polygon.iter().map(|&p| p.into()).collect()
}

fn from_shapes(shapes: Vec<Vec<Vec<[f64; 2]>>>) -> Vec<Shape> {
    shapes
        .into_iter()
        .map(|shape| {
            shape
                .into_iter()
                .filter(|contour| contour.len() >= 3)
                .map(|contour| contour.into_iter().map(Point::from).collect())
                .collect::<Shape>()
        })
        .filter(|shape: &Shape| !shape.is_empty())
        .collect()
}

/// Consistent outer winding so that `NonZero` filling means union.
fn oriented(polygons: &[Vec<Point>]) -> Vec<Vec<[f64; 2]>> {
    polygons
        .iter()
        .filter(|p| p.len() >= 3)
        .map(|p| to_contour(&with_outer_winding(p.clone())))
        .collect()
}

/// Union of all `polygons`.
pub fn union_all(polygons: &[Vec<Point>]) -> Vec<Shape> {
    let subject = oriented(polygons);
    if subject.is_empty() {
        return Vec::new();
    }
    let clip: Vec<Vec<[f64; 2]>> = Vec::new();
    from_shapes(subject.overlay(&clip, OverlayRule::Union, FillRule::NonZero))
}

/// Region covered by `subject` and not by `clip`.
pub fn difference(subject: &[Vec<Point>], clip: &[Vec<Point>]) -> Vec<Shape> {
    let subject = oriented(subject);
    if subject.is_empty() {
        return Vec::new();
    }
    let clip = oriented(clip);
    from_shapes(subject.overlay(&clip, OverlayRule::Difference, FillRule::NonZero))
}

/// Resolves self-intersections of a single loop.
pub fn simplify(polygon: &[Point]) -> Vec<Shape> {
    if polygon.len() < 3 {
        return Vec::new();
    }
    let subject = vec![to_contour(polygon)];
    let clip: Vec<Vec<[f64; 2]>> = Vec::new();
    from_shapes(subject.overlay(&clip, OverlayRule::Union, FillRule::NonZero))
}

/// The shape whose outer contour encloses the largest area.
pub fn largest_shape(shapes: Vec<Shape>) -> Option<Shape> {
    shapes.into_iter().max_by(|a, b| {
        let area_a = a.first().map_or(0.0, |c| polygon_area(c).abs());
        let area_b = b.first().map_or(0.0, |c| polygon_area(c).abs());
        area_a.total_cmp(&area_b)
    })
}

/// Snaps, de-duplicates, de-intersects and thins a raw loop.
///
/// Coordinates are rounded to the `1 / clipper_scale` grid. Vertices closer than
/// `curve_tolerance` to the chord of their neighbours are removed. Returns `None` when fewer
/// than three vertices remain or the area falls below `curve_tolerance²`.
pub fn clean_polygon(
    polygon: &[Point],
    curve_tolerance: f64,
    clipper_scale: u64,
) -> Option<Vec<Point>> {
    let scale = clipper_scale.max(1) as f64;
    let grid = 1.0 / scale;
    let snapped: Vec<Point> = polygon
        .iter()
        .map(|p| {
            Point::new(
                (p.x * scale).round() * grid,
                (p.y * scale).round() * grid,
            )
        })
        .collect();
    let snapped = dedup_vertices(&snapped, grid);
    if snapped.len() < 3 {
        return None;
    }

    let outer = largest_shape(simplify(&snapped))?.into_iter().next()?;
    let thinned = remove_near_collinear(outer, curve_tolerance);
    if thinned.len() < 3 || polygon_area(&thinned).abs() < curve_tolerance * curve_tolerance {
        return None;
    }
    Some(thinned)
}

fn remove_near_collinear(mut polygon: Vec<Point>, tolerance: f64) -> Vec<Point> {
    let mut changed = true;
    while changed && polygon.len() > 3 {
        changed = false;
        let n = polygon.len();
        for i in 0..n {
            let prev = polygon[(i + n - 1) % n];
            let next = polygon[(i + 1) % n];
            if distance_to_segment(polygon[i], prev, next) < tolerance {
                polygon.remove(i);
                changed = true;
                break;
            }
        }
    }
    polygon
}

/// Offsets a loop by `delta` (positive grows, negative shrinks) with round joins.
///
/// Returns every resulting loop; a shrink may split a loop or make it vanish.
/// `tolerance` bounds the deviation of the round joins from true arcs.
pub fn offset_polygon(polygon: &[Point], delta: f64, tolerance: f64) -> Vec<Vec<Point>> {
    if polygon.len() < 3 {
        return Vec::new();
    }
    if delta == 0.0 {
        return vec![polygon.to_vec()];
    }
    if is_rectangle(polygon, 1e-10) {
        return offset_rectangle(polygon, delta).into_iter().collect();
    }

    let band = edge_band(polygon, delta.abs(), tolerance);
    let shapes = if delta > 0.0 {
        let mut all = band;
        all.push(polygon.to_vec());
        union_all(&all)
    } else {
        difference(&[polygon.to_vec()], &band)
    };

    shapes
        .into_iter()
        .filter_map(|shape| shape.into_iter().next())
        .map(with_outer_winding)
        .collect()
}

fn offset_rectangle(polygon: &[Point], delta: f64) -> Option<Vec<Point>> {
    let bb = polygon_bounds(polygon)?;
    let (min_x, min_y) = (bb.x - delta, bb.y - delta);
    let (max_x, max_y) = (bb.max_x() + delta, bb.max_y() + delta);
    if min_x >= max_x || min_y >= max_y {
        return None;
    }
    Some(vec![
        Point::new(min_x, min_y),
        Point::new(max_x, min_y),
        Point::new(max_x, max_y),
        Point::new(min_x, max_y),
    ])
}

/// Every edge swept by a disc of radius `distance`: one rectangle per edge plus a polygonal
/// disc per vertex.
fn edge_band(polygon: &[Point], distance: f64, tolerance: f64) -> Vec<Vec<Point>> {
    let segments = arc_segments(distance, tolerance);
    // circumscribe so the polygonal disc contains the true one
    let radius = distance / (std::f64::consts::PI / segments as f64).cos();
    let n = polygon.len();
    let mut band = Vec::with_capacity(2 * n);

    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let len = a.distance(b);
        if len > 0.0 {
            let nx = -(b.y - a.y) / len * distance;
            let ny = (b.x - a.x) / len * distance;
            band.push(vec![
                Point::new(a.x + nx, a.y + ny),
                Point::new(a.x - nx, a.y - ny),
                Point::new(b.x - nx, b.y - ny),
                Point::new(b.x + nx, b.y + ny),
            ]);
        }
        band.push(
            (0..segments)
                .map(|k| {
                    let angle = std::f64::consts::TAU * k as f64 / segments as f64;
                    Point::new(a.x + radius * angle.cos(), a.y + radius * angle.sin())
                })
                .collect(),
        );
    }
    band
}

fn arc_segments(radius: f64, tolerance: f64) -> usize {
    if tolerance <= 0.0 || tolerance >= radius {
        return 8;
    }
    let step = 2.0 * (1.0 - tolerance / radius).acos();
    ((std::f64::consts::TAU / step).ceil() as usize).clamp(8, 64)
}
