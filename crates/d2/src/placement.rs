//! Sheet-based bottom-left-fill placement.
//!
//! Turns one ordering (part ids plus rotations) into a multi-sheet layout using resolved NFPs.
//! Candidate positions are the exact vertices of the arrangement formed by the inner-fit loops
//! and the translated outside NFPs, so zero-width feasible regions (exact fits) are found too.

use crate::nfp::Nfp;
use crate::nfp_cache::{NfpCache, NfpKey};
use polynest_core::geometry::{
    point_in_polygon_with_tolerance, polygon_area, polygon_bounds, rotate_polygon,
    segment_intersection, Bounds, Containment, Point,
};
use polynest_core::result::layout_fitness;
use polynest_core::tree::{PartId, PolygonTree};
use polynest_core::{PlacedPart, PlacementResult};
use rayon::prelude::*;
use std::collections::HashMap;

/// Distance under which a candidate counts as lying on an NFP boundary.
pub const PLACEMENT_TOLERANCE: f64 = 1e-7;

/// Read access to resolved NFPs.
pub trait NfpLookup {
    /// The usable NFP for `key`, or `None` when missing or marked "no NFP".
    fn nfp(&self, key: &NfpKey) -> Option<&Nfp>;
}

impl NfpLookup for NfpCache {
    fn nfp(&self, key: &NfpKey) -> Option<&Nfp> {
        self.get(key)
    }
}

impl NfpLookup for HashMap<NfpKey, Nfp> {
    fn nfp(&self, key: &NfpKey) -> Option<&Nfp> {
        self.get(key)
    }
}

/// Evaluates placement orders against one bin.
#[derive(Debug, Clone)]
pub struct PlacementEvaluator<'a> {
    tree: &'a PolygonTree,
    bin_bounds: Bounds,
    bin_area: f64,
}

impl<'a> PlacementEvaluator<'a> {
    /// Creates an evaluator for `bin` (any winding) and the parts in `tree`.
    pub fn new(tree: &'a PolygonTree, bin: &[Point]) -> Self {
        let bin_bounds = polygon_bounds(bin).unwrap_or(Bounds {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        });
        Self {
            tree,
            bin_bounds,
            bin_area: polygon_area(bin).abs(),
        }
    }

    /// Places `placement` (with `rotation` per position) sheet by sheet.
    pub fn evaluate<L>(&self, placement: &[PartId], rotation: &[f64], nfps: &L) -> PlacementResult
    where
        L: NfpLookup + ?Sized,
    {
        let total = placement.len();
        let mut unplaced: Vec<PartId> = Vec::new();
        let mut queue: Vec<(PartId, f64)> = Vec::with_capacity(total);

        for (&id, &angle) in placement.iter().zip(rotation) {
            let fits_bin = nfps
                .nfp(&NfpKey::bin(id, angle))
                .is_some_and(|ifp| !ifp.is_empty());
            if fits_bin {
                queue.push((id, angle));
            } else {
                log::debug!("part {} at {}° cannot fit the bin", id, angle);
                unplaced.push(id);
            }
        }

        let mut sheets: Vec<Vec<PlacedPart>> = Vec::new();
        while !queue.is_empty() && sheets.len() < total {
            let mut sheet: Vec<PlacedPart> = Vec::new();
            let mut deferred: Vec<(PartId, f64)> = Vec::new();

            for (id, angle) in queue.drain(..) {
                match self.place_on_sheet(id, angle, &sheet, nfps) {
                    Some(position) => sheet.push(PlacedPart {
                        part_id: id,
                        source: self.tree.get(id).map_or(0, |node| node.source),
                        x: position.x,
                        y: position.y,
                        rotation: angle,
                    }),
                    None => deferred.push((id, angle)),
                }
            }

            if sheet.is_empty() {
                // a fresh sheet that takes nothing will never take anything
                unplaced.extend(deferred.iter().map(|(id, _)| *id));
                break;
            }
            sheets.push(sheet);
            queue = deferred;
        }
        // sheet guard reached
        unplaced.extend(queue.iter().map(|(id, _)| *id));

        self.score(sheets, unplaced, total)
    }

    fn place_on_sheet<L>(
        &self,
        id: PartId,
        angle: f64,
        sheet: &[PlacedPart],
        nfps: &L,
    ) -> Option<Point>
    where
        L: NfpLookup + ?Sized,
    {
        let ifp = nfps.nfp(&NfpKey::bin(id, angle))?;

        let mut obstacles: Vec<Vec<Vec<Point>>> = Vec::with_capacity(sheet.len());
        for placed in sheet {
            let key = NfpKey::pair(placed.part_id, id, placed.rotation, angle);
            let Some(nfp) = nfps.nfp(&key) else {
                log::debug!("missing NFP {:?}, part {} skips this sheet", key, id);
                return None;
            };
            obstacles.push(nfp.translated(Point::new(placed.x, placed.y)));
        }

        bottom_left_position(&ifp.loops, &obstacles)
    }

    fn score(
        &self,
        sheets: Vec<Vec<PlacedPart>>,
        unplaced: Vec<PartId>,
        total: usize,
    ) -> PlacementResult {
        let placed = sheets.iter().map(Vec::len).sum::<usize>();
        let sheet_area = |sheet: &[PlacedPart]| -> f64 {
            sheet.iter().map(|p| self.tree.net_area(p.part_id)).sum()
        };
        let placed_area: f64 = sheets.iter().map(|s| sheet_area(s)).sum();

        let utilization = match sheets.last() {
            Some(last) => {
                let last_area = sheet_area(last);
                let rightmost = last
                    .iter()
                    .filter_map(|p| self.right_extent(p))
                    .fold(self.bin_bounds.x, f64::max);
                let consumed = (self.bin_bounds.height * (rightmost - self.bin_bounds.x))
                    .max(last_area)
                    .min(self.bin_area.max(last_area));
                let denominator = (sheets.len() - 1) as f64 * self.bin_area + consumed;
                if denominator > 0.0 {
                    (placed_area / denominator).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        PlacementResult {
            fitness: layout_fitness(unplaced.len(), sheets.len(), utilization),
            utilization,
            placed,
            total,
            unplaced,
            sheets,
        }
    }

    fn right_extent(&self, placed: &PlacedPart) -> Option<f64> {
        let outline = &self.tree.get(placed.part_id)?.outline;
        let bounds = polygon_bounds(&rotate_polygon(outline, placed.rotation))?;
        Some(placed.x + bounds.max_x())
    }
}

/// Lexicographically smallest `(x, y)` translation inside or on the inner-fit region and not
/// strictly inside any obstacle.
///
/// Each obstacle is the loop list of one translated outside NFP. Loops with outer winding are
/// forbidden, loops with hole winding are pockets in which placement is allowed.
pub fn bottom_left_position(ifp: &[Vec<Point>], obstacles: &[Vec<Vec<Point>>]) -> Option<Point> {
    let ifp_bounds = loops_bounds(ifp)?;

    let loops: Vec<&[Point]> = ifp
        .iter()
        .chain(obstacles.iter().flatten())
        .map(Vec::as_slice)
        .collect();

    let mut candidates: Vec<Point> = loops.iter().flat_map(|l| l.iter().copied()).collect();
    candidates.extend(edge_intersections(&loops, &ifp_bounds));
    candidates.retain(|p| within(&ifp_bounds, *p));
    candidates.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));

    candidates
        .par_iter()
        .find_first(|&&p| inside_region(p, ifp) && !obstacles.iter().any(|o| blocks(o, p)))
        .copied()
}

struct Edge {
    a: Point,
    b: Point,
    bounds: Bounds,
    owner: usize,
}

/// Intersections between edges of different loops, limited to the region of interest.
fn edge_intersections(loops: &[&[Point]], region: &Bounds) -> Vec<Point> {
    let mut edges = Vec::new();
    for (owner, l) in loops.iter().enumerate() {
        let n = l.len();
        for i in 0..n {
            let (a, b) = (l[i], l[(i + 1) % n]);
            let Some(bounds) = polygon_bounds(&[a, b]) else {
                continue;
            };
            if bounds.intersects(region, PLACEMENT_TOLERANCE) {
                edges.push(Edge {
                    a,
                    b,
                    bounds,
                    owner,
                });
            }
        }
    }

    let mut points = Vec::new();
    for (i, e) in edges.iter().enumerate() {
        for f in &edges[i + 1..] {
            if e.owner == f.owner || !e.bounds.intersects(&f.bounds, PLACEMENT_TOLERANCE) {
                continue;
            }
            if let Some(p) = segment_intersection(e.a, e.b, f.a, f.b) {
                points.push(p);
            }
        }
    }
    points
}

fn loops_bounds(loops: &[Vec<Point>]) -> Option<Bounds> {
    let all: Vec<Point> = loops.iter().flatten().copied().collect();
    polygon_bounds(&all)
}

fn within(bounds: &Bounds, p: Point) -> bool {
    p.x >= bounds.x - PLACEMENT_TOLERANCE
        && p.x <= bounds.max_x() + PLACEMENT_TOLERANCE
        && p.y >= bounds.y - PLACEMENT_TOLERANCE
        && p.y <= bounds.max_y() + PLACEMENT_TOLERANCE
}

/// Inside-or-on an inner-fit region given as loops with even-odd nesting.
fn inside_region(p: Point, loops: &[Vec<Point>]) -> bool {
    let mut depth = 0;
    for l in loops {
        match point_in_polygon_with_tolerance(p, l, PLACEMENT_TOLERANCE) {
            Containment::OnBoundary => return true,
            Containment::Inside => depth += 1,
            Containment::Outside => {}
        }
    }
    depth % 2 == 1
}

/// Strictly inside a forbidden (outer winding) loop and not inside-or-on any pocket
/// (hole winding) loop.
fn blocks(obstacle: &[Vec<Point>], p: Point) -> bool {
    let (forbidden, pockets): (Vec<&Vec<Point>>, Vec<&Vec<Point>>) =
        obstacle.iter().partition(|l| polygon_area(l) < 0.0);
    forbidden.iter().any(|l| {
        point_in_polygon_with_tolerance(p, l, PLACEMENT_TOLERANCE) == Containment::Inside
    }) && !pockets.iter().any(|l| {
        point_in_polygon_with_tolerance(p, l, PLACEMENT_TOLERANCE).is_inside_or_on()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfp::{compute_job, NfpJob};
    use crate::nfp_cache::{required_keys, NfpOperand};
    use approx::assert_relative_eq;
    use polynest_core::geometry::{rectangle, translate_polygon, with_hole_winding};

    fn tree_of(parts: &[Vec<Point>]) -> PolygonTree {
        let mut tree = PolygonTree::new();
        for (i, outline) in parts.iter().enumerate() {
            tree.add_root(i as PartId, outline.clone(), i).unwrap();
        }
        tree
    }

    fn resolve(
        tree: &PolygonTree,
        bin: &[Point],
        placement: &[PartId],
        rotation: &[f64],
    ) -> HashMap<NfpKey, Nfp> {
        resolve_with(tree, bin, placement, rotation, false)
    }

    fn resolve_with(
        tree: &PolygonTree,
        bin: &[Point],
        placement: &[PartId],
        rotation: &[f64],
        explore_concave: bool,
    ) -> HashMap<NfpKey, Nfp> {
        required_keys(placement, rotation)
            .into_iter()
            .filter_map(|key| {
                let a = match key.a {
                    NfpOperand::Bin => bin.to_vec(),
                    NfpOperand::Part(id) => tree.get(id)?.outline.clone(),
                };
                let job = NfpJob {
                    key,
                    a,
                    a_holes: Vec::new(),
                    b: tree.get(key.b)?.outline.clone(),
                    explore_concave,
                    use_holes: false,
                };
                compute_job(&job).ok().flatten().map(|nfp| (key, nfp))
            })
            .collect()
    }

    #[test]
    fn test_exact_fit_two_halves() {
        let bin = rectangle(10.0, 10.0);
        let tree = tree_of(&[rectangle(5.0, 10.0), rectangle(5.0, 10.0)]);
        let order = [0, 1];
        let rotation = [0.0, 0.0];
        let nfps = resolve(&tree, &bin, &order, &rotation);

        let result = PlacementEvaluator::new(&tree, &bin).evaluate(&order, &rotation, &nfps);
        assert_eq!(result.sheet_count(), 1);
        assert!(result.all_placed());
        let sheet = &result.sheets[0];
        assert_relative_eq!(sheet[0].x, 0.0);
        assert_relative_eq!(sheet[1].x, 5.0);
        assert_relative_eq!(sheet[1].y, 0.0);
        assert_relative_eq!(result.utilization, 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.fitness, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_overflow_opens_new_sheet() {
        let bin = rectangle(10.0, 10.0);
        let tree = tree_of(&[rectangle(6.0, 10.0), rectangle(6.0, 10.0)]);
        let order = [0, 1];
        let rotation = [0.0, 0.0];
        let nfps = resolve(&tree, &bin, &order, &rotation);

        let result = PlacementEvaluator::new(&tree, &bin).evaluate(&order, &rotation, &nfps);
        assert_eq!(result.sheet_count(), 2);
        assert!(result.all_placed());
        // one full sheet plus a 6-wide slice of the second
        assert_relative_eq!(result.utilization, 120.0 / 160.0, epsilon = 1e-9);
    }

    #[test]
    fn test_oversized_part_is_unplaced() {
        let bin = rectangle(10.0, 10.0);
        let tree = tree_of(&[rectangle(11.0, 11.0)]);
        let nfps = resolve(&tree, &bin, &[0], &[0.0]);

        let result = PlacementEvaluator::new(&tree, &bin).evaluate(&[0], &[0.0], &nfps);
        assert_eq!(result.sheet_count(), 0);
        assert_eq!(result.unplaced, vec![0]);
        assert_relative_eq!(result.fitness, 2.5);
    }

    #[test]
    fn test_missing_pair_nfp_defers_part() {
        let bin = rectangle(10.0, 10.0);
        let tree = tree_of(&[rectangle(2.0, 2.0), rectangle(2.0, 2.0)]);
        let order = [0, 1];
        let rotation = [0.0, 0.0];
        let mut nfps = resolve(&tree, &bin, &order, &rotation);
        nfps.remove(&NfpKey::pair(0, 1, 0.0, 0.0));

        let result = PlacementEvaluator::new(&tree, &bin).evaluate(&order, &rotation, &nfps);
        assert_eq!(result.sheet_count(), 2);
        assert!(result.all_placed());
    }

    #[test]
    fn test_bottom_left_prefers_left_then_low() {
        let ifp = vec![rectangle(10.0, 10.0)];
        let blocker = vec![translate_polygon(&rectangle(4.0, 4.0), Point::new(-2.0, -2.0))];
        let p = bottom_left_position(&ifp, &[blocker]).unwrap();
        assert_relative_eq!(p.x, 0.0);
        assert_relative_eq!(p.y, 2.0);
    }

    #[test]
    fn test_pockets_are_allowed() {
        let ifp = vec![rectangle(10.0, 10.0)];
        let outer = translate_polygon(&rectangle(20.0, 20.0), Point::new(-5.0, -5.0));
        let pocket = with_hole_winding(translate_polygon(
            &rectangle(2.0, 2.0),
            Point::new(3.0, 3.0),
        ));
        let p = bottom_left_position(&ifp, &[vec![outer, pocket]]).unwrap();
        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(p.y, 3.0);
    }

    #[test]
    fn test_fully_blocked_returns_none() {
        let ifp = vec![rectangle(10.0, 10.0)];
        let blocker = vec![translate_polygon(&rectangle(20.0, 20.0), Point::new(-5.0, -5.0))];
        assert!(bottom_left_position(&ifp, &[blocker]).is_none());
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

    #[test]
    fn test_candidate_inside_nfp_pocket_is_accepted() {
        let job = NfpJob {
            key: NfpKey::pair(0, 1, 0.0, 0.0),
            a: cup(),
            a_holes: Vec::new(),
            b: rectangle(4.0, 4.0),
            explore_concave: true,
            use_holes: false,
        };
        let nfp = compute_job(&job).unwrap().unwrap();
        let ifp = vec![translate_polygon(&rectangle(20.0, 20.0), Point::new(-2.0, -2.0))];
        let p = bottom_left_position(&ifp, &[nfp.loops]).unwrap();
        assert_relative_eq!(p.x, 2.0, epsilon = 1e-3);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_explore_concave_nests_into_cavity() {
        let bin = rectangle(20.0, 20.0);
        let tree = tree_of(&[cup(), rectangle(4.0, 4.0)]);
        let order = [0, 1];
        let rotation = [0.0, 0.0];
        let evaluator = PlacementEvaluator::new(&tree, &bin);

        let nfps = resolve_with(&tree, &bin, &order, &rotation, true);
        let result = evaluator.evaluate(&order, &rotation, &nfps);
        assert_eq!(result.sheet_count(), 1);
        assert!(result.all_placed());
        let square = &result.sheets[0][1];
        assert_eq!(square.part_id, 1);
        assert_relative_eq!(square.x, 2.0, epsilon = 1e-3);
        assert_relative_eq!(square.y, 2.0, epsilon = 1e-3);

        let nfps = resolve_with(&tree, &bin, &order, &rotation, false);
        let result = evaluator.evaluate(&order, &rotation, &nfps);
        assert_eq!(result.sheet_count(), 2);
    }
}
