use std::collections::BTreeMap;

use super::grid::BBox;
use super::types::{Crossing, CrossingReport, Point, RoutedPath};

const EPS: f32 = 1e-6;
/// Two hits of the same path pair closer than this are one crossing.
const SAME_POINT_EPS: f32 = 1e-3;

pub type Segment = (Point, Point);

fn orient(a: Point, b: Point, c: Point) -> f32 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn on_segment(a: Point, b: Point, c: Point) -> bool {
    c.0 >= a.0.min(b.0) - EPS
        && c.0 <= a.0.max(b.0) + EPS
        && c.1 >= a.1.min(b.1) - EPS
        && c.1 <= a.1.max(b.1) + EPS
}

pub fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    let straddles_cd = o1 > 0.0 && o2 < 0.0 || o1 < 0.0 && o2 > 0.0;
    let straddles_ab = o3 > 0.0 && o4 < 0.0 || o3 < 0.0 && o4 > 0.0;
    if straddles_cd && straddles_ab {
        return true;
    }
    (o1.abs() <= EPS && on_segment(a, b, c))
        || (o2.abs() <= EPS && on_segment(a, b, d))
        || (o3.abs() <= EPS && on_segment(c, d, a))
        || (o4.abs() <= EPS && on_segment(c, d, b))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intersection {
    Point(Point),
    /// Collinear overlap; the representative point is the middle of the shared run.
    Overlap(Point),
}

impl Intersection {
    pub fn point(self) -> Point {
        match self {
            Intersection::Point(p) | Intersection::Overlap(p) => p,
        }
    }
}

/// Where segment `ab` meets `cd`, if at all.
pub fn segment_intersection(a: Point, b: Point, c: Point, d: Point) -> Option<Intersection> {
    if !segments_intersect(a, b, c, d) {
        return None;
    }
    let r = (b.0 - a.0, b.1 - a.1);
    let s = (d.0 - c.0, d.1 - c.1);
    let denom = r.0 * s.1 - r.1 * s.0;
    if denom.abs() > EPS {
        let t = ((c.0 - a.0) * s.1 - (c.1 - a.1) * s.0) / denom;
        let t = t.clamp(0.0, 1.0);
        return Some(Intersection::Point((a.0 + t * r.0, a.1 + t * r.1)));
    }
    // Parallel and touching: project everything onto the longer direction.
    let (origin, dir) = if r.0 * r.0 + r.1 * r.1 >= s.0 * s.0 + s.1 * s.1 {
        (a, r)
    } else {
        (c, s)
    };
    let len_sq = dir.0 * dir.0 + dir.1 * dir.1;
    if len_sq <= EPS {
        return Some(Intersection::Point(a));
    }
    let proj = |p: Point| ((p.0 - origin.0) * dir.0 + (p.1 - origin.1) * dir.1) / len_sq;
    let (ta, tb, tc, td) = (proj(a), proj(b), proj(c), proj(d));
    let lo = ta.min(tb).max(tc.min(td));
    let hi = ta.max(tb).min(tc.max(td));
    let at = |t: f32| (origin.0 + t * dir.0, origin.1 + t * dir.1);
    if (hi - lo).abs() * len_sq.sqrt() <= SAME_POINT_EPS {
        Some(Intersection::Point(at(lo)))
    } else {
        Some(Intersection::Overlap(at((lo + hi) / 2.0)))
    }
}

fn segment_bounds(seg: &Segment) -> BBox {
    let (a, b) = *seg;
    BBox::new(a.0.min(b.0), a.1.min(b.1), (a.0 - b.0).abs(), (a.1 - b.1).abs())
}

fn bounds_touch(a: &BBox, b: &BBox) -> bool {
    a.x <= b.right() + EPS
        && b.x <= a.right() + EPS
        && a.y <= b.bottom() + EPS
        && b.y <= a.bottom() + EPS
}

fn near(a: Point, b: Point) -> bool {
    (a.0 - b.0).abs() <= SAME_POINT_EPS && (a.1 - b.1).abs() <= SAME_POINT_EPS
}

fn is_terminal(path: &RoutedPath, p: Point) -> bool {
    path.points.first().is_some_and(|&q| near(p, q))
        || path.points.last().is_some_and(|&q| near(p, q))
}

/// Crossings between every pair of distinct paths, in path-id order.
pub fn analyze_crossings(paths: &BTreeMap<String, RoutedPath>) -> CrossingReport {
    let list: Vec<&RoutedPath> = paths.values().collect();
    let segments: Vec<Vec<(Segment, BBox)>> = list
        .iter()
        .map(|path| {
            path.segments()
                .map(|seg| (seg, segment_bounds(&seg)))
                .collect()
        })
        .collect();
    let path_bounds: Vec<Option<BBox>> =
        list.iter().map(|p| BBox::from_points(&p.points)).collect();

    let mut report = CrossingReport::default();
    for i in 0..list.len() {
        for j in i + 1..list.len() {
            let (Some(bi), Some(bj)) = (&path_bounds[i], &path_bounds[j]) else {
                continue;
            };
            if !bounds_touch(bi, bj) {
                continue;
            }
            let mut hits: Vec<Point> = Vec::new();
            for (seg_a, box_a) in &segments[i] {
                for (seg_b, box_b) in &segments[j] {
                    if !bounds_touch(box_a, box_b) {
                        continue;
                    }
                    let Some(hit) = segment_intersection(seg_a.0, seg_a.1, seg_b.0, seg_b.1) else {
                        continue;
                    };
                    let point = hit.point();
                    if let Intersection::Point(p) = hit
                        && is_terminal(list[i], p)
                        && is_terminal(list[j], p)
                    {
                        continue;
                    }
                    if hits.iter().any(|&q| near(point, q)) {
                        continue;
                    }
                    hits.push(point);
                }
            }
            for point in hits {
                report.crossings.push(Crossing {
                    path_a: list[i].id.clone(),
                    path_b: list[j].id.clone(),
                    point,
                });
            }
        }
    }
    report.total = report.crossings.len();
    report
}

/// Writes per-path crossing counts back onto the paths.
pub fn apply_counts(paths: &mut BTreeMap<String, RoutedPath>, report: &CrossingReport) {
    for path in paths.values_mut() {
        path.crossings = report.count_for(&path.id);
    }
}
