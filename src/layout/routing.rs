use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::config::{CurveKind, LayoutConfig, RoutingConfig};
use crate::ir::{ConnectionRequest, ConnectorStyle, Direction, RoutingMethod};

use super::crossing::analyze_crossings;
use super::error::RoutingError;
use super::grid::{BBox, Cell, ObstacleSnapshot, distance};
use super::types::{
    ComponentLayout, CrossingReport, IssueCode, Point, RoutedPath, ValidationIssue,
};

// ── Side selection ──────────────────────────────────────────────────
/// Center-offset aspect ratio beyond which one axis wins outright.
const DIRECTION_PREF_RATIO: f32 = 1.35;

// ── Curve blending ──────────────────────────────────────────────────
/// Cubic handle length as a fraction of the blend radius.
const CUBIC_KAPPA: f32 = 0.55;

// ── Search ──────────────────────────────────────────────────────────
/// Node expansions between wall-clock checks.
const DEADLINE_CHECK_INTERVAL: usize = 1024;
const DIRS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

const POINT_EPS: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeSide {
    Left,
    Right,
    Top,
    Bottom,
}

impl EdgeSide {
    fn is_horizontal(self) -> bool {
        matches!(self, EdgeSide::Left | EdgeSide::Right)
    }

    /// Cardinal side for an exit angle in degrees (0 right, 90 down).
    pub fn from_angle(degrees: f32) -> Self {
        let a = degrees.rem_euclid(360.0);
        if !(45.0..315.0).contains(&a) {
            EdgeSide::Right
        } else if a < 135.0 {
            EdgeSide::Bottom
        } else if a < 225.0 {
            EdgeSide::Left
        } else {
            EdgeSide::Top
        }
    }
}

/// Resolved attachment point and the direction a connector leaves it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub point: Point,
    pub side: EdgeSide,
    /// Side midpoint that may be spread along the side when it is shared.
    pub spread: bool,
}

impl Anchor {
    fn on_side(bbox: &BBox, side: EdgeSide) -> Self {
        Self {
            point: side_point(bbox, side),
            side,
            spread: true,
        }
    }

    fn fixed(point: Point, side: EdgeSide) -> Self {
        Self {
            point,
            side,
            spread: false,
        }
    }
}

fn layer_direction(method: RoutingMethod) -> Direction {
    match method {
        RoutingMethod::HierarchicalLr => Direction::LeftRight,
        _ => Direction::TopBottom,
    }
}

pub fn facing_sides(from: &BBox, to: &BBox, direction: Direction) -> (EdgeSide, EdgeSide) {
    let (from_cx, from_cy) = from.center();
    let (to_cx, to_cy) = to.center();
    let dx = to_cx - from_cx;
    let dy = to_cy - from_cy;
    let x_overlap = from.x < to.right() && to.x < from.right();
    let y_overlap = from.y < to.bottom() && to.y < from.bottom();

    let ratio = dx.abs() / dy.abs().max(1e-3);
    let horiz_pref = ratio > DIRECTION_PREF_RATIO || (y_overlap && ratio > 0.9);
    let vert_pref = ratio < (1.0 / DIRECTION_PREF_RATIO) || (x_overlap && ratio < 1.1);
    let use_horizontal = if horiz_pref && !vert_pref {
        true
    } else if vert_pref && !horiz_pref {
        false
    } else {
        direction == Direction::LeftRight
    };

    if use_horizontal {
        if dx >= 0.0 {
            (EdgeSide::Right, EdgeSide::Left)
        } else {
            (EdgeSide::Left, EdgeSide::Right)
        }
    } else if dy >= 0.0 {
        (EdgeSide::Bottom, EdgeSide::Top)
    } else {
        (EdgeSide::Top, EdgeSide::Bottom)
    }
}

fn side_point(bbox: &BBox, side: EdgeSide) -> Point {
    let (cx, cy) = bbox.center();
    match side {
        EdgeSide::Left => (bbox.x, cy),
        EdgeSide::Right => (bbox.right(), cy),
        EdgeSide::Top => (cx, bbox.y),
        EdgeSide::Bottom => (cx, bbox.bottom()),
    }
}

/// Side nearest to a relative offset on the box.
fn nearest_side(rx: f32, ry: f32) -> EdgeSide {
    let candidates = [
        (rx, EdgeSide::Left),
        (1.0 - rx, EdgeSide::Right),
        (ry, EdgeSide::Top),
        (1.0 - ry, EdgeSide::Bottom),
    ];
    candidates
        .iter()
        .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))
        .map_or(EdgeSide::Right, |(_, side)| *side)
}

/// Resolves `name` on `component`: custom connection points first, then the
/// built-in sides and `center`. Without a name, or with an unknown one, the side
/// facing `other` is used; the flag reports whether a given name was unknown.
pub fn resolve_anchor(
    component: &ComponentLayout,
    name: Option<&str>,
    other: &ComponentLayout,
    direction: Direction,
) -> (Anchor, bool) {
    let bbox = component.bbox();
    let facing = facing_sides(&bbox, &other.bbox(), direction).0;
    let auto = Anchor::on_side(&bbox, facing);
    let Some(name) = name else {
        return (auto, false);
    };
    if let Some(cp) = component.connection_points.iter().find(|cp| cp.name == name) {
        let rx = cp.relative_x.clamp(0.0, 1.0);
        let ry = cp.relative_y.clamp(0.0, 1.0);
        let side = cp
            .angle
            .filter(|a| a.is_finite())
            .map_or_else(|| nearest_side(rx, ry), EdgeSide::from_angle);
        let point = (bbox.x + rx * bbox.width, bbox.y + ry * bbox.height);
        return (Anchor::fixed(point, side), false);
    }
    let side = match name {
        "left" => EdgeSide::Left,
        "right" => EdgeSide::Right,
        "top" => EdgeSide::Top,
        "bottom" => EdgeSide::Bottom,
        "center" => return (Anchor::fixed(bbox.center(), facing), false),
        _ => return (auto, true),
    };
    (Anchor::on_side(&bbox, side), false)
}

/// Point `length` outside `bbox` on the anchor's exit side, level with the
/// anchor. Its grid cell never lies on the box's own footprint.
pub fn port_stub_point(anchor: &Anchor, bbox: &BBox, length: f32) -> Point {
    match anchor.side {
        EdgeSide::Left => (bbox.x - length, anchor.point.1),
        EdgeSide::Right => (bbox.right() + length, anchor.point.1),
        EdgeSide::Top => (anchor.point.0, bbox.y - length),
        EdgeSide::Bottom => (anchor.point.0, bbox.bottom() + length),
    }
}

/// Where the line from `remote` to the box center crosses `side`, as a
/// coordinate along that side.
fn ideal_port_pos(remote: Point, bbox: &BBox, side: EdgeSide) -> f32 {
    let (cx, cy) = bbox.center();
    if side.is_horizontal() {
        let edge_x = if side == EdgeSide::Left {
            bbox.x
        } else {
            bbox.right()
        };
        let dx = cx - remote.0;
        if dx.abs() < 1.0 {
            return cy;
        }
        let t = (edge_x - remote.0) / dx;
        remote.1 + t * (cy - remote.1)
    } else {
        let edge_y = if side == EdgeSide::Top {
            bbox.y
        } else {
            bbox.bottom()
        };
        let dy = cy - remote.1;
        if dy.abs() < 1.0 {
            return cx;
        }
        let t = (edge_y - remote.1) / dy;
        remote.0 + t * (cx - remote.0)
    }
}

/// `count` evenly spaced points along `side`, snapped to grid lines when that
/// keeps them distinct and clear of the corners.
pub fn port_slots(bbox: &BBox, side: EdgeSide, count: usize, cell: f32) -> Vec<Point> {
    let (start, length) = if side.is_horizontal() {
        (bbox.y, bbox.height)
    } else {
        (bbox.x, bbox.width)
    };
    let raw: Vec<f32> = (1..=count)
        .map(|i| start + length * i as f32 / (count + 1) as f32)
        .collect();
    let snapped: Vec<f32> = raw.iter().map(|v| (v / cell).round() * cell).collect();
    let distinct = snapped.windows(2).all(|w| w[1] - w[0] > POINT_EPS);
    let inside = snapped
        .iter()
        .all(|v| *v > start + POINT_EPS && *v < start + length - POINT_EPS);
    let along = if distinct && inside { snapped } else { raw };
    let edge = match side {
        EdgeSide::Left => bbox.x,
        EdgeSide::Right => bbox.right(),
        EdgeSide::Top => bbox.y,
        EdgeSide::Bottom => bbox.bottom(),
    };
    along
        .into_iter()
        .map(|v| if side.is_horizontal() { (edge, v) } else { (v, edge) })
        .collect()
}

pub struct RouteContext<'a> {
    pub snapshot: &'a ObstacleSnapshot,
    pub max_expansions: usize,
    pub deadline: Option<Instant>,
}

impl<'a> RouteContext<'a> {
    pub fn new(snapshot: &'a ObstacleSnapshot, config: &RoutingConfig) -> Self {
        Self {
            snapshot,
            max_expansions: config.max_expansions.max(1),
            deadline: config
                .timeout_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
        }
    }

    fn passable(&self, cell: Cell, start: Cell, end: Cell) -> bool {
        cell == start || cell == end || !self.snapshot.is_blocked(cell)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct GridState {
    x: i32,
    y: i32,
    dir: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridEntry {
    est: u32,
    /// Turns so far plus the fewest still needed.
    turns_est: u32,
    steps: u32,
    turns: u32,
    state: GridState,
}

// Min-heap on (est, turns_est); deeper entries first among equals.
impl Ord for GridEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .est
            .cmp(&self.est)
            .then_with(|| other.turns_est.cmp(&self.turns_est))
            .then_with(|| self.steps.cmp(&other.steps))
            .then_with(|| other.state.x.cmp(&self.state.x))
            .then_with(|| other.state.y.cmp(&self.state.y))
            .then_with(|| other.state.dir.cmp(&self.state.dir))
    }
}

impl PartialOrd for GridEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fewest direction changes from `state` to `end` on an open grid.
fn min_turns_to(state: GridState, end: Cell) -> u32 {
    let dx = (end.0 - state.x).signum();
    let dy = (end.1 - state.y).signum();
    if dx == 0 && dy == 0 {
        return 0;
    }
    let (ux, uy) = DIRS[state.dir as usize];
    if dx == 0 || dy == 0 {
        u32::from((ux, uy) != (dx, dy))
    } else if ux == dx || uy == dy {
        1
    } else {
        2
    }
}

fn reconstruct(prev: &HashMap<GridState, GridState>, from: GridState) -> Vec<Cell> {
    let mut cells = vec![(from.x, from.y)];
    let mut cur = from;
    while let Some(&p) = prev.get(&cur) {
        cells.push((p.x, p.y));
        cur = p;
    }
    cells.reverse();
    cells
}

/// Grid A* over 4-neighbour moves. Cost is (steps, direction changes) compared
/// lexicographically; equal-cost candidates keep the lexicographically smallest
/// cell sequence. Search state is keyed by visited states only, so memory
/// follows the expansion budget rather than the grid size.
pub fn astar(ctx: &RouteContext<'_>, start: Cell, end: Cell) -> Result<Vec<Cell>, RoutingError> {
    let snapshot = ctx.snapshot;
    if !snapshot.is_routable() {
        return Err(RoutingError::GridTooLarge {
            cells: snapshot.grid().cell_count(),
            limit: snapshot.grid().max_cells(),
        });
    }
    for cell in [start, end] {
        if !snapshot.in_bounds(cell) {
            return Err(RoutingError::OutOfGrid(cell));
        }
    }
    if start == end {
        return Ok(vec![start]);
    }

    let cols = snapshot.cols();
    let rows = snapshot.rows();
    let heuristic = |x: i32, y: i32| (x - end.0).unsigned_abs() + (y - end.1).unsigned_abs();

    let mut best: HashMap<GridState, (u32, u32)> = HashMap::new();
    let mut prev: HashMap<GridState, GridState> = HashMap::new();
    let mut heap = BinaryHeap::new();

    for dir in 0..4u8 {
        let state = GridState {
            x: start.0,
            y: start.1,
            dir,
        };
        best.insert(state, (0, 0));
        heap.push(GridEntry {
            est: heuristic(start.0, start.1),
            turns_est: min_turns_to(state, end),
            steps: 0,
            turns: 0,
            state,
        });
    }

    let started = Instant::now();
    let mut expansions = 0usize;
    let mut goal: Option<(u32, u32, GridState)> = None;

    while let Some(entry) = heap.pop() {
        if let Some((goal_steps, goal_turns, _)) = goal
            && (entry.est, entry.turns_est) > (goal_steps, goal_turns)
        {
            break;
        }
        let GridEntry {
            steps, turns, state, ..
        } = entry;
        if best.get(&state) != Some(&(steps, turns)) {
            continue;
        }
        if (state.x, state.y) == end {
            goal = match goal {
                None => Some((steps, turns, state)),
                Some((gs, gt, current)) => {
                    if (gs, gt) == (steps, turns)
                        && reconstruct(&prev, state) < reconstruct(&prev, current)
                    {
                        Some((steps, turns, state))
                    } else {
                        Some((gs, gt, current))
                    }
                }
            };
            continue;
        }

        expansions += 1;
        if expansions > ctx.max_expansions {
            return Err(RoutingError::BudgetExhausted {
                budget: ctx.max_expansions,
            });
        }
        if expansions % DEADLINE_CHECK_INTERVAL == 0
            && let Some(deadline) = ctx.deadline
            && Instant::now() >= deadline
        {
            return Err(RoutingError::Timeout {
                elapsed_ms: started.elapsed().as_millis(),
            });
        }

        for (dir_idx, (dx, dy)) in DIRS.iter().enumerate() {
            let cell = (state.x + dx, state.y + dy);
            if cell.0 < 0 || cell.1 < 0 || cell.0 >= cols || cell.1 >= rows {
                continue;
            }
            if !ctx.passable(cell, start, end) {
                continue;
            }
            let next = GridState {
                x: cell.0,
                y: cell.1,
                dir: dir_idx as u8,
            };
            let cost = (steps + 1, turns + u32::from(state.dir != dir_idx as u8));
            let known = best.get(&next).copied().unwrap_or((u32::MAX, u32::MAX));
            match cost.cmp(&known) {
                Ordering::Greater => continue,
                Ordering::Equal => {
                    if let Some(&existing) = prev.get(&next)
                        && existing != state
                        && reconstruct(&prev, state) < reconstruct(&prev, existing)
                    {
                        prev.insert(next, state);
                    }
                    continue;
                }
                Ordering::Less => {}
            }
            best.insert(next, cost);
            prev.insert(next, state);
            heap.push(GridEntry {
                est: cost.0 + heuristic(cell.0, cell.1),
                turns_est: cost.1 + min_turns_to(next, end),
                steps: cost.0,
                turns: cost.1,
                state: next,
            });
        }
    }

    let Some((_, _, goal_state)) = goal else {
        return Err(RoutingError::Unreachable { start, end });
    };
    Ok(reconstruct(&prev, goal_state))
}

/// Drops repeated points and interior points on a straight run.
pub fn simplify_path(points: &[Point]) -> Vec<Point> {
    let mut deduped: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if deduped
            .last()
            .is_some_and(|q| (p.0 - q.0).abs() <= POINT_EPS && (p.1 - q.1).abs() <= POINT_EPS)
        {
            continue;
        }
        deduped.push(p);
    }
    if deduped.len() == 1 && points.len() > 1 {
        // Coincident endpoints still make a two-point path.
        deduped.push(deduped[0]);
    }
    if deduped.len() <= 2 {
        return deduped;
    }
    let mut out: Vec<Point> = Vec::with_capacity(deduped.len());
    out.push(deduped[0]);
    for idx in 1..deduped.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = deduped[idx];
        let next = deduped[idx + 1];
        let cross = (curr.0 - prev.0) * (next.1 - curr.1) - (curr.1 - prev.1) * (next.0 - curr.0);
        let dot = (curr.0 - prev.0) * (next.0 - curr.0) + (curr.1 - prev.1) * (next.1 - curr.1);
        if cross.abs() <= POINT_EPS && dot >= 0.0 {
            continue;
        }
        out.push(curr);
    }
    out.push(deduped[deduped.len() - 1]);
    out
}

pub fn path_length(points: &[Point]) -> f32 {
    points.windows(2).map(|w| distance(w[0], w[1])).sum()
}

pub fn path_bend_count(points: &[Point]) -> usize {
    if points.len() < 3 {
        return 0;
    }
    let mut bends = 0usize;
    for idx in 1..points.len() - 1 {
        let p0 = points[idx - 1];
        let p1 = points[idx];
        let p2 = points[idx + 1];
        let dx1 = p1.0 - p0.0;
        let dy1 = p1.1 - p0.1;
        let dx2 = p2.0 - p1.0;
        let dy2 = p2.1 - p1.1;
        let still1 = dx1.abs() <= POINT_EPS && dy1.abs() <= POINT_EPS;
        let still2 = dx2.abs() <= POINT_EPS && dy2.abs() <= POINT_EPS;
        if still1 || still2 {
            continue;
        }
        let cross = dx1 * dy2 - dy1 * dx2;
        if cross.abs() > POINT_EPS {
            bends += 1;
        }
    }
    bends
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedPath {
    pub points: Vec<Point>,
    /// Bounding boxes of the corner blends.
    pub blends: Vec<BBox>,
}

/// Replaces each interior vertex with a sampled blend of radius at most
/// `radius`, clipped to half of either adjacent segment. Endpoints are kept.
pub fn smooth_polyline(
    points: &[Point],
    kind: CurveKind,
    segments: usize,
    radius: f32,
) -> SmoothedPath {
    if points.len() < 3 || radius <= 0.0 {
        return SmoothedPath {
            points: points.to_vec(),
            blends: Vec::new(),
        };
    }
    let segments = segments.max(2);
    let mut out = Vec::with_capacity(points.len() * (segments + 1));
    let mut blends = Vec::new();
    out.push(points[0]);
    for idx in 1..points.len() - 1 {
        let p = points[idx - 1];
        let v = points[idx];
        let n = points[idx + 1];
        let len_in = distance(p, v);
        let len_out = distance(v, n);
        let r = radius.min(len_in / 2.0).min(len_out / 2.0);
        if r <= POINT_EPS {
            out.push(v);
            continue;
        }
        let a = (v.0 + (p.0 - v.0) / len_in * r, v.1 + (p.1 - v.1) / len_in * r);
        let b = (v.0 + (n.0 - v.0) / len_out * r, v.1 + (n.1 - v.1) / len_out * r);
        let mut blend = Vec::with_capacity(segments + 1);
        for step in 0..=segments {
            let t = step as f32 / segments as f32;
            let u = 1.0 - t;
            let sample = match kind {
                CurveKind::Quadratic => (
                    u * u * a.0 + 2.0 * u * t * v.0 + t * t * b.0,
                    u * u * a.1 + 2.0 * u * t * v.1 + t * t * b.1,
                ),
                CurveKind::Cubic => {
                    let c1 = (
                        a.0 + (v.0 - a.0) * CUBIC_KAPPA,
                        a.1 + (v.1 - a.1) * CUBIC_KAPPA,
                    );
                    let c2 = (
                        b.0 + (v.0 - b.0) * CUBIC_KAPPA,
                        b.1 + (v.1 - b.1) * CUBIC_KAPPA,
                    );
                    let (w0, w1, w2, w3) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
                    (
                        w0 * a.0 + w1 * c1.0 + w2 * c2.0 + w3 * b.0,
                        w0 * a.1 + w1 * c1.1 + w2 * c2.1 + w3 * b.1,
                    )
                }
            };
            blend.push(sample);
        }
        if let Some(bbox) = BBox::from_points(&blend) {
            blends.push(bbox);
        }
        out.extend(blend);
    }
    out.push(points[points.len() - 1]);
    SmoothedPath { points: out, blends }
}

fn cells_to_points(snapshot: &ObstacleSnapshot, cells: &[Cell]) -> Vec<Point> {
    cells.iter().map(|&c| snapshot.point_of(c)).collect()
}

/// One path-computation capability, between two grid cells.
pub trait RouteStrategy: Send + Sync {
    fn compute_path(
        &self,
        ctx: &RouteContext<'_>,
        start: Cell,
        end: Cell,
    ) -> Result<Vec<Point>, RoutingError>;

    /// Whether the result is attached to the anchors through axis-aligned elbows.
    /// Direct strategies connect the anchors themselves.
    fn follows_grid(&self) -> bool {
        true
    }

    /// Post-processing of the anchored polyline.
    fn finish(&self, points: Vec<Point>) -> SmoothedPath {
        SmoothedPath {
            points,
            blends: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestPath;

impl RouteStrategy for ShortestPath {
    fn compute_path(
        &self,
        ctx: &RouteContext<'_>,
        start: Cell,
        end: Cell,
    ) -> Result<Vec<Point>, RoutingError> {
        Ok(vec![ctx.snapshot.point_of(start), ctx.snapshot.point_of(end)])
    }

    fn follows_grid(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AvoidObstacles;

impl RouteStrategy for AvoidObstacles {
    fn compute_path(
        &self,
        ctx: &RouteContext<'_>,
        start: Cell,
        end: Cell,
    ) -> Result<Vec<Point>, RoutingError> {
        let cells = astar(ctx, start, end)?;
        Ok(simplify_path(&cells_to_points(ctx.snapshot, &cells)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Hierarchical {
    pub direction: Direction,
}

impl RouteStrategy for Hierarchical {
    fn compute_path(
        &self,
        ctx: &RouteContext<'_>,
        start: Cell,
        end: Cell,
    ) -> Result<Vec<Point>, RoutingError> {
        let cells = if start.0 == end.0 || start.1 == end.1 {
            vec![start, end]
        } else {
            match self.direction {
                Direction::TopBottom => {
                    let mid = start.1 + (end.1 - start.1) / 2;
                    if mid == start.1 {
                        vec![start, (end.0, start.1), end]
                    } else {
                        vec![start, (start.0, mid), (end.0, mid), end]
                    }
                }
                Direction::LeftRight => {
                    let mid = start.0 + (end.0 - start.0) / 2;
                    if mid == start.0 {
                        vec![start, (start.0, end.1), end]
                    } else {
                        vec![start, (mid, start.1), (mid, end.1), end]
                    }
                }
            }
        };
        Ok(cells_to_points(ctx.snapshot, &cells))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Curved {
    pub kind: CurveKind,
    pub segments: usize,
    pub radius: f32,
}

impl Curved {
    pub fn from_config(config: &RoutingConfig, cell: f32) -> Self {
        Self {
            kind: config.curve,
            segments: config.curve_segments,
            radius: config.corner_radius_cells * cell,
        }
    }
}

impl RouteStrategy for Curved {
    fn compute_path(
        &self,
        ctx: &RouteContext<'_>,
        start: Cell,
        end: Cell,
    ) -> Result<Vec<Point>, RoutingError> {
        AvoidObstacles.compute_path(ctx, start, end)
    }

    fn finish(&self, points: Vec<Point>) -> SmoothedPath {
        smooth_polyline(&points, self.kind, self.segments, self.radius)
    }
}

/// Initial obstacle-aware pass; crossings are then reduced batch-wide by
/// [`reduce_crossings`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkFlow;

impl RouteStrategy for NetworkFlow {
    fn compute_path(
        &self,
        ctx: &RouteContext<'_>,
        start: Cell,
        end: Cell,
    ) -> Result<Vec<Point>, RoutingError> {
        AvoidObstacles.compute_path(ctx, start, end)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RoutingStrategy {
    ShortestPath(ShortestPath),
    AvoidObstacles(AvoidObstacles),
    Hierarchical(Hierarchical),
    Curved(Curved),
    NetworkFlow(NetworkFlow),
}

impl RoutingStrategy {
    pub fn for_method(method: RoutingMethod, config: &RoutingConfig, cell: f32) -> Self {
        match method {
            RoutingMethod::ShortestPath => Self::ShortestPath(ShortestPath),
            RoutingMethod::AvoidObstacles => Self::AvoidObstacles(AvoidObstacles),
            RoutingMethod::HierarchicalTb | RoutingMethod::HierarchicalLr => {
                Self::Hierarchical(Hierarchical {
                    direction: layer_direction(method),
                })
            }
            RoutingMethod::Curved => Self::Curved(Curved::from_config(config, cell)),
            RoutingMethod::NetworkFlow => Self::NetworkFlow(NetworkFlow),
        }
    }

    pub fn method(&self) -> RoutingMethod {
        match self {
            Self::ShortestPath(_) => RoutingMethod::ShortestPath,
            Self::AvoidObstacles(_) => RoutingMethod::AvoidObstacles,
            Self::Hierarchical(h) => match h.direction {
                Direction::TopBottom => RoutingMethod::HierarchicalTb,
                Direction::LeftRight => RoutingMethod::HierarchicalLr,
            },
            Self::Curved(_) => RoutingMethod::Curved,
            Self::NetworkFlow(_) => RoutingMethod::NetworkFlow,
        }
    }

    pub fn as_route(&self) -> &dyn RouteStrategy {
        match self {
            Self::ShortestPath(s) => s,
            Self::AvoidObstacles(s) => s,
            Self::Hierarchical(s) => s,
            Self::Curved(s) => s,
            Self::NetworkFlow(s) => s,
        }
    }
}

/// A connection with both endpoints placed, its style resolved and its anchors
/// chosen.
#[derive(Debug, Clone)]
pub struct RouteJob<'a> {
    pub request: &'a ConnectionRequest,
    pub style: ConnectorStyle,
    pub source: &'a ComponentLayout,
    pub target: &'a ComponentLayout,
    pub source_anchor: Anchor,
    pub target_anchor: Anchor,
    /// Unknown-anchor warnings raised while resolving the anchors.
    pub anchor_issues: Vec<ValidationIssue>,
}

impl<'a> RouteJob<'a> {
    pub fn new(
        request: &'a ConnectionRequest,
        style: ConnectorStyle,
        source: &'a ComponentLayout,
        target: &'a ComponentLayout,
    ) -> Self {
        let direction = layer_direction(request.routing);
        let (source_anchor, source_unknown) =
            resolve_anchor(source, request.source.anchor.as_deref(), target, direction);
        let (target_anchor, target_unknown) =
            resolve_anchor(target, request.target.anchor.as_deref(), source, direction);
        let mut anchor_issues = Vec::new();
        for (unknown, endpoint) in [
            (source_unknown, &request.source),
            (target_unknown, &request.target),
        ] {
            if unknown {
                anchor_issues.push(
                    ValidationIssue::warning(
                        IssueCode::UnknownAnchor,
                        format!(
                            "connector {}: unknown anchor {:?} on {}, using automatic side",
                            request.id,
                            endpoint.anchor.as_deref().unwrap_or_default(),
                            endpoint.component
                        ),
                    )
                    .involving([endpoint.component.as_str()]),
                );
            }
        }
        Self {
            request,
            style,
            source,
            target,
            source_anchor,
            target_anchor,
            anchor_issues,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub path: RoutedPath,
    pub issues: Vec<ValidationIssue>,
    pub obstacle_writes: Vec<BBox>,
}

/// Appends an axis-aligned elbow so the first segment leaves along `side`.
fn push_elbow(points: &mut Vec<Point>, anchor: &Anchor, grid_point: Point) {
    if anchor.side.is_horizontal() {
        points.push((grid_point.0, anchor.point.1));
    } else {
        points.push((anchor.point.0, grid_point.1));
    }
}

fn attach_anchors(source: &Anchor, core: &[Point], target: &Anchor) -> Vec<Point> {
    let mut points = Vec::with_capacity(core.len() + 4);
    points.push(source.point);
    if let (Some(&first), Some(&last)) = (core.first(), core.last()) {
        push_elbow(&mut points, source, first);
        points.extend_from_slice(core);
        if target.side.is_horizontal() {
            points.push((last.0, target.point.1));
        } else {
            points.push((target.point.0, last.1));
        }
    }
    points.push(target.point);
    simplify_path(&points)
}

pub fn route_job(
    job: &RouteJob<'_>,
    snapshot: &ObstacleSnapshot,
    config: &LayoutConfig,
) -> RouteOutcome {
    let request = job.request;
    let (source, target) = (&job.source_anchor, &job.target_anchor);
    let mut issues = job.anchor_issues.clone();

    let cell = snapshot.cell_size();
    let strategy = RoutingStrategy::for_method(request.routing, &config.routing, cell);
    let route = strategy.as_route();
    let ctx = RouteContext::new(snapshot, &config.routing);
    let start = snapshot.cell_of(port_stub_point(source, &job.source.bbox(), cell));
    let end = snapshot.cell_of(port_stub_point(target, &job.target.bbox(), cell));

    let (points, used, fallback) = if route.follows_grid() {
        match route.compute_path(&ctx, start, end) {
            Ok(core) => (attach_anchors(source, &core, target), strategy.method(), false),
            Err(err) => {
                tracing::warn!(
                    connector = %request.id,
                    "routing fell back to a direct segment: {}",
                    err
                );
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::RoutingFallback,
                        format!("connector {}: {err}; drawn as a direct segment", request.id),
                    )
                    .involving([
                        request.source.component.as_str(),
                        request.target.component.as_str(),
                    ]),
                );
                (
                    vec![source.point, target.point],
                    RoutingMethod::ShortestPath,
                    true,
                )
            }
        }
    } else {
        (vec![source.point, target.point], strategy.method(), false)
    };

    // A curved style is smoothed whatever strategy produced the polyline.
    let finished = if job.style == ConnectorStyle::Curved {
        Curved::from_config(&config.routing, cell).finish(points)
    } else {
        route.finish(points)
    };
    let SmoothedPath {
        points,
        blends: obstacle_writes,
    } = finished;

    let length = path_length(&points);
    RouteOutcome {
        path: RoutedPath {
            id: request.id.clone(),
            source: request.source.component.clone(),
            target: request.target.component.clone(),
            points,
            style: job.style,
            strategy: used,
            crossings: 0,
            length,
            fallback,
        },
        issues,
        obstacle_writes,
    }
}

/// Spreads connectors that leave the same side of one component along that
/// side, ordered by where a straight line from the far end would meet it.
pub fn distribute_ports(jobs: &mut [RouteJob<'_>], cell: f32) {
    let mut shared: BTreeMap<(&str, EdgeSide), Vec<(usize, bool)>> = BTreeMap::new();
    for (idx, job) in jobs.iter().enumerate() {
        let (source, target) = (job.source, job.target);
        if job.source_anchor.spread {
            shared
                .entry((source.id.as_str(), job.source_anchor.side))
                .or_default()
                .push((idx, true));
        }
        if job.target_anchor.spread {
            shared
                .entry((target.id.as_str(), job.target_anchor.side))
                .or_default()
                .push((idx, false));
        }
    }

    for ((_, side), members) in shared {
        let Some(&(first, first_is_source)) = members.first() else {
            continue;
        };
        if members.len() < 2 {
            continue;
        }
        let owner = if first_is_source {
            jobs[first].source
        } else {
            jobs[first].target
        };
        let bbox = owner.bbox();
        let mut ordered: Vec<(f32, &str, usize, bool)> = members
            .iter()
            .map(|&(idx, is_source)| {
                let job = &jobs[idx];
                let (request, remote) = if is_source {
                    (job.request, job.target)
                } else {
                    (job.request, job.source)
                };
                let pos = ideal_port_pos(remote.bbox().center(), &bbox, side);
                (pos, request.id.as_str(), idx, is_source)
            })
            .collect();
        ordered.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
        });
        let slots = port_slots(&bbox, side, ordered.len(), cell);
        for ((_, _, idx, is_source), point) in ordered.into_iter().zip(slots) {
            let job = &mut jobs[idx];
            let anchor = if is_source {
                &mut job.source_anchor
            } else {
                &mut job.target_anchor
            };
            anchor.point = point;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingOutcome {
    pub paths: BTreeMap<String, RoutedPath>,
    pub issues: Vec<ValidationIssue>,
    /// Blend footprints to merge into the obstacle grid after the batch.
    pub obstacle_writes: Vec<BBox>,
    pub crossings: CrossingReport,
}

impl RoutingOutcome {
    /// Share of `requested` connectors routed without a fallback; skipped
    /// connectors count against it.
    pub fn routed_fraction(&self, requested: usize) -> f32 {
        if requested == 0 {
            return 1.0;
        }
        let direct = self.paths.values().filter(|p| !p.fallback).count();
        direct as f32 / requested as f32
    }
}

/// Routes every connection against one snapshot, in parallel, then reduces
/// crossings among the network-flow connectors.
pub fn route_all(
    connections: &[ConnectionRequest],
    components: &BTreeMap<String, ComponentLayout>,
    snapshot: &ObstacleSnapshot,
    config: &LayoutConfig,
) -> RoutingOutcome {
    let mut outcome = RoutingOutcome::default();
    let mut jobs = Vec::with_capacity(connections.len());
    for request in connections {
        let source = components.get(&request.source.component);
        let target = components.get(&request.target.component);
        let (Some(source), Some(target)) = (source, target) else {
            let missing: Vec<&str> = [&request.source.component, &request.target.component]
                .into_iter()
                .filter(|id| !components.contains_key(*id))
                .map(String::as_str)
                .collect();
            tracing::warn!(
                connector = %request.id,
                ?missing,
                "skipping connector with unplaced endpoint"
            );
            outcome.issues.push(
                ValidationIssue::warning(
                    IssueCode::UnresolvedConnector,
                    format!(
                        "connector {} skipped: component(s) {} not placed",
                        request.id,
                        missing.join(", ")
                    ),
                )
                .involving(missing),
            );
            continue;
        };
        let (style, allowed) = config.resolve_style(request.style);
        if !allowed {
            outcome.issues.push(ValidationIssue::warning(
                IssueCode::StyleNotAllowed,
                format!(
                    "connector {}: style {:?} not allowed, using {:?}",
                    request.id,
                    request.style.unwrap_or(config.default_style),
                    style
                ),
            ));
        }
        jobs.push(RouteJob::new(request, style, source, target));
    }
    distribute_ports(&mut jobs, snapshot.cell_size());

    let routed: Vec<RouteOutcome> = jobs
        .par_iter()
        .map(|job| route_job(job, snapshot, config))
        .collect();

    let mut eligible = HashSet::new();
    for result in routed {
        if result.path.strategy == RoutingMethod::NetworkFlow {
            eligible.insert(result.path.id.clone());
        }
        outcome.issues.extend(result.issues);
        outcome.obstacle_writes.extend(result.obstacle_writes);
        outcome.paths.insert(result.path.id.clone(), result.path);
    }

    outcome.crossings = if eligible.is_empty() {
        analyze_crossings(&outcome.paths)
    } else {
        reduce_crossings(
            &mut outcome.paths,
            &eligible,
            config.routing.reroute_offset,
            config.routing.max_reroute_passes,
        )
    };
    outcome
}

fn nearest_segment(points: &[Point], at: Point) -> Option<usize> {
    let mut best: Option<(f32, usize)> = None;
    for (idx, w) in points.windows(2).enumerate() {
        let (a, b) = (w[0], w[1]);
        let dx = b.0 - a.0;
        let dy = b.1 - a.1;
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq <= f32::EPSILON {
            0.0
        } else {
            (((at.0 - a.0) * dx + (at.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
        };
        let d = distance(at, (a.0 + t * dx, a.1 + t * dy));
        if best.is_none_or(|(bd, _)| d < bd) {
            best = Some((d, idx));
        }
    }
    best.map(|(_, idx)| idx)
}

/// Inserts a detour pair around `at` into the segment of `path` nearest to it.
fn insert_detour(path: &mut RoutedPath, at: Point, offset: f32) {
    let Some(idx) = nearest_segment(&path.points, at) else {
        return;
    };
    let a = path.points[idx];
    let b = path.points[idx + 1];
    let low = (at.0 - offset, at.1 - offset);
    let high = (at.0 + offset, at.1 + offset);
    let pair = if (b.0 - a.0) + (b.1 - a.1) >= 0.0 {
        [low, high]
    } else {
        [high, low]
    };
    path.points.splice(idx + 1..idx + 1, pair);
    path.length = path_length(&path.points);
}

/// Crossing reduction among `eligible` paths. Each pass detours the shorter
/// eligible path of every crossing pair; a pass that raises the total is
/// reverted and ends the loop.
pub fn reduce_crossings(
    paths: &mut BTreeMap<String, RoutedPath>,
    eligible: &HashSet<String>,
    offset: f32,
    max_passes: usize,
) -> CrossingReport {
    let mut report = analyze_crossings(paths);
    for pass in 0..max_passes {
        if report.total == 0 {
            break;
        }
        let saved = paths.clone();
        let mut changed = false;
        for crossing in &report.crossings {
            let a_ok = eligible.contains(&crossing.path_a);
            let b_ok = eligible.contains(&crossing.path_b);
            let chosen = match (a_ok, b_ok) {
                (false, false) => continue,
                (true, false) => &crossing.path_a,
                (false, true) => &crossing.path_b,
                (true, true) => {
                    let la = paths.get(&crossing.path_a).map_or(f32::MAX, |p| p.length);
                    let lb = paths.get(&crossing.path_b).map_or(f32::MAX, |p| p.length);
                    if lb < la { &crossing.path_b } else { &crossing.path_a }
                }
            };
            if let Some(path) = paths.get_mut(chosen) {
                insert_detour(path, crossing.point, offset);
                changed = true;
            }
        }
        if !changed {
            break;
        }
        let next = analyze_crossings(paths);
        tracing::debug!(
            pass,
            before = report.total,
            after = next.total,
            "crossing reduction pass"
        );
        if next.total > report.total {
            *paths = saved;
            break;
        }
        report = next;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Component, ConnectionPoint, Endpoint};
    use crate::layout::grid::ObstacleGrid;

    fn layout(id: &str, x: f32, y: f32, w: f32, h: f32) -> ComponentLayout {
        ComponentLayout::from_component(&Component::new(id, w, h), (x, y))
    }

    fn open_snapshot(size: f32) -> ObstacleSnapshot {
        ObstacleGrid::new(size, size, 1.0).snapshot()
    }

    #[test]
    fn astar_goes_straight_on_an_open_grid() {
        let snapshot = open_snapshot(10.0);
        let ctx = RouteContext::new(&snapshot, &RoutingConfig::default());
        let cells = astar(&ctx, (1, 1), (6, 1)).unwrap();
        assert_eq!(cells.first(), Some(&(1, 1)));
        assert_eq!(cells.last(), Some(&(6, 1)));
        assert_eq!(cells.len(), 6);
    }

    #[test]
    fn astar_detours_around_a_wall_with_one_bend_pair() {
        let mut grid = ObstacleGrid::new(10.0, 10.0, 1.0);
        for y in 0..=5 {
            grid.mark_obstacle((4, y));
        }
        let snapshot = grid.snapshot();
        let ctx = RouteContext::new(&snapshot, &RoutingConfig::default());
        let cells = astar(&ctx, (1, 1), (7, 1)).unwrap();
        assert!(cells.iter().all(|c| !snapshot.is_blocked(*c)));
        // 6 across plus 5 down and 5 back up.
        assert_eq!(cells.len() - 1, 16);
        let points = simplify_path(&cells_to_points(&snapshot, &cells));
        // Down, across, back up: the first move is free.
        assert_eq!(path_bend_count(&points), 2);
    }

    #[test]
    fn equal_cost_ties_pick_the_smallest_sequence() {
        let snapshot = open_snapshot(10.0);
        let ctx = RouteContext::new(&snapshot, &RoutingConfig::default());
        let first = astar(&ctx, (2, 2), (5, 6)).unwrap();
        let second = astar(&ctx, (2, 2), (5, 6)).unwrap();
        assert_eq!(first, second);
        let points = simplify_path(&cells_to_points(&snapshot, &first));
        assert_eq!(path_bend_count(&points), 1);
        // Of the two one-bend paths, stepping to (2, 3) first is smaller.
        assert_eq!(first[1], (2, 3));
    }

    #[test]
    fn astar_reports_unreachable_and_budget_failures() {
        let mut grid = ObstacleGrid::new(10.0, 10.0, 1.0);
        for y in 0..=10 {
            grid.mark_obstacle((5, y));
        }
        let snapshot = grid.snapshot();
        let ctx = RouteContext::new(&snapshot, &RoutingConfig::default());
        assert!(matches!(
            astar(&ctx, (1, 1), (8, 1)),
            Err(RoutingError::Unreachable { .. })
        ));

        let open = open_snapshot(50.0);
        let mut tight = RouteContext::new(&open, &RoutingConfig::default());
        tight.max_expansions = 3;
        assert_eq!(
            astar(&tight, (0, 0), (40, 40)),
            Err(RoutingError::BudgetExhausted { budget: 3 })
        );
        assert_eq!(
            astar(&tight, (0, 0), (99, 0)),
            Err(RoutingError::OutOfGrid((99, 0)))
        );
    }

    #[test]
    fn hierarchical_uses_a_mid_channel() {
        let snapshot = open_snapshot(20.0);
        let ctx = RouteContext::new(&snapshot, &RoutingConfig::default());
        let tb = Hierarchical {
            direction: Direction::TopBottom,
        };
        assert_eq!(
            tb.compute_path(&ctx, (2, 2), (8, 10)).unwrap(),
            vec![(2.0, 2.0), (2.0, 6.0), (8.0, 6.0), (8.0, 10.0)]
        );
        let lr = Hierarchical {
            direction: Direction::LeftRight,
        };
        assert_eq!(
            lr.compute_path(&ctx, (2, 2), (8, 10)).unwrap(),
            vec![(2.0, 2.0), (5.0, 2.0), (5.0, 10.0), (8.0, 10.0)]
        );
        assert_eq!(
            tb.compute_path(&ctx, (2, 2), (2, 9)).unwrap(),
            vec![(2.0, 2.0), (2.0, 9.0)]
        );
    }

    #[test]
    fn smoothing_keeps_endpoints_and_reports_blends() {
        let path = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)];
        for kind in [CurveKind::Quadratic, CurveKind::Cubic] {
            let smoothed = smooth_polyline(&path, kind, 6, 4.0);
            assert_eq!(smoothed.points.first(), Some(&(0.0, 0.0)));
            assert_eq!(smoothed.points.last(), Some(&(10.0, 10.0)));
            assert!(!smoothed.points.contains(&(10.0, 0.0)));
            assert_eq!(smoothed.blends.len(), 1);
            assert!(smoothed.blends[0].width <= 4.0 + 1e-4);
        }
    }

    #[test]
    fn anchors_resolve_custom_builtin_and_unknown_names() {
        let mut a = layout("a", 0.0, 0.0, 40.0, 20.0);
        a.connection_points.push(ConnectionPoint {
            name: "out".to_string(),
            relative_x: 1.0,
            relative_y: 0.25,
            angle: Some(90.0),
        });
        let b = layout("b", 200.0, 0.0, 40.0, 20.0);
        let (custom, unknown) = resolve_anchor(&a, Some("out"), &b, Direction::TopBottom);
        assert_eq!(custom.point, (40.0, 5.0));
        assert_eq!(custom.side, EdgeSide::Bottom);
        assert!(!unknown);
        let (top, _) = resolve_anchor(&a, Some("top"), &b, Direction::TopBottom);
        assert_eq!(top.point, (20.0, 0.0));
        let (auto, unknown) = resolve_anchor(&a, Some("nope"), &b, Direction::TopBottom);
        assert_eq!(auto.side, EdgeSide::Right);
        assert_eq!(auto.point, (40.0, 10.0));
        assert!(unknown);
    }

    #[test]
    fn routed_path_endpoints_match_anchors() {
        let mut grid = ObstacleGrid::new(400.0, 200.0, 10.0);
        let a = layout("a", 20.0, 20.0, 40.0, 40.0);
        let b = layout("b", 200.0, 120.0, 40.0, 40.0);
        let wall = BBox::new(100.0, 0.0, 20.0, 150.0);
        grid.mark_box(&a.bbox());
        grid.mark_box(&b.bbox());
        grid.mark_box(&wall);
        let snapshot = grid.snapshot();
        let config = LayoutConfig::default();
        let request = ConnectionRequest::new(
            "c0",
            Endpoint::new("a"),
            Endpoint::new("b"),
            RoutingMethod::AvoidObstacles,
        );
        let job = RouteJob::new(&request, ConnectorStyle::Orthogonal, &a, &b);
        let outcome = route_job(&job, &snapshot, &config);
        assert!(!outcome.path.fallback);
        let points = &outcome.path.points;
        assert_eq!(points.first(), Some(&(60.0, 40.0)));
        assert_eq!(points.last(), Some(&(200.0, 140.0)));
        for w in points.windows(2) {
            assert!(w[0].0 == w[1].0 || w[0].1 == w[1].1, "non-orthogonal segment {w:?}");
        }
        assert!(points.iter().all(|p| !wall.inflate(-1.0).contains(*p)));
    }

    #[test]
    fn exhausted_budget_falls_back_to_a_direct_segment() {
        let snapshot = ObstacleGrid::new(400.0, 400.0, 10.0).snapshot();
        let mut config = LayoutConfig::default();
        config.routing.max_expansions = 1;
        let a = layout("a", 20.0, 20.0, 40.0, 40.0);
        let b = layout("b", 300.0, 300.0, 40.0, 40.0);
        let request = ConnectionRequest::new(
            "c0",
            Endpoint::new("a"),
            Endpoint::new("b"),
            RoutingMethod::AvoidObstacles,
        );
        let job = RouteJob::new(&request, ConnectorStyle::Orthogonal, &a, &b);
        let outcome = route_job(&job, &snapshot, &config);
        assert!(outcome.path.fallback);
        assert_eq!(outcome.path.strategy, RoutingMethod::ShortestPath);
        assert_eq!(outcome.path.points.len(), 2);
        assert_eq!(outcome.issues[0].code, IssueCode::RoutingFallback);
    }

    #[test]
    fn missing_components_and_disallowed_styles_are_reported() {
        let snapshot = ObstacleGrid::new(400.0, 400.0, 10.0).snapshot();
        let mut config = LayoutConfig::default();
        config.connector_styles = vec![ConnectorStyle::Straight];
        let mut components = BTreeMap::new();
        components.insert("a".to_string(), layout("a", 20.0, 20.0, 40.0, 40.0));
        components.insert("b".to_string(), layout("b", 200.0, 20.0, 40.0, 40.0));
        let mut styled = ConnectionRequest::new(
            "c0",
            Endpoint::new("a"),
            Endpoint::new("b"),
            RoutingMethod::ShortestPath,
        );
        styled.style = Some(ConnectorStyle::Curved);
        let orphan = ConnectionRequest::new(
            "c1",
            Endpoint::new("a"),
            Endpoint::new("ghost"),
            RoutingMethod::ShortestPath,
        );
        let outcome = route_all(&[styled, orphan], &components, &snapshot, &config);
        assert_eq!(outcome.paths.len(), 1);
        assert_eq!(outcome.paths["c0"].style, ConnectorStyle::Straight);
        let codes: Vec<IssueCode> = outcome.issues.iter().map(|i| i.code).collect();
        assert!(codes.contains(&IssueCode::StyleNotAllowed));
        assert!(codes.contains(&IssueCode::UnresolvedConnector));
    }

    #[test]
    fn crossing_reduction_never_increases_crossings() {
        let mut paths = BTreeMap::new();
        let mk = |id: &str, points: Vec<Point>| RoutedPath {
            id: id.to_string(),
            source: "s".to_string(),
            target: "t".to_string(),
            length: path_length(&points),
            points,
            style: ConnectorStyle::Straight,
            strategy: RoutingMethod::NetworkFlow,
            crossings: 0,
            fallback: false,
        };
        paths.insert("p".to_string(), mk("p", vec![(0.0, 0.0), (20.0, 20.0)]));
        paths.insert("q".to_string(), mk("q", vec![(0.0, 20.0), (20.0, 0.0)]));
        let before = analyze_crossings(&paths).total;
        let eligible: HashSet<String> = ["p".to_string(), "q".to_string()].into_iter().collect();
        let report = reduce_crossings(&mut paths, &eligible, 0.25, 5);
        assert!(report.total <= before);
        assert_eq!(report.total, analyze_crossings(&paths).total);
        assert!(paths.values().all(|p| p.points.len() >= 2));
    }

    #[test]
    fn angles_map_to_cardinal_sides() {
        assert_eq!(EdgeSide::from_angle(0.0), EdgeSide::Right);
        assert_eq!(EdgeSide::from_angle(90.0), EdgeSide::Bottom);
        assert_eq!(EdgeSide::from_angle(180.0), EdgeSide::Left);
        assert_eq!(EdgeSide::from_angle(-90.0), EdgeSide::Top);
        assert_eq!(EdgeSide::from_angle(350.0), EdgeSide::Right);
    }

    /// Samples each segment so a crossing of the box interior is caught even
    /// when both segment ends lie outside it.
    fn segments_enter(points: &[Point], bbox: &BBox) -> bool {
        points.windows(2).any(|w| {
            (0..=40).any(|step| {
                let t = step as f32 / 40.0;
                let p = (w[0].0 + (w[1].0 - w[0].0) * t, w[0].1 + (w[1].1 - w[0].1) * t);
                bbox.contains(p)
            })
        })
    }

    #[test]
    fn connectors_route_around_their_own_endpoint_bodies() {
        let mut grid = ObstacleGrid::new(800.0, 600.0, 10.0);
        let a = layout("a", 100.0, 300.0, 100.0, 60.0);
        let b = layout("b", 400.0, 300.0, 100.0, 60.0);
        grid.mark_box(&a.bbox());
        grid.mark_box(&b.bbox());
        let snapshot = grid.snapshot();
        let config = LayoutConfig::default();
        let request = ConnectionRequest::new(
            "c0",
            Endpoint::new("a"),
            Endpoint::with_anchor("b", "right"),
            RoutingMethod::AvoidObstacles,
        );
        let job = RouteJob::new(&request, ConnectorStyle::Orthogonal, &a, &b);
        let outcome = route_job(&job, &snapshot, &config);
        assert!(!outcome.path.fallback);
        let points = &outcome.path.points;
        assert_eq!(points.first(), Some(&(200.0, 330.0)));
        assert_eq!(points.last(), Some(&(500.0, 330.0)));
        assert!(!segments_enter(points, &a.bbox().inflate(-1.0)), "{points:?} enters a");
        assert!(!segments_enter(points, &b.bbox().inflate(-1.0)), "{points:?} enters b");
    }

    #[test]
    fn corner_to_corner_on_an_open_full_hd_grid() {
        let snapshot = ObstacleGrid::new(1920.0, 1080.0, 2.0).snapshot();
        let config = RoutingConfig::default();
        let ctx = RouteContext::new(&snapshot, &config);
        let cells = astar(&ctx, (10, 10), (900, 500)).unwrap();
        assert_eq!(cells.len(), 890 + 490 + 1);
        let points = simplify_path(&cells_to_points(&snapshot, &cells));
        assert_eq!(path_bend_count(&points), 1);

        let a = layout("a", 0.0, 0.0, 20.0, 20.0);
        let b = layout("b", 1880.0, 1040.0, 20.0, 20.0);
        let request = ConnectionRequest::new(
            "c0",
            Endpoint::new("a"),
            Endpoint::new("b"),
            RoutingMethod::AvoidObstacles,
        );
        let job = RouteJob::new(&request, ConnectorStyle::Orthogonal, &a, &b);
        let outcome = route_job(&job, &snapshot, &LayoutConfig::default());
        assert!(!outcome.path.fallback, "issues: {:?}", outcome.issues);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn expired_deadline_downgrades_to_shortest_path() {
        let snapshot = ObstacleGrid::new(1920.0, 1080.0, 2.0).snapshot();
        let mut ctx = RouteContext::new(&snapshot, &RoutingConfig::default());
        ctx.deadline = Some(Instant::now());
        assert!(matches!(
            astar(&ctx, (10, 10), (900, 500)),
            Err(RoutingError::Timeout { .. })
        ));

        let mut config = LayoutConfig::default();
        config.routing.timeout_ms = Some(0);
        let a = layout("a", 0.0, 0.0, 20.0, 20.0);
        let b = layout("b", 1880.0, 1040.0, 20.0, 20.0);
        let request = ConnectionRequest::new(
            "c0",
            Endpoint::new("a"),
            Endpoint::new("b"),
            RoutingMethod::AvoidObstacles,
        );
        let job = RouteJob::new(&request, ConnectorStyle::Orthogonal, &a, &b);
        let outcome = route_job(&job, &snapshot, &config);
        assert!(outcome.path.fallback);
        assert_eq!(outcome.path.strategy, RoutingMethod::ShortestPath);
        assert_eq!(outcome.path.points, vec![(20.0, 10.0), (1880.0, 1050.0)]);
        let issue = &outcome.issues[0];
        assert_eq!(issue.code, IssueCode::RoutingFallback);
        assert!(issue.message.contains("timed out"), "{}", issue.message);
    }

    #[test]
    fn oversized_grids_fall_back_without_searching() {
        let snapshot = ObstacleGrid::with_limit(400.0, 400.0, 10.0, 100).snapshot();
        let ctx = RouteContext::new(&snapshot, &RoutingConfig::default());
        assert_eq!(
            astar(&ctx, (1, 1), (5, 5)),
            Err(RoutingError::GridTooLarge {
                cells: 41 * 41,
                limit: 100
            })
        );
    }

    #[test]
    fn shared_sides_spread_ports_in_remote_order() {
        let hub = layout("hub", 20.0, 200.0, 120.0, 80.0);
        let a = layout("a", 300.0, 100.0, 100.0, 60.0);
        let b = layout("b", 300.0, 220.0, 100.0, 60.0);
        let c = layout("c", 300.0, 340.0, 100.0, 60.0);
        let requests: Vec<ConnectionRequest> = ["c", "a", "b"]
            .iter()
            .map(|id| {
                ConnectionRequest::new(
                    &format!("to_{id}"),
                    Endpoint::new("hub"),
                    Endpoint::new(*id),
                    RoutingMethod::AvoidObstacles,
                )
            })
            .collect();
        let remotes = [&c, &a, &b];
        let mut jobs: Vec<RouteJob<'_>> = requests
            .iter()
            .zip(remotes)
            .map(|(r, remote)| RouteJob::new(r, ConnectorStyle::Orthogonal, &hub, remote))
            .collect();
        distribute_ports(&mut jobs, 10.0);
        let ports: Vec<Point> = jobs.iter().map(|j| j.source_anchor.point).collect();
        assert_eq!(ports, vec![(140.0, 260.0), (140.0, 220.0), (140.0, 240.0)]);
        // Each remote end is alone on its side and keeps the midpoint.
        assert_eq!(jobs[1].target_anchor.point, (300.0, 130.0));
    }

    #[test]
    fn fixed_anchors_are_not_spread() {
        let hub = layout("hub", 0.0, 0.0, 100.0, 100.0);
        let a = layout("a", 300.0, 0.0, 40.0, 40.0);
        let b = layout("b", 300.0, 60.0, 40.0, 40.0);
        let first = ConnectionRequest::new(
            "c0",
            Endpoint::with_anchor("hub", "center"),
            Endpoint::new("a"),
            RoutingMethod::AvoidObstacles,
        );
        let second = ConnectionRequest::new(
            "c1",
            Endpoint::with_anchor("hub", "center"),
            Endpoint::new("b"),
            RoutingMethod::AvoidObstacles,
        );
        let mut jobs = vec![
            RouteJob::new(&first, ConnectorStyle::Orthogonal, &hub, &a),
            RouteJob::new(&second, ConnectorStyle::Orthogonal, &hub, &b),
        ];
        distribute_ports(&mut jobs, 10.0);
        assert!(jobs.iter().all(|j| j.source_anchor.point == (50.0, 50.0)));
    }

    #[test]
    fn network_flow_batches_reduce_crossings() {
        let snapshot = ObstacleGrid::new(600.0, 600.0, 10.0).snapshot();
        let config = LayoutConfig::default();
        let mut components = BTreeMap::new();
        for (id, x, y) in [
            ("a", 100.0, 100.0),
            ("b", 400.0, 100.0),
            ("c", 100.0, 400.0),
            ("d", 400.0, 400.0),
        ] {
            components.insert(id.to_string(), layout(id, x, y, 60.0, 40.0));
        }
        let diagonals = |method: RoutingMethod| {
            vec![
                ConnectionRequest::new("ad", Endpoint::new("a"), Endpoint::new("d"), method),
                ConnectionRequest::new("bc", Endpoint::new("b"), Endpoint::new("c"), method),
            ]
        };
        let direct = route_all(
            &diagonals(RoutingMethod::ShortestPath),
            &components,
            &snapshot,
            &config,
        );
        assert_eq!(direct.crossings.total, 1);
        let plain = route_all(
            &diagonals(RoutingMethod::AvoidObstacles),
            &components,
            &snapshot,
            &config,
        );
        let flow = route_all(
            &diagonals(RoutingMethod::NetworkFlow),
            &components,
            &snapshot,
            &config,
        );
        assert!(flow.crossings.total <= plain.crossings.total);
        assert_eq!(flow.crossings, analyze_crossings(&flow.paths));
        assert!(
            flow.paths
                .values()
                .all(|p| p.strategy == RoutingMethod::NetworkFlow && !p.fallback)
        );
    }

    #[test]
    fn curved_batches_buffer_blend_footprints() {
        let mut grid = ObstacleGrid::new(600.0, 400.0, 10.0);
        let mut components = BTreeMap::new();
        components.insert("a".to_string(), layout("a", 40.0, 40.0, 60.0, 40.0));
        components.insert("b".to_string(), layout("b", 400.0, 300.0, 60.0, 40.0));
        for component in components.values() {
            grid.mark_box(&component.bbox());
        }
        let before = grid.blocked_count();
        let snapshot = grid.snapshot();
        let mut request = ConnectionRequest::new(
            "c0",
            Endpoint::new("a"),
            Endpoint::new("b"),
            RoutingMethod::AvoidObstacles,
        );
        request.style = Some(ConnectorStyle::Curved);
        let outcome = route_all(&[request], &components, &snapshot, &LayoutConfig::default());
        assert!(!outcome.obstacle_writes.is_empty());
        assert_eq!(outcome.paths["c0"].style, ConnectorStyle::Curved);
        // Writes are buffered; the shared snapshot is untouched.
        assert_eq!(snapshot.grid().blocked_count(), before);
        for bbox in &outcome.obstacle_writes {
            grid.mark_box(bbox);
        }
        assert!(grid.blocked_count() > before);
    }
}
