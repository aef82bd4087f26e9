use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::Point;

pub type Cell = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.0, first.1, first.0, first.1);
        for p in &points[1..] {
            min_x = min_x.min(p.0);
            min_y = min_y.min(p.1);
            max_x = max_x.max(p.0);
            max_y = max_y.max(p.1);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn inflate(&self, pad: f32) -> Self {
        Self::new(
            self.x - pad,
            self.y - pad,
            self.width + 2.0 * pad,
            self.height + 2.0 * pad,
        )
    }

    pub fn contains(&self, point: Point) -> bool {
        point.0 >= self.x
            && point.0 <= self.right()
            && point.1 >= self.y
            && point.1 <= self.bottom()
    }

    /// Euclidean distance between the closest edges; zero when touching or overlapping.
    pub fn gap(&self, other: &BBox) -> f32 {
        let dx = (other.x - self.right()).max(self.x - other.right()).max(0.0);
        let dy = (other.y - self.bottom()).max(self.y - other.bottom()).max(0.0);
        (dx * dx + dy * dy).sqrt()
    }
}

pub fn distance(a: Point, b: Point) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

/// True when the boxes share more than `epsilon` on both axes.
pub fn overlap(a: &BBox, b: &BBox, epsilon: f32) -> bool {
    let x_overlap = a.right().min(b.right()) - a.x.max(b.x);
    let y_overlap = a.bottom().min(b.bottom()) - a.y.max(b.y);
    x_overlap > epsilon && y_overlap > epsilon
}

/// Default cap on grid intersections.
pub const MAX_GRID_CELLS: usize = 4_000_000;

/// Occupancy over grid intersections `0..=width/cell` x `0..=height/cell`.
///
/// A grid over its cell limit keeps its geometry (snapping, cell conversion)
/// but holds no occupancy and cannot be searched.
#[derive(Debug, Clone)]
pub struct ObstacleGrid {
    cell: f32,
    cols: i32,
    rows: i32,
    max_cells: usize,
    routable: bool,
    blocked: Vec<bool>,
}

fn axis_len(extent: f32, cell: f32) -> i32 {
    let steps = (f64::from(extent.max(0.0)) / f64::from(cell))
        .floor()
        .min(f64::from(i32::MAX - 1));
    steps as i32 + 1
}

impl ObstacleGrid {
    pub fn new(width: f32, height: f32, cell: f32) -> Self {
        Self::with_limit(width, height, cell, MAX_GRID_CELLS)
    }

    pub fn with_limit(width: f32, height: f32, cell: f32, max_cells: usize) -> Self {
        let cell = if cell.is_finite() && cell > 0.0 { cell } else { 1.0 };
        let cols = axis_len(width, cell);
        let rows = axis_len(height, cell);
        let cells = cols as u64 * rows as u64;
        let routable = cells <= max_cells as u64 && cells <= i32::MAX as u64;
        if !routable {
            tracing::warn!(cols, rows, max_cells, "obstacle grid exceeds its cell limit");
        }
        Self {
            cell,
            cols,
            rows,
            max_cells,
            routable,
            blocked: if routable {
                vec![false; cells as usize]
            } else {
                Vec::new()
            },
        }
    }

    pub fn is_routable(&self) -> bool {
        self.routable
    }

    pub fn cell_count(&self) -> u64 {
        self.cols as u64 * self.rows as u64
    }

    pub fn max_cells(&self) -> usize {
        self.max_cells
    }

    pub fn cell_size(&self) -> f32 {
        self.cell
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn snap(&self, point: Point) -> Point {
        snap_to(point, self.cell)
    }

    pub fn cell_of(&self, point: Point) -> Cell {
        (
            (point.0 / self.cell).round() as i32,
            (point.1 / self.cell).round() as i32,
        )
    }

    pub fn point_of(&self, cell: Cell) -> Point {
        (cell.0 as f32 * self.cell, cell.1 as f32 * self.cell)
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.0 >= 0 && cell.1 >= 0 && cell.0 < self.cols && cell.1 < self.rows
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        (self.routable && self.in_bounds(cell))
            .then(|| cell.1 as usize * self.cols as usize + cell.0 as usize)
    }

    pub fn mark_obstacle(&mut self, cell: Cell) {
        if let Some(idx) = self.index(cell) {
            self.blocked[idx] = true;
        }
    }

    pub fn is_blocked(&self, cell: Cell) -> bool {
        self.index(cell).is_some_and(|idx| self.blocked[idx])
    }

    /// Marks every intersection inside the closed box.
    pub fn mark_box(&mut self, bbox: &BBox) {
        if !self.routable {
            return;
        }
        for cell in cells_in_box(bbox, self.cell, self.cols, self.rows) {
            self.mark_obstacle(cell);
        }
    }

    pub fn clear(&mut self) {
        self.blocked.iter_mut().for_each(|b| *b = false);
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.iter().filter(|b| **b).count()
    }

    pub fn snapshot(&self) -> ObstacleSnapshot {
        ObstacleSnapshot {
            grid: Arc::new(self.clone()),
        }
    }
}

/// Read-only copy of an obstacle grid, shared by every routing task of a batch.
#[derive(Debug, Clone)]
pub struct ObstacleSnapshot {
    grid: Arc<ObstacleGrid>,
}

impl ObstacleSnapshot {
    pub fn grid(&self) -> &ObstacleGrid {
        &self.grid
    }

    pub fn is_blocked(&self, cell: Cell) -> bool {
        self.grid.is_blocked(cell)
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        self.grid.in_bounds(cell)
    }

    pub fn cell_of(&self, point: Point) -> Cell {
        self.grid.cell_of(point)
    }

    pub fn point_of(&self, cell: Cell) -> Point {
        self.grid.point_of(cell)
    }

    pub fn cell_size(&self) -> f32 {
        self.grid.cell
    }

    pub fn cols(&self) -> i32 {
        self.grid.cols
    }

    pub fn rows(&self) -> i32 {
        self.grid.rows
    }

    pub fn is_routable(&self) -> bool {
        self.grid.routable
    }
}

pub fn snap_to(point: Point, cell: f32) -> Point {
    (
        (point.0 / cell).round() * cell,
        (point.1 / cell).round() * cell,
    )
}

/// Intersections covered by the closed box, clipped to the grid.
fn cells_in_box(bbox: &BBox, cell: f32, cols: i32, rows: i32) -> Vec<Cell> {
    if !(bbox.x.is_finite() && bbox.y.is_finite() && bbox.width >= 0.0 && bbox.height >= 0.0) {
        return Vec::new();
    }
    let start_x = ((bbox.x / cell).ceil() as i32).max(0);
    let end_x = ((bbox.right() / cell).floor() as i32).min(cols - 1);
    let start_y = ((bbox.y / cell).ceil() as i32).max(0);
    let end_y = ((bbox.bottom() / cell).floor() as i32).min(rows - 1);
    let mut cells = Vec::new();
    for iy in start_y..=end_y {
        for ix in start_x..=end_x {
            cells.push((ix, iy));
        }
    }
    cells
}
