use std::collections::HashSet;

use crate::config::LayoutConfig;
use crate::ir::Component;

use super::error::GeometryError;
use super::grid::{BBox, ObstacleGrid};
use super::hints::LayoutHints;
use super::types::{Canvas, ComponentLayout, Point};

/// Tolerance applied when comparing gaps against the minimum distance.
const SPACING_EPS: f32 = 1e-3;

#[derive(Debug, Clone, Default)]
pub struct PlacementOutcome {
    /// Placed components in input order.
    pub placed: Vec<ComponentLayout>,
    pub errors: Vec<GeometryError>,
}

impl PlacementOutcome {
    pub fn placed_fraction(&self) -> f32 {
        let total = self.placed.len() + self.errors.len();
        if total == 0 {
            1.0
        } else {
            self.placed.len() as f32 / total as f32
        }
    }
}

struct Placer<'a> {
    canvas: &'a Canvas,
    config: &'a LayoutConfig,
    accepted: Vec<BBox>,
}

impl<'a> Placer<'a> {
    fn new(canvas: &'a Canvas, config: &'a LayoutConfig) -> Self {
        Self {
            canvas,
            config,
            accepted: Vec::new(),
        }
    }

    fn min_distance(&self) -> f32 {
        self.config.min_component_distance.max(0.0)
    }

    fn is_free(&self, bbox: &BBox) -> bool {
        let min = self.min_distance();
        self.canvas.fits(bbox)
            && self
                .accepted
                .iter()
                .all(|other| bbox.gap(other) + SPACING_EPS >= min)
    }

    fn accept(&mut self, bbox: BBox) {
        self.accepted.push(bbox);
    }

    /// Nearest free grid-aligned slot to `origin`, scanned in rings of growing
    /// Chebyshev radius.
    fn nearest_slot(&self, origin: Point, width: f32, height: f32) -> Option<Point> {
        let cell = self.canvas.grid_cell;
        let inner = self.canvas.inner_bounds();
        let min_ix = (inner.x / cell).ceil() as i32;
        let min_iy = (inner.y / cell).ceil() as i32;
        let max_ix = ((inner.right() - width) / cell).floor() as i32;
        let max_iy = ((inner.bottom() - height) / cell).floor() as i32;
        if max_ix < min_ix || max_iy < min_iy {
            return None;
        }
        let ox = ((origin.0 / cell).round() as i32).clamp(min_ix, max_ix);
        let oy = ((origin.1 / cell).round() as i32).clamp(min_iy, max_iy);
        let max_radius = (max_ix - min_ix).max(max_iy - min_iy) + 1;
        for radius in 0..=max_radius {
            let mut best: Option<(i64, i32, i32)> = None;
            for iy in (oy - radius).max(min_iy)..=(oy + radius).min(max_iy) {
                for ix in (ox - radius).max(min_ix)..=(ox + radius).min(max_ix) {
                    let dx = ix - ox;
                    let dy = iy - oy;
                    if dx.abs().max(dy.abs()) != radius {
                        continue;
                    }
                    let candidate = BBox::new(ix as f32 * cell, iy as f32 * cell, width, height);
                    if !self.is_free(&candidate) {
                        continue;
                    }
                    let dist = (dx as i64) * (dx as i64) + (dy as i64) * (dy as i64);
                    if best.is_none_or(|(d, _, _)| dist < d) {
                        best = Some((dist, ix, iy));
                    }
                }
            }
            if let Some((_, ix, iy)) = best {
                return Some((ix as f32 * cell, iy as f32 * cell));
            }
        }
        None
    }
}

fn ceil_to_grid(value: f32, cell: f32) -> f32 {
    (value / cell - 1e-4).ceil() * cell
}

fn dedupe<'c>(components: &'c [Component], errors: &mut Vec<GeometryError>) -> Vec<&'c Component> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(components.len());
    for component in components {
        if !seen.insert(component.id.as_str()) {
            errors.push(GeometryError::DuplicateId(component.id.clone()));
            continue;
        }
        let size = component.size;
        let degenerate = !(size.width.is_finite()
            && size.height.is_finite()
            && size.width > 0.0
            && size.height > 0.0);
        if degenerate {
            errors.push(GeometryError::DegenerateSize {
                id: component.id.clone(),
                width: size.width,
                height: size.height,
            });
            continue;
        }
        out.push(component);
    }
    out
}

fn does_not_fit(component: &Component) -> GeometryError {
    GeometryError::DoesNotFit {
        id: component.id.clone(),
        width: component.size.width,
        height: component.size.height,
    }
}

/// Initial placement. Valid upstream positions are kept; the rest are laid out
/// row-major from the top-left margin, falling back to a nearest-slot search.
/// Every placed footprint is marked in `grid`.
pub fn place_components(
    components: &[Component],
    hints: Option<&LayoutHints>,
    canvas: &Canvas,
    config: &LayoutConfig,
    grid: &mut ObstacleGrid,
) -> PlacementOutcome {
    let mut outcome = PlacementOutcome::default();
    let valid = dedupe(components, &mut outcome.errors);
    let mut placer = Placer::new(canvas, config);
    let mut positions: Vec<Option<Point>> = vec![None; valid.len()];

    for (idx, component) in valid.iter().enumerate() {
        let Some((x, y)) = component.position else {
            continue;
        };
        if !(x.is_finite() && y.is_finite()) {
            continue;
        }
        let bbox = BBox::new(x, y, component.size.width, component.size.height);
        if placer.is_free(&bbox) {
            placer.accept(bbox);
            positions[idx] = Some((x, y));
        }
    }

    let ids: Vec<&str> = valid.iter().map(|c| c.id.as_str()).collect();
    let order: Vec<usize> = match hints {
        Some(hints) => hints
            .order(&ids)
            .into_iter()
            .filter_map(|id| ids.iter().position(|candidate| *candidate == id))
            .collect(),
        None => (0..valid.len()).collect(),
    };

    let cell = canvas.grid_cell;
    let min = placer.min_distance();
    let inner = canvas.inner_bounds();
    let mut cursor = (ceil_to_grid(inner.x, cell), ceil_to_grid(inner.y, cell));
    let mut row_height = 0.0f32;
    let mut pending_gap = 0.0f32;
    let mut prev_group: Option<Option<usize>> = None;

    for idx in order {
        if positions[idx].is_some() {
            continue;
        }
        let component = valid[idx];
        let (width, height) = (component.size.width, component.size.height);
        if let Some(origin) = component.position.filter(|p| p.0.is_finite() && p.1.is_finite()) {
            match placer.nearest_slot(origin, width, height) {
                Some(position) => {
                    placer.accept(BBox::new(position.0, position.1, width, height));
                    positions[idx] = Some(position);
                }
                None => outcome.errors.push(does_not_fit(component)),
            }
            continue;
        }
        let own_gap = hints
            .and_then(|h| h.spacing_for(&component.id))
            .map_or(min, |s| s.max(min));
        let group = hints.and_then(|h| h.group_of(&component.id));
        let boundary = prev_group.is_some_and(|prev| prev != group);
        let mut gap = pending_gap.max(own_gap);
        if boundary {
            gap = gap.max(config.shape_spacing.horizontal);
        }

        let mut x = if row_height > 0.0 {
            ceil_to_grid(cursor.0 + gap, cell)
        } else {
            cursor.0
        };
        let mut y = cursor.1;
        if row_height > 0.0 && x + width > inner.right() {
            let row_gap = if boundary {
                min.max(config.shape_spacing.vertical)
            } else {
                min
            };
            x = ceil_to_grid(inner.x, cell);
            y = ceil_to_grid(cursor.1 + row_height + row_gap, cell);
            cursor.1 = y;
            row_height = 0.0;
        }

        let candidate = BBox::new(x, y, width, height);
        let position = if placer.is_free(&candidate) {
            Some((x, y))
        } else {
            placer.nearest_slot((x, y), width, height)
        };

        let Some(position) = position else {
            tracing::debug!(component = %component.id, "no free slot for component");
            outcome.errors.push(does_not_fit(component));
            continue;
        };
        placer.accept(BBox::new(position.0, position.1, width, height));
        positions[idx] = Some(position);
        if (position.0 - x).abs() < f32::EPSILON && (position.1 - y).abs() < f32::EPSILON {
            cursor.0 = x + width;
            row_height = row_height.max(height);
            pending_gap = own_gap;
            prev_group = Some(group);
        }
    }

    for (idx, component) in valid.iter().enumerate() {
        if let Some(position) = positions[idx] {
            let layout = ComponentLayout::from_component(component, position);
            grid.mark_box(&layout.bbox());
            outcome.placed.push(layout);
        }
    }
    outcome
}

/// Re-placement after nudging: each component keeps its grid-snapped position
/// when that is valid against the components accepted before it, else moves to
/// the nearest free slot.
pub fn adjust_components(
    current: &[ComponentLayout],
    canvas: &Canvas,
    config: &LayoutConfig,
    grid: &mut ObstacleGrid,
) -> PlacementOutcome {
    let mut outcome = PlacementOutcome::default();
    let mut placer = Placer::new(canvas, config);
    for component in current {
        let snapped = grid.snap((component.x, component.y));
        let candidate = BBox::new(snapped.0, snapped.1, component.width, component.height);
        let position = if placer.is_free(&candidate) {
            Some(snapped)
        } else {
            placer.nearest_slot(snapped, component.width, component.height)
        };
        let Some(position) = position else {
            outcome.errors.push(GeometryError::DoesNotFit {
                id: component.id.clone(),
                width: component.width,
                height: component.height,
            });
            continue;
        };
        let mut layout = component.clone();
        layout.x = position.0;
        layout.y = position.1;
        placer.accept(layout.bbox());
        grid.mark_box(&layout.bbox());
        outcome.placed.push(layout);
    }
    outcome
}
