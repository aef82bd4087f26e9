pub mod crossing;
pub mod error;
pub mod grid;
pub mod hints;
pub mod placement;
pub mod routing;
pub(crate) mod types;
pub mod validation;

pub use crossing::{
    analyze_crossings, apply_counts, segment_intersection, segments_intersect,
};
pub use error::{GeometryError, RefinementExhausted, RoutingError, ValidationError};
pub use grid::{BBox, Cell, ObstacleGrid, ObstacleSnapshot};
pub use hints::{LayoutHints, resolve_hints};
pub use routing::{RouteStrategy, RoutingStrategy};
pub use types::*;
pub use validation::{Rule, ValidationContext, Validator};

use crate::config::LayoutConfig;
use crate::ir::{ConnectionRequest, DiagramRequest, RoutingMethod};
use crate::parser::normalize_connection_ids;
use crate::theme::Theme;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use placement::{adjust_components, place_components};
use routing::route_all;

/// Cooperative cancellation shared between a caller and a running layout.
/// Checked at every refinement state transition.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementState {
    Placing,
    Routing,
    Validating,
    Converged,
    Exhausted,
}

pub fn compute_layout(request: &DiagramRequest, config: &LayoutConfig) -> LayoutPlan {
    compute_layout_with_cancel(request, config, &CancellationToken::new())
}

pub fn compute_layout_with_cancel(
    request: &DiagramRequest,
    config: &LayoutConfig,
    cancel: &CancellationToken,
) -> LayoutPlan {
    compute_layout_with_validator(request, config, &Validator::with_default_rules(), cancel)
}

/// Runs placement, routing and validation until the plan passes, the
/// iteration budget runs out, or an iteration can change nothing. Never
/// fails: dropped components, routing fallbacks and skipped rules all
/// surface as issues on the returned plan.
pub fn compute_layout_with_validator(
    request: &DiagramRequest,
    config: &LayoutConfig,
    validator: &Validator,
    cancel: &CancellationToken,
) -> LayoutPlan {
    let canvas = Canvas::from_config(&config.canvas, request.canvas.as_ref());
    let theme = Theme::default();
    let mut connections = normalize_connection_ids(&request.connections);
    let max_iterations = config.max_iterations.max(1);
    let known: HashSet<&str> = request.components.iter().map(|c| c.id.as_str()).collect();
    let hints = resolve_hints(request.hints.as_ref(), &known);

    let mut grid = ObstacleGrid::with_limit(
        canvas.width,
        canvas.height,
        canvas.grid_cell,
        config.routing.max_grid_cells,
    );
    let mut plan = LayoutPlan::new(canvas);
    let mut best: Option<LayoutPlan> = None;
    // Placed components in input order; adjust mode re-places them in this order.
    let mut current: Vec<ComponentLayout> = Vec::new();
    let mut dropped: Vec<ValidationIssue> = Vec::new();
    let mut placed_fraction = 1.0;
    let mut routing_issues: Vec<ValidationIssue> = Vec::new();
    let mut routed_fraction = 1.0;
    let mut state = RefinementState::Placing;

    loop {
        if cancel.is_cancelled() {
            return cancelled(plan, best);
        }
        tracing::debug!(?state, iteration = plan.iterations, "refinement transition");
        state = match state {
            RefinementState::Placing => {
                plan.iterations += 1;
                let outcome = if plan.iterations == 1 {
                    place_components(
                        &request.components,
                        hints.as_ref(),
                        &canvas,
                        config,
                        &mut grid,
                    )
                } else {
                    grid.clear();
                    adjust_components(&current, &canvas, config, &mut grid)
                };
                dropped.extend(outcome.errors.iter().map(GeometryError::to_issue));
                if plan.iterations == 1 {
                    placed_fraction = outcome.placed_fraction();
                } else if !outcome.errors.is_empty() {
                    let total = current.len().max(1) as f32;
                    placed_fraction *= outcome.placed.len() as f32 / total;
                }
                plan.components = outcome
                    .placed
                    .iter()
                    .map(|c| (c.id.clone(), c.clone()))
                    .collect();
                current = outcome.placed;
                RefinementState::Routing
            }
            RefinementState::Routing => {
                let snapshot = grid.snapshot();
                let mut routed = route_all(&connections, &plan.components, &snapshot, config);
                apply_counts(&mut routed.paths, &routed.crossings);
                for bbox in &routed.obstacle_writes {
                    grid.mark_box(bbox);
                }
                routed_fraction = routed.routed_fraction(connections.len());
                plan.paths = routed.paths;
                plan.crossings = routed.crossings;
                routing_issues = routed.issues;
                RefinementState::Validating
            }
            RefinementState::Validating => {
                let ctx = ValidationContext {
                    canvas: &canvas,
                    components: &plan.components,
                    paths: &plan.paths,
                    text_elements: &request.text_elements,
                    crossings: &plan.crossings,
                    config,
                    theme: &theme,
                };
                let mut prior = dropped.clone();
                prior.extend(routing_issues.iter().cloned());
                let report = validator.validate(&ctx, prior);
                plan.issues = report.issues;
                plan.score = report.score;
                plan.passed = report.passed;
                plan.confidence = Confidence {
                    component_placement: placed_fraction,
                    connection_routing: routed_fraction,
                    overall_layout: plan.score / 100.0,
                };
                log_confidence(&plan.confidence, config);
                if best.as_ref().is_none_or(|b| is_better(&plan, b)) {
                    best = Some(plan.clone());
                }
                if plan.passed {
                    RefinementState::Converged
                } else if plan.iterations >= max_iterations {
                    RefinementState::Exhausted
                } else {
                    let nudged = nudge(&current, &plan.issues, &canvas, config.nudge_offset);
                    let moved = nudged
                        .iter()
                        .zip(&current)
                        .any(|(n, c)| (n.x, n.y) != (c.x, c.y));
                    let promoted = promote_crossing_connectors(&mut connections, &plan);
                    current = nudged;
                    if moved || promoted > 0 {
                        RefinementState::Placing
                    } else {
                        tracing::debug!(
                            iteration = plan.iterations,
                            "refinement stalled: no component moved and no connector promoted"
                        );
                        RefinementState::Exhausted
                    }
                }
            }
            RefinementState::Converged => {
                plan.status = PlanStatus::Converged;
                tracing::info!(
                    iterations = plan.iterations,
                    score = plan.score,
                    "layout converged"
                );
                return plan;
            }
            RefinementState::Exhausted => {
                plan.issues.push(
                    RefinementExhausted {
                        iterations: plan.iterations,
                    }
                    .to_issue(),
                );
                plan.score = validation::score(&plan.issues, config);
                plan.status = PlanStatus::Exhausted;
                tracing::info!(
                    iterations = plan.iterations,
                    score = plan.score,
                    errors = plan.count(Severity::Error),
                    "layout exhausted without passing"
                );
                return plan;
            }
        };
    }
}

fn cancelled(current: LayoutPlan, best: Option<LayoutPlan>) -> LayoutPlan {
    let mut plan = best.unwrap_or(current);
    plan.status = PlanStatus::Cancelled;
    tracing::info!(iterations = plan.iterations, "layout cancelled");
    plan
}

fn is_better(candidate: &LayoutPlan, best: &LayoutPlan) -> bool {
    (candidate.passed, candidate.score) > (best.passed, best.score)
}

fn log_confidence(confidence: &Confidence, config: &LayoutConfig) {
    let min = &config.min_confidence;
    let stages = [
        ("component_placement", confidence.component_placement, min.component_placement),
        ("connection_routing", confidence.connection_routing, min.connection_routing),
        ("overall_layout", confidence.overall_layout, min.overall_layout),
    ];
    for (stage, value, threshold) in stages {
        if value < threshold {
            tracing::debug!(stage, value, threshold, "stage confidence below threshold");
        }
    }
}

/// Switches connectors involved in a crossing to network-flow routing so the
/// next pass reduces their crossings. Returns how many were switched.
fn promote_crossing_connectors(
    connections: &mut [ConnectionRequest],
    plan: &LayoutPlan,
) -> usize {
    let crossing: HashSet<&str> = plan
        .crossings
        .crossings
        .iter()
        .flat_map(|c| [c.path_a.as_str(), c.path_b.as_str()])
        .collect();
    let mut promoted = 0;
    for connection in connections.iter_mut() {
        if connection.routing != RoutingMethod::NetworkFlow
            && crossing.contains(connection.id.as_str())
        {
            tracing::debug!(connector = %connection.id, "promoting to network-flow routing");
            connection.routing = RoutingMethod::NetworkFlow;
            promoted += 1;
        }
    }
    promoted
}

fn is_nudge_trigger(code: IssueCode) -> bool {
    matches!(
        code,
        IssueCode::SpacingViolation | IssueCode::OutOfBounds | IssueCode::Misaligned
    )
}

/// Moves each component named by a spacing, bounds or alignment issue by
/// `offset`: away from the partner named by the same issue, or toward the
/// canvas center when the issue names it alone. One move per component.
fn nudge(
    current: &[ComponentLayout],
    issues: &[ValidationIssue],
    canvas: &Canvas,
    offset: f32,
) -> Vec<ComponentLayout> {
    let by_id: BTreeMap<&str, &ComponentLayout> =
        current.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut moves: BTreeMap<&str, Point> = BTreeMap::new();
    let center = canvas.inner_bounds().center();

    for issue in issues.iter().filter(|i| is_nudge_trigger(i.code)) {
        for id in &issue.components {
            let Some(&component) = by_id.get(id.as_str()) else {
                continue;
            };
            if moves.contains_key(component.id.as_str()) {
                continue;
            }
            let own = component.center();
            let partner = issue
                .components
                .iter()
                .filter(|other| *other != id)
                .find_map(|other| by_id.get(other.as_str()));
            let (dx, dy) = match partner {
                Some(partner) => {
                    let p = partner.center();
                    let mut d = (own.0 - p.0, own.1 - p.1);
                    // Coincident centers: the later id yields to the right.
                    if d.0.abs() < f32::EPSILON && d.1.abs() < f32::EPSILON {
                        d = if component.id > partner.id {
                            (1.0, 0.0)
                        } else {
                            (-1.0, 0.0)
                        };
                    }
                    d
                }
                None => (center.0 - own.0, center.1 - own.1),
            };
            let len = (dx * dx + dy * dy).sqrt();
            let step = if len < f32::EPSILON {
                (offset, 0.0)
            } else {
                (dx / len * offset, dy / len * offset)
            };
            moves.insert(component.id.as_str(), step);
        }
    }

    current
        .iter()
        .map(|component| {
            let mut moved = component.clone();
            if let Some(&(dx, dy)) = moves.get(component.id.as_str()) {
                moved.x += dx;
                moved.y += dy;
            }
            moved
        })
        .collect()
}
