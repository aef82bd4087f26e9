//! Property-based invariant tests for the layout engine.
//!
//! Verifies:
//! 1. Snapping is idempotent for every grid cell size
//! 2. A* never steps onto a blocked cell and returns exactly start..=end
//! 3. A* paths move one orthogonal cell at a time
//! 4. Segment intersection is symmetric in its argument order
//! 5. Crossing reduction never raises the crossing total
//! 6. Flesch reading ease never rises with longer sentences or words
//! 7. Contrast ratios are symmetric and lie in [1, 21]
//! 8. The controller stops within its iteration budget
//! 9. Passed plans keep every component pair at least the minimum apart

use std::collections::{BTreeMap, HashSet};

use diagram_layout_engine::config::{CanvasConfig, LayoutConfig, RoutingConfig};
use diagram_layout_engine::ir::{
    Component, ConnectionRequest, ConnectorStyle, DiagramRequest, Endpoint, RoutingMethod,
};
use diagram_layout_engine::layout::grid::{ObstacleGrid, snap_to};
use diagram_layout_engine::layout::routing::{RouteContext, astar, reduce_crossings};
use diagram_layout_engine::layout::{
    RoutedPath, analyze_crossings, compute_layout, segment_intersection,
};
use diagram_layout_engine::text_metrics::flesch_reading_ease;
use diagram_layout_engine::theme::{Rgb, contrast_ratio};
use proptest::prelude::*;

// ── Strategy helpers ──────────────────────────────────────────────────

fn cell_size_strategy() -> impl Strategy<Value = f32> {
    prop_oneof![Just(1.0f32), Just(2.5), Just(5.0), Just(10.0), Just(16.0)]
}

fn point_strategy() -> impl Strategy<Value = (f32, f32)> {
    (-5000.0f32..5000.0, -5000.0f32..5000.0)
}

fn small_point() -> impl Strategy<Value = (f32, f32)> {
    (0i32..=20, 0i32..=20).prop_map(|(x, y)| (x as f32, y as f32))
}

fn rgb_strategy() -> impl Strategy<Value = Rgb> {
    (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Rgb::new(r, g, b))
}

fn polyline_strategy() -> impl Strategy<Value = Vec<(f32, f32)>> {
    prop::collection::vec(small_point(), 2..5)
}

fn method_strategy() -> impl Strategy<Value = RoutingMethod> {
    prop_oneof![
        Just(RoutingMethod::ShortestPath),
        Just(RoutingMethod::AvoidObstacles),
        Just(RoutingMethod::HierarchicalTb),
        Just(RoutingMethod::HierarchicalLr),
        Just(RoutingMethod::Curved),
        Just(RoutingMethod::NetworkFlow),
    ]
}

/// Random components (some with upstream positions) plus random connectors.
fn request_strategy() -> impl Strategy<Value = DiagramRequest> {
    let component = (
        10.0f32..160.0,
        10.0f32..120.0,
        prop::option::of((0.0f32..700.0, 0.0f32..500.0)),
    );
    (
        prop::collection::vec(component, 1..7),
        prop::collection::vec((0usize..7, 0usize..7, method_strategy()), 0..6),
    )
        .prop_map(|(components, links)| {
            let mut request = DiagramRequest::new();
            for (i, (w, h, position)) in components.iter().enumerate() {
                let mut component = Component::new(&format!("n{i}"), *w, *h);
                component.position = *position;
                request.components.push(component);
            }
            let count = request.components.len();
            for (i, (a, b, method)) in links.into_iter().enumerate() {
                request.connections.push(ConnectionRequest::new(
                    &format!("e{i}"),
                    Endpoint::new(&format!("n{}", a % count)),
                    Endpoint::new(&format!("n{}", b % count)),
                    method,
                ));
            }
            request
        })
}

fn small_config(max_iterations: usize) -> LayoutConfig {
    let mut config = LayoutConfig::default();
    config.canvas = CanvasConfig {
        width: 800.0,
        height: 600.0,
        grid_cell: 10.0,
        margin: 20.0,
    };
    config.max_iterations = max_iterations;
    config.routing.max_expansions = 20_000;
    config
}

fn routed(id: &str, points: Vec<(f32, f32)>) -> RoutedPath {
    RoutedPath {
        id: id.to_string(),
        source: format!("{id}-s"),
        target: format!("{id}-t"),
        length: points
            .windows(2)
            .map(|w| ((w[1].0 - w[0].0).powi(2) + (w[1].1 - w[0].1).powi(2)).sqrt())
            .sum(),
        points,
        style: ConnectorStyle::Orthogonal,
        strategy: RoutingMethod::NetworkFlow,
        crossings: 0,
        fallback: false,
    }
}

// ── Geometry ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn snap_is_idempotent(p in point_strategy(), cell in cell_size_strategy()) {
        let once = snap_to(p, cell);
        prop_assert_eq!(
            snap_to(once, cell),
            once,
            "snap not idempotent for {:?} at cell {}",
            p,
            cell
        );
        let grid = ObstacleGrid::new(1000.0, 1000.0, cell);
        prop_assert_eq!(grid.snap(grid.snap(p)), grid.snap(p));
    }
}

proptest! {
    #[test]
    fn astar_respects_blocked_cells(
        blocked in prop::collection::hash_set((0i32..=20, 0i32..=20), 0..120),
        start in (0i32..=20, 0i32..=20),
        end in (0i32..=20, 0i32..=20),
    ) {
        let mut grid = ObstacleGrid::new(200.0, 200.0, 10.0);
        for &cell in &blocked {
            if cell != start && cell != end {
                grid.mark_obstacle(cell);
            }
        }
        let snapshot = grid.snapshot();
        let ctx = RouteContext::new(&snapshot, &RoutingConfig::default());
        if let Ok(path) = astar(&ctx, start, end) {
            prop_assert_eq!(path.first(), Some(&start));
            prop_assert_eq!(path.last(), Some(&end));
            for cell in &path[1..path.len().saturating_sub(1)] {
                prop_assert!(!snapshot.is_blocked(*cell), "path crosses blocked cell {:?}", cell);
            }
            for w in path.windows(2) {
                let step = (w[1].0 - w[0].0).abs() + (w[1].1 - w[0].1).abs();
                prop_assert_eq!(step, 1, "non-orthogonal step {:?} -> {:?}", w[0], w[1]);
            }
            let unique: HashSet<_> = path.iter().collect();
            prop_assert_eq!(unique.len(), path.len(), "path revisits a cell");
        }
    }
}

proptest! {
    #[test]
    fn astar_finds_a_path_on_an_open_grid(
        start in (0i32..=20, 0i32..=20),
        end in (0i32..=20, 0i32..=20),
    ) {
        let grid = ObstacleGrid::new(200.0, 200.0, 10.0);
        let snapshot = grid.snapshot();
        let ctx = RouteContext::new(&snapshot, &RoutingConfig::default());
        let path = astar(&ctx, start, end).unwrap();
        let manhattan = (start.0 - end.0).abs() + (start.1 - end.1).abs();
        prop_assert_eq!(path.len() as i32, manhattan + 1);
    }
}

// ── Crossings ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn intersection_is_symmetric(
        a in small_point(), b in small_point(), c in small_point(), d in small_point(),
    ) {
        let forward = segment_intersection(a, b, c, d).is_some();
        let backward = segment_intersection(c, d, a, b).is_some();
        prop_assert_eq!(forward, backward, "asymmetric for {:?}-{:?} vs {:?}-{:?}", a, b, c, d);
    }
}

proptest! {
    #[test]
    fn crossing_reduction_never_increases_total(
        lines in prop::collection::vec(polyline_strategy(), 2..5),
        passes in 0usize..6,
    ) {
        let mut paths: BTreeMap<String, RoutedPath> = lines
            .into_iter()
            .enumerate()
            .map(|(i, points)| (format!("p{i}"), routed(&format!("p{i}"), points)))
            .collect();
        let before = analyze_crossings(&paths).total;
        let eligible: HashSet<String> = paths.keys().cloned().collect();
        let report = reduce_crossings(&mut paths, &eligible, 0.25, passes);
        prop_assert!(report.total <= before, "{} crossings grew to {}", before, report.total);
        prop_assert_eq!(report.total, analyze_crossings(&paths).total);
    }
}

// ── Validation metrics ────────────────────────────────────────────────

proptest! {
    #[test]
    fn flesch_is_monotone(
        wps in 1.0f32..40.0, spw in 1.0f32..4.0, dw in 0.0f32..20.0, ds in 0.0f32..2.0,
    ) {
        let base = flesch_reading_ease(wps, spw);
        prop_assert!(flesch_reading_ease(wps + dw, spw) <= base + 1e-3);
        prop_assert!(flesch_reading_ease(wps, spw + ds) <= base + 1e-3);
    }
}

proptest! {
    #[test]
    fn contrast_is_symmetric_and_bounded(a in rgb_strategy(), b in rgb_strategy()) {
        let ab = contrast_ratio(a, b);
        let ba = contrast_ratio(b, a);
        prop_assert!((ab - ba).abs() < 1e-4);
        prop_assert!((1.0 - 1e-4..=21.0 + 1e-3).contains(&ab), "ratio {} out of range", ab);
    }
}

// ── Controller ────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn controller_terminates_within_budget(
        request in request_strategy(),
        max_iterations in 0usize..4,
    ) {
        let config = small_config(max_iterations);
        let plan = compute_layout(&request, &config);
        prop_assert!(plan.iterations >= 1);
        prop_assert!(plan.iterations <= max_iterations.max(1));
        prop_assert!((0.0..=100.0).contains(&plan.score));
        for component in plan.components.values() {
            prop_assert!(plan.canvas.fits(&component.bbox()), "{} left the canvas", component.id);
        }
    }

    #[test]
    fn passed_plans_are_spaced(request in request_strategy()) {
        let config = small_config(3);
        let plan = compute_layout(&request, &config);
        if plan.passed {
            let list: Vec<_> = plan.components.values().collect();
            for (i, a) in list.iter().enumerate() {
                for b in &list[i + 1..] {
                    prop_assert!(
                        a.bbox().gap(&b.bbox()) + 1e-3 >= config.min_component_distance,
                        "{} and {} are too close",
                        a.id,
                        b.id
                    );
                }
            }
        }
    }
}
