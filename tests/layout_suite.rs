use std::path::Path;

use diagram_layout_engine::config::LayoutConfig;
use diagram_layout_engine::layout::{
    IssueCode, LayoutPlan, PlanStatus, Severity, analyze_crossings, compute_layout,
};
use diagram_layout_engine::layout_dump::LayoutDump;
use diagram_layout_engine::parser::parse_request;

fn plan_fixture(name: &str, config: &LayoutConfig) -> LayoutPlan {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let input = std::fs::read_to_string(&path).expect("fixture read failed");
    let request = parse_request(&input).expect("parse failed");
    compute_layout(&request, config)
}

fn assert_plan_invariants(plan: &LayoutPlan, config: &LayoutConfig, fixture: &str) {
    assert!(plan.iterations >= 1, "{fixture}: no iteration ran");
    assert!(
        plan.iterations <= config.max_iterations.max(1),
        "{fixture}: ran {} iterations",
        plan.iterations
    );
    assert!((0.0..=100.0).contains(&plan.score), "{fixture}: score {}", plan.score);
    for component in plan.components.values() {
        assert!(
            plan.canvas.fits(&component.bbox()),
            "{fixture}: {} outside the canvas",
            component.id
        );
    }
    for path in plan.paths.values() {
        assert!(path.points.len() >= 2, "{fixture}: {} has fewer than 2 points", path.id);
        for id in [&path.source, &path.target] {
            assert!(
                plan.components.contains_key(id),
                "{fixture}: {} routes to unplaced {id}",
                path.id
            );
        }
        let boxes = [&plan.components[&path.source], &plan.components[&path.target]];
        let ends = [path.points[0], path.points[path.points.len() - 1]];
        for (component, end) in boxes.iter().zip(ends) {
            let bbox = component.bbox().inflate(1e-3);
            assert!(
                bbox.contains(end),
                "{fixture}: {} endpoint {:?} is off {}",
                path.id,
                end,
                component.id
            );
        }
    }
    assert_eq!(plan.crossings, analyze_crossings(&plan.paths), "{fixture}: stale crossing report");
    if plan.passed {
        assert_eq!(plan.count(Severity::Error), 0, "{fixture}: passed with errors");
        let list: Vec<_> = plan.components.values().collect();
        for (i, a) in list.iter().enumerate() {
            for b in &list[i + 1..] {
                assert!(
                    a.bbox().gap(&b.bbox()) + 1e-3 >= config.min_component_distance,
                    "{fixture}: {} and {} too close in a passed plan",
                    a.id,
                    b.id
                );
            }
        }
    }
}

#[test]
fn layout_all_fixtures() {
    let config = LayoutConfig::default();
    // Keep this list explicit so new fixtures are added intentionally.
    for fixture in [
        "audio_chain.json",
        "upstream_overlap.json",
        "grouped_hierarchy.json5",
        "invalid_hints.json",
        "dropped_components.json",
        "fan_out.json",
    ] {
        let plan = plan_fixture(fixture, &config);
        assert_plan_invariants(&plan, &config, fixture);
    }
}

#[test]
fn audio_chain_converges_cleanly() {
    let config = LayoutConfig::default();
    let plan = plan_fixture("audio_chain.json", &config);
    assert_eq!(plan.status, PlanStatus::Converged);
    assert!(plan.passed);
    assert_eq!(plan.iterations, 1);
    assert_eq!(plan.score, 100.0);
    assert!(plan.issues.is_empty(), "unexpected issues: {:?}", plan.issues);
    assert_eq!(plan.paths["line"].points, vec![(140.0, 50.0), (190.0, 50.0)]);
    assert_eq!(plan.components["amp"].metadata["manufacturer"], "Acme");
}

#[test]
fn conflicting_upstream_position_is_moved() {
    let config = LayoutConfig::default();
    let plan = plan_fixture("upstream_overlap.json", &config);
    let rack = &plan.components["rack"];
    let switch = &plan.components["switch"];
    assert_eq!((rack.x, rack.y), (100.0, 100.0));
    assert_ne!((switch.x, switch.y), (120.0, 110.0));
    assert!(rack.bbox().gap(&switch.bbox()) + 1e-3 >= config.min_component_distance);
    assert!(plan.passed);
    assert!(plan.paths.contains_key("c0"));
}

#[test]
fn hints_order_the_group_first() {
    let config = LayoutConfig::default();
    let plan = plan_fixture("grouped_hierarchy.json5", &config);
    let dac = &plan.components["dac"];
    let amp = &plan.components["amp"];
    assert_eq!((dac.x, dac.y), (20.0, 20.0));
    assert_eq!(amp.y, dac.y);
    assert!(amp.x > dac.x);
    assert_eq!(plan.paths.len(), 3);
    assert!(
        plan.issues_with(IssueCode::UnknownAnchor)
            .any(|i| i.components == ["spk"]),
        "rear anchor should be reported"
    );
    let curved = &plan.paths["line"];
    assert!(curved.points.len() >= 2);
}

#[test]
fn invalid_hints_fall_back_to_input_order() {
    let config = LayoutConfig::default();
    let plan = plan_fixture("invalid_hints.json", &config);
    let xs: Vec<f32> = ["a", "b", "c"].iter().map(|id| plan.components[*id].x).collect();
    assert!(xs[0] < xs[1] && xs[1] < xs[2], "order was {xs:?}");
    assert!(plan.passed);
}

#[test]
fn dropped_components_exhaust_with_errors() {
    let config = LayoutConfig::default();
    let plan = plan_fixture("dropped_components.json", &config);
    assert_eq!(plan.status, PlanStatus::Exhausted);
    // Nothing left to nudge, so refinement stops after the first pass.
    assert_eq!(plan.iterations, 1);
    assert_eq!(plan.components.len(), 1);
    assert_eq!(plan.issues_with(IssueCode::DuplicateComponent).count(), 1);
    assert_eq!(plan.issues_with(IssueCode::ComponentDropped).count(), 2);
    assert_eq!(plan.issues_with(IssueCode::UnresolvedConnector).count(), 1);
    assert_eq!(plan.issues_with(IssueCode::RefinementExhausted).count(), 1);
    assert_eq!(plan.score, 66.0);
}

#[test]
fn fan_out_spreads_ports_and_converges() {
    let config = LayoutConfig::default();
    let plan = plan_fixture("fan_out.json", &config);
    assert_eq!(plan.status, PlanStatus::Converged);
    assert_eq!(plan.iterations, 1);
    assert!(plan.passed, "issues: {:?}", plan.issues);
    assert_eq!(plan.crossings.total, 0);
    let starts: Vec<(f32, f32)> = ["to_a", "to_b", "to_c"]
        .iter()
        .map(|id| plan.paths[*id].points[0])
        .collect();
    assert_eq!(starts, vec![(140.0, 220.0), (140.0, 240.0), (140.0, 260.0)]);
    assert!(plan.paths.values().all(|p| !p.fallback && p.crossings == 0));
}

#[test]
fn dump_serializes_fixture_plan() {
    let config = LayoutConfig::default();
    let plan = plan_fixture("audio_chain.json", &config);
    let dump = LayoutDump::from_plan(&plan);
    assert_eq!(dump.components.len(), 3);
    assert_eq!(dump.connectors.len(), 2);
    let line = dump.connectors.iter().find(|c| c.id == "line").unwrap();
    assert_eq!(line.points, vec![[140.0, 50.0], [190.0, 50.0]]);
    let json = serde_json::to_value(&dump).unwrap();
    assert_eq!(json["components"][0]["type"], "amplifier");
}
