use crate::layout::{LayoutPlan, PlanStatus, Severity};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Flattened plan for downstream emitters: boxes, point arrays and issues.
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub grid_cell: f32,
    pub score: f32,
    pub passed: bool,
    pub iterations: usize,
    pub status: PlanStatus,
    pub crossings: usize,
    pub components: Vec<ComponentDump>,
    pub connectors: Vec<ConnectorDump>,
    pub issues: Vec<IssueDump>,
}

#[derive(Debug, Serialize)]
pub struct ComponentDump {
    pub id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ConnectorDump {
    pub id: String,
    pub from: String,
    pub to: String,
    pub style: String,
    pub strategy: String,
    pub fallback: bool,
    pub crossings: usize,
    pub length: f32,
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Serialize)]
pub struct IssueDump {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub components: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<[f32; 2]>,
}

fn token<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

impl LayoutDump {
    pub fn from_plan(plan: &LayoutPlan) -> Self {
        let components = plan
            .components
            .values()
            .map(|c| ComponentDump {
                id: c.id.clone(),
                kind: c.kind.clone(),
                x: c.x,
                y: c.y,
                width: c.width,
                height: c.height,
                label: c.label.clone(),
                metadata: c.metadata.clone(),
            })
            .collect();

        let connectors = plan
            .paths
            .values()
            .map(|path| ConnectorDump {
                id: path.id.clone(),
                from: path.source.clone(),
                to: path.target.clone(),
                style: token(&path.style),
                strategy: token(&path.strategy),
                fallback: path.fallback,
                crossings: path.crossings,
                length: path.length,
                points: path.points.iter().map(|(x, y)| [*x, *y]).collect(),
            })
            .collect();

        let issues = plan
            .issues
            .iter()
            .map(|issue| IssueDump {
                code: token(&issue.code),
                severity: issue.severity,
                message: issue.message.clone(),
                components: issue.components.clone(),
                at: issue.location.as_ref().map(|l| [l.x, l.y]),
            })
            .collect();

        LayoutDump {
            width: plan.canvas.width,
            height: plan.canvas.height,
            grid_cell: plan.canvas.grid_cell,
            score: plan.score,
            passed: plan.passed,
            iterations: plan.iterations,
            status: plan.status,
            crossings: plan.crossings.total,
            components,
            connectors,
            issues,
        }
    }
}

pub fn write_layout_dump_to<W: Write>(writer: W, plan: &LayoutPlan) -> anyhow::Result<()> {
    let dump = LayoutDump::from_plan(plan);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}

pub fn write_layout_dump(path: &Path, plan: &LayoutPlan) -> anyhow::Result<()> {
    let file = File::create(path)?;
    write_layout_dump_to(BufWriter::new(file), plan)
}
