use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::ir::{
    CanvasSpec, Component, ComponentStyle, ConnectionPoint, ConnectorStyle, RoutingMethod,
};

use super::grid::BBox;

pub type Point = (f32, f32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
    pub grid_cell: f32,
    pub margin: f32,
}

impl Canvas {
    pub fn new(width: f32, height: f32, grid_cell: f32, margin: f32) -> Self {
        Self {
            width,
            height,
            grid_cell,
            margin,
        }
    }

    pub fn from_config(config: &CanvasConfig, spec: Option<&CanvasSpec>) -> Self {
        let mut canvas = Self::new(config.width, config.height, config.grid_cell, config.margin);
        if let Some(spec) = spec {
            canvas.width = spec.width;
            canvas.height = spec.height;
            if let Some(cell) = spec.grid_cell
                && cell.is_finite()
                && cell > 0.0
            {
                canvas.grid_cell = cell;
            }
            if let Some(margin) = spec.margin {
                canvas.margin = margin.max(0.0);
            }
        }
        if !(canvas.grid_cell.is_finite() && canvas.grid_cell > 0.0) {
            canvas.grid_cell = 1.0;
        }
        canvas
    }

    /// Usable region: canvas bounds minus the margin on every side.
    pub fn inner_bounds(&self) -> BBox {
        BBox::new(
            self.margin,
            self.margin,
            (self.width - 2.0 * self.margin).max(0.0),
            (self.height - 2.0 * self.margin).max(0.0),
        )
    }

    pub fn fits(&self, bbox: &BBox) -> bool {
        const EPS: f32 = 1e-3;
        let inner = self.inner_bounds();
        bbox.x >= inner.x - EPS
            && bbox.y >= inner.y - EPS
            && bbox.right() <= inner.right() + EPS
            && bbox.bottom() <= inner.bottom() + EPS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentLayout {
    pub id: String,
    pub kind: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub connection_points: Vec<ConnectionPoint>,
    pub label: Option<String>,
    pub style: Option<ComponentStyle>,
    pub metadata: serde_json::Value,
}

impl ComponentLayout {
    pub fn from_component(component: &Component, position: Point) -> Self {
        Self {
            id: component.id.clone(),
            kind: component.kind.clone(),
            x: position.0,
            y: position.1,
            width: component.size.width,
            height: component.size.height,
            connection_points: component.connection_points.clone(),
            label: component.label.clone(),
            style: component.style.clone(),
            metadata: component.metadata.clone(),
        }
    }

    pub fn bbox(&self) -> BBox {
        BBox::new(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> Point {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedPath {
    pub id: String,
    pub source: String,
    pub target: String,
    pub points: Vec<Point>,
    pub style: ConnectorStyle,
    /// Strategy that produced `points`; differs from the request after a fallback.
    pub strategy: RoutingMethod,
    pub crossings: usize,
    pub length: f32,
    pub fallback: bool,
}

impl RoutedPath {
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    ComponentDropped,
    DuplicateComponent,
    SpacingViolation,
    OutOfBounds,
    Misaligned,
    LowContrast,
    ContrastBelowAaa,
    LowReadability,
    TextTooLong,
    FontSizeOutOfRange,
    InvalidStyle,
    ConnectorTooLong,
    RoutingFallback,
    UnresolvedConnector,
    UnknownAnchor,
    StyleNotAllowed,
    CrossingBudgetExceeded,
    RuleSkipped,
    RefinementExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueLocation {
    pub x: f32,
    pub y: f32,
    pub component: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub severity: Severity,
    pub location: Option<IssueLocation>,
    /// Every component the issue refers to.
    pub components: Vec<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(code: IssueCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            location: None,
            components: Vec::new(),
            message: message.into(),
        }
    }

    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, message)
    }

    pub fn info(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Info, message)
    }

    pub fn at(mut self, point: Point, component: Option<&str>) -> Self {
        self.location = Some(IssueLocation {
            x: point.0,
            y: point.1,
            component: component.map(str::to_string),
        });
        self
    }

    pub fn involving<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components.extend(ids.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crossing {
    pub path_a: String,
    pub path_b: String,
    pub point: Point,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossingReport {
    pub total: usize,
    pub crossings: Vec<Crossing>,
}

impl CrossingReport {
    pub fn count_for(&self, path_id: &str) -> usize {
        self.crossings
            .iter()
            .filter(|c| c.path_a == path_id || c.path_b == path_id)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    InProgress,
    Converged,
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Confidence {
    pub component_placement: f32,
    pub connection_routing: f32,
    pub overall_layout: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPlan {
    pub canvas: Canvas,
    pub components: BTreeMap<String, ComponentLayout>,
    pub paths: BTreeMap<String, RoutedPath>,
    pub issues: Vec<ValidationIssue>,
    pub score: f32,
    pub passed: bool,
    pub iterations: usize,
    pub status: PlanStatus,
    pub crossings: CrossingReport,
    pub confidence: Confidence,
}

impl LayoutPlan {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            components: BTreeMap::new(),
            paths: BTreeMap::new(),
            issues: Vec::new(),
            score: 0.0,
            passed: false,
            iterations: 0,
            status: PlanStatus::InProgress,
            crossings: CrossingReport::default(),
            confidence: Confidence::default(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn issues_with(&self, code: IssueCode) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }
}
