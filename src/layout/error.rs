use thiserror::Error;

use super::types::{IssueCode, ValidationIssue};

/// A component that cannot be placed; it is dropped from the plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("component {id} has a degenerate size {width}x{height}")]
    DegenerateSize { id: String, width: f32, height: f32 },
    #[error("component {id} ({width}x{height}) does not fit inside the canvas")]
    DoesNotFit { id: String, width: f32, height: f32 },
    #[error("duplicate component id {0}")]
    DuplicateId(String),
}

impl GeometryError {
    pub fn component_id(&self) -> &str {
        match self {
            Self::DegenerateSize { id, .. }
            | Self::DoesNotFit { id, .. }
            | Self::DuplicateId(id) => id,
        }
    }

    pub fn to_issue(&self) -> ValidationIssue {
        let code = match self {
            Self::DuplicateId(_) => IssueCode::DuplicateComponent,
            _ => IssueCode::ComponentDropped,
        };
        ValidationIssue::error(code, self.to_string()).involving([self.component_id()])
    }
}

/// Failure of an obstacle-aware search; the caller falls back to a direct segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no path within {budget} node expansions")]
    BudgetExhausted { budget: usize },
    #[error("search timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u128 },
    #[error("no path between cells {start:?} and {end:?}")]
    Unreachable { start: (i32, i32), end: (i32, i32) },
    #[error("endpoint cell {0:?} lies outside the grid")]
    OutOfGrid((i32, i32)),
    #[error("obstacle grid of {cells} cells exceeds the {limit}-cell search limit")]
    GridTooLarge { cells: u64, limit: usize },
}

/// Malformed data that prevents a single rule from running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unparseable color {value:?} on {owner}")]
    InvalidColor { owner: String, value: String },
    #[error("non-finite geometry on {0}")]
    NonFiniteGeometry(String),
    #[error("{0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("refinement stopped after {iterations} iterations without passing")]
pub struct RefinementExhausted {
    pub iterations: usize,
}

impl RefinementExhausted {
    pub fn to_issue(&self) -> ValidationIssue {
        ValidationIssue::info(IssueCode::RefinementExhausted, self.to_string())
    }
}
