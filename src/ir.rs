use serde::{Deserialize, Serialize};

/// Layer axis used by hierarchical routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    TopBottom,
    LeftRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStyle {
    Straight,
    #[default]
    #[serde(alias = "right_angle", alias = "rightAngle")]
    Orthogonal,
    Curved,
}

/// Routing tag carried by a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    ShortestPath,
    #[default]
    #[serde(alias = "avoid_shapes")]
    AvoidObstacles,
    #[serde(alias = "tree")]
    HierarchicalTb,
    HierarchicalLr,
    Curved,
    #[serde(alias = "network_flow_min_crossing")]
    NetworkFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Named anchor on a component, positioned relative to its box (0..=1 on each axis).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPoint {
    pub name: String,
    pub relative_x: f32,
    pub relative_y: f32,
    /// Exit angle in degrees, 0 pointing right, 90 pointing down.
    #[serde(default)]
    pub angle: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentStyle {
    #[serde(default)]
    pub fill_color: Option<String>,
    #[serde(default)]
    pub line_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub line_weight: Option<f32>,
    #[serde(default)]
    pub text_size: Option<f32>,
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub font_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
    pub size: Size,
    #[serde(default)]
    pub position: Option<(f32, f32)>,
    #[serde(default)]
    pub connection_points: Vec<ConnectionPoint>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub style: Option<ComponentStyle>,
    /// Upstream manufacturer and datasheet fields, carried through untouched.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Component {
    pub fn new(id: &str, width: f32, height: f32) -> Self {
        Self {
            id: id.to_string(),
            kind: None,
            size: Size::new(width, height),
            position: None,
            connection_points: Vec::new(),
            label: None,
            style: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = Some((x, y));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub component: String,
    #[serde(default)]
    pub anchor: Option<String>,
}

impl Endpoint {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            anchor: None,
        }
    }

    pub fn with_anchor(component: &str, anchor: &str) -> Self {
        Self {
            component: component.to_string(),
            anchor: Some(anchor.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    #[serde(default)]
    pub id: String,
    pub source: Endpoint,
    pub target: Endpoint,
    #[serde(default)]
    pub style: Option<ConnectorStyle>,
    #[serde(default)]
    pub routing: RoutingMethod,
}

impl ConnectionRequest {
    pub fn new(id: &str, source: Endpoint, target: Endpoint, routing: RoutingMethod) -> Self {
        Self {
            id: id.to_string(),
            source,
            target,
            style: None,
            routing,
        }
    }
}

/// Free-standing text block checked by the contrast, readability and font rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub position: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSpec {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub grid_cell: Option<f32>,
    #[serde(default)]
    pub margin: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagramRequest {
    #[serde(default)]
    pub canvas: Option<CanvasSpec>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default, alias = "connectors")]
    pub connections: Vec<ConnectionRequest>,
    #[serde(default)]
    pub text_elements: Vec<TextElement>,
    /// Advisory layout hints; shape is not trusted and validated before use.
    #[serde(default)]
    pub hints: Option<serde_json::Value>,
}

impl DiagramRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }
}
