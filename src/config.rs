use crate::ir::ConnectorStyle;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub width: f32,
    pub height: f32,
    pub grid_cell: f32,
    pub margin: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
            grid_cell: 10.0,
            margin: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontSizeBounds {
    pub min: f32,
    pub max: f32,
}

impl Default for FontSizeBounds {
    fn default() -> Self {
        Self { min: 8.0, max: 14.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeSpacing {
    pub horizontal: f32,
    pub vertical: f32,
}

impl Default for ShapeSpacing {
    fn default() -> Self {
        Self {
            horizontal: 100.0,
            vertical: 75.0,
        }
    }
}

/// Minimum confidence per pipeline stage. Below-threshold stages are logged and
/// reported on the plan; they do not change `passed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageConfidence {
    pub component_placement: f32,
    pub connection_routing: f32,
    pub overall_layout: f32,
}

impl Default for StageConfidence {
    fn default() -> Self {
        Self {
            component_placement: 0.85,
            connection_routing: 0.9,
            overall_layout: 0.95,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    #[default]
    Quadratic,
    Cubic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// A* node-expansion budget per connector.
    pub max_expansions: usize,
    /// Optional wall-clock limit per A* search, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Obstacle grids with more intersections than this are not searched.
    pub max_grid_cells: usize,
    /// Offset of the two waypoints inserted around a crossing.
    pub reroute_offset: f32,
    pub max_reroute_passes: usize,
    pub curve: CurveKind,
    /// Samples per smoothed corner.
    pub curve_segments: usize,
    /// Corner blend radius as a multiple of the grid cell.
    pub corner_radius_cells: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_expansions: 200_000,
            timeout_ms: None,
            max_grid_cells: crate::layout::grid::MAX_GRID_CELLS,
            reroute_offset: 0.25,
            max_reroute_passes: 5,
            curve: CurveKind::Quadratic,
            curve_segments: 6,
            corner_radius_cells: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub min_readability: f32,
    /// Text blocks with fewer words are not scored for readability.
    pub readability_min_words: usize,
    pub max_text_length: usize,
    pub crossing_budget: usize,
    pub overlap_epsilon: f32,
    pub error_weight: f32,
    pub warning_weight: f32,
    pub info_weight: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_readability: 60.0,
            readability_min_words: 8,
            max_text_length: 200,
            crossing_budget: 0,
            overlap_epsilon: 1e-3,
            error_weight: 10.0,
            warning_weight: 3.0,
            info_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub canvas: CanvasConfig,
    pub min_component_distance: f32,
    pub max_connector_length: f32,
    pub alignment_threshold: f32,
    pub font_size_bounds: FontSizeBounds,
    /// Allowed connector styles; the first entry replaces disallowed styles.
    pub connector_styles: Vec<ConnectorStyle>,
    pub default_style: ConnectorStyle,
    pub shape_spacing: ShapeSpacing,
    pub min_confidence: StageConfidence,
    pub max_iterations: usize,
    /// Distance a flagged component is moved between refinement iterations.
    pub nudge_offset: f32,
    pub routing: RoutingConfig,
    pub validation: ValidationConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            min_component_distance: 50.0,
            max_connector_length: 300.0,
            alignment_threshold: 5.0,
            font_size_bounds: FontSizeBounds::default(),
            connector_styles: vec![
                ConnectorStyle::Straight,
                ConnectorStyle::Curved,
                ConnectorStyle::Orthogonal,
            ],
            default_style: ConnectorStyle::Orthogonal,
            shape_spacing: ShapeSpacing::default(),
            min_confidence: StageConfidence::default(),
            max_iterations: 3,
            nudge_offset: 20.0,
            routing: RoutingConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl LayoutConfig {
    /// Style a connector ends up with after applying the allowed-style list.
    pub fn resolve_style(&self, requested: Option<ConnectorStyle>) -> (ConnectorStyle, bool) {
        let style = requested.unwrap_or(self.default_style);
        if self.connector_styles.is_empty() || self.connector_styles.contains(&style) {
            return (style, true);
        }
        (self.connector_styles[0], false)
    }
}

#[derive(Debug, Default, Deserialize)]
struct CanvasConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    #[serde(alias = "gridCell", alias = "cell_size")]
    grid_cell: Option<f32>,
    margin: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutRulesFile {
    #[serde(alias = "minComponentDistance")]
    min_component_distance: Option<f32>,
    #[serde(alias = "maxConnectorLength")]
    max_connector_length: Option<f32>,
    #[serde(alias = "alignmentThreshold")]
    alignment_threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct StyleRulesFile {
    #[serde(alias = "font_sizes", alias = "fontSizes", alias = "fontSizeBounds")]
    font_size_bounds: Option<FontSizeBounds>,
    #[serde(alias = "connectorStyles")]
    connector_styles: Option<Vec<ConnectorStyle>>,
    #[serde(alias = "shapeSpacing")]
    shape_spacing: Option<ShapeSpacing>,
}

#[derive(Debug, Default, Deserialize)]
struct StageConfidenceFile {
    component_placement: Option<f32>,
    connection_routing: Option<f32>,
    overall_layout: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingConfigFile {
    #[serde(alias = "maxExpansions")]
    max_expansions: Option<usize>,
    #[serde(alias = "timeoutMs")]
    timeout_ms: Option<u64>,
    #[serde(alias = "maxGridCells")]
    max_grid_cells: Option<usize>,
    #[serde(alias = "rerouteOffset")]
    reroute_offset: Option<f32>,
    #[serde(alias = "maxReroutePasses")]
    max_reroute_passes: Option<usize>,
    curve: Option<CurveKind>,
    #[serde(alias = "curveSegments")]
    curve_segments: Option<usize>,
    #[serde(alias = "cornerRadiusCells")]
    corner_radius_cells: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationConfigFile {
    #[serde(alias = "minReadability")]
    min_readability: Option<f32>,
    #[serde(alias = "readabilityMinWords")]
    readability_min_words: Option<usize>,
    #[serde(alias = "maxTextLength")]
    max_text_length: Option<usize>,
    #[serde(alias = "crossingBudget")]
    crossing_budget: Option<usize>,
    #[serde(alias = "overlapEpsilon")]
    overlap_epsilon: Option<f32>,
}

/// On-disk configuration: every key optional and merged over the defaults. Rule
/// keys are accepted flat or grouped under `layout_rules` / `style_rules`.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    canvas: Option<CanvasConfigFile>,
    #[serde(flatten)]
    layout_rules_flat: LayoutRulesFile,
    layout_rules: Option<LayoutRulesFile>,
    #[serde(flatten)]
    style_rules_flat: StyleRulesFile,
    style_rules: Option<StyleRulesFile>,
    #[serde(alias = "defaultStyle")]
    default_style: Option<ConnectorStyle>,
    #[serde(alias = "minConfidence", alias = "confidence_thresholds")]
    min_confidence: Option<StageConfidenceFile>,
    #[serde(alias = "maxIterations")]
    max_iterations: Option<usize>,
    #[serde(alias = "nudgeOffset")]
    nudge_offset: Option<f32>,
    routing: Option<RoutingConfigFile>,
    validation: Option<ValidationConfigFile>,
}

impl LayoutRulesFile {
    fn apply(self, config: &mut LayoutConfig) {
        if let Some(v) = self.min_component_distance {
            config.min_component_distance = v;
        }
        if let Some(v) = self.max_connector_length {
            config.max_connector_length = v;
        }
        if let Some(v) = self.alignment_threshold {
            config.alignment_threshold = v;
        }
    }
}

impl StyleRulesFile {
    fn apply(self, config: &mut LayoutConfig) {
        if let Some(v) = self.font_size_bounds {
            config.font_size_bounds = v;
        }
        if let Some(v) = self.connector_styles {
            config.connector_styles = v;
        }
        if let Some(v) = self.shape_spacing {
            config.shape_spacing = v;
        }
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<LayoutConfig> {
    let Some(path) = path else {
        return Ok(LayoutConfig::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> anyhow::Result<LayoutConfig> {
    let parsed: ConfigFile = serde_json::from_str(contents)?;
    let mut config = LayoutConfig::default();

    if let Some(canvas) = parsed.canvas {
        if let Some(v) = canvas.width {
            config.canvas.width = v;
        }
        if let Some(v) = canvas.height {
            config.canvas.height = v;
        }
        if let Some(v) = canvas.grid_cell {
            config.canvas.grid_cell = v;
        }
        if let Some(v) = canvas.margin {
            config.canvas.margin = v;
        }
    }

    parsed.layout_rules_flat.apply(&mut config);
    if let Some(rules) = parsed.layout_rules {
        rules.apply(&mut config);
    }
    parsed.style_rules_flat.apply(&mut config);
    if let Some(rules) = parsed.style_rules {
        rules.apply(&mut config);
    }

    if let Some(v) = parsed.default_style {
        config.default_style = v;
    }
    if let Some(conf) = parsed.min_confidence {
        if let Some(v) = conf.component_placement {
            config.min_confidence.component_placement = v;
        }
        if let Some(v) = conf.connection_routing {
            config.min_confidence.connection_routing = v;
        }
        if let Some(v) = conf.overall_layout {
            config.min_confidence.overall_layout = v;
        }
    }
    if let Some(v) = parsed.max_iterations {
        config.max_iterations = v;
    }
    if let Some(v) = parsed.nudge_offset {
        config.nudge_offset = v;
    }

    if let Some(routing) = parsed.routing {
        if let Some(v) = routing.max_expansions {
            config.routing.max_expansions = v;
        }
        if routing.timeout_ms.is_some() {
            config.routing.timeout_ms = routing.timeout_ms;
        }
        if let Some(v) = routing.max_grid_cells {
            config.routing.max_grid_cells = v;
        }
        if let Some(v) = routing.reroute_offset {
            config.routing.reroute_offset = v;
        }
        if let Some(v) = routing.max_reroute_passes {
            config.routing.max_reroute_passes = v;
        }
        if let Some(v) = routing.curve {
            config.routing.curve = v;
        }
        if let Some(v) = routing.curve_segments {
            config.routing.curve_segments = v;
        }
        if let Some(v) = routing.corner_radius_cells {
            config.routing.corner_radius_cells = v;
        }
    }

    if let Some(validation) = parsed.validation {
        if let Some(v) = validation.min_readability {
            config.validation.min_readability = v;
        }
        if let Some(v) = validation.readability_min_words {
            config.validation.readability_min_words = v;
        }
        if let Some(v) = validation.max_text_length {
            config.validation.max_text_length = v;
        }
        if let Some(v) = validation.crossing_budget {
            config.validation.crossing_budget = v;
        }
        if let Some(v) = validation.overlap_epsilon {
            config.validation.overlap_epsilon = v;
        }
    }

    if !(config.canvas.grid_cell.is_finite() && config.canvas.grid_cell > 0.0) {
        return Err(anyhow::anyhow!(
            "canvas.grid_cell must be a positive number, got {}",
            config.canvas.grid_cell
        ));
    }

    Ok(config)
}
