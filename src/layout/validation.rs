use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::LayoutConfig;
use crate::ir::TextElement;
use crate::text_metrics::text_stats;
use crate::theme::{CONTRAST_AA, CONTRAST_AAA, Theme, contrast_ratio, parse_color};

use super::error::ValidationError;
use super::grid::snap_to;
use super::types::{
    Canvas, ComponentLayout, CrossingReport, IssueCode, RoutedPath, Severity, ValidationIssue,
};

const TEXT_SIZE_RANGE: (f32, f32) = (1.0, 720.0);

/// Everything a rule may look at; built from the current plan state.
pub struct ValidationContext<'a> {
    pub canvas: &'a Canvas,
    pub components: &'a BTreeMap<String, ComponentLayout>,
    pub paths: &'a BTreeMap<String, RoutedPath>,
    pub text_elements: &'a [TextElement],
    pub crossings: &'a CrossingReport,
    pub config: &'a LayoutConfig,
    pub theme: &'a Theme,
}

pub trait Rule: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub score: f32,
    pub passed: bool,
}

pub struct Validator {
    rules: Vec<Arc<dyn Rule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_default_rules() -> Self {
        let mut validator = Self::new();
        validator.add_rule(Arc::new(SpacingRule));
        validator.add_rule(Arc::new(BoundsRule));
        validator.add_rule(Arc::new(AlignmentRule));
        validator.add_rule(Arc::new(ContrastRule));
        validator.add_rule(Arc::new(ReadabilityRule));
        validator.add_rule(Arc::new(FontSizeRule));
        validator.add_rule(Arc::new(ShapeStyleRule));
        validator.add_rule(Arc::new(ConnectorLengthRule));
        validator.add_rule(Arc::new(CrossingBudgetRule));
        validator
    }

    pub fn add_rule(&mut self, rule: Arc<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Runs every rule; a failing rule is skipped with a warning.
    pub fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for rule in &self.rules {
            match rule.check(ctx) {
                Ok(found) => issues.extend(found),
                Err(err) => {
                    tracing::warn!(rule = rule.id(), "validation rule skipped: {}", err);
                    issues.push(ValidationIssue::warning(
                        IssueCode::RuleSkipped,
                        format!("{} skipped: {err}", rule.name()),
                    ));
                }
            }
        }
        issues
    }

    /// Scores `prior` issues (placement, routing) together with the rule results.
    pub fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        prior: Vec<ValidationIssue>,
    ) -> ValidationReport {
        let mut issues = prior;
        issues.extend(self.run(ctx));
        let score = score(&issues, ctx.config);
        let passed = !issues.iter().any(|i| i.severity == Severity::Error)
            && ctx.crossings.total <= ctx.config.validation.crossing_budget;
        ValidationReport {
            issues,
            score,
            passed,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

pub fn score(issues: &[ValidationIssue], config: &LayoutConfig) -> f32 {
    let weights = &config.validation;
    let penalty: f32 = issues
        .iter()
        .map(|issue| match issue.severity {
            Severity::Error => weights.error_weight,
            Severity::Warning => weights.warning_weight,
            Severity::Info => weights.info_weight,
        })
        .sum();
    (100.0 - penalty).max(0.0)
}

fn finite_layout(component: &ComponentLayout) -> Result<(), ValidationError> {
    let values = [component.x, component.y, component.width, component.height];
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ValidationError::NonFiniteGeometry(component.id.clone()))
    }
}

pub struct SpacingRule;

impl Rule for SpacingRule {
    fn id(&self) -> &str {
        "spacing"
    }

    fn name(&self) -> &str {
        "Component spacing"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError> {
        let min = ctx.config.min_component_distance;
        let eps = ctx.config.validation.overlap_epsilon;
        let list: Vec<&ComponentLayout> = ctx.components.values().collect();
        for component in &list {
            finite_layout(component)?;
        }
        let mut issues = Vec::new();
        for (i, a) in list.iter().enumerate() {
            for b in &list[i + 1..] {
                let gap = a.bbox().gap(&b.bbox());
                if gap + eps < min {
                    issues.push(
                        ValidationIssue::error(
                            IssueCode::SpacingViolation,
                            format!("{} and {} are {gap:.1} apart, minimum is {min}", a.id, b.id),
                        )
                        .at(a.center(), Some(&a.id))
                        .involving([a.id.as_str(), b.id.as_str()]),
                    );
                }
            }
        }
        Ok(issues)
    }
}

pub struct BoundsRule;

impl Rule for BoundsRule {
    fn id(&self) -> &str {
        "bounds"
    }

    fn name(&self) -> &str {
        "Canvas bounds"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError> {
        let mut issues = Vec::new();
        for component in ctx.components.values() {
            finite_layout(component)?;
            if !ctx.canvas.fits(&component.bbox()) {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::OutOfBounds,
                        format!("{} extends past the canvas margin", component.id),
                    )
                    .at((component.x, component.y), Some(&component.id))
                    .involving([component.id.as_str()]),
                );
            }
        }
        Ok(issues)
    }
}

pub struct AlignmentRule;

impl Rule for AlignmentRule {
    fn id(&self) -> &str {
        "alignment"
    }

    fn name(&self) -> &str {
        "Grid alignment"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError> {
        let threshold = ctx.config.alignment_threshold;
        let mut issues = Vec::new();
        for component in ctx.components.values() {
            finite_layout(component)?;
            let anchor = (component.x, component.y);
            let snapped = snap_to(anchor, ctx.canvas.grid_cell);
            let offset = super::grid::distance(anchor, snapped);
            if offset > threshold {
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::Misaligned,
                        format!("{} is {offset:.1} off the grid", component.id),
                    )
                    .at(anchor, Some(&component.id))
                    .involving([component.id.as_str()]),
                );
            }
        }
        Ok(issues)
    }
}

fn color_of(owner: &str, value: &str) -> Result<crate::theme::Rgb, ValidationError> {
    parse_color(value).ok_or_else(|| ValidationError::InvalidColor {
        owner: owner.to_string(),
        value: value.to_string(),
    })
}

fn contrast_issue(owner: &str, ratio: f32, components: &[&str]) -> Option<ValidationIssue> {
    let issue = if ratio < CONTRAST_AA {
        ValidationIssue::error(
            IssueCode::LowContrast,
            format!("{owner}: contrast {ratio:.2}:1 is below {CONTRAST_AA}:1"),
        )
    } else if ratio < CONTRAST_AAA {
        ValidationIssue::info(
            IssueCode::ContrastBelowAaa,
            format!("{owner}: contrast {ratio:.2}:1 meets AA but not {CONTRAST_AAA}:1"),
        )
    } else {
        return None;
    };
    Some(issue.involving(components.iter().copied()))
}

pub struct ContrastRule;

impl Rule for ContrastRule {
    fn id(&self) -> &str {
        "contrast"
    }

    fn name(&self) -> &str {
        "Color contrast"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError> {
        let mut issues = Vec::new();
        for component in ctx.components.values() {
            let style = component.style.as_ref();
            let has_text = component.label.as_deref().is_some_and(|l| !l.trim().is_empty())
                || style.is_some_and(|s| s.text_color.is_some());
            if !has_text {
                continue;
            }
            let text = style
                .and_then(|s| s.text_color.as_deref())
                .unwrap_or(&ctx.theme.text_color);
            let fill = style
                .and_then(|s| s.fill_color.as_deref())
                .unwrap_or(&ctx.theme.fill_color);
            let ratio =
                contrast_ratio(color_of(&component.id, text)?, color_of(&component.id, fill)?);
            if let Some(issue) = contrast_issue(&component.id, ratio, &[&component.id]) {
                issues.push(issue.at(component.center(), Some(&component.id)));
            }
        }
        for element in ctx.text_elements {
            let text = element.color.as_deref().unwrap_or(&ctx.theme.text_color);
            let background = element
                .background_color
                .as_deref()
                .unwrap_or(&ctx.theme.background);
            let ratio = contrast_ratio(
                color_of(&element.id, text)?,
                color_of(&element.id, background)?,
            );
            if let Some(mut issue) = contrast_issue(&element.id, ratio, &[]) {
                if let Some(position) = element.position {
                    issue = issue.at(position, None);
                }
                issues.push(issue);
            }
        }
        Ok(issues)
    }
}

/// Text blocks checked by readability and length: component labels, then text elements.
fn text_blocks<'a>(
    ctx: &'a ValidationContext<'_>,
) -> impl Iterator<Item = (&'a str, &'a str, bool)> {
    let labels = ctx
        .components
        .values()
        .filter_map(|c| c.label.as_deref().map(|label| (c.id.as_str(), label, true)));
    let elements = ctx
        .text_elements
        .iter()
        .map(|e| (e.id.as_str(), e.content.as_str(), false));
    labels.chain(elements)
}

pub struct ReadabilityRule;

impl Rule for ReadabilityRule {
    fn id(&self) -> &str {
        "readability"
    }

    fn name(&self) -> &str {
        "Text readability"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError> {
        let rules = &ctx.config.validation;
        let mut issues = Vec::new();
        for (owner, text, is_component) in text_blocks(ctx) {
            let involved: Vec<&str> = if is_component { vec![owner] } else { Vec::new() };
            let chars = text.chars().count();
            if chars > rules.max_text_length {
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::TextTooLong,
                        format!(
                            "{owner}: text is {chars} characters, maximum is {}",
                            rules.max_text_length
                        ),
                    )
                    .involving(involved.iter().copied()),
                );
            }
            let stats = text_stats(text);
            if stats.words < rules.readability_min_words {
                continue;
            }
            if let Some(score) = stats.flesch_reading_ease()
                && score < rules.min_readability
            {
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::LowReadability,
                        format!(
                            "{owner}: reading ease {score:.1} is below {}",
                            rules.min_readability
                        ),
                    )
                    .involving(involved),
                );
            }
        }
        Ok(issues)
    }
}

pub struct FontSizeRule;

impl Rule for FontSizeRule {
    fn id(&self) -> &str {
        "font_size"
    }

    fn name(&self) -> &str {
        "Font size"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError> {
        let bounds = ctx.config.font_size_bounds;
        let sizes = ctx
            .components
            .values()
            .filter_map(|c| c.style.as_ref()?.text_size.map(|s| (c.id.as_str(), s, true)))
            .chain(
                ctx.text_elements
                    .iter()
                    .filter_map(|e| e.font_size.map(|s| (e.id.as_str(), s, false))),
            );
        let mut issues = Vec::new();
        for (owner, size, is_component) in sizes {
            if size < bounds.min || size > bounds.max || !size.is_finite() {
                let involved: Vec<&str> = if is_component { vec![owner] } else { Vec::new() };
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::FontSizeOutOfRange,
                        format!("{owner}: font size {size} outside {}-{}", bounds.min, bounds.max),
                    )
                    .involving(involved),
                );
            }
        }
        Ok(issues)
    }
}

pub struct ShapeStyleRule;

impl Rule for ShapeStyleRule {
    fn id(&self) -> &str {
        "shape_style"
    }

    fn name(&self) -> &str {
        "Shape style"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError> {
        let mut issues = Vec::new();
        for component in ctx.components.values() {
            let Some(style) = component.style.as_ref() else {
                continue;
            };
            let mut problems = Vec::new();
            if let Some(weight) = style.line_weight
                && !(weight.is_finite() && weight >= 0.0)
            {
                problems.push(format!("line weight {weight}"));
            }
            if let Some(size) = style.text_size
                && !(TEXT_SIZE_RANGE.0..=TEXT_SIZE_RANGE.1).contains(&size)
            {
                problems.push(format!("text size {size}"));
            }
            if let Some(opacity) = style.opacity
                && !(0.0..=1.0).contains(&opacity)
            {
                problems.push(format!("opacity {opacity}"));
            }
            if !problems.is_empty() {
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::InvalidStyle,
                        format!("{}: invalid {}", component.id, problems.join(", ")),
                    )
                    .involving([component.id.as_str()]),
                );
            }
        }
        Ok(issues)
    }
}

pub struct ConnectorLengthRule;

impl Rule for ConnectorLengthRule {
    fn id(&self) -> &str {
        "connector_length"
    }

    fn name(&self) -> &str {
        "Connector length"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError> {
        let max = ctx.config.max_connector_length;
        let mut issues = Vec::new();
        for path in ctx.paths.values() {
            if !path.length.is_finite() {
                return Err(ValidationError::Malformed(format!(
                    "connector {} has a non-finite length",
                    path.id
                )));
            }
            if path.length > max {
                let mut issue = ValidationIssue::warning(
                    IssueCode::ConnectorTooLong,
                    format!("connector {} is {:.1} long, maximum is {max}", path.id, path.length),
                )
                .involving([path.source.as_str(), path.target.as_str()]);
                if let Some(&start) = path.points.first() {
                    issue = issue.at(start, Some(&path.source));
                }
                issues.push(issue);
            }
        }
        Ok(issues)
    }
}

pub struct CrossingBudgetRule;

impl Rule for CrossingBudgetRule {
    fn id(&self) -> &str {
        "crossing_budget"
    }

    fn name(&self) -> &str {
        "Crossing budget"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Result<Vec<ValidationIssue>, ValidationError> {
        let budget = ctx.config.validation.crossing_budget;
        if ctx.crossings.total <= budget {
            return Ok(Vec::new());
        }
        let mut involved: Vec<&str> = ctx
            .crossings
            .crossings
            .iter()
            .flat_map(|c| [&c.path_a, &c.path_b])
            .filter_map(|id| ctx.paths.get(id))
            .flat_map(|p| [p.source.as_str(), p.target.as_str()])
            .collect();
        involved.sort_unstable();
        involved.dedup();
        let mut issue = ValidationIssue::warning(
            IssueCode::CrossingBudgetExceeded,
            format!("{} connector crossings, budget is {budget}", ctx.crossings.total),
        )
        .involving(involved);
        if let Some(first) = ctx.crossings.crossings.first() {
            issue = issue.at(first.point, None);
        }
        Ok(vec![issue])
    }
}
