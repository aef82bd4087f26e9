use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use thiserror::Error;

/// Advisory placement hints after validation against the component set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutHints {
    pub groups: Vec<Vec<String>>,
    /// Origin component to the chain of components it should lead into.
    pub routes: BTreeMap<String, Vec<String>>,
    pub spacing: HashMap<String, f32>,
}

impl LayoutHints {
    pub fn group_of(&self, id: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.iter().any(|member| member == id))
    }

    pub fn spacing_for(&self, id: &str) -> Option<f32> {
        self.spacing.get(id).copied()
    }

    /// Groups first (hint order), then route chains, then the remaining ids in input order.
    pub fn order<'a>(&self, ids: &[&'a str]) -> Vec<&'a str> {
        let lookup: HashMap<&str, &'a str> = ids.iter().map(|id| (*id, *id)).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut ordered = Vec::with_capacity(ids.len());
        let mut push = |id: &str, ordered: &mut Vec<&'a str>| {
            if let Some(&known) = lookup.get(id)
                && seen.insert(known)
            {
                ordered.push(known);
            }
        };
        for group in &self.groups {
            for member in group {
                push(member, &mut ordered);
            }
        }
        for (origin, chain) in &self.routes {
            push(origin, &mut ordered);
            for member in chain {
                push(member, &mut ordered);
            }
        }
        for id in ids {
            push(id, &mut ordered);
        }
        ordered
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HintError {
    #[error("hints must be a JSON object")]
    NotAnObject,
    #[error("component_groups must be a list of lists")]
    GroupsNotList,
    #[error("component group {0} is not a list of ids")]
    GroupNotList(usize),
    #[error("optimal_routes must map component ids to lists of ids")]
    RoutesNotMap,
    #[error("spacing_recommendations must map component ids to numbers")]
    SpacingNotMap,
    #[error("hint references unknown component {0}")]
    UnknownComponent(String),
    #[error("component {0} appears in more than one group")]
    DuplicateMembership(String),
    #[error("invalid spacing recommendation for {id}: {value}")]
    InvalidSpacing { id: String, value: String },
}

fn id_list<'v>(value: &'v Value) -> Option<Vec<&'v str>> {
    value.as_array()?.iter().map(Value::as_str).collect()
}

pub fn validate_hints(raw: &Value, known: &HashSet<&str>) -> Result<LayoutHints, HintError> {
    let obj = raw.as_object().ok_or(HintError::NotAnObject)?;
    let check = |id: &str| {
        if known.contains(id) {
            Ok(id.to_string())
        } else {
            Err(HintError::UnknownComponent(id.to_string()))
        }
    };
    let mut hints = LayoutHints::default();

    if let Some(groups) = obj.get("component_groups").filter(|v| !v.is_null()) {
        let groups = groups.as_array().ok_or(HintError::GroupsNotList)?;
        let mut members: HashSet<String> = HashSet::new();
        for (idx, group) in groups.iter().enumerate() {
            let ids = id_list(group).ok_or(HintError::GroupNotList(idx))?;
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                let id = check(id)?;
                if !members.insert(id.clone()) {
                    return Err(HintError::DuplicateMembership(id));
                }
                out.push(id);
            }
            hints.groups.push(out);
        }
    }

    if let Some(routes) = obj.get("optimal_routes").filter(|v| !v.is_null()) {
        let routes = routes.as_object().ok_or(HintError::RoutesNotMap)?;
        for (origin, chain) in routes {
            let origin = check(origin)?;
            let ids = id_list(chain).ok_or(HintError::RoutesNotMap)?;
            let chain = ids.into_iter().map(check).collect::<Result<Vec<_>, _>>()?;
            hints.routes.insert(origin, chain);
        }
    }

    if let Some(spacing) = obj.get("spacing_recommendations").filter(|v| !v.is_null()) {
        let spacing = spacing.as_object().ok_or(HintError::SpacingNotMap)?;
        for (id, value) in spacing {
            let id = check(id)?;
            let amount = value
                .as_f64()
                .map(|v| v as f32)
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| HintError::InvalidSpacing {
                    id: id.clone(),
                    value: value.to_string(),
                })?;
            hints.spacing.insert(id, amount);
        }
    }

    Ok(hints)
}

/// Validated hints, or `None` when absent or malformed; a malformed set is
/// discarded as a whole.
pub fn resolve_hints(raw: Option<&Value>, known: &HashSet<&str>) -> Option<LayoutHints> {
    let raw = raw.filter(|v| !v.is_null())?;
    match validate_hints(raw, known) {
        Ok(hints) => Some(hints),
        Err(err) => {
            tracing::warn!("Discarding layout hints: {}", err);
            None
        }
    }
}
