use crate::ir::{ConnectionRequest, DiagramRequest};
use anyhow::{Context, Result};
use std::collections::HashSet;

/// Parses a diagram request. Strict JSON is tried first; JSON5 (comments,
/// trailing commas, unquoted keys) is accepted as a fallback.
pub fn parse_request(input: &str) -> Result<DiagramRequest> {
    let trimmed = input.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("Empty diagram request"));
    }
    let mut request = match serde_json::from_str::<DiagramRequest>(trimmed) {
        Ok(request) => request,
        Err(json_err) => json5::from_str::<DiagramRequest>(trimmed)
            .with_context(|| format!("Invalid diagram request (as JSON: {json_err})"))?,
    };
    request.connections = normalize_connection_ids(&request.connections);
    Ok(request)
}

/// Connections with usable ids: blank ids become `c{index}` and repeated ids
/// get a `-{n}` suffix so every routed path keys uniquely.
pub fn normalize_connection_ids(connections: &[ConnectionRequest]) -> Vec<ConnectionRequest> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(connections.len());
    for (idx, connection) in connections.iter().enumerate() {
        let mut connection = connection.clone();
        let base = if connection.id.trim().is_empty() {
            format!("c{idx}")
        } else {
            connection.id.trim().to_string()
        };
        let mut id = base.clone();
        let mut n = 2;
        while seen.contains(&id) {
            id = format!("{base}-{n}");
            n += 1;
        }
        seen.insert(id.clone());
        connection.id = id;
        out.push(connection);
    }
    out
}
