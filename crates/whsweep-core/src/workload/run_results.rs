//! Parsing of the workload tool's `run_results.json` artifact.

use std::path::Path;

use serde::Deserialize;

use crate::errors::WorkloadError;
use crate::model::UnitResult;

/// Node kinds that are units of measured work. Tests are not.
const UNIT_KINDS: [&str; 3] = ["model", "seed", "snapshot"];

#[derive(Debug, Deserialize)]
struct RunResults {
    #[serde(default)]
    results: Vec<NodeResult>,
}

#[derive(Debug, Deserialize)]
struct NodeResult {
    unique_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    execution_time: f64,
    #[serde(default)]
    relation_name: Option<String>,
}

/// Schema segment of a relation like `` `catalog`.`schema`.`table` ``.
fn relation_schema(relation: &str) -> Option<String> {
    let parts: Vec<&str> = relation
        .split('.')
        .map(|p| p.trim().trim_matches('`').trim_matches('"'))
        .collect();
    (parts.len() >= 2)
        .then(|| parts[parts.len() - 2].to_string())
        .filter(|s| !s.is_empty())
}

/// Units of work in `content`; nodes without a relation are attributed to
/// `default_schema`.
pub fn parse(content: &str, default_schema: &str) -> Result<Vec<UnitResult>, WorkloadError> {
    let parsed: RunResults = serde_json::from_str(content).map_err(|e| WorkloadError::Results {
        message: format!("invalid run results: {}", e),
    })?;

    Ok(parsed
        .results
        .into_iter()
        .filter_map(|node| {
            let mut segments = node.unique_id.split('.');
            let kind = segments.next()?;
            if !UNIT_KINDS.contains(&kind) {
                return None;
            }
            let name = node.unique_id.rsplit('.').next()?.to_string();
            let schema = node
                .relation_name
                .as_deref()
                .and_then(relation_schema)
                .unwrap_or_else(|| default_schema.to_string());
            Some(UnitResult {
                schema,
                name,
                execution_time_seconds: node.execution_time,
                status: node.status,
            })
        })
        .collect())
}

pub async fn read(path: &Path, default_schema: &str) -> Result<Vec<UnitResult>, WorkloadError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| WorkloadError::Results {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
    parse(&content, default_schema)
}
