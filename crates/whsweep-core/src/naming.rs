//! Deterministic names for everything an experiment creates.
//!
//! Resource and schema names end up inside SQL text and URL paths, so every
//! identifier passes [`validate_identifier`] before it is used and is emitted
//! back-quoted by [`quote_identifier`].

use crate::errors::ConfigurationError;
use crate::model::ExperimentConfig;

/// Prefix shared by every warehouse a sweep creates.
pub const RESOURCE_PREFIX: &str = "tpcdi";

/// Default prefix for experiment schemas.
pub const DEFAULT_SCHEMA_PREFIX: &str = "dl";

/// Processing zones materialized by the workload, in pipeline order.
pub const ZONES: [&str; 3] = ["bronze", "silver", "gold"];

/// `tpcdi-{compute}-{size}-{threads}-{iteration}`, lower-cased.
pub fn resource_name(config: &ExperimentConfig) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        RESOURCE_PREFIX,
        config.compute_type.as_str(),
        config.size.as_api_str(),
        config.threads,
        config.iteration
    )
    .to_lowercase()
}

/// Identifier characters allowed anywhere in generated SQL.
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), ConfigurationError> {
    if value.is_empty() {
        return Err(ConfigurationError::new(format!("{} must not be empty", kind)));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(ConfigurationError::new(format!(
            "{} {:?} contains disallowed character {:?}",
            kind, value, bad
        )));
    }
    Ok(())
}

/// Back-quoted identifier. Callers validate first; the escape is kept anyway.
pub fn quote_identifier(value: &str) -> String {
    format!("`{}`", value.replace('`', "``"))
}

/// `catalog`.`schema`
pub fn qualified(catalog: &str, schema: &str) -> String {
    format!("{}.{}", quote_identifier(catalog), quote_identifier(schema))
}

/// Base schema of one experiment: `{prefix}_{resource_id}`.
pub fn experiment_schema(prefix: &str, resource_id: &str) -> Result<String, ConfigurationError> {
    validate_identifier("schema prefix", prefix)?;
    validate_identifier("resource id", resource_id)?;
    Ok(format!("{}_{}", prefix, resource_id))
}

/// Every schema an experiment may have materialized: zone variants in
/// reverse pipeline order, then the base schema.
pub fn zone_schemas(base: &str) -> Vec<String> {
    ZONES
        .iter()
        .rev()
        .map(|zone| format!("{}_{}", base, zone))
        .chain(std::iter::once(base.to_string()))
        .collect()
}

/// Zone a schema belongs to, taken from its trailing `_segment`.
pub fn zone_of(schema: &str) -> Option<&'static str> {
    let (_, tail) = schema.rsplit_once('_')?;
    ZONES
        .iter()
        .copied()
        .find(|zone| zone.eq_ignore_ascii_case(tail))
}
