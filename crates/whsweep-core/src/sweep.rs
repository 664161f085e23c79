//! Sweep expansion.
//!
//! Order is fixed: sizes outermost, then compute types, then threads, with the
//! iteration number varying fastest. The order of each dimension is the order
//! in which its values were given.

use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;
use crate::model::{ComputeType, ExperimentConfig, WarehouseSize};

/// Dimensions of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSpec {
    pub sizes: Vec<WarehouseSize>,
    pub compute_types: Vec<ComputeType>,
    pub threads: Vec<u32>,
    pub iterations: u32,
    pub scaling_factor: u32,
}

impl SweepSpec {
    /// Number of configurations this spec expands to.
    pub fn len(&self) -> usize {
        self.sizes.len() * self.compute_types.len() * self.threads.len() * self.iterations as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_dimension<T: Eq + Hash + Display>(
    name: &str,
    values: &[T],
) -> Result<(), ConfigurationError> {
    if values.is_empty() {
        return Err(ConfigurationError::new(format!("{} must not be empty", name)));
    }
    let mut seen = HashSet::new();
    for v in values {
        if !seen.insert(v) {
            return Err(ConfigurationError::new(format!(
                "duplicate value {} in {}",
                v, name
            )));
        }
    }
    Ok(())
}

/// Expand `spec` into its full Cartesian product.
pub fn generate(spec: &SweepSpec) -> Result<Vec<ExperimentConfig>, ConfigurationError> {
    check_dimension("sizes", &spec.sizes)?;
    check_dimension("compute_types", &spec.compute_types)?;
    check_dimension("threads", &spec.threads)?;
    if spec.threads.contains(&0) {
        return Err(ConfigurationError::new("threads must be positive"));
    }
    if spec.iterations == 0 {
        return Err(ConfigurationError::new("iterations must be positive"));
    }
    if spec.scaling_factor == 0 {
        return Err(ConfigurationError::new("scaling_factor must be positive"));
    }

    let mut out = Vec::with_capacity(spec.len());
    for &size in &spec.sizes {
        for &compute_type in &spec.compute_types {
            for &threads in &spec.threads {
                for iteration in 1..=spec.iterations {
                    out.push(ExperimentConfig {
                        size,
                        compute_type,
                        threads,
                        iteration,
                        scaling_factor: spec.scaling_factor,
                    });
                }
            }
        }
    }
    Ok(out)
}
