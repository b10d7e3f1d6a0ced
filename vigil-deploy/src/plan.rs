//! Deployment planning: dependency-ordered parallel phases.
//!
//! Phases are computed by Kahn-style layering: phase 0 holds every service
//! with no undeployed dependency, those are removed, and the process repeats.
//! Dependencies on services outside the requested set are treated as already
//! deployed. A round that frees no service means the remaining services form
//! a cycle, which refuses the whole deployment.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::error::{DeployError, Result};

/// Compute the parallel-executable phases for `services`.
///
/// The result partitions `services` exactly; for every dependency edge
/// u → v within the set, v's phase precedes u's.
///
/// # Errors
///
/// [`DeployError::DependencyCycle`] listing the services stuck in the cycle.
pub fn plan(
    services: &[String],
    dependencies: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<Vec<String>>> {
    let requested: BTreeSet<&str> = services.iter().map(String::as_str).collect();
    let mut remaining: BTreeSet<&str> = requested.clone();
    let mut deployed: BTreeSet<&str> = BTreeSet::new();
    let mut phases = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|service| {
                dependencies
                    .get(*service)
                    .map(Vec::as_slice)
                    .unwrap_or_default()
                    .iter()
                    // Dependencies outside the requested set do not gate
                    // this deployment.
                    .filter(|dep| requested.contains(dep.as_str()))
                    .all(|dep| deployed.contains(dep.as_str()))
            })
            .collect();

        if ready.is_empty() {
            return Err(DeployError::DependencyCycle(
                remaining.iter().map(|s| (*s).to_owned()).collect(),
            ));
        }

        for service in &ready {
            remaining.remove(*service);
            deployed.insert(*service);
        }
        phases.push(ready.iter().map(|s| (*s).to_owned()).collect());
    }

    info!(phases = phases.len(), services = services.len(), "Deployment plan ready");
    Ok(phases)
}
