//! Name-keyed lookup of algorithms, built once at start-up.

use std::collections::BTreeMap;
use std::sync::Arc;

use ensemble_state::{AlgorithmRef, Member};
use serde::Serialize;
use tracing::debug;

use crate::algorithm::Algorithm;
use crate::error::{AlgorithmError, AlgorithmResult};
use crate::workload::WorkloadDemand;

/// Name and description of a registered algorithm.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AlgorithmInfo {
    pub name: String,
    pub description: String,
}

/// Registered algorithms by name.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    algorithms: BTreeMap<String, Arc<dyn Algorithm>>,
}

impl AlgorithmRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in algorithm.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(WorkloadDemand::new());
        registry
    }

    /// Register an algorithm under its own name, replacing any previous one.
    pub fn register<A: Algorithm + 'static>(&mut self, algorithm: A) {
        let name = algorithm.name().to_string();
        debug!(algorithm = %name, "registered algorithm");
        self.algorithms.insert(name, Arc::new(algorithm));
    }

    pub fn get(&self, name: &str) -> AlgorithmResult<Arc<dyn Algorithm>> {
        self.algorithms
            .get(name)
            .cloned()
            .ok_or_else(|| AlgorithmError::NotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<AlgorithmInfo> {
        self.algorithms
            .values()
            .map(|a| AlgorithmInfo {
                name: a.name().to_string(),
                description: a.description().to_string(),
            })
            .collect()
    }

    /// Resolve the referenced algorithm and check it against the member.
    pub fn check(
        &self,
        algorithm: &AlgorithmRef,
        member: &Member,
    ) -> AlgorithmResult<Arc<dyn Algorithm>> {
        let resolved = self.get(&algorithm.name)?;
        resolved.check(&algorithm.options, member)?;
        Ok(resolved)
    }
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.algorithms.keys().collect::<Vec<_>>())
            .finish()
    }
}
