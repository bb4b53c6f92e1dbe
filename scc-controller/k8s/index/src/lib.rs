//! SCC Controller Index
//!
//! The index holds the state needed to admit pods. It watches the following
//! cluster resources:
//!
//! - Each `SecurityContextConstraints` resource is a candidate policy for
//!   every pod. Its spec is kept as written, since ranges and levels it leaves
//!   unset depend on the pod's namespace.
//! - Each `Namespace` may carry annotations that pre-allocate a UID range,
//!   an SELinux level, and supplemental groups for the pods it holds.
//!
//! Providers are built per request by resolving every constraint against the
//! request's namespace. Constraints that cannot be resolved in a namespace
//! are skipped there.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod constraints;
pub mod metrics;
mod namespace;

#[cfg(test)]
mod tests;

use parking_lot::RwLock;
use scc_controller_core::{allocation, ordering, Provider};
use scc_controller_k8s_api::SecurityContextConstraintsSpec;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::{debug, instrument, warn};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds all indexing state. Owned and updated by the tasks that process
/// watch events, and read by the admission service.
#[derive(Debug, Default)]
pub struct Index {
    constraints: BTreeMap<String, SecurityContextConstraintsSpec>,
    namespaces: HashMap<String, BTreeMap<String, String>>,
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn num_namespaces(&self) -> usize {
        self.namespaces.len()
    }

    /// Builds a provider for each constraint that can be resolved in
    /// `namespace`, in evaluation order.
    #[instrument(skip(self))]
    pub fn providers(&self, namespace: &str) -> Vec<Provider> {
        let empty = BTreeMap::new();
        let annotations = self.namespaces.get(namespace).unwrap_or(&empty);

        let constraints = self.constraints.iter().filter_map(|(name, spec)| {
            match allocation::resolve(name, spec, namespace, annotations) {
                Ok(constraint) => Some(constraint),
                Err(error) => {
                    debug!(constraint = %name, %error, "Skipping constraint");
                    None
                }
            }
        });

        ordering::prioritize(constraints)
            .into_iter()
            .filter_map(|constraint| {
                let name = constraint.name.clone();
                match Provider::new(constraint) {
                    Ok(provider) => Some(provider),
                    Err(error) => {
                        warn!(constraint = %name, %error, "Invalid constraint");
                        None
                    }
                }
            })
            .collect()
    }
}
