use crate::Index;
use scc_controller_core::allocation;
use scc_controller_k8s_api::{Namespace, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Only the annotations that pre-allocate IDs are retained.
const ALLOCATION_ANNOTATIONS: [&str; 3] = [
    allocation::UID_RANGE_ANNOTATION,
    allocation::MCS_ANNOTATION,
    allocation::SUPPLEMENTAL_GROUPS_ANNOTATION,
];

impl kubert::index::IndexClusterResource<Namespace> for Index {
    #[instrument(skip_all, fields(name = %ns.name_unchecked()))]
    fn apply(&mut self, ns: Namespace) {
        let name = ns.name_unchecked();
        let annotations = ns
            .annotations()
            .iter()
            .filter(|(k, _)| ALLOCATION_ANNOTATIONS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>();
        debug!(annotations = annotations.len(), "Indexing namespace");
        self.namespaces.insert(name, annotations);
    }

    #[instrument(skip(self))]
    fn delete(&mut self, name: String) {
        if self.namespaces.remove(&name).is_some() {
            debug!("Removed namespace");
        }
    }
}
