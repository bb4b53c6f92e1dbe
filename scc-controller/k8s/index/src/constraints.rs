use crate::Index;
use scc_controller_k8s_api::{ResourceExt, SecurityContextConstraints};
use tracing::{debug, instrument};

impl kubert::index::IndexClusterResource<SecurityContextConstraints> for Index {
    #[instrument(skip_all, fields(name = %resource.name_unchecked()))]
    fn apply(&mut self, resource: SecurityContextConstraints) {
        let name = resource.name_unchecked();
        debug!(priority = ?resource.spec.priority, "Indexing constraint");
        self.constraints.insert(name, resource.spec);
    }

    #[instrument(skip(self))]
    fn delete(&mut self, name: String) {
        if self.constraints.remove(&name).is_some() {
            debug!("Removed constraint");
        }
    }

    // Constraints are independent of each other, so resets need no special
    // handling.
}
