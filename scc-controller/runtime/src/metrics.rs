use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use scc_controller_core::Operation;

/// Counts the outcome of pod admission reviews.
#[derive(Clone, Debug)]
pub struct AdmissionMetrics {
    admitted: Family<AdmittedLabels, Counter>,
    denied: Family<OperationLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct AdmittedLabels {
    constraint: String,
    operation: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OperationLabels {
    operation: String,
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let admitted = Family::default();
        prom.register(
            "pods_admitted",
            "Count of pods admitted, by the constraint that admitted them",
            admitted.clone(),
        );

        let denied = Family::default();
        prom.register(
            "pods_denied",
            "Count of pods that no constraint admitted",
            denied.clone(),
        );

        Self { admitted, denied }
    }

    pub fn admitted(&self, constraint: &str, operation: Operation) {
        self.admitted
            .get_or_create(&AdmittedLabels {
                constraint: constraint.to_string(),
                operation: operation_label(operation),
            })
            .inc();
    }

    pub fn denied(&self, operation: Operation) {
        self.denied
            .get_or_create(&OperationLabels {
                operation: operation_label(operation),
            })
            .inc();
    }
}

fn operation_label(operation: Operation) -> String {
    match operation {
        Operation::Create => "create",
        Operation::Update => "update",
    }
    .to_string()
}

#[cfg(test)]
impl AdmissionMetrics {
    pub(crate) fn admitted_count(&self, constraint: &str, operation: Operation) -> u64 {
        self.admitted
            .get_or_create(&AdmittedLabels {
                constraint: constraint.to_string(),
                operation: operation_label(operation),
            })
            .get()
    }

    pub(crate) fn denied_count(&self, operation: Operation) -> u64 {
        self.denied
            .get_or_create(&OperationLabels {
                operation: operation_label(operation),
            })
            .get()
    }
}
