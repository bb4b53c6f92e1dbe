use crate::Index;
use kube::Resource;
use kubert::index::ClusterRemoved;
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use scc_controller_k8s_api::{Namespace, SecurityContextConstraints};
use std::sync::Arc;

/// Wraps a cluster-scoped index to count the updates applied to it.
pub struct IndexMetrics<T> {
    inner: T,

    index_size: Family<IndexLabels, Gauge>,
    index_applies: Family<IndexLabels, Counter>,
    index_deletes: Family<IndexLabels, Counter>,
    index_resets: Family<IndexLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

pub trait SizedIndex<R> {
    fn size(&self) -> usize;
}

impl<T, R> SizedIndex<R> for Arc<RwLock<T>>
where
    T: SizedIndex<R>,
{
    fn size(&self) -> usize {
        self.read().size()
    }
}

impl SizedIndex<SecurityContextConstraints> for Index {
    fn size(&self) -> usize {
        self.num_constraints()
    }
}

impl SizedIndex<Namespace> for Index {
    fn size(&self) -> usize {
        self.num_namespaces()
    }
}

// === impl IndexMetrics ===

impl<T> IndexMetrics<T> {
    pub fn register(inner: T, prom: &mut Registry) -> Self {
        let index_size = Family::default();
        prom.register(
            "index_size",
            "Gauge of the number of resources in the index",
            index_size.clone(),
        );

        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            index_deletes.clone(),
        );

        let index_resets = Family::default();
        prom.register(
            "index_resets",
            "Count of resets to the index",
            index_resets.clone(),
        );

        Self {
            inner,
            index_size,
            index_applies,
            index_deletes,
            index_resets,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }
}

impl<T> IndexMetrics<Arc<RwLock<T>>> {
    fn record_size<R>(&self, labels: &IndexLabels)
    where
        T: SizedIndex<R>,
    {
        let size = SizedIndex::<R>::size(&self.inner);
        self.index_size.get_or_create(labels).set(size as i64);
    }
}

impl<R, T> kubert::index::IndexClusterResource<R> for IndexMetrics<Arc<RwLock<T>>>
where
    T: SizedIndex<R>,
    T: kubert::index::IndexClusterResource<R>,
    R: Resource<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        let labels = IndexLabels::of::<R>();
        self.index_applies.get_or_create(&labels).inc();
        self.inner.write().apply(resource);
        self.record_size::<R>(&labels);
    }

    fn delete(&mut self, name: String) {
        let labels = IndexLabels::of::<R>();
        self.index_deletes.get_or_create(&labels).inc();
        self.inner.write().delete(name);
        self.record_size::<R>(&labels);
    }

    fn reset(&mut self, resources: Vec<R>, removed: ClusterRemoved) {
        let labels = IndexLabels::of::<R>();
        self.index_resets.get_or_create(&labels).inc();
        self.inner.write().reset(resources, removed);
        self.record_size::<R>(&labels);
    }
}

// === impl IndexLabels ===

impl IndexLabels {
    fn of<R: Resource<DynamicType = ()>>() -> Self {
        Self {
            kind: R::kind(&()).to_string(),
        }
    }
}
