use crate::mirror::Mirror;
use parking_lot::Mutex;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{counter::Counter, gauge::ConstGauge, MetricType},
    registry::Registry,
};
use std::sync::Arc;

/// Counts the reconciler's writes to the policy map and process manager.
#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    pub(crate) map_updates: Counter,
    pub(crate) map_update_errors: Counter,
    pub(crate) map_deletes: Counter,
    pub(crate) map_delete_errors: Counter,
    pub(crate) process_notify_errors: Counter,
}

#[derive(Debug)]
struct Instrumented(Arc<Mutex<Mirror>>);

// === impl IndexMetrics ===

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();

        prom.register(
            "map_updates",
            "Count of records written to the policy map",
            metrics.map_updates.clone(),
        );
        prom.register(
            "map_update_errors",
            "Count of failed writes to the policy map",
            metrics.map_update_errors.clone(),
        );
        prom.register(
            "map_deletes",
            "Count of records removed from the policy map",
            metrics.map_deletes.clone(),
        );
        prom.register(
            "map_delete_errors",
            "Count of failed removals from the policy map",
            metrics.map_delete_errors.clone(),
        );
        prom.register(
            "process_notify_errors",
            "Count of membership changes the process manager failed to handle",
            metrics.process_notify_errors.clone(),
        );

        metrics
    }
}

pub(crate) fn register_mirror(prom: &mut Registry, mirror: Arc<Mutex<Mirror>>) {
    prom.register_collector(Box::new(Instrumented(mirror)));
}

// === impl Instrumented ===

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let mirror = self.0.lock();

        let mut pods_encoder = encoder.encode_descriptor(
            "pods",
            "The number of scheduled pods tracked on this node",
            None,
            MetricType::Gauge,
        )?;
        for (ns, count) in mirror.pod_counts() {
            let labels = [("namespace", ns)];
            let pods = ConstGauge::new(count as u32);
            let pods_encoder = pods_encoder.encode_family(&labels)?;
            pods.encode(pods_encoder)?;
        }

        let ambient = ConstGauge::new(mirror.ambient_namespaces() as u32);
        let ambient_encoder = encoder.encode_descriptor(
            "ambient_namespaces",
            "The number of namespaces in ambient mode",
            None,
            MetricType::Gauge,
        )?;
        ambient.encode(ambient_encoder)?;

        Ok(())
    }
}
