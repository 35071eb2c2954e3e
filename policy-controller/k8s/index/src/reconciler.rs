use crate::{
    event::{Event, NamespaceEvent, NamespaceRecord, PodEvent},
    metrics::{self, IndexMetrics},
    mirror::Mirror,
    sink::{PolicyMap, ProcessManager},
};
use ahash::AHashSet as HashSet;
use meshaccel_policy_controller_core::{classify, MeshFlavor, PodRecord, PolicyRecord};
use parking_lot::Mutex;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Decides whether an update to an already-mirrored pod must be republished.
///
/// Called with the mirrored record and the updated one.
pub type RepublishPredicate = fn(MeshFlavor, &PodRecord, &PodRecord) -> bool;

/// Keeps the policy map and the process manager in sync with the node's pods.
///
/// All state lives in a single mirror behind one lock. Sink writes for a pod happen while the
/// lock is held so that concurrent namespace and pod events cannot interleave their writes.
#[derive(Debug)]
pub struct Reconciler<M, P> {
    flavor: MeshFlavor,
    mirror: Arc<Mutex<Mirror>>,
    policy_map: M,
    processes: P,
    metrics: IndexMetrics,
    republish: RepublishPredicate,
}

/// Republishes only when the pod's IP changed.
pub fn ip_changed(_: MeshFlavor, old: &PodRecord, new: &PodRecord) -> bool {
    old.ip != new.ip
}

/// Republishes when the pod's IP or any annotation that feeds its policy record changed.
pub fn ip_or_redirection_changed(flavor: MeshFlavor, old: &PodRecord, new: &PodRecord) -> bool {
    ip_changed(flavor, old, new)
        || PolicyRecord::annotation_keys(flavor)
            .any(|key| old.annotations.get(key) != new.annotations.get(key))
}

// === impl Reconciler ===

impl<M, P> Reconciler<M, P>
where
    M: PolicyMap,
    P: ProcessManager,
{
    pub fn new(flavor: MeshFlavor, policy_map: M, processes: P) -> Self {
        Self {
            flavor,
            mirror: Default::default(),
            policy_map,
            processes,
            metrics: IndexMetrics::default(),
            republish: ip_changed,
        }
    }

    /// Registers the reconciler's counters and mirror gauges.
    pub fn with_metrics(mut self, prom: &mut Registry) -> Self {
        self.metrics = IndexMetrics::register(prom);
        metrics::register_mirror(prom, self.mirror.clone());
        self
    }

    pub fn with_republish(mut self, republish: RepublishPredicate) -> Self {
        self.republish = republish;
        self
    }

    pub fn flavor(&self) -> MeshFlavor {
        self.flavor
    }

    pub fn handle(&self, event: Event) {
        match event {
            Event::Namespace(NamespaceEvent::Applied(ns)) => self.apply_namespace(ns),
            Event::Namespace(NamespaceEvent::Deleted(name)) => {
                debug!(ns = %name, "Ignoring namespace deletion");
            }
            Event::Namespace(NamespaceEvent::Restarted(namespaces)) => {
                self.reset_namespaces(namespaces)
            }
            Event::Pod(PodEvent::Applied(pod)) => self.apply_pod(pod),
            Event::Pod(PodEvent::Deleted(pod)) => self.delete_pod(&pod.namespace, &pod.name),
            Event::Pod(PodEvent::Restarted(pods)) => self.reset_pods(pods),
        }
    }

    /// Records a namespace's mode, republishing all of its pods if the mode changed.
    #[instrument(skip(self, ns), fields(ns = %ns.name, ambient = ns.ambient))]
    pub fn apply_namespace(&self, ns: NamespaceRecord) {
        let names = {
            let mut mirror = self.mirror.lock();
            if !mirror.upsert_namespace(&ns.name, ns.ambient) {
                return;
            }
            mirror.pod_names(&ns.name)
        };

        info!(pods = names.len(), "Namespace mode changed");
        for name in names {
            self.republish(&ns.name, &name);
        }
    }

    #[instrument(skip(self, namespaces))]
    pub fn reset_namespaces(&self, namespaces: Vec<NamespaceRecord>) {
        for ns in namespaces {
            self.apply_namespace(ns);
        }
    }

    /// Creates or updates a pod.
    #[instrument(skip(self, pod), fields(ns = %pod.namespace, name = %pod.name, ip = %pod.ip))]
    pub fn apply_pod(&self, pod: PodRecord) {
        let mut mirror = self.mirror.lock();

        if !pod.has_ip() {
            if let Some(old) = mirror.remove_pod(&pod.namespace, &pod.name) {
                debug!(old_ip = %old.ip, "Pod lost its IP");
                self.unpublish(&old);
            }
            return;
        }

        // A pod whose last publish failed, or whose notification is an exact redelivery, is
        // published again regardless of the predicate.
        let publish = match mirror.get_pod(&pod.namespace, &pod.name) {
            Some(_) if !mirror.is_synced(&pod.namespace, &pod.name) => {
                debug!("Retrying publish after an earlier failure");
                true
            }
            Some(old) => *old == pod || (self.republish)(self.flavor, old, &pod),
            None => true,
        };
        let synced = if publish {
            self.publish(&mirror, &pod)
        } else {
            debug!("Pod update does not affect its policy");
            true
        };
        mirror.upsert_pod(pod, synced);
    }

    /// Removes a pod and its policy map entry. Pods that are not mirrored are ignored.
    #[instrument(skip(self))]
    pub fn delete_pod(&self, namespace: &str, name: &str) {
        let mut mirror = self.mirror.lock();
        match mirror.remove_pod(namespace, name) {
            Some(pod) => self.unpublish(&pod),
            None => debug!("Pod is not tracked"),
        }
    }

    /// Applies a complete listing of the node's pods, removing mirrored pods that are absent.
    #[instrument(skip(self, pods))]
    pub fn reset_pods(&self, pods: Vec<PodRecord>) {
        let listed = pods
            .iter()
            .map(|pod| (pod.namespace.clone(), pod.name.clone()))
            .collect::<HashSet<_>>();

        {
            let mut mirror = self.mirror.lock();
            for pod in mirror.retain_pods(&listed) {
                debug!(ns = %pod.namespace, name = %pod.name, "Removing pod absent from listing");
                self.unpublish(&pod);
            }
        }

        for pod in pods {
            self.apply_pod(pod);
        }
    }

    /// Republishes a mirrored pod with the current namespace mode.
    fn republish(&self, namespace: &str, name: &str) {
        let mut mirror = self.mirror.lock();
        let synced = match mirror.get_pod(namespace, name) {
            Some(pod) => self.publish(&mirror, pod),
            None => {
                debug!(ns = %namespace, %name, "Pod was removed before it was republished");
                return;
            }
        };
        mirror.set_synced(namespace, name, synced);
    }

    /// Writes the pod's record and membership, returning false if either sink failed.
    fn publish(&self, mirror: &Mirror, pod: &PodRecord) -> bool {
        let mut synced = true;
        let membership = classify(self.flavor, mirror.is_ambient(&pod.namespace), pod);

        match pod.ipv4() {
            Ok(ip) => {
                let record = PolicyRecord::encode(self.flavor, &pod.annotations);
                match self.policy_map.update(ip, &record) {
                    Ok(()) => {
                        self.metrics.map_updates.inc();
                        debug!(%ip, ?membership, "Updated policy map");
                    }
                    Err(error) => {
                        self.metrics.map_update_errors.inc();
                        error!(%ip, %error, "Failed to update policy map");
                        synced = false;
                    }
                }
            }
            Err(error) => warn!(ip = %pod.ip, %error, "Not publishing policy for pod"),
        }

        if let Err(error) = self.processes.on_pod_status_changed(&pod.ip, membership) {
            self.metrics.process_notify_errors.inc();
            error!(ip = %pod.ip, %error, "Failed to notify process manager");
            synced = false;
        }

        synced
    }

    fn unpublish(&self, pod: &PodRecord) {
        let ip = match pod.ipv4() {
            Ok(ip) => ip,
            Err(error) => {
                debug!(ip = %pod.ip, %error, "Pod has no policy map entry");
                return;
            }
        };
        match self.policy_map.delete(ip) {
            Ok(()) => {
                self.metrics.map_deletes.inc();
                debug!(%ip, "Deleted policy map entry");
            }
            Err(error) => {
                self.metrics.map_delete_errors.inc();
                error!(%ip, %error, "Failed to delete policy map entry");
            }
        }
    }
}
