use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use meshaccel_policy_controller_core::PodRecord;

/// The in-memory view of the node's pods and of each namespace's ambient mode.
///
/// The mirror holds only the inputs to classification. It does no locking of its own; the
/// reconciler owns it behind a single lock.
#[derive(Debug, Default)]
pub(crate) struct Mirror {
    /// Whether each namespace is in ambient mode.
    namespaces: HashMap<String, bool>,

    /// Scheduled pods, by namespace and then by name.
    pods: HashMap<String, HashMap<String, Entry>>,
}

#[derive(Debug)]
struct Entry {
    pod: PodRecord,

    /// False when the pod's last publish failed, so that its next event republishes it.
    synced: bool,
}

// === impl Mirror ===

impl Mirror {
    /// Records a namespace's mode, returning true if it changed.
    ///
    /// A namespace that has not been seen is treated as not ambient.
    pub(crate) fn upsert_namespace(&mut self, name: &str, ambient: bool) -> bool {
        let prior = self.namespaces.insert(name.to_string(), ambient);
        prior.unwrap_or(false) != ambient
    }

    pub(crate) fn is_ambient(&self, namespace: &str) -> bool {
        self.namespaces.get(namespace).copied().unwrap_or(false)
    }

    /// Inserts or replaces a pod, returning the replaced record.
    ///
    /// Pods without an IP are not tracked.
    pub(crate) fn upsert_pod(&mut self, pod: PodRecord, synced: bool) -> Option<PodRecord> {
        if !pod.has_ip() {
            return None;
        }
        self.pods
            .entry(pod.namespace.clone())
            .or_default()
            .insert(pod.name.clone(), Entry { pod, synced })
            .map(|entry| entry.pod)
    }

    pub(crate) fn get_pod(&self, namespace: &str, name: &str) -> Option<&PodRecord> {
        self.pods.get(namespace)?.get(name).map(|entry| &entry.pod)
    }

    /// Returns false if the pod's last publish failed. Unknown pods are not synced.
    pub(crate) fn is_synced(&self, namespace: &str, name: &str) -> bool {
        self.pods
            .get(namespace)
            .and_then(|pods| pods.get(name))
            .is_some_and(|entry| entry.synced)
    }

    pub(crate) fn set_synced(&mut self, namespace: &str, name: &str, synced: bool) {
        if let Some(entry) = self.pods.get_mut(namespace).and_then(|pods| pods.get_mut(name)) {
            entry.synced = synced;
        }
    }

    pub(crate) fn remove_pod(&mut self, namespace: &str, name: &str) -> Option<PodRecord> {
        let pods = self.pods.get_mut(namespace)?;
        let entry = pods.remove(name)?;
        if pods.is_empty() {
            self.pods.remove(namespace);
        }
        Some(entry.pod)
    }

    /// Lists the names of all pods in a namespace.
    pub(crate) fn pod_names(&self, namespace: &str) -> Vec<String> {
        self.pods
            .get(namespace)
            .map(|pods| pods.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes every pod that is not in `keep`, returning the removed records.
    pub(crate) fn retain_pods(&mut self, keep: &HashSet<(String, String)>) -> Vec<PodRecord> {
        let mut removed = Vec::new();
        self.pods.retain(|ns, pods| {
            pods.retain(|name, entry| {
                let key = (ns.clone(), name.clone());
                if keep.contains(&key) {
                    true
                } else {
                    removed.push(entry.pod.clone());
                    false
                }
            });
            !pods.is_empty()
        });
        removed
    }

    pub(crate) fn pod_counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.pods.iter().map(|(ns, pods)| (ns.as_str(), pods.len()))
    }

    pub(crate) fn ambient_namespaces(&self) -> usize {
        self.namespaces.values().filter(|ambient| **ambient).count()
    }
}
