use meshaccel_policy_controller_core::{membership, PodRecord};
use meshaccel_policy_controller_k8s_api::{self as k8s, ResourceExt};

/// A change observed in the cluster.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Namespace(NamespaceEvent),
    Pod(PodEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub enum NamespaceEvent {
    Applied(NamespaceRecord),
    Deleted(String),

    /// The watch was (re)established and this is the complete set of namespaces.
    Restarted(Vec<NamespaceRecord>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PodEvent {
    Applied(PodRecord),
    Deleted(PodRecord),

    /// The watch was (re)established and this is the complete set of the node's pods.
    Restarted(Vec<PodRecord>),
}

/// The parts of a namespace that affect its pods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceRecord {
    pub name: String,
    pub ambient: bool,
}

/// Converts watched resources into events.
pub trait Watched: Sized {
    fn applied(self) -> Option<Event>;

    fn deleted(self) -> Option<Event>;

    fn restarted(resources: Vec<Self>) -> Event;
}

/// Extracts the policy-relevant parts of a pod.
///
/// Returns `None` if the pod has no namespace.
pub fn pod_record(pod: k8s::Pod) -> Option<PodRecord> {
    let namespace = pod.namespace()?;
    let name = pod.name_any();
    let k8s::Pod {
        metadata,
        spec,
        status,
    } = pod;
    let (node_name, containers) = spec
        .map(|spec| {
            let containers = spec.containers.into_iter().map(|c| c.name).collect();
            (spec.node_name, containers)
        })
        .unwrap_or_default();
    Some(PodRecord {
        namespace,
        name,
        ip: status.and_then(|s| s.pod_ip).unwrap_or_default(),
        node_name,
        labels: metadata.labels.unwrap_or_default(),
        annotations: metadata.annotations.unwrap_or_default(),
        containers,
    })
}

// === impl NamespaceRecord ===

impl From<&k8s::Namespace> for NamespaceRecord {
    fn from(ns: &k8s::Namespace) -> Self {
        Self {
            name: ns.name_any(),
            ambient: membership::is_ambient_namespace(ns.labels()),
        }
    }
}

// === impl Watched ===

impl Watched for k8s::Namespace {
    fn applied(self) -> Option<Event> {
        Some(Event::Namespace(NamespaceEvent::Applied((&self).into())))
    }

    fn deleted(self) -> Option<Event> {
        Some(Event::Namespace(NamespaceEvent::Deleted(self.name_any())))
    }

    fn restarted(namespaces: Vec<Self>) -> Event {
        let records = namespaces.iter().map(NamespaceRecord::from).collect();
        Event::Namespace(NamespaceEvent::Restarted(records))
    }
}

impl Watched for k8s::Pod {
    fn applied(self) -> Option<Event> {
        pod_record(self).map(|pod| Event::Pod(PodEvent::Applied(pod)))
    }

    fn deleted(self) -> Option<Event> {
        pod_record(self).map(|pod| Event::Pod(PodEvent::Deleted(pod)))
    }

    fn restarted(pods: Vec<Self>) -> Event {
        let records = pods.into_iter().filter_map(pod_record).collect();
        Event::Pod(PodEvent::Restarted(records))
    }
}
