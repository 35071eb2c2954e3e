use anyhow::{Context, Result};
use std::{collections::BTreeMap, net::Ipv4Addr};

pub type Map = BTreeMap<String, String>;

/// The parts of a pod that policy decisions are derived from.
///
/// Records are mirrored from the cluster; they are never derived from one another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodRecord {
    pub namespace: String,
    pub name: String,

    /// The pod's IP. Empty until the pod has been scheduled and assigned an address.
    pub ip: String,

    pub node_name: Option<String>,
    pub labels: Map,
    pub annotations: Map,

    /// The names of the pod's containers, used to recognize injected sidecars.
    pub containers: Vec<String>,
}

// === impl PodRecord ===

impl PodRecord {
    #[inline]
    pub fn has_ip(&self) -> bool {
        !self.ip.is_empty()
    }

    /// Parses the pod IP as the IPv4 address used to key the datapath map.
    pub fn ipv4(&self) -> Result<Ipv4Addr> {
        self.ip
            .parse()
            .with_context(|| format!("pod IP {:?} is not an IPv4 address", self.ip))
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.containers.iter().any(|c| c == name)
    }
}
