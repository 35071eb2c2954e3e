//! Pure policy logic for the mesh acceleration controller.
//!
//! Nothing in this crate performs I/O. Given a pod's annotations and the configured mesh flavor,
//! [`PolicyRecord::encode`] produces the redirection record that is written to the datapath's
//! `local_pod_ips` map; [`classify`] decides whether the pod participates in the mesh at all.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod flavor;
pub mod membership;
mod pod;
pub mod policy;
pub mod ports;

pub use self::{
    flavor::MeshFlavor,
    membership::{classify, Membership},
    pod::{Map, PodRecord},
    policy::{Cidr, PolicyRecord, Slots, MAX_ITEMS, RECORD_LEN},
};
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};
