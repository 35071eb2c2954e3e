//! Mesh Acceleration Policy Index
//!
//! The index mirrors the pods scheduled on this node, along with the ambient mode of every
//! namespace, and keeps two sinks up to date:
//!
//! - The datapath's policy map holds one [`PolicyRecord`] per pod IP, describing which ports and
//!   address ranges the fast path should redirect or bypass.
//! - The process manager is told each pod's mesh membership whenever it is (re)published.
//!
//! ```text
//! [ Namespace ] --(ambient)--> [ Pod ] -> [ PolicyMap ]
//!                                     \-> [ ProcessManager ]
//! ```
//!
//! Pods are published when first observed with an IP. Updates are republished only when a
//! [`RepublishPredicate`] says they matter. A namespace whose ambient mode changes republishes
//! all of its pods.
//!
//! [`PolicyRecord`]: meshaccel_policy_controller_core::PolicyRecord

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod event;
mod metrics;
mod mirror;
mod reconciler;
pub mod sink;
mod watch;


pub use self::{
    event::{pod_record, Event, NamespaceEvent, NamespaceRecord, PodEvent, Watched},
    metrics::IndexMetrics,
    reconciler::{ip_changed, ip_or_redirection_changed, Reconciler, RepublishPredicate},
    sink::{PolicyMap, ProcessManager},
    watch::index,
};
