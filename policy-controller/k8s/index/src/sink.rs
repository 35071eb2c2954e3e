//! The destinations that reconciled state is published to.

use anyhow::Result;
use meshaccel_policy_controller_core::{Membership, PolicyRecord};
use std::{net::Ipv4Addr, sync::Arc};

/// The datapath's per-pod policy table, keyed by pod IP.
pub trait PolicyMap: Send + Sync + 'static {
    /// Inserts or replaces the record for `ip`.
    fn update(&self, ip: Ipv4Addr, record: &PolicyRecord) -> Result<()>;

    fn delete(&self, ip: Ipv4Addr) -> Result<()>;
}

/// Receives pod membership changes so that node-local processes can be tracked.
pub trait ProcessManager: Send + Sync + 'static {
    fn on_pod_status_changed(&self, ip: &str, membership: Membership) -> Result<()>;
}

// === impl Arc ===

impl<M: PolicyMap + ?Sized> PolicyMap for Arc<M> {
    #[inline]
    fn update(&self, ip: Ipv4Addr, record: &PolicyRecord) -> Result<()> {
        (**self).update(ip, record)
    }

    #[inline]
    fn delete(&self, ip: Ipv4Addr) -> Result<()> {
        (**self).delete(ip)
    }
}

impl<P: ProcessManager + ?Sized> ProcessManager for Arc<P> {
    #[inline]
    fn on_pod_status_changed(&self, ip: &str, membership: Membership) -> Result<()> {
        (**self).on_pod_status_changed(ip, membership)
    }
}
