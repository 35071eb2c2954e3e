use crate::{core::Membership, index::ProcessManager};

/// Records membership changes without tracking any node-local processes.
#[derive(Clone, Debug, Default)]
pub struct NoopProcessManager(());

impl ProcessManager for NoopProcessManager {
    fn on_pod_status_changed(&self, ip: &str, membership: Membership) -> anyhow::Result<()> {
        tracing::debug!(
            %ip,
            in_mesh = membership.in_mesh,
            ambient = membership.ambient,
            gateway = membership.gateway,
            "Pod membership changed"
        );
        Ok(())
    }
}
