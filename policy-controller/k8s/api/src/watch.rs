use kube::runtime::watcher;

/// Limits the amount of time a watch can be idle before being reset.
///
/// Must be less than 295 or Kubernetes throws an error.
pub const WATCH_TIMEOUT_SECS: u32 = 290;

/// Watches all namespaces in the cluster.
///
/// Namespaces are cluster-scoped and few, so they are never filtered.
pub fn namespaces() -> watcher::Config {
    watcher::Config::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Watches only the pods scheduled to `node_name`.
///
/// Every node runs its own controller, so each one indexes only its local pods.
pub fn pods_on_node(node_name: &str) -> watcher::Config {
    watcher::Config::default()
        .timeout(WATCH_TIMEOUT_SECS)
        .fields(&format!("spec.nodeName={node_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_field_selector() {
        let config = pods_on_node("node-a");
        assert_eq!(config.field_selector.as_deref(), Some("spec.nodeName=node-a"));
        assert_eq!(config.timeout, Some(WATCH_TIMEOUT_SECS));
        assert_eq!(namespaces().field_selector, None);
    }
}
