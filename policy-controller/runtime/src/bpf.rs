use crate::{
    core::{PolicyRecord, RECORD_LEN},
    index::PolicyMap,
};
use aya::maps::{HashMap, Map, MapData};
use parking_lot::Mutex;
use std::{
    net::Ipv4Addr,
    path::{Path, PathBuf},
};

/// The default pin path of the datapath's per-pod policy map.
pub const LOCAL_POD_IPS: &str = "/sys/fs/bpf/local_pod_ips";

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("failed to open pinned map {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: aya::maps::MapError,
    },

    #[error("pinned map {} is not a pod policy hash map: {source}", .path.display())]
    Type {
        path: PathBuf,
        #[source]
        source: aya::maps::MapError,
    },

    #[error("failed to update the entry for {ip}: {source}")]
    Update {
        ip: Ipv4Addr,
        #[source]
        source: aya::maps::MapError,
    },

    #[error("failed to delete the entry for {ip}: {source}")]
    Delete {
        ip: Ipv4Addr,
        #[source]
        source: aya::maps::MapError,
    },
}

/// The pinned `local_pod_ips` map, keyed by pod IPv4 address.
pub struct PinnedPolicyMap {
    map: Mutex<HashMap<MapData, u32, [u8; RECORD_LEN]>>,
}

/// Encodes an address as the map key: the address octets in network order, read as a
/// native-endian integer.
pub fn key(ip: Ipv4Addr) -> u32 {
    u32::from_ne_bytes(ip.octets())
}

// === impl PinnedPolicyMap ===

impl PinnedPolicyMap {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let path = path.as_ref();
        let data = MapData::from_pin(path).map_err(|source| MapError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let map = HashMap::try_from(Map::HashMap(data)).map_err(|source| MapError::Type {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Loaded pinned policy map");
        Ok(Self {
            map: Mutex::new(map),
        })
    }
}

impl PolicyMap for PinnedPolicyMap {
    fn update(&self, ip: Ipv4Addr, record: &PolicyRecord) -> anyhow::Result<()> {
        self.map
            .lock()
            .insert(key(ip), record.to_bytes(), 0)
            .map_err(|source| MapError::Update { ip, source })?;
        Ok(())
    }

    fn delete(&self, ip: Ipv4Addr) -> anyhow::Result<()> {
        self.map
            .lock()
            .remove(&key(ip))
            .map_err(|source| MapError::Delete { ip, source })?;
        Ok(())
    }
}

impl std::fmt::Debug for PinnedPolicyMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedPolicyMap").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_preserves_network_order() {
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        assert_eq!(key(ip).to_ne_bytes(), [10, 0, 0, 5]);
    }

    #[test]
    fn missing_pin_is_an_open_error() {
        let err = PinnedPolicyMap::load("/nonexistent/local_pod_ips").unwrap_err();
        assert!(matches!(err, MapError::Open { .. }), "{err}");
        assert!(err.to_string().contains("/nonexistent/local_pod_ips"));
    }
}
