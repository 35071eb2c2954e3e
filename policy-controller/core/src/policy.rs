//! Per-pod redirection records.
//!
//! A [`PolicyRecord`] holds each list with its real length. Only [`PolicyRecord::to_bytes`]
//! flattens it into the fixed-capacity layout that the datapath reads, where unused slots are
//! zeroed. Because zero also encodes valid entries (port 0, or `0.0.0.0/0` which is what `*`
//! becomes), the datapath cannot distinguish such an entry from an empty slot. That ambiguity is
//! part of the wire format and is preserved here.

use crate::{
    ports::{networks_annotation, ports_annotation},
    Map, MeshFlavor,
};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// The number of entries in each list of the wire record.
pub const MAX_ITEMS: usize = 10;

/// The size of an encoded record.
pub const RECORD_LEN: usize = 244;

const CIDR_LEN: usize = 8;
const PORT_LEN: usize = 2;
const CIDRS_LEN: usize = CIDR_LEN * MAX_ITEMS;
const PORTS_LEN: usize = PORT_LEN * MAX_ITEMS;

const STATUS_PORT_OFFSET: usize = 0;
const EXCLUDE_OUT_RANGES_OFFSET: usize = 4;
const INCLUDE_OUT_RANGES_OFFSET: usize = EXCLUDE_OUT_RANGES_OFFSET + CIDRS_LEN;
const INCLUDE_IN_PORTS_OFFSET: usize = INCLUDE_OUT_RANGES_OFFSET + CIDRS_LEN;
const INCLUDE_OUT_PORTS_OFFSET: usize = INCLUDE_IN_PORTS_OFFSET + PORTS_LEN;
const EXCLUDE_IN_PORTS_OFFSET: usize = INCLUDE_OUT_PORTS_OFFSET + PORTS_LEN;
const EXCLUDE_OUT_PORTS_OFFSET: usize = EXCLUDE_IN_PORTS_OFFSET + PORTS_LEN;

const _: () = assert!(EXCLUDE_OUT_PORTS_OFFSET + PORTS_LEN == RECORD_LEN);

/// The redirection rules for a single pod.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyRecord {
    /// The port used for health probes, which is never redirected.
    pub status_port: u16,

    pub exclude_outbound_ranges: Slots<Cidr>,
    pub include_outbound_ranges: Slots<Cidr>,
    pub include_inbound_ports: Slots<u16>,
    pub include_outbound_ports: Slots<u16>,
    pub exclude_inbound_ports: Slots<u16>,
    pub exclude_outbound_ports: Slots<u16>,
}

/// An IPv4 network as the datapath matches it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cidr {
    pub net: Ipv4Addr,
    pub prefix_len: u8,
}

/// An ordered list that holds at most [`MAX_ITEMS`] entries.
///
/// Entries pushed beyond capacity are dropped, so the first entries always win.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slots<T>(Vec<T>);

/// The annotations a mesh uses to configure redirection, along with its defaults.
#[derive(Debug)]
struct Vocabulary {
    status_port: Option<&'static str>,
    default_status_port: u16,
    exclude_inbound_ports: &'static str,
    default_exclude_inbound_ports: &'static [u16],
    exclude_outbound_ports: &'static str,
    include_inbound_ports: Option<&'static str>,
    include_outbound_ports: Option<&'static str>,
    exclude_outbound_ranges: Option<&'static str>,
    include_outbound_ranges: Option<&'static str>,
}

/// Istio's vocabulary. Linkerd pods are configured with the same annotations.
static ISTIO: Vocabulary = Vocabulary {
    status_port: Some("status.sidecar.istio.io/port"),
    default_status_port: 15021,
    exclude_inbound_ports: "traffic.sidecar.istio.io/excludeInboundPorts",
    // Proxy outbound, inbound, tunnel, telemetry, health, merged-metrics and admin ports.
    default_exclude_inbound_ports: &[15006, 15001, 15008, 15090, 15021, 15020, 15000],
    exclude_outbound_ports: "traffic.sidecar.istio.io/excludeOutboundPorts",
    include_inbound_ports: Some("traffic.sidecar.istio.io/includeInboundPorts"),
    include_outbound_ports: Some("traffic.sidecar.istio.io/includeOutboundPorts"),
    exclude_outbound_ranges: Some("traffic.sidecar.istio.io/excludeOutboundIPRanges"),
    include_outbound_ranges: Some("traffic.sidecar.istio.io/includeOutboundIPRanges"),
};

static KUMA: Vocabulary = Vocabulary {
    status_port: None,
    default_status_port: 0,
    exclude_inbound_ports: "traffic.kuma.io/exclude-inbound-ports",
    default_exclude_inbound_ports: &[9901, 15001, 15006, 15010],
    exclude_outbound_ports: "traffic.kuma.io/exclude-outbound-ports",
    include_inbound_ports: None,
    include_outbound_ports: None,
    exclude_outbound_ranges: None,
    include_outbound_ranges: None,
};

// === impl PolicyRecord ===

impl PolicyRecord {
    /// Builds a pod's record from its annotations.
    ///
    /// This never fails: values that cannot be parsed are logged and skipped.
    pub fn encode(flavor: MeshFlavor, annotations: &Map) -> Self {
        let vocab = Vocabulary::of(flavor);

        let status_port = vocab
            .status_port
            .and_then(|annotation| {
                let spec = annotations.get(annotation)?;
                spec.trim()
                    .parse::<u16>()
                    .map_err(|error| {
                        tracing::warn!(%spec, %annotation, %error, "Ignoring invalid status port");
                    })
                    .ok()
            })
            .unwrap_or(vocab.default_status_port);

        let ports = |annotation: Option<&str>| -> Slots<u16> {
            annotation
                .map(|a| ports_annotation(annotations, a))
                .unwrap_or_default()
                .into_iter()
                .collect()
        };
        let networks = |annotation: Option<&str>| -> Slots<Cidr> {
            annotation
                .map(|a| networks_annotation(annotations, a))
                .unwrap_or_default()
                .into_iter()
                .collect()
        };

        // Annotated inbound exclusions extend the mesh's own ports rather than replacing them.
        let exclude_inbound_ports = vocab
            .default_exclude_inbound_ports
            .iter()
            .copied()
            .chain(ports_annotation(annotations, vocab.exclude_inbound_ports))
            .collect();

        Self {
            status_port,
            exclude_outbound_ranges: networks(vocab.exclude_outbound_ranges),
            include_outbound_ranges: networks(vocab.include_outbound_ranges),
            include_inbound_ports: ports(vocab.include_inbound_ports),
            include_outbound_ports: ports(vocab.include_outbound_ports),
            exclude_inbound_ports,
            exclude_outbound_ports: ports(Some(vocab.exclude_outbound_ports)),
        }
    }

    /// Returns the annotations that can affect a record for the given flavor.
    pub fn annotation_keys(flavor: MeshFlavor) -> impl Iterator<Item = &'static str> {
        let vocab = Vocabulary::of(flavor);
        [
            vocab.status_port,
            Some(vocab.exclude_inbound_ports),
            Some(vocab.exclude_outbound_ports),
            vocab.include_inbound_ports,
            vocab.include_outbound_ports,
            vocab.exclude_outbound_ranges,
            vocab.include_outbound_ranges,
        ]
        .into_iter()
        .flatten()
    }

    /// Flattens the record into the datapath's fixed layout.
    ///
    /// Ports are written in host byte order; networks are written in network byte order.
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[STATUS_PORT_OFFSET..STATUS_PORT_OFFSET + PORT_LEN]
            .copy_from_slice(&self.status_port.to_ne_bytes());
        put_cidrs(
            &mut buf[EXCLUDE_OUT_RANGES_OFFSET..][..CIDRS_LEN],
            &self.exclude_outbound_ranges,
        );
        put_cidrs(
            &mut buf[INCLUDE_OUT_RANGES_OFFSET..][..CIDRS_LEN],
            &self.include_outbound_ranges,
        );
        put_ports(
            &mut buf[INCLUDE_IN_PORTS_OFFSET..][..PORTS_LEN],
            &self.include_inbound_ports,
        );
        put_ports(
            &mut buf[INCLUDE_OUT_PORTS_OFFSET..][..PORTS_LEN],
            &self.include_outbound_ports,
        );
        put_ports(
            &mut buf[EXCLUDE_IN_PORTS_OFFSET..][..PORTS_LEN],
            &self.exclude_inbound_ports,
        );
        put_ports(
            &mut buf[EXCLUDE_OUT_PORTS_OFFSET..][..PORTS_LEN],
            &self.exclude_outbound_ports,
        );
        buf
    }
}

fn put_cidrs(buf: &mut [u8], cidrs: &Slots<Cidr>) {
    for (slot, cidr) in buf.chunks_exact_mut(CIDR_LEN).zip(cidrs.iter()) {
        slot[..4].copy_from_slice(&cidr.net.octets());
        slot[4] = cidr.prefix_len;
    }
}

fn put_ports(buf: &mut [u8], ports: &Slots<u16>) {
    for (slot, port) in buf.chunks_exact_mut(PORT_LEN).zip(ports.iter()) {
        slot.copy_from_slice(&port.to_ne_bytes());
    }
}

// === impl Vocabulary ===

impl Vocabulary {
    fn of(flavor: MeshFlavor) -> &'static Self {
        match flavor {
            MeshFlavor::Istio | MeshFlavor::Linkerd => &ISTIO,
            MeshFlavor::Kuma => &KUMA,
        }
    }
}

// === impl Cidr ===

impl Cidr {
    /// Matches every address. Encodes identically to an empty slot.
    pub const ANY: Self = Self {
        net: Ipv4Addr::UNSPECIFIED,
        prefix_len: 0,
    };
}

impl From<Ipv4Net> for Cidr {
    fn from(net: Ipv4Net) -> Self {
        Self {
            net: net.network(),
            prefix_len: net.prefix_len(),
        }
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.net, self.prefix_len)
    }
}

// === impl Slots ===

impl<T> Slots<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.0.len() >= MAX_ITEMS
    }

    /// Appends an entry, returning false if the list is already full.
    pub fn push(&mut self, item: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.0.push(item);
        true
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self(Vec::with_capacity(MAX_ITEMS))
    }
}

impl<T> FromIterator<T> for Slots<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut slots = Self::default();
        slots.0.extend(iter.into_iter().take(MAX_ITEMS));
        slots
    }
}

impl<'s, T> IntoIterator for &'s Slots<T> {
    type Item = &'s T;
    type IntoIter = std::slice::Iter<'s, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T: PartialEq> PartialEq<[T]> for Slots<T> {
    fn eq(&self, other: &[T]) -> bool {
        self.0.as_slice() == other
    }
}

impl<T: PartialEq, const N: usize> PartialEq<[T; N]> for Slots<T> {
    fn eq(&self, other: &[T; N]) -> bool {
        self.0.as_slice() == other.as_slice()
    }
}

#[cfg(test)]
mod tests;
