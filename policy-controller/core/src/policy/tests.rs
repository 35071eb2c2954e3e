use super::*;
use maplit::btreemap;

fn annotations(pairs: impl IntoIterator<Item = (&'static str, &'static str)>) -> Map {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn cidr(s: &str) -> Cidr {
    crate::ports::parse_cidr(s).unwrap()
}

fn port_at(buf: &[u8], offset: usize, i: usize) -> u16 {
    let at = offset + i * PORT_LEN;
    u16::from_ne_bytes([buf[at], buf[at + 1]])
}

#[test]
fn istio_defaults() {
    let record = PolicyRecord::encode(MeshFlavor::Istio, &Map::default());
    assert_eq!(record.status_port, 15021);
    assert_eq!(
        record.exclude_inbound_ports,
        [15006, 15001, 15008, 15090, 15021, 15020, 15000]
    );
    assert!(record.exclude_outbound_ports.is_empty());
    assert!(record.include_inbound_ports.is_empty());
    assert!(record.include_outbound_ports.is_empty());
    assert!(record.exclude_outbound_ranges.is_empty());
    assert!(record.include_outbound_ranges.is_empty());
}

#[test]
fn linkerd_uses_istio_vocabulary() {
    let anns = annotations([
        ("status.sidecar.istio.io/port", "4191"),
        ("traffic.sidecar.istio.io/excludeOutboundPorts", "25"),
    ]);
    assert_eq!(
        PolicyRecord::encode(MeshFlavor::Linkerd, &anns),
        PolicyRecord::encode(MeshFlavor::Istio, &anns),
    );
}

#[test]
fn kuma_defaults() {
    let record = PolicyRecord::encode(MeshFlavor::Kuma, &Map::default());
    assert_eq!(record.status_port, 0);
    assert_eq!(record.exclude_inbound_ports, [9901, 15001, 15006, 15010]);
    assert!(record.exclude_outbound_ports.is_empty());
}

#[test]
fn kuma_ignores_istio_annotations() {
    let anns = annotations([
        ("status.sidecar.istio.io/port", "8080"),
        ("traffic.sidecar.istio.io/includeInboundPorts", "80"),
        ("traffic.sidecar.istio.io/excludeOutboundIPRanges", "10.0.0.0/8"),
        ("traffic.kuma.io/exclude-inbound-ports", "8081"),
        ("traffic.kuma.io/exclude-outbound-ports", "5432,6379"),
    ]);
    let record = PolicyRecord::encode(MeshFlavor::Kuma, &anns);
    assert_eq!(record.status_port, 0);
    assert!(record.include_inbound_ports.is_empty());
    assert!(record.exclude_outbound_ranges.is_empty());
    assert_eq!(record.exclude_inbound_ports, [9901, 15001, 15006, 15010, 8081]);
    assert_eq!(record.exclude_outbound_ports, [5432, 6379]);
}

#[test]
fn out_of_range_port_is_dropped() {
    let anns = btreemap! {
        "traffic.sidecar.istio.io/excludeOutboundPorts".to_string() => "9999,70000".to_string(),
    };
    let record = PolicyRecord::encode(MeshFlavor::Istio, &anns);
    assert_eq!(record.exclude_outbound_ports, [9999]);
    assert_eq!(record.status_port, 15021);
}

#[test]
fn status_port_override() {
    let anns = annotations([("status.sidecar.istio.io/port", "18080")]);
    assert_eq!(
        PolicyRecord::encode(MeshFlavor::Istio, &anns).status_port,
        18080
    );

    let anns = annotations([("status.sidecar.istio.io/port", "bogus")]);
    assert_eq!(
        PolicyRecord::encode(MeshFlavor::Istio, &anns).status_port,
        15021,
        "invalid value keeps the default"
    );
}

#[test]
fn inbound_exclusions_extend_defaults_up_to_capacity() {
    let anns = annotations([(
        "traffic.sidecar.istio.io/excludeInboundPorts",
        "1,2,3,4,5",
    )]);
    let record = PolicyRecord::encode(MeshFlavor::Istio, &anns);
    assert_eq!(record.exclude_inbound_ports.len(), MAX_ITEMS);
    assert_eq!(
        record.exclude_inbound_ports,
        [15006, 15001, 15008, 15090, 15021, 15020, 15000, 1, 2, 3]
    );
}

#[test]
fn lists_keep_the_first_entries() {
    let anns = annotations([
        (
            "traffic.sidecar.istio.io/includeInboundPorts",
            "1,2,3,4,5,6,7,8,9,10,11,12",
        ),
        (
            "traffic.sidecar.istio.io/includeOutboundPorts",
            "x,21,22,23,24,25,26,27,28,29,30,31",
        ),
        (
            "traffic.sidecar.istio.io/excludeOutboundIPRanges",
            "10.0.0.0/8,10.1.0.0/16,10.2.0.0/16,10.3.0.0/16,10.4.0.0/16,10.5.0.0/16,\
             10.6.0.0/16,10.7.0.0/16,10.8.0.0/16,10.9.0.0/16,10.10.0.0/16",
        ),
    ]);
    let record = PolicyRecord::encode(MeshFlavor::Istio, &anns);
    assert_eq!(record.include_inbound_ports, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    assert_eq!(
        record.include_outbound_ports,
        [21, 22, 23, 24, 25, 26, 27, 28, 29, 30]
    );
    assert_eq!(record.exclude_outbound_ranges.len(), MAX_ITEMS);
    assert_eq!(record.exclude_outbound_ranges.as_slice()[0], cidr("10.0.0.0/8"));
    assert_eq!(
        record.exclude_outbound_ranges.as_slice()[9],
        cidr("10.9.0.0/16")
    );
}

#[test]
fn include_and_exclude_lists_are_independent() {
    let anns = annotations([
        ("traffic.sidecar.istio.io/includeInboundPorts", "8080"),
        ("traffic.sidecar.istio.io/includeOutboundPorts", "443"),
        ("traffic.sidecar.istio.io/includeOutboundIPRanges", "*"),
        (
            "traffic.sidecar.istio.io/excludeOutboundIPRanges",
            "169.254.169.254/32, bogus",
        ),
    ]);
    let record = PolicyRecord::encode(MeshFlavor::Istio, &anns);
    assert_eq!(record.include_inbound_ports, [8080]);
    assert_eq!(record.include_outbound_ports, [443]);
    assert_eq!(record.include_outbound_ranges, [Cidr::ANY]);
    assert_eq!(
        record.exclude_outbound_ranges,
        [cidr("169.254.169.254/32")]
    );
}

#[test]
fn record_layout() {
    let anns = annotations([
        ("status.sidecar.istio.io/port", "15020"),
        ("traffic.sidecar.istio.io/excludeOutboundIPRanges", "10.96.0.0/12"),
        ("traffic.sidecar.istio.io/includeOutboundIPRanges", "192.168.0.0/16"),
        ("traffic.sidecar.istio.io/includeInboundPorts", "8080"),
        ("traffic.sidecar.istio.io/includeOutboundPorts", "443"),
        ("traffic.sidecar.istio.io/excludeOutboundPorts", "5432"),
    ]);
    let buf = PolicyRecord::encode(MeshFlavor::Istio, &anns).to_bytes();
    assert_eq!(buf.len(), RECORD_LEN);

    assert_eq!(port_at(&buf, 0, 0), 15020);
    assert_eq!(&buf[2..4], &[0, 0], "padding");

    assert_eq!(&buf[4..8], &[10, 96, 0, 0], "network byte order");
    assert_eq!(buf[8], 12);
    assert_eq!(&buf[9..84], &[0u8; 75][..], "unused exclude ranges");

    assert_eq!(&buf[84..88], &[192, 168, 0, 0]);
    assert_eq!(buf[88], 16);

    assert_eq!(port_at(&buf, 164, 0), 8080);
    assert_eq!(port_at(&buf, 164, 1), 0);
    assert_eq!(port_at(&buf, 184, 0), 443);
    for (i, port) in [15006, 15001, 15008, 15090, 15021, 15020, 15000]
        .into_iter()
        .enumerate()
    {
        assert_eq!(port_at(&buf, 204, i), port);
    }
    assert_eq!(port_at(&buf, 204, 7), 0);
    assert_eq!(port_at(&buf, 224, 0), 5432);
    assert_eq!(&buf[226..], &[0u8; 18][..]);
}

#[test]
fn match_all_encodes_as_an_empty_slot() {
    let with_any = PolicyRecord::encode(
        MeshFlavor::Istio,
        &annotations([("traffic.sidecar.istio.io/includeOutboundIPRanges", "*")]),
    );
    let without = PolicyRecord::encode(MeshFlavor::Istio, &Map::default());
    assert_ne!(with_any, without, "lengths differ in-process");
    assert_eq!(with_any.to_bytes(), without.to_bytes(), "but not on the wire");
}

#[test]
fn encoding_is_deterministic() {
    let anns = annotations([
        ("traffic.sidecar.istio.io/excludeInboundPorts", "8081, 8082"),
        ("traffic.sidecar.istio.io/excludeOutboundIPRanges", "10.0.0.0/8"),
    ]);
    assert_eq!(
        PolicyRecord::encode(MeshFlavor::Istio, &anns).to_bytes(),
        PolicyRecord::encode(MeshFlavor::Istio, &anns).to_bytes(),
    );
}

#[test]
fn slots_drop_overflow() {
    let mut slots = (0..MAX_ITEMS as u16).collect::<Slots<u16>>();
    assert!(slots.is_full());
    assert!(!slots.push(99));
    assert_eq!(slots.len(), MAX_ITEMS);
    assert_eq!(slots.iter().last(), Some(&9));

    let mut slots = Slots::default();
    assert!(slots.push(1u16));
    assert_eq!(slots, [1]);
}

#[test]
fn annotation_keys() {
    assert_eq!(PolicyRecord::annotation_keys(MeshFlavor::Istio).count(), 7);
    assert_eq!(
        PolicyRecord::annotation_keys(MeshFlavor::Kuma).collect::<Vec<_>>(),
        vec![
            "traffic.kuma.io/exclude-inbound-ports",
            "traffic.kuma.io/exclude-outbound-ports"
        ]
    );
}
