use crate::{policy::Cidr, Map};
use anyhow::{bail, Context, Result};
use ipnet::{IpNet, Ipv4Net};

/// Reads `annotation` from the provided set of annotations, parsing it as an ordered port list.
///
/// Invalid tokens are logged and skipped; the remaining ports are returned in the order in which
/// they appear. Missing annotations produce an empty list.
pub fn ports_annotation(annotations: &Map, annotation: &str) -> Vec<u16> {
    let Some(spec) = annotations.get(annotation) else {
        return Vec::new();
    };
    tokens(spec)
        .filter_map(|token| {
            parse_port(token)
                .map_err(|error| {
                    tracing::warn!(%spec, %token, %annotation, %error, "Ignoring invalid port");
                })
                .ok()
        })
        .collect()
}

/// Reads `annotation` from the provided set of annotations, parsing it as an ordered CIDR list.
///
/// Invalid tokens are logged and skipped.
pub fn networks_annotation(annotations: &Map, annotation: &str) -> Vec<Cidr> {
    let Some(spec) = annotations.get(annotation) else {
        return Vec::new();
    };
    tokens(spec)
        .filter_map(|token| {
            parse_cidr(token)
                .map_err(|error| {
                    tracing::warn!(%spec, %token, %annotation, %error, "Ignoring invalid CIDR");
                })
                .ok()
        })
        .collect()
}

/// Parses a single decimal port.
pub fn parse_port(s: &str) -> Result<u16> {
    s.trim().parse().context("parsing port")
}

/// Parses a single IPv4 network.
///
/// `*` matches all addresses. IPv4-mapped IPv6 networks are reduced to the embedded IPv4
/// network; all other IPv6 networks are rejected since the datapath only handles IPv4.
pub fn parse_cidr(s: &str) -> Result<Cidr> {
    let s = s.trim();
    if s == "*" {
        return Ok(Cidr::ANY);
    }

    match s.parse::<IpNet>().context("parsing CIDR")? {
        IpNet::V4(net) => Ok(net.into()),
        IpNet::V6(net) => {
            let Some(addr) = net.addr().to_ipv4_mapped() else {
                bail!("IPv6 network {net} is not supported");
            };
            if net.prefix_len() < 96 {
                bail!("IPv4-mapped network {net} is wider than the IPv4 address space");
            }
            let net = Ipv4Net::new(addr, net.prefix_len() - 96)?;
            Ok(net.into())
        }
    }
}

/// Splits a comma-separated list, dropping empty entries.
fn tokens(spec: &str) -> impl Iterator<Item = &str> {
    spec.split(',').map(str::trim).filter(|t| !t.is_empty())
}
