use anyhow::{anyhow, Result};
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Detect local non-loopback IPv4 addresses and convert each to a default
/// /24 CIDR network, deduplicated and sorted for stable output.
///
/// An interface IP `192.168.1.42` becomes `192.168.1.0/24`.
pub fn detect_local_cidrs() -> Result<Vec<Ipv4Net>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs)
}

/// Convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
    Ipv4Net::new(net, 24).expect("/24 is always valid")
}

/// Pick the IPv4 interface a neighbor scan should target.
///
/// With a name, the interface must exist and carry an IPv4 address;
/// otherwise the first non-loopback IPv4 interface is used.
pub fn pick_ipv4_interface(name: Option<&str>) -> Result<(String, Ipv4Addr)> {
    let ifaces = get_if_addrs()?;

    if let Some(wanted) = name {
        for iface in &ifaces {
            if iface.name == wanted {
                if let IfAddr::V4(v4) = &iface.addr {
                    return Ok((iface.name.clone(), v4.ip));
                }
            }
        }
        return Err(anyhow!("interface not found: {wanted}"));
    }

    ifaces
        .iter()
        .find_map(|iface| match &iface.addr {
            IfAddr::V4(v4) if !v4.ip.is_loopback() => Some((iface.name.clone(), v4.ip)),
            _ => None,
        })
        .ok_or_else(|| anyhow!("no non-loopback IPv4 interface available"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cidr_from_ipv4() {
        let cidr = ipv4_to_default_cidr(Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(cidr.to_string(), "10.1.2.0/24");
    }

    #[test]
    fn unknown_interface_name_errors() {
        let err = pick_ipv4_interface(Some("definitely-not-a-real-iface0")).unwrap_err();
        assert!(err.to_string().contains("interface not found"));
    }
}
