use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::ScanError;
use crate::types::TargetSpec;

/// Hard cap on CIDR-derived target counts. Requests expanding past this must
/// fail deterministically, never silently truncate.
pub const MAX_EXPAND: u64 = 65536;

/// Expand a target spec into a deduplicated list of host identifiers.
///
/// CIDR specs enumerate ascending by address value and exclude the network
/// and broadcast addresses for prefixes up to /30; /31 and /32 have no
/// broadcast semantics and keep every address. The cap applies to CIDR
/// expansion only — explicit lists are user-entered and self-limiting.
///
/// The returned order is deterministic (ascending for CIDR, first-seen for
/// lists) so that an `ordered` scan has a defined probe sequence, but only
/// membership carries meaning.
pub fn expand(spec: &TargetSpec, max: u64) -> Result<Vec<String>, ScanError> {
    match spec {
        TargetSpec::List(tokens) => Ok(expand_list(tokens)),
        TargetSpec::Cidr(cidr) => expand_cidr(cidr, max),
    }
}

/// Split free-form tokens on whitespace, commas, and semicolons; trim, drop
/// empties, dedup preserving first occurrence.
fn expand_list(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for raw in tokens {
        for piece in raw.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
            let t = piece.trim();
            if t.is_empty() {
                continue;
            }
            if seen.insert(t.to_string()) {
                out.push(t.to_string());
            }
        }
    }
    out
}

fn expand_cidr(cidr: &str, max: u64) -> Result<Vec<String>, ScanError> {
    let net: Ipv4Net = cidr
        .trim()
        .parse()
        .map_err(|_| ScanError::InvalidTargetSpec(cidr.trim().to_string()))?;

    let prefix = net.prefix_len();
    let size: u64 = 1u64 << (32 - prefix as u32);
    let usable = if prefix <= 30 {
        size.saturating_sub(2)
    } else {
        size
    };

    // Check the cap before enumerating so oversized ranges (/0 included)
    // fail fast instead of allocating.
    if usable == 0 || usable > max {
        return Err(ScanError::TargetSetTooLarge { usable, max });
    }

    let base = u32::from(net.network());
    let (start, end) = if prefix <= 30 {
        (1u64, size - 2)
    } else {
        (0u64, size - 1)
    };

    Ok((start..=end)
        .map(|off| Ipv4Addr::from(base + off as u32).to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_set(v: Vec<String>) -> HashSet<String> {
        v.into_iter().collect()
    }

    #[test]
    fn slash30_excludes_network_and_broadcast() {
        let got = expand(&TargetSpec::Cidr("192.168.1.0/30".into()), MAX_EXPAND).unwrap();
        assert_eq!(got, vec!["192.168.1.1".to_string(), "192.168.1.2".to_string()]);
    }

    #[test]
    fn slash24_yields_254_hosts() {
        let got = expand(&TargetSpec::Cidr("10.1.2.0/24".into()), MAX_EXPAND).unwrap();
        assert_eq!(got.len(), 254);
        assert_eq!(got.first().unwrap(), "10.1.2.1");
        assert_eq!(got.last().unwrap(), "10.1.2.254");
    }

    #[test]
    fn slash31_and_slash32_keep_every_address() {
        let got = expand(&TargetSpec::Cidr("10.0.0.0/31".into()), MAX_EXPAND).unwrap();
        assert_eq!(got, vec!["10.0.0.0".to_string(), "10.0.0.1".to_string()]);

        let got = expand(&TargetSpec::Cidr("10.0.0.0/32".into()), MAX_EXPAND).unwrap();
        assert_eq!(got, vec!["10.0.0.0".to_string()]);
    }

    #[test]
    fn oversized_range_fails_with_computed_size() {
        let err = expand(&TargetSpec::Cidr("10.0.0.0/8".into()), MAX_EXPAND).unwrap_err();
        match err {
            ScanError::TargetSetTooLarge { usable, max } => {
                assert_eq!(usable, (1u64 << 24) - 2);
                assert_eq!(max, MAX_EXPAND);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn slash_zero_fails_at_the_cap_check() {
        assert!(matches!(
            expand(&TargetSpec::Cidr("0.0.0.0/0".into()), MAX_EXPAND),
            Err(ScanError::TargetSetTooLarge { .. })
        ));
    }

    #[test]
    fn malformed_cidr_is_rejected() {
        for bad in ["10.0.0.0/33", "10.0.0/24", "not-a-cidr/8", "10.0.0.0/"] {
            assert!(matches!(
                expand(&TargetSpec::Cidr(bad.into()), MAX_EXPAND),
                Err(ScanError::InvalidTargetSpec(_))
            ));
        }
    }

    #[test]
    fn expansion_is_deterministic() {
        let spec = TargetSpec::Cidr("172.16.4.0/28".into());
        assert_eq!(
            expand(&spec, MAX_EXPAND).unwrap(),
            expand(&spec, MAX_EXPAND).unwrap()
        );
    }

    #[test]
    fn list_splits_on_mixed_separators() {
        let got = expand(
            &TargetSpec::List(vec![" 10.0.0.1, 10.0.0.1  10.0.0.2\n".into()]),
            MAX_EXPAND,
        )
        .unwrap();
        assert_eq!(got, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
    }

    #[test]
    fn list_dedup_is_order_insensitive_as_a_set() {
        let a = expand(
            &TargetSpec::List(vec!["a".into(), "a".into(), "b".into()]),
            MAX_EXPAND,
        )
        .unwrap();
        let b = expand(&TargetSpec::List(vec!["b".into(), "a".into()]), MAX_EXPAND).unwrap();
        assert_eq!(as_set(a), as_set(b));
    }

    #[test]
    fn semicolon_separated_hostnames() {
        let got = expand(
            &TargetSpec::List(vec!["gw.local;printer.local ; gw.local".into()]),
            MAX_EXPAND,
        )
        .unwrap();
        assert_eq!(
            got,
            vec!["gw.local".to_string(), "printer.local".to_string()]
        );
    }
}
