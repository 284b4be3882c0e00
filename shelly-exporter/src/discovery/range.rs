use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

static DASH_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}(?:\.\d{1,3}){3})\s*-\s*(\d{1,3}(?:\.\d{1,3}){3})$").unwrap()
});

/// Largest range expanded, a full /16. Bigger ranges are skipped.
pub const MAX_RANGE_ADDRESSES: u64 = 65_536;

/// Expand one range specification into addresses, in ascending order.
///
/// Accepted forms:
/// - CIDR, e.g. `10.0.80.0/24`. Network and broadcast addresses are left out
///   for prefixes up to /30.
/// - Inclusive start-end range, e.g. `10.0.80.10-10.0.80.20`, in any order.
/// - A single address.
///
/// Anything else, or a range over [`MAX_RANGE_ADDRESSES`], is logged and
/// yields no addresses.
pub fn expand_range(input: &str) -> Vec<Ipv4Addr> {
    let input = input.trim();
    let bounds = if input.contains('/') {
        cidr_bounds(input)
    } else if let Some(caps) = DASH_RANGE.captures(input) {
        dash_bounds(&caps[1], &caps[2])
    } else {
        input
            .parse::<Ipv4Addr>()
            .ok()
            .map(|addr| (u64::from(u32::from(addr)), u64::from(u32::from(addr))))
    };

    let Some((first, last)) = bounds else {
        warn!(range = %input, "Invalid network range, skipping");
        return Vec::new();
    };

    let size = last - first + 1;
    if size > MAX_RANGE_ADDRESSES {
        warn!(
            range = %input,
            addresses = size,
            max = MAX_RANGE_ADDRESSES,
            "Network range too large, skipping"
        );
        return Vec::new();
    }
    addresses_between(first, last)
}

fn cidr_bounds(input: &str) -> Option<(u64, u64)> {
    let (addr, prefix) = input.split_once('/')?;
    let addr: Ipv4Addr = addr.trim().parse().ok()?;
    let prefix: u32 = prefix.trim().parse().ok()?;
    if prefix > 32 {
        return None;
    }

    let mask: u64 = if prefix == 0 {
        0
    } else {
        (u64::from(u32::MAX) << (32 - prefix)) & u64::from(u32::MAX)
    };
    let network = u64::from(u32::from(addr)) & mask;
    let size = 1u64 << (32 - prefix);
    let last = network + size - 1;

    if prefix <= 30 {
        Some((network + 1, last - 1))
    } else {
        Some((network, last))
    }
}

fn dash_bounds(start: &str, end: &str) -> Option<(u64, u64)> {
    let start = u64::from(u32::from(start.parse::<Ipv4Addr>().ok()?));
    let end = u64::from(u32::from(end.parse::<Ipv4Addr>().ok()?));
    Some((start.min(end), start.max(end)))
}

fn addresses_between(first: u64, last: u64) -> Vec<Ipv4Addr> {
    (first..=last)
        .filter_map(|raw| u32::try_from(raw).ok())
        .map(Ipv4Addr::from)
        .collect()
}

/// Union of every range minus the excluded addresses, ordered numerically.
///
/// Exclusions accept the same forms as ranges.
pub fn candidate_addresses<S: AsRef<str>>(ranges: &[S], exclude: &[S]) -> Vec<Ipv4Addr> {
    let excluded: BTreeSet<Ipv4Addr> = exclude
        .iter()
        .flat_map(|input| expand_range(input.as_ref()))
        .collect();

    ranges
        .iter()
        .flat_map(|input| expand_range(input.as_ref()))
        .filter(|addr| !excluded.contains(addr))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("10.0.80.0/30", 2)]
    #[case("10.0.80.0/24", 254)]
    #[case("10.0.80.0/31", 2)]
    #[case("10.0.80.7/32", 1)]
    #[case("10.0.80.10-10.0.80.20", 11)]
    #[case("10.0.80.20-10.0.80.10", 11)]
    #[case("10.0.80.5", 1)]
    #[case("not-a-range", 0)]
    #[case("10.0.80.0/33", 0)]
    #[case("10.0.80.300", 0)]
    #[case("10.0.0.0/16", 65_534)]
    #[case("10.0.0.0/15", 0)]
    #[case("10.0.0.0/8", 0)]
    #[case("0.0.0.0/0", 0)]
    #[case("10.0.0.0-10.1.0.0", 0)]
    #[case("10.0.0.0-10.0.255.255", 65_536)]
    fn test_expand_range_sizes(#[case] input: &str, #[case] expected: usize) {
        assert_eq!(expand_range(input).len(), expected);
    }

    #[test]
    fn test_cidr_excludes_network_and_broadcast() {
        let addrs = expand_range("192.168.1.0/30");
        assert_eq!(
            addrs,
            vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2)]
        );

        let masked = expand_range("192.168.1.77/24");
        assert_eq!(masked.first(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(masked.last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
    }

    #[test]
    fn test_reversed_range_is_normalized() {
        let forward = expand_range("10.0.0.250-10.0.1.5");
        let reverse = expand_range("10.0.1.5 - 10.0.0.250");
        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), 12);
        assert_eq!(forward[0], Ipv4Addr::new(10, 0, 0, 250));
    }

    #[test]
    fn test_candidates_union_exclude_and_order() {
        let ranges = ["10.0.0.8-10.0.0.10", "10.0.0.0/30", "bogus", "10.0.0.9"];
        let exclude = ["10.0.0.2", "10.0.0.10"];
        let candidates = candidate_addresses(&ranges, &exclude);
        assert_eq!(
            candidates,
            vec![
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 8),
                Ipv4Addr::new(10, 0, 0, 9),
            ]
        );
    }
}
