//! CIDR ranges and range sets

use crate::{Result, TrackerError};
use ipnetwork::{IpNetwork, Ipv4Network};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// An IP network in canonical form (host bits cleared)
///
/// Ranges are ordered by address family, then end address, then start
/// address. Within a sorted, non-overlapping set this is the same as ordering
/// by end address, which is what the diff relies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cidr {
    network: IpNetwork,
}

impl Cidr {
    /// Create a range from a base address and prefix length
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self> {
        let network = IpNetwork::new(addr, prefix)
            .map_err(|e| TrackerError::parse(&format!("{}/{}", addr, prefix), e))?;
        Self::canonical(network)
    }

    fn canonical(network: IpNetwork) -> Result<Self> {
        let network = IpNetwork::new(network.network(), network.prefix())
            .map_err(|e| TrackerError::parse(&network.to_string(), e))?;
        Ok(Self { network })
    }

    pub fn network(&self) -> IpNetwork {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.network.prefix()
    }

    pub fn is_ipv4(&self) -> bool {
        self.network.is_ipv4()
    }

    /// First address of the range
    pub fn start(&self) -> IpAddr {
        self.network.network()
    }

    /// Last address of the range (inclusive)
    pub fn end(&self) -> IpAddr {
        let (_, _, end) = self.bounds();
        match self.network {
            IpNetwork::V4(_) => IpAddr::V4(Ipv4Addr::from(end as u32)),
            IpNetwork::V6(_) => IpAddr::V6(end.into()),
        }
    }

    /// Whether the two ranges share at least one address
    pub fn overlaps(&self, other: &Cidr) -> bool {
        let (fa, sa, ea) = self.bounds();
        let (fb, sb, eb) = other.bounds();
        fa == fb && sa <= eb && sb <= ea
    }

    /// (family, start, end) with addresses widened to u128
    fn bounds(&self) -> (u8, u128, u128) {
        match self.network {
            IpNetwork::V4(net) => {
                let start = u32::from(net.network());
                let host = u32::MAX.checked_shr(net.prefix() as u32).unwrap_or(0);
                (4, start as u128, (start | host) as u128)
            }
            IpNetwork::V6(net) => {
                let start = u128::from(net.network());
                let host = u128::MAX.checked_shr(net.prefix() as u32).unwrap_or(0);
                (6, start, start | host)
            }
        }
    }
}

impl Ord for Cidr {
    fn cmp(&self, other: &Self) -> Ordering {
        let (fa, sa, ea) = self.bounds();
        let (fb, sb, eb) = other.bounds();
        fa.cmp(&fb).then(ea.cmp(&eb)).then(sa.cmp(&sb))
    }
}

impl PartialOrd for Cidr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Cidr {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        if !s.contains('/') {
            return Err(TrackerError::parse(s, "missing prefix length"));
        }
        let network: IpNetwork = s.parse().map_err(|e| TrackerError::parse(s, e))?;
        Self::canonical(network)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network.network(), self.network.prefix())
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Half-open IPv4 address range `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Range {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for Ipv4Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Split address ranges into the minimal sequence of aligned CIDR blocks.
///
/// Output is ascending when the input ranges are sorted and disjoint.
pub fn cidrs_from_ranges(ranges: &[Ipv4Range]) -> Result<Vec<Cidr>> {
    let mut cidrs = Vec::new();

    for range in ranges {
        let mut start = u32::from(range.start) as u64;
        let end = u32::from(range.end) as u64;
        if start > end {
            return Err(TrackerError::parse(&range.to_string(), "start is after end"));
        }

        while start < end {
            // Largest block aligned on `start` that does not pass `end`
            let mut bits = start.trailing_zeros().min(32);
            while (1u64 << bits) > end - start {
                bits -= 1;
            }
            let net = Ipv4Network::new(Ipv4Addr::from(start as u32), (32 - bits) as u8)
                .map_err(|e| TrackerError::parse(&range.to_string(), e))?;
            cidrs.push(Cidr::canonical(IpNetwork::V4(net))?);
            start += 1u64 << bits;
        }
    }

    Ok(cidrs)
}

/// Check that a range set is strictly ascending and non-overlapping
pub fn validate_range_set(set: &[Cidr]) -> Result<()> {
    for pair in set.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.overlaps(b) {
            return Err(TrackerError::Configuration(format!("{} overlaps {}", a, b)));
        }
        if a >= b {
            return Err(TrackerError::Configuration(format!(
                "{} is not ordered before {}",
                a, b
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cidr(s: &str) -> Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn test_round_trip_canonical_strings() {
        for s in ["10.0.0.0/24", "10.32.0.0/12", "0.0.0.0/0", "192.168.1.7/32", "fd00::/64"] {
            assert_eq!(cidr(s).to_string(), s);
        }
    }

    #[test]
    fn test_host_bits_are_cleared() {
        assert_eq!(cidr("10.0.1.5/24").to_string(), "10.0.1.0/24");
        assert_eq!(cidr("10.0.1.5/24"), cidr("10.0.1.0/24"));
    }

    #[test]
    fn test_parse_errors() {
        for s in ["", "10.0.0.0", "10.0.0.0/33", "not-a-cidr/8", "10.0.0.0/x"] {
            let err = s.parse::<Cidr>().unwrap_err();
            assert!(matches!(err, TrackerError::Parse { .. }), "{:?} parsed", s);
        }
    }

    #[test]
    fn test_start_and_end() {
        let c = cidr("10.0.2.0/23");
        assert_eq!(c.start(), "10.0.2.0".parse::<IpAddr>().unwrap());
        assert_eq!(c.end(), "10.0.3.255".parse::<IpAddr>().unwrap());

        let all = cidr("0.0.0.0/0");
        assert_eq!(all.end(), "255.255.255.255".parse::<IpAddr>().unwrap());

        let host = cidr("fd00::1/128");
        assert_eq!(host.start(), host.end());
    }

    #[test]
    fn test_order_by_end_address() {
        let mut set = vec![cidr("10.0.2.0/24"), cidr("10.0.0.0/24"), cidr("10.0.1.0/24")];
        set.sort();
        assert_eq!(
            set,
            vec![cidr("10.0.0.0/24"), cidr("10.0.1.0/24"), cidr("10.0.2.0/24")]
        );

        // Same end address, different start
        assert!(cidr("10.0.0.0/23") < cidr("10.0.1.0/24"));
        // IPv4 sorts before IPv6
        assert!(cidr("255.0.0.0/8") < cidr("::/128"));
    }

    #[test]
    fn test_overlaps() {
        assert!(cidr("10.0.0.0/16").overlaps(&cidr("10.0.5.0/24")));
        assert!(cidr("10.0.5.0/24").overlaps(&cidr("10.0.0.0/16")));
        assert!(!cidr("10.0.0.0/24").overlaps(&cidr("10.0.1.0/24")));
        assert!(!cidr("0.0.0.0/0").overlaps(&cidr("::/0")));
    }

    #[test]
    fn test_cidrs_from_ranges() {
        let ranges = vec![
            Ipv4Range::new("10.32.0.0".parse().unwrap(), "10.32.0.128".parse().unwrap()),
            Ipv4Range::new("10.32.1.1".parse().unwrap(), "10.32.1.8".parse().unwrap()),
        ];
        let cidrs: Vec<String> = cidrs_from_ranges(&ranges)
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            cidrs,
            vec!["10.32.0.0/25", "10.32.1.1/32", "10.32.1.2/31", "10.32.1.4/30"]
        );
    }

    #[test]
    fn test_cidrs_from_ranges_edge_cases() {
        let empty = Ipv4Range::new("10.0.0.1".parse().unwrap(), "10.0.0.1".parse().unwrap());
        assert!(cidrs_from_ranges(&[empty]).unwrap().is_empty());

        let inverted = Ipv4Range::new("10.0.0.9".parse().unwrap(), "10.0.0.1".parse().unwrap());
        assert!(matches!(
            cidrs_from_ranges(&[inverted]),
            Err(TrackerError::Parse { .. })
        ));

        let from_zero = Ipv4Range::new(Ipv4Addr::UNSPECIFIED, "128.0.0.0".parse().unwrap());
        let cidrs = cidrs_from_ranges(&[from_zero]).unwrap();
        assert_eq!(cidrs, vec![cidr("0.0.0.0/1")]);
    }

    #[test]
    fn test_validate_range_set() {
        assert!(validate_range_set(&[]).is_ok());
        assert!(validate_range_set(&[cidr("10.0.0.0/24"), cidr("10.0.1.0/24")]).is_ok());

        let unsorted = [cidr("10.0.1.0/24"), cidr("10.0.0.0/24")];
        assert!(matches!(
            validate_range_set(&unsorted),
            Err(TrackerError::Configuration(_))
        ));

        let overlapping = [cidr("10.0.0.0/24"), cidr("10.0.0.0/16")];
        assert!(matches!(
            validate_range_set(&overlapping),
            Err(TrackerError::Configuration(_))
        ));

        let duplicate = [cidr("10.0.0.0/24"), cidr("10.0.0.0/24")];
        assert!(validate_range_set(&duplicate).is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let c: Cidr = serde_json::from_str("\"10.0.0.0/8\"").unwrap();
        assert_eq!(c, cidr("10.0.0.0/8"));
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"10.0.0.0/8\"");
        assert!(serde_json::from_str::<Cidr>("\"10.0.0.0\"").is_err());
    }

    proptest! {
        #[test]
        fn test_canonical_v4_round_trip(addr in any::<u32>(), prefix in 0u8..=32) {
            let c = Cidr::new(IpAddr::V4(Ipv4Addr::from(addr)), prefix).unwrap();
            let s = c.to_string();
            prop_assert_eq!(s.parse::<Cidr>().unwrap(), c);
            prop_assert_eq!(s.parse::<Cidr>().unwrap().to_string(), s);
            prop_assert!(c.start() <= c.end());
        }

        #[test]
        fn test_canonical_v6_round_trip(addr in any::<u128>(), prefix in 0u8..=128) {
            let c = Cidr::new(IpAddr::V6(addr.into()), prefix).unwrap();
            let s = c.to_string();
            prop_assert_eq!(s.parse::<Cidr>().unwrap(), c);
            prop_assert_eq!(s.parse::<Cidr>().unwrap().to_string(), s);
        }
    }
}
