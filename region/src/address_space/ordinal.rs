//! Addresses as unsigned integers.
//!
//! IPv4 and IPv6 addresses both map into `u128`, which makes every count and
//! boundary exact for any subnet except the full IPv6 space.

use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

pub(super) fn ordinal(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(v4.to_bits()),
        IpAddr::V6(v6) => v6.to_bits(),
    }
}

/// Inverse of [`ordinal`] for an address inside `net`.
pub(super) fn address(net: IpNet, ordinal: u128) -> IpAddr {
    match net {
        // Ordinals derived from an IPv4 network always fit.
        IpNet::V4(_) => IpAddr::V4(Ipv4Addr::from_bits(
            u32::try_from(ordinal).unwrap_or(u32::MAX),
        )),
        IpNet::V6(_) => IpAddr::V6(Ipv6Addr::from_bits(ordinal)),
    }
}

/// Inclusive run of ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Span<C> {
    pub first: u128,
    pub last: u128,
    pub class: C,
}

impl<C> Span<C> {
    /// Number of addresses in the span. Exact for everything but `::/0`,
    /// which callers reject up front.
    pub const fn size(&self) -> u128 {
        (self.last - self.first).saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_round_trip() {
        let v4: IpNet = "10.0.0.0/8".parse().unwrap();
        let ip: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(ordinal(ip), 0x0a01_0203);
        assert_eq!(address(v4, ordinal(ip)), ip);

        let v6: IpNet = "2001:db8::/32".parse().unwrap();
        let ip: IpAddr = "2001:db8::ffff".parse().unwrap();
        assert_eq!(address(v6, ordinal(ip)), ip);
    }

    #[test]
    fn span_size_is_inclusive() {
        let span = Span {
            first: 10,
            last: 10,
            class: (),
        };
        assert_eq!(span.size(), 1);
        let top = Span {
            first: u128::MAX - 15,
            last: u128::MAX,
            class: (),
        };
        assert_eq!(top.size(), 16);
    }
}
