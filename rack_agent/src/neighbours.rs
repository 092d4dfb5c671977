//! Reads the kernel neighbour table and filters it down to the requested networks.
//!
//! The expected layout is the one of `/proc/net/arp`:
//!
//! ```text
//! IP address       HW type     Flags       HW address            Mask     Device
//! 10.0.0.5         0x1         0x2         52:54:00:12:34:56     *        eth0
//! ```

use std::{fs, io, net::IpAddr};

use ipnet::IpNet;
use metalfleet_common::{Discovery, unix_time_seconds};

pub const DEFAULT_NEIGHBOURS_FILE: &str = "/proc/net/arp";

/// ATF_COM: the entry has a resolved hardware address.
const FLAG_COMPLETE: u32 = 0x2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbour {
    pub ip: IpAddr,
    pub mac: String,
}

/// Parses neighbour table text. Incomplete entries, zero MACs and lines that
/// don't parse are skipped.
#[must_use]
pub fn parse_table(content: &str) -> Vec<Neighbour> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ip = fields.next()?.parse().ok()?;
            let _hw_type = fields.next()?;
            let flags = fields.next()?.trim_start_matches("0x");
            let flags = u32::from_str_radix(flags, 16).ok()?;
            let mac = fields.next()?.to_ascii_lowercase();
            (flags & FLAG_COMPLETE != 0 && mac != "00:00:00:00:00:00")
                .then_some(Neighbour { ip, mac })
        })
        .collect()
}

/// Keeps the neighbours inside any of `cidrs`. CIDRs that don't parse match nothing.
#[must_use]
pub fn filter_by_cidrs(neighbours: Vec<Neighbour>, cidrs: &[String]) -> Vec<Discovery> {
    let networks: Vec<IpNet> = cidrs.iter().filter_map(|c| c.parse().ok()).collect();
    let observed_at = unix_time_seconds();
    neighbours
        .into_iter()
        .filter(|n| networks.iter().any(|net| net.contains(&n.ip)))
        .map(|n| Discovery {
            mac: n.mac,
            ip: n.ip.to_string(),
            observed_at,
        })
        .collect()
}

/// Reads `path` and returns the neighbours inside `cidrs`.
///
/// # Errors
///
/// Returns an error if the file can't be read.
pub fn scan_file(path: &str, cidrs: &[String]) -> io::Result<Vec<Discovery>> {
    let content = fs::read_to_string(path)?;
    Ok(filter_by_cidrs(parse_table(&content), cidrs))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
10.0.0.5         0x1         0x2         52:54:00:12:34:56     *        eth0
10.0.0.6         0x1         0x0         00:00:00:00:00:00     *        eth0
10.0.1.9         0x1         0x2         52:54:00:AB:CD:EF     *        eth1
192.168.7.1      0x1         0x6         52:54:00:00:00:01     *        eth2
garbage line
";

    #[test]
    fn parses_complete_entries_only() {
        let parsed = parse_table(TABLE);
        assert_eq!(parsed.len(), 3, "incomplete and garbage lines are dropped");
        assert_eq!(parsed[1].mac, "52:54:00:ab:cd:ef", "mac is lowercased");
    }

    #[test]
    fn filters_by_requested_cidr() {
        let found = filter_by_cidrs(parse_table(TABLE), &["10.0.0.0/24".to_owned()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ip, "10.0.0.5");
    }

    #[test]
    fn invalid_cidr_matches_nothing() {
        let found = filter_by_cidrs(parse_table(TABLE), &["not-a-cidr".to_owned()]);
        assert!(found.is_empty(), "bad CIDR must not match");
    }
}
