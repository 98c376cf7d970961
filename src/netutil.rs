//! IP and CIDR classification for security-IP lists.

use std::net::IpAddr;

use crate::error::{Error, Result};

/// True when `value` is a bare IP address.
pub fn is_ip_address(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok()
}

/// True when `value` is CIDR notation.
pub fn is_cidr(value: &str) -> bool {
    parse_cidr(value).is_ok()
}

/// Parse CIDR notation into its base address and prefix length.
fn parse_cidr(value: &str) -> Result<(IpAddr, u8)> {
    let (addr, prefix) = value
        .split_once('/')
        .ok_or_else(|| Error::validation("netutil", format!("`{value}` is not CIDR notation")))?;
    let addr: IpAddr = addr
        .parse()
        .map_err(|_| Error::validation("netutil", format!("invalid address in `{value}`")))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| Error::validation("netutil", format!("invalid prefix length in `{value}`")))?;
    let max = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    if prefix > max {
        return Err(Error::validation(
            "netutil",
            format!("prefix length {prefix} out of range in `{value}`"),
        ));
    }
    Ok((addr, prefix))
}

/// Validate that every entry is an IP address or CIDR notation.
pub fn validate_security_ips(module: &str, entries: &[String]) -> Result<()> {
    for entry in entries {
        if !is_ip_address(entry) && !is_cidr(entry) {
            return Err(Error::validation_for_field(
                module,
                "securityIPs",
                format!("`{entry}` is neither an IP address nor CIDR notation"),
            ));
        }
    }
    Ok(())
}

/// RFC 1918 / ULA private ranges (loopback and link-local are not private
/// here, matching the classification the routing decision needs).
fn is_private(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Whether a security-IP list grants access from outside private address
/// space. Each entry is classified by its (base) address; entries that do
/// not parse are skipped, callers validate them separately.
pub fn is_public_accessible(entries: &[String]) -> bool {
    entries.iter().any(|entry| {
        let addr = if let Ok(addr) = entry.parse::<IpAddr>() {
            addr
        } else if let Ok((addr, _)) = parse_cidr(entry) {
            addr
        } else {
            return false;
        };
        !is_private(&addr)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ips(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn open_to_the_world_is_public() {
        assert!(is_public_accessible(&ips(&["0.0.0.0/0"])));
    }

    #[test]
    fn rfc1918_ranges_are_private() {
        assert!(!is_public_accessible(&ips(&["172.16.0.0/24"])));
        assert!(!is_public_accessible(&ips(&["10.0.0.0/8"])));
        assert!(!is_public_accessible(&ips(&["192.168.1.1"])));
    }

    #[test]
    fn a_single_public_entry_makes_the_list_public() {
        assert!(is_public_accessible(&ips(&["10.0.0.0/8", "203.0.113.9"])));
    }

    #[test]
    fn bare_public_address_is_public() {
        assert!(is_public_accessible(&ips(&["203.0.113.9"])));
    }

    #[test]
    fn validation_rejects_garbage_entries() {
        assert!(validate_security_ips("mysql", &ips(&["10.0.0.0/8"])).is_ok());
        let err = validate_security_ips("mysql", &ips(&["not-an-ip"])).unwrap_err();
        assert!(err.to_string().contains("securityIPs"));
        assert!(validate_security_ips("mysql", &ips(&["10.0.0.0/33"])).is_err());
    }

    #[test]
    fn cidr_parsing_accepts_v6() {
        assert!(is_cidr("fd00::/8"));
        assert!(!is_public_accessible(&ips(&["fd00::/8"])));
        assert!(is_public_accessible(&ips(&["2001:db8::/32"])));
    }
}
