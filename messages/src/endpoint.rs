//! Endpoint mapping, parsing, and the reserved-address filter.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};

/// Map any socket address to IPv6 (v4 addresses become v4-mapped).
pub fn map_endpoint(address: SocketAddr) -> SocketAddrV6 {
    match address {
        SocketAddr::V4(v4) => SocketAddrV6::new(v4.ip().to_ipv6_mapped(), v4.port(), 0, 0),
        SocketAddr::V6(v6) => v6,
    }
}

/// The unspecified v6 endpoint, used to pad keepalive slots.
pub fn unspecified_endpoint() -> SocketAddrV6 {
    SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0)
}

fn in_mapped_range(address: &Ipv6Addr, low: u32, high: u32) -> bool {
    match address.to_ipv4_mapped() {
        Some(v4) => {
            let bits = u32::from(v4);
            bits >= low && bits <= high
        }
        None => false,
    }
}

/// Whether the endpoint falls in a reserved v4-mapped range. Datagrams from
/// reserved senders are dropped, and reserved endpoints never enter the peer
/// table.
pub fn reserved_address(endpoint: &SocketAddrV6) -> bool {
    let address = endpoint.ip();
    // Broadcast RFC 1700
    in_mapped_range(address, 0x0000_0000, 0x00ff_ffff)
        // TEST-NET RFC 5737
        || in_mapped_range(address, 0xc000_0200, 0xc000_02ff)
        // TEST-NET-2 RFC 5737
        || in_mapped_range(address, 0xc633_6400, 0xc633_64ff)
        // TEST-NET-3 RFC 5737
        || in_mapped_range(address, 0xcb00_7100, 0xcb00_71ff)
        // MCAST-TEST-NET
        || in_mapped_range(address, 0xe9fc_0000, 0xe9fc_00ff)
        // Reserved RFC 6890
        || in_mapped_range(address, 0xf000_0000, 0xffff_ffff)
}

/// Parse a port number, rejecting trailing garbage.
pub fn parse_port(text: &str) -> Option<u16> {
    text.parse::<u16>().ok()
}

/// Parse an `address:port` string into a v6 endpoint. The address part may
/// be v4 (it is v4-mapped) or v6.
pub fn parse_endpoint(text: &str) -> Option<SocketAddrV6> {
    let colon = text.rfind(':')?;
    if colon == 0 {
        return None;
    }
    let port = parse_port(&text[colon + 1..])?;
    let host = text[..colon].trim_start_matches('[').trim_end_matches(']');
    let ip: IpAddr = host.parse().ok()?;
    let v6 = match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    };
    Some(SocketAddrV6::new(v6, port, 0, 0))
}

/// The v4-mapped endpoint for a plain v4 address and port.
pub fn mapped_v4(address: Ipv4Addr, port: u16) -> SocketAddrV6 {
    SocketAddrV6::new(address.to_ipv6_mapped(), port, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> SocketAddrV6 {
        mapped_v4(Ipv4Addr::new(a, b, c, d), port)
    }

    #[test]
    fn reserved_ranges_detected() {
        assert!(reserved_address(&v4(0, 0, 0, 0, 100)));
        assert!(reserved_address(&v4(0, 255, 255, 255, 100)));
        assert!(reserved_address(&v4(192, 0, 2, 5, 12345)));
        assert!(reserved_address(&v4(198, 51, 100, 1, 1)));
        assert!(reserved_address(&v4(203, 0, 113, 250, 1)));
        assert!(reserved_address(&v4(233, 252, 0, 9, 1)));
        assert!(reserved_address(&v4(240, 0, 0, 1, 1)));
        assert!(reserved_address(&v4(255, 255, 255, 255, 1)));
    }

    #[test]
    fn ordinary_addresses_pass() {
        assert!(!reserved_address(&v4(1, 2, 3, 4, 1)));
        assert!(!reserved_address(&v4(192, 0, 3, 1, 1)));
        assert!(!reserved_address(&v4(8, 8, 8, 8, 53)));
        // Native v6 addresses are not subject to the v4-mapped ranges
        let native = SocketAddrV6::new(Ipv6Addr::LOCALHOST, 7075, 0, 0);
        assert!(!reserved_address(&native));
    }

    #[test]
    fn map_endpoint_v4() {
        let mapped = map_endpoint("10.0.0.1:7075".parse().unwrap());
        assert_eq!(mapped.port(), 7075);
        assert!(mapped.ip().to_ipv4_mapped().is_some());
    }

    #[test]
    fn parse_endpoint_forms() {
        let v4 = parse_endpoint("10.0.0.1:7075").expect("v4");
        assert_eq!(v4.port(), 7075);
        assert!(v4.ip().to_ipv4_mapped().is_some());

        let v6 = parse_endpoint("[::1]:7075").expect("bracketed v6");
        assert_eq!(*v6.ip(), Ipv6Addr::LOCALHOST);

        assert!(parse_endpoint("nonsense").is_none());
        assert!(parse_endpoint("10.0.0.1").is_none());
        assert!(parse_endpoint("10.0.0.1:notaport").is_none());
        assert!(parse_endpoint(":7075").is_none());
    }

    #[test]
    fn parse_port_rejects_out_of_range() {
        assert_eq!(parse_port("7075"), Some(7075));
        assert!(parse_port("65536").is_none());
        assert!(parse_port("12x").is_none());
    }
}
