//! wicket/src/proxy_header.rs
//! PROXY protocol v1 preamble formatting. Pure string building, no I/O.

use std::net::{IpAddr, SocketAddr};

/// Formats the one-line v1 preamble:
/// `PROXY <TCP4|TCP6> <srcIP> <dstIP> <srcPort> <dstPort>\r\n`.
///
/// `src` is the original peer and `dst` the relay's local address on the
/// accepted socket. The line is `TCP4` only when both addresses are IPv4;
/// if either side is IPv6 the whole line becomes `TCP6` and any IPv4 address
/// is rendered in its v4-mapped IPv6 form. A mixed-family pair therefore
/// produces a `TCP6` line with one mapped address.
pub fn v1_line(src: SocketAddr, dst: SocketAddr) -> String {
    match (src.ip(), dst.ip()) {
        (IpAddr::V4(src_ip), IpAddr::V4(dst_ip)) => format!(
            "PROXY TCP4 {} {} {} {}\r\n",
            src_ip,
            dst_ip,
            src.port(),
            dst.port()
        ),
        (src_ip, dst_ip) => format!(
            "PROXY TCP6 {} {} {} {}\r\n",
            six_form(src_ip),
            six_form(dst_ip),
            src.port(),
            dst.port()
        ),
    }
}

fn six_form(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => IpAddr::V6(v4.to_ipv6_mapped()),
        IpAddr::V6(_) => ip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn ipv4_pair() {
        let line = v1_line(addr("192.168.0.1:56324"), addr("192.168.0.11:25565"));
        assert_eq!(line, "PROXY TCP4 192.168.0.1 192.168.0.11 56324 25565\r\n");
    }

    #[test]
    fn ipv6_pair() {
        let line = v1_line(addr("[2001:db8::1]:40000"), addr("[::1]:25565"));
        assert_eq!(line, "PROXY TCP6 2001:db8::1 ::1 40000 25565\r\n");
    }

    #[test]
    fn mixed_pair_falls_back_to_tcp6() {
        let line = v1_line(addr("127.0.0.1:40000"), addr("[::1]:25565"));
        assert_eq!(line, "PROXY TCP6 ::ffff:127.0.0.1 ::1 40000 25565\r\n");
    }
}
