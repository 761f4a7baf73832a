//! The 6-byte UDP peer header.
//!
//! spec.md leaves the exact encoding as an open question ("only reflected
//! at use sites"). This fixes it: 4 bytes of IPv4 address in network byte
//! order, followed by 2 bytes of port in big-endian order. IPv6 peers are
//! out of scope for this header (spec.md §3) and are rejected rather than
//! silently truncated.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Size in bytes of the in-band UDP peer header.
pub const UDP_HEADER_LEN: usize = 6;

/// Identifies a UDP datagram's source peer for multiplexing over a single
/// tunnel. Opaque to the router; interpreted only by the two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UdpHeader(pub [u8; UDP_HEADER_LEN]);

/// Raised when a peer address can't be represented in the 6-byte header.
#[derive(Debug, thiserror::Error)]
pub enum UdpHeaderError {
    #[error("UDP multiplexing header does not support IPv6 peers: {0}")]
    UnsupportedAddressFamily(SocketAddr),
}

impl UdpHeader {
    pub fn from_addr(addr: SocketAddr) -> Result<Self, UdpHeaderError> {
        match addr {
            SocketAddr::V4(v4) => {
                let mut bytes = [0u8; UDP_HEADER_LEN];
                bytes[..4].copy_from_slice(&v4.ip().octets());
                bytes[4..].copy_from_slice(&v4.port().to_be_bytes());
                Ok(UdpHeader(bytes))
            }
            SocketAddr::V6(_) => Err(UdpHeaderError::UnsupportedAddressFamily(addr)),
        }
    }

    pub fn to_addr(self) -> SocketAddr {
        let ip = Ipv4Addr::new(self.0[0], self.0[1], self.0[2], self.0[3]);
        let port = u16::from_be_bytes([self.0[4], self.0[5]]);
        SocketAddr::V4(SocketAddrV4::new(ip, port))
    }

    /// Copies the header out of `buf`. Callers must copy out of a live read
    /// buffer before that buffer is reused by the next read — passing a
    /// borrowed slice into a spawned task is the aliasing bug spec.md §4.4
    /// calls out explicitly.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let bytes: [u8; UDP_HEADER_LEN] = buf.get(..UDP_HEADER_LEN)?.try_into().ok()?;
        Some(UdpHeader(bytes))
    }
}

/// Builds one framed UDP-mode body: header followed by the datagram
/// payload. This is the frame body passed to `frame::write_frame`.
pub fn encode_udp_body(header: UdpHeader, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(UDP_HEADER_LEN + payload.len());
    body.extend_from_slice(&header.0);
    body.extend_from_slice(payload);
    body
}

/// Splits a UDP-mode frame body into its header and payload.
///
/// Returns `None` if the frame is shorter than the header (6 bytes); per
/// spec.md §4.4/§8 such frames are dropped silently, and a frame of
/// exactly 6 bytes is valid (header only, empty payload).
pub fn decode_udp_body(body: &[u8]) -> Option<(UdpHeader, &[u8])> {
    let header = UdpHeader::from_bytes(body)?;
    Some((header, &body[UDP_HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_ipv4_peer_address() {
        let addr: SocketAddr = "203.0.113.7:51422".parse().unwrap();
        let header = UdpHeader::from_addr(addr).unwrap();
        assert_eq!(header.to_addr(), addr);
    }

    #[test]
    fn rejects_ipv6_peers() {
        let addr: SocketAddr = "[::1]:8080".parse().unwrap();
        assert!(UdpHeader::from_addr(addr).is_err());
    }

    #[test]
    fn a_six_byte_body_decodes_to_an_empty_payload() {
        let header = UdpHeader([1, 2, 3, 4, 5, 6]);
        let body = encode_udp_body(header, &[]);
        assert_eq!(body.len(), UDP_HEADER_LEN);
        let (decoded_header, payload) = decode_udp_body(&body).unwrap();
        assert_eq!(decoded_header, header);
        assert!(payload.is_empty());
    }

    #[test]
    fn a_body_shorter_than_the_header_fails_to_decode() {
        assert!(decode_udp_body(&[1, 2, 3]).is_none());
    }
}
