//! Minimal multicast packet view carried between MPL nodes.

use bytes::Bytes;
use std::net::Ipv6Addr;

/// Multicast data message as seen by the MPL layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MplPacket {
    /// IPv6 source address of the originator
    pub source: Ipv6Addr,
    /// Encoded MPL hop-by-hop option
    pub option: Bytes,
    /// Upper-layer payload
    pub payload: Bytes,
}
