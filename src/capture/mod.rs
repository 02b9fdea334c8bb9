//! Key extraction from raw packets.
//!
//! The monitor keys forward packets on their IPv4 source address and reverse
//! packets on their destination address. Packets are only read, never
//! modified.

use crate::config::CountMode;
use crate::core::trie::Direction;

/// Minimum IPv4 header length in bytes.
const IPV4_MIN_HEADER: usize = 20;

/// What one packet contributes to the trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSample {
    pub key: [u8; 4],
    pub amount: u64,
}

/// Parse the IPv4 header found `offset` bytes into `data`.
///
/// Returns `None` for truncated input or a non-IPv4 version nibble.
pub fn parse_ipv4_sample(
    data: &[u8],
    offset: usize,
    direction: Direction,
    mode: CountMode,
) -> Option<PacketSample> {
    let header = data.get(offset..)?;
    if header.len() < IPV4_MIN_HEADER || header[0] >> 4 != 4 {
        return None;
    }

    let addr = match direction {
        Direction::Forward => &header[12..16],
        Direction::Reverse => &header[16..20],
    };
    let amount = match mode {
        CountMode::Packets => 1,
        CountMode::Bytes => u64::from(u16::from_be_bytes([header[2], header[3]])),
    };

    Some(PacketSample {
        key: [addr[0], addr[1], addr[2], addr[3]],
        amount,
    })
}
