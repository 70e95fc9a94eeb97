use tracing::trace;

use crate::error::{Error, Result};

/// CCSDS application process identifier.
pub type Apid = u16;

/// Reserved APID marking an idle (fill) packet.
pub const IDLE_PKT_APID: Apid = 0x7FF;

/// Packet is not part of a packet group, i.e. standalone. This is the only
/// sequence flags value a TM downlink codec produces or expects.
pub const SEQ_UNSEGMENTED: u8 = 0b11;

/// Length, in bytes, of a packet's primary header.
pub const PRIMARY_HEADER_LEN: usize = 6;

/// CCSDS TM source packet primary header.
///
/// Decoded from the 6 big-endian bytes described by CCSDS 133.0-B-2 §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrimaryHeader {
    /// Packet version number; always 0 for CCSDS v1.
    pub version: u8,
    /// Packet type; 0 for TM.
    pub packet_type: u8,
    /// Secondary header presence flag.
    pub secondary_header_flag: bool,
    /// 11-bit application process id.
    pub apid: Apid,
    /// 2-bit sequence flags; [`SEQ_UNSEGMENTED`] for a standalone packet.
    pub sequence_flags: u8,
    /// 14-bit sequence count, wraps modulo 2^14.
    pub sequence_count: u16,
    /// Packet data length field: total packet length minus 7.
    pub packet_length_field: u16,
}

impl PrimaryHeader {
    pub const LEN: usize = PRIMARY_HEADER_LEN;
    pub const SEQUENCE_COUNT_MAX: u16 = 0x3FFF;

    /// Decode a primary header from `buf`, or `None` if there are not enough bytes.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d2 = u16::from_be_bytes([buf[2], buf[3]]);
        let d3 = u16::from_be_bytes([buf[4], buf[5]]);

        Some(PrimaryHeader {
            version: ((d1 >> 13) & 0x7) as u8,
            packet_type: ((d1 >> 12) & 0x1) as u8,
            secondary_header_flag: (d1 >> 11) & 0x1 == 1,
            apid: d1 & 0x7FF,
            sequence_flags: ((d2 >> 14) & 0x3) as u8,
            sequence_count: d2 & 0x3FFF,
            packet_length_field: d3,
        })
    }

    /// Total packet length in bytes implied by this header's length field.
    #[must_use]
    pub fn total_len(&self) -> usize {
        Self::LEN + 1 + self.packet_length_field as usize
    }

    /// Encode this header to its 6 big-endian bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; PRIMARY_HEADER_LEN] {
        let d1 = ((self.version as u16 & 0x7) << 13)
            | ((self.packet_type as u16 & 0x1) << 12)
            | ((self.secondary_header_flag as u16) << 11)
            | (self.apid & 0x7FF);
        let d2 = ((self.sequence_flags as u16 & 0x3) << 14) | (self.sequence_count & 0x3FFF);
        let d3 = self.packet_length_field;

        let mut buf = [0u8; PRIMARY_HEADER_LEN];
        buf[0..2].copy_from_slice(&d1.to_be_bytes());
        buf[2..4].copy_from_slice(&d2.to_be_bytes());
        buf[4..6].copy_from_slice(&d3.to_be_bytes());
        buf
    }
}

/// A CCSDS TM source packet: primary header plus the raw bytes of the whole packet.
///
/// Two packets are equal iff their serialized bytes are equal.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    pub header: PrimaryHeader,
    #[cfg_attr(feature = "serde", serde(with = "serde_bytes"))]
    pub data: Vec<u8>,
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}
impl Eq for Packet {}

impl Packet {
    /// Parse `bytes` into a [`Packet`].
    ///
    /// # Errors
    /// [`Error::MalformedPacket`] if `bytes` is shorter than a primary header, or if
    /// its length disagrees with the header's length field.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let Some(header) = PrimaryHeader::decode(bytes) else {
            trace!(actual = bytes.len(), "packet shorter than primary header");
            return Err(Error::MalformedPacket {
                actual: bytes.len(),
                expected: PrimaryHeader::LEN,
            });
        };
        let expected = header.total_len();
        if bytes.len() != expected {
            trace!(actual = bytes.len(), expected, "packet length mismatch");
            return Err(Error::MalformedPacket {
                actual: bytes.len(),
                expected,
            });
        }
        Ok(Packet {
            header,
            data: bytes.to_vec(),
        })
    }

    /// True iff this packet's APID is the reserved idle APID.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.header.apid == IDLE_PKT_APID
    }

    /// This packet's total length in bytes, i.e. `self.data.len()`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Construct a well-formed idle packet of exactly `total_len` bytes.
    ///
    /// `total_len` must be at least 7 (the minimum size of a packet with no
    /// payload). Payload content is fill bytes of `0x00`.
    ///
    /// # Panics
    /// If `total_len < 7`.
    #[must_use]
    pub fn make_idle(total_len: usize, sequence_count: u16) -> Vec<u8> {
        assert!(
            total_len >= PrimaryHeader::LEN + 1,
            "idle packet must be at least {} bytes, got {total_len}",
            PrimaryHeader::LEN + 1
        );
        let header = PrimaryHeader {
            version: 0,
            packet_type: 0,
            secondary_header_flag: false,
            apid: IDLE_PKT_APID,
            sequence_flags: SEQ_UNSEGMENTED,
            sequence_count: sequence_count & PrimaryHeader::SEQUENCE_COUNT_MAX,
            packet_length_field: (total_len - PrimaryHeader::LEN - 1) as u16,
        };
        let mut buf = vec![0u8; total_len];
        buf[..PrimaryHeader::LEN].copy_from_slice(&header.encode());
        buf
    }
}

/// True iff `bytes` decodes to an idle packet's primary header.
///
/// Used by consumers (e.g. the CLI) who want to count or filter idle packets
/// emitted by a [`Packetizer`](crate::framing::Packetizer) without constructing a
/// full [`Packet`].
#[must_use]
pub fn is_idle_packet(bytes: &[u8]) -> bool {
    PrimaryHeader::decode(bytes).is_some_and(|h| h.apid == IDLE_PKT_APID)
}
