use crate::config::Config;
use crate::error::{Error, Result};

/// FHP sentinel: no packet header starts in this frame (pure spillover).
pub const NO_PACKET_START: u16 = 0x7FE;
/// FHP sentinel: this frame carries no real data, only idle fill.
pub const IDLE_FRAME_PATTERN: u16 = 0x7FF;

/// CCSDS TM transfer frame primary header.
///
/// Decoded from the 6 big-endian bytes described by CCSDS 132.0-B-3 §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameHeader {
    pub version: u8,
    pub spacecraft_id: u16,
    pub virtual_channel_id: u8,
    pub operational_control_field_flag: bool,
    pub master_channel_frame_count: u8,
    pub virtual_channel_frame_count: u8,
    pub secondary_header_flag: bool,
    pub synchronisation_flag: bool,
    pub packet_order_flag: bool,
    pub segment_length_identifier: u8,
    pub first_header_pointer: u16,
}

impl FrameHeader {
    pub const LEN: usize = 6;

    /// Decode a frame primary header from `buf`, or `None` if there are not
    /// enough bytes.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d45 = u16::from_be_bytes([buf[4], buf[5]]);

        Some(FrameHeader {
            version: ((d1 >> 14) & 0x3) as u8,
            spacecraft_id: (d1 >> 4) & 0x3FF,
            virtual_channel_id: ((d1 >> 1) & 0x7) as u8,
            operational_control_field_flag: d1 & 0x1 == 1,
            master_channel_frame_count: buf[2],
            virtual_channel_frame_count: buf[3],
            secondary_header_flag: (d45 >> 15) & 0x1 == 1,
            synchronisation_flag: (d45 >> 14) & 0x1 == 1,
            packet_order_flag: (d45 >> 13) & 0x1 == 1,
            segment_length_identifier: ((d45 >> 11) & 0x3) as u8,
            first_header_pointer: d45 & 0x7FF,
        })
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let d1 = ((self.version as u16 & 0x3) << 14)
            | ((self.spacecraft_id & 0x3FF) << 4)
            | ((self.virtual_channel_id as u16 & 0x7) << 1)
            | (self.operational_control_field_flag as u16);
        let d45 = ((self.secondary_header_flag as u16) << 15)
            | ((self.synchronisation_flag as u16) << 14)
            | ((self.packet_order_flag as u16) << 13)
            | ((self.segment_length_identifier as u16 & 0x3) << 11)
            | (self.first_header_pointer & 0x7FF);

        let mut buf = [0u8; Self::LEN];
        buf[0..2].copy_from_slice(&d1.to_be_bytes());
        buf[2] = self.master_channel_frame_count;
        buf[3] = self.virtual_channel_frame_count;
        buf[4..6].copy_from_slice(&d45.to_be_bytes());
        buf
    }
}

/// A CCSDS TM transfer frame: primary header plus the raw bytes of the whole frame.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    pub header: FrameHeader,
    #[cfg_attr(feature = "serde", serde(with = "serde_bytes"))]
    pub data: Vec<u8>,
    header_len: usize,
}

impl Frame {
    /// Parse `bytes` into a [`Frame`] per `config`.
    ///
    /// # Errors
    /// [`Error::MalformedFrame`] if `bytes.len() != config.transfer_frame_size`, or
    /// the header cannot be decoded.
    pub fn parse(bytes: &[u8], config: &Config) -> Result<Self> {
        if bytes.len() != config.transfer_frame_size {
            return Err(Error::MalformedFrame(format!(
                "expected {} bytes, got {}",
                config.transfer_frame_size,
                bytes.len()
            )));
        }
        let Some(header) = FrameHeader::decode(bytes) else {
            return Err(Error::MalformedFrame(
                "frame shorter than primary header".to_string(),
            ));
        };
        let header_len = Config::PRIMARY_HEADER_LEN
            + if config.has_secondary_header {
                Config::SECONDARY_HEADER_LEN
            } else {
                0
            };
        Ok(Frame {
            header,
            data: bytes.to_vec(),
            header_len,
        })
    }

    /// The bytes following the primary header (and secondary header, if configured),
    /// up to the end of the frame.
    #[must_use]
    pub fn data_field(&self) -> &[u8] {
        &self.data[self.header_len..]
    }

    /// The decoded first header pointer, an alias for `self.header.first_header_pointer`.
    #[must_use]
    pub fn first_header_pointer(&self) -> u16 {
        self.header.first_header_pointer
    }
}
