use typed_builder::TypedBuilder;

use crate::error::{Error, Result};

/// Minimum bytes required in a frame's data field to hold a single idle packet.
pub const MIN_IDLE_PACKET_LEN: usize = 7;

/// Minimum data field size for which the assembler can always pad a
/// partially-filled frame with an idle packet: the assembler carries the
/// last few bytes of real data into the next frame when the natural gap is
/// smaller than [`MIN_IDLE_PACKET_LEN`], and that carry only ever resolves
/// in one extra step at or above this size. See
/// `Assembler::pad_with_idle_and_emit`.
pub const MIN_PADDABLE_DATA_FIELD_SIZE: usize = 2 * MIN_IDLE_PACKET_LEN - 1;

/// Downlink configuration shared by [`crate::framing::Assembler`] and
/// [`crate::framing::Packetizer`].
///
/// Built with [`Config::builder`] for ergonomic construction, or
/// [`Config::new`] when you want validation folded into construction.
/// Neither the builder nor the struct literal validates on its own; call
/// [`Config::validate`] (or use [`Config::new`]) before handing a `Config`
/// to an [`Assembler`](crate::framing::Assembler) or
/// [`Packetizer`](crate::framing::Packetizer) — both do this for you.
#[derive(TypedBuilder, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// 10-bit spacecraft identifier.
    pub spacecraft_id: u16,
    /// 3-bit virtual channel identifier.
    pub virtual_channel_id: u8,
    /// Total transfer frame length in bytes, primary header included.
    pub transfer_frame_size: usize,
    /// Whether frames carry a 4-byte secondary header after the primary header.
    #[builder(default = false)]
    pub has_secondary_header: bool,
}

impl Config {
    /// Primary header length, in bytes. Fixed by the CCSDS TM transfer frame format.
    pub const PRIMARY_HEADER_LEN: usize = 6;
    /// Secondary header length, in bytes, when present.
    pub const SECONDARY_HEADER_LEN: usize = 4;

    /// Construct and validate a new [`Config`].
    ///
    /// # Errors
    /// [`Error::BadConfiguration`] if `transfer_frame_size` cannot hold the primary
    /// header, optional secondary header, and a large enough data field that a
    /// partially-filled frame can always be padded with an idle packet.
    pub fn new(
        spacecraft_id: u16,
        virtual_channel_id: u8,
        transfer_frame_size: usize,
        has_secondary_header: bool,
    ) -> Result<Self> {
        let config = Config {
            spacecraft_id,
            virtual_channel_id,
            transfer_frame_size,
            has_secondary_header,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that `transfer_frame_size` can hold a primary header, optional
    /// secondary header, and enough of a data field that any partially-filled
    /// frame can always be padded out with an idle packet at flush time.
    ///
    /// # Errors
    /// [`Error::BadConfiguration`] if it cannot.
    pub fn validate(&self) -> Result<()> {
        if self.data_field_size() < MIN_PADDABLE_DATA_FIELD_SIZE {
            return Err(Error::BadConfiguration {
                frame_size: self.transfer_frame_size,
            });
        }
        Ok(())
    }

    /// Size of the data field, i.e. bytes available for packets
    /// after the primary header and, if configured, the secondary header.
    #[must_use]
    pub fn data_field_size(&self) -> usize {
        let header_len = Self::PRIMARY_HEADER_LEN
            + if self.has_secondary_header {
                Self::SECONDARY_HEADER_LEN
            } else {
                0
            };
        self.transfer_frame_size.saturating_sub(header_len)
    }
}
