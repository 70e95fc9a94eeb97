#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// `transfer_frame_size` cannot hold a primary header plus enough data
    /// field that a partially-filled frame can always be padded with an idle
    /// packet.
    #[error("bad configuration: frame size {frame_size} too small to guarantee idle padding")]
    BadConfiguration { frame_size: usize },

    /// Packet bytes did not satisfy `len == 7 + packet_length_field`.
    #[error("malformed packet: got {actual} bytes, expected {expected}")]
    MalformedPacket { actual: usize, expected: usize },

    /// Frame bytes did not match the configured frame size, or a header field was
    /// out of range.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A frame's FHP was `NO_PACKET_START` but the packetizer has no pending packet.
    #[error("unexpected spillover: no pending packet to continue")]
    UnexpectedSpillover,

    /// A frame's FHP prefix was nonzero but the packetizer has no pending packet.
    #[error("orphan spillover: {0} prefix bytes with no pending packet")]
    OrphanSpillover(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
