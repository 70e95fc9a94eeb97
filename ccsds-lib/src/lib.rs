//! Codec for CCSDS TM (Telemetry) downlink framing: packing source packets
//! into fixed-size transfer frames and reassembling them back out.
//!
//! The packet/frame views ([`spacepacket`], [`framing`]) are stateless parsers
//! over borrowed bytes. [`framing::Assembler`] and [`framing::Packetizer`] are
//! the stateful codecs built on top of them; construct one, push data through
//! it, and receive whole frames or packets via a [`framing::FrameSink`] or
//! [`framing::PacketSink`].

mod error;

pub mod config;
pub mod framing;
pub mod spacepacket;

pub use config::Config;
pub use error::{Error, Result};
