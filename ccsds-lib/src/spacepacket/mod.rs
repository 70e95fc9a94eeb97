//! CCSDS TM source packet primary header and packet view (C1).
mod packet;

pub use packet::*;
