use tracing::{trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::spacepacket::PrimaryHeader;

use super::header::{Frame, IDLE_FRAME_PATTERN, NO_PACKET_START};
use super::sink::PacketSink;

/// Reassembles TM source packets from a stream of fixed-size TM transfer frames.
///
/// Frames are pushed one at a time with [`Packetizer::push_tm_frame`]; whole
/// packets, including any packet that spans one or more intervening frames, are
/// handed to the configured [`PacketSink`] in source order as soon as they are
/// complete. Idle frames are dropped; idle packets are forwarded like any other
/// packet so observers can count them.
///
/// A packet's own 6-byte primary header can itself be split across a frame
/// boundary (the assembler packs byte-greedily with no header-alignment
/// guard); `pending_packet_buffer` may therefore hold anywhere from 1 byte up
/// to a full packet, and its length is not enough on its own to know how much
/// more is needed until at least a full header has been accumulated.
pub struct Packetizer<S: PacketSink> {
    config: Config,
    sink: S,
    strict: bool,
    pending_packet_buffer: Vec<u8>,
}

impl<S: PacketSink> Packetizer<S> {
    /// Construct a new `Packetizer` in strict mode: trailing bytes after a
    /// pure-spillover frame closes a packet, or an orphaned spillover prefix, are
    /// reported as errors rather than silently discarded.
    ///
    /// # Errors
    /// [`Error::BadConfiguration`] if `config` cannot hold a minimal idle packet
    /// in its data field.
    pub fn new(config: Config, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Packetizer {
            config,
            sink,
            strict: true,
            pending_packet_buffer: Vec::new(),
        })
    }

    /// Like [`Packetizer::new`], but trailing/orphaned spillover bytes are
    /// discarded with a warning instead of raising an error.
    ///
    /// # Errors
    /// [`Error::BadConfiguration`] if `config` cannot hold a minimal idle packet
    /// in its data field.
    pub fn lenient(config: Config, sink: S) -> Result<Self> {
        let mut packetizer = Self::new(config, sink)?;
        packetizer.strict = false;
        Ok(packetizer)
    }

    /// True iff a packet is currently waiting for continuation data from a
    /// subsequent frame.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending_packet_buffer.is_empty()
    }

    /// The total length implied by the pending packet's header, if enough of
    /// it has been accumulated to decode; `None` while the header itself is
    /// still incomplete.
    fn pending_total_len(&self) -> Option<usize> {
        if self.pending_packet_buffer.len() < PrimaryHeader::LEN {
            return None;
        }
        PrimaryHeader::decode(&self.pending_packet_buffer).map(|h| h.total_len())
    }

    /// How many more bytes are needed to complete the pending packet once
    /// `extra` bytes (from the start of the next frame's data field) are
    /// accounted for, or `None` if that's not yet decidable because the
    /// header isn't fully known even with `extra` folded in.
    fn remaining_with(&self, extra: &[u8]) -> Option<usize> {
        if let Some(total) = self.pending_total_len() {
            return Some(total - self.pending_packet_buffer.len());
        }
        let need = PrimaryHeader::LEN - self.pending_packet_buffer.len();
        if extra.len() < need {
            return None;
        }
        let mut header_bytes = self.pending_packet_buffer.clone();
        header_bytes.extend_from_slice(&extra[..need]);
        let header = PrimaryHeader::decode(&header_bytes).expect("exactly LEN bytes");
        Some(header.total_len() - self.pending_packet_buffer.len())
    }

    fn resync(&mut self) {
        self.pending_packet_buffer.clear();
    }

    fn emit_pending(&mut self) {
        trace!(len = self.pending_packet_buffer.len(), "emitting reassembled packet");
        self.sink.on_packet(&self.pending_packet_buffer);
        self.resync();
    }

    /// Consume one frame, emitting zero or more whole packets via the configured
    /// [`PacketSink`] in source order.
    ///
    /// # Errors
    /// - [`Error::MalformedFrame`] if `frame_bytes` disagrees with `config`, or the
    ///   FHP is out of range.
    /// - [`Error::UnexpectedSpillover`] if the frame claims pure spillover
    ///   (`FHP == NO_PACKET_START`) but no packet is pending.
    /// - [`Error::OrphanSpillover`] if the frame has a nonzero FHP prefix but no
    ///   packet is pending (strict mode only).
    ///
    /// On error the frame is dropped; `UnexpectedSpillover` and `OrphanSpillover`
    /// additionally force a resynchronisation (pending state cleared) so
    /// subsequent frames can recover.
    pub fn push_tm_frame(&mut self, frame_bytes: &[u8]) -> Result<()> {
        let frame = Frame::parse(frame_bytes, &self.config)?;
        let fhp = frame.first_header_pointer();
        let data_field = frame.data_field();
        let d = data_field.len();

        if fhp == IDLE_FRAME_PATTERN {
            trace!("dropping idle frame");
            return Ok(());
        }

        if fhp == NO_PACKET_START {
            return self.handle_pure_spillover(data_field);
        }

        if fhp as usize >= d {
            return Err(Error::MalformedFrame(format!(
                "first header pointer {fhp} out of range for data field of {d} bytes"
            )));
        }

        self.handle_packet_start(data_field, fhp as usize)
    }

    fn handle_pure_spillover(&mut self, data_field: &[u8]) -> Result<()> {
        let d = data_field.len();
        if self.pending_packet_buffer.is_empty() {
            return Err(Error::UnexpectedSpillover);
        }

        match self.remaining_with(data_field) {
            Some(need) if need <= d => {
                let trailing = d - need;
                if trailing > 0 && self.strict {
                    return Err(Error::MalformedFrame(format!(
                        "{trailing} unexpected trailing bytes after spillover packet completed"
                    )));
                }
                if trailing > 0 {
                    warn!(trailing, "discarding trailing bytes after spillover packet completed");
                }
                self.pending_packet_buffer.extend_from_slice(&data_field[..need]);
                self.emit_pending();
            }
            _ => {
                // Packet (including possibly its header) is still incomplete;
                // the entire data field is spillover.
                self.pending_packet_buffer.extend_from_slice(data_field);
            }
        }
        Ok(())
    }

    fn handle_packet_start(&mut self, data_field: &[u8], fhp: usize) -> Result<()> {
        let prefix = &data_field[..fhp];

        if !self.pending_packet_buffer.is_empty() {
            match self.remaining_with(prefix) {
                Some(need) if need == prefix.len() => {
                    self.pending_packet_buffer.extend_from_slice(prefix);
                    self.emit_pending();
                }
                _ => {
                    let prefix_len = prefix.len();
                    self.resync();
                    return Err(Error::MalformedFrame(format!(
                        "spillover prefix of {prefix_len} bytes does not exactly complete the pending packet"
                    )));
                }
            }
        } else if !prefix.is_empty() {
            if self.strict {
                return Err(Error::OrphanSpillover(prefix.len()));
            }
            warn!(len = prefix.len(), "discarding orphaned spillover prefix");
        }

        self.parse_packets_from(data_field, fhp)
    }

    fn parse_packets_from(&mut self, data_field: &[u8], start: usize) -> Result<()> {
        let d = data_field.len();
        let mut pos = start;

        while pos < d {
            let remaining_in_field = d - pos;
            if remaining_in_field < PrimaryHeader::LEN {
                // Even the header is split across the frame boundary; buffer
                // what's here and let a later pure-spillover frame complete it.
                self.pending_packet_buffer = data_field[pos..].to_vec();
                return Ok(());
            }
            let header = PrimaryHeader::decode(&data_field[pos..]).expect("checked length above");
            let total_len = header.total_len();

            if total_len <= remaining_in_field {
                self.sink.on_packet(&data_field[pos..pos + total_len]);
                pos += total_len;
            } else {
                self.pending_packet_buffer = data_field[pos..].to_vec();
                return Ok(());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::Assembler;
    use crate::spacepacket::is_idle_packet;
    use test_case::test_case;

    use super::super::header::FrameHeader;

    fn config() -> Config {
        Config::new(758, 0, 1115, false).unwrap()
    }

    fn packet_of_len(total_len: usize, apid: u16, seq: u16) -> Vec<u8> {
        let header = PrimaryHeader {
            version: 0,
            packet_type: 0,
            secondary_header_flag: false,
            apid,
            sequence_flags: crate::spacepacket::SEQ_UNSEGMENTED,
            sequence_count: seq,
            packet_length_field: (total_len - PrimaryHeader::LEN - 1) as u16,
        };
        let mut buf = vec![0xCDu8; total_len];
        buf[..PrimaryHeader::LEN].copy_from_slice(&header.encode());
        buf
    }

    #[test]
    fn idle_frame_yields_no_packets() {
        let packets = std::cell::RefCell::new(Vec::new());
        let frames = std::cell::RefCell::new(Vec::new());
        let config = config();

        let mut assembler =
            Assembler::new(config, |f: &[u8]| frames.borrow_mut().push(f.to_vec())).unwrap();
        assembler.flush_tm_frame_or_idle_frame();

        let mut packetizer =
            Packetizer::new(config, |p: &[u8]| packets.borrow_mut().push(p.to_vec())).unwrap();
        for frame in frames.into_inner() {
            packetizer.push_tm_frame(&frame).unwrap();
        }
        assert!(packets.into_inner().is_empty());
    }

    #[test]
    fn single_packet_plus_idle_roundtrip() {
        let packets = std::cell::RefCell::new(Vec::new());
        let frames = std::cell::RefCell::new(Vec::new());
        let config = config();

        let input = packet_of_len(100, 10, 7);
        let mut assembler =
            Assembler::new(config, |f: &[u8]| frames.borrow_mut().push(f.to_vec())).unwrap();
        assembler.push_tm_packet(&input).unwrap();
        assembler.flush_tm_frame();

        let mut packetizer =
            Packetizer::new(config, |p: &[u8]| packets.borrow_mut().push(p.to_vec())).unwrap();
        for frame in frames.into_inner() {
            packetizer.push_tm_frame(&frame).unwrap();
        }

        let packets = packets.into_inner();
        assert_eq!(packets.len(), 2, "expected the real packet plus one idle packet");
        assert_eq!(packets[0], input);
        assert!(is_idle_packet(&packets[1]));
        assert_eq!(packets[1].len(), config.data_field_size() - 100);
    }

    #[test]
    fn spillover_roundtrip_across_multiple_frames() {
        let packets = std::cell::RefCell::new(Vec::new());
        let frames = std::cell::RefCell::new(Vec::new());
        let config = config();
        let d = config.data_field_size();

        let mut assembler =
            Assembler::new(config, |f: &[u8]| frames.borrow_mut().push(f.to_vec())).unwrap();

        let inputs = vec![
            packet_of_len(50, 1, 0),
            packet_of_len(2 * d + 37, 2, 1),
            packet_of_len(30, 3, 2),
        ];
        for p in &inputs {
            assembler.push_tm_packet(p).unwrap();
        }
        assembler.flush_tm_frame();

        let mut packetizer =
            Packetizer::new(config, |p: &[u8]| packets.borrow_mut().push(p.to_vec())).unwrap();
        for frame in frames.into_inner() {
            packetizer.push_tm_frame(&frame).unwrap();
        }

        let packets = packets.into_inner();
        let real: Vec<_> = packets.iter().filter(|p| !is_idle_packet(p)).collect();
        assert_eq!(real.len(), 3);
        assert_eq!(real[0], &inputs[0]);
        assert_eq!(real[1], &inputs[1]);
        assert_eq!(real[2], &inputs[2]);
    }

    /// A packet's own primary header can land split across a frame boundary
    /// when an earlier packet's spillover leaves only a few bytes of room;
    /// the packetizer must buffer the partial header and complete it from
    /// the next frame rather than losing the packet.
    #[test]
    fn packet_header_split_across_frame_boundary_roundtrips() {
        let packets = std::cell::RefCell::new(Vec::new());
        let frames = std::cell::RefCell::new(Vec::new());
        let config = config();
        let d = config.data_field_size();

        let mut assembler =
            Assembler::new(config, |f: &[u8]| frames.borrow_mut().push(f.to_vec())).unwrap();

        // Packet A leaves a 3-byte gap (d - 1106 == 3); packet B's 6-byte
        // header therefore starts 3 bytes from the end of the frame.
        let a = packet_of_len(d - 3, 1, 0);
        let b = packet_of_len(50, 2, 1);
        assembler.push_tm_packet(&a).unwrap();
        assembler.push_tm_packet(&b).unwrap();
        assembler.flush_tm_frame();

        let frames = frames.into_inner();
        assert_eq!(frames.len(), 2, "A fills frame 0 exactly except for B's partial header");

        let mut packetizer =
            Packetizer::new(config, |p: &[u8]| packets.borrow_mut().push(p.to_vec())).unwrap();
        for frame in &frames {
            packetizer.push_tm_frame(frame).unwrap();
        }

        let packets = packets.into_inner();
        let real: Vec<_> = packets.iter().filter(|p| !is_idle_packet(p)).collect();
        assert_eq!(real.len(), 2);
        assert_eq!(real[0], &a);
        assert_eq!(real[1], &b);
    }

    #[test_case(0, "valid_start" ; "fhp zero starts a packet")]
    #[test_case(NO_PACKET_START, "unexpected_spillover" ; "fhp no packet start sentinel with nothing pending")]
    #[test_case(IDLE_FRAME_PATTERN, "idle" ; "fhp idle frame sentinel")]
    fn fhp_boundary_values(fhp: u16, expectation: &str) {
        let config = config();
        let d = config.data_field_size();
        let mut packetizer = Packetizer::new(config, |_: &[u8]| {}).unwrap();

        let header = FrameHeader {
            version: 0,
            spacecraft_id: config.spacecraft_id,
            virtual_channel_id: config.virtual_channel_id,
            operational_control_field_flag: false,
            master_channel_frame_count: 0,
            virtual_channel_frame_count: 0,
            secondary_header_flag: false,
            synchronisation_flag: false,
            packet_order_flag: false,
            segment_length_identifier: 0b11,
            first_header_pointer: fhp,
        };
        let mut data = vec![0u8; d];
        if fhp == 0 {
            let pkt = packet_of_len(7, 1, 0);
            data[..7].copy_from_slice(&pkt);
        }
        let mut frame = header.encode().to_vec();
        frame.extend(data);

        let result = packetizer.push_tm_frame(&frame);
        match expectation {
            "valid_start" | "idle" => assert!(result.is_ok(), "{result:?}"),
            "unexpected_spillover" => assert!(matches!(result, Err(Error::UnexpectedSpillover))),
            _ => unreachable!(),
        }
    }

    /// A frame whose data field ends with fewer than 6 bytes after a pending
    /// packet's prefix is consumed must buffer that tail as spillover instead
    /// of erroring, so a later frame can complete the header.
    #[test]
    fn frame_ending_with_partial_header_after_spillover_prefix_is_buffered() {
        let config = config();
        let d = config.data_field_size();
        let mut packetizer = Packetizer::new(config, |_: &[u8]| {}).unwrap();

        // Seed a pending packet whose header is already fully known (6
        // bytes) and whose total length needs exactly `d - 3` more bytes,
        // so a prefix of that length completes it and leaves only 3 bytes
        // at the end of the frame for the next packet's 6-byte header.
        let pending_header = PrimaryHeader {
            version: 0,
            packet_type: 0,
            secondary_header_flag: false,
            apid: 5,
            sequence_flags: crate::spacepacket::SEQ_UNSEGMENTED,
            sequence_count: 0,
            packet_length_field: ((d + 3) - PrimaryHeader::LEN - 1) as u16,
        };
        packetizer.pending_packet_buffer = pending_header.encode().to_vec();

        let fhp = (d - 3) as u16;
        let data = vec![0xCDu8; d];
        let header = FrameHeader {
            version: 0,
            spacecraft_id: config.spacecraft_id,
            virtual_channel_id: config.virtual_channel_id,
            operational_control_field_flag: false,
            master_channel_frame_count: 0,
            virtual_channel_frame_count: 0,
            secondary_header_flag: false,
            synchronisation_flag: false,
            packet_order_flag: false,
            segment_length_identifier: 0b11,
            first_header_pointer: fhp,
        };
        let mut frame = header.encode().to_vec();
        frame.extend(data);

        packetizer.push_tm_frame(&frame).unwrap();
        assert!(packetizer.has_pending());
        assert_eq!(packetizer.pending_packet_buffer.len(), d - fhp as usize);
    }

    #[test]
    fn unexpected_spillover_without_pending_packet_errs_and_resyncs() {
        let config = config();
        let mut packetizer = Packetizer::new(config, |_: &[u8]| {}).unwrap();

        let header = FrameHeader {
            version: 0,
            spacecraft_id: config.spacecraft_id,
            virtual_channel_id: config.virtual_channel_id,
            operational_control_field_flag: false,
            master_channel_frame_count: 0,
            virtual_channel_frame_count: 0,
            secondary_header_flag: false,
            synchronisation_flag: false,
            packet_order_flag: false,
            segment_length_identifier: 0b11,
            first_header_pointer: NO_PACKET_START,
        };
        let mut frame = header.encode().to_vec();
        frame.extend(vec![0u8; config.data_field_size()]);

        let err = packetizer.push_tm_frame(&frame).unwrap_err();
        assert!(matches!(err, Error::UnexpectedSpillover));
        assert!(!packetizer.has_pending());
    }
}
