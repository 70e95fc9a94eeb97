use tracing::trace;

use crate::config::{Config, MIN_IDLE_PACKET_LEN};
use crate::error::Result;
use crate::spacepacket::{Packet, PrimaryHeader};

use super::header::{FrameHeader, IDLE_FRAME_PATTERN, NO_PACKET_START};
use super::sink::FrameSink;

/// Assembles a stream of TM source packets into fixed-size TM transfer frames.
///
/// Packets are pushed one at a time with [`Assembler::push_tm_packet`]; whenever
/// enough data has accumulated to fill a frame of `config.transfer_frame_size`
/// bytes, the frame is serialized and handed to the configured [`FrameSink`].
/// Packets larger than the data field are split across as many frames as
/// needed (spillover); when no real data is pending, [`Assembler::flush_tm_frame`]
/// and [`Assembler::flush_tm_frame_or_idle_frame`] pad or fabricate a frame so the
/// caller can always end a session on a frame boundary.
pub struct Assembler<S: FrameSink> {
    config: Config,
    sink: S,
    master_channel_frame_count: u8,
    virtual_channel_frame_count: u8,
    idle_apid_sequence_count: u16,
    pending_frame_buffer: Vec<u8>,
    first_header_pointer_of_pending_frame: u16,
}

impl<S: FrameSink> Assembler<S> {
    /// Construct a new `Assembler`.
    ///
    /// # Errors
    /// [`crate::Error::BadConfiguration`] if `config` cannot hold a minimal idle
    /// packet in its data field.
    pub fn new(config: Config, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Assembler {
            config,
            sink,
            master_channel_frame_count: 0,
            virtual_channel_frame_count: 0,
            idle_apid_sequence_count: 0,
            pending_frame_buffer: Vec::with_capacity(config.data_field_size()),
            first_header_pointer_of_pending_frame: NO_PACKET_START,
        })
    }

    /// Bytes currently pending in the frame being assembled.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending_frame_buffer.len()
    }

    /// True iff no real packet data is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_frame_buffer.is_empty()
    }

    fn data_field_size(&self) -> usize {
        self.config.data_field_size()
    }

    /// Accept one well-formed TM packet, splitting it across frame boundaries as
    /// needed and emitting whole frames as they fill.
    ///
    /// # Errors
    /// [`crate::Error::MalformedPacket`] if `packet_bytes` is not a well-formed TM
    /// packet. The assembler's state is unchanged on error.
    pub fn push_tm_packet(&mut self, packet_bytes: &[u8]) -> Result<()> {
        Packet::parse(packet_bytes)?;

        if self.first_header_pointer_of_pending_frame == NO_PACKET_START {
            self.first_header_pointer_of_pending_frame = self.pending_frame_buffer.len() as u16;
        }

        let mut remaining = packet_bytes;
        let data_field_size = self.data_field_size();
        loop {
            let room = data_field_size - self.pending_frame_buffer.len();
            if remaining.len() <= room {
                self.pending_frame_buffer.extend_from_slice(remaining);
                if remaining.len() == room {
                    self.emit();
                }
                return Ok(());
            }

            let (head, tail) = remaining.split_at(room);
            self.pending_frame_buffer.extend_from_slice(head);
            self.emit();
            remaining = tail;
        }
    }

    /// If real packet data is pending, pad the pending frame to full size with an
    /// idle packet and emit it. Does nothing if nothing is pending.
    pub fn flush_tm_frame(&mut self) {
        if self.pending_frame_buffer.is_empty() {
            return;
        }
        self.pad_with_idle_and_emit();
    }

    /// If real data is pending, behaves like [`Assembler::flush_tm_frame`];
    /// otherwise emits a fully-formed idle frame: `FHP = IDLE_FRAME_PATTERN`,
    /// data field filled end-to-end with one idle packet.
    pub fn flush_tm_frame_or_idle_frame(&mut self) {
        if !self.pending_frame_buffer.is_empty() {
            self.pad_with_idle_and_emit();
            return;
        }
        let data_field_size = self.data_field_size();
        let idle = Packet::make_idle(data_field_size, self.next_idle_sequence_count());
        self.pending_frame_buffer = idle;
        self.first_header_pointer_of_pending_frame = IDLE_FRAME_PATTERN;
        self.emit();
    }

    /// Pad the pending frame with an idle packet and emit it.
    ///
    /// A frame's gap can come up shorter than [`MIN_IDLE_PACKET_LEN`] bytes
    /// (e.g. a packet spills across a boundary and leaves 1-6 bytes in the
    /// next frame before flush), too small for any TM packet, idle included,
    /// to fit. When that happens, the tail of the pending buffer — ordinary
    /// packet bytes, not a fresh packet start — is carried into a new pending
    /// frame instead, growing this frame's gap to exactly
    /// `MIN_IDLE_PACKET_LEN` so it can be padded; the carried remainder is
    /// then padded (or carried again) in turn. `Config::validate` guarantees
    /// the data field is large enough that this always terminates.
    fn pad_with_idle_and_emit(&mut self) {
        let data_field_size = self.data_field_size();
        loop {
            let room = data_field_size - self.pending_frame_buffer.len();
            if room < MIN_IDLE_PACKET_LEN {
                let carry = MIN_IDLE_PACKET_LEN - room;
                let split_at = self.pending_frame_buffer.len() - carry;
                let carried = self.pending_frame_buffer.split_off(split_at);

                self.pad_gap_and_emit(MIN_IDLE_PACKET_LEN);

                self.pending_frame_buffer = carried;
                self.first_header_pointer_of_pending_frame = NO_PACKET_START;
                continue;
            }

            self.pad_gap_and_emit(room);
            return;
        }
    }

    /// Fill the remaining `gap` bytes of the pending frame with one idle
    /// packet and emit it.
    fn pad_gap_and_emit(&mut self, gap: usize) {
        if self.first_header_pointer_of_pending_frame == NO_PACKET_START {
            self.first_header_pointer_of_pending_frame = self.pending_frame_buffer.len() as u16;
        }
        let idle = Packet::make_idle(gap, self.next_idle_sequence_count());
        self.pending_frame_buffer.extend_from_slice(&idle);
        self.emit();
    }

    fn next_idle_sequence_count(&mut self) -> u16 {
        let count = self.idle_apid_sequence_count;
        self.idle_apid_sequence_count =
            (self.idle_apid_sequence_count + 1) & PrimaryHeader::SEQUENCE_COUNT_MAX;
        count
    }

    fn emit(&mut self) {
        let header = FrameHeader {
            version: 0,
            spacecraft_id: self.config.spacecraft_id,
            virtual_channel_id: self.config.virtual_channel_id,
            operational_control_field_flag: false,
            master_channel_frame_count: self.master_channel_frame_count,
            virtual_channel_frame_count: self.virtual_channel_frame_count,
            secondary_header_flag: self.config.has_secondary_header,
            synchronisation_flag: false,
            packet_order_flag: false,
            segment_length_identifier: 0b11,
            first_header_pointer: self.first_header_pointer_of_pending_frame,
        };

        let mut frame = Vec::with_capacity(self.config.transfer_frame_size);
        frame.extend_from_slice(&header.encode());
        if self.config.has_secondary_header {
            frame.extend_from_slice(&[0u8; Config::SECONDARY_HEADER_LEN]);
        }
        frame.extend_from_slice(&self.pending_frame_buffer);

        debug_assert_eq!(frame.len(), self.config.transfer_frame_size);
        trace!(
            vcid = self.config.virtual_channel_id,
            mcfc = self.master_channel_frame_count,
            vcfc = self.virtual_channel_frame_count,
            fhp = self.first_header_pointer_of_pending_frame,
            len = frame.len(),
            "emitting tm frame"
        );

        self.sink.on_frame(&frame);

        self.master_channel_frame_count = self.master_channel_frame_count.wrapping_add(1);
        self.virtual_channel_frame_count = self.virtual_channel_frame_count.wrapping_add(1);
        self.pending_frame_buffer.clear();
        self.first_header_pointer_of_pending_frame = NO_PACKET_START;
    }
}
