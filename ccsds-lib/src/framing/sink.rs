/// Capability an [`Assembler`](super::Assembler) is constructed with to receive
/// emitted transfer frames, one call per completed frame, in emission order.
///
/// Any `FnMut(&[u8]) + Send` closure implements this automatically.
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: &[u8]);
}

impl<F> FrameSink for F
where
    F: FnMut(&[u8]) + Send,
{
    fn on_frame(&mut self, frame: &[u8]) {
        self(frame);
    }
}

/// Capability a [`Packetizer`](super::Packetizer) is constructed with to receive
/// reassembled source packets, one call per completed packet, in source order.
///
/// Any `FnMut(&[u8]) + Send` closure implements this automatically.
pub trait PacketSink: Send {
    fn on_packet(&mut self, packet: &[u8]);
}

impl<F> PacketSink for F
where
    F: FnMut(&[u8]) + Send,
{
    fn on_packet(&mut self, packet: &[u8]) {
        self(packet);
    }
}
