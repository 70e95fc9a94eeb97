use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ccsds_tm::framing::Packetizer;
use ccsds_tm::spacepacket::is_idle_packet;
use ccsds_tm::Config;
use tracing::{debug, warn};

pub fn packetize(
    input: &Path,
    output: &Path,
    scid: u16,
    vcid: u8,
    frame_size: usize,
    secondary_header: bool,
    keep_idle: bool,
) -> Result<()> {
    let config = Config::new(scid, vcid, frame_size, secondary_header)
        .context("building packetizer configuration")?;

    let mut src = BufReader::new(File::open(input).context("opening input")?);
    let mut dst = BufWriter::new(File::create(output).context("creating output")?);

    let mut packet_count = 0usize;
    let mut idle_count = 0usize;
    {
        let mut packetizer = Packetizer::new(config, |packet: &[u8]| {
            if is_idle_packet(packet) {
                idle_count += 1;
                if !keep_idle {
                    return;
                }
            } else {
                packet_count += 1;
            }
            let _ = dst.write_all(packet);
        })
        .context("constructing packetizer")?;

        let mut frame = vec![0u8; frame_size];
        loop {
            match src.read_exact(&mut frame) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e).context("reading frame"),
            }
            if let Err(e) = packetizer.push_tm_frame(&frame) {
                warn!(error = %e, "dropping malformed frame");
            }
        }
    }

    dst.flush().context("flushing output")?;
    debug!(packet_count, idle_count, "packetizing complete");
    Ok(())
}
