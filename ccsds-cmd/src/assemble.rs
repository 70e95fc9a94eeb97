use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ccsds_tm::framing::Assembler;
use ccsds_tm::spacepacket::PrimaryHeader;
use ccsds_tm::Config;
use tracing::debug;

/// Read one source packet from `r`, or `None` at a clean EOF.
fn read_one_packet<R: Read>(r: &mut R) -> Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; PrimaryHeader::LEN];
    match r.read_exact(&mut buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("reading packet primary header"),
    }
    let header = PrimaryHeader::decode(&buf).expect("just read LEN bytes");
    let total_len = header.total_len();
    buf.resize(total_len, 0);
    r.read_exact(&mut buf[PrimaryHeader::LEN..])
        .context("reading packet payload")?;
    Ok(Some(buf))
}

pub fn assemble(
    input: &Path,
    output: &Path,
    scid: u16,
    vcid: u8,
    frame_size: usize,
    secondary_header: bool,
) -> Result<()> {
    let config = Config::new(scid, vcid, frame_size, secondary_header)
        .context("building assembler configuration")?;

    let mut src = BufReader::new(File::open(input).context("opening input")?);
    let mut dst = BufWriter::new(File::create(output).context("creating output")?);

    let mut frame_count = 0usize;
    {
        let mut assembler = Assembler::new(config, |frame: &[u8]| {
            frame_count += 1;
            let _ = dst.write_all(frame);
        })
        .context("constructing assembler")?;

        while let Some(packet) = read_one_packet(&mut src)? {
            debug!(len = packet.len(), "pushing packet");
            assembler.push_tm_packet(&packet).context("packing packet into frame")?;
        }
        assembler.flush_tm_frame_or_idle_frame();
    }

    dst.flush().context("flushing output")?;
    debug!(frame_count, "assembly complete");
    Ok(())
}
