use std::fs::File;
use std::io::{stdout, BufReader, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ccsds_tm::framing::{FrameHeader, IDLE_FRAME_PATTERN};
use ccsds_tm::spacepacket::{is_idle_packet, PrimaryHeader};
use handlebars::handlebars_helper;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Kind {
    Packet,
    Frame,
}

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Default, Debug, Clone, Serialize)]
struct Summary {
    total_records: usize,
    idle_records: usize,
    real_records: usize,
    total_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    kind: &'static str,
    summary: Summary,
}

pub fn info(input: &Path, kind: Kind, frame_size: Option<usize>, format: &Format) -> Result<()> {
    let summary = match kind {
        Kind::Packet => summarize_packets(input)?,
        Kind::Frame => {
            let frame_size =
                frame_size.context("--frame-size is required when --kind frame")?;
            summarize_frames(input, frame_size)?
        }
    };

    let info = Info {
        filename: input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        kind: match kind {
            Kind::Packet => "packet",
            Kind::Frame => "frame",
        },
        summary,
    };

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &info).context("serializing to json")
        }
        Format::Text => {
            let text = render_text(&info)?;
            stdout()
                .write_all(text.as_bytes())
                .context("writing to stdout")
        }
    }
}

fn summarize_packets(input: &Path) -> Result<Summary> {
    let mut src = BufReader::new(File::open(input).context("opening input")?);
    let mut summary = Summary::default();

    let mut header_buf = vec![0u8; PrimaryHeader::LEN];
    loop {
        match src.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("reading packet header"),
        }
        let header = PrimaryHeader::decode(&header_buf).expect("just read LEN bytes");
        let total_len = header.total_len();
        let mut packet = header_buf.clone();
        packet.resize(total_len, 0);
        src.read_exact(&mut packet[PrimaryHeader::LEN..])
            .context("reading packet payload")?;

        summary.total_records += 1;
        summary.total_bytes += packet.len();
        if is_idle_packet(&packet) {
            summary.idle_records += 1;
        } else {
            summary.real_records += 1;
        }
    }
    debug!(?summary, "packet summary complete");
    Ok(summary)
}

fn summarize_frames(input: &Path, frame_size: usize) -> Result<Summary> {
    let mut src = BufReader::new(File::open(input).context("opening input")?);
    let mut summary = Summary::default();

    let mut frame = vec![0u8; frame_size];
    loop {
        match src.read_exact(&mut frame) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("reading frame"),
        }
        let Some(header) = FrameHeader::decode(&frame) else {
            anyhow::bail!("frame shorter than primary header");
        };

        summary.total_records += 1;
        summary.total_bytes += frame.len();
        if header.first_header_pointer == IDLE_FRAME_PATTERN {
            summary.idle_records += 1;
        } else {
            summary.real_records += 1;
        }
    }
    debug!(?summary, "frame summary complete");
    Ok(summary)
}

fn render_text(info: &Info) -> Result<String> {
    let mut hb = handlebars::Handlebars::new();
    handlebars_helper!(lpad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string(),
        };
        let num = usize::try_from(num).unwrap().max(v.len());
        let mut s = String::new();
        for _ in 0..(num - v.len()) {
            s.push(' ');
        }
        s.push_str(&v);
        s
    });
    hb.register_helper("lpad", Box::new(lpad));
    hb.register_template_string("info", TEXT_TEMPLATE)
        .expect("template to compile");
    hb.render("info", info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r#"{{ filename }} ({{ kind }})
-----------------------------------------------------------------
Total:   {{ lpad 10 summary.total_records }} records  {{ lpad 12 summary.total_bytes }} bytes
Real:    {{ lpad 10 summary.real_records }} records
Idle:    {{ lpad 10 summary.idle_records }} records
"#;
