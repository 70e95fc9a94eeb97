mod assemble;
mod info;
mod packetize;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a file of concatenated TM source packets into TM transfer frames.
    Assemble {
        /// 10-bit spacecraft identifier.
        #[arg(long)]
        scid: u16,

        /// 3-bit virtual channel identifier.
        #[arg(long, default_value_t = 0)]
        vcid: u8,

        /// Total transfer frame length in bytes, primary header included.
        #[arg(long)]
        frame_size: usize,

        /// Frames carry a 4-byte secondary header after the primary header.
        #[arg(long, action)]
        secondary_header: bool,

        /// Input file of concatenated TM source packets.
        input: PathBuf,

        /// Output file of TM transfer frames.
        output: PathBuf,
    },
    /// Reassemble a file of concatenated TM transfer frames into TM source packets.
    Packetize {
        /// 10-bit spacecraft identifier.
        #[arg(long)]
        scid: u16,

        /// 3-bit virtual channel identifier.
        #[arg(long, default_value_t = 0)]
        vcid: u8,

        /// Total transfer frame length in bytes, primary header included.
        #[arg(long)]
        frame_size: usize,

        /// Frames carry a 4-byte secondary header after the primary header.
        #[arg(long, action)]
        secondary_header: bool,

        /// Keep idle packets in the output instead of dropping them.
        #[arg(long, action)]
        keep_idle: bool,

        /// Input file of concatenated TM transfer frames.
        input: PathBuf,

        /// Output file of TM source packets.
        output: PathBuf,
    },
    /// Summarize a packet or frame file.
    Info {
        /// Whether `input` contains packets or frames.
        #[arg(long)]
        kind: info::Kind,

        /// Required when `--kind frame`: total transfer frame length in bytes.
        #[arg(long)]
        frame_size: Option<usize>,

        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Input file.
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("CCSDS_TM_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!(
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );

    match cli.command {
        Commands::Assemble {
            scid,
            vcid,
            frame_size,
            secondary_header,
            input,
            output,
        } => assemble::assemble(&input, &output, scid, vcid, frame_size, secondary_header),
        Commands::Packetize {
            scid,
            vcid,
            frame_size,
            secondary_header,
            keep_idle,
            input,
            output,
        } => packetize::packetize(
            &input,
            &output,
            scid,
            vcid,
            frame_size,
            secondary_header,
            keep_idle,
        ),
        Commands::Info {
            kind,
            frame_size,
            format,
            input,
        } => info::info(&input, kind, frame_size, &format),
    }
}
