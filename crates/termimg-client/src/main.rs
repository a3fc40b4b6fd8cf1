// Sends a single control message to a running termimg daemon

use std::io::ErrorKind;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use termimg_ipc::{ControlMessage, DisplayRequest, MAX_MESSAGE_SIZE};
use tracing::debug;

#[derive(Parser)]
#[command(name = "termimg-client")]
#[command(about = "Control the termimg overlay daemon", long_about = None)]
struct Cli {
    /// Control endpoint (defaults to $TERMIMG_SOCKET or /tmp/termimg)
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show an image at a cell position, bounded by a cell box (0 = unbounded)
    Display {
        col: u32,
        row: u32,
        max_cols: u32,
        max_rows: u32,
        path: PathBuf,
    },
    /// Hide the current image
    Clear,
    /// Stop the daemon
    Quit,
}

impl Commands {
    fn into_message(self) -> ControlMessage {
        match self {
            Commands::Display { col, row, max_cols, max_rows, path } => {
                // The daemon has a different working directory
                let path = std::path::absolute(&path).unwrap_or(path);
                ControlMessage::Display(DisplayRequest::new(col, row, max_cols, max_rows, path))
            }
            Commands::Clear => ControlMessage::Clear,
            Commands::Quit => ControlMessage::Quit,
        }
    }
}

fn send(socket_path: &Path, message: &ControlMessage) -> Result<()> {
    let payload = message.encode();
    if payload.len() > MAX_MESSAGE_SIZE {
        bail!(
            "message is {} bytes, the daemon reads at most {}",
            payload.len(),
            MAX_MESSAGE_SIZE
        );
    }

    let socket = UnixDatagram::unbound().context("Failed to create datagram socket")?;
    match socket.send_to(&payload, socket_path) {
        Ok(sent) => {
            debug!("Sent {} bytes to {:?}", sent, socket_path);
            Ok(())
        }
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            bail!("overlay daemon not running (no endpoint at {:?})", socket_path)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to send to {:?}", socket_path)),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket_path = cli.socket.unwrap_or_else(termimg_ipc::socket_path);

    send(&socket_path, &cli.command.into_message())
}
