//! Termination signals as a readable descriptor
//!
//! SIGINT, SIGTERM and SIGHUP are blocked for the process and read from a
//! signalfd registered with the reactor, so shutdown runs as an ordinary
//! handler instead of inside an async signal handler.

use std::os::unix::io::{AsRawFd, RawFd};

use anyhow::{Context, Result};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use tracing::warn;

const TERMINATION_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

pub struct SignalSource {
    fd: SignalFd,
}

impl SignalSource {
    /// Block the termination signals and open a signalfd for them
    ///
    /// Must run before any thread is spawned so the mask is inherited.
    pub fn install() -> Result<Self> {
        let mut mask = SigSet::empty();
        for signal in TERMINATION_SIGNALS {
            mask.add(signal);
        }
        mask.thread_block().context("Failed to block termination signals")?;

        let fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)
            .context("Failed to create signalfd")?;
        Ok(Self { fd })
    }

    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Read every pending signal
    pub fn drain(&mut self) -> Result<Vec<Signal>> {
        let mut received = Vec::new();
        while let Some(info) = self.fd.read_signal().context("Failed to read signalfd")? {
            match Signal::try_from(info.ssi_signo as i32) {
                Ok(signal) => received.push(signal),
                Err(_) => warn!("Unknown signal number {}", info.ssi_signo),
            }
        }
        Ok(received)
    }
}
