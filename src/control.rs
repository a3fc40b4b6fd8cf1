//! Control endpoint
//!
//! A unix datagram socket at a well-known path. Each readable event reads
//! one datagram and hands its bytes to the registered message handler.

use std::io::ErrorKind;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use termimg_ipc::MAX_MESSAGE_SIZE;
use tracing::{debug, info, warn};

use crate::reactor::Reactor;

type MessageHandler<C> = Box<dyn FnMut(&mut C, &[u8]) -> Result<()>>;

pub struct ControlChannel<C> {
    socket: UnixDatagram,
    path: PathBuf,
    handler: Option<MessageHandler<C>>,
}

impl<C: 'static> ControlChannel<C> {
    /// Bind at `path`, replacing a stale node left by a previous run
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Remove existing socket if present
        if path.symlink_metadata().is_ok() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale control socket {:?}", path))?;
            debug!("Removed stale control socket {:?}", path);
        }

        let socket = UnixDatagram::bind(&path)
            .with_context(|| format!("Failed to bind control socket {:?}", path))?;
        socket
            .set_nonblocking(true)
            .context("Failed to make control socket non-blocking")?;
        info!("Control socket listening on {:?}", path);

        Ok(Self {
            socket,
            path,
            handler: None,
        })
    }

    /// Set the message handler, replacing any previous one
    pub fn on_message(&mut self, handler: impl FnMut(&mut C, &[u8]) -> Result<()> + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Hand the channel to the reactor; it lives as long as its registration
    pub fn attach(mut self, reactor: &mut Reactor<C>) -> Result<()> {
        let fd = self.socket.as_raw_fd();
        reactor
            .register(fd, move |ctx: &mut C| self.receive(ctx))
            .context("Failed to register control socket")
    }

    /// Read one datagram and dispatch it
    ///
    /// Datagrams longer than the buffer are truncated by the kernel.
    pub fn receive(&mut self, ctx: &mut C) -> Result<()> {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let len = match self.socket.recv(&mut buf) {
            Ok(len) => len,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e).context("Failed to read control socket"),
        };
        debug!("Control message: {} bytes", len);

        match self.handler.as_mut() {
            Some(handler) => handler(ctx, &buf[..len]),
            None => {
                warn!("No message handler registered, dropping {} bytes", len);
                Ok(())
            }
        }
    }
}

impl<C> Drop for ControlChannel<C> {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed control socket {:?}", self.path),
            Err(e) => warn!("Failed to remove control socket {:?}: {}", self.path, e),
        }
    }
}
