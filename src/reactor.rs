//! Event Reactor
//!
//! Single-threaded, level-triggered descriptor multiplexer. Every source
//! (X11 socket, control endpoint, signalfd) is registered with a handler;
//! handlers receive the daemon context by mutable reference, one at a time.

use std::cell::Cell;
use std::collections::HashMap;
use std::os::unix::io::{BorrowedFd, RawFd};
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use tracing::{debug, trace};

/// Ready events handled per wait
const MAX_EVENTS: usize = 10;

/// Whether the loop should keep running after a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Runs when its descriptor is readable
pub type Handler<C> = Box<dyn FnMut(&mut C) -> Result<()>>;

/// Shared stop flag, checked between wait cycles
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Rc<Cell<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.get()
    }
}

pub struct Reactor<C> {
    epoll: Epoll,
    handlers: HashMap<RawFd, Handler<C>>,
    stop: StopHandle,
}

impl<C> Reactor<C> {
    pub fn new() -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).context("Failed to create epoll")?;
        Ok(Self {
            epoll,
            handlers: HashMap::new(),
            stop: StopHandle::default(),
        })
    }

    /// Handle for requesting the loop to stop from inside a handler
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Call `handler` whenever `fd` is readable
    ///
    /// The descriptor must stay open until it is unregistered or the
    /// reactor is dropped; handlers usually own it.
    pub fn register(
        &mut self,
        fd: RawFd,
        handler: impl FnMut(&mut C) -> Result<()> + 'static,
    ) -> Result<()> {
        if fd < 0 {
            bail!("invalid descriptor {}", fd);
        }
        if self.handlers.contains_key(&fd) {
            bail!("descriptor {} is already registered", fd);
        }

        // SAFETY: only used for the duration of the epoll_ctl call
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        self.epoll
            .add(borrowed, EpollEvent::new(EpollFlags::EPOLLIN, fd as u64))
            .with_context(|| format!("Failed to register descriptor {}", fd))?;

        self.handlers.insert(fd, Box::new(handler));
        debug!("Registered descriptor {}", fd);
        Ok(())
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn unregister(&mut self, fd: RawFd) -> Result<()> {
        if self.handlers.remove(&fd).is_none() {
            bail!("descriptor {} is not registered", fd);
        }

        // SAFETY: the handler owning the descriptor was only just dropped;
        // a closed descriptor makes epoll_ctl fail, which is reported
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        match self.epoll.delete(borrowed) {
            Ok(()) | Err(Errno::EBADF) => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to unregister descriptor {}", fd)),
        }
        debug!("Unregistered descriptor {}", fd);
        Ok(())
    }

    /// Dispatch readiness until a handler stops the loop
    ///
    /// Stopping is not synchronous: the remaining ready handlers of the
    /// current cycle still run. A handler error aborts the loop.
    pub fn run(&mut self, ctx: &mut C) -> Result<()> {
        let mut events = [EpollEvent::empty(); MAX_EVENTS];

        while !self.stop.is_stopped() {
            let ready = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e).context("epoll_wait failed"),
            };

            for event in &events[..ready] {
                let fd = event.data() as RawFd;
                trace!("Descriptor {} ready", fd);
                let Some(handler) = self.handlers.get_mut(&fd) else {
                    continue;
                };
                handler(ctx).with_context(|| format!("Handler for descriptor {} failed", fd))?;
            }
        }

        debug!("Reactor stopped");
        Ok(())
    }
}
