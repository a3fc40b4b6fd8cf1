//! X11 Module
//!
//! Owns the X server connection and the screen facts every other part of
//! the daemon needs: root window, default depth/visual and its pixel layout.

pub mod overlay;
pub mod ownership;
pub mod tree;

use std::os::unix::io::{AsRawFd, RawFd};

use anyhow::{Context, Result};
use tracing::{info, trace, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::image::PixelLayout;
use x11rb::protocol::Event;
use x11rb::protocol::res;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::reactor::Flow;

/// Atoms used to classify application windows
#[derive(Debug, Clone, Copy)]
pub struct Atoms {
    pub wm_class: Atom,
    pub wm_name: Atom,
    pub wm_locale_name: Atom,
    pub wm_normal_hints: Atom,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        let intern = |name: &str| -> Result<Atom> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            wm_class: AtomEnum::WM_CLASS.into(),
            wm_name: AtomEnum::WM_NAME.into(),
            wm_locale_name: intern("WM_LOCALE_NAME")?,
            wm_normal_hints: AtomEnum::WM_NORMAL_HINTS.into(),
        })
    }

    /// Properties every application window carries
    pub fn application_markers(&self) -> [Atom; 4] {
        [
            self.wm_class,
            self.wm_name,
            self.wm_locale_name,
            self.wm_normal_hints,
        ]
    }
}

/// X server connection plus default-screen facts
pub struct XDisplay {
    conn: RustConnection,
    root: Window,
    depth: u8,
    visual: Visualid,
    layout: PixelLayout,
    atoms: Atoms,
    has_res: bool,
}

impl XDisplay {
    /// Connect to `$DISPLAY`
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let depth = screen.root_depth;
        let visual = screen.root_visual;
        info!(
            "Connected to X server, screen {}, root window 0x{:x}, depth {}",
            screen_num, root, depth
        );

        let visual_type = screen
            .allowed_depths
            .iter()
            .filter(|d| d.depth == depth)
            .flat_map(|d| d.visuals.iter())
            .find(|v| v.visual_id == visual)
            .cloned()
            .context("Root visual not listed for root depth")?;
        let layout = PixelLayout::from_visual_type(visual_type)
            .context("Unsupported root visual")?;

        let atoms = Atoms::new(&conn).context("Failed to intern atoms")?;

        let has_res = conn
            .extension_information(res::X11_EXTENSION_NAME)
            .context("Failed to query X-Resource extension")?
            .is_some();
        if !has_res {
            warn!("X server lacks the X-Resource extension, window owners are unknown");
        }

        Ok(Self {
            conn,
            root,
            depth,
            visual,
            layout,
            atoms,
            has_res,
        })
    }

    pub fn conn(&self) -> &RustConnection {
        &self.conn
    }

    pub fn root(&self) -> Window {
        self.root
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn visual(&self) -> Visualid {
        self.visual
    }

    pub fn layout(&self) -> &PixelLayout {
        &self.layout
    }

    pub fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    pub fn has_res(&self) -> bool {
        self.has_res
    }

    /// Descriptor of the server socket, for the reactor
    pub fn fd(&self) -> RawFd {
        self.conn.stream().as_raw_fd()
    }

    /// Ask for DestroyNotify on the terminal window
    pub fn watch(&self, window: Window) -> Result<()> {
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY),
        )?;
        self.conn.flush()?;
        Ok(())
    }

    /// Drain every queued event without blocking
    ///
    /// Replies read while serving a command can pull events into the
    /// connection's buffer without the socket staying readable, so this is
    /// also called after each command.
    pub fn drain_events(&self, terminal: Window) -> Result<Flow> {
        let mut flow = Flow::Continue;
        while let Some(event) = self
            .conn
            .poll_for_event()
            .context("X11 connection lost")?
        {
            match event {
                Event::DestroyNotify(e) if e.window == terminal => {
                    info!("Terminal window 0x{:x} destroyed", terminal);
                    flow = Flow::Stop;
                }
                Event::Error(e) => {
                    warn!("X11 error: {:?}", e);
                }
                Event::Expose(e) => {
                    trace!("Expose on 0x{:x}", e.window);
                }
                other => {
                    trace!("Ignoring X11 event: {:?}", other);
                }
            }
        }
        self.conn.flush().context("Failed to flush X11 requests")?;
        Ok(flow)
    }
}
