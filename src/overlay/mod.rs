//! Overlay Module
//!
//! The overlay state machine. Control messages are parsed here, images are
//! decoded and fitted to the requested cell box, and the result is handed to
//! an [`OverlaySurface`] which does the actual windowing calls.
//!
//! ```text
//!   Idle --display ok--> Shown --clear--> Idle
//!                        Shown --display ok--> Shown (old pixmap released first)
//!   any  --malformed / failed display--> unchanged
//!   any  --quit--> stop requested
//! ```

pub mod decode;
pub mod fit;

use anyhow::Result;
use image::imageops::FilterType;
use termimg_ipc::{ControlMessage, DisplayRequest};
use tracing::{debug, info, warn};

use crate::process::pty::CellGrid;
use crate::reactor::Flow;
use decode::ImageLoader;

/// Server-side handle of an uploaded image
pub type PixmapId = u32;

/// Position and size of the overlay window, in pixels relative to the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

/// Terminal size in cells and in pixels, sampled at command time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalMetrics {
    pub grid: CellGrid,
    pub width: u16,
    pub height: u16,
}

/// Windowing operations the controller drives
pub trait OverlaySurface {
    /// Current grid and pixel size of the terminal
    fn terminal_metrics(&mut self) -> Result<TerminalMetrics>;

    /// Upload prepared pixels into a new pixmap
    fn upload(&mut self, pixels: &image::RgbImage) -> Result<PixmapId>;

    /// Bind `pixmap` as the overlay background, move/resize, raise and map
    fn show(&mut self, pixmap: PixmapId, geometry: Geometry) -> Result<()>;

    /// Unmap the overlay window
    fn hide(&mut self) -> Result<()>;

    /// Free a pixmap
    fn release(&mut self, pixmap: PixmapId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Idle,
    Shown { pixmap: PixmapId, geometry: Geometry },
}

pub struct OverlayController<L> {
    state: OverlayState,
    loader: L,
    filter: FilterType,
}

impl<L: ImageLoader> OverlayController<L> {
    pub fn new(loader: L, filter: FilterType) -> Self {
        Self {
            state: OverlayState::Idle,
            loader,
            filter,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    /// Handle one control datagram
    ///
    /// Malformed messages and failed displays are logged and leave the state
    /// untouched. Errors returned here come from the surface and are fatal.
    pub fn handle_message<S: OverlaySurface>(&mut self, surface: &mut S, bytes: &[u8]) -> Result<Flow> {
        let message = match ControlMessage::parse(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Rejected control message: {}", e);
                return Ok(Flow::Continue);
            }
        };
        debug!("Control message: {:?}", message);

        match message {
            ControlMessage::Display(request) => self.display(surface, &request)?,
            ControlMessage::Clear => self.clear(surface)?,
            ControlMessage::Quit => {
                info!("Quit requested");
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    fn display<S: OverlaySurface>(&mut self, surface: &mut S, request: &DisplayRequest) -> Result<()> {
        let metrics = match surface.terminal_metrics() {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Failed to query terminal size: {:#}", e);
                return Ok(());
            }
        };
        let Some(placement) = fit::place(request, &metrics) else {
            warn!("Terminal reports an empty grid {:?}, ignoring display", metrics.grid);
            return Ok(());
        };

        let image = match self.loader.load(&request.path) {
            Ok(image) => image,
            Err(e) => {
                warn!(
                    "Failed to load {:?} ({}): {}",
                    request.path,
                    e.class(),
                    e
                );
                return Ok(());
            }
        };

        let native = (image.width(), image.height());
        let (width, height) = fit::fit(native, (placement.max_width, placement.max_height));
        if width == 0 || height == 0 {
            warn!(
                "Nothing to show for {:?}: native {:?}, box {}x{}",
                request.path, native, placement.max_width, placement.max_height
            );
            return Ok(());
        }
        debug!("Fitted {:?} to {}x{}", native, width, height);

        let pixels = decode::prepare(&image, width, height, self.filter);

        // At most one live pixmap
        if let OverlayState::Shown { pixmap, .. } = self.state {
            surface.release(pixmap)?;
            self.state = OverlayState::Idle;
        }

        let pixmap = surface.upload(&pixels)?;
        let geometry = Geometry {
            x: placement.x,
            y: placement.y,
            width: width as u16,
            height: height as u16,
        };
        self.state = OverlayState::Shown { pixmap, geometry };
        surface.show(pixmap, geometry)?;

        info!(
            "Showing {:?} at {},{} as {}x{}",
            request.path, geometry.x, geometry.y, geometry.width, geometry.height
        );
        Ok(())
    }

    fn clear<S: OverlaySurface>(&mut self, surface: &mut S) -> Result<()> {
        match self.state {
            OverlayState::Idle => debug!("Overlay already clear"),
            OverlayState::Shown { pixmap, .. } => {
                surface.hide()?;
                surface.release(pixmap)?;
                self.state = OverlayState::Idle;
                info!("Overlay cleared");
            }
        }
        Ok(())
    }

    /// Release any bound pixmap before exit
    pub fn shutdown<S: OverlaySurface>(&mut self, surface: &mut S) -> Result<()> {
        if let OverlayState::Shown { pixmap, .. } = self.state {
            surface.release(pixmap)?;
            self.state = OverlayState::Idle;
            debug!("Released pixmap 0x{:x}", pixmap);
        }
        Ok(())
    }
}
