//! Overlay window and the X11 implementation of [`OverlaySurface`]

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::image::Image;
use x11rb::protocol::xproto::*;

use super::XDisplay;
use crate::config::OverlayConfig;
use crate::overlay::{Geometry, OverlaySurface, PixmapId, TerminalMetrics};
use crate::terminal::TerminalInfo;

/// The daemon's own child window of the terminal
///
/// Created unmapped at 1x1; `show` gives it its real geometry.
#[derive(Debug)]
pub struct OverlayWindow {
    id: Window,
    colormap: Colormap,
}

impl OverlayWindow {
    pub fn create(display: &XDisplay, parent: Window, config: &OverlayConfig) -> Result<Self> {
        let conn = display.conn();

        let colormap = conn.generate_id()?;
        conn.create_colormap(ColormapAlloc::NONE, colormap, display.root(), display.visual())?;

        let id = conn.generate_id()?;
        conn.create_window(
            display.depth(),
            id,
            parent,
            0,
            0,
            1,
            1,
            config.border_width,
            WindowClass::INPUT_OUTPUT,
            display.visual(),
            &CreateWindowAux::new()
                .background_pixel(config.background_pixel)
                .border_pixel(0)
                .colormap(colormap)
                .event_mask(EventMask::EXPOSURE),
        )?;
        conn.flush()?;

        info!("Created overlay window 0x{:x} under 0x{:x}", id, parent);
        Ok(Self { id, colormap })
    }

    pub fn id(&self) -> Window {
        self.id
    }

    pub fn destroy(&self, display: &XDisplay) -> Result<()> {
        let conn = display.conn();
        conn.destroy_window(self.id)?;
        conn.free_colormap(self.colormap)?;
        conn.flush()?;
        debug!("Destroyed overlay window 0x{:x}", self.id);
        Ok(())
    }
}

/// Draws into an [`OverlayWindow`] over the resolved terminal
pub struct X11Surface<'a> {
    display: &'a XDisplay,
    terminal: &'a TerminalInfo,
    window: &'a OverlayWindow,
}

impl<'a> X11Surface<'a> {
    pub fn new(display: &'a XDisplay, terminal: &'a TerminalInfo, window: &'a OverlayWindow) -> Self {
        Self {
            display,
            terminal,
            window,
        }
    }
}

impl OverlaySurface for X11Surface<'_> {
    fn terminal_metrics(&mut self) -> Result<TerminalMetrics> {
        let grid = self
            .terminal
            .pty()
            .grid()
            .with_context(|| format!("TIOCGWINSZ on {:?}", self.terminal.pty().path()))?;
        let geometry = self
            .display
            .conn()
            .get_geometry(self.terminal.window())?
            .reply()
            .context("Failed to query terminal window geometry")?;

        Ok(TerminalMetrics {
            grid,
            width: geometry.width,
            height: geometry.height,
        })
    }

    fn upload(&mut self, pixels: &RgbImage) -> Result<PixmapId> {
        let conn = self.display.conn();
        let (width, height) = pixels.dimensions();
        let width = u16::try_from(width).context("Image too wide for a pixmap")?;
        let height = u16::try_from(height).context("Image too tall for a pixmap")?;

        let mut native = Image::allocate_native(width, height, self.display.depth(), conn.setup())
            .context("No pixmap format for the root depth")?;
        let layout = self.display.layout();
        for (x, y, pixel) in pixels.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            // 8-bit channels widened to the 16-bit range X colors use
            let color = (u16::from(r) * 257, u16::from(g) * 257, u16::from(b) * 257);
            native.put_pixel(x as u16, y as u16, layout.encode(color));
        }

        let pixmap = conn.generate_id()?;
        conn.create_pixmap(self.display.depth(), pixmap, self.window.id(), width, height)?;
        let gc = conn.generate_id()?;
        conn.create_gc(gc, pixmap, &CreateGCAux::new())?;
        native.put(conn, pixmap, gc, 0, 0)?;
        conn.free_gc(gc)?;

        debug!("Uploaded {}x{} into pixmap 0x{:x}", width, height, pixmap);
        Ok(pixmap)
    }

    fn show(&mut self, pixmap: PixmapId, geometry: Geometry) -> Result<()> {
        let conn = self.display.conn();
        let window = self.window.id();

        conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().background_pixmap(pixmap),
        )?;
        conn.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(i32::from(geometry.x))
                .y(i32::from(geometry.y))
                .width(u32::from(geometry.width))
                .height(u32::from(geometry.height))
                .stack_mode(StackMode::ABOVE),
        )?;
        conn.map_window(window)?;
        // Repaint with the new background even if the window was already mapped
        conn.clear_area(false, window, 0, 0, 0, 0)?;
        conn.flush()?;
        Ok(())
    }

    fn hide(&mut self) -> Result<()> {
        let conn = self.display.conn();
        conn.unmap_window(self.window.id())?;
        conn.flush()?;
        Ok(())
    }

    fn release(&mut self, pixmap: PixmapId) -> Result<()> {
        let conn = self.display.conn();
        conn.free_pixmap(pixmap)?;
        conn.flush()?;
        Ok(())
    }
}
