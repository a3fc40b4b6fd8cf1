//! Cell to pixel geometry and aspect-preserving fit

use termimg_ipc::DisplayRequest;

use super::TerminalMetrics;

/// Largest width or height an X window can have
pub const MAX_DIMENSION: u32 = u16::MAX as u32;

/// Pixel-space target of a display request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i16,
    pub y: i16,
    pub max_width: u32,
    pub max_height: u32,
}

/// Convert a cell-unit request into pixels against the current terminal size
///
/// Returns `None` when the terminal reports an empty grid. A zero bound is
/// unbounded and maps to [`MAX_DIMENSION`].
pub fn place(request: &DisplayRequest, metrics: &TerminalMetrics) -> Option<Placement> {
    let grid = metrics.grid;
    if grid.rows == 0 || grid.cols == 0 {
        return None;
    }

    let bound = |cells: u32, pixels: u16, total: u16| {
        if cells == 0 {
            MAX_DIMENSION
        } else {
            scale(cells, pixels, total)
        }
    };

    Some(Placement {
        x: i16::try_from(scale(request.col, metrics.width, grid.cols)).unwrap_or(i16::MAX),
        y: i16::try_from(scale(request.row, metrics.height, grid.rows)).unwrap_or(i16::MAX),
        max_width: bound(request.max_cols, metrics.width, grid.cols),
        max_height: bound(request.max_rows, metrics.height, grid.rows),
    })
}

fn scale(cells: u32, pixels: u16, total: u16) -> u32 {
    let scaled = u64::from(cells) * u64::from(pixels) / u64::from(total);
    scaled.min(u64::from(MAX_DIMENSION)) as u32
}

/// Largest size within `max` that keeps the aspect ratio of `native`
///
/// Never upscales. Empty input or an empty bound yields `(0, 0)`; otherwise
/// both sides are at least one pixel.
pub fn fit(native: (u32, u32), max: (u32, u32)) -> (u32, u32) {
    let (width, height) = (u64::from(native.0), u64::from(native.1));
    if width == 0 || height == 0 || max.0 == 0 || max.1 == 0 {
        return (0, 0);
    }

    let candidate_width = width.min(u64::from(max.0));
    let candidate_height = height.min(u64::from(max.1));

    let final_width = candidate_width.min(candidate_height * width / height).max(1);
    let final_height = candidate_height.min(candidate_width * height / width).max(1);

    (final_width as u32, final_height as u32)
}
