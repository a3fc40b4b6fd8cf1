//! Window tree walk
//!
//! Finds "application" windows: any window in the tree carrying WM_CLASS,
//! WM_NAME, WM_LOCALE_NAME and WM_NORMAL_HINTS, independent of which window
//! manager (if any) is running.

use anyhow::Result;
use tracing::trace;
use x11rb::protocol::xproto::*;

use super::XDisplay;
use crate::process::Pid;

/// The windowing operations the terminal lookup needs
pub trait WindowTree {
    fn root(&self) -> Window;

    /// Direct children of `window`, bottom to top
    fn children(&self, window: Window) -> Result<Vec<Window>>;

    /// Whether `window` has every property in `properties` set
    fn has_properties(&self, window: Window, properties: &[Atom]) -> Result<bool>;

    /// Pid of the client that created `window`, if the server knows it
    fn owner_pid(&self, window: Window) -> Result<Option<Pid>>;
}

impl WindowTree for XDisplay {
    fn root(&self) -> Window {
        self.root
    }

    fn children(&self, window: Window) -> Result<Vec<Window>> {
        Ok(self.conn.query_tree(window)?.reply()?.children)
    }

    fn has_properties(&self, window: Window, properties: &[Atom]) -> Result<bool> {
        // Zero-length reads: only the type/format of each property matter
        let cookies = properties
            .iter()
            .map(|&property| {
                self.conn
                    .get_property(false, window, property, AtomEnum::ANY, 0, 0)
            })
            .collect::<Result<Vec<_>, _>>()?;

        for cookie in cookies {
            match cookie.reply() {
                Ok(reply) if reply.type_ != x11rb::NONE && reply.format != 0 => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    fn owner_pid(&self, window: Window) -> Result<Option<Pid>> {
        super::ownership::owner_pid(self, window)
    }
}

/// Every application window below the root, in depth-first pre-order
///
/// Classification never prunes: children of an application window are
/// still visited. Windows that vanish during the walk are skipped.
pub fn application_windows<T: WindowTree + ?Sized>(tree: &T, markers: &[Atom]) -> Vec<Window> {
    let root = tree.root();
    let mut found = Vec::new();
    let mut stack = vec![root];

    while let Some(window) = stack.pop() {
        if window != root {
            match tree.has_properties(window, markers) {
                Ok(true) => found.push(window),
                Ok(false) => {}
                Err(e) => trace!("Property query failed for 0x{:x}: {}", window, e),
            }
        }

        match tree.children(window) {
            // Reversed so the first child is popped first
            Ok(children) => stack.extend(children.into_iter().rev()),
            Err(e) => trace!("query_tree failed for 0x{:x}: {}", window, e),
        }
    }

    found
}
