//! Terminal lookup
//!
//! Works out which on-screen window and which pty belong to the terminal
//! emulator that (indirectly) spawned a given process.

use thiserror::Error;
use tracing::{debug, info};
use x11rb::protocol::xproto::{Atom, Window};

use crate::process::pty::{PtyHandle, PtyResolver};
use crate::process::{self, Pid, ProcessTable};
use crate::x11::tree::{self, WindowTree};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no ancestor of process {pid} has a reachable pty")]
    NoPty { pid: Pid },

    #[error("no window is owned by process {pid} or any of its ancestors")]
    NoWindow { pid: Pid },
}

/// The resolved target of all overlay operations
#[derive(Debug)]
pub struct TerminalInfo {
    window: Window,
    pty: PtyHandle,
}

impl TerminalInfo {
    pub fn window(&self) -> Window {
        self.window
    }

    pub fn pty(&self) -> &PtyHandle {
        &self.pty
    }
}

/// Composes the process table, pty lookup and window tree
pub struct TerminalResolver<'a, P: ?Sized, W: ?Sized> {
    processes: &'a P,
    windows: &'a W,
    ptys: &'a PtyResolver,
    markers: [Atom; 4],
}

impl<'a, P, W> TerminalResolver<'a, P, W>
where
    P: ProcessTable + ?Sized,
    W: WindowTree + ?Sized,
{
    pub fn new(processes: &'a P, windows: &'a W, ptys: &'a PtyResolver, markers: [Atom; 4]) -> Self {
        Self {
            processes,
            windows,
            ptys,
            markers,
        }
    }

    /// Find the terminal window and pty for `pid`
    ///
    /// The pty is searched from the outermost ancestor inwards so an
    /// intermediate shell's pty does not shadow the emulator's. The window is
    /// the first application window, in tree order, owned by any process of
    /// the chain. Both searches are independent and are not cross-checked
    /// against each other.
    pub fn resolve(&self, pid: Pid) -> Result<TerminalInfo, ResolveError> {
        let chain = process::ancestry(self.processes, pid);
        debug!("Ancestry of {}: {:?}", pid, chain);

        let pty = chain
            .iter()
            .rev()
            .find_map(|&ancestor| self.ptys.resolve(self.processes, ancestor))
            .ok_or(ResolveError::NoPty { pid })?;
        info!("Using pty {:?} (device {:#x})", pty.path(), pty.device());

        let window = self
            .find_window(&chain)
            .ok_or(ResolveError::NoWindow { pid })?;
        info!("Found terminal window 0x{:x}", window);

        Ok(TerminalInfo { window, pty })
    }

    fn find_window(&self, chain: &[Pid]) -> Option<Window> {
        tree::application_windows(self.windows, &self.markers)
            .into_iter()
            .find(|&window| match self.windows.owner_pid(window) {
                Ok(Some(owner)) => {
                    debug!("Window 0x{:x} owned by {}", window, owner);
                    chain.contains(&owner)
                }
                Ok(None) => false,
                Err(e) => {
                    debug!("Owner query failed for 0x{:x}: {}", window, e);
                    false
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tests::FakeTable;
    use crate::x11::tree::tests::{FakeTree, MARKERS};
    use nix::sys::stat::makedev;

    // A (10) -> B (20) -> C (30)
    fn table(tty_a: u64, tty_c: u64) -> FakeTable {
        FakeTable::default()
            .with(30, 20, tty_c)
            .with(20, 10, 0)
            .with(10, 1, tty_a)
    }

    fn pts_dir(minors: &[u64]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for m in minors {
            std::fs::write(dir.path().join(m.to_string()), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_window_owned_by_grandparent() {
        let dir = pts_dir(&[4]);
        let ptys = PtyResolver::new(dir.path());
        let processes = table(0, makedev(136, 4));
        let windows = FakeTree::new(1)
            .child(1, 100)
            .child(1, 101)
            .app(100, 999)
            .app(101, 20);

        let info = TerminalResolver::new(&processes, &windows, &ptys, MARKERS)
            .resolve(30)
            .unwrap();
        assert_eq!(info.window(), 101);
    }

    #[test]
    fn test_outermost_pty_wins() {
        let dir = pts_dir(&[2, 7]);
        let ptys = PtyResolver::new(dir.path());
        let processes = table(makedev(136, 2), makedev(136, 7));
        let windows = FakeTree::new(1).child(1, 100).app(100, 30);

        let info = TerminalResolver::new(&processes, &windows, &ptys, MARKERS)
            .resolve(30)
            .unwrap();
        assert_eq!(info.pty().device(), makedev(136, 2));
        assert_eq!(info.window(), 100);
    }

    #[test]
    fn test_first_window_in_tree_order_wins() {
        let dir = pts_dir(&[4]);
        let ptys = PtyResolver::new(dir.path());
        let processes = table(makedev(136, 4), 0);
        // Both windows match the chain; enumeration order decides
        let windows = FakeTree::new(1)
            .child(1, 200)
            .child(200, 201)
            .child(1, 100)
            .app(201, 10)
            .app(100, 30);

        let info = TerminalResolver::new(&processes, &windows, &ptys, MARKERS)
            .resolve(30)
            .unwrap();
        assert_eq!(info.window(), 201);
    }

    #[test]
    fn test_no_pty() {
        let dir = pts_dir(&[]);
        let ptys = PtyResolver::new(dir.path());
        let processes = table(0, 0);
        let windows = FakeTree::new(1).child(1, 100).app(100, 20);

        let err = TerminalResolver::new(&processes, &windows, &ptys, MARKERS)
            .resolve(30)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoPty { pid: 30 }));
    }

    #[test]
    fn test_no_matching_window() {
        let dir = pts_dir(&[4]);
        let ptys = PtyResolver::new(dir.path());
        let processes = table(makedev(136, 4), 0);
        let windows = FakeTree::new(1).child(1, 100).app(100, 4242);

        let err = TerminalResolver::new(&processes, &windows, &ptys, MARKERS)
            .resolve(30)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoWindow { pid: 30 }));
    }
}
