//! PTY lookup
//!
//! Finds and opens the pseudo-terminal a process is attached to, so the
//! daemon can ask it for the live row/column count.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::sys::stat::minor;
use tracing::{debug, info};

use super::{Pid, ProcessTable};

nix::ioctl_read_bad!(tiocgwinsz, libc::TIOCGWINSZ, libc::winsize);

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellGrid {
    pub rows: u16,
    pub cols: u16,
}

/// An open terminal device
#[derive(Debug)]
pub struct PtyHandle {
    file: File,
    device: u64,
    path: PathBuf,
}

impl PtyHandle {
    /// Raw device number the process table reported for this terminal
    pub fn device(&self) -> u64 {
        self.device
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current rows/columns of the terminal (TIOCGWINSZ)
    pub fn grid(&self) -> io::Result<CellGrid> {
        let mut size = libc::winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: the descriptor is owned by `self.file` and `size` outlives the call
        unsafe { tiocgwinsz(self.file.as_raw_fd(), &mut size) }.map_err(io::Error::from)?;
        Ok(CellGrid {
            rows: size.ws_row,
            cols: size.ws_col,
        })
    }
}

/// Maps a process to its controlling terminal under a pts directory
pub struct PtyResolver {
    pts_dir: PathBuf,
}

impl PtyResolver {
    pub fn new(pts_dir: impl Into<PathBuf>) -> Self {
        Self {
            pts_dir: pts_dir.into(),
        }
    }

    /// Open the controlling terminal of `pid`, if it has one we can reach
    pub fn resolve<T: ProcessTable + ?Sized>(&self, table: &T, pid: Pid) -> Option<PtyHandle> {
        let tty_nr = match table.stat(pid) {
            Ok(stat) => stat.tty_nr,
            Err(e) => {
                debug!("No process entry for {}: {}", pid, e);
                return None;
            }
        };
        if tty_nr == 0 {
            debug!("Process {} has no controlling terminal", pid);
            return None;
        }

        let tty_minor = minor(tty_nr as libc::dev_t);
        let path = self.pts_dir.join(tty_minor.to_string());
        debug!("Process {} tty {} minor {} -> {:?}", pid, tty_nr, tty_minor, path);

        // Minor 0 is only trusted after the device check below
        if tty_minor != 0 {
            match open_rw(&path) {
                Ok(file) => {
                    info!("Opened pty {:?} for process {}", path, pid);
                    return Some(PtyHandle { file, device: tty_nr, path });
                }
                Err(e) => debug!("Failed to open {:?}: {}", path, e),
            }
        }

        // The node may have been reassigned; only accept it if it is the same device
        let rdev = match std::fs::metadata(&path) {
            Ok(meta) => meta.rdev(),
            Err(e) => {
                debug!("Could not find pty for {}: stat {:?}: {}", pid, path, e);
                return None;
            }
        };
        if rdev != tty_nr {
            debug!(
                "Device mismatch for {:?}: process has {}, node is {}",
                path, tty_nr, rdev
            );
            return None;
        }

        match open_rw(&path) {
            Ok(file) => {
                info!("Found pty {:?} for process {} with tty {}", path, pid, tty_nr);
                Some(PtyHandle { file, device: tty_nr, path })
            }
            Err(e) => {
                debug!("Failed to open verified pty {:?}: {}", path, e);
                None
            }
        }
    }
}

/// Open without ever becoming the daemon's controlling terminal
fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tests::FakeTable;
    use nix::sys::stat::makedev;
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    const SESSION_LEADER_ENV: &str = "TERMIMG_TEST_SESSION_LEADER";

    fn pts_dir_with(minors: &[u64]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for m in minors {
            std::fs::write(dir.path().join(m.to_string()), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_resolves_minor_to_path() {
        let dir = pts_dir_with(&[5]);
        let table = FakeTable::default().with(42, 1, makedev(136, 5));
        let pty = PtyResolver::new(dir.path()).resolve(&table, 42).unwrap();
        assert_eq!(pty.path(), dir.path().join("5"));
        assert_eq!(pty.device(), makedev(136, 5));
    }

    #[test]
    fn test_no_controlling_terminal() {
        let dir = pts_dir_with(&[0]);
        let table = FakeTable::default().with(42, 1, 0);
        assert!(PtyResolver::new(dir.path()).resolve(&table, 42).is_none());
    }

    #[test]
    fn test_missing_node() {
        let dir = pts_dir_with(&[]);
        let table = FakeTable::default().with(42, 1, makedev(136, 9));
        assert!(PtyResolver::new(dir.path()).resolve(&table, 42).is_none());
    }

    #[test]
    fn test_minor_zero_requires_matching_device() {
        // A regular file has rdev 0, which never matches a real terminal
        let dir = pts_dir_with(&[0]);
        let table = FakeTable::default().with(42, 1, makedev(136, 0));
        assert!(PtyResolver::new(dir.path()).resolve(&table, 42).is_none());
    }

    #[test]
    fn test_unknown_process() {
        let dir = pts_dir_with(&[1]);
        assert!(PtyResolver::new(dir.path()).resolve(&FakeTable::default(), 42).is_none());
    }

    #[test]
    fn test_grid_fails_on_non_terminal() {
        let dir = pts_dir_with(&[3]);
        let table = FakeTable::default().with(42, 1, makedev(136, 3));
        let pty = PtyResolver::new(dir.path()).resolve(&table, 42).unwrap();
        assert!(pty.grid().is_err());
    }

    /// Master end plus the slave's path, `None` where ptys are unavailable
    fn open_pty_pair() -> Option<(File, PathBuf)> {
        let master = open_rw(Path::new("/dev/ptmx")).ok()?;
        let fd = master.as_raw_fd();
        let mut name = [0 as libc::c_char; 64];
        // SAFETY: `fd` is an open pty master and `name` outlives the calls
        unsafe {
            if libc::grantpt(fd) != 0
                || libc::unlockpt(fd) != 0
                || libc::ptsname_r(fd, name.as_mut_ptr(), name.len()) != 0
            {
                return None;
            }
        }
        // SAFETY: ptsname_r succeeded, so `name` holds a NUL-terminated path
        let name = unsafe { std::ffi::CStr::from_ptr(name.as_ptr()) };
        Some((master, PathBuf::from(name.to_str().ok()?)))
    }

    #[test]
    fn test_open_keeps_session_without_controlling_terminal() {
        if open_pty_pair().is_none() {
            return;
        }

        let mut child = Command::new(std::env::current_exe().unwrap());
        child
            .args([
                "--exact",
                "process::pty::tests::test_session_leader_opens_pty",
                "--test-threads=1",
            ])
            .env(SESSION_LEADER_ENV, "1");
        // SAFETY: setsid is async-signal-safe
        unsafe {
            child.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let status = child.status().unwrap();
        assert!(status.success(), "child exited with {}", status);
    }

    // Runs inside the session leader spawned above
    #[test]
    fn test_session_leader_opens_pty() {
        if std::env::var_os(SESSION_LEADER_ENV).is_none() {
            return;
        }

        let (_master, slave) = open_pty_pair().unwrap();
        let pty = open_rw(&slave).unwrap();
        assert!(pty.as_raw_fd() >= 0);
        // /dev/tty only opens for a process that has a controlling terminal
        let err = File::open("/dev/tty").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENXIO));
    }
}
