//! Process Module
//!
//! Process-table lookups (parent pid and controlling terminal) and the
//! ancestry walk used to find the terminal emulator a process runs under.

pub mod pty;

use std::io;
use std::path::PathBuf;

use tracing::debug;

/// OS process id
pub type Pid = u32;

/// The two facts the resolver needs about a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStat {
    pub ppid: Pid,
    /// Controlling terminal device number, 0 if none
    pub tty_nr: u64,
}

/// Source of process metadata
pub trait ProcessTable {
    fn stat(&self, pid: Pid) -> io::Result<ProcessStat>;
}

/// Process table backed by `/proc`
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFs {
    fn stat(&self, pid: Pid) -> io::Result<ProcessStat> {
        let contents = std::fs::read_to_string(self.root.join(pid.to_string()).join("stat"))?;
        parse_stat(&contents).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed /proc/{pid}/stat"),
            )
        })
    }
}

/// Parse `/proc/<pid>/stat`: "pid (comm) state ppid pgrp session tty_nr ..."
fn parse_stat(contents: &str) -> Option<ProcessStat> {
    // comm may itself contain spaces and parentheses
    let after_comm = contents.rfind(')')? + 1;
    let mut fields = contents[after_comm..].split_whitespace();
    let _state = fields.next()?;
    let ppid = fields.next()?.parse().ok()?;
    let _pgrp = fields.next()?;
    let _session = fields.next()?;
    let tty_nr: i64 = fields.next()?.parse().ok()?;

    Some(ProcessStat {
        ppid,
        // The kernel prints the encoded device as a signed int
        tty_nr: tty_nr as u32 as u64,
    })
}

/// Ancestry chain of `pid`, nearest first, starting with `pid` itself and
/// stopping before init.
///
/// A process can exit while we walk; the lookup then fails and the prefix
/// resolved so far is returned.
pub fn ancestry<T: ProcessTable + ?Sized>(table: &T, pid: Pid) -> Vec<Pid> {
    let mut chain = vec![pid];
    let mut current = pid;

    while current != 1 {
        let parent = match table.stat(current) {
            Ok(stat) => stat.ppid,
            Err(e) => {
                debug!("Ancestry walk stopped at {}: {}", current, e);
                break;
            }
        };

        // 0 is the kernel (or a pid namespace boundary)
        if parent == 1 || parent == 0 {
            break;
        }
        chain.push(parent);
        current = parent;
    }

    chain
}
