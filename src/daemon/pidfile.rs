//! PID file guard: refuse to start twice, clean up on every exit path.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::errors::{HddError, Result};

/// Fail if `path` names a live process. A stale file is removed.
pub fn ensure_not_running(path: &Path) -> Result<()> {
    let Ok(raw) = fs::read_to_string(path) else {
        return Ok(());
    };

    match raw.trim().parse::<u32>() {
        Ok(pid) if process_alive(pid) => Err(HddError::AlreadyRunning {
            path: path.to_path_buf(),
            pid,
        }),
        _ => {
            eprintln!(
                "[HDL-DAEMON] removing stale pid file {} ({:?})",
                path.display(),
                raw.trim()
            );
            fs::remove_file(path).map_err(|source| HddError::io(path, source))
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // EPERM still means the process exists, just not ours to signal.
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Holds the PID file for the lifetime of the daemon and removes it on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`, which must not exist yet.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| HddError::io(parent, source))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| HddError::io(path, source))?;
        writeln!(file, "{}", std::process::id()).map_err(|source| HddError::io(path, source))?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
