//! Single-run guarantee via a PID file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another instance is already running (PID {pid})")]
    AlreadyRunning { pid: u32 },
    #[error("lock file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LockError + '_ {
    move |source| LockError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Held for the duration of a run; the PID file is removed on release or drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    /// Create the PID file atomically. A file left by a dead process (or one
    /// that does not hold a PID at all) is reclaimed once.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err(path))?;
        }

        match create_pid_file(path) {
            Ok(()) => return Ok(Self::held(path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(io_err(path)(e)),
        }

        if let Some(pid) = read_pid(path) {
            if process_exists(pid) {
                return Err(LockError::AlreadyRunning { pid });
            }
        }

        warn!("Reclaiming stale lock {:?}", path);
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(path)(e)),
        }
        create_pid_file(path).map_err(io_err(path))?;
        Ok(Self::held(path))
    }

    fn held(path: &Path) -> Self {
        info!("Lock acquired: {:?}", path);
        Self {
            path: path.to_path_buf(),
            released: false,
        }
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&self.path)(e)),
        }
        info!("Lock released: {:?}", self.path);
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn create_pid_file(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// PID recorded in a lock file and when it was written.
pub fn lock_info(path: &Path) -> Option<(u32, SystemTime)> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some((read_pid(path)?, modified))
}

/// Whether `pid` names a live process.
pub fn process_exists(pid: u32) -> bool {
    // 0 and values past i32::MAX would address process groups, not a process.
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    #[cfg(unix)]
    {
        // Signal 0 only checks that the process exists. EPERM means it exists
        // but belongs to another user.
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_writes_pid_and_release_removes_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");

        let lock = RunLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id()));

        lock.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_reports_running_instance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");

        let _held = RunLock::acquire(&path).unwrap();
        match RunLock::acquire(&path) {
            Err(LockError::AlreadyRunning { pid }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
    }

    #[test]
    fn stale_and_garbage_locks_are_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");

        fs::write(&path, "999999999\n").unwrap();
        RunLock::acquire(&path).unwrap().release().unwrap();

        fs::write(&path, "not a pid").unwrap();
        let lock = RunLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id()));
        drop(lock);
    }

    #[test]
    fn drop_releases_and_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/run.lock");
        {
            let _lock = RunLock::acquire(&path).unwrap();
            assert!(path.exists());
            assert_eq!(lock_info(&path).map(|(pid, _)| pid), Some(std::process::id()));
        }
        assert!(!path.exists());
        assert!(lock_info(&path).is_none());
    }

    #[test]
    fn liveness_of_known_pids() {
        assert!(process_exists(std::process::id()));
        assert!(!process_exists(0));
        assert!(!process_exists(999_999_999));
    }

    #[cfg(unix)]
    #[test]
    fn process_of_another_user_counts_as_alive() {
        // PID 1 is always running; unprivileged callers get EPERM for it.
        assert!(process_exists(1));
    }

    #[cfg(unix)]
    #[test]
    fn lock_held_by_another_users_process_is_not_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");
        fs::write(&path, "1\n").unwrap();
        match RunLock::acquire(&path) {
            Err(LockError::AlreadyRunning { pid }) => assert_eq!(pid, 1),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
        assert_eq!(read_pid(&path), Some(1));
    }

    #[test]
    fn release_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");
        let lock = RunLock::acquire(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(lock.release().is_ok());
    }
}
