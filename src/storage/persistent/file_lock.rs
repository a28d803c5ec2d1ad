//! Single-owner guard for a Craftable data directory.
//!
//! A data directory holds `craftable.wal` and, while compaction runs, its
//! `craftable.wal.compact` staging file. Two stores sharing a directory would
//! interleave appends and could rename a snapshot over entries the other just
//! logged, so [`PersistentDocumentStore`](super::PersistentDocumentStore)
//! takes this lock before reading the log and keeps it until it is dropped.
//!
//! The lock is advisory and whole-file (`flock` on unix, `LockFileEx` on
//! windows). It covers other processes and other stores in the same process
//! alike. A second opener fails at once with `ErrorKind::WouldBlock`, which
//! the store reports as `StorageError::Io`.

use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

/// Name of the lock file inside the data directory.
pub const LOCK_FILE: &str = "craftable.lock";

/// Ownership of one data directory. Released when dropped.
#[derive(Debug)]
pub struct DirLock {
    _file: File,
    path: PathBuf,
}

impl DirLock {
    /// Claim `dir`, creating `craftable.lock` inside it if needed.
    ///
    /// The lock file is left in place on drop; only the lock is released.
    ///
    /// # Errors
    /// `ErrorKind::WouldBlock` if another store already owns the directory.
    pub fn acquire(dir: &Path) -> IoResult<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Self::try_lock(&file).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                IoError::new(
                    ErrorKind::WouldBlock,
                    format!("data directory {} is already open in another store", dir.display()),
                )
            } else {
                e
            }
        })?;
        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> IoResult<()> {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor is owned by `file` and open for the whole call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = IoError::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(IoError::from(ErrorKind::WouldBlock));
            }
            return Err(err);
        }
        Ok(())
    }

    #[cfg(windows)]
    fn try_lock(file: &File) -> IoResult<()> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Foundation::HANDLE;
        use windows_sys::Win32::Storage::FileSystem::{
            LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
        };

        let handle = file.as_raw_handle() as HANDLE;
        // SAFETY: the handle is owned by `file`; OVERLAPPED is plain data.
        let result = unsafe {
            let mut overlapped = std::mem::zeroed::<windows_sys::Win32::System::IO::OVERLAPPED>();
            LockFileEx(
                handle,
                LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
                0,
                1,
                0,
                &mut overlapped,
            )
        };
        if result == 0 {
            return Err(IoError::from(ErrorKind::WouldBlock));
        }
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    fn try_lock(_file: &File) -> IoResult<()> {
        Err(IoError::new(
            ErrorKind::Unsupported,
            "file locking not supported on this platform",
        ))
    }
}
