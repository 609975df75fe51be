//! Cross-process file lock serializing writers of one store file.
//!
//! `flock` on Unix, `LockFileEx` on Windows. The lock is advisory and only
//! excludes other holders of the same lock file.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use keyring_core::storage::{StorageError, StorageResult};

/// An exclusive lock over a lock file.
#[derive(Debug, Clone)]
pub struct FileLock {
    file: Arc<File>,
}

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct FileLockGuard {
    file: Arc<File>,
}

impl FileLock {
    /// Opens or creates the lock file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Lock`] if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| lock_error(&err))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| lock_error(&err))?;
        Ok(Self {
            file: Arc::new(file),
        })
    }

    /// Blocks until the lock is acquired.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Lock`] if the OS call fails.
    pub fn lock(&self) -> StorageResult<FileLockGuard> {
        lock_exclusive(&self.file).map_err(|err| lock_error(&err))?;
        Ok(FileLockGuard {
            file: Arc::clone(&self.file),
        })
    }

    /// Acquires the lock if nobody else holds it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Lock`] if the OS call fails for a reason other
    /// than contention.
    pub fn try_lock(&self) -> StorageResult<Option<FileLockGuard>> {
        if try_lock_exclusive(&self.file).map_err(|err| lock_error(&err))? {
            Ok(Some(FileLockGuard {
                file: Arc::clone(&self.file),
            }))
        } else {
            Ok(None)
        }
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = unlock(&self.file);
    }
}

fn lock_error(err: &std::io::Error) -> StorageError {
    StorageError::Lock(err.to_string())
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    let fd = std::os::unix::io::AsRawFd::as_raw_fd(file);
    let result = unsafe { flock(fd, LOCK_EX) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    let fd = std::os::unix::io::AsRawFd::as_raw_fd(file);
    let result = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
    if result == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(unix)]
fn unlock(file: &File) -> std::io::Result<()> {
    let fd = std::os::unix::io::AsRawFd::as_raw_fd(file);
    let result = unsafe { flock(fd, LOCK_UN) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
use std::os::raw::c_int;

#[cfg(unix)]
const LOCK_EX: c_int = 2;
#[cfg(unix)]
const LOCK_NB: c_int = 4;
#[cfg(unix)]
const LOCK_UN: c_int = 8;

#[cfg(unix)]
extern "C" {
    fn flock(fd: c_int, operation: c_int) -> c_int;
}

#[cfg(windows)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    lock_file(file, 0)
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    match lock_file(file, LOCKFILE_FAIL_IMMEDIATELY) {
        Ok(()) => Ok(true),
        Err(err) if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION) => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(windows)]
fn unlock(file: &File) -> std::io::Result<()> {
    let handle = std::os::windows::io::AsRawHandle::as_raw_handle(file) as HANDLE;
    let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
    let result = unsafe { UnlockFileEx(handle, 0, 1, 0, &mut overlapped) };
    if result != 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(windows)]
fn lock_file(file: &File, flags: u32) -> std::io::Result<()> {
    let handle = std::os::windows::io::AsRawHandle::as_raw_handle(file) as HANDLE;
    let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
    let result = unsafe {
        LockFileEx(
            handle,
            LOCKFILE_EXCLUSIVE_LOCK | flags,
            0,
            1,
            0,
            &mut overlapped,
        )
    };
    if result != 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(windows)]
type HANDLE = *mut std::ffi::c_void;

#[cfg(windows)]
#[repr(C)]
struct OVERLAPPED {
    internal: usize,
    internal_high: usize,
    offset: u32,
    offset_high: u32,
    h_event: HANDLE,
}

#[cfg(windows)]
const LOCKFILE_EXCLUSIVE_LOCK: u32 = 0x2;
#[cfg(windows)]
const LOCKFILE_FAIL_IMMEDIATELY: u32 = 0x1;
#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;

#[cfg(windows)]
extern "system" {
    fn LockFileEx(
        h_file: HANDLE,
        flags: u32,
        reserved: u32,
        bytes_to_lock_low: u32,
        bytes_to_lock_high: u32,
        overlapped: *mut OVERLAPPED,
    ) -> i32;
    fn UnlockFileEx(
        h_file: HANDLE,
        reserved: u32,
        bytes_to_unlock_low: u32,
        bytes_to_unlock_high: u32,
        overlapped: *mut OVERLAPPED,
    ) -> i32;
}
