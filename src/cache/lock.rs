//! Cross-process file locking for the shared source checkout.
//!
//! Only one build may mutate the checkout at a time. On Unix systems the lock
//! uses `flock(2)` advisory locking on a file next to the checkout directory.
//! On non-Unix platforms, locking is a no-op.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{File, OpenOptions};
use std::io;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Guard that holds the checkout lock until dropped.
#[derive(Debug)]
pub struct CheckoutLock {
    _file: File,
    path: Utf8PathBuf,
}

impl CheckoutLock {
    /// Blocks until an exclusive lock on `repo_dir` is held.
    ///
    /// The lock file lives at `<repo_dir>.lock` so that deleting and
    /// re-cloning the checkout does not disturb the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or the lock cannot
    /// be acquired.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use dgraph_test_binary::cache::CheckoutLock;
    ///
    /// let _lock = CheckoutLock::acquire(Utf8Path::new("/tmp/dgraph-test/repo"))?;
    /// // Exclusive access to the checkout until `_lock` is dropped.
    /// # Ok::<(), std::io::Error>(())
    /// ```
    pub fn acquire(repo_dir: &Utf8Path) -> io::Result<Self> {
        let path = lock_path_for(repo_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        lock_exclusive(&file)?;
        Ok(Self { _file: file, path })
    }

    /// Location of the lock file backing this guard.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

fn lock_path_for(repo_dir: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}.lock", repo_dir.as_str().trim_end_matches('/')))
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    // SAFETY: The file descriptor obtained from `file.as_raw_fd()` is valid
    // because `file` is borrowed for the duration of this call and remains
    // owned by the caller. No other code closes the descriptor meanwhile.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    // Cross-process locking not supported; concurrent builds may race.
    Ok(())
}
