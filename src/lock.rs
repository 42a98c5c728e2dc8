use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::UucpError;

/// An advisory lock file, created exclusively and unlinked on drop. Covers
/// all four lock grains in spec.md §5 (`LCK.XQT.<cmd>`, `LCK.X.<xfile>`,
/// `LCK.XQT`, `LCK.<peer>`); callers just pick the right name.
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Attempts to acquire the lock once; `Ok(None)` means someone else
    /// already holds it (the "skip and exit"/"skip this file" contention
    /// policies from spec.md §5's lock table).
    pub fn try_acquire(lock_dir: &Path, name: &str) -> Result<Option<LockGuard>, UucpError> {
        let path = lock_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                use std::io::Write as _;
                let _ = writeln!(f, "{}", std::process::id());
                Ok(Some(LockGuard { path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(UucpError::spool_io_path("acquiring lock", path, &e)),
        }
    }

    /// Retries acquisition `retries` times with `delay` between attempts,
    /// for locks whose contention policy is "retry N times then fail"
    /// (spec.md §5's `LCK.XQT` entry).
    pub fn acquire_with_retry(lock_dir: &Path, name: &str, retries: u32, delay: Duration) -> Result<Option<LockGuard>, UucpError> {
        for attempt in 0..=retries {
            if let Some(guard) = Self::try_acquire(lock_dir, name)? {
                return Ok(Some(guard));
            }
            if attempt < retries {
                thread::sleep(delay);
            }
        }
        Ok(None)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let first = LockGuard::try_acquire(dir.path(), "LCK.XQT.ANY").unwrap();
        assert!(first.is_some());
        let second = LockGuard::try_acquire(dir.path(), "LCK.XQT.ANY").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _guard = LockGuard::try_acquire(dir.path(), "LCK.X.foo").unwrap().unwrap();
        }
        let reacquired = LockGuard::try_acquire(dir.path(), "LCK.X.foo").unwrap();
        assert!(reacquired.is_some());
    }

    #[test]
    fn retry_gives_up_after_n_attempts_if_never_released() {
        let dir = tempfile::tempdir().unwrap();
        let _held = LockGuard::try_acquire(dir.path(), "LCK.XQT").unwrap().unwrap();
        let result = LockGuard::acquire_with_retry(dir.path(), "LCK.XQT", 2, Duration::from_millis(1)).unwrap();
        assert!(result.is_none());
    }
}
