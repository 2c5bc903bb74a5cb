//! File-level advisory lock (§4.2): create `<file>-lock` exclusively with up
//! to five retries, remove it to unlock. Grounded on `genutils.cc`'s
//! `lock_file`/`unlock_file` (`O_CREAT|O_EXCL`, five retries).

use crate::error::ReplError;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Held for as long as the lock should be respected; removes the lock file
/// on drop so a panic mid-critical-section doesn't wedge other writers
/// (§9 "Scoped acquisition").
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    /// Acquires the advisory lock for `target_path` (i.e. creates
    /// `<target_path>-lock`), retrying up to [`MAX_ATTEMPTS`] times.
    pub fn acquire(target_path: &Path) -> Result<FileLock, ReplError> {
        let lock_path = lock_path_for(target_path);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(FileLock { lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempts >= MAX_ATTEMPTS {
                        return Err(ReplError::Config(format!(
                            "could not acquire lock {} after {} attempts",
                            lock_path.display(),
                            MAX_ATTEMPTS
                        )));
                    }
                    sleep(RETRY_DELAY);
                }
                Err(e) => {
                    return Err(ReplError::Io {
                        path: lock_path.display().to_string(),
                        source: e,
                    })
                }
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

fn lock_path_for(target_path: &Path) -> PathBuf {
    let mut s = target_path.as_os_str().to_os_string();
    s.push("-lock");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("set-foo.xml");
        std::fs::write(&target, "").unwrap();

        let first = FileLock::acquire(&target).unwrap();
        // MAX_ATTEMPTS retries at RETRY_DELAY each make this slow but
        // deterministic; a real contested lock is the rare path.
        let second = FileLock::acquire(&target);
        assert!(second.is_err());
        drop(first);

        let third = FileLock::acquire(&target);
        assert!(third.is_ok());
    }
}
