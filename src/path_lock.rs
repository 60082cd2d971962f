//! `PathLockRegistry` (C10): a process-scoped table of per-path reentrant
//! read-write locks with per-thread reentry counts.
//!
//! Entries are removed from the map as soon as their last holder
//! releases, so a long-running process never accumulates dead entries
//! for paths nobody holds anymore.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use crate::error::{Error, LockKind};

#[derive(Debug, Default)]
struct Entry {
    /// `None` while free; `Some(Write(owner))` or `Some(Read(counts))`.
    held: Held,
}

#[derive(Debug)]
enum Held {
    Free,
    Read(HashMap<ThreadId, u32>),
    Write(ThreadId, u32),
}

impl Default for Held {
    fn default() -> Self {
        Held::Free
    }
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    changed: Condvar,
}

/// Shared handle to the process-wide lock table.
#[derive(Clone, Default)]
pub struct PathLockRegistry {
    inner: Arc<Inner>,
}

/// A held lock, scoped to the thread that acquired it.
///
/// Dropping without calling [`PathLock::close`] still releases the hold
/// (via `Drop`), matching the "second close is a no-op" idempotence rule.
pub struct PathLock {
    registry: PathLockRegistry,
    path: String,
    kind: LockKind,
    owner: ThreadId,
    released: bool,
}

impl PathLockRegistry {
    pub fn new() -> Self {
        PathLockRegistry { inner: Arc::new(Inner::default()) }
    }

    pub fn read_lock(&self, path: &str, timeout: Duration) -> Result<PathLock, Error> {
        self.acquire(path, timeout, LockKind::Read)
    }

    pub fn write_lock(&self, path: &str, timeout: Duration) -> Result<PathLock, Error> {
        self.acquire(path, timeout, LockKind::Write)
    }

    fn acquire(&self, path: &str, timeout: Duration, kind: LockKind) -> Result<PathLock, Error> {
        let owner = std::thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut entries = self.inner.entries.lock().unwrap();

        loop {
            let entry = entries.entry(path.to_string()).or_default();
            match (&mut entry.held, kind) {
                (Held::Free, LockKind::Read) => {
                    let mut counts = HashMap::new();
                    counts.insert(owner, 1);
                    entry.held = Held::Read(counts);
                    break;
                }
                (Held::Free, LockKind::Write) => {
                    entry.held = Held::Write(owner, 1);
                    break;
                }
                (Held::Read(counts), LockKind::Read) => {
                    *counts.entry(owner).or_insert(0) += 1;
                    break;
                }
                (Held::Read(counts), LockKind::Write) => {
                    if counts.contains_key(&owner) {
                        return Err(Error::IllegalLockUpgrade(path.to_string()));
                    }
                    // Another thread holds a read lock; wait.
                }
                (Held::Write(holder, count), LockKind::Read) if *holder == owner => {
                    // Downgrade is allowed: a write holder may also take a read.
                    *count += 1;
                    break;
                }
                (Held::Write(holder, count), LockKind::Write) if *holder == owner => {
                    *count += 1;
                    break;
                }
                (Held::Write(..), _) => {
                    // Held by another thread; wait.
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::FileLockTimeout(kind, path.to_string()));
            }
            let (guard, result) = self
                .inner
                .changed
                .wait_timeout(entries, deadline - now)
                .unwrap();
            entries = guard;
            if result.timed_out() {
                // Loop once more; the loop head re-checks availability so a
                // notify racing the timeout is never silently dropped.
            }
        }

        Ok(PathLock { registry: self.clone(), path: path.to_string(), kind, owner, released: false })
    }

    fn release(&self, path: &str, kind: LockKind, owner: ThreadId) -> Result<(), Error> {
        let mut entries = self.inner.entries.lock().unwrap();
        let remove = {
            let entry = match entries.get_mut(path) {
                Some(e) => e,
                None => return Err(Error::IllegalMonitorState(path.to_string())),
            };
            match (&mut entry.held, kind) {
                (Held::Read(counts), LockKind::Read) => {
                    let count = counts.get_mut(&owner).ok_or_else(|| Error::IllegalMonitorState(path.to_string()))?;
                    *count -= 1;
                    if *count == 0 {
                        counts.remove(&owner);
                    }
                    counts.is_empty()
                }
                (Held::Write(holder, count), _) if *holder == owner => {
                    *count -= 1;
                    *count == 0
                }
                _ => return Err(Error::IllegalMonitorState(path.to_string())),
            }
        };
        if remove {
            entries.remove(path);
        }
        drop(entries);
        self.inner.changed.notify_all();
        Ok(())
    }

    /// True if the path has no entry at all (used by the no-leak invariant tests).
    pub fn is_empty_for(&self, path: &str) -> bool {
        !self.inner.entries.lock().unwrap().contains_key(path)
    }
}

impl PathLock {
    /// Releases one level of this hold.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalMonitorState`] if called from a thread other than
    /// the one that acquired it. A second call is a no-op (`Ok(())`).
    pub fn close(&mut self) -> Result<(), Error> {
        if self.released {
            return Ok(());
        }
        if std::thread::current().id() != self.owner {
            return Err(Error::IllegalMonitorState(self.path.clone()));
        }
        self.registry.release(&self.path, self.kind, self.owner)?;
        self.released = true;
        Ok(())
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if !self.released && std::thread::current().id() == self.owner {
            let _ = self.registry.release(&self.path, self.kind, self.owner);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn read_lock_reentrant_same_thread() {
        let registry = PathLockRegistry::new();
        let _a = registry.read_lock("/a", Duration::from_secs(1)).unwrap();
        let _b = registry.read_lock("/a", Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn write_lock_reentrant_same_thread() {
        let registry = PathLockRegistry::new();
        let _a = registry.write_lock("/a", Duration::from_secs(1)).unwrap();
        let _b = registry.write_lock("/a", Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn write_then_read_is_a_downgrade() {
        let registry = PathLockRegistry::new();
        let _w = registry.write_lock("/a", Duration::from_secs(1)).unwrap();
        let _r = registry.read_lock("/a", Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn read_then_write_same_thread_is_illegal_upgrade() {
        let registry = PathLockRegistry::new();
        let _r = registry.read_lock("/a", Duration::from_secs(1)).unwrap();
        let err = registry.write_lock("/a", Duration::from_millis(0)).unwrap_err();
        assert!(matches!(err, Error::IllegalLockUpgrade(ref p) if p == "/a"));
    }

    #[test]
    fn releasing_from_another_thread_is_illegal_monitor_state() {
        let registry = PathLockRegistry::new();
        let mut lock = registry.write_lock("/a", Duration::from_secs(1)).unwrap();
        let handle = thread::spawn(move || lock.close());
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(Error::IllegalMonitorState(ref p)) if p == "/a"));
    }

    #[test]
    fn second_close_is_a_no_op() {
        let registry = PathLockRegistry::new();
        let mut lock = registry.write_lock("/a", Duration::from_secs(1)).unwrap();
        lock.close().unwrap();
        lock.close().unwrap();
    }

    #[test]
    fn scenario_7_write_lock_timeout_and_cleanup() {
        let registry = PathLockRegistry::new();
        let reader = registry.read_lock("/a", Duration::from_secs(1)).unwrap();

        let other = registry.clone();
        let err = thread::spawn(move || other.write_lock("/a", Duration::from_millis(0)))
            .join()
            .unwrap()
            .unwrap_err();
        match err {
            Error::FileLockTimeout(kind, ref p) => {
                assert_eq!(kind, LockKind::Write);
                assert_eq!(p, "/a");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(format!("{}", err), "Wanted a write lock for path: /a");
        drop(reader);
        assert!(registry.is_empty_for("/a"));
    }

    #[test]
    fn no_leak_after_concurrent_release() {
        let registry = PathLockRegistry::new();
        let barrier = Arc::new(Barrier::new(4));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = registry.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                let lock = registry.read_lock("/shared", Duration::from_secs(1)).unwrap();
                barrier.wait();
                drop(lock);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(registry.is_empty_for("/shared"));
    }
}
