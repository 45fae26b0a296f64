//! In-memory doubles for the lock store, clock and process probe, so the
//! protocol can be exercised deterministically without real files, delays or
//! processes.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::Result;

use crate::clock::Clock;
use crate::probe::ProcessProbe;
use crate::store::{LinkOutcome, LockStore};

/// Virtual clock: `sleep` advances time instead of blocking.
#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(
                SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            )),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

struct Link {
    target: PathBuf,
    mtime: SystemTime,
}

struct Tree {
    links: HashMap<PathBuf, Link>,
    pid_files: HashMap<PathBuf, String>,
}

/// Lock store over an in-memory tree. Link creation and compare-and-delete
/// are atomic under one mutex, matching the contract the real filesystem
/// provides for the protocol's primitives.
pub struct MemoryLockStore {
    clock: FakeClock,
    tree: Mutex<Tree>,
}

impl MemoryLockStore {
    pub fn new(clock: FakeClock) -> Self {
        Self {
            clock,
            tree: Mutex::new(Tree {
                links: HashMap::new(),
                pid_files: HashMap::new(),
            }),
        }
    }

    /// Register a pid file with the given content.
    pub fn put_pid_file(&self, path: &Path, pid: i32) {
        self.tree
            .lock()
            .unwrap()
            .pid_files
            .insert(path.to_path_buf(), pid.to_string());
    }

    /// Pre-populate a lock record with a chosen claim time.
    pub fn plant_link(&self, link: &Path, target: &str, mtime: SystemTime) {
        self.tree.lock().unwrap().links.insert(
            link.to_path_buf(),
            Link {
                target: PathBuf::from(target),
                mtime,
            },
        );
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tree.lock().unwrap().links.contains_key(path)
    }

    fn create(&self, target: &Path, link: &Path) -> LinkOutcome {
        let mut tree = self.tree.lock().unwrap();
        if tree.links.contains_key(link) {
            return LinkOutcome::AlreadyExists;
        }
        tree.links.insert(
            link.to_path_buf(),
            Link {
                target: target.to_path_buf(),
                mtime: self.clock.now(),
            },
        );
        LinkOutcome::Created
    }
}

impl LockStore for MemoryLockStore {
    fn create_hard_link(&self, target: &Path, link: &Path) -> Result<LinkOutcome> {
        Ok(self.create(target, link))
    }

    fn create_symlink(&self, target: &Path, link: &Path) -> Result<LinkOutcome> {
        Ok(self.create(target, link))
    }

    fn mtime_no_follow(&self, path: &Path) -> Result<Option<SystemTime>> {
        Ok(self.tree.lock().unwrap().links.get(path).map(|l| l.mtime))
    }

    fn read_owner_pid(&self, path: &Path) -> Result<Option<i32>> {
        let tree = self.tree.lock().unwrap();
        Ok(tree
            .links
            .get(path)
            .and_then(|l| tree.pid_files.get(&l.target))
            .and_then(|s| s.trim().parse().ok()))
    }

    fn remove_if_exists(&self, path: &Path) -> Result<()> {
        self.tree.lock().unwrap().links.remove(path);
        Ok(())
    }

    fn remove_if_unchanged(&self, path: &Path, seen: SystemTime) -> Result<bool> {
        let mut tree = self.tree.lock().unwrap();
        match tree.links.get(path) {
            Some(link) if link.mtime == seen => {
                tree.links.remove(path);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Signals a [`FakeProbe`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeSignal {
    Term,
    Kill,
}

/// Scripted process table: a fixed set of live pids, an optional "exits on
/// SIGTERM" behavior, and a log of every signal delivered.
pub struct FakeProbe {
    alive: Mutex<HashSet<i32>>,
    sent: Mutex<Vec<(i32, FakeSignal)>>,
    exits_on_term: bool,
}

impl FakeProbe {
    pub fn new(live: &[i32], exits_on_term: bool) -> Self {
        Self {
            alive: Mutex::new(live.iter().copied().collect()),
            sent: Mutex::new(Vec::new()),
            exits_on_term,
        }
    }

    pub fn sent(&self) -> Vec<(i32, FakeSignal)> {
        self.sent.lock().unwrap().clone()
    }
}

impl ProcessProbe for FakeProbe {
    fn is_alive(&self, pid: i32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn terminate_gracefully(&self, pid: i32) -> Result<()> {
        self.sent.lock().unwrap().push((pid, FakeSignal::Term));
        if self.exits_on_term {
            self.alive.lock().unwrap().remove(&pid);
        }
        Ok(())
    }

    fn terminate_forcibly(&self, pid: i32) -> Result<()> {
        self.sent.lock().unwrap().push((pid, FakeSignal::Kill));
        self.alive.lock().unwrap().remove(&pid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_and_delete_rejects_a_changed_record() {
        let clock = FakeClock::new();
        let store = MemoryLockStore::new(clock.clone());
        let path = PathBuf::from("/locks/guard");

        let first = clock.now();
        store.plant_link(&path, "/locks/a.pid", first);

        // another waiter breaks and recreates the record
        clock.advance(Duration::from_secs(3));
        store.remove_if_exists(&path).unwrap();
        store.plant_link(&path, "/locks/b.pid", clock.now());

        assert!(!store.remove_if_unchanged(&path, first).unwrap());
        assert!(store.contains(&path), "recreated record must survive");
    }

    #[test]
    fn fake_clock_sleep_advances_time() {
        let clock = FakeClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_secs(5));
        assert_eq!(clock.now().duration_since(before).unwrap(), Duration::from_secs(5));
    }
}
