//! Per-volume serialization.
//!
//! Stage/publish/unpublish/unstage (and controller attach/detach) must not
//! run concurrently for the same volume. Acquisition never blocks: a busy
//! volume yields `None` and the RPC layer returns the CSI `ABORTED` code so
//! the orchestrator retries with an accurate view. Entries are evicted as
//! soon as the guard drops.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Registry of volume ids with an operation in flight.
#[derive(Debug, Clone, Default)]
pub struct VolumeLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl VolumeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the volume. `None` means another operation holds it.
    pub fn try_acquire(&self, volume_id: &str) -> Option<VolumeLockGuard> {
        let mut held = self.held.lock().expect("volume lock registry poisoned");
        if !held.insert(volume_id.to_string()) {
            return None;
        }
        Some(VolumeLockGuard {
            volume_id: volume_id.to_string(),
            held: Arc::clone(&self.held),
        })
    }
}

/// Releases the volume on drop.
#[derive(Debug)]
pub struct VolumeLockGuard {
    volume_id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for VolumeLockGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.volume_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let locks = VolumeLocks::new();

        let guard = locks.try_acquire("123-vol").unwrap();
        assert!(locks.try_acquire("123-vol").is_none());

        drop(guard);
        assert!(locks.try_acquire("123-vol").is_some());
    }

    #[test]
    fn test_distinct_volumes_are_independent() {
        let locks = VolumeLocks::new();

        let _a = locks.try_acquire("1-a").unwrap();
        let _b = locks.try_acquire("2-b").unwrap();
        assert!(locks.try_acquire("1-a").is_none());
        assert!(locks.try_acquire("2-b").is_none());
    }

    #[test]
    fn test_eviction_keeps_registry_empty() {
        let locks = VolumeLocks::new();
        for i in 0..100 {
            let id = format!("{}-vol", i + 1);
            let guard = locks.try_acquire(&id).unwrap();
            drop(guard);
        }
        assert!(locks.held.lock().unwrap().is_empty());
    }
}
