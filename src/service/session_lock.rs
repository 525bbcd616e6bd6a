//! Per-session mutual exclusion
//!
//! Requests touching the same upload id run their look-up, write and record
//! update one at a time. Entries are created on demand and dropped as soon as
//! the last holder or waiter lets go, so the map only holds ids in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    /// Holders plus waiters
    users: usize,
}

type LockMap = HashMap<String, LockEntry>;

/// Registry of per-session locks
#[derive(Default, Clone)]
pub struct SessionLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Registration of one holder or waiter; dropping it releases the entry
struct Ticket {
    id: String,
    locks: Arc<Mutex<LockMap>>,
}

/// Held lock for one session id; released on drop
pub struct SessionGuard {
    // Fields drop in order: the mutex is released before the entry is.
    _guard: OwnedMutexGuard<()>,
    ticket: Ticket,
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`
    ///
    /// Dropping the returned future while it waits leaves no entry behind.
    pub async fn acquire(&self, id: &str) -> SessionGuard {
        let (ticket, lock) = {
            let mut map = lock_map(&self.locks);
            let entry = map.entry(id.to_string()).or_insert_with(|| LockEntry {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            entry.users += 1;
            let ticket = Ticket {
                id: id.to_string(),
                locks: self.locks.clone(),
            };
            (ticket, entry.lock.clone())
        };
        let guard = lock.lock_owned().await;
        SessionGuard {
            _guard: guard,
            ticket,
        }
    }

    /// Number of ids currently locked or awaited
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.ticket.id
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut map = lock_map(&self.locks);
        if let Some(entry) = map.get_mut(&self.id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                map.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entries_are_reclaimed() {
        let locks = SessionLocks::new();
        {
            let guard = locks.acquire("a").await;
            assert_eq!(guard.id(), "a");
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let locks = SessionLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("shared").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_aborted_waiter_is_reclaimed() {
        let locks = SessionLocks::new();
        let holder = locks.acquire("x").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("x").await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(locks.len(), 1);

        drop(holder);
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_dropped_while_pending() {
        let locks = SessionLocks::new();
        let holder = locks.acquire("x").await;

        let pending = tokio::time::timeout(Duration::from_millis(20), locks.acquire("x")).await;
        assert!(pending.is_err());
        assert_eq!(locks.len(), 1);

        drop(holder);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
