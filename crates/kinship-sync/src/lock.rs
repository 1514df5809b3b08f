//! Per-document mutual exclusion.
//!
//! One lock per document path. Requesters either queue in FIFO order
//! ([`LockRegistry::acquire`]) or fail fast ([`LockRegistry::try_acquire`]).
//! A lock held longer than the timeout is reclaimed by the next requester;
//! the original holder's later release is then ignored.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Result, SyncError};

struct Slot {
    token: u64,
    acquired_at: Instant,
    waiters: VecDeque<oneshot::Sender<u64>>,
}

#[derive(Default)]
struct State {
    slots: HashMap<String, Slot>,
    next_token: u64,
}

impl State {
    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

struct Inner {
    state: Mutex<State>,
    timeout: Duration,
}

/// Registry of path locks. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LockRegistry {
    inner: Arc<Inner>,
}

impl LockRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                timeout,
            }),
        }
    }

    /// Wait for the lock on `path`, queueing behind earlier requesters.
    pub async fn acquire(&self, path: &str) -> LockGuard {
        loop {
            let (mut rx, wait) = {
                let mut state = self.inner.state.lock();
                let token = state.next_token();
                match state.slots.get_mut(path) {
                    None => {
                        state.slots.insert(path.to_string(), Slot::new(token));
                        return self.guard(path, token, None);
                    }
                    Some(slot) => {
                        let held = slot.acquired_at.elapsed();
                        if held >= self.inner.timeout {
                            slot.reclaim(token);
                            return self.reclaimed_guard(path, token, held);
                        }
                        let (tx, rx) = oneshot::channel();
                        slot.waiters.push_back(tx);
                        (rx, self.inner.timeout - held)
                    }
                }
            };

            match tokio::time::timeout(wait, &mut rx).await {
                Ok(Ok(token)) => return self.guard(path, token, None),
                // The slot vanished; re-examine it.
                Ok(Err(_)) => continue,
                // Holder went stale, unless it released right at the deadline.
                Err(_) => {
                    if let Some(token) = self.claim_late_handoff(rx) {
                        return self.guard(path, token, None);
                    }
                }
            }
        }
    }

    /// Take the lock on `path` only if it is free or stale.
    pub fn try_acquire(&self, path: &str) -> Result<LockGuard> {
        let mut state = self.inner.state.lock();
        let token = state.next_token();
        match state.slots.get_mut(path) {
            None => {
                state.slots.insert(path.to_string(), Slot::new(token));
                Ok(self.guard(path, token, None))
            }
            Some(slot) => {
                let held = slot.acquired_at.elapsed();
                if held >= self.inner.timeout {
                    slot.reclaim(token);
                    Ok(self.reclaimed_guard(path, token, held))
                } else {
                    Err(SyncError::LockContention {
                        path: path.to_string(),
                    })
                }
            }
        }
    }

    pub fn is_locked(&self, path: &str) -> bool {
        self.inner.state.lock().slots.contains_key(path)
    }

    /// Take a token sent after the waiter stopped listening. Handoffs are
    /// sent under the state lock, so none can arrive once `rx` is dropped here.
    fn claim_late_handoff(&self, mut rx: oneshot::Receiver<u64>) -> Option<u64> {
        let _state = self.inner.state.lock();
        let token = rx.try_recv().ok();
        drop(rx);
        token
    }

    fn guard(&self, path: &str, token: u64, reclaimed: Option<Duration>) -> LockGuard {
        LockGuard {
            inner: self.inner.clone(),
            path: path.to_string(),
            token,
            reclaimed,
        }
    }

    fn reclaimed_guard(&self, path: &str, token: u64, held: Duration) -> LockGuard {
        tracing::warn!(
            path,
            held_for_ms = held.as_millis() as u64,
            "Reclaiming stale document lock"
        );
        self.guard(path, token, Some(held))
    }
}

impl Slot {
    fn new(token: u64) -> Self {
        Self {
            token,
            acquired_at: Instant::now(),
            waiters: VecDeque::new(),
        }
    }

    fn reclaim(&mut self, token: u64) {
        self.token = token;
        self.acquired_at = Instant::now();
    }
}

/// Exclusive hold on one path. Released on drop, handing off to the next waiter.
pub struct LockGuard {
    inner: Arc<Inner>,
    path: String,
    token: u64,
    reclaimed: Option<Duration>,
}

impl LockGuard {
    /// The stale lock this guard took over, if it had to reclaim one.
    pub fn reclaimed(&self) -> Option<SyncError> {
        self.reclaimed.map(|held| SyncError::LockTimeout {
            path: self.path.clone(),
            held_for_ms: held.as_millis() as u64,
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        let next = state.next_token();
        let Some(slot) = state.slots.get_mut(&self.path) else {
            return;
        };
        if slot.token != self.token {
            tracing::debug!(path = %self.path, "Ignoring release of reclaimed lock");
            return;
        }
        while let Some(waiter) = slot.waiters.pop_front() {
            slot.reclaim(next);
            if waiter.send(next).is_ok() {
                return;
            }
        }
        state.slots.remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LockRegistry {
        LockRegistry::new(Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_are_served_in_order() {
        let locks = registry();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = locks.acquire("a.md").await;
        let mut handles = Vec::new();
        for i in 1..=3 {
            let locks = locks.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("a.md").await;
                order.lock().push(i);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
            tokio::task::yield_now().await;
        }
        order.lock().push(0);
        drop(first);

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
        assert!(!locks.is_locked("a.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_reports_contention() {
        let locks = registry();
        let guard = locks.try_acquire("a.md").unwrap();
        assert!(matches!(
            locks.try_acquire("a.md"),
            Err(SyncError::LockContention { .. })
        ));
        assert!(locks.try_acquire("b.md").is_ok());
        drop(guard);
        assert!(locks.try_acquire("a.md").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lock_is_reclaimed() {
        let locks = registry();
        let stale = locks.acquire("a.md").await;
        assert!(stale.reclaimed().is_none());

        tokio::time::advance(Duration::from_secs(31)).await;
        let fresh = locks.acquire("a.md").await;
        assert!(matches!(
            fresh.reclaimed(),
            Some(SyncError::LockTimeout { held_for_ms, .. }) if held_for_ms >= 30_000
        ));

        drop(stale);
        assert!(locks.is_locked("a.md"));
        drop(fresh);
        assert!(!locks.is_locked("a.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_reclaims_after_timeout() {
        let locks = registry();
        let _stuck = locks.acquire("a.md").await;

        let started = Instant::now();
        let guard = locks.acquire("a.md").await;
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(guard.reclaimed().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handoff_after_wait_expired_is_claimed() {
        let locks = registry();
        let holder = locks.acquire("a.md").await;
        let (tx, rx) = oneshot::channel();
        locks
            .inner
            .state
            .lock()
            .slots
            .get_mut("a.md")
            .unwrap()
            .waiters
            .push_back(tx);

        drop(holder);
        let token = locks.claim_late_handoff(rx).expect("handed-off token");
        let guard = locks.guard("a.md", token, None);
        assert!(matches!(
            locks.try_acquire("a.md"),
            Err(SyncError::LockContention { .. })
        ));
        drop(guard);
        assert!(!locks.is_locked("a.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_wait_without_handoff_claims_nothing() {
        let locks = registry();
        let _holder = locks.acquire("a.md").await;
        let (tx, rx) = oneshot::channel();
        locks
            .inner
            .state
            .lock()
            .slots
            .get_mut("a.md")
            .unwrap()
            .waiters
            .push_back(tx);

        assert!(locks.claim_late_handoff(rx).is_none());
        assert!(locks.is_locked("a.md"));
    }
}
