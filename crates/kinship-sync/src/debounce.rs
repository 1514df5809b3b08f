//! Per-path debouncing of edit bursts.
//!
//! Each `schedule` for a path restarts its quiet period; only the last task
//! scheduled in a burst runs. A task is unregistered just before it starts,
//! so a schedule arriving while it runs starts a fresh quiet period instead
//! of aborting the in-flight work.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct Debouncer {
    pending: Arc<Mutex<HashMap<String, Pending>>>,
    generation: Arc<AtomicU64>,
    delay: Duration,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            delay,
        }
    }

    /// Run `task` once `path` has been quiet for the delay.
    pub fn schedule<F, Fut>(&self, path: &str, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let pending = self.pending.clone();
        let key = path.to_string();
        let delay = self.delay;

        // Registered before the task can observe the map.
        let mut map = self.pending.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = pending.lock();
                match map.get(&key) {
                    Some(p) if p.generation == generation => {
                        map.remove(&key);
                    }
                    _ => return,
                }
            }
            task().await;
        });

        let previous = map.insert(path.to_string(), Pending { generation, handle });
        drop(map);
        if let Some(previous) = previous {
            previous.handle.abort();
            tracing::debug!(path, "Debounce restarted");
        }
    }

    /// Drop the pending task for `path`. Returns whether one was pending.
    pub fn cancel(&self, path: &str) -> bool {
        match self.pending.lock().remove(path) {
            Some(p) => {
                p.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, p) in self.pending.lock().drain() {
            p.handle.abort();
        }
    }

    pub fn is_pending(&self, path: &str) -> bool {
        self.pending.lock().contains_key(path)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_task(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one_run() {
        let debouncer = Debouncer::new(Duration::from_millis(1000));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            debouncer.schedule("a.md", counter_task(&runs));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending("a.md"));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending("a.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paths_are_independent() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let runs = Arc::new(AtomicUsize::new(0));
        debouncer.schedule("a.md", counter_task(&runs));
        debouncer.schedule("b.md", counter_task(&runs));
        assert_eq!(debouncer.pending_count(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let runs = Arc::new(AtomicUsize::new(0));
        debouncer.schedule("a.md", counter_task(&runs));
        assert!(debouncer.cancel("a.md"));
        assert!(!debouncer.cancel("a.md"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
