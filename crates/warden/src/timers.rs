//! Keyed, cancellable one-shot timers.
//!
//! Session deadlines and breaker cooldowns are spawned tasks registered
//! under a key, so early resolution is a lookup-and-abort. A timer that
//! fires removes its own entry before running, so the task it runs can
//! never abort itself through [`TimerRegistry::cancel`].

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

type Slots<K> = Arc<Mutex<HashMap<K, (u64, AbortHandle)>>>;

pub struct TimerRegistry<K> {
    slots: Slots<K>,
    tokens: AtomicU64,
}

impl<K> TimerRegistry<K>
where
    K: Eq + Hash + Copy + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            tokens: AtomicU64::new(0),
        }
    }

    /// Run `task` after `delay`, replacing (and aborting) any timer under `key`
    pub async fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.tokens.fetch_add(1, Ordering::Relaxed);
        let slots = self.slots.clone();

        // Hold the map while spawning so the task cannot disarm before it is registered
        let mut map = self.slots.lock().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = slots.lock().await;
                if map.get(&key).is_some_and(|(t, _)| *t == token) {
                    map.remove(&key);
                }
            }
            task.await;
        });

        if let Some((_, previous)) = map.insert(key, (token, handle.abort_handle())) {
            previous.abort();
        }
    }

    /// Abort the timer under `key`. Returns false if none was armed.
    pub async fn cancel(&self, key: &K) -> bool {
        match self.slots.lock().await.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn is_armed(&self, key: &K) -> bool {
        self.slots.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

impl<K> Default for TimerRegistry<K>
where
    K: Eq + Hash + Copy + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_disarms() {
        let timers = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        timers
            .schedule(1u64, Duration::from_secs(10), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(timers.is_armed(&1).await);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_armed(&1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let timers = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        timers
            .schedule(7u64, Duration::from_secs(5), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(timers.cancel(&7).await);
        assert!(!timers.cancel(&7).await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(timers.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_previous() {
        let timers = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = fired.clone();
            timers
                .schedule(2u64, Duration::from_secs(5), async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
