//! Pre-rendered challenge pool.
//!
//! Rendering a PNG is the most expensive step of admitting a member, and
//! joins arrive in bursts. The pool keeps a bounded stock of ready
//! challenges in a lock-free ring buffer; a background worker tops it up
//! and a miss falls back to rendering on demand.

use crossbeam_queue::ArrayQueue;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use warden_common::WardenError;

use super::{Challenge, ChallengeSource};

/// Re-rolls allowed when a fresh challenge repeats the rejected answer
const MAX_REROLLS: usize = 8;

/// Challenges rendered per refill pass
const REFILL_BATCH: usize = 16;

/// Bounded stock of rendered challenges in front of a [`ChallengeSource`]
pub struct ChallengePool {
    /// Ready challenges (None when pooling is disabled)
    queue: Option<ArrayQueue<Challenge>>,
    /// Where new challenges come from
    source: Arc<dyn ChallengeSource>,
    /// Statistics
    stats: PoolStats,
}

#[derive(Default)]
struct PoolStats {
    served: AtomicU64,
    generated: AtomicU64,
    misses: AtomicU64,
}

impl ChallengePool {
    /// Create a pool holding up to `capacity` challenges. Zero disables pooling.
    pub fn new(source: Arc<dyn ChallengeSource>, capacity: usize) -> Self {
        Self {
            queue: (capacity > 0).then(|| ArrayQueue::new(capacity)),
            source,
            stats: PoolStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.capacity())
    }

    pub fn len(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.len())
    }

    /// Pool fill percentage (0-100)
    pub fn fill_percent(&self) -> u8 {
        match self.capacity() {
            0 => 0,
            cap => ((self.len() as f64 / cap as f64) * 100.0) as u8,
        }
    }

    /// Take a challenge, rendering one if the pool is empty
    pub fn take(&self) -> Result<Challenge, WardenError> {
        if let Some(challenge) = self.queue.as_ref().and_then(|q| q.pop()) {
            self.stats.served.fetch_add(1, Ordering::Relaxed);
            return Ok(challenge);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        self.render()
    }

    /// Take a challenge whose answer differs from `rejected`
    pub fn take_excluding(&self, rejected: &str) -> Result<Challenge, WardenError> {
        let mut challenge = self.take()?;
        for _ in 0..MAX_REROLLS {
            if challenge.answer != rejected {
                break;
            }
            challenge = self.render()?;
        }
        Ok(challenge)
    }

    /// Render up to `max` challenges into the pool. Returns how many were added.
    pub fn refill(&self, max: usize) -> Result<usize, WardenError> {
        let Some(queue) = self.queue.as_ref() else {
            return Ok(0);
        };

        let mut added = 0;
        while added < max && !queue.is_full() {
            let challenge = self.render()?;
            if queue.push(challenge).is_err() {
                break; // Pool is full
            }
            added += 1;
        }
        Ok(added)
    }

    pub fn get_stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            pool_size: self.len(),
            pool_capacity: self.capacity(),
            fill_percent: self.fill_percent(),
            served: self.stats.served.load(Ordering::Relaxed),
            generated: self.stats.generated.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
        }
    }

    fn render(&self) -> Result<Challenge, WardenError> {
        let challenge = self.source.generate()?;
        self.stats.generated.fetch_add(1, Ordering::Relaxed);
        Ok(challenge)
    }
}

/// Snapshot of pool statistics
#[derive(Clone, Debug, Serialize)]
pub struct PoolStatsSnapshot {
    pub pool_size: usize,
    pub pool_capacity: usize,
    pub fill_percent: u8,
    pub served: u64,
    pub generated: u64,
    pub misses: u64,
}

/// Background worker that keeps the pool topped up
pub async fn pool_worker(pool: Arc<ChallengePool>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
    if pool.capacity() == 0 {
        tracing::info!("Challenge pool disabled");
        return;
    }
    tracing::info!("🎯 Challenge pool worker started (capacity: {})", pool.capacity());

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if pool.fill_percent() >= 100 {
                    continue;
                }
                let filler = pool.clone();
                match tokio::task::spawn_blocking(move || filler.refill(REFILL_BATCH)).await {
                    Ok(Ok(added)) if added > 0 => {
                        tracing::debug!(added, fill_pct = pool.fill_percent(), "Challenge pool refilled");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Challenge pool refill failed"),
                    Err(e) => tracing::error!(error = %e, "Challenge pool refill task panicked"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("🎯 Challenge pool worker shutting down...");
                break;
            }
        }
    }
}
