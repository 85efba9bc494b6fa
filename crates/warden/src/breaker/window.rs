//! Sliding window of recent joins.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use warden_common::Candidate;

/// One scored join
#[derive(Debug, Clone)]
pub struct WindowEntry {
    pub candidate: Candidate,
    pub score: f64,
    pub joined: Instant,
}

/// Result of summing the live window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowScore {
    /// Every live entry was summed and the total stayed at or below the threshold
    Below(f64),
    /// The running sum crossed the threshold; later entries were not summed
    Exceeded(f64),
}

/// Joins in arrival order, bounded in time
#[derive(Debug)]
pub struct AdmissionWindow {
    entries: VecDeque<WindowEntry>,
    length: Duration,
}

impl AdmissionWindow {
    pub fn new(length: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            length,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, candidate: Candidate, score: f64, joined: Instant) {
        self.entries.push_back(WindowEntry {
            candidate,
            score,
            joined,
        });
    }

    /// Drop entries older than the window length. Returns how many were dropped.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| now.saturating_duration_since(e.joined) <= self.length);
        before - self.entries.len()
    }

    /// Sum live scores in join order, stopping as soon as the sum exceeds `threshold`
    pub fn aggregate(&self, threshold: f64) -> WindowScore {
        let mut sum = 0.0;
        for entry in &self.entries {
            sum += entry.score;
            if sum > threshold {
                return WindowScore::Exceeded(sum);
            }
        }
        WindowScore::Below(sum)
    }

    /// Take every entry, leaving the window empty
    pub fn drain(&mut self) -> Vec<WindowEntry> {
        self.entries.drain(..).collect()
    }
}
