//! Raid circuit breaker state machine.
//!
//! The breaker only decides; the admission gate performs the kicks and bans
//! it asks for and arms the cooldown timer.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::time::Instant;
use warden_common::{BreakerState, Candidate, MemberId, Removal};

use super::window::{AdmissionWindow, WindowScore};
use crate::config::BreakerConfig;
use crate::scoring::Scorer;

/// What to do with a joining member
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Breaker closed: the join was scored and windowed
    Windowed { score: f64 },
    /// Breaker open: remove immediately
    Punish(Removal),
}

/// A Closed -> Open transition
#[derive(Debug, Clone)]
pub struct Trip {
    /// Identifies the Open episode (and its cooldown timer)
    pub episode: u64,
    /// Window score at the moment of tripping
    pub score: f64,
    /// Everyone live in the window, in join order
    pub victims: Vec<Candidate>,
}

/// Result of one aggregation tick
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Breaker is open; nothing to aggregate
    Idle,
    /// Live score stayed below the threshold
    Scored { score: f64, live: usize },
    /// Threshold crossed
    Tripped(Trip),
}

/// Closed/Open raid breaker with per-episode punishment history
pub struct CircuitBreaker {
    scorer: Scorer,
    window: AdmissionWindow,
    state: BreakerState,
    /// Punishments per member during the current Open episode
    history: HashMap<MemberId, u32>,
    trip_threshold: f64,
    ban_threshold: u32,
    episodes: u64,
}

impl CircuitBreaker {
    pub fn new(scorer: Scorer, config: &BreakerConfig) -> Self {
        Self {
            scorer,
            window: AdmissionWindow::new(config.window()),
            state: BreakerState::Closed,
            history: HashMap::new(),
            trip_threshold: config.trip_threshold,
            ban_threshold: config.ban_threshold,
            episodes: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Admit a join. Open: punish without scoring. Closed: score and window.
    pub fn admit(&mut self, candidate: &Candidate, now: Instant, wall: DateTime<Utc>) -> Admission {
        if self.state.is_open() {
            return Admission::Punish(self.punishment_for(candidate.id));
        }

        let score = self.scorer.score(candidate, wall);
        self.window.push(candidate.clone(), score, now);
        Admission::Windowed { score }
    }

    /// Prune the window and sum it. Trips at most once per Closed period.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.state.is_open() {
            return TickOutcome::Idle;
        }

        self.window.prune(now);
        if self.window.is_empty() {
            return TickOutcome::Scored { score: 0.0, live: 0 };
        }
        match self.window.aggregate(self.trip_threshold) {
            WindowScore::Below(score) => TickOutcome::Scored {
                score,
                live: self.window.len(),
            },
            WindowScore::Exceeded(score) => {
                self.episodes += 1;
                let episode = self.episodes;
                self.state = BreakerState::Open { episode };

                let victims = self.window.drain().into_iter().map(|e| e.candidate).collect();
                TickOutcome::Tripped(Trip {
                    episode,
                    score,
                    victims,
                })
            }
        }
    }

    /// Record a punishment and decide its kind.
    ///
    /// The punishment that brings a member's count for this episode to the
    /// ban threshold is a ban; earlier ones are kicks.
    pub fn punishment_for(&mut self, member: MemberId) -> Removal {
        let count = self.history.entry(member).or_insert(0);
        *count += 1;
        if *count >= self.ban_threshold {
            Removal::Banned
        } else {
            Removal::Kicked
        }
    }

    /// Cooldown elapsed for `episode`. Stale episodes are ignored.
    pub fn reset(&mut self, episode: u64) -> bool {
        match self.state {
            BreakerState::Open { episode: current } if current == episode => {
                self.state = BreakerState::Closed;
                self.history.clear();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use warden_common::TrustFlags;

    /// Ten-minute-old account, letters-only name, no avatar: scores 18
    fn raider(id: u64) -> Candidate {
        let now = Utc::now();
        Candidate {
            id: MemberId(id),
            display_name: "free nitro".to_string(),
            account_created: now - ChronoDuration::minutes(10),
            joined_at: now,
            has_avatar: false,
            trust_flags: TrustFlags::NONE,
            is_bot: false,
        }
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(Scorer::new(ScoringConfig::default()), &BreakerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_join_stays_closed() {
        let mut b = breaker();
        let admission = b.admit(&raider(1), Instant::now(), Utc::now());
        assert_eq!(admission, Admission::Windowed { score: 18.0 });

        match b.tick(Instant::now()) {
            TickOutcome::Scored { score, live } => {
                assert_eq!(score, 18.0);
                assert_eq!(live, 1);
            }
            other => panic!("unexpected tick outcome: {other:?}"),
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_once_and_takes_window() {
        let mut b = breaker();
        for id in 1..=3 {
            b.admit(&raider(id), Instant::now(), Utc::now());
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        let trip = match b.tick(Instant::now()) {
            TickOutcome::Tripped(trip) => trip,
            other => panic!("expected trip, got {other:?}"),
        };
        assert_eq!(trip.episode, 1);
        assert_eq!(trip.score, 54.0);
        let ids: Vec<_> = trip.victims.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(b.window_len(), 0);
        assert_eq!(b.state(), BreakerState::Open { episode: 1 });

        // Open: no second trip, later joins punished unscored
        assert!(matches!(b.tick(Instant::now()), TickOutcome::Idle));
        assert_eq!(b.admit(&raider(4), Instant::now(), Utc::now()), Admission::Punish(Removal::Kicked));
        assert_eq!(b.window_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_do_not_count() {
        let mut b = breaker();
        b.admit(&raider(1), Instant::now(), Utc::now());
        b.admit(&raider(2), Instant::now(), Utc::now());
        tokio::time::advance(Duration::from_secs(61)).await;
        b.admit(&raider(3), Instant::now(), Utc::now());
        b.admit(&raider(4), Instant::now(), Utc::now());

        // 1 and 2 aged out: 36 live, below 50
        assert!(matches!(b.tick(Instant::now()), TickOutcome::Scored { live: 2, .. }));

        b.admit(&raider(5), Instant::now(), Utc::now());
        let TickOutcome::Tripped(trip) = b.tick(Instant::now()) else {
            panic!("expected trip");
        };
        let ids: Vec<_> = trip.victims.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn test_second_punishment_in_episode_is_ban() {
        let mut b = breaker();
        assert_eq!(b.punishment_for(MemberId(9)), Removal::Kicked);
        assert_eq!(b.punishment_for(MemberId(9)), Removal::Banned);
        assert_eq!(b.punishment_for(MemberId(10)), Removal::Kicked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_history_and_ignores_stale_episode() {
        let mut b = breaker();
        for id in 1..=3 {
            b.admit(&raider(id), Instant::now(), Utc::now());
        }
        let TickOutcome::Tripped(trip) = b.tick(Instant::now()) else {
            panic!("expected trip");
        };
        b.punishment_for(MemberId(1));
        assert_eq!(b.history_len(), 1);

        assert!(!b.reset(trip.episode + 1));
        assert!(b.state().is_open());

        assert!(b.reset(trip.episode));
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.history_len(), 0);
        assert_eq!(b.punishment_for(MemberId(1)), Removal::Kicked);
    }
}
