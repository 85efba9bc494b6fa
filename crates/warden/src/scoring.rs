//! Join anomaly scoring.
//!
//! Each joining candidate gets a weight from static account signals. The
//! factors are multiplicative and the age bands are exclusive, so a
//! ten-minute-old account is weighted by the hour band only.

use chrono::{DateTime, Utc};
use warden_common::Candidate;
use warden_common::constants::{DAY_SECS, HOUR_SECS};

use crate::config::ScoringConfig;

/// Computes the anomaly weight of a candidate
#[derive(Debug, Clone)]
pub struct Scorer {
    policy: ScoringConfig,
}

impl Scorer {
    pub fn new(policy: ScoringConfig) -> Self {
        Self { policy }
    }

    /// Anomaly weight of `candidate` at `now`. Always positive.
    pub fn score(&self, candidate: &Candidate, now: DateTime<Utc>) -> f64 {
        let p = &self.policy;
        let mut weight = p.base_weight;

        if looks_generated(&candidate.display_name) {
            weight *= p.bot_name_multiplier;
        }

        let age = candidate.account_age(now).num_seconds();
        if age < HOUR_SECS {
            weight *= p.under_hour_multiplier;
        } else if age < DAY_SECS {
            weight *= p.under_day_multiplier;
        }

        if candidate.trust_flags.is_trusted() {
            weight *= p.trusted_multiplier;
        }
        if !candidate.has_avatar {
            weight *= p.no_avatar_multiplier;
        }

        weight
    }
}

/// Letters and whitespace only, the usual shape of mass-created names
fn looks_generated(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use warden_common::{MemberId, TrustFlags};

    fn candidate(name: &str, age: Duration, avatar: bool, flags: u64) -> Candidate {
        let now = Utc::now();
        Candidate {
            id: MemberId(7),
            display_name: name.to_string(),
            account_created: now - age,
            joined_at: now,
            has_avatar: avatar,
            trust_flags: TrustFlags(flags),
            is_bot: false,
        }
    }

    fn scorer() -> Scorer {
        Scorer::new(ScoringConfig::default())
    }

    #[test]
    fn test_fresh_letters_only_without_avatar() {
        let c = candidate("john smith", Duration::minutes(10), false, 0);
        let score = scorer().score(&c, Utc::now());
        assert!((score - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_age_bands_are_exclusive() {
        let s = scorer();
        let now = Utc::now();
        let hour = candidate("x_1", Duration::minutes(59), true, 0);
        let day = candidate("x_1", Duration::hours(5), true, 0);
        let old = candidate("x_1", Duration::days(30), true, 0);

        assert!((s.score(&hour, now) - 3.0).abs() < 1e-9);
        assert!((s.score(&day, now) - 2.0).abs() < 1e-9);
        assert!((s.score(&old, now) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_trust_flag_discount() {
        let c = candidate("Verified Dev", Duration::days(400), true, 1 << 17);
        let score = scorer().score(&c, Utc::now());
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_name_shape() {
        assert!(looks_generated("Alice"));
        assert!(looks_generated("Bob  Ross"));
        assert!(!looks_generated("alice99"));
        assert!(!looks_generated("ｍｅ"));
        assert!(!looks_generated(""));
    }

    #[test]
    fn test_score_always_positive() {
        let c = candidate("a", Duration::days(1000), true, u64::MAX);
        assert!(scorer().score(&c, Utc::now()) > 0.0);
    }
}
