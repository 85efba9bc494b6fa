//! A single candidate's challenge session.

use std::time::Duration;
use tokio::time::Instant;
use warden_common::{Candidate, FailureReason, MessageId, ThreadId};

use crate::captcha::Challenge;

/// Resolution marker. Leaves `Pending` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Pending,
    Verified,
    Failed(FailureReason),
}

/// Result of grading one reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grade {
    /// Correct answer; the session is now resolved as verified
    Verified,
    /// Wrong answer with attempts left; a new challenge must be issued
    Retry { attempts_remaining: u32, rejected: String },
    /// Wrong answer on the last attempt; the session is now failed
    Exhausted,
    /// Session already resolved; the reply has no effect
    Ignored,
}

#[derive(Debug)]
pub struct ChallengeSession {
    /// Distinguishes this session from earlier ones of the same candidate
    pub id: u64,
    pub candidate: Candidate,
    /// Private thread the challenge lives in
    pub thread: ThreadId,
    /// Message carrying the current challenge image
    pub message: Option<MessageId>,
    pub created: Instant,
    /// Fixed at creation; retries never move it
    pub deadline: Instant,
    challenge: Challenge,
    attempts_remaining: u32,
    resolution: Resolution,
}

impl ChallengeSession {
    pub fn new(
        id: u64,
        candidate: Candidate,
        thread: ThreadId,
        challenge: Challenge,
        max_attempts: u32,
        lifetime: Duration,
        now: Instant,
    ) -> Self {
        Self {
            id,
            candidate,
            thread,
            message: None,
            created: now,
            deadline: now + lifetime,
            challenge,
            attempts_remaining: max_attempts,
            resolution: Resolution::Pending,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_pending(&self) -> bool {
        self.resolution == Resolution::Pending
    }

    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    /// Grade `reply` against the current answer (exact, case-sensitive)
    pub fn grade(&mut self, reply: &str) -> Grade {
        if !self.is_pending() || self.attempts_remaining == 0 {
            return Grade::Ignored;
        }

        if reply == self.challenge.answer {
            self.resolve(Resolution::Verified);
            return Grade::Verified;
        }

        self.attempts_remaining -= 1;
        if self.attempts_remaining == 0 {
            self.resolve(Resolution::Failed(FailureReason::Exhausted));
            return Grade::Exhausted;
        }

        Grade::Retry {
            attempts_remaining: self.attempts_remaining,
            rejected: self.challenge.answer.clone(),
        }
    }

    /// Swap in a fresh challenge. Attempts and deadline carry over.
    pub fn replace_challenge(&mut self, challenge: Challenge) {
        self.challenge = challenge;
    }

    /// Give back the attempt a retry consumed when no fresh challenge could
    /// be issued for it
    pub fn refund_attempt(&mut self, max_attempts: u32) {
        if self.is_pending() && self.attempts_remaining < max_attempts {
            self.attempts_remaining += 1;
        }
    }

    /// Set the resolution if still pending. Returns whether this call won.
    pub fn resolve(&mut self, outcome: Resolution) -> bool {
        if self.resolution != Resolution::Pending || outcome == Resolution::Pending {
            return false;
        }
        self.resolution = outcome;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_common::{MemberId, TrustFlags};

    fn challenge(answer: &str) -> Challenge {
        Challenge {
            answer: answer.to_string(),
            image: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    fn session(attempts: u32) -> ChallengeSession {
        let candidate = Candidate {
            id: MemberId(1),
            display_name: "newcomer".to_string(),
            account_created: Utc::now(),
            joined_at: Utc::now(),
            has_avatar: true,
            trust_flags: TrustFlags::NONE,
            is_bot: false,
        };
        ChallengeSession::new(
            1,
            candidate,
            ThreadId(10),
            challenge("AB23CD"),
            attempts,
            Duration::from_secs(3600),
            Instant::now(),
        )
    }

    #[test]
    fn test_exact_match_verifies() {
        let mut s = session(5);
        assert_eq!(s.grade("ab23cd"), Grade::Retry { attempts_remaining: 4, rejected: "AB23CD".into() });
        s.replace_challenge(challenge("XY9Z8W"));
        assert_eq!(s.grade("XY9Z8W"), Grade::Verified);
        assert_eq!(s.resolution(), Resolution::Verified);
        assert_eq!(s.grade("XY9Z8W"), Grade::Ignored);
    }

    #[test]
    fn test_attempts_monotonic_until_exhausted() {
        let mut s = session(5);
        let mut last = s.attempts_remaining();
        for _ in 0..4 {
            assert!(matches!(s.grade("nope"), Grade::Retry { .. }));
            assert!(s.attempts_remaining() < last);
            last = s.attempts_remaining();
        }
        assert_eq!(s.grade("nope"), Grade::Exhausted);
        assert_eq!(s.attempts_remaining(), 0);
        assert_eq!(s.resolution(), Resolution::Failed(FailureReason::Exhausted));

        // Correct answer after exhaustion changes nothing
        assert_eq!(s.grade("AB23CD"), Grade::Ignored);
        assert_eq!(s.attempts_remaining(), 0);
    }

    #[test]
    fn test_resolution_set_once() {
        let mut s = session(5);
        assert!(s.resolve(Resolution::Failed(FailureReason::Timeout)));
        assert!(!s.resolve(Resolution::Verified));
        assert_eq!(s.grade("AB23CD"), Grade::Ignored);
        assert_eq!(s.resolution(), Resolution::Failed(FailureReason::Timeout));
    }

    #[test]
    fn test_retry_keeps_deadline() {
        let mut s = session(5);
        let deadline = s.deadline;
        s.grade("wrong");
        s.replace_challenge(challenge("NEW234"));
        assert_eq!(s.deadline, deadline);
    }

    #[test]
    fn test_refund_restores_only_pending_attempts() {
        let mut s = session(5);
        s.grade("wrong");
        s.refund_attempt(5);
        assert_eq!(s.attempts_remaining(), 5);
        s.refund_attempt(5);
        assert_eq!(s.attempts_remaining(), 5);

        s.grade("wrong");
        assert!(s.resolve(Resolution::Failed(FailureReason::Timeout)));
        s.refund_attempt(5);
        assert_eq!(s.attempts_remaining(), 4);
    }
}
