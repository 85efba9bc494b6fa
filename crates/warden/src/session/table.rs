//! Live session table keyed by candidate.

use std::collections::HashMap;
use warden_common::{MemberId, Removal, ThreadId};

use super::ChallengeSession;

/// A session whose id is allocated but whose thread is still being created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opening {
    InFlight,
    /// Swept up by a lockdown before the session went live
    Removed(Removal),
}

/// At most one live session per candidate
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<MemberId, ChallengeSession>,
    openings: HashMap<MemberId, (u64, Opening)>,
    next_id: u64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a session id
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Reserve a session id for `member` ahead of any directory call.
    /// Supersedes an opening still in flight for the same member.
    pub fn begin_opening(&mut self, member: MemberId) -> u64 {
        let id = self.next_id();
        self.openings.insert(member, (id, Opening::InFlight));
        id
    }

    /// Mark an in-flight opening as removed. Returns whether it was in flight.
    pub fn remove_opening(&mut self, member: MemberId, removal: Removal) -> bool {
        match self.openings.get_mut(&member) {
            Some((_, state @ Opening::InFlight)) => {
                *state = Opening::Removed(removal);
                true
            }
            _ => false,
        }
    }

    /// Forget an opening altogether. Returns whether there was one.
    pub fn abandon_opening(&mut self, member: MemberId) -> bool {
        self.openings.remove(&member).is_some()
    }

    /// Close opening `id`. `None` if it was abandoned or superseded.
    pub fn finish_opening(&mut self, member: MemberId, id: u64) -> Option<Opening> {
        match self.openings.get(&member) {
            Some((current, _)) if *current == id => self.openings.remove(&member).map(|(_, state)| state),
            _ => None,
        }
    }

    /// Install `session`, returning the session it replaced
    pub fn insert(&mut self, session: ChallengeSession) -> Option<ChallengeSession> {
        self.sessions.insert(session.candidate.id, session)
    }

    pub fn get(&self, member: MemberId) -> Option<&ChallengeSession> {
        self.sessions.get(&member)
    }

    /// Session of `member`, but only if it lives in `thread`
    pub fn get_in_thread(&mut self, member: MemberId, thread: ThreadId) -> Option<&mut ChallengeSession> {
        self.sessions.get_mut(&member).filter(|s| s.thread == thread)
    }

    /// Session of `member`, but only if it is still session `id`
    pub fn get_current(&mut self, member: MemberId, id: u64) -> Option<&mut ChallengeSession> {
        self.sessions.get_mut(&member).filter(|s| s.id == id)
    }

    pub fn remove(&mut self, member: MemberId) -> Option<ChallengeSession> {
        self.sessions.remove(&member)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::Challenge;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::time::Instant;
    use warden_common::{Candidate, TrustFlags};

    fn session(table: &mut SessionTable, member: u64, thread: u64) -> ChallengeSession {
        let candidate = Candidate {
            id: MemberId(member),
            display_name: "guest".to_string(),
            account_created: Utc::now(),
            joined_at: Utc::now(),
            has_avatar: false,
            trust_flags: TrustFlags::NONE,
            is_bot: false,
        };
        let challenge = Challenge {
            answer: "ABCDEF".to_string(),
            image: Vec::new(),
            generated_at: Utc::now(),
        };
        ChallengeSession::new(
            table.next_id(),
            candidate,
            ThreadId(thread),
            challenge,
            5,
            Duration::from_secs(60),
            Instant::now(),
        )
    }

    #[test]
    fn test_new_session_replaces_old() {
        let mut table = SessionTable::new();
        let first = session(&mut table, 1, 10);
        let second = session(&mut table, 1, 11);
        assert!(table.insert(first).is_none());

        let replaced = table.insert(second).expect("replaced session");
        assert_eq!(replaced.thread, ThreadId(10));
        assert_eq!(table.len(), 1);
        assert!(table.get_current(MemberId(1), replaced.id).is_none());
    }

    #[test]
    fn test_opening_lifecycle() {
        let mut table = SessionTable::new();
        let first = table.begin_opening(MemberId(1));
        let second = table.begin_opening(MemberId(1));

        // The later join supersedes the earlier one
        assert_eq!(table.finish_opening(MemberId(1), first), None);
        assert!(table.remove_opening(MemberId(1), Removal::Banned));
        assert!(!table.remove_opening(MemberId(1), Removal::Kicked));
        assert_eq!(
            table.finish_opening(MemberId(1), second),
            Some(Opening::Removed(Removal::Banned))
        );

        let third = table.begin_opening(MemberId(1));
        assert!(table.abandon_opening(MemberId(1)));
        assert_eq!(table.finish_opening(MemberId(1), third), None);
        assert!(!table.remove_opening(MemberId(1), Removal::Kicked));
    }

    #[test]
    fn test_reply_must_match_thread() {
        let mut table = SessionTable::new();
        let s = session(&mut table, 1, 10);
        table.insert(s);

        assert!(table.get_in_thread(MemberId(1), ThreadId(99)).is_none());
        assert!(table.get_in_thread(MemberId(2), ThreadId(10)).is_none());
        assert!(table.get_in_thread(MemberId(1), ThreadId(10)).is_some());
    }
}
