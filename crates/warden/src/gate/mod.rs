//! Admission gate.
//!
//! Owns all admission state for one server: the raid breaker, the live
//! challenge sessions and their timers. Host events (join, leave, reply)
//! and the periodic breaker tick and regularization sweep all enter here.
//!
//! ## Flow
//! ```text
//! join ─► breaker ─ open ──► punish (kick / ban)
//!            │
//!          closed
//!            ▼
//!        session ─► reply ─► verified ─► access role
//!            │         └──► retry / exhausted ─► kick
//!            └─ deadline ─► kick
//! ```

mod access;
mod events;
mod notices;
mod punish;

pub use access::regularization_worker;
pub use events::{GateEvent, audit_worker};
pub use punish::{TripReport, breaker_worker};

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use warden_common::{
    AdmissionResult, BreakerState, Candidate, FailureReason, MemberId, MessageId, Removal, ThreadId, WardenError,
};

use crate::breaker::{Admission, CircuitBreaker};
use crate::captcha::{ChallengePool, IMAGE_FILENAME, PoolStatsSnapshot};
use crate::config::AppConfig;
use crate::directory::{MembershipDirectory, OutgoingMessage, notify};
use crate::scoring::Scorer;
use crate::session::{ChallengeSession, Grade, Opening, Resolution, SessionTable};
use crate::timers::TimerRegistry;

/// Event channel depth; slow subscribers lag rather than block the gate
const EVENT_BUFFER: usize = 1024;

/// A reply posted by someone inside a thread
#[derive(Debug, Clone)]
pub struct Reply {
    pub thread: ThreadId,
    pub author: MemberId,
    pub content: String,
    /// The reply's own message, if the host reports it
    pub message: Option<MessageId>,
}

#[derive(Default)]
struct GateCounters {
    joins: AtomicU64,
    verified: AtomicU64,
    kicked: AtomicU64,
    banned: AtomicU64,
    trips: AtomicU64,
    promoted: AtomicU64,
}

/// Snapshot of gate state for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct GateStatsSnapshot {
    pub breaker: BreakerState,
    pub window_size: usize,
    pub punishment_history: usize,
    pub live_sessions: usize,
    pub armed_deadlines: usize,
    pub joins: u64,
    pub verified: u64,
    pub kicked: u64,
    pub banned: u64,
    pub trips: u64,
    pub promoted: u64,
    pub challenge_pool: PoolStatsSnapshot,
}

/// The admission-control core for one server
pub struct AdmissionGate<D: MembershipDirectory> {
    config: AppConfig,
    directory: Arc<D>,
    challenges: Arc<ChallengePool>,
    breaker: Mutex<CircuitBreaker>,
    sessions: Mutex<SessionTable>,
    /// Session deadlines, keyed by candidate
    deadlines: TimerRegistry<MemberId>,
    /// Breaker cooldowns, keyed by Open episode
    cooldowns: TimerRegistry<u64>,
    /// Delayed deletion of verified threads
    cleanups: TimerRegistry<ThreadId>,
    events: broadcast::Sender<GateEvent>,
    started: AtomicBool,
    counters: GateCounters,
}

impl<D: MembershipDirectory> AdmissionGate<D> {
    pub fn new(config: AppConfig, directory: Arc<D>, challenges: Arc<ChallengePool>) -> Arc<Self> {
        let breaker = CircuitBreaker::new(Scorer::new(config.scoring.clone()), &config.breaker);
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Arc::new(Self {
            config,
            directory,
            challenges,
            breaker: Mutex::new(breaker),
            sessions: Mutex::new(SessionTable::new()),
            deadlines: TimerRegistry::new(),
            cooldowns: TimerRegistry::new(),
            cleanups: TimerRegistry::new(),
            events,
            started: AtomicBool::new(false),
            counters: GateCounters::default(),
        })
    }

    /// Subscribe to gate events
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Verify the configured channel and roles exist, then clear threads left
    /// over from a previous run. Refuses to start on a missing role or channel.
    pub async fn start(&self) -> Result<(), WardenError> {
        let guild = &self.config.guild;

        if !self.directory.channel_exists(guild.welcome_channel).await? {
            return Err(WardenError::Invariant(format!(
                "welcome channel {} does not exist",
                guild.welcome_channel
            )));
        }
        for (name, role) in [("full", guild.full_role), ("provisional", guild.provisional_role)] {
            if !self.directory.role_exists(role).await? {
                return Err(WardenError::Invariant(format!("{name} role {role} does not exist")));
            }
        }

        let leftovers = self.directory.list_private_threads(guild.welcome_channel).await?;
        for thread in &leftovers {
            if let Err(e) = self.directory.delete_thread(*thread).await {
                warn!(thread_id = %thread, error = %e, "Failed to delete leftover thread");
            }
        }
        if !leftovers.is_empty() {
            info!(count = leftovers.len(), "🧹 Removed leftover verification threads");
        }

        self.started.store(true, Ordering::Release);
        Ok(())
    }

    /// A member joined the server
    pub async fn on_member_joined(self: &Arc<Self>, candidate: Candidate) -> AdmissionResult {
        info!(
            member_id = %candidate.id,
            name = %candidate.display_name,
            created = %candidate.account_created,
            "Member joined"
        );

        if candidate.is_bot {
            debug!(member_id = %candidate.id, "Bot account exempt from admission");
            return AdmissionResult::Exempt;
        }
        self.counters.joins.fetch_add(1, Ordering::Relaxed);

        // Reserved before the join enters the window, so a trip always sees it
        let session_id = self.sessions.lock().await.begin_opening(candidate.id);
        let admission = self.breaker.lock().await.admit(&candidate, Instant::now(), Utc::now());

        match admission {
            Admission::Punish(removal) => {
                self.discard_session(candidate.id).await;
                self.punish(candidate.id, removal).await;
                let result = AdmissionResult::Removed(removal);
                self.emit(GateEvent::Resolved {
                    member: candidate.id,
                    result,
                    reason: Some(FailureReason::Lockdown),
                });
                result
            }
            Admission::Windowed { score } => {
                debug!(member_id = %candidate.id, score, "Join accepted into window");
                self.emit(GateEvent::JoinAccepted {
                    member: candidate.id,
                    score,
                });
                let member = candidate.id;
                let result = self.open_session(candidate, session_id).await;
                if result.is_terminal() {
                    debug!(member_id = %member, result = ?result, "Resolved before the challenge went out");
                }
                result
            }
        }
    }

    /// A member left the server on their own
    pub async fn on_member_left(&self, member: MemberId) {
        info!(member_id = %member, "Member left");
        if self.discard_session(member).await {
            self.emit(GateEvent::SessionDiscarded { member });
        }
    }

    /// A message was posted in a thread
    pub async fn on_reply(self: &Arc<Self>, reply: Reply) {
        let mut sessions = self.sessions.lock().await;
        // Anything but the candidate answering in their own thread is ignored
        let Some(session) = sessions.get_in_thread(reply.author, reply.thread) else {
            return;
        };

        let grade = session.grade(&reply.content);
        let member = reply.author;
        debug!(
            member_id = %member,
            attempts_remaining = session.attempts_remaining(),
            verdict = ?grade,
            "Challenge attempt graded"
        );

        match grade {
            Grade::Verified => {
                self.emit_graded(member, true, session.attempts_remaining());
                let session = sessions.remove(member);
                drop(sessions);
                if let Some(session) = session {
                    self.deadlines.cancel(&member).await;
                    self.finish_verified(session, reply.message).await;
                }
            }
            Grade::Exhausted => {
                self.emit_graded(member, false, 0);
                let session = sessions.remove(member);
                drop(sessions);
                if let Some(session) = session {
                    self.deadlines.cancel(&member).await;
                    self.finish_failed(member, Some(session.thread), FailureReason::Exhausted)
                        .await;
                }
            }
            Grade::Retry {
                attempts_remaining,
                rejected,
            } => {
                let challenge = match self.challenges.take_excluding(&rejected) {
                    Ok(challenge) => challenge,
                    Err(e) => {
                        // The rejected challenge stays up, so the reply does not count
                        session.refund_attempt(self.config.challenge.max_attempts);
                        warn!(member_id = %member, error = %e, "Could not regenerate challenge, attempt refunded");
                        return;
                    }
                };
                self.emit_graded(member, false, attempts_remaining);
                let image = challenge.image.clone();
                session.replace_challenge(challenge);
                let session_id = session.id;
                let thread = session.thread;
                let previous = session.message.take();
                drop(sessions);

                if let Some(previous) = previous {
                    if let Err(e) = self.directory.delete_message(thread, previous).await {
                        debug!(thread_id = %thread, error = %e, "Failed to delete previous challenge");
                    }
                }
                let message = OutgoingMessage::text(notices::retry(attempts_remaining))
                    .with_attachment(IMAGE_FILENAME, image);
                self.post_challenge(member, session_id, thread, message, attempts_remaining)
                    .await;
            }
            Grade::Ignored => {}
        }
    }

    /// Deadline timer fired for session `session_id`
    async fn expire(self: Arc<Self>, member: MemberId, session_id: u64) {
        let session = {
            let mut sessions = self.sessions.lock().await;
            let won = sessions
                .get_current(member, session_id)
                .is_some_and(|s| s.resolve(Resolution::Failed(FailureReason::Timeout)));
            if won { sessions.remove(member) } else { None }
        };

        if let Some(session) = session {
            info!(member_id = %member, "⏰ Verification deadline elapsed");
            self.finish_failed(member, Some(session.thread), FailureReason::Timeout)
                .await;
        }
    }

    /// Create the thread, issue the first challenge and arm the deadline.
    /// `session_id` is the opening reserved for the candidate at join time.
    async fn open_session(self: &Arc<Self>, candidate: Candidate, session_id: u64) -> AdmissionResult {
        let guild = &self.config.guild;
        let challenge_cfg = &self.config.challenge;
        let member = candidate.id;

        let thread = match self
            .directory
            .create_private_thread(guild.welcome_channel, &candidate)
            .await
        {
            Ok(thread) => thread,
            Err(e) => return self.abandon_opening(member, session_id, None, e.into()).await,
        };
        let challenge = match self.challenges.take() {
            Ok(challenge) => challenge,
            Err(e) => return self.abandon_opening(member, session_id, Some(thread), e).await,
        };
        let image = challenge.image.clone();

        let claimed = {
            let mut sessions = self.sessions.lock().await;
            match sessions.finish_opening(member, session_id) {
                Some(Opening::InFlight) => Ok(sessions.insert(ChallengeSession::new(
                    session_id,
                    candidate,
                    thread,
                    challenge,
                    challenge_cfg.max_attempts,
                    challenge_cfg.deadline(),
                    Instant::now(),
                ))),
                Some(Opening::Removed(removal)) => Err(AdmissionResult::Removed(removal)),
                // Left, or superseded by a later join
                None => Err(AdmissionResult::Pending),
            }
        };
        let replaced = match claimed {
            Ok(replaced) => replaced,
            Err(result) => {
                debug!(member_id = %member, thread_id = %thread, "Opening withdrawn while the thread was created");
                self.delete_thread(thread).await;
                return result;
            }
        };

        let gate = self.clone();
        self.deadlines
            .schedule(member, challenge_cfg.deadline(), gate.expire(member, session_id))
            .await;

        if let Some(old) = replaced {
            debug!(member_id = %member, thread_id = %old.thread, "Replaced earlier session");
            self.delete_thread(old.thread).await;
        }

        let message = OutgoingMessage::text(notices::welcome(
            member,
            &guild.name,
            guild.welcome_channel,
            challenge_cfg.answer_length,
        ))
        .with_attachment(IMAGE_FILENAME, image);
        self.post_challenge(member, session_id, thread, message, challenge_cfg.max_attempts)
            .await;
        AdmissionResult::Pending
    }

    /// A challenge could not be set up. The candidate is removed unless the
    /// opening was already withdrawn.
    async fn abandon_opening(
        &self,
        member: MemberId,
        session_id: u64,
        thread: Option<ThreadId>,
        error: WardenError,
    ) -> AdmissionResult {
        warn!(member_id = %member, error = %error, "Challenge could not be issued");
        let opening = self.sessions.lock().await.finish_opening(member, session_id);

        match opening {
            Some(Opening::InFlight) => {
                self.finish_failed(member, thread, FailureReason::Unavailable).await
            }
            withdrawn => {
                if let Some(thread) = thread {
                    self.delete_thread(thread).await;
                }
                match withdrawn {
                    Some(Opening::Removed(removal)) => AdmissionResult::Removed(removal),
                    _ => AdmissionResult::Pending,
                }
            }
        }
    }

    /// Send a challenge message and remember it on the session
    async fn post_challenge(
        &self,
        member: MemberId,
        session_id: u64,
        thread: ThreadId,
        message: OutgoingMessage,
        attempts_remaining: u32,
    ) {
        match self.directory.send_message(thread, message).await {
            Ok(message_id) => {
                if let Some(session) = self.sessions.lock().await.get_current(member, session_id) {
                    session.message = Some(message_id);
                }
                self.emit(GateEvent::ChallengeIssued {
                    member,
                    thread,
                    attempts_remaining,
                });
            }
            Err(e) => warn!(member_id = %member, thread_id = %thread, error = %e, "Failed to send challenge"),
        }
    }

    async fn finish_verified(&self, session: ChallengeSession, reply: Option<MessageId>) {
        let member = session.candidate.id;
        let thread = session.thread;
        let guild = &self.config.guild;
        let grace = self.config.challenge.grace();

        info!(
            member_id = %member,
            elapsed_secs = session.created.elapsed().as_secs(),
            attempts_remaining = session.attempts_remaining(),
            "✅ Candidate verified"
        );
        self.counters.verified.fetch_add(1, Ordering::Relaxed);
        self.emit(GateEvent::Resolved {
            member,
            result: AdmissionResult::Verified,
            reason: None,
        });

        let mut notice = OutgoingMessage::text(notices::verified(&guild.name, grace.as_secs()));
        if let Some(reply) = reply {
            notice = notice.replying_to(reply);
        }
        if let Err(e) = self.directory.send_message(thread, notice).await {
            debug!(thread_id = %thread, error = %e, "Failed to send verification notice");
        }
        if let Some(challenge_message) = session.message {
            if let Err(e) = self.directory.delete_message(thread, challenge_message).await {
                debug!(thread_id = %thread, error = %e, "Failed to delete challenge message");
            }
        }

        let directory = self.directory.clone();
        self.cleanups
            .schedule(thread, grace, async move {
                if let Err(e) = directory.delete_thread(thread).await {
                    debug!(thread_id = %thread, error = %e, "Failed to delete verified thread");
                }
            })
            .await;

        self.grant_access(&session.candidate).await;
    }

    /// Notify, kick and clean up a candidate whose admission failed
    async fn finish_failed(&self, member: MemberId, thread: Option<ThreadId>, reason: FailureReason) -> AdmissionResult {
        let server = &self.config.guild.name;
        let (notice, kick_reason) = match reason {
            FailureReason::Exhausted => (
                notices::exhausted(server, self.config.challenge.max_attempts),
                notices::REASON_EXHAUSTED,
            ),
            FailureReason::Unavailable => (notices::unavailable(server), notices::REASON_UNAVAILABLE),
            FailureReason::Timeout | FailureReason::Lockdown => (notices::timed_out(server), notices::REASON_TIMEOUT),
        };

        let delivery = notify(self.directory.as_ref(), member, &notice).await;
        if let Err(e) = self.directory.kick(member, kick_reason).await {
            warn!(member_id = %member, error = %e, "Failed to kick candidate");
        }
        self.counters.kicked.fetch_add(1, Ordering::Relaxed);
        if let Some(thread) = thread {
            self.delete_thread(thread).await;
        }

        info!(
            member_id = %member,
            reason = ?reason,
            notice_delivered = delivery.is_delivered(),
            "❌ Candidate removed"
        );
        let result = AdmissionResult::Removed(Removal::Kicked);
        self.emit(GateEvent::Resolved {
            member,
            result,
            reason: Some(reason),
        });
        result
    }

    /// Drop a member's live session, or withdraw one still being opened,
    /// without emitting an outcome. Returns whether there was anything to drop.
    async fn discard_session(&self, member: MemberId) -> bool {
        let (session, was_opening) = {
            let mut sessions = self.sessions.lock().await;
            (sessions.remove(member), sessions.abandon_opening(member))
        };
        if let Some(session) = &session {
            self.deadlines.cancel(&member).await;
            debug!(member_id = %member, thread_id = %session.thread, "Session discarded");
            self.delete_thread(session.thread).await;
        }
        session.is_some() || was_opening
    }

    async fn delete_thread(&self, thread: ThreadId) {
        self.cleanups.cancel(&thread).await;
        if let Err(e) = self.directory.delete_thread(thread).await {
            debug!(thread_id = %thread, error = %e, "Failed to delete thread");
        }
    }

    fn emit_graded(&self, member: MemberId, correct: bool, attempts_remaining: u32) {
        self.emit(GateEvent::AttemptGraded {
            member,
            correct,
            attempts_remaining,
        });
    }

    fn emit(&self, event: GateEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub async fn get_stats(&self) -> GateStatsSnapshot {
        let (breaker, window_size, punishment_history) = {
            let b = self.breaker.lock().await;
            (b.state(), b.window_len(), b.history_len())
        };
        let live_sessions = self.sessions.lock().await.len();

        GateStatsSnapshot {
            breaker,
            window_size,
            punishment_history,
            live_sessions,
            armed_deadlines: self.deadlines.len().await,
            joins: self.counters.joins.load(Ordering::Relaxed),
            verified: self.counters.verified.load(Ordering::Relaxed),
            kicked: self.counters.kicked.load(Ordering::Relaxed),
            banned: self.counters.banned.load(Ordering::Relaxed),
            trips: self.counters.trips.load(Ordering::Relaxed),
            promoted: self.counters.promoted.load(Ordering::Relaxed),
            challenge_pool: self.challenges.get_stats(),
        }
    }
}
