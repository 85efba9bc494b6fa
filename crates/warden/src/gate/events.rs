//! Observability events published by the gate.

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use warden_common::{AccessTier, AdmissionResult, FailureReason, MemberId, NoticeDelivery, Removal, ThreadId};

/// Everything operators (and tests) can observe about admissions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GateEvent {
    /// Join scored and windowed while the breaker was closed
    JoinAccepted { member: MemberId, score: f64 },
    /// Challenge image sent (first issue or retry)
    ChallengeIssued { member: MemberId, thread: ThreadId, attempts_remaining: u32 },
    /// A reply was graded
    AttemptGraded { member: MemberId, correct: bool, attempts_remaining: u32 },
    /// Terminal admission outcome; emitted once per admission
    Resolved {
        member: MemberId,
        result: AdmissionResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<FailureReason>,
    },
    /// Candidate left before resolution; the session was dropped
    SessionDiscarded { member: MemberId },
    /// Access role granted after verification
    AccessGranted { member: MemberId, tier: AccessTier },
    BreakerTripped { episode: u64, score: f64, victims: usize },
    BreakerReset { episode: u64 },
    /// Raid punishment carried out
    Punished { member: MemberId, removal: Removal, notice: NoticeDelivery },
    /// Provisional member promoted to full access
    Promoted { member: MemberId },
}

/// Write every gate event to the `warden::audit` log target as JSON
pub async fn audit_worker(mut events: broadcast::Receiver<GateEvent>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!(target: "warden::audit", "{json}"),
                    Err(e) => tracing::warn!(error = %e, "Gate event not serializable"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Audit log fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}
