//! Host event ingress.
//!
//! The chat platform bridge forwards member joins, departures and thread
//! replies here; each one is handed to the admission gate.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use warden_common::{AdmissionResult, Candidate, MemberId, MessageId, ThreadId, WardenError};

use crate::directory::MembershipDirectory;
use crate::gate::Reply;
use crate::state::AppState;

#[derive(Serialize)]
pub struct JoinResponse {
    member: MemberId,
    result: AdmissionResult,
}

/// A member joined the server
pub async fn member_joined<D: MembershipDirectory>(
    State(state): State<AppState<D>>,
    Json(candidate): Json<Candidate>,
) -> Result<Json<JoinResponse>, StatusCode> {
    validate_candidate(&candidate).map_err(reject)?;

    let member = candidate.id;
    let result = state.gate.on_member_joined(candidate).await;
    Ok(Json(JoinResponse { member, result }))
}

#[derive(Deserialize)]
pub struct LeftRequest {
    member: MemberId,
}

/// A member left the server
pub async fn member_left<D: MembershipDirectory>(
    State(state): State<AppState<D>>,
    Json(payload): Json<LeftRequest>,
) -> StatusCode {
    state.gate.on_member_left(payload.member).await;
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
pub struct ReplyRequest {
    thread: ThreadId,
    author: MemberId,
    content: String,
    /// The reply's own message id
    message: Option<MessageId>,
}

/// A message was posted in a thread
pub async fn reply<D: MembershipDirectory>(
    State(state): State<AppState<D>>,
    Json(payload): Json<ReplyRequest>,
) -> StatusCode {
    state
        .gate
        .on_reply(Reply {
            thread: payload.thread,
            author: payload.author,
            content: payload.content,
            message: payload.message,
        })
        .await;
    StatusCode::ACCEPTED
}

fn validate_candidate(candidate: &Candidate) -> Result<(), WardenError> {
    if candidate.id.get() == 0 {
        return Err(WardenError::InvalidInput("member id must be set".into()));
    }
    if candidate.account_created > candidate.joined_at {
        return Err(WardenError::InvalidInput(
            "account_created is after joined_at".into(),
        ));
    }
    Ok(())
}

fn reject(err: WardenError) -> StatusCode {
    tracing::debug!(error = %err, "Rejected ingress event");
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
