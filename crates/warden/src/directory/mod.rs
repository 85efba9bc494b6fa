//! Membership directory capability.
//!
//! The gate never speaks the chat platform's protocol itself. Everything it
//! does to the outside world goes through [`MembershipDirectory`]; a platform
//! bridge implements it for production and [`LocalDirectory`] implements it
//! in memory for dry runs and tests.

mod local;

pub use local::LocalDirectory;
#[cfg(test)]
pub use local::DirectoryAction;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;
use warden_common::{
    Candidate, ChannelId, MemberId, MessageId, NoticeDelivery, RoleId, ThreadId, WardenError,
};

/// Errors returned by a membership directory
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl From<DirectoryError> for WardenError {
    fn from(e: DirectoryError) -> Self {
        WardenError::Directory(e.to_string())
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// File attached to a message
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Message posted into a thread
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub content: String,
    pub attachment: Option<Attachment>,
    /// Message this one replies to
    pub reply_to: Option<MessageId>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, filename: &str, bytes: Vec<u8>) -> Self {
        self.attachment = Some(Attachment {
            filename: filename.to_string(),
            bytes,
        });
        self
    }

    pub fn replying_to(mut self, message: MessageId) -> Self {
        self.reply_to = Some(message);
        self
    }
}

/// What the regularization sweep needs to know about a role holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: MemberId,
    pub account_created: DateTime<Utc>,
}

/// Operations the admission gate performs against the chat server
pub trait MembershipDirectory: Send + Sync + 'static {
    fn channel_exists(&self, channel: ChannelId) -> impl Future<Output = DirectoryResult<bool>> + Send;

    fn role_exists(&self, role: RoleId) -> impl Future<Output = DirectoryResult<bool>> + Send;

    /// Private threads currently open under `channel`
    fn list_private_threads(
        &self,
        channel: ChannelId,
    ) -> impl Future<Output = DirectoryResult<Vec<ThreadId>>> + Send;

    /// Open a private, non-invitable thread for `candidate`, named after their display name
    fn create_private_thread(
        &self,
        channel: ChannelId,
        candidate: &Candidate,
    ) -> impl Future<Output = DirectoryResult<ThreadId>> + Send;

    fn delete_thread(&self, thread: ThreadId) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn send_message(
        &self,
        thread: ThreadId,
        message: OutgoingMessage,
    ) -> impl Future<Output = DirectoryResult<MessageId>> + Send;

    fn delete_message(
        &self,
        thread: ThreadId,
        message: MessageId,
    ) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn grant_role(&self, member: MemberId, role: RoleId) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn revoke_role(&self, member: MemberId, role: RoleId) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn role_members(&self, role: RoleId) -> impl Future<Output = DirectoryResult<Vec<MemberProfile>>> + Send;

    fn kick(&self, member: MemberId, reason: &str) -> impl Future<Output = DirectoryResult<()>> + Send;

    /// Ban and purge the member's messages from the last `purge_days` days
    fn ban(
        &self,
        member: MemberId,
        reason: &str,
        purge_days: u32,
    ) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn direct_message(&self, member: MemberId, content: &str) -> impl Future<Output = DirectoryResult<()>> + Send;
}

/// Best-effort direct message. Failure is reported, never propagated.
pub async fn notify<D: MembershipDirectory>(directory: &D, member: MemberId, content: &str) -> NoticeDelivery {
    match directory.direct_message(member, content).await {
        Ok(()) => NoticeDelivery::Delivered,
        Err(e) => {
            tracing::debug!(member_id = %member, error = %e, "Notice not delivered");
            NoticeDelivery::Undelivered(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_reports_undelivered() {
        let directory = LocalDirectory::new();
        directory.close_direct_messages(MemberId(3)).await;

        let delivery = notify(&directory, MemberId(3), "hello").await;
        assert!(matches!(delivery, NoticeDelivery::Undelivered(_)));

        let delivery = notify(&directory, MemberId(4), "hello").await;
        assert_eq!(delivery, NoticeDelivery::Delivered);
    }

    #[test]
    fn test_directory_error_maps_to_warden_error() {
        let err: WardenError = DirectoryError::Forbidden("missing permission".into()).into();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Directory error: forbidden: missing permission");
    }
}
