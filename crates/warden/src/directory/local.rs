//! In-memory membership directory.
//!
//! Keeps members, roles and threads in process and records every action it
//! is asked to perform. Used for dry-run deployments (actions are logged,
//! nobody is actually removed) and as the directory in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use warden_common::{Candidate, ChannelId, MemberId, MessageId, RoleId, ThreadId};

use super::{DirectoryError, DirectoryResult, MemberProfile, MembershipDirectory, OutgoingMessage};

/// Something the directory was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryAction {
    ThreadCreated { thread: ThreadId, member: MemberId },
    ThreadDeleted { thread: ThreadId },
    MessageSent { thread: ThreadId, message: MessageId },
    MessageDeleted { thread: ThreadId, message: MessageId },
    RoleGranted { member: MemberId, role: RoleId },
    RoleRevoked { member: MemberId, role: RoleId },
    Kicked { member: MemberId, reason: String },
    Banned { member: MemberId, reason: String, purge_days: u32 },
    DirectMessaged { member: MemberId, content: String },
}

#[derive(Debug)]
struct LocalMember {
    profile: MemberProfile,
    roles: HashSet<RoleId>,
    present: bool,
}

#[derive(Debug)]
struct LocalThread {
    channel: ChannelId,
    name: String,
    messages: Vec<(MessageId, OutgoingMessage)>,
}

#[derive(Debug, Default)]
struct Inner {
    channels: HashSet<ChannelId>,
    roles: HashSet<RoleId>,
    members: HashMap<MemberId, LocalMember>,
    threads: HashMap<ThreadId, LocalThread>,
    closed_dms: HashSet<MemberId>,
    /// Simulated platform latency when opening a member's thread
    thread_latency: HashMap<MemberId, Duration>,
    actions: Vec<DirectoryAction>,
}

/// Directory kept entirely in memory
#[derive(Debug)]
pub struct LocalDirectory {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl LocalDirectory {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1_000),
        }
    }

    /// Declare a channel as existing
    pub fn with_channel(mut self, channel: ChannelId) -> Self {
        self.inner.get_mut().channels.insert(channel);
        self
    }

    /// Declare a role as existing
    pub fn with_role(mut self, role: RoleId) -> Self {
        self.inner.get_mut().roles.insert(role);
        self
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
impl LocalDirectory {
    /// Add (or re-add) a member to the server
    pub async fn register_member(&self, profile: MemberProfile) {
        let mut inner = self.inner.lock().await;
        let member = inner.members.entry(profile.id).or_insert_with(|| LocalMember {
            profile,
            roles: HashSet::new(),
            present: true,
        });
        member.present = true;
    }

    /// Make direct messages to `member` fail
    pub async fn close_direct_messages(&self, member: MemberId) {
        self.inner.lock().await.closed_dms.insert(member);
    }

    /// Make opening `member`'s thread take `latency`
    pub async fn slow_threads_for(&self, member: MemberId, latency: Duration) {
        self.inner.lock().await.thread_latency.insert(member, latency);
    }

    /// Open a thread without going through the gate (leftovers from a previous run)
    pub async fn open_stale_thread(&self, channel: ChannelId) -> ThreadId {
        let thread = ThreadId(self.allocate());
        self.inner.lock().await.threads.insert(
            thread,
            LocalThread {
                channel,
                name: "leftover".to_string(),
                messages: Vec::new(),
            },
        );
        thread
    }

    pub async fn actions(&self) -> Vec<DirectoryAction> {
        self.inner.lock().await.actions.clone()
    }

    pub async fn kicked(&self) -> Vec<MemberId> {
        self.actions()
            .await
            .into_iter()
            .filter_map(|a| match a {
                DirectoryAction::Kicked { member, .. } => Some(member),
                _ => None,
            })
            .collect()
    }

    pub async fn banned(&self) -> Vec<MemberId> {
        self.actions()
            .await
            .into_iter()
            .filter_map(|a| match a {
                DirectoryAction::Banned { member, .. } => Some(member),
                _ => None,
            })
            .collect()
    }

    pub async fn roles_of(&self, member: MemberId) -> HashSet<RoleId> {
        self.inner
            .lock()
            .await
            .members
            .get(&member)
            .map(|m| m.roles.clone())
            .unwrap_or_default()
    }

    pub async fn thread_exists(&self, thread: ThreadId) -> bool {
        self.inner.lock().await.threads.contains_key(&thread)
    }

    /// Messages currently in `thread`, oldest first
    pub async fn messages_in(&self, thread: ThreadId) -> Vec<OutgoingMessage> {
        self.inner
            .lock()
            .await
            .threads
            .get(&thread)
            .map(|t| t.messages.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for LocalDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn present_member(&mut self, member: MemberId) -> DirectoryResult<&mut LocalMember> {
        self.members
            .get_mut(&member)
            .filter(|m| m.present)
            .ok_or_else(|| DirectoryError::NotFound(format!("member {member}")))
    }

    fn require_role(&self, role: RoleId) -> DirectoryResult<()> {
        if self.roles.contains(&role) {
            Ok(())
        } else {
            Err(DirectoryError::NotFound(format!("role {role}")))
        }
    }
}

impl MembershipDirectory for LocalDirectory {
    async fn channel_exists(&self, channel: ChannelId) -> DirectoryResult<bool> {
        Ok(self.inner.lock().await.channels.contains(&channel))
    }

    async fn role_exists(&self, role: RoleId) -> DirectoryResult<bool> {
        Ok(self.inner.lock().await.roles.contains(&role))
    }

    async fn list_private_threads(&self, channel: ChannelId) -> DirectoryResult<Vec<ThreadId>> {
        let inner = self.inner.lock().await;
        let mut threads: Vec<ThreadId> = inner
            .threads
            .iter()
            .filter(|(_, t)| t.channel == channel)
            .map(|(id, _)| *id)
            .collect();
        threads.sort();
        Ok(threads)
    }

    async fn create_private_thread(&self, channel: ChannelId, candidate: &Candidate) -> DirectoryResult<ThreadId> {
        let latency = self.inner.lock().await.thread_latency.get(&candidate.id).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let thread = ThreadId(self.allocate());
        let mut inner = self.inner.lock().await;
        if !inner.channels.contains(&channel) {
            return Err(DirectoryError::NotFound(format!("channel {channel}")));
        }

        let member = inner.members.entry(candidate.id).or_insert_with(|| LocalMember {
            profile: MemberProfile {
                id: candidate.id,
                account_created: candidate.account_created,
            },
            roles: HashSet::new(),
            present: true,
        });
        member.present = true;

        inner.threads.insert(
            thread,
            LocalThread {
                channel,
                name: candidate.display_name.clone(),
                messages: Vec::new(),
            },
        );
        inner.actions.push(DirectoryAction::ThreadCreated {
            thread,
            member: candidate.id,
        });
        tracing::debug!(thread_id = %thread, member_id = %candidate.id, name = %candidate.display_name, "Thread created");
        Ok(thread)
    }

    async fn delete_thread(&self, thread: ThreadId) -> DirectoryResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(removed) = inner.threads.remove(&thread) else {
            return Err(DirectoryError::NotFound(format!("thread {thread}")));
        };
        inner.actions.push(DirectoryAction::ThreadDeleted { thread });
        tracing::debug!(thread_id = %thread, name = %removed.name, "Thread deleted");
        Ok(())
    }

    async fn send_message(&self, thread: ThreadId, message: OutgoingMessage) -> DirectoryResult<MessageId> {
        let id = MessageId(self.allocate());
        let mut inner = self.inner.lock().await;
        let target = inner
            .threads
            .get_mut(&thread)
            .ok_or_else(|| DirectoryError::NotFound(format!("thread {thread}")))?;
        target.messages.push((id, message));
        inner.actions.push(DirectoryAction::MessageSent { thread, message: id });
        Ok(id)
    }

    async fn delete_message(&self, thread: ThreadId, message: MessageId) -> DirectoryResult<()> {
        let mut inner = self.inner.lock().await;
        let target = inner
            .threads
            .get_mut(&thread)
            .ok_or_else(|| DirectoryError::NotFound(format!("thread {thread}")))?;
        let before = target.messages.len();
        target.messages.retain(|(id, _)| *id != message);
        if target.messages.len() == before {
            return Err(DirectoryError::NotFound(format!("message {message}")));
        }
        inner.actions.push(DirectoryAction::MessageDeleted { thread, message });
        Ok(())
    }

    async fn grant_role(&self, member: MemberId, role: RoleId) -> DirectoryResult<()> {
        let mut inner = self.inner.lock().await;
        inner.require_role(role)?;
        inner.present_member(member)?.roles.insert(role);
        inner.actions.push(DirectoryAction::RoleGranted { member, role });
        tracing::info!(member_id = %member, role_id = %role, "[dry-run] Role granted");
        Ok(())
    }

    async fn revoke_role(&self, member: MemberId, role: RoleId) -> DirectoryResult<()> {
        let mut inner = self.inner.lock().await;
        inner.require_role(role)?;
        inner.present_member(member)?.roles.remove(&role);
        inner.actions.push(DirectoryAction::RoleRevoked { member, role });
        tracing::info!(member_id = %member, role_id = %role, "[dry-run] Role revoked");
        Ok(())
    }

    async fn role_members(&self, role: RoleId) -> DirectoryResult<Vec<MemberProfile>> {
        let inner = self.inner.lock().await;
        inner.require_role(role)?;
        let mut holders: Vec<MemberProfile> = inner
            .members
            .values()
            .filter(|m| m.present && m.roles.contains(&role))
            .map(|m| m.profile)
            .collect();
        holders.sort_by_key(|p| p.id);
        Ok(holders)
    }

    async fn kick(&self, member: MemberId, reason: &str) -> DirectoryResult<()> {
        let mut inner = self.inner.lock().await;
        // Joins are not reported here, so an unseen member is taken as present
        if inner.members.contains_key(&member) {
            let target = inner.present_member(member)?;
            target.present = false;
            target.roles.clear();
        }
        inner.actions.push(DirectoryAction::Kicked {
            member,
            reason: reason.to_string(),
        });
        tracing::info!(member_id = %member, reason = %reason, "[dry-run] Member kicked");
        Ok(())
    }

    async fn ban(&self, member: MemberId, reason: &str, purge_days: u32) -> DirectoryResult<()> {
        let mut inner = self.inner.lock().await;
        // Bans apply to members who already left, too
        if let Some(target) = inner.members.get_mut(&member) {
            target.present = false;
            target.roles.clear();
        }
        inner.actions.push(DirectoryAction::Banned {
            member,
            reason: reason.to_string(),
            purge_days,
        });
        tracing::info!(member_id = %member, reason = %reason, purge_days, "[dry-run] Member banned");
        Ok(())
    }

    async fn direct_message(&self, member: MemberId, content: &str) -> DirectoryResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.closed_dms.contains(&member) {
            return Err(DirectoryError::Forbidden(format!("member {member} does not accept direct messages")));
        }
        inner.actions.push(DirectoryAction::DirectMessaged {
            member,
            content: content.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_kick_removes_roles_and_presence() {
        let directory = LocalDirectory::new().with_role(RoleId(5));
        directory
            .register_member(MemberProfile {
                id: MemberId(1),
                account_created: Utc::now(),
            })
            .await;

        directory.grant_role(MemberId(1), RoleId(5)).await.unwrap();
        assert_eq!(directory.role_members(RoleId(5)).await.unwrap().len(), 1);

        directory.kick(MemberId(1), "test").await.unwrap();
        assert!(directory.roles_of(MemberId(1)).await.is_empty());
        assert_eq!(
            directory.kick(MemberId(1), "again").await,
            Err(DirectoryError::NotFound("member 1".into()))
        );
        assert_eq!(directory.kicked().await, vec![MemberId(1)]);
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let directory = LocalDirectory::new();
        assert!(directory.grant_role(MemberId(1), RoleId(9)).await.is_err());
        assert!(!directory.role_exists(RoleId(9)).await.unwrap());
    }

    #[tokio::test]
    async fn test_thread_messages() {
        let directory = LocalDirectory::new().with_channel(ChannelId(1));
        let thread = directory.open_stale_thread(ChannelId(1)).await;

        let first = directory.send_message(thread, OutgoingMessage::text("one")).await.unwrap();
        directory.send_message(thread, OutgoingMessage::text("two")).await.unwrap();
        directory.delete_message(thread, first).await.unwrap();

        let remaining = directory.messages_in(thread).await;
        assert_eq!(remaining, vec![OutgoingMessage::text("two")]);
        assert_eq!(directory.list_private_threads(ChannelId(1)).await.unwrap(), vec![thread]);

        directory.delete_thread(thread).await.unwrap();
        assert!(!directory.thread_exists(thread).await);
    }
}
