//! Two-tier access: role grant on verification and the regularization sweep.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use warden_common::{AccessTier, Candidate, MemberId};

use super::{AdmissionGate, GateEvent};
use crate::directory::MembershipDirectory;

impl<D: MembershipDirectory> AdmissionGate<D> {
    /// Grant the tier matching the candidate's account age
    pub(super) async fn grant_access(&self, candidate: &Candidate) -> Option<AccessTier> {
        let guild = &self.config.guild;
        let tier = if candidate.account_age(Utc::now()) < self.config.access.provisional_age() {
            AccessTier::Provisional
        } else {
            AccessTier::Full
        };
        let role = match tier {
            AccessTier::Full => guild.full_role,
            AccessTier::Provisional => guild.provisional_role,
        };

        match self.directory.grant_role(candidate.id, role).await {
            Ok(()) => {
                info!(member_id = %candidate.id, tier = ?tier, "Access granted");
                self.emit(GateEvent::AccessGranted {
                    member: candidate.id,
                    tier,
                });
                Some(tier)
            }
            Err(e) => {
                error!(member_id = %candidate.id, role_id = %role, error = %e, "Failed to grant access role");
                None
            }
        }
    }

    /// Promote every provisional member whose account has come of age.
    /// Returns how many were promoted.
    pub async fn regularize(&self) -> usize {
        let guild = &self.config.guild;
        let holders = match self.directory.role_members(guild.provisional_role).await {
            Ok(holders) => holders,
            Err(e) => {
                warn!(error = %e, "Regularization sweep could not list provisional members");
                return 0;
            }
        };

        let now = Utc::now();
        let threshold = self.config.access.provisional_age();
        let due: Vec<MemberId> = holders
            .into_iter()
            .filter(|p| now.signed_duration_since(p.account_created) >= threshold)
            .map(|p| p.id)
            .collect();
        if due.is_empty() {
            return 0;
        }

        let promoted = stream::iter(due)
            .map(|member| self.promote(member))
            .buffer_unordered(self.config.access.sweep_fan_out)
            .filter(|ok| std::future::ready(*ok))
            .count()
            .await;

        info!(promoted, "Regularization sweep finished");
        promoted
    }

    /// Full role first, so a failure half way never leaves the member with neither
    async fn promote(&self, member: MemberId) -> bool {
        let guild = &self.config.guild;

        if let Err(e) = self.directory.grant_role(member, guild.full_role).await {
            warn!(member_id = %member, error = %e, "Promotion failed, will retry next sweep");
            return false;
        }
        if let Err(e) = self.directory.revoke_role(member, guild.provisional_role).await {
            warn!(member_id = %member, error = %e, "Provisional role not revoked");
        }

        debug!(member_id = %member, "Provisional member promoted");
        self.counters.promoted.fetch_add(1, Ordering::Relaxed);
        self.emit(GateEvent::Promoted { member });
        true
    }
}

/// Background worker running the regularization sweep
pub async fn regularization_worker<D: MembershipDirectory>(
    gate: Arc<AdmissionGate<D>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(gate.config.access.sweep_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(
        "🔁 Regularization worker started (interval: {:?})",
        gate.config.access.sweep_interval()
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                gate.regularize().await;
            }
            _ = shutdown.recv() => {
                info!("🔁 Regularization worker shutting down...");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::directory::MemberProfile;
    use crate::gate::Reply;
    use crate::gate::testing::*;
    use chrono::Duration as ChronoDuration;
    use warden_common::RoleId;

    const FULL: RoleId = RoleId(200);
    const PROVISIONAL: RoleId = RoleId(201);

    async fn verify(gate: &Arc<TestGate>, candidate: Candidate) {
        let member = candidate.id;
        gate.on_member_joined(candidate).await;
        let thread = gate.sessions.lock().await.get(member).unwrap().thread;
        gate.on_reply(Reply {
            thread,
            author: member,
            content: "AB23CD".to_string(),
            message: None,
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_young_account_gets_provisional_role() {
        let directory = directory();
        let gate = gate_with(test_config(), directory.clone(), &["AB23CD"]);
        let mut rx = gate.subscribe();

        verify(&gate, member(1, ChronoDuration::days(2))).await;
        verify(&gate, member(2, ChronoDuration::days(30))).await;

        assert_eq!(directory.roles_of(MemberId(1)).await.into_iter().collect::<Vec<_>>(), vec![PROVISIONAL]);
        assert_eq!(directory.roles_of(MemberId(2)).await.into_iter().collect::<Vec<_>>(), vec![FULL]);

        let events = drain(&mut rx);
        assert!(events.contains(&GateEvent::AccessGranted {
            member: MemberId(1),
            tier: AccessTier::Provisional,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_promotes_only_aged_accounts() {
        let directory = directory();
        let gate = gate_with(test_config(), directory.clone(), &["AB23CD"]);
        let now = Utc::now();

        for (id, age_days) in [(1, 8), (2, 3), (3, 10)] {
            directory
                .register_member(MemberProfile {
                    id: MemberId(id),
                    account_created: now - ChronoDuration::days(age_days),
                })
                .await;
            directory.grant_role(MemberId(id), PROVISIONAL).await.unwrap();
        }

        assert_eq!(gate.regularize().await, 2);

        for id in [1, 3] {
            let roles = directory.roles_of(MemberId(id)).await;
            assert!(roles.contains(&FULL));
            assert!(!roles.contains(&PROVISIONAL));
        }
        let young = directory.roles_of(MemberId(2)).await;
        assert!(young.contains(&PROVISIONAL));
        assert!(!young.contains(&FULL));

        // Nothing left to do on the next pass
        assert_eq!(gate.regularize().await, 0);
        assert_eq!(gate.get_stats().await.promoted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_never_touches_full_members() {
        let directory = directory();
        let gate = gate_with(test_config(), directory.clone(), &["AB23CD"]);

        directory
            .register_member(MemberProfile {
                id: MemberId(1),
                account_created: Utc::now() - ChronoDuration::days(1),
            })
            .await;
        directory.grant_role(MemberId(1), FULL).await.unwrap();

        assert_eq!(gate.regularize().await, 0);
        let roles = directory.roles_of(MemberId(1)).await;
        assert!(roles.contains(&FULL));
        assert!(!roles.contains(&PROVISIONAL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_survives_departed_members() {
        let directory = directory();
        let gate = gate_with(test_config(), directory.clone(), &["AB23CD"]);

        directory
            .register_member(MemberProfile {
                id: MemberId(1),
                account_created: Utc::now() - ChronoDuration::days(30),
            })
            .await;
        directory.grant_role(MemberId(1), PROVISIONAL).await.unwrap();
        directory.kick(MemberId(1), "left").await.unwrap();

        assert_eq!(gate.regularize().await, 0);
    }
}
