//! Raid response: breaker ticks, lockdown punishments and cooldown.

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use warden_common::{AdmissionResult, Candidate, FailureReason, MemberId, Removal};

use super::{AdmissionGate, GateEvent, notices};
use crate::breaker::{TickOutcome, Trip};
use crate::directory::{MembershipDirectory, notify};
use crate::session::Resolution;

/// What a trip did
#[derive(Debug, Clone)]
pub struct TripReport {
    pub episode: u64,
    pub score: f64,
    pub punished: Vec<(MemberId, Removal)>,
}

impl<D: MembershipDirectory> AdmissionGate<D> {
    /// One aggregation pass over the admission window
    pub async fn tick(self: &Arc<Self>) -> Option<TripReport> {
        let outcome = self.breaker.lock().await.tick(Instant::now());

        match outcome {
            TickOutcome::Idle => None,
            TickOutcome::Scored { score, live } => {
                if live > 0 {
                    debug!(score, live, "Admission window scored");
                }
                None
            }
            TickOutcome::Tripped(trip) => Some(self.on_trip(trip).await),
        }
    }

    async fn on_trip(self: &Arc<Self>, trip: Trip) -> TripReport {
        let Trip {
            episode,
            score,
            victims,
        } = trip;
        let cooldown = self.config.breaker.cooldown();

        warn!(
            episode,
            score,
            victims = victims.len(),
            cooldown_secs = cooldown.as_secs(),
            "🚨 Raid detected, lockdown engaged"
        );
        self.counters.trips.fetch_add(1, Ordering::Relaxed);
        self.emit(GateEvent::BreakerTripped {
            episode,
            score,
            victims: victims.len(),
        });

        let gate = self.clone();
        self.cooldowns
            .schedule(episode, cooldown, async move {
                gate.reset_breaker(episode).await;
            })
            .await;

        // Bounded concurrency against the directory's rate limits
        let mut punished = Vec::with_capacity(victims.len());
        for batch in victims.chunks(self.config.breaker.batch_size) {
            let results = join_all(batch.iter().map(|victim| self.punish_victim(victim))).await;
            punished.extend(results);
        }

        TripReport {
            episode,
            score,
            punished,
        }
    }

    /// Remove a member who was in the window when the breaker tripped
    async fn punish_victim(&self, victim: &Candidate) -> (MemberId, Removal) {
        let member = victim.id;
        let removal = self.breaker.lock().await.punishment_for(member);

        // A pending challenge ends here, as does one still being opened;
        // one that already resolved stands
        let (resolved_pending, opening_withdrawn) = {
            let mut sessions = self.sessions.lock().await;
            let won = match sessions.get(member).map(|s| s.id) {
                Some(id) => sessions
                    .get_current(member, id)
                    .is_some_and(|s| s.resolve(Resolution::Failed(FailureReason::Lockdown))),
                None => false,
            };
            let session = if won { sessions.remove(member) } else { None };
            (session, sessions.remove_opening(member, removal))
        };
        if let Some(session) = &resolved_pending {
            self.deadlines.cancel(&member).await;
            self.delete_thread(session.thread).await;
        }

        self.punish(member, removal).await;
        if resolved_pending.is_some() || opening_withdrawn {
            self.emit(GateEvent::Resolved {
                member,
                result: AdmissionResult::Removed(removal),
                reason: Some(FailureReason::Lockdown),
            });
        }
        (member, removal)
    }

    /// Notify, then kick or ban. Failures are logged; the gate carries on.
    pub(super) async fn punish(&self, member: MemberId, removal: Removal) {
        let guild = &self.config.guild;
        let notice = match removal {
            Removal::Kicked => notices::lockdown_kick(&guild.name),
            Removal::Banned => notices::lockdown_ban(&guild.name, &guild.contact),
        };
        let delivery = notify(self.directory.as_ref(), member, &notice).await;

        let result = match removal {
            Removal::Kicked => {
                self.counters.kicked.fetch_add(1, Ordering::Relaxed);
                self.directory.kick(member, notices::REASON_LOCKDOWN).await
            }
            Removal::Banned => {
                self.counters.banned.fetch_add(1, Ordering::Relaxed);
                self.directory
                    .ban(member, notices::REASON_LOCKDOWN_BAN, self.config.breaker.purge_days)
                    .await
            }
        };
        let notice_delivered = delivery.is_delivered();
        match result {
            Ok(()) => warn!(member_id = %member, removal = ?removal, notice_delivered, "⛔ Lockdown punishment"),
            Err(e) => error!(
                member_id = %member,
                removal = ?removal,
                notice_delivered,
                error = %e,
                "Lockdown punishment failed"
            ),
        }

        self.emit(GateEvent::Punished {
            member,
            removal,
            notice: delivery,
        });
    }

    /// Cooldown timer for `episode` fired
    async fn reset_breaker(&self, episode: u64) {
        if self.breaker.lock().await.reset(episode) {
            info!(episode, "🟢 Lockdown lifted, admissions reopened");
            self.emit(GateEvent::BreakerReset { episode });
        }
    }
}

/// Background worker driving the breaker at its tick interval
pub async fn breaker_worker<D: MembershipDirectory>(
    gate: Arc<AdmissionGate<D>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(gate.config.breaker.tick());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("🛡️ Breaker worker started (tick: {:?})", gate.config.breaker.tick());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // A trip punishes in the background so ticks keep their cadence
                let gate = gate.clone();
                tokio::spawn(async move {
                    if let Some(report) = gate.tick().await {
                        info!(
                            episode = report.episode,
                            punished = report.punished.len(),
                            "Lockdown sweep finished"
                        );
                    }
                });
            }
            _ = shutdown.recv() => {
                info!("🛡️ Breaker worker shutting down...");
                break;
            }
        }
    }
}
