//! Application state and shared resources.

use std::sync::Arc;
use std::time::Instant;

use crate::directory::MembershipDirectory;
use crate::gate::AdmissionGate;

/// Shared application state
pub struct AppState<D: MembershipDirectory> {
    /// The admission gate all ingress events feed
    pub gate: Arc<AdmissionGate<D>>,

    /// Process start, for uptime reporting
    pub started_at: Instant,
}

// Manual impl: a derive would require `D: Clone`
impl<D: MembershipDirectory> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            started_at: self.started_at,
        }
    }
}

impl<D: MembershipDirectory> AppState<D> {
    pub fn new(gate: Arc<AdmissionGate<D>>) -> Self {
        Self {
            gate,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
