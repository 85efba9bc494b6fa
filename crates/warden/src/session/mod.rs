//! Challenge sessions.
//!
//! One live session per candidate. A session grades replies, counts down
//! attempts and carries a resolution marker that can be set exactly once,
//! which is what keeps a late reply and an expiring deadline from both
//! resolving the same candidate.

mod state;
mod table;

pub use state::{ChallengeSession, Grade, Resolution};
pub use table::{Opening, SessionTable};
