//! Challenge generation.
//!
//! A challenge is an opaque PNG plus the answer a human reads out of it.
//! Generation is pluggable through [`ChallengeSource`]; the service renders
//! stroke CAPTCHAs and keeps a pool of them ready.

mod generator;
mod glyphs;
mod pool;

pub use generator::StrokeCaptcha;
pub use pool::{ChallengePool, PoolStatsSnapshot, pool_worker};

use chrono::{DateTime, Utc};
use std::fmt;
use warden_common::WardenError;

/// Attachment name used when a challenge image is sent
pub const IMAGE_FILENAME: &str = "challenge.png";

/// A rendered challenge
#[derive(Clone)]
pub struct Challenge {
    /// Expected reply, compared exactly
    pub answer: String,
    /// PNG-encoded image
    pub image: Vec<u8>,
    /// When the image was rendered
    pub generated_at: DateTime<Utc>,
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("image_bytes", &self.image.len())
            .field("generated_at", &self.generated_at)
            .finish_non_exhaustive()
    }
}

/// Produces fresh challenges. Stateless from the caller's point of view.
pub trait ChallengeSource: Send + Sync {
    fn generate(&self) -> Result<Challenge, WardenError>;
}
