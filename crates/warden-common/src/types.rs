//! Core types shared across Warden components.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake_id!(
    /// Stable identity of a server member
    MemberId
);
snowflake_id!(
    /// Private conversation thread
    ThreadId
);
snowflake_id!(
    /// Access role
    RoleId
);
snowflake_id!(
    /// Text channel that hosts verification threads
    ChannelId
);
snowflake_id!(
    /// A message inside a thread
    MessageId
);

/// Platform trust flags attached to an account (verified developer, partner, staff...).
///
/// Only presence matters to the gate: any set bit discounts the account's score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustFlags(pub u64);

impl TrustFlags {
    pub const NONE: TrustFlags = TrustFlags(0);

    pub fn is_trusted(&self) -> bool {
        self.0 != 0
    }
}

/// A member who has joined but not yet been resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Member identity
    pub id: MemberId,

    /// Display name shown in the server
    pub display_name: String,

    /// When the account was created on the platform
    pub account_created: DateTime<Utc>,

    /// When the member joined the server
    pub joined_at: DateTime<Utc>,

    /// Whether the account has an avatar set
    #[serde(default)]
    pub has_avatar: bool,

    /// Platform trust flags
    #[serde(default)]
    pub trust_flags: TrustFlags,

    /// Automated (bot) account
    #[serde(default)]
    pub is_bot: bool,
}

impl Candidate {
    /// Account age at `now`. Clock skew never yields a negative age.
    pub fn account_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.account_created).max(Duration::zero())
    }
}

/// How a member was removed from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Removal {
    Kicked,
    Banned,
}

/// Terminal (or pending) admission outcome reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "removal", rename_all = "lowercase")]
pub enum AdmissionResult {
    /// Passed the challenge
    Verified,
    /// Removed from the server
    Removed(Removal),
    /// Challenge issued, outcome not yet known
    Pending,
    /// Bot account, not subject to admission control
    Exempt,
}

impl AdmissionResult {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Removed(_))
    }
}

/// Why a challenge session failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    /// Ran out of attempts
    Exhausted,
    /// Deadline elapsed
    Timeout,
    /// Swept up by a raid lockdown
    Lockdown,
    /// The challenge could not be set up
    Unavailable,
}

/// Raid circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum BreakerState {
    /// Normal operation: joins are scored and windowed
    Closed,
    /// Lockdown: every join is punished immediately
    Open {
        /// Identifies this Open episode
        episode: u64,
    },
}

impl BreakerState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::Closed
    }
}

/// Result of a best-effort notice to a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "delivery", content = "reason", rename_all = "lowercase")]
pub enum NoticeDelivery {
    Delivered,
    Undelivered(String),
}

impl NoticeDelivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Access granted after a successful challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    /// Regular member
    Full,
    /// Restricted until the account is old enough
    Provisional,
}
