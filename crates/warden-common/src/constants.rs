//! Default admission policy values.
//!
//! Every value here is only a default; the service reads the effective
//! policy from its configuration file.

/// Default Warden HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Seconds in one hour
pub const HOUR_SECS: i64 = 3600;

/// Seconds in one day
pub const DAY_SECS: i64 = 86_400;

/// Admission scoring defaults
pub mod scoring {
    /// Weight every candidate starts with
    pub const BASE_WEIGHT: f64 = 1.0;

    /// Display name made only of letters and whitespace
    pub const BOT_NAME_MULTIPLIER: f64 = 3.0;

    /// Account younger than one hour
    pub const UNDER_HOUR_MULTIPLIER: f64 = 3.0;

    /// Account younger than one day (and at least one hour old)
    pub const UNDER_DAY_MULTIPLIER: f64 = 2.0;

    /// Account carrying any platform trust flag
    pub const TRUSTED_MULTIPLIER: f64 = 0.1;

    /// Account without an avatar
    pub const NO_AVATAR_MULTIPLIER: f64 = 2.0;
}

/// Raid circuit breaker defaults
pub mod breaker {
    /// Sliding window length (seconds)
    pub const WINDOW_SECS: u64 = 60;

    /// Aggregation tick period (milliseconds)
    pub const TICK_MILLIS: u64 = 1000;

    /// Cumulative window score that trips the breaker
    pub const TRIP_THRESHOLD: f64 = 50.0;

    /// Open-state cooldown before returning to Closed (seconds)
    pub const COOLDOWN_SECS: u64 = 60;

    /// Concurrent punishments per batch
    pub const PUNISH_BATCH_SIZE: usize = 3;

    /// Punishments within one Open episode at which a kick becomes a ban
    pub const BAN_THRESHOLD: u32 = 2;

    /// Days of recent messages purged with a ban
    pub const BAN_PURGE_DAYS: u32 = 3;
}

/// Challenge session defaults
pub mod challenge {
    /// Wrong answers allowed before removal
    pub const MAX_ATTEMPTS: u32 = 5;

    /// Session deadline, fixed at issue time (seconds)
    pub const DEADLINE_SECS: u64 = 3600;

    /// Delay before a verified thread is deleted (seconds)
    pub const THREAD_GRACE_SECS: u64 = 60;

    /// Length of the expected answer
    pub const ANSWER_LENGTH: usize = 6;

    /// Rendered challenge width in pixels
    pub const IMAGE_WIDTH: u32 = 360;

    /// Rendered challenge height in pixels
    pub const IMAGE_HEIGHT: u32 = 120;

    /// Pre-rendered challenges kept in memory
    pub const POOL_CAPACITY: usize = 64;
}

/// Two-tier access defaults
pub mod access {
    /// Accounts younger than this receive the provisional role (seconds)
    pub const PROVISIONAL_AGE_SECS: i64 = 7 * super::DAY_SECS;

    /// Regularization sweep period (seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 600;

    /// Concurrent promotions per sweep
    pub const SWEEP_FAN_OUT: usize = 3;
}
