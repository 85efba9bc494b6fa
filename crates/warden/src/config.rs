//! Configuration management for Warden.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use warden_common::constants::{self, DEFAULT_LISTEN_ADDR};
use warden_common::{ChannelId, RoleId, WardenError};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server channels and roles the gate works with
    #[serde(default)]
    pub guild: GuildConfig,

    /// Join scoring policy
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Raid circuit breaker policy
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Challenge session policy
    #[serde(default)]
    pub challenge: ChallengeConfig,

    /// Two-tier access policy
    #[serde(default)]
    pub access: AccessConfig,
}

/// Server-specific identifiers
#[derive(Debug, Clone, Deserialize)]
pub struct GuildConfig {
    /// Server name used in notices
    #[serde(default = "default_guild_name")]
    pub name: String,

    /// Channel whose private threads host challenges
    #[serde(default)]
    pub welcome_channel: ChannelId,

    /// Role granted to verified members
    #[serde(default)]
    pub full_role: RoleId,

    /// Role granted to verified members with young accounts
    #[serde(default)]
    pub provisional_role: RoleId,

    /// Who banned members should contact
    #[serde(default = "default_contact")]
    pub contact: String,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            name: default_guild_name(),
            welcome_channel: ChannelId(0),
            full_role: RoleId(0),
            provisional_role: RoleId(0),
            contact: default_contact(),
        }
    }
}

/// Scoring multipliers
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_base_weight")]
    pub base_weight: f64,
    #[serde(default = "default_bot_name_multiplier")]
    pub bot_name_multiplier: f64,
    #[serde(default = "default_under_hour_multiplier")]
    pub under_hour_multiplier: f64,
    #[serde(default = "default_under_day_multiplier")]
    pub under_day_multiplier: f64,
    #[serde(default = "default_trusted_multiplier")]
    pub trusted_multiplier: f64,
    #[serde(default = "default_no_avatar_multiplier")]
    pub no_avatar_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_weight: default_base_weight(),
            bot_name_multiplier: default_bot_name_multiplier(),
            under_hour_multiplier: default_under_hour_multiplier(),
            under_day_multiplier: default_under_day_multiplier(),
            trusted_multiplier: default_trusted_multiplier(),
            no_avatar_multiplier: default_no_avatar_multiplier(),
        }
    }
}

/// Raid circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    /// Sliding window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Aggregation tick period in milliseconds
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    /// Cumulative score that trips the breaker
    #[serde(default = "default_trip_threshold")]
    pub trip_threshold: f64,

    /// Open-state cooldown in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Punishments issued concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Punishment count (within one episode) that turns a kick into a ban
    #[serde(default = "default_ban_threshold")]
    pub ban_threshold: u32,

    /// Days of messages purged with a ban
    #[serde(default = "default_purge_days")]
    pub purge_days: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            tick_millis: default_tick_millis(),
            trip_threshold: default_trip_threshold(),
            cooldown_secs: default_cooldown_secs(),
            batch_size: default_batch_size(),
            ban_threshold: default_ban_threshold(),
            purge_days: default_purge_days(),
        }
    }
}

impl BreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Challenge session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeConfig {
    /// Wrong answers allowed before removal
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Session deadline in seconds
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Delay before a verified thread is deleted
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Expected answer length
    #[serde(default = "default_answer_length")]
    pub answer_length: usize,

    /// Image width in pixels
    #[serde(default = "default_image_width")]
    pub image_width: u32,

    /// Image height in pixels
    #[serde(default = "default_image_height")]
    pub image_height: u32,

    /// Pre-rendered challenges kept ready (0 disables the pool)
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            deadline_secs: default_deadline_secs(),
            grace_secs: default_grace_secs(),
            answer_length: default_answer_length(),
            image_width: default_image_width(),
            image_height: default_image_height(),
            pool_capacity: default_pool_capacity(),
        }
    }
}

impl ChallengeConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Provisional access configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// Accounts younger than this (seconds) get the provisional role
    #[serde(default = "default_provisional_age")]
    pub provisional_age_secs: i64,

    /// Regularization sweep period in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Concurrent promotions per sweep
    #[serde(default = "default_sweep_fan_out")]
    pub sweep_fan_out: usize,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            provisional_age_secs: default_provisional_age(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_fan_out: default_sweep_fan_out(),
        }
    }
}

impl AccessConfig {
    pub fn provisional_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.provisional_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_guild_name() -> String { "the server".to_string() }
fn default_contact() -> String { "a server moderator".to_string() }
fn default_base_weight() -> f64 { constants::scoring::BASE_WEIGHT }
fn default_bot_name_multiplier() -> f64 { constants::scoring::BOT_NAME_MULTIPLIER }
fn default_under_hour_multiplier() -> f64 { constants::scoring::UNDER_HOUR_MULTIPLIER }
fn default_under_day_multiplier() -> f64 { constants::scoring::UNDER_DAY_MULTIPLIER }
fn default_trusted_multiplier() -> f64 { constants::scoring::TRUSTED_MULTIPLIER }
fn default_no_avatar_multiplier() -> f64 { constants::scoring::NO_AVATAR_MULTIPLIER }
fn default_window_secs() -> u64 { constants::breaker::WINDOW_SECS }
fn default_tick_millis() -> u64 { constants::breaker::TICK_MILLIS }
fn default_trip_threshold() -> f64 { constants::breaker::TRIP_THRESHOLD }
fn default_cooldown_secs() -> u64 { constants::breaker::COOLDOWN_SECS }
fn default_batch_size() -> usize { constants::breaker::PUNISH_BATCH_SIZE }
fn default_ban_threshold() -> u32 { constants::breaker::BAN_THRESHOLD }
fn default_purge_days() -> u32 { constants::breaker::BAN_PURGE_DAYS }
fn default_max_attempts() -> u32 { constants::challenge::MAX_ATTEMPTS }
fn default_deadline_secs() -> u64 { constants::challenge::DEADLINE_SECS }
fn default_grace_secs() -> u64 { constants::challenge::THREAD_GRACE_SECS }
fn default_answer_length() -> usize { constants::challenge::ANSWER_LENGTH }
fn default_image_width() -> u32 { constants::challenge::IMAGE_WIDTH }
fn default_image_height() -> u32 { constants::challenge::IMAGE_HEIGHT }
fn default_pool_capacity() -> usize { constants::challenge::POOL_CAPACITY }
fn default_provisional_age() -> i64 { constants::access::PROVISIONAL_AGE_SECS }
fn default_sweep_interval() -> u64 { constants::access::SWEEP_INTERVAL_SECS }
fn default_sweep_fan_out() -> usize { constants::access::SWEEP_FAN_OUT }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .add_source(config::Environment::with_prefix("WARDEN").separator("__"))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the gate cannot run with
    pub fn validate(&self) -> Result<(), WardenError> {
        let g = &self.guild;
        if g.welcome_channel.get() == 0 {
            return Err(WardenError::Config("guild.welcome_channel is not set".into()));
        }
        if g.full_role.get() == 0 || g.provisional_role.get() == 0 {
            return Err(WardenError::Config(
                "guild.full_role and guild.provisional_role must both be set".into(),
            ));
        }
        if g.full_role == g.provisional_role {
            return Err(WardenError::Config(
                "guild.full_role and guild.provisional_role must differ".into(),
            ));
        }

        let b = &self.breaker;
        if b.window_secs == 0 || b.tick_millis == 0 || b.batch_size == 0 || b.ban_threshold == 0 {
            return Err(WardenError::Config(
                "breaker window, tick, batch size and ban threshold must be positive".into(),
            ));
        }
        if b.trip_threshold <= 0.0 {
            return Err(WardenError::Config("breaker.trip_threshold must be positive".into()));
        }

        let c = &self.challenge;
        if c.max_attempts == 0 || c.deadline_secs == 0 || c.answer_length == 0 {
            return Err(WardenError::Config(
                "challenge attempts, deadline and answer length must be positive".into(),
            ));
        }

        let s = &self.scoring;
        let multipliers = [
            s.base_weight,
            s.bot_name_multiplier,
            s.under_hour_multiplier,
            s.under_day_multiplier,
            s.trusted_multiplier,
            s.no_avatar_multiplier,
        ];
        if multipliers.iter().any(|m| *m <= 0.0) {
            return Err(WardenError::Config("scoring multipliers must be positive".into()));
        }

        if self.access.sweep_interval_secs == 0 || self.access.sweep_fan_out == 0 {
            return Err(WardenError::Config(
                "access sweep interval and fan-out must be positive".into(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            guild: GuildConfig::default(),
            scoring: ScoringConfig::default(),
            breaker: BreakerConfig::default(),
            challenge: ChallengeConfig::default(),
            access: AccessConfig::default(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        guild: GuildConfig {
            name: "Test Server".to_string(),
            welcome_channel: ChannelId(100),
            full_role: RoleId(200),
            provisional_role: RoleId(201),
            contact: "mods@example.org".to_string(),
        },
        challenge: ChallengeConfig {
            pool_capacity: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let config = AppConfig::default();
        assert_eq!(config.breaker.window(), Duration::from_secs(60));
        assert_eq!(config.breaker.trip_threshold, 50.0);
        assert_eq!(config.breaker.batch_size, 3);
        assert_eq!(config.breaker.ban_threshold, 2);
        assert_eq!(config.challenge.max_attempts, 5);
        assert_eq!(config.challenge.deadline(), Duration::from_secs(3600));
        assert_eq!(config.challenge.answer_length, 6);
    }

    #[test]
    fn test_unset_ids_are_rejected() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(matches!(err, WardenError::Config(_)));
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_same_roles_rejected() {
        let mut config = test_config();
        config.guild.provisional_role = config.guild.full_role;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [guild]
                welcome_channel = 10
                full_role = 11
                provisional_role = 12

                [breaker]
                trip_threshold = 80.0
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();
        assert_eq!(config.guild.full_role, RoleId(11));
        assert_eq!(config.breaker.trip_threshold, 80.0);
        assert_eq!(config.breaker.cooldown_secs, 60);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert!(config.validate().is_ok());
    }
}
