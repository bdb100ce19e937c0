use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ACCURATE_PLACEMENT_BASE: u64 = 100;
pub const QUICK_PLACEMENT_MS: u64 = 3_000;
pub const QUICK_PLACEMENT_BONUS: u64 = 50;
pub const COMBO_WINDOW_MS: u64 = 3_000;
pub const COMBO_BASE: u64 = 25;
pub const COMPLETION_BONUS: u64 = 1_000;
pub const TIME_BONUS_MAX: u64 = 2_000;
pub const TIME_BONUS_DECAY_PER_S: u64 = 5;
pub const ACCURACY_BONUS_MAX: u64 = 500;

pub const HEARTBEAT_INTERVAL_MS: u64 = 5_000;
pub const STALE_AFTER_MS: u64 = 15_000;
pub const TIMER_PUBLISH_INTERVAL_MS: u64 = 1_000;
pub const COMPLETION_GRACE_MS: u64 = 2_000;

/// Upper bound for every interval in the rules, one day.
pub const MAX_INTERVAL_MS: u64 = 86_400_000;

/// Interval as a signed millisecond offset for clock arithmetic.
pub fn saturating_ms(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringRules {
    pub accurate_placement_base: u64,
    pub quick_placement_ms: u64,
    pub quick_placement_bonus: u64,
    pub combo_window_ms: u64,
    pub combo_base: u64,
    pub completion_bonus: u64,
    pub time_bonus_max: u64,
    pub time_bonus_decay_per_s: u64,
    pub accuracy_bonus_max: u64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            accurate_placement_base: ACCURATE_PLACEMENT_BASE,
            quick_placement_ms: QUICK_PLACEMENT_MS,
            quick_placement_bonus: QUICK_PLACEMENT_BONUS,
            combo_window_ms: COMBO_WINDOW_MS,
            combo_base: COMBO_BASE,
            completion_bonus: COMPLETION_BONUS,
            time_bonus_max: TIME_BONUS_MAX,
            time_bonus_decay_per_s: TIME_BONUS_DECAY_PER_S,
            accuracy_bonus_max: ACCURACY_BONUS_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresenceRules {
    pub heartbeat_interval_ms: u64,
    pub stale_after_ms: u64,
}

impl Default for PresenceRules {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            stale_after_ms: STALE_AFTER_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionRules {
    pub timer_publish_interval_ms: u64,
    pub completion_grace_ms: u64,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            timer_publish_interval_ms: TIMER_PUBLISH_INTERVAL_MS,
            completion_grace_ms: COMPLETION_GRACE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesConfig {
    pub scoring: ScoringRules,
    pub presence: PresenceRules,
    pub session: SessionRules,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read rules config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rules config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid rules config: {0}")]
    Invalid(String),
}

impl RulesConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: RulesConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.presence.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "presence.heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        if self.presence.stale_after_ms <= self.presence.heartbeat_interval_ms {
            return Err(ConfigError::Invalid(
                "presence.stale_after_ms must exceed the heartbeat interval".to_string(),
            ));
        }
        let intervals = [
            ("presence.heartbeat_interval_ms", self.presence.heartbeat_interval_ms),
            ("presence.stale_after_ms", self.presence.stale_after_ms),
            ("session.timer_publish_interval_ms", self.session.timer_publish_interval_ms),
            ("session.completion_grace_ms", self.session.completion_grace_ms),
            ("scoring.combo_window_ms", self.scoring.combo_window_ms),
            ("scoring.quick_placement_ms", self.scoring.quick_placement_ms),
        ];
        if let Some((name, _)) = intervals
            .iter()
            .find(|(_, value)| *value > MAX_INTERVAL_MS)
        {
            return Err(ConfigError::Invalid(format!(
                "{name} must not exceed {MAX_INTERVAL_MS} ms"
            )));
        }
        if self.scoring.combo_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "scoring.combo_window_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
