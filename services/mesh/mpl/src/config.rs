//! MPL engine configuration.

use crate::error::ConfigError;
use mesh_storage::{DEFAULT_SEED_LIFETIME_SECS, DEFAULT_SEED_SET_ENTRIES};
use serde::{Deserialize, Serialize};

/// Interval used for data message Trickle timers (ms)
pub const DEFAULT_DATA_MESSAGE_INTERVAL_MS: u32 = 64;

/// Relay intervals before a buffered message is retired
pub const DEFAULT_TIMER_EXPIRATIONS: u8 = 3;

/// Messages buffered for relay at once
pub const DEFAULT_BUFFERED_MESSAGES: usize = 16;

/// MPL engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MplConfig {
    /// Seed set capacity
    pub seed_set_entries: usize,
    /// Seed set entry lifetime (seconds)
    pub seed_lifetime_secs: u8,
    /// Data message Trickle Imin (ms)
    pub data_message_imin_ms: u32,
    /// Data message Trickle Imax (ms)
    pub data_message_imax_ms: u32,
    /// Data message Trickle redundancy constant (0 disables suppression)
    pub redundancy_constant: u32,
    /// Intervals a buffered message is relayed for; 0 disables relaying
    pub timer_expirations: u8,
    /// Maximum messages buffered for relay
    pub buffered_messages: usize,
}

impl Default for MplConfig {
    fn default() -> Self {
        Self {
            seed_set_entries: DEFAULT_SEED_SET_ENTRIES,
            seed_lifetime_secs: DEFAULT_SEED_LIFETIME_SECS,
            data_message_imin_ms: DEFAULT_DATA_MESSAGE_INTERVAL_MS,
            data_message_imax_ms: DEFAULT_DATA_MESSAGE_INTERVAL_MS,
            redundancy_constant: 1,
            timer_expirations: DEFAULT_TIMER_EXPIRATIONS,
            buffered_messages: DEFAULT_BUFFERED_MESSAGES,
        }
    }
}

impl MplConfig {
    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seed_set_entries == 0 {
            return Err(ConfigError::NoSeedEntries);
        }
        if self.seed_lifetime_secs == 0 {
            return Err(ConfigError::ZeroLifetime);
        }
        if self.data_message_imin_ms > self.data_message_imax_ms {
            return Err(ConfigError::IntervalBounds {
                imin: self.data_message_imin_ms,
                imax: self.data_message_imax_ms,
            });
        }
        Ok(())
    }
}
