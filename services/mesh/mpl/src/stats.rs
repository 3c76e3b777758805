//! Counters for MPL processing and relaying.

use crate::error::DropReason;
use serde::{Deserialize, Serialize};

/// Seed processing counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MplStats {
    /// Locally originated messages
    pub originated: u64,
    /// Inbound messages accepted
    pub accepted: u64,
    /// Dropped: malformed option
    pub invalid: u64,
    /// Dropped: stale or duplicate sequence
    pub duplicates: u64,
    /// Dropped: seed set full
    pub table_full: u64,
}

impl MplStats {
    /// Count a drop
    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::InvalidOption => self.invalid += 1,
            DropReason::StaleOrDuplicate => self.duplicates += 1,
            DropReason::TableFull => self.table_full += 1,
        }
    }

    /// Total drops
    pub fn dropped(&self) -> u64 {
        self.invalid + self.duplicates + self.table_full
    }
}

/// Relay buffer counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderStats {
    /// Messages taken into the relay buffer
    pub buffered: u64,
    /// Relay transmissions requested
    pub relayed: u64,
    /// Transmission points suppressed by consistent neighbours
    pub suppressed: u64,
    /// Messages retired after their last interval
    pub retired: u64,
    /// Messages not buffered because the buffer was full
    pub rejected: u64,
}
