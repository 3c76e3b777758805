//! MPL drop reasons and configuration errors.

use mesh_storage::SeedSetError;
use mesh_wire::WireError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason an inbound MPL message is not delivered or forwarded.
///
/// Drops are silent and local: they are reported to the immediate caller
/// and never propagated back towards the sender.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// Malformed option or unsupported seed-length code
    #[error("invalid MPL option")]
    InvalidOption,
    /// Sequence not strictly newer than the one recorded for the seed
    #[error("stale or duplicate sequence")]
    StaleOrDuplicate,
    /// Unknown seed and no free seed set entry
    #[error("seed set full")]
    TableFull,
}

impl From<WireError> for DropReason {
    fn from(_: WireError) -> Self {
        DropReason::InvalidOption
    }
}

impl From<SeedSetError> for DropReason {
    fn from(err: SeedSetError) -> Self {
        match err {
            SeedSetError::StaleOrDuplicate { .. } => DropReason::StaleOrDuplicate,
            SeedSetError::TableFull { .. } => DropReason::TableFull,
        }
    }
}

/// Invalid MPL configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Seed set needs at least one entry
    #[error("seed_set_entries must be at least 1")]
    NoSeedEntries,
    /// Seed lifetime must be non-zero
    #[error("seed_lifetime_secs must be at least 1")]
    ZeroLifetime,
    /// Trickle bounds inverted
    #[error("data message imin {imin}ms exceeds imax {imax}ms")]
    IntervalBounds {
        /// Configured Imin
        imin: u32,
        /// Configured Imax
        imax: u32,
    },
}
