//! Fixed-capacity MPL seed set: per-seed sequence dedup with lifetime decay for mesh.
//!
//! This crate provides the receiver-side duplicate suppression state used by
//! the MPL engine. Each originating seed is tracked with the most recent
//! accepted sequence number and a lifetime in seconds that decays once per
//! second while the entry stays idle.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod seed_set;

use thiserror::Error;

pub use seed_set::{
    Admission, SeedEntry, SeedSet, DEFAULT_SEED_LIFETIME_SECS, DEFAULT_SEED_SET_ENTRIES,
};

/// Seed set rejections
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeedSetError {
    /// Sequence not strictly newer than the stored one for this seed
    #[error("seed {seed:#06x}: sequence {sequence} not newer than {stored}")]
    StaleOrDuplicate {
        /// Seed of the rejected message
        seed: u16,
        /// Rejected sequence
        sequence: u8,
        /// Sequence currently stored for the seed
        stored: u8,
    },
    /// No matching seed and no free slot
    #[error("seed set full, cannot track seed {seed:#06x}")]
    TableFull {
        /// Seed that could not be tracked
        seed: u16,
    },
}

/// Signed distance from `old` to `new` on the 256-value sequence circle.
///
/// `(new - old) mod 256` mapped onto `[-128, 127]`; positive means `new`
/// lies in the half-cycle following `old`.
pub fn sequence_diff(new: u8, old: u8) -> i16 {
    let forward = i16::from(new.wrapping_sub(old));
    if forward < 128 {
        forward
    } else {
        forward - 256
    }
}
