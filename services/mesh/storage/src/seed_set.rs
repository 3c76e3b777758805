//! MPL seed set: the receiver-side dedup table.
//!
//! The table holds at most `capacity` live entries, one per seed. Slots are
//! an arena of explicit `Free`/`Live` states with a free list; a slot returns
//! to the free list when its lifetime decays to zero.

use crate::{sequence_diff, SeedSetError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Default number of seed entries
pub const DEFAULT_SEED_SET_ENTRIES: usize = 32;

/// Default entry lifetime in seconds
pub const DEFAULT_SEED_LIFETIME_SECS: u8 = 10;

/// A live seed set entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEntry {
    /// Seed identifying the originator
    pub seed: u16,
    /// Most recently accepted sequence for this seed
    pub sequence: u8,
    /// Remaining whole seconds before the entry is released
    pub lifetime: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Free,
    Live(SeedEntry),
}

/// Outcome of a successful admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Known seed, newer sequence: entry refreshed
    Refreshed,
    /// Unknown seed: a free slot was occupied
    Inserted,
}

/// Fixed-capacity per-seed dedup table
#[derive(Debug, Clone)]
pub struct SeedSet {
    slots: Vec<Slot>,
    /// Free slot indices; popped from the back so the lowest index is reused first
    free: Vec<usize>,
    lifetime: u8,
}

impl SeedSet {
    /// Create a seed set with `capacity` slots and entry lifetime `lifetime` seconds
    pub fn new(capacity: usize, lifetime: u8) -> Self {
        assert!(lifetime > 0, "seed lifetime must be non-zero");
        Self {
            slots: vec![Slot::Free; capacity],
            free: (0..capacity).rev().collect(),
            lifetime,
        }
    }

    /// Create a seed set with the default capacity and lifetime
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SEED_SET_ENTRIES, DEFAULT_SEED_LIFETIME_SECS)
    }

    /// Accept or reject `(seed, sequence)`.
    ///
    /// A live entry for `seed` always takes priority over occupying a free
    /// slot. Known seeds are accepted only if `sequence` is strictly newer
    /// modulo 256; unknown seeds need a free slot.
    pub fn accept(&mut self, seed: u16, sequence: u8) -> Result<Admission, SeedSetError> {
        let lifetime = self.lifetime;
        if let Some(entry) = self.live_mut(seed) {
            if sequence_diff(sequence, entry.sequence) <= 0 {
                return Err(SeedSetError::StaleOrDuplicate {
                    seed,
                    sequence,
                    stored: entry.sequence,
                });
            }
            trace!(
                "seed {:#06x}: sequence {} -> {}",
                seed,
                entry.sequence,
                sequence
            );
            entry.sequence = sequence;
            entry.lifetime = lifetime;
            return Ok(Admission::Refreshed);
        }

        let index = self.free.pop().ok_or(SeedSetError::TableFull { seed })?;
        self.slots[index] = Slot::Live(SeedEntry {
            seed,
            sequence,
            lifetime,
        });
        debug!(
            "seed {:#06x} tracked in slot {} (sequence {})",
            seed, index, sequence
        );
        Ok(Admission::Inserted)
    }

    /// Decay every live entry by one second, releasing those that reach zero.
    ///
    /// Returns the number of entries still live.
    pub fn tick(&mut self) -> usize {
        let mut live = 0;
        let mut released = false;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Live(entry) = slot {
                entry.lifetime -= 1;
                if entry.lifetime == 0 {
                    debug!("seed {:#06x} expired from slot {}", entry.seed, index);
                    *slot = Slot::Free;
                    self.free.push(index);
                    released = true;
                } else {
                    live += 1;
                }
            }
        }
        if released {
            self.free.sort_unstable_by(|a, b| b.cmp(a));
        }
        live
    }

    /// Live entry for `seed`, if any
    pub fn get(&self, seed: u16) -> Option<&SeedEntry> {
        self.entries().find(|entry| entry.seed == seed)
    }

    /// Iterate over live entries
    pub fn entries(&self) -> impl Iterator<Item = &SeedEntry> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Live(entry) => Some(entry),
            Slot::Free => None,
        })
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether no entry is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of live entries
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Lifetime assigned on insert/refresh
    pub fn lifetime(&self) -> u8 {
        self.lifetime
    }

    fn live_mut(&mut self, seed: u16) -> Option<&mut SeedEntry> {
        self.slots.iter_mut().find_map(|slot| match slot {
            Slot::Live(entry) if entry.seed == seed => Some(entry),
            _ => None,
        })
    }
}

impl Default for SeedSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}
