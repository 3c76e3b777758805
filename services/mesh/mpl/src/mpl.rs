//! MPL option processing: sequence assignment, seed elision and seed set admission.

use crate::config::MplConfig;
use crate::error::{ConfigError, DropReason};
use crate::stats::MplStats;
use mesh_storage::{Admission, SeedSet};
use mesh_trickle::TimerService;
use mesh_wire::{read_option, seed_from_address, MessageReader, MplOption};
use std::net::Ipv6Addr;
use tracing::{debug, trace, warn};

/// Seed set decay period (ms)
pub const SEED_SET_TICK_MS: u32 = 1000;

/// Per-node originator state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MplLocalState {
    /// Sequence assigned to the next originated message
    pub next_sequence: u8,
    /// Explicit seed override; `None` derives the seed from the source address
    pub local_seed: Option<u16>,
    /// Source address for which the seed is elided
    pub matching_address: Option<Ipv6Addr>,
}

/// A message admitted by the seed set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    /// Resolved seed
    pub seed: u16,
    /// Message sequence
    pub sequence: u8,
    /// Whether the seed was previously unknown
    pub new_seed: bool,
}

/// MPL engine: option codec plus seed set with its 1 Hz decay ticker
pub struct Mpl<T> {
    local: MplLocalState,
    seed_set: SeedSet,
    ticker: T,
    ticker_running: bool,
    stats: MplStats,
}

impl<T: TimerService> Mpl<T> {
    /// Create the engine; `ticker` drives seed lifetime decay
    pub fn new(config: &MplConfig, ticker: T) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            local: MplLocalState {
                next_sequence: 0,
                local_seed: None,
                matching_address: None,
            },
            seed_set: SeedSet::new(config.seed_set_entries, config.seed_lifetime_secs),
            ticker,
            ticker_running: false,
            stats: MplStats::default(),
        })
    }

    /// Set the address whose messages are sent with an elided seed
    pub fn set_matching_address(&mut self, address: Option<Ipv6Addr>) {
        self.local.matching_address = address;
    }

    /// Carry `seed` in every explicit option instead of the source-derived one
    pub fn set_local_seed(&mut self, seed: Option<u16>) {
        self.local.local_seed = seed;
    }

    /// Build the option for a message sent from `source`, consuming a sequence number
    pub fn encode_option(&mut self, source: &Ipv6Addr) -> MplOption {
        let sequence = self.local.next_sequence;
        self.local.next_sequence = sequence.wrapping_add(1);

        if self.local.matching_address.as_ref() == Some(source) {
            MplOption::elided(sequence)
        } else {
            let seed = self
                .local
                .local_seed
                .unwrap_or_else(|| seed_from_address(source));
            MplOption::explicit(sequence, seed)
        }
    }

    /// Build the option for a locally originated message and record it in the
    /// seed set, so relayed copies coming back are recognised as duplicates
    pub fn originate(&mut self, source: &Ipv6Addr) -> MplOption {
        let option = self.encode_option(source);
        let seed = option.seed_for(source);
        self.stats.originated += 1;

        match self.seed_set.accept(seed, option.sequence) {
            Ok(_) => self.ensure_ticker(),
            Err(err) => debug!("originated message not tracked: {}", err),
        }
        option
    }

    /// Accept or drop the option in `bytes`, received with IPv6 source `source`
    pub fn process_option(
        &mut self,
        bytes: &[u8],
        source: &Ipv6Addr,
    ) -> Result<Accepted, DropReason> {
        let option = self.decode(bytes, 0)?;
        self.process_decoded(&option, source)
    }

    /// Accept or drop the option located at `offset` in `message`
    pub fn process_message<M: MessageReader + ?Sized>(
        &mut self,
        message: &M,
        offset: usize,
        source: &Ipv6Addr,
    ) -> Result<Accepted, DropReason> {
        let option = self.decode(message, offset)?;
        self.process_decoded(&option, source)
    }

    /// Read the option at `offset`, counting malformed ones as drops
    pub fn decode<M: MessageReader + ?Sized>(
        &mut self,
        message: &M,
        offset: usize,
    ) -> Result<MplOption, DropReason> {
        read_option(message, offset).map_err(|err| {
            debug!("dropping MPL message: {}", err);
            self.stats.record_drop(DropReason::InvalidOption);
            DropReason::from(err)
        })
    }

    /// Run seed set admission for an already decoded option
    pub fn process_decoded(
        &mut self,
        option: &MplOption,
        source: &Ipv6Addr,
    ) -> Result<Accepted, DropReason> {
        let seed = option.seed_for(source);

        match self.seed_set.accept(seed, option.sequence) {
            Ok(admission) => {
                trace!("accepted seed {:#06x} sequence {}", seed, option.sequence);
                self.stats.accepted += 1;
                self.ensure_ticker();
                Ok(Accepted {
                    seed,
                    sequence: option.sequence,
                    new_seed: admission == Admission::Inserted,
                })
            }
            Err(err) => {
                let reason = DropReason::from(err.clone());
                if reason == DropReason::TableFull {
                    warn!("dropping MPL message: {}", err);
                } else {
                    trace!("dropping MPL message: {}", err);
                }
                self.stats.record_drop(reason);
                Err(reason)
            }
        }
    }

    /// Seed set ticker expired: decay lifetimes and reschedule while entries remain
    pub fn handle_tick(&mut self) {
        if !self.ticker_running {
            debug!("ignoring seed set tick while ticker is idle");
            return;
        }

        let live = self.seed_set.tick();
        if live > 0 {
            self.ticker.start(SEED_SET_TICK_MS);
        } else {
            trace!("seed set empty, ticker idle");
            self.ticker_running = false;
        }
    }

    fn ensure_ticker(&mut self) {
        if !self.ticker_running {
            self.ticker.start(SEED_SET_TICK_MS);
            self.ticker_running = true;
        }
    }

    /// Whether the decay ticker is scheduled
    pub fn is_ticker_running(&self) -> bool {
        self.ticker_running
    }

    /// Originator state
    pub fn local_state(&self) -> &MplLocalState {
        &self.local
    }

    /// Seed set contents
    pub fn seed_set(&self) -> &SeedSet {
        &self.seed_set
    }

    /// Processing counters
    pub fn stats(&self) -> &MplStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_trickle::{ScheduledTimer, Scheduler, TimerFactory};
    use mesh_wire::MPL_OPTION_TYPE;

    fn engine(config: &MplConfig) -> (Mpl<ScheduledTimer>, Scheduler) {
        let scheduler = Scheduler::new();
        let (_, ticker) = scheduler.create_timer();
        (Mpl::new(config, ticker).unwrap(), scheduler)
    }

    fn option(seed: u16, sequence: u8) -> Vec<u8> {
        MplOption::explicit(sequence, seed).to_bytes().to_vec()
    }

    fn source() -> Ipv6Addr {
        "fd00::1".parse().unwrap()
    }

    #[test]
    fn test_duplicate_dropped() {
        let (mut mpl, _scheduler) = engine(&MplConfig::default());
        let accepted = mpl.process_option(&option(0x1234, 5), &source()).unwrap();
        assert_eq!(accepted.seed, 0x1234);
        assert!(accepted.new_seed);

        assert_eq!(
            mpl.process_option(&option(0x1234, 5), &source()),
            Err(DropReason::StaleOrDuplicate)
        );
        assert_eq!(mpl.stats().accepted, 1);
        assert_eq!(mpl.stats().duplicates, 1);
    }

    #[test]
    fn test_refresh_after_partial_decay() {
        let config = MplConfig::default();
        let (mut mpl, scheduler) = engine(&config);
        mpl.process_option(&option(0x1234, 5), &source()).unwrap();

        for _ in 0..5 {
            assert!(scheduler.pop().is_some());
            mpl.handle_tick();
        }
        assert_eq!(scheduler.now_ms(), 5000);
        assert_eq!(
            mpl.seed_set().get(0x1234).unwrap().lifetime,
            config.seed_lifetime_secs - 5
        );

        let accepted = mpl.process_option(&option(0x1234, 6), &source()).unwrap();
        assert!(!accepted.new_seed);
        let entry = mpl.seed_set().get(0x1234).unwrap();
        assert_eq!(entry.sequence, 6);
        assert_eq!(entry.lifetime, config.seed_lifetime_secs);
    }

    #[test]
    fn test_sequence_window() {
        let (mut mpl, _scheduler) = engine(&MplConfig::default());
        mpl.process_option(&option(0x0042, 250), &source()).unwrap();

        // 250 + 127 wraps to 121
        assert!(mpl.process_option(&option(0x0042, 121), &source()).is_ok());
        // 121 - 128 wraps to 249
        assert_eq!(
            mpl.process_option(&option(0x0042, 249), &source()),
            Err(DropReason::StaleOrDuplicate)
        );
        assert!(mpl.process_option(&option(0x0042, 122), &source()).is_ok());
    }

    #[test]
    fn test_table_full_until_expiry() {
        let config = MplConfig {
            seed_set_entries: 2,
            seed_lifetime_secs: 3,
            ..MplConfig::default()
        };
        let (mut mpl, scheduler) = engine(&config);
        mpl.process_option(&option(1, 0), &source()).unwrap();
        mpl.process_option(&option(2, 0), &source()).unwrap();

        assert_eq!(
            mpl.process_option(&option(3, 0), &source()),
            Err(DropReason::TableFull)
        );
        assert_eq!(mpl.stats().table_full, 1);

        for _ in 0..3 {
            scheduler.pop();
            mpl.handle_tick();
        }
        assert!(mpl.seed_set().is_empty());
        assert!(mpl.process_option(&option(3, 0), &source()).is_ok());
    }

    #[test]
    fn test_ticker_runs_only_while_entries_live() {
        let config = MplConfig {
            seed_lifetime_secs: 2,
            ..MplConfig::default()
        };
        let (mut mpl, scheduler) = engine(&config);
        assert!(!mpl.is_ticker_running());
        assert_eq!(scheduler.pending(), 0);

        mpl.process_option(&option(7, 1), &source()).unwrap();
        mpl.process_option(&option(8, 1), &source()).unwrap();
        assert!(mpl.is_ticker_running());
        assert_eq!(scheduler.pending(), 1);

        scheduler.pop();
        mpl.handle_tick();
        assert_eq!(scheduler.pending(), 1);

        scheduler.pop();
        mpl.handle_tick();
        assert!(!mpl.is_ticker_running());
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.now_ms(), 2000);
    }

    #[test]
    fn test_invalid_options_dropped() {
        let (mut mpl, scheduler) = engine(&MplConfig::default());
        let bad = [
            vec![MPL_OPTION_TYPE, 2, 0x80, 1],
            vec![MPL_OPTION_TYPE, 2],
            vec![0x01, 2, 0x00, 1],
        ];
        for bytes in &bad {
            assert_eq!(
                mpl.process_option(bytes, &source()),
                Err(DropReason::InvalidOption)
            );
        }
        assert_eq!(mpl.stats().invalid, 3);
        assert!(mpl.seed_set().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_encode_assigns_wrapping_sequences() {
        let (mut mpl, _scheduler) = engine(&MplConfig::default());
        mpl.set_local_seed(Some(0x0400));
        for expected in 0..=255u8 {
            assert_eq!(mpl.encode_option(&source()).sequence, expected);
        }
        let wrapped = mpl.encode_option(&source());
        assert_eq!(wrapped.sequence, 0);
        assert_eq!(wrapped.seed, Some(0x0400));
    }

    #[test]
    fn test_explicit_seed_follows_source() {
        let (mut mpl, _scheduler) = engine(&MplConfig::default());
        let option = mpl.encode_option(&"fd00::1234".parse().unwrap());
        assert_eq!(option.seed, Some(0x1234));

        let option = mpl.encode_option(&"fd00::ff:fe00:beef".parse().unwrap());
        assert_eq!(option.seed, Some(0xbeef));
        assert_eq!(option.sequence, 1);
    }

    #[test]
    fn test_elided_and_explicit_seed_agree() {
        let local: Ipv6Addr = "fd00::ff:fe00:2c00".parse().unwrap();
        let other: Ipv6Addr = "fd00::abcd".parse().unwrap();

        let (mut sender, _s) = engine(&MplConfig::default());
        sender.set_matching_address(Some(local));

        let elided = sender.encode_option(&local);
        assert_eq!(elided.seed, None);
        assert_eq!(sender.encode_option(&other).seed, Some(0xabcd));

        sender.set_matching_address(None);
        let explicit = sender.encode_option(&local);
        assert_eq!(explicit.seed, Some(0x2c00));

        // Both encodings from the same source name one originator
        let (mut receiver, _r) = engine(&MplConfig::default());
        let first = receiver
            .process_option(&elided.to_bytes(), &local)
            .unwrap();
        let second = receiver
            .process_option(&explicit.to_bytes(), &other)
            .unwrap();
        assert_eq!(first.seed, second.seed);
        assert_eq!(receiver.seed_set().len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let scheduler = Scheduler::new();
        let (_, ticker) = scheduler.create_timer();
        let config = MplConfig {
            seed_lifetime_secs: 0,
            ..MplConfig::default()
        };
        assert_eq!(
            Mpl::new(&config, ticker).err(),
            Some(ConfigError::ZeroLifetime)
        );
    }

    #[test]
    fn test_process_message_at_offset() {
        let (mut mpl, _scheduler) = engine(&MplConfig::default());
        let mut message = vec![0x3A, 0x00];
        message.extend_from_slice(&option(0x0101, 9));
        message.extend_from_slice(&[0xDE, 0xAD]);

        let accepted = mpl.process_message(&message[..], 2, &source()).unwrap();
        assert_eq!(accepted.seed, 0x0101);
        assert_eq!(accepted.sequence, 9);
    }

    #[test]
    fn test_originate_records_own_message() {
        let local: Ipv6Addr = "fd00::ff:fe00:1000".parse().unwrap();
        let (mut mpl, _scheduler) = engine(&MplConfig::default());
        mpl.set_matching_address(Some(local));

        let option = mpl.originate(&local);
        assert_eq!(mpl.stats().originated, 1);
        assert!(mpl.is_ticker_running());
        assert_eq!(
            mpl.process_option(&option.to_bytes(), &local),
            Err(DropReason::StaleOrDuplicate)
        );
    }
}
