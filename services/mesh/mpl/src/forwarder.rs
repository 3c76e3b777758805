//! Buffered relay set: Trickle-paced retransmission of accepted messages.
//!
//! Every message this node accepts (or originates) is buffered together with
//! a Trickle timer in MPL mode. Each unsuppressed transmission point yields a
//! relay of the buffered copy; after the configured number of interval
//! expirations the message is retired.

use crate::config::MplConfig;
use crate::error::ConfigError;
use crate::packet::MplPacket;
use crate::stats::ForwarderStats;
use mesh_trickle::{
    RandomSource, SharedRandom, TimerFactory, TimerId, TimerService, TrickleHandler, TrickleMode,
    TrickleTimer,
};
use tracing::{debug, trace, warn};

/// Trickle owner for one buffered message
#[derive(Debug, Clone)]
pub struct RelayHandler {
    transmit_pending: bool,
    expirations: u8,
    max_expirations: u8,
}

impl RelayHandler {
    fn new(max_expirations: u8) -> Self {
        Self {
            transmit_pending: false,
            expirations: 0,
            max_expirations,
        }
    }

    fn take_transmit(&mut self) -> bool {
        std::mem::take(&mut self.transmit_pending)
    }

    /// Interval expirations seen so far
    pub fn expirations(&self) -> u8 {
        self.expirations
    }
}

impl TrickleHandler for RelayHandler {
    fn on_transmit(&mut self) -> bool {
        self.transmit_pending = true;
        true
    }

    fn on_interval_expired(&mut self) -> bool {
        self.expirations += 1;
        self.expirations < self.max_expirations
    }
}

struct BufferedMessage<T, R> {
    seed: u16,
    sequence: u8,
    timer_id: TimerId,
    packet: MplPacket,
    trickle: TrickleTimer<T, SharedRandom<R>, RelayHandler>,
}

/// Relay buffer keyed by `(seed, sequence)`
pub struct MplForwarder<T, R> {
    random: SharedRandom<R>,
    buffered: Vec<BufferedMessage<T, R>>,
    imin: u32,
    imax: u32,
    k: u32,
    timer_expirations: u8,
    capacity: usize,
    stats: ForwarderStats,
}

impl<T, R> MplForwarder<T, R>
where
    T: TimerService,
    R: RandomSource,
{
    /// Create an empty relay buffer
    pub fn new(config: &MplConfig, random: SharedRandom<R>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            random,
            buffered: Vec::new(),
            imin: config.data_message_imin_ms,
            imax: config.data_message_imax_ms,
            k: config.redundancy_constant,
            timer_expirations: config.timer_expirations,
            capacity: config.buffered_messages,
            stats: ForwarderStats::default(),
        })
    }

    /// Buffer `packet` for relay and start its Trickle timer.
    ///
    /// Returns `false` when relaying is disabled, the message is already
    /// buffered, or the buffer is full.
    pub fn buffer<F>(&mut self, timers: &F, seed: u16, sequence: u8, packet: MplPacket) -> bool
    where
        F: TimerFactory<Timer = T>,
    {
        if self.timer_expirations == 0 {
            return false;
        }

        if self.is_buffered(seed, sequence) {
            return false;
        }

        if self.buffered.len() >= self.capacity {
            warn!(
                "relay buffer full ({}), not relaying seed {:#06x} sequence {}",
                self.capacity, seed, sequence
            );
            self.stats.rejected += 1;
            return false;
        }

        let (timer_id, timer) = timers.create_timer();
        let mut trickle = TrickleTimer::new(
            timer,
            self.random.clone(),
            RelayHandler::new(self.timer_expirations),
            TrickleMode::MplVariant,
            self.k,
        );
        trickle.start(self.imin, self.imax);

        debug!(
            "buffered seed {:#06x} sequence {} for relay (timer {})",
            seed, sequence, timer_id
        );
        self.buffered.push(BufferedMessage {
            seed,
            sequence,
            timer_id,
            packet,
            trickle,
        });
        self.stats.buffered += 1;
        true
    }

    /// Dispatch an expiration of timer `id`, returning a packet to relay if the
    /// transmission point was reached and not suppressed
    pub fn handle_timer(&mut self, id: TimerId) -> Option<MplPacket> {
        let Some(index) = self.buffered.iter().position(|m| m.timer_id == id) else {
            debug!("expiration for unknown relay timer {}", id);
            return None;
        };

        let message = &mut self.buffered[index];
        let suppressed_before = message.trickle.suppressed();
        message.trickle.handle_timer();
        self.stats.suppressed += u64::from(message.trickle.suppressed() - suppressed_before);

        let relay = if message.trickle.handler_mut().take_transmit() {
            trace!(
                "relaying seed {:#06x} sequence {}",
                message.seed,
                message.sequence
            );
            self.stats.relayed += 1;
            Some(message.packet.clone())
        } else {
            None
        };

        if !message.trickle.is_running() {
            debug!(
                "retiring seed {:#06x} sequence {} after {} intervals",
                message.seed,
                message.sequence,
                message.trickle.handler().expirations()
            );
            self.buffered.swap_remove(index);
            self.stats.retired += 1;
        }

        relay
    }

    /// A neighbour was heard sending the buffered `(seed, sequence)`
    pub fn indicate_consistent(&mut self, seed: u16, sequence: u8) -> bool {
        match self.find_mut(seed, sequence) {
            Some(message) => {
                message.trickle.indicate_consistent();
                true
            }
            None => false,
        }
    }

    /// A neighbour is missing the buffered `(seed, sequence)`; relay it sooner
    pub fn indicate_inconsistent(&mut self, seed: u16, sequence: u8) -> bool {
        match self.find_mut(seed, sequence) {
            Some(message) => {
                message.trickle.indicate_inconsistent();
                true
            }
            None => false,
        }
    }

    /// Whether `(seed, sequence)` is buffered
    pub fn is_buffered(&self, seed: u16, sequence: u8) -> bool {
        self.buffered
            .iter()
            .any(|m| m.seed == seed && m.sequence == sequence)
    }

    /// Whether `id` belongs to a buffered message
    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.buffered.iter().any(|m| m.timer_id == id)
    }

    /// Number of buffered messages
    pub fn len(&self) -> usize {
        self.buffered.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }

    /// Relay counters
    pub fn stats(&self) -> &ForwarderStats {
        &self.stats
    }

    fn find_mut(&mut self, seed: u16, sequence: u8) -> Option<&mut BufferedMessage<T, R>> {
        self.buffered
            .iter_mut()
            .find(|m| m.seed == seed && m.sequence == sequence)
    }
}
