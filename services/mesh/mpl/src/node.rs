//! MPL node: seed processing, relay buffer and their timers behind one owner.

use crate::config::MplConfig;
use crate::error::{ConfigError, DropReason};
use crate::forwarder::MplForwarder;
use crate::mpl::Mpl;
use crate::packet::MplPacket;
use crate::stats::{ForwarderStats, MplStats};
use bytes::Bytes;
use mesh_trickle::{RandomSource, SharedRandom, TimerFactory, TimerId, TimerService};
use std::net::Ipv6Addr;
use tracing::debug;

/// Outcome of receiving a multicast data message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reception {
    /// New message: deliver locally
    Delivered {
        /// Resolved seed
        seed: u16,
        /// Message sequence
        sequence: u8,
        /// Whether it was taken into the relay buffer
        buffered: bool,
    },
    /// Already seen
    Duplicate {
        /// Resolved seed
        seed: u16,
        /// Message sequence
        sequence: u8,
        /// Whether it counted as a consistent transmission for a buffered copy
        consistent: bool,
    },
    /// Dropped for another reason
    Dropped(DropReason),
}

/// A single MPL forwarder node
pub struct MplNode<T, R> {
    address: Ipv6Addr,
    mpl: Mpl<T>,
    ticker_id: TimerId,
    forwarder: MplForwarder<T, R>,
}

impl<T, R> MplNode<T, R>
where
    T: TimerService,
    R: RandomSource,
{
    /// Create a node sending from `address`; its seed is elided on originated messages
    pub fn new<F>(
        address: Ipv6Addr,
        config: &MplConfig,
        timers: &F,
        random: SharedRandom<R>,
    ) -> Result<Self, ConfigError>
    where
        F: TimerFactory<Timer = T>,
    {
        let (ticker_id, ticker) = timers.create_timer();
        let mut mpl = Mpl::new(config, ticker)?;
        mpl.set_matching_address(Some(address));

        Ok(Self {
            address,
            mpl,
            ticker_id,
            forwarder: MplForwarder::new(config, random)?,
        })
    }

    /// Originate a message: the returned packet is sent now and kept for relay
    pub fn originate<F>(&mut self, timers: &F, payload: Bytes) -> MplPacket
    where
        F: TimerFactory<Timer = T>,
    {
        let option = self.mpl.originate(&self.address);
        let seed = option.seed_for(&self.address);
        let packet = MplPacket {
            source: self.address,
            option: option.to_bytes(),
            payload,
        };
        debug!(
            "originating seed {:#06x} sequence {} ({} bytes)",
            seed,
            option.sequence,
            packet.payload.len()
        );

        self.forwarder
            .buffer(timers, seed, option.sequence, packet.clone());
        packet
    }

    /// Process a message heard from a neighbour
    pub fn receive<F>(&mut self, timers: &F, packet: &MplPacket) -> Reception
    where
        F: TimerFactory<Timer = T>,
    {
        let option = match self.mpl.decode(&packet.option, 0) {
            Ok(option) => option,
            Err(reason) => return Reception::Dropped(reason),
        };
        let seed = option.seed_for(&packet.source);
        let sequence = option.sequence;

        match self.mpl.process_decoded(&option, &packet.source) {
            Ok(_) => {
                let buffered = self.forwarder.buffer(timers, seed, sequence, packet.clone());
                Reception::Delivered {
                    seed,
                    sequence,
                    buffered,
                }
            }
            Err(DropReason::StaleOrDuplicate) => Reception::Duplicate {
                seed,
                sequence,
                consistent: self.forwarder.indicate_consistent(seed, sequence),
            },
            Err(reason) => Reception::Dropped(reason),
        }
    }

    /// Dispatch an expiration of one of this node's timers, returning a packet to relay
    pub fn handle_timer(&mut self, id: TimerId) -> Option<MplPacket> {
        if id == self.ticker_id {
            self.mpl.handle_tick();
            None
        } else {
            self.forwarder.handle_timer(id)
        }
    }

    /// Whether `id` is one of this node's timers
    pub fn owns_timer(&self, id: TimerId) -> bool {
        id == self.ticker_id || self.forwarder.owns_timer(id)
    }

    /// Source address used for originated messages
    pub fn address(&self) -> Ipv6Addr {
        self.address
    }

    /// Seed processing engine
    pub fn mpl(&self) -> &Mpl<T> {
        &self.mpl
    }

    /// Relay buffer
    pub fn forwarder(&self) -> &MplForwarder<T, R> {
        &self.forwarder
    }

    /// Mutable relay buffer, for feeding consistency signals from the mesh layer
    pub fn forwarder_mut(&mut self) -> &mut MplForwarder<T, R> {
        &mut self.forwarder
    }

    /// Seed processing counters
    pub fn mpl_stats(&self) -> &MplStats {
        self.mpl.stats()
    }

    /// Relay counters
    pub fn forwarder_stats(&self) -> &ForwarderStats {
        self.forwarder.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_trickle::{ScheduledTimer, Scheduler};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type Node = MplNode<ScheduledTimer, StdRng>;

    fn node(scheduler: &Scheduler, address: &str, random: &SharedRandom<StdRng>) -> Node {
        MplNode::new(
            address.parse().unwrap(),
            &MplConfig::default(),
            scheduler,
            random.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let scheduler = Scheduler::new();
        let random = SharedRandom::new(StdRng::seed_from_u64(4));
        let config = MplConfig {
            data_message_imin_ms: 200,
            data_message_imax_ms: 100,
            ..MplConfig::default()
        };
        let node: Result<Node, _> =
            MplNode::new("fd00::1".parse().unwrap(), &config, &scheduler, random);
        assert_eq!(
            node.err(),
            Some(ConfigError::IntervalBounds {
                imin: 200,
                imax: 100
            })
        );
    }

    #[test]
    fn test_originate_then_receive() {
        let scheduler = Scheduler::new();
        let random = SharedRandom::new(StdRng::seed_from_u64(5));
        let mut a = node(&scheduler, "fd00::ff:fe00:a", &random);
        let mut b = node(&scheduler, "fd00::ff:fe00:b", &random);

        let packet = a.originate(&scheduler, Bytes::from_static(b"ping"));
        assert_eq!(packet.option.len(), 4, "seed should be elided");
        assert!(a.forwarder().is_buffered(0x000a, 0));

        assert_eq!(
            b.receive(&scheduler, &packet),
            Reception::Delivered {
                seed: 0x000a,
                sequence: 0,
                buffered: true
            }
        );
        assert_eq!(
            b.receive(&scheduler, &packet),
            Reception::Duplicate {
                seed: 0x000a,
                sequence: 0,
                consistent: true
            }
        );

        // A hears B's relay of its own message
        assert_eq!(
            a.receive(&scheduler, &packet),
            Reception::Duplicate {
                seed: 0x000a,
                sequence: 0,
                consistent: true
            }
        );
    }

    #[test]
    fn test_malformed_option_dropped() {
        let scheduler = Scheduler::new();
        let random = SharedRandom::new(StdRng::seed_from_u64(6));
        let mut a = node(&scheduler, "fd00::1", &random);

        let packet = MplPacket {
            source: "fd00::2".parse().unwrap(),
            option: Bytes::from_static(&[0x6D, 2, 0xC0, 1]),
            payload: Bytes::new(),
        };
        assert_eq!(
            a.receive(&scheduler, &packet),
            Reception::Dropped(DropReason::InvalidOption)
        );
        assert_eq!(a.mpl_stats().invalid, 1);
    }

    #[test]
    fn test_timer_dispatch() {
        let scheduler = Scheduler::new();
        let random = SharedRandom::new(StdRng::seed_from_u64(7));
        let mut a = node(&scheduler, "fd00::ff:fe00:a", &random);
        let mut b = node(&scheduler, "fd00::ff:fe00:b", &random);

        let packet = a.originate(&scheduler, Bytes::from_static(b"data"));
        b.receive(&scheduler, &packet);

        let mut relays = 0;
        while let Some(id) = scheduler.pop() {
            assert!(a.owns_timer(id) || b.owns_timer(id));
            let relay = if a.owns_timer(id) {
                a.handle_timer(id)
            } else {
                b.handle_timer(id)
            };
            if let Some(relay) = relay {
                assert_eq!(relay, packet);
                relays += 1;
            }
        }

        // Nobody feeds consistency back here, so both relay every interval
        assert_eq!(relays, 6);
        assert!(a.forwarder().is_empty());
        assert!(b.mpl().seed_set().is_empty());
        assert!(!b.mpl().is_ticker_running());
    }
}
