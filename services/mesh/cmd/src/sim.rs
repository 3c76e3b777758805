//! Line-topology network of MPL nodes.
//!
//! Node 0 originates the scenario's messages on a fixed interval. Every
//! transmission reaches the immediate neighbours only, so a message crosses
//! the line purely through Trickle-paced relays.

use crate::config::SimConfig;
use bytes::Bytes;
use mesh_mpl::{ConfigError, ForwarderStats, MplNode, MplPacket, MplStats, Reception};
use mesh_trickle::{RandomSource, SharedRandom, TimerFactory, TimerId, TimerService};
use serde::Serialize;
use std::net::Ipv6Addr;
use tracing::{debug, trace, warn};

/// Address of the node at `index`: `fd00::ff:fe00:<index + 1>`
pub fn node_address(index: usize) -> Ipv6Addr {
    let low = u16::try_from(index + 1).unwrap_or(u16::MAX);
    Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0x00ff, 0xfe00, low)
}

/// Per-node results
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub address: Ipv6Addr,
    /// Distinct messages handed to the upper layer
    pub delivered: u32,
    pub mpl: MplStats,
    pub relay: ForwarderStats,
}

/// Simulation summary
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub clock: String,
    pub elapsed_ms: u64,
    pub nodes: usize,
    pub originated: u32,
    /// Link-layer broadcasts, originations included
    pub transmissions: u64,
    /// Every node other than the originator delivered every message
    pub complete: bool,
    pub per_node: Vec<NodeReport>,
}

pub struct Network<T, R> {
    nodes: Vec<MplNode<T, R>>,
    delivered: Vec<u32>,
    origin_timer: T,
    origin_id: TimerId,
    messages: u32,
    message_interval_ms: u32,
    payload_size: usize,
    originated: u32,
    transmissions: u64,
}

impl<T, R> Network<T, R>
where
    T: TimerService,
    R: RandomSource,
{
    pub fn new<F>(config: &SimConfig, timers: &F, random: SharedRandom<R>) -> Result<Self, ConfigError>
    where
        F: TimerFactory<Timer = T>,
    {
        let nodes = (0..config.simulation.nodes)
            .map(|index| MplNode::new(node_address(index), &config.mpl, timers, random.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let (origin_id, origin_timer) = timers.create_timer();

        Ok(Self {
            delivered: vec![0; nodes.len()],
            nodes,
            origin_timer,
            origin_id,
            messages: config.simulation.messages,
            message_interval_ms: config.simulation.message_interval_ms,
            payload_size: config.simulation.payload_size,
            originated: 0,
            transmissions: 0,
        })
    }

    /// Schedule the first origination immediately
    pub fn start(&mut self) {
        if self.messages > 0 && !self.nodes.is_empty() {
            self.origin_timer.start(0);
        }
    }

    /// Dispatch a timer expiration to whoever owns it
    pub fn handle_timer<F>(&mut self, timers: &F, id: TimerId)
    where
        F: TimerFactory<Timer = T>,
    {
        if id == self.origin_id {
            self.originate(timers);
            return;
        }

        let Some(index) = self.nodes.iter().position(|node| node.owns_timer(id)) else {
            warn!("expiration for unknown timer {}", id);
            return;
        };

        if let Some(packet) = self.nodes[index].handle_timer(id) {
            trace!("node {} relaying", index);
            self.transmit(timers, index, &packet);
        }
    }

    fn originate<F>(&mut self, timers: &F)
    where
        F: TimerFactory<Timer = T>,
    {
        let fill = (self.originated % 256) as u8;
        let payload = Bytes::from(vec![fill; self.payload_size]);
        let packet = self.nodes[0].originate(timers, payload);
        self.originated += 1;
        crate::component_debug!("net", "originated message {} of {}", self.originated, self.messages);

        self.transmit(timers, 0, &packet);

        if self.originated < self.messages {
            self.origin_timer.start(self.message_interval_ms);
        }
    }

    /// Broadcast `packet` from node `from` to its line neighbours
    fn transmit<F>(&mut self, timers: &F, from: usize, packet: &MplPacket)
    where
        F: TimerFactory<Timer = T>,
    {
        self.transmissions += 1;

        let neighbours = [from.checked_sub(1), Some(from + 1)];
        for to in neighbours.into_iter().flatten() {
            let Some(node) = self.nodes.get_mut(to) else {
                continue;
            };
            match node.receive(timers, packet) {
                Reception::Delivered {
                    seed, sequence, ..
                } => {
                    self.delivered[to] += 1;
                    debug!(
                        "node {} delivered seed {:#06x} sequence {} from node {}",
                        to, seed, sequence, from
                    );
                }
                Reception::Duplicate { .. } => {}
                Reception::Dropped(reason) => {
                    debug!("node {} dropped message from node {}: {}", to, from, reason);
                }
            }
        }
    }

    /// Messages originated so far
    pub fn originated(&self) -> u32 {
        self.originated
    }

    /// Whether every node past the originator has every originated message
    pub fn complete(&self) -> bool {
        self.originated == self.messages
            && self.delivered.iter().skip(1).all(|&count| count == self.messages)
    }

    #[cfg(test)]
    pub fn nodes(&self) -> &[MplNode<T, R>] {
        &self.nodes
    }

    pub fn report(&self, clock: &str, elapsed_ms: u64) -> SimReport {
        SimReport {
            clock: clock.to_string(),
            elapsed_ms,
            nodes: self.nodes.len(),
            originated: self.originated,
            transmissions: self.transmissions,
            complete: self.complete(),
            per_node: self
                .nodes
                .iter()
                .zip(&self.delivered)
                .map(|(node, &delivered)| NodeReport {
                    address: node.address(),
                    delivered,
                    mpl: node.mpl_stats().clone(),
                    relay: node.forwarder_stats().clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;
    use mesh_mpl::MplConfig;
    use mesh_trickle::{ScheduledTimer, Scheduler, TokioTimers};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(nodes: usize, messages: u32) -> SimConfig {
        SimConfig {
            mpl: MplConfig {
                // Every relay transmits, so a line never loses a message
                redundancy_constant: 0,
                ..MplConfig::default()
            },
            simulation: ScenarioConfig {
                nodes,
                messages,
                ..ScenarioConfig::default()
            },
        }
    }

    fn run_virtual(
        config: &SimConfig,
        limit_ms: u64,
    ) -> (Scheduler, Network<ScheduledTimer, StdRng>) {
        let scheduler = Scheduler::new();
        let random = SharedRandom::new(StdRng::seed_from_u64(config.simulation.rng_seed));
        let mut network = Network::new(config, &scheduler, random).unwrap();
        network.start();
        while let Some(id) = scheduler.pop_until(limit_ms) {
            network.handle_timer(&scheduler, id);
        }
        (scheduler, network)
    }

    #[test]
    fn test_node_addresses() {
        assert_eq!(node_address(0), "fd00::ff:fe00:1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(node_address(9), "fd00::ff:fe00:a".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn test_line_delivers_every_message() {
        let config = config(5, 3);
        let (scheduler, network) = run_virtual(&config, 60_000);

        assert_eq!(network.originated(), 3);
        assert!(network.complete());

        // Relays and seed entries have all expired
        assert_eq!(scheduler.pending(), 0);
        for node in network.nodes() {
            assert!(node.forwarder().is_empty());
            assert!(node.mpl().seed_set().is_empty());
        }

        let report = network.report("virtual", scheduler.now_ms());
        assert!(report.complete);
        assert_eq!(report.per_node[0].mpl.originated, 3);
        assert_eq!(report.per_node[0].delivered, 0);
        assert!(report.per_node[1..].iter().all(|node| node.delivered == 3));
        assert!(report.transmissions > 3);
    }

    #[test]
    fn test_single_node_has_nobody_to_reach() {
        let config = config(1, 2);
        let (_, network) = run_virtual(&config, 60_000);

        assert_eq!(network.originated(), 2);
        assert!(network.complete());
        assert_eq!(network.nodes()[0].mpl_stats().accepted, 0);
    }

    #[test]
    fn test_deadline_stops_origination() {
        let mut config = config(3, 10);
        config.simulation.message_interval_ms = 1000;
        let (_, network) = run_virtual(&config, 2500);

        assert_eq!(network.originated(), 3);
        assert!(!network.complete());
    }

    #[test]
    fn test_report_serializes() {
        let config = config(2, 1);
        let (scheduler, network) = run_virtual(&config, 60_000);

        let json = serde_json::to_value(network.report("virtual", scheduler.now_ms())).unwrap();
        assert_eq!(json["nodes"], 2);
        assert_eq!(json["per_node"][1]["address"], "fd00::ff:fe00:2");
        assert_eq!(json["per_node"][1]["delivered"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_driver_delivers() {
        let config = config(3, 2);
        let mut timers = TokioTimers::new();
        let random = SharedRandom::new(StdRng::seed_from_u64(3));
        let mut network = Network::new(&config, &timers, random).unwrap();
        network.start();

        while !network.complete() {
            let Some(id) = timers.next().await else {
                break;
            };
            network.handle_timer(&timers, id);
        }

        assert!(network.complete());
    }
}
