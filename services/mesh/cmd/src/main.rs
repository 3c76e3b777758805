//! MPL multicast simulation binary.
//!
//! Runs a line of MPL forwarders where the first node originates a burst of
//! messages, either on a deterministic virtual clock or on tokio's wall
//! clock, and reports delivery and relay counters per node.

use clap::{Parser, ValueEnum};
use mesh_trickle::{Scheduler, SharedRandom, TokioTimers};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod sim;

use config::SimConfig;
use logging::MeshLogFormatter;
use sim::{Network, SimReport};

/// Clock driving the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Clock {
    /// Deterministic virtual time, runs as fast as possible
    Virtual,
    /// Wall-clock time through tokio timers
    Realtime,
}

/// MPL multicast simulation over a line of forwarders
#[derive(Parser, Debug)]
#[command(name = "mesh-mpl-sim", version, about = "MPL multicast simulation over Trickle timers")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "mpl-sim.yaml")]
    config: PathBuf,

    /// Number of nodes, overrides the configuration file
    #[arg(long)]
    nodes: Option<usize>,

    /// Messages originated by the first node, overrides the configuration file
    #[arg(long)]
    messages: Option<u32>,

    /// Gap between originated messages, e.g. 500ms
    #[arg(long)]
    message_interval: Option<humantime::Duration>,

    /// Simulated run time, e.g. 30s
    #[arg(long, default_value = "30s")]
    duration: humantime::Duration,

    /// Clock driving the timers
    #[arg(long, value_enum, default_value_t = Clock::Virtual)]
    clock: Clock,

    /// Seed for the random source, overrides the configuration file
    #[arg(long)]
    rng_seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = build_filter(&args.log_level, std::env::var("RUST_LOG").ok().as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(MeshLogFormatter::new("mpl-sim", logging::color_supported()))
        .init();

    info!("Starting MPL simulation v{}", env!("CARGO_PKG_VERSION"));

    let mut config = SimConfig::load_from_file(&args.config)?;
    if let Some(nodes) = args.nodes {
        config.simulation.nodes = nodes;
    }
    if let Some(messages) = args.messages {
        config.simulation.messages = messages;
    }
    if let Some(interval) = args.message_interval {
        config.simulation.message_interval_ms =
            u32::try_from(Duration::from(interval).as_millis()).unwrap_or(u32::MAX);
    }
    if let Some(seed) = args.rng_seed {
        config.simulation.rng_seed = seed;
    }
    config.validate()?;

    let duration: Duration = args.duration.into();
    crate::component_info!(
        "net",
        "{} nodes, {} messages every {}ms, running for {} on the {:?} clock",
        config.simulation.nodes,
        config.simulation.messages,
        config.simulation.message_interval_ms,
        args.duration,
        args.clock
    );

    let report = match args.clock {
        Clock::Virtual => run_virtual(&config, duration)?,
        Clock::Realtime => run_realtime(&config, duration).await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

/// Targets raised to `--log-level`
const MESH_TARGETS: [&str; 5] = [
    "mesh_mpl_sim",
    "mesh_mpl",
    "mesh_trickle",
    "mesh_storage",
    "mesh_wire",
];

/// `RUST_LOG` wins when set; otherwise every mesh crate logs at `level`
fn build_filter(level: &str, rust_log: Option<&str>) -> anyhow::Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        return Ok(EnvFilter::try_new(directives)?);
    }

    let mut filter = EnvFilter::new("warn");
    for target in MESH_TARGETS {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }
    Ok(filter)
}

fn run_virtual(config: &SimConfig, duration: Duration) -> anyhow::Result<SimReport> {
    let scheduler = Scheduler::new();
    let random = SharedRandom::new(StdRng::seed_from_u64(config.simulation.rng_seed));
    let mut network = Network::new(config, &scheduler, random)?;

    let limit_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    network.start();
    while let Some(id) = scheduler.pop_until(limit_ms) {
        network.handle_timer(&scheduler, id);
    }

    let elapsed_ms = scheduler.now_ms();
    if scheduler.pending() == 0 {
        info!("Network went quiet at {}ms", elapsed_ms);
    }
    Ok(network.report("virtual", elapsed_ms))
}

async fn run_realtime(config: &SimConfig, duration: Duration) -> anyhow::Result<SimReport> {
    let mut timers = TokioTimers::new();
    let random = SharedRandom::new(StdRng::seed_from_u64(config.simulation.rng_seed));
    let mut network = Network::new(config, &timers, random)?;

    let started = tokio::time::Instant::now();
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    network.start();
    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Simulation time elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, reporting partial results");
                break;
            }
            fired = timers.next() => match fired {
                Some(id) => network.handle_timer(&timers, id),
                None => break,
            },
        }

        if timers.pending() == 0 {
            info!("Network went quiet");
            break;
        }
    }

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(network.report("realtime", elapsed_ms))
}

fn print_report(report: &SimReport) {
    info!(
        "{} clock: {} nodes, {} originated, {} transmissions in {}ms, complete={}",
        report.clock,
        report.nodes,
        report.originated,
        report.transmissions,
        report.elapsed_ms,
        report.complete
    );
    for node in &report.per_node {
        crate::component_info!(
            "node",
            "{} delivered={} accepted={} dropped={} relayed={} suppressed={} retired={}",
            node.address,
            node.delivered,
            node.mpl.accepted,
            node.mpl.dropped(),
            node.relay.relayed,
            node.relay.suppressed,
            node.relay.retired
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_covers_every_mesh_crate() {
        let filter = build_filter("trace", None).unwrap().to_string();
        for target in MESH_TARGETS {
            assert!(
                filter.contains(&format!("{}=trace", target)),
                "{} missing from {}",
                target,
                filter
            );
        }
    }

    #[test]
    fn test_rust_log_takes_precedence() {
        let filter = build_filter("info", Some("mesh_wire=debug")).unwrap().to_string();
        assert!(filter.contains("mesh_wire=debug"));
        assert!(!filter.contains("mesh_mpl=info"));

        let filter = build_filter("debug", Some("  ")).unwrap().to_string();
        assert!(filter.contains("mesh_wire=debug"));
    }
}
