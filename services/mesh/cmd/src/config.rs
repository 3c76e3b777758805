//! Configuration handling for the MPL simulation host.
//!
//! This module reads the YAML configuration file and environment variables,
//! providing the MPL engine settings and the simulation scenario.

use anyhow::Result;
use mesh_mpl::MplConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Simulation host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// MPL engine settings shared by every node
    pub mpl: MplConfig,
    /// Scenario settings
    pub simulation: ScenarioConfig,
}

/// Scenario settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Nodes in the line topology
    pub nodes: usize,
    /// Messages originated by the first node
    pub messages: u32,
    /// Gap between originated messages (ms)
    pub message_interval_ms: u32,
    /// Payload bytes per message
    pub payload_size: usize,
    /// Seed for the shared random source
    pub rng_seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            nodes: 8,
            messages: 5,
            message_interval_ms: 1000,
            payload_size: 32,
            rng_seed: 1,
        }
    }
}

impl SimConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<SimConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?} ({}), using defaults",
                        config_path.as_ref(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                warn!(
                    "Config file {:?} not found, using defaults",
                    config_path.as_ref()
                );
                Self::default()
            }
        };

        config.apply_environment_overrides();
        config.validate()?;

        info!(
            "Final MPL configuration: seed_set_entries={}, seed_lifetime={}s, imin={}ms, imax={}ms, k={}, expirations={}",
            config.mpl.seed_set_entries,
            config.mpl.seed_lifetime_secs,
            config.mpl.data_message_imin_ms,
            config.mpl.data_message_imax_ms,
            config.mpl.redundancy_constant,
            config.mpl.timer_expirations
        );

        Ok(config)
    }

    /// Reject unusable settings
    pub fn validate(&self) -> Result<()> {
        self.mpl.validate()?;
        if self.simulation.nodes == 0 {
            anyhow::bail!("simulation needs at least one node");
        }
        if self.simulation.nodes > usize::from(u16::MAX) {
            anyhow::bail!(
                "simulation supports at most {} nodes, got {}",
                u16::MAX,
                self.simulation.nodes
            );
        }
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        if let Some(entries) = env_parse::<usize>("MPL_SEED_SET_ENTRIES") {
            self.mpl.seed_set_entries = entries;
            info!("Seed set entries overridden by environment: {}", entries);
        }

        if let Some(lifetime) = env_parse::<u8>("MPL_SEED_LIFETIME_SECS") {
            self.mpl.seed_lifetime_secs = lifetime;
            info!("Seed lifetime overridden by environment: {}s", lifetime);
        }

        if let Some(k) = env_parse::<u32>("MPL_REDUNDANCY_CONSTANT") {
            self.mpl.redundancy_constant = k;
            info!("Redundancy constant overridden by environment: {}", k);
        }

        if let Some(expirations) = env_parse::<u8>("MPL_TIMER_EXPIRATIONS") {
            self.mpl.timer_expirations = expirations;
            info!("Timer expirations overridden by environment: {}", expirations);
        }

        if let Some(nodes) = env_parse::<usize>("MPL_SIM_NODES") {
            self.simulation.nodes = nodes;
            info!("Node count overridden by environment: {}", nodes);
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.mpl, MplConfig::default());
        assert_eq!(config.simulation.nodes, 8);
        assert_eq!(config.simulation.messages, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
mpl:
  seed_set_entries: 4
  data_message_imin_ms: 32
  data_message_imax_ms: 256
  redundancy_constant: 2

simulation:
  messages: 12
  rng_seed: 77
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = SimConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.mpl.seed_set_entries, 4);
        assert_eq!(config.mpl.data_message_imin_ms, 32);
        assert_eq!(config.mpl.data_message_imax_ms, 256);
        assert_eq!(config.mpl.redundancy_constant, 2);
        assert_eq!(config.mpl.timer_expirations, 3);
        assert_eq!(config.simulation.messages, 12);
        assert_eq!(config.simulation.rng_seed, 77);
        assert_eq!(config.simulation.message_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_file_rejected_by_validation() {
        let yaml_content = r#"
mpl:
  data_message_imin_ms: 500
  data_message_imax_ms: 100
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        assert!(SimConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"mpl: [not, a, map").unwrap();

        let config = SimConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.mpl.data_message_imin_ms, 64);
    }
}
