//! MPL seed processing, Trickle-paced relay buffering and node integration for mesh.
//!
//! This crate ties the MPL option codec and seed set to the Trickle timer:
//!
//! - **Mpl**: assigns sequence numbers, elides seeds, and admits or drops
//!   inbound messages through the seed set, running the 1 Hz decay ticker
//! - **MplForwarder**: buffers accepted messages and relays them at the
//!   transmission points of a per-message MPL-mode Trickle timer
//! - **MplNode**: one owner for both, dispatching timer expirations
//!
//! Everything runs on the host's single cooperative task. Drops are silent
//! and local: they are returned as [`DropReason`] and never propagated.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod forwarder;
pub mod mpl;
pub mod node;
pub mod packet;
pub mod stats;

pub use config::MplConfig;
pub use error::{ConfigError, DropReason};
pub use forwarder::{MplForwarder, RelayHandler};
pub use mpl::{Accepted, Mpl, MplLocalState, SEED_SET_TICK_MS};
pub use node::{MplNode, Reception};
pub use packet::MplPacket;
pub use stats::{ForwarderStats, MplStats};
