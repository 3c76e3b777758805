//! RFC 6206 Trickle timer, timer/random collaborators and timer drivers for mesh.
//!
//! This crate provides the randomized interval state machine used to pace
//! MPL relays, the collaborator traits it consumes (a single-shot
//! millisecond timer and a uniform random source), and two timer drivers a
//! host event loop can dispatch from:
//!
//! - **Scheduler**: deterministic virtual time for simulation and tests
//! - **TokioTimers**: wall-clock expirations delivered through a channel
//!
//! All types are meant to live on a single cooperative task; none of them
//! are `Send`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod scheduler;
pub mod service;
pub mod timer;
pub mod tokio_timer;

pub use scheduler::{ScheduledTimer, Scheduler};
pub use service::{RandomSource, SharedRandom, TimerFactory, TimerId, TimerService};
pub use timer::{Callbacks, Phase, TrickleHandler, TrickleMode, TrickleTimer};
pub use tokio_timer::{TokioTimer, TokioTimers};
