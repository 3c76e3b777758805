//! Trickle timer (RFC 6206).
//!
//! Each interval `I` is split at a random point `t`. When the timer reaches
//! `t` the owner is asked to transmit unless `k` or more consistent messages
//! were heard during the interval; when `I` ends the interval doubles up to
//! `Imax` and a new one begins. An inconsistency collapses `I` back to `Imin`.
//!
//! Two distributions are supported for `t`: the classic `[I/2, I)` and the
//! MPL data message variant `[0, I)`.

use crate::service::{RandomSource, TimerService};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Distribution used to pick the transmission point in an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrickleMode {
    /// RFC 6206: `t` in `[I/2, I)`
    Classic,
    /// MPL data messages: `t` in `[0, I)`
    MplVariant,
}

/// Position in the interval state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Not running
    Dormant,
    /// Waiting for the transmission point `t`
    Transmit,
    /// Waiting for the end of the interval
    WaitInterval,
}

/// Owner callbacks invoked on timer expirations.
///
/// Returning `false` from either callback stops the timer.
pub trait TrickleHandler {
    /// Transmission point reached and not suppressed
    fn on_transmit(&mut self) -> bool;

    /// Interval ended (after doubling)
    fn on_interval_expired(&mut self) -> bool;
}

/// Closure-backed [`TrickleHandler`]
pub struct Callbacks<A, B> {
    on_transmit: A,
    on_interval_expired: B,
}

impl<A, B> Callbacks<A, B>
where
    A: FnMut() -> bool,
    B: FnMut() -> bool,
{
    /// Build a handler from two closures
    pub fn new(on_transmit: A, on_interval_expired: B) -> Self {
        Self {
            on_transmit,
            on_interval_expired,
        }
    }
}

impl<A, B> TrickleHandler for Callbacks<A, B>
where
    A: FnMut() -> bool,
    B: FnMut() -> bool,
{
    fn on_transmit(&mut self) -> bool {
        (self.on_transmit)()
    }

    fn on_interval_expired(&mut self) -> bool {
        (self.on_interval_expired)()
    }
}

/// Trickle timer bound to a platform timer, a random source and an owner.
///
/// The host calls [`TrickleTimer::handle_timer`] whenever the platform timer
/// handed to [`TrickleTimer::new`] expires. Driving the timer while it is
/// dormant, or starting it twice, is a programming error and panics.
pub struct TrickleTimer<T, R, H> {
    timer: T,
    random: R,
    handler: H,
    mode: TrickleMode,
    k: u32,
    phase: Phase,
    i_min: u32,
    i_max: u32,
    i: u32,
    t: u32,
    c: u32,
    suppressed: u32,
}

impl<T, R, H> TrickleTimer<T, R, H>
where
    T: TimerService,
    R: RandomSource,
    H: TrickleHandler,
{
    /// Create a dormant timer with redundancy constant `k` (0 disables suppression)
    pub fn new(timer: T, random: R, handler: H, mode: TrickleMode, k: u32) -> Self {
        Self {
            timer,
            random,
            handler,
            mode,
            k,
            phase: Phase::Dormant,
            i_min: 0,
            i_max: 0,
            i: 0,
            t: 0,
            c: 0,
            suppressed: 0,
        }
    }

    /// Start with interval bounds `[i_min, i_max]` in milliseconds
    pub fn start(&mut self, i_min: u32, i_max: u32) {
        assert!(!self.is_running(), "trickle timer already running");
        assert!(
            i_min <= i_max,
            "trickle interval bounds inverted: {} > {}",
            i_min,
            i_max
        );

        self.i_min = i_min;
        self.i_max = i_max;
        self.i = self.random.uniform(i_min, i_max);
        trace!("trickle start imin={} imax={} i={}", i_min, i_max, self.i);

        self.start_new_interval();
    }

    /// Stop the timer; no callback fires afterwards
    pub fn stop(&mut self) {
        self.timer.stop();
        self.phase = Phase::Dormant;
    }

    /// Whether the timer is running
    pub fn is_running(&self) -> bool {
        self.phase != Phase::Dormant
    }

    /// Record a consistent transmission heard in the current interval
    pub fn indicate_consistent(&mut self) {
        assert!(self.is_running(), "trickle timer not running");
        self.c = self.c.saturating_add(1);
    }

    /// Reset to `Imin` and begin a new interval immediately, unless already at `Imin`
    pub fn indicate_inconsistent(&mut self) {
        assert!(self.is_running(), "trickle timer not running");

        if self.i != self.i_min {
            trace!("trickle inconsistency: i {} -> {}", self.i, self.i_min);
            self.i = self.i_min;
            self.timer.stop();
            self.start_new_interval();
        }
    }

    /// Advance the state machine on platform timer expiry
    pub fn handle_timer(&mut self) {
        match self.phase {
            Phase::Dormant => panic!("trickle timer fired while dormant"),
            Phase::Transmit => {
                if self.k == 0 || self.c < self.k {
                    if !self.handler.on_transmit() {
                        self.stop();
                        return;
                    }
                } else {
                    trace!("trickle transmission suppressed (c={} k={})", self.c, self.k);
                    self.suppressed += 1;
                }

                self.phase = Phase::WaitInterval;
                self.timer.start(self.i - self.t);
            }
            Phase::WaitInterval => {
                let doubled = if self.i == 0 {
                    1
                } else {
                    self.i.saturating_mul(2)
                };
                self.i = doubled.min(self.i_max);

                if !self.handler.on_interval_expired() {
                    self.stop();
                    return;
                }

                self.start_new_interval();
            }
        }
    }

    fn start_new_interval(&mut self) {
        self.c = 0;
        self.phase = Phase::Transmit;

        self.t = if self.i == 0 {
            0
        } else {
            match self.mode {
                TrickleMode::MplVariant => self.random.uniform(0, self.i),
                TrickleMode::Classic => self.random.uniform(self.i / 2, self.i),
            }
        };

        self.timer.start(self.t);
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current interval length `I` (ms)
    pub fn interval(&self) -> u32 {
        self.i
    }

    /// Transmission point `t` within the current interval (ms)
    pub fn transmit_point(&self) -> u32 {
        self.t
    }

    /// Consistent transmissions heard in the current interval
    pub fn counter(&self) -> u32 {
        self.c
    }

    /// Number of transmissions suppressed since creation
    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }

    /// Configured `Imin` (ms)
    pub fn i_min(&self) -> u32 {
        self.i_min
    }

    /// Configured `Imax` (ms)
    pub fn i_max(&self) -> u32 {
        self.i_max
    }

    /// Redundancy constant
    pub fn redundancy_constant(&self) -> u32 {
        self.k
    }

    /// Transmission point distribution
    pub fn mode(&self) -> TrickleMode {
        self.mode
    }

    /// Owner callbacks
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Owner callbacks, mutably
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}
