//! Collaborator interfaces consumed by the Trickle timer and the MPL engine.

use rand::{Rng, RngCore};
use std::cell::RefCell;
use std::rc::Rc;

/// Identifier handed out by a [`TimerFactory`] for dispatching expirations
pub type TimerId = u64;

/// Single-shot millisecond timer owned by one component.
///
/// At most one expiration is pending per timer: `start` replaces any pending
/// one, and after `stop` returns the previous schedule must never fire.
pub trait TimerService {
    /// Schedule an expiration `delay_ms` from now
    fn start(&mut self, delay_ms: u32);

    /// Cancel the pending expiration, if any
    fn stop(&mut self);
}

/// Source of timers for components that need one per instance
pub trait TimerFactory {
    /// Timer handle type
    type Timer: TimerService;

    /// Allocate a new timer and the id its expirations are reported under
    fn create_timer(&self) -> (TimerId, Self::Timer);
}

/// Uniform random numbers
pub trait RandomSource {
    /// Uniformly distributed value in `[low, high)`; `low` when the range is empty
    fn uniform(&mut self, low: u32, high: u32) -> u32;
}

impl<R: RngCore> RandomSource for R {
    fn uniform(&mut self, low: u32, high: u32) -> u32 {
        if high <= low {
            low
        } else {
            self.gen_range(low..high)
        }
    }
}

/// Random source shared by many timers on the same task
pub struct SharedRandom<R>(Rc<RefCell<R>>);

impl<R> SharedRandom<R> {
    /// Wrap `random` for sharing
    pub fn new(random: R) -> Self {
        Self(Rc::new(RefCell::new(random)))
    }
}

impl<R> Clone for SharedRandom<R> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<R: RandomSource> RandomSource for SharedRandom<R> {
    fn uniform(&mut self, low: u32, high: u32) -> u32 {
        self.0.borrow_mut().uniform(low, high)
    }
}
