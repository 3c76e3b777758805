//! Real-time timer driver on top of tokio.
//!
//! Every started timer spawns a sleep task that posts its expiration to a
//! channel drained by the host loop. Stopping a timer aborts the task and
//! bumps its generation, so an expiration already sitting in the channel is
//! discarded by [`TokioTimers::next`] instead of being dispatched.

use crate::service::{TimerFactory, TimerId, TimerService};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct Fired {
    id: TimerId,
    generation: u64,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: TimerId,
    /// Timer -> generation of its live schedule
    armed: HashMap<TimerId, u64>,
}

/// Tokio-backed timer driver
pub struct TokioTimers {
    tx: mpsc::UnboundedSender<Fired>,
    rx: mpsc::UnboundedReceiver<Fired>,
    registry: Rc<RefCell<Registry>>,
}

impl TokioTimers {
    /// Create a driver; timers must be started from within a tokio runtime
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }

    /// Wait for the next live expiration
    pub async fn next(&mut self) -> Option<TimerId> {
        while let Some(fired) = self.rx.recv().await {
            let mut registry = self.registry.borrow_mut();
            if registry.armed.get(&fired.id) == Some(&fired.generation) {
                registry.armed.remove(&fired.id);
                return Some(fired.id);
            }
            trace!("discarding stale expiration for timer {}", fired.id);
        }
        None
    }

    /// Number of timers with a pending expiration
    pub fn pending(&self) -> usize {
        self.registry.borrow().armed.len()
    }
}

impl Default for TokioTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerFactory for TokioTimers {
    type Timer = TokioTimer;

    fn create_timer(&self) -> (TimerId, TokioTimer) {
        let id = {
            let mut registry = self.registry.borrow_mut();
            registry.next_id += 1;
            registry.next_id
        };
        let timer = TokioTimer {
            id,
            generation: 0,
            tx: self.tx.clone(),
            registry: Rc::clone(&self.registry),
            task: None,
        };
        (id, timer)
    }
}

/// Timer bound to a [`TokioTimers`] driver
pub struct TokioTimer {
    id: TimerId,
    generation: u64,
    tx: mpsc::UnboundedSender<Fired>,
    registry: Rc<RefCell<Registry>>,
    task: Option<JoinHandle<()>>,
}

impl TimerService for TokioTimer {
    fn start(&mut self, delay_ms: u32) {
        self.stop();

        self.generation += 1;
        let fired = Fired {
            id: self.id,
            generation: self.generation,
        };
        self.registry.borrow_mut().armed.insert(self.id, self.generation);

        let tx = self.tx.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(u64::from(delay_ms))).await;
            // Receiver gone means the host loop is shutting down
            let _ = tx.send(fired);
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.registry.borrow_mut().armed.remove(&self.id);
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expirations_in_deadline_order() {
        let mut timers = TokioTimers::new();
        let (a, mut timer_a) = timers.create_timer();
        let (b, mut timer_b) = timers.create_timer();

        timer_a.start(50);
        timer_b.start(10);
        assert_eq!(timers.pending(), 2);

        assert_eq!(timers.next().await, Some(b));
        assert_eq!(timers.next().await, Some(a));
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_expiration() {
        let mut timers = TokioTimers::new();
        let (_, mut timer_a) = timers.create_timer();
        let (b, mut timer_b) = timers.create_timer();

        timer_a.start(5);
        timer_b.start(20);
        timer_a.stop();

        assert_eq!(timers.next().await, Some(b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_pending() {
        let mut timers = TokioTimers::new();
        let (a, mut timer) = timers.create_timer();
        let (b, mut other) = timers.create_timer();

        timer.start(5);
        timer.start(30);
        other.start(20);

        assert_eq!(timers.next().await, Some(b));
        assert_eq!(timers.next().await, Some(a));
    }
}
