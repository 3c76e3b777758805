//! Deterministic virtual-time timer driver.
//!
//! The scheduler is a single-threaded event queue: timers created from it
//! push deadlines onto a heap, and the host pops expirations in deadline
//! order, advancing virtual time as it goes. Restarting or stopping a timer
//! invalidates its previous heap entry, so a cancelled schedule never fires.

use crate::service::{TimerFactory, TimerId, TimerService};
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Default)]
struct Queue {
    now: u64,
    next_id: TimerId,
    next_seq: u64,
    /// (deadline, schedule sequence, timer)
    heap: BinaryHeap<Reverse<(u64, u64, TimerId)>>,
    /// Timer -> sequence of its live schedule
    armed: HashMap<TimerId, u64>,
}

/// Virtual-time scheduler handing out [`ScheduledTimer`]s
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: Rc<RefCell<Queue>>,
}

impl Scheduler {
    /// Create a scheduler at virtual time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.queue.borrow().now
    }

    /// Deadline of the next live expiration
    pub fn next_deadline(&self) -> Option<u64> {
        let mut queue = self.queue.borrow_mut();
        queue.discard_stale();
        queue.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Number of timers with a pending expiration
    pub fn pending(&self) -> usize {
        self.queue.borrow().armed.len()
    }

    /// Pop the next expiration due no later than `limit_ms`, advancing time to it.
    ///
    /// When nothing is due by `limit_ms`, time advances to `limit_ms` and
    /// `None` is returned.
    pub fn pop_until(&self, limit_ms: u64) -> Option<TimerId> {
        let mut queue = self.queue.borrow_mut();
        queue.discard_stale();

        let due = matches!(
            queue.heap.peek(),
            Some(Reverse((deadline, _, _))) if *deadline <= limit_ms
        );
        if !due {
            queue.now = queue.now.max(limit_ms);
            return None;
        }

        let Reverse((deadline, _, id)) = queue.heap.pop()?;
        queue.armed.remove(&id);
        queue.now = queue.now.max(deadline);
        trace!("timer {} expired at {}ms", id, queue.now);
        Some(id)
    }

    /// Pop the next expiration, however far ahead
    pub fn pop(&self) -> Option<TimerId> {
        let deadline = self.next_deadline()?;
        self.pop_until(deadline)
    }
}

impl Queue {
    fn discard_stale(&mut self) {
        while let Some(Reverse((_, seq, id))) = self.heap.peek() {
            if self.armed.get(id) == Some(seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl TimerFactory for Scheduler {
    type Timer = ScheduledTimer;

    fn create_timer(&self) -> (TimerId, ScheduledTimer) {
        let id = {
            let mut queue = self.queue.borrow_mut();
            queue.next_id += 1;
            queue.next_id
        };
        let timer = ScheduledTimer {
            id,
            queue: Rc::clone(&self.queue),
        };
        (id, timer)
    }
}

/// Timer bound to a [`Scheduler`]
#[derive(Debug)]
pub struct ScheduledTimer {
    id: TimerId,
    queue: Rc<RefCell<Queue>>,
}

impl ScheduledTimer {
    /// Id reported by the scheduler when this timer expires
    pub fn id(&self) -> TimerId {
        self.id
    }
}

impl TimerService for ScheduledTimer {
    fn start(&mut self, delay_ms: u32) {
        let mut queue = self.queue.borrow_mut();
        queue.next_seq += 1;
        let seq = queue.next_seq;
        let deadline = queue.now + u64::from(delay_ms);
        queue.armed.insert(self.id, seq);
        queue.heap.push(Reverse((deadline, seq, self.id)));
    }

    fn stop(&mut self) {
        self.queue.borrow_mut().armed.remove(&self.id);
    }
}

impl Drop for ScheduledTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
