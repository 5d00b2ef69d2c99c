//! Delayed one-shot tasks.
//!
//! Momentary controls and voice gates need "do this again in 20ms". The host
//! decides what a timer is: [`TokioScheduler`] runs tasks on a tokio `LocalSet`,
//! [`ManualScheduler`] runs them when the host advances its own clock (useful for
//! hosts that tick per frame, and for deterministic tests).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// A task to run once, later, on the same thread.
pub type Task = Box<dyn FnOnce()>;

/// Something that can run a task after a delay.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Task);
}

/// Schedules tasks with `tokio::task::spawn_local`.
///
/// Must be used from within a [`tokio::task::LocalSet`]; the engine is
/// single-threaded and its handles are not `Send`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

struct Pending {
    due: Duration,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    pending: Vec<Pending>,
}

/// A scheduler driven by explicit calls to [`ManualScheduler::advance`].
///
/// Clones share the same clock.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Rc<RefCell<ManualClock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation
    pub fn now(&self) -> Duration {
        self.clock.borrow().now
    }

    /// Number of tasks not yet run
    pub fn pending(&self) -> usize {
        self.clock.borrow().pending.len()
    }

    /// Move the clock forward, running every task that falls due, in due order.
    /// Tasks scheduled by a running task are honoured if they fall inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.borrow().now + by;

        loop {
            let next = {
                let mut clock = self.clock.borrow_mut();
                let earliest = clock
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(i, _)| i);

                earliest.map(|i| {
                    let pending = clock.pending.swap_remove(i);
                    clock.now = pending.due;
                    pending.task
                })
            };

            // clock borrow released before running, tasks may schedule more work
            match next {
                Some(task) => task(),
                None => break,
            }
        }

        self.clock.borrow_mut().now = target;
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        let mut clock = self.clock.borrow_mut();
        let due = clock.now + delay;
        let seq = clock.next_seq;
        clock.next_seq += 1;
        clock.pending.push(Pending { due, seq, task });
    }
}
