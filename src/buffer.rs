use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::types::Event;

/// The single shared mutable resource between producers (`track()`
/// callers on the host's worker threads) and the one consumer (the
/// scheduler thread). Bounded: pushing into a full queue drops the
/// incoming event rather than blocking the caller.
pub(crate) struct Buffer {
    state: Mutex<QueueState>,
    cond: Condvar,
    shutdown: AtomicBool,
    max_size: usize,
    batch_size: usize,
}

struct QueueState {
    events: VecDeque<Event>,
    wake: bool,
    stopped: bool,
}

/// What the scheduler should do after waiting in `Idle`.
pub(crate) enum Wakeup {
    Batch(Vec<Event>),
    Empty,
    Shutdown,
}

impl Buffer {
    pub fn new(max_size: usize, batch_size: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(batch_size),
                wake: false,
                stopped: false,
            }),
            cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            max_size,
            batch_size,
        }
    }

    /// Enqueue one event. Returns `false` when the queue is full and
    /// the event was dropped (drop-newest: queued order is preserved).
    /// Wakes the scheduler once a full batch is ready.
    pub fn push(&self, event: Event) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.events.len() >= self.max_size {
            // Never blocks the producer; the batch-size wake below has
            // already fired by the time the queue can fill
            return false;
        }
        state.events.push_back(event);
        if state.events.len() >= self.batch_size {
            state.wake = true;
            self.cond.notify_all();
        }
        true
    }

    /// Bulk enqueue used by the startup recovery path. Returns how many
    /// events fit.
    pub fn extend(&self, events: Vec<Event>) -> usize {
        let mut state = self.state.lock().unwrap();
        let space = self.max_size.saturating_sub(state.events.len());
        let accepted = events.len().min(space);
        state.events.extend(events.into_iter().take(accepted));
        accepted
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    /// Ask the scheduler to run a flush pass now.
    pub fn request_flush(&self) {
        let mut state = self.state.lock().unwrap();
        state.wake = true;
        self.cond.notify_all();
    }

    /// Flip the shutdown flag and wake everything. Performs no I/O and
    /// takes the lock only to avoid a lost wakeup, so it is cheap
    /// enough for a signal-handling thread.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.wake = true;
        self.cond.notify_all();
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Scheduler `Idle` wait: blocks until the flush interval elapses,
    /// a batch is ready, a flush is requested, or shutdown is signalled.
    pub fn wait_for_work(&self, flush_interval: Duration) -> Wakeup {
        let guard = self.state.lock().unwrap();
        let (mut state, _) = self
            .cond
            .wait_timeout_while(guard, flush_interval, |s| {
                !s.wake && !self.shutdown_requested() && s.events.len() < self.batch_size
            })
            .unwrap();
        state.wake = false;

        if self.shutdown_requested() {
            return Wakeup::Shutdown;
        }
        let batch = pop_front(&mut state.events, self.batch_size);
        if batch.is_empty() {
            Wakeup::Empty
        } else {
            Wakeup::Batch(batch)
        }
    }

    /// Scheduler `Backoff` sleep. Returns `true` when cut short by
    /// shutdown.
    pub fn wait_backoff(&self, delay: Duration) -> bool {
        let guard = self.state.lock().unwrap();
        let _unused = self
            .cond
            .wait_timeout_while(guard, delay, |_| !self.shutdown_requested())
            .unwrap();
        self.shutdown_requested()
    }

    /// Take everything still queued (final-flush path).
    pub fn drain_remaining(&self) -> Vec<Event> {
        let mut state = self.state.lock().unwrap();
        state.events.drain(..).collect()
    }

    /// Scheduler reached its terminal state; unblocks `await_stopped`.
    pub fn mark_stopped(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        self.cond.notify_all();
    }

    /// Block until the scheduler stops or the timeout elapses. Returns
    /// `true` if it stopped in time.
    pub fn await_stopped(&self, timeout: Duration) -> bool {
        let guard = self.state.lock().unwrap();
        let (state, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |s| !s.stopped)
            .unwrap();
        state.stopped
    }
}

fn pop_front(events: &mut VecDeque<Event>, n: usize) -> Vec<Event> {
    let take = events.len().min(n);
    events.drain(..take).collect()
}
