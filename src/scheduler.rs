use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backoff::BackoffController;
use crate::buffer::{Buffer, Wakeup};
use crate::error::Error;
use crate::store::DiskStore;
use crate::transport::Transport;
use crate::types::{ErrorCallback, Event};

/// Scheduler state machine. A batch in `Backoff` is owned by the
/// scheduler for the whole retry sequence; it re-enters neither the
/// buffer nor the wire until the delay elapses.
enum State {
    Idle,
    Flushing(Vec<Event>),
    Backoff(Vec<Event>, Duration),
    ShuttingDown(Vec<Event>),
    Stopped,
}

/// Background delivery loop: drains the buffer into batches and drives
/// the transport, backoff controller, and disk store. Runs on one
/// dedicated thread for the lifetime of the client; nothing here ever
/// propagates into the host's request path.
pub(crate) struct DeliveryScheduler {
    buffer: Arc<Buffer>,
    transport: Box<dyn Transport>,
    backoff: BackoffController,
    store: DiskStore,
    flush_interval: Duration,
    on_error: Option<ErrorCallback>,
}

impl DeliveryScheduler {
    pub fn new(
        buffer: Arc<Buffer>,
        transport: Box<dyn Transport>,
        backoff: BackoffController,
        store: DiskStore,
        flush_interval: Duration,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            buffer,
            transport,
            backoff,
            store,
            flush_interval,
            on_error,
        }
    }

    pub fn run(mut self) {
        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => self.idle(),
                State::Flushing(batch) => self.flushing(batch),
                State::Backoff(batch, delay) => self.backoff_wait(batch, delay),
                State::ShuttingDown(pending) => self.shutting_down(pending),
                State::Stopped => {
                    self.buffer.mark_stopped();
                    return;
                }
            };
        }
    }

    fn idle(&self) -> State {
        match self.buffer.wait_for_work(self.flush_interval) {
            Wakeup::Shutdown => State::ShuttingDown(Vec::new()),
            Wakeup::Empty => State::Idle,
            Wakeup::Batch(batch) => State::Flushing(batch),
        }
    }

    fn flushing(&mut self, batch: Vec<Event>) -> State {
        match self.transport.deliver(&batch) {
            Ok(()) => {
                self.backoff.on_success();
                debug!(count = batch.len(), "delivered batch");
                State::Idle
            }
            Err(err) if !err.is_retryable() => {
                // Retrying a rejected payload cannot succeed; spill now
                warn!(%err, count = batch.len(), "non-retryable delivery failure, spilling");
                self.report(err.into());
                self.spill(batch);
                State::Idle
            }
            Err(err) => {
                let delay = self.backoff.on_failure();
                self.report(err.into());
                if self.backoff.should_spill_to_disk() {
                    warn!(count = batch.len(), "retry budget exhausted, spilling batch");
                    self.spill(batch);
                    self.backoff.reset();
                    State::Idle
                } else {
                    debug!(delay_ms = delay.as_millis() as u64, "delivery failed, backing off");
                    State::Backoff(batch, delay)
                }
            }
        }
    }

    fn backoff_wait(&self, batch: Vec<Event>, delay: Duration) -> State {
        if self.buffer.wait_backoff(delay) {
            State::ShuttingDown(batch)
        } else {
            State::Flushing(batch)
        }
    }

    /// Exactly one delivery attempt for everything still held; on
    /// failure the remainder goes to disk instead of being retried.
    fn shutting_down(&mut self, mut pending: Vec<Event>) -> State {
        pending.extend(self.buffer.drain_remaining());
        if pending.is_empty() {
            return State::Stopped;
        }

        match self.transport.deliver(&pending) {
            Ok(()) => debug!(count = pending.len(), "final flush delivered"),
            Err(err) => {
                self.report(err.into());
                self.spill(pending);
            }
        }
        State::Stopped
    }

    fn spill(&mut self, batch: Vec<Event>) {
        if let Err(err) = self.store.append(&batch) {
            warn!(%err, "disk spill failed, events dropped");
            self.report(err.into());
        }
    }

    fn report(&self, err: Error) {
        if let Some(ref on_error) = self.on_error {
            on_error(&err);
        }
    }
}
