//! # Relay Queue Poller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tether_core::LoopHandle;
use tether_store::{now_millis, LinkStore, StoreError};
use thiserror::Error;

/// Errors surfaced by a poll cycle.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The store was unavailable; the cycle is abandoned and the next
    /// interval tries again.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Polls `relay_commands` and feeds the authoritative loop.
pub struct RelayQueue {
    store: Arc<LinkStore>,
    loop_handle: LoopHandle,
    batch_size: usize,
    in_flight: AtomicBool,
}

impl RelayQueue {
    /// Creates a queue over the given store and loop handle.
    #[must_use]
    pub fn new(store: Arc<LinkStore>, loop_handle: LoopHandle, batch_size: usize) -> Self {
        Self {
            store,
            loop_handle,
            batch_size,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Runs one poll cycle: select, dispatch, mark.
    ///
    /// Returns the number of commands dispatched. Returns 0 without touching
    /// the store when another cycle is still in flight.
    pub fn poll_once(&self) -> RelayResult<usize> {
        if self.in_flight.swap(true, Ordering::Acquire) {
            tracing::debug!("previous relay poll still in flight, skipping tick");
            return Ok(0);
        }
        let result = self.poll_inner();
        self.in_flight.store(false, Ordering::Release);
        result
    }

    fn poll_inner(&self) -> RelayResult<usize> {
        let batch = self.store.pending_commands(self.batch_size)?;
        let mut dispatched = 0;

        for row in batch {
            match self.loop_handle.run_command(row.command_text.clone()) {
                Ok(()) => {
                    dispatched += 1;
                    // Consumed as soon as the loop has accepted the task;
                    // execution failure over there never un-consumes it.
                    if let Err(e) = self.store.mark_consumed(row.id, now_millis()) {
                        tracing::error!(
                            id = row.id,
                            error = %e,
                            "dispatched relay command could not be marked consumed"
                        );
                    }
                }
                Err(e) => {
                    // Loop saturated or gone. Leave the rest unconsumed so
                    // the next cycle re-selects them in the same order.
                    tracing::warn!(
                        id = row.id,
                        command = %row.command_text,
                        error = %e,
                        "relay dispatch rejected, deferring remainder of batch"
                    );
                    break;
                }
            }
        }
        Ok(dispatched)
    }
}

/// Spawns the fixed-interval poller thread.
///
/// Cycle failures are logged and the next interval tries again. Raising the
/// stop flag prevents new ticks; an in-flight cycle always completes.
pub fn spawn_poller(
    queue: Arc<RelayQueue>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("relay-poller".to_string())
        .spawn(move || {
            let slice = Duration::from_millis(50).min(interval);
            'outer: loop {
                let mut waited = Duration::ZERO;
                while waited < interval {
                    if stop.load(Ordering::Relaxed) {
                        break 'outer;
                    }
                    std::thread::sleep(slice);
                    waited += slice;
                }
                if let Err(e) = queue.poll_once() {
                    tracing::warn!(error = %e, "relay poll cycle failed");
                }
            }
        })
        .unwrap_or_else(|e| panic!("failed to spawn relay poller thread: {e}"))
}
