//! # Authoritative Loop Scheduler
//!
//! The simulation runs on exactly one thread. Background workers (store
//! queries, socket reads, pollers) never touch simulation state directly;
//! they push closures onto a bounded channel and the loop drains the channel
//! once per tick. Task failures are logged on the loop, never re-thrown.

use crate::error::{CoreError, CoreResult};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// The surface the authoritative loop exposes to scheduled tasks.
///
/// This is the only way bridge code mutates simulation-visible state.
pub trait SimHost {
    /// Executes one console command line in the simulation.
    fn dispatch_command(&mut self, line: &str) -> CoreResult<()>;

    /// Broadcasts a message to every active session.
    fn broadcast(&mut self, message: &str);

    /// Sends a message to one session, if it is active.
    fn message_session(&mut self, identity: &str, message: &str);

    /// Makes a session visible to simulation logic. Callers must finish any
    /// pre-admission work (profile load, presence) before scheduling this.
    fn admit_session(&mut self, _identity: &str, _display_name: &str) {}

    /// Removes a session from simulation visibility.
    fn end_session(&mut self, _identity: &str) {}
}

/// A unit of work handed to the authoritative loop.
pub type LoopTask = Box<dyn FnOnce(&mut dyn SimHost) + Send>;

/// Cloneable handle for scheduling work onto the authoritative loop.
#[derive(Clone)]
pub struct LoopHandle {
    tx: Sender<LoopTask>,
}

impl LoopHandle {
    /// Schedules a task. Fails if the loop is gone or saturated; the caller
    /// decides whether that is fatal (it usually is not).
    pub fn schedule(&self, task: LoopTask) -> CoreResult<()> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(CoreError::LoopSaturated),
            Err(TrySendError::Disconnected(_)) => Err(CoreError::LoopClosed),
        }
    }

    /// Convenience wrapper around [`LoopHandle::schedule`] for closures.
    pub fn schedule_fn<F>(&self, f: F) -> CoreResult<()>
    where
        F: FnOnce(&mut dyn SimHost) + Send + 'static,
    {
        self.schedule(Box::new(f))
    }

    /// Schedules a console command for execution on the loop.
    ///
    /// Execution failure is logged there, not surfaced here: by the time the
    /// loop runs the command the scheduling caller has moved on.
    pub fn run_command(&self, line: String) -> CoreResult<()> {
        self.schedule_fn(move |host| {
            tracing::info!(command = %line, "executing relayed command");
            if let Err(e) = host.dispatch_command(&line) {
                tracing::warn!(command = %line, error = %e, "relayed command failed");
            }
        })
    }

    /// Schedules a broadcast to all sessions.
    pub fn broadcast(&self, message: String) -> CoreResult<()> {
        self.schedule_fn(move |host| host.broadcast(&message))
    }

    /// Schedules a message to a single session.
    pub fn message_session(&self, identity: String, message: String) -> CoreResult<()> {
        self.schedule_fn(move |host| host.message_session(&identity, &message))
    }
}

/// The receiving half, owned by the thread that runs the simulation tick.
pub struct AuthoritativeLoop {
    rx: Receiver<LoopTask>,
}

impl AuthoritativeLoop {
    /// Creates a handle/loop pair with the given channel capacity.
    #[must_use]
    pub fn channel(capacity: usize) -> (LoopHandle, Self) {
        let (tx, rx) = bounded(capacity);
        (LoopHandle { tx }, Self { rx })
    }

    /// Runs every queued task. Called once per simulation tick.
    ///
    /// Returns the number of tasks executed.
    pub fn drain(&self, host: &mut dyn SimHost) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(host);
            ran += 1;
        }
        ran
    }

    /// Sleep-driven tick loop: drains tasks at the given interval until the
    /// stop flag is raised. The loop thread itself never blocks on I/O; the
    /// only wait here is the tick sleep.
    pub fn run(&self, host: &mut dyn SimHost, tick: Duration, stop: &AtomicBool) {
        let mut next_tick = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now < next_tick {
                std::thread::sleep(next_tick - now);
            }
            next_tick += tick;
            self.drain(host);
        }
        // Final drain so already-accepted tasks still run.
        self.drain(host);
    }
}
