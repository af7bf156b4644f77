//! Background dispatch loop.
//!
//! A single worker thread drains the per-machine queues round-robin: each
//! tick takes one command from every non-empty queue, hands it to the
//! executor, then sleeps on a stop channel until the next poll.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use world_runtime::Command;
use world_schema::ActionOutcome;

use crate::error::WorldError;
use crate::queue::CommandQueues;

/// Runs one dequeued command against the world.
pub trait CommandExecutor: Send + Sync {
    /// `generation` names the queue the command came from. Executors reject
    /// the command once that queue has been removed or replaced.
    fn execute(&self, command: &Command, generation: u64) -> Result<ActionOutcome, WorldError>;
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub dequeued: usize,
    pub executed: usize,
    pub failed: usize,
    pub panicked: usize,
}

/// Lifetime counters, shared between the worker and observers.
#[derive(Debug, Default)]
pub struct DispatchCounters {
    ticks: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub ticks: u64,
    pub executed: u64,
    pub failed: u64,
    pub panicked: u64,
}

impl DispatchCounters {
    fn record(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.executed
            .fetch_add(report.executed as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.panicked
            .fetch_add(report.panicked as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Take at most one command from every queue and execute it. Failures and
/// panics are logged and counted; neither interrupts the tick.
pub fn run_tick(
    queues: &CommandQueues,
    executor: &dyn CommandExecutor,
    counters: &DispatchCounters,
) -> TickReport {
    let mut report = TickReport::default();
    for (machine_id, handle) in queues.snapshot() {
        let Some(command) = handle.try_pop() else {
            continue;
        };
        report.dequeued += 1;

        let generation = handle.generation();
        match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&command, generation))) {
            Ok(Ok(outcome)) => {
                report.executed += 1;
                debug!(
                    target: "grid_world::dispatch",
                    machine_id = %machine_id,
                    action = command.action.name(),
                    ?outcome,
                    "command.executed"
                );
            }
            Ok(Err(err)) => {
                report.failed += 1;
                warn!(
                    target: "grid_world::dispatch",
                    machine_id = %machine_id,
                    action = command.action.name(),
                    error = %err,
                    "command.rejected"
                );
            }
            Err(payload) => {
                report.panicked += 1;
                error!(
                    target: "grid_world::dispatch",
                    machine_id = %machine_id,
                    action = command.action.name(),
                    panic = panic_message(payload.as_ref()),
                    "command.panicked"
                );
            }
        }
    }
    counters.record(&report);
    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

struct Worker {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Owns the worker thread lifecycle. Dropping the loop stops the worker.
pub struct DispatchLoop {
    queues: Arc<CommandQueues>,
    executor: Arc<dyn CommandExecutor>,
    counters: Arc<DispatchCounters>,
    poll_interval: Duration,
    shutdown_timeout: Duration,
    worker: Option<Worker>,
}

impl DispatchLoop {
    pub fn new(
        queues: Arc<CommandQueues>,
        executor: Arc<dyn CommandExecutor>,
        poll_interval: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            queues,
            executor,
            counters: Arc::new(DispatchCounters::default()),
            poll_interval,
            shutdown_timeout,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(false, |worker| !worker.handle.is_finished())
    }

    /// Spawn the worker. Returns `false` if a worker is still running
    /// (including one whose stop timed out) or the thread could not be
    /// spawned.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        // Reap a worker that exited on its own.
        if let Some(stale) = self.worker.take() {
            let _ = stale.handle.join();
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let queues = Arc::clone(&self.queues);
        let executor = Arc::clone(&self.executor);
        let counters = Arc::clone(&self.counters);
        let poll_interval = self.poll_interval;

        let spawned = thread::Builder::new()
            .name("grid-world-dispatch".to_string())
            .spawn(move || {
                loop {
                    run_tick(&queues, executor.as_ref(), &counters);
                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                info!(
                    target: "grid_world::dispatch",
                    poll_ms = poll_interval.as_millis() as u64,
                    "dispatch.started"
                );
                self.worker = Some(Worker {
                    stop_tx,
                    done_rx,
                    handle,
                });
                true
            }
            Err(err) => {
                error!(
                    target: "grid_world::dispatch",
                    error = %err,
                    "dispatch.spawn_failed"
                );
                false
            }
        }
    }

    /// Signal the worker and wait up to the shutdown timeout for it to exit.
    /// Queued commands stay queued. Returns `false` if no worker was running
    /// or it did not exit in time; a worker that misses the timeout is kept
    /// and still counts as running until a later `stop` or `start` reaps it.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };
        // A repeated stop finds the first signal still buffered.
        let _ = worker.stop_tx.try_send(());
        match worker.done_rx.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!(target: "grid_world::dispatch", "dispatch.worker_panicked");
                }
                info!(target: "grid_world::dispatch", "dispatch.stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    target: "grid_world::dispatch",
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "dispatch.stop_timed_out"
                );
                self.worker = Some(worker);
                false
            }
        }
    }

    /// Run one tick on the calling thread. Returns `None` while a worker
    /// thread is alive so the queues keep a single consumer.
    pub fn tick_once(&self) -> Option<TickReport> {
        if self.is_running() {
            return None;
        }
        Some(run_tick(
            &self.queues,
            self.executor.as_ref(),
            &self.counters,
        ))
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }
}

impl Drop for DispatchLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
