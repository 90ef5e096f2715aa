//! # Poll Scheduler
//!
//! Runs one [`SyncTask`] on a fixed delay, on its own tokio task.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            initial_delay                     period                     │
//! │  start ──────────────────► Scheduled ◄──────────────────┐               │
//! │                               │                         │               │
//! │                               │ timer fires             │ Ok            │
//! │                               ▼                         │               │
//! │                            Running ─────────────────────┘               │
//! │                               │                                         │
//! │                               │ Err(e)                                  │
//! │                               ▼                                         │
//! │                          Halted(e) ──── resume() ───► Scheduled         │
//! │                                                       (after period)    │
//! │                                                                         │
//! │  shutdown() from any state ──► Stopped                                  │
//! │  (a running cycle is dropped at its next await point)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The period is measured from the end of one cycle to the start of the
//! next, so cycles never overlap.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::task::SyncTask;

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for the next cycle.
    Scheduled,
    /// A cycle is in flight.
    Running,
    /// The last cycle failed; nothing runs until `resume()`.
    Halted(String),
    /// Shut down for good.
    Stopped,
}

impl TaskState {
    pub fn is_halted(&self) -> bool {
        matches!(self, TaskState::Halted(_))
    }
}

/// Commands accepted by the scheduler worker.
#[derive(Debug)]
enum SchedulerCommand {
    Resume,
    Shutdown,
}

/// Timing for a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub initial_delay: Duration,
    pub period: Duration,
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for observing and controlling a running scheduler.
///
/// Dropping the handle aborts the worker.
#[derive(Debug)]
pub struct SchedulerHandle {
    state_rx: watch::Receiver<TaskState>,
    cycles_rx: watch::Receiver<u64>,
    cmd_tx: mpsc::Sender<SchedulerCommand>,
    worker: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Current state.
    pub fn state(&self) -> TaskState {
        self.state_rx.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state_rx.clone()
    }

    /// Waits until the state satisfies `predicate` and returns it.
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> TaskState
    where
        F: FnMut(&TaskState) -> bool,
    {
        let mut rx = self.state_rx.clone();
        let reached = rx.wait_for(|state| predicate(state)).await.map(|state| state.clone());
        // Worker gone: report whatever it left behind.
        reached.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Number of cycles that ran to completion, failed ones included.
    pub fn cycles(&self) -> u64 {
        *self.cycles_rx.borrow()
    }

    /// Waits until at least `count` cycles have completed.
    pub async fn wait_for_cycles(&self, count: u64) -> u64 {
        let mut rx = self.cycles_rx.clone();
        let reached = rx.wait_for(|done| *done >= count).await.map(|done| *done);
        reached.unwrap_or_else(|_| *rx.borrow())
    }

    /// Leaves `Halted`; the next cycle starts one period from now.
    ///
    /// Has no effect in any other state.
    pub async fn resume(&self) -> SyncResult<()> {
        self.cmd_tx
            .send(SchedulerCommand::Resume)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// Stops the worker and waits for it to exit.
    pub async fn shutdown(&mut self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Shutdown).await;
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Scheduler worker ended abnormally");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Fixed-delay runner for one task.
pub struct PollScheduler {
    task: Box<dyn SyncTask>,
    config: ScheduleConfig,
    state_tx: watch::Sender<TaskState>,
    cycles_tx: watch::Sender<u64>,
    cmd_rx: mpsc::Receiver<SchedulerCommand>,
}

impl PollScheduler {
    /// Spawns the worker and returns its handle.
    pub fn start(task: Box<dyn SyncTask>, config: ScheduleConfig) -> SchedulerHandle {
        let (state_tx, state_rx) = watch::channel(TaskState::Scheduled);
        let (cycles_tx, cycles_rx) = watch::channel(0);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let scheduler = PollScheduler {
            task,
            config,
            state_tx,
            cycles_tx,
            cmd_rx,
        };

        let worker = tokio::spawn(scheduler.run());

        SchedulerHandle {
            state_rx,
            cycles_rx,
            cmd_tx,
            worker: Some(worker),
        }
    }

    async fn run(mut self) {
        let name = self.task.name().to_string();
        info!(
            task = %name,
            initial_delay_ms = self.config.initial_delay.as_millis() as u64,
            period_ms = self.config.period.as_millis() as u64,
            "Scheduler starting"
        );

        let mut next = Instant::now() + self.config.initial_delay;

        'outer: loop {
            self.state_tx.send_replace(TaskState::Scheduled);
            if !self.sleep_until(next).await {
                break;
            }

            self.state_tx.send_replace(TaskState::Running);
            debug!(task = %name, "Cycle starting");

            let outcome = {
                let cycle = self.task.run_cycle();
                tokio::pin!(cycle);
                loop {
                    tokio::select! {
                        result = &mut cycle => break Some(result),
                        cmd = self.cmd_rx.recv() => match cmd {
                            Some(SchedulerCommand::Resume) => continue,
                            Some(SchedulerCommand::Shutdown) | None => break None,
                        },
                    }
                }
            };

            let Some(result) = outcome else {
                info!(task = %name, "Cycle interrupted by shutdown");
                break;
            };
            self.cycles_tx.send_modify(|done| *done += 1);

            match result {
                Ok(()) => {
                    debug!(task = %name, "Cycle complete");
                }
                Err(e) => {
                    error!(task = %name, error = %e, "Cycle failed, halting scheduler");
                    self.state_tx.send_replace(TaskState::Halted(e.to_string()));

                    loop {
                        match self.cmd_rx.recv().await {
                            Some(SchedulerCommand::Resume) => {
                                info!(task = %name, "Scheduler resumed");
                                break;
                            }
                            Some(SchedulerCommand::Shutdown) | None => break 'outer,
                        }
                    }
                }
            }

            next = Instant::now() + self.config.period;
        }

        self.state_tx.send_replace(TaskState::Stopped);
        info!(task = %name, "Scheduler stopped");
    }

    /// Sleeps until `deadline`. Returns false if shut down meanwhile.
    async fn sleep_until(&mut self, deadline: Instant) -> bool {
        let timer = sleep_until(deadline);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(SchedulerCommand::Resume) => continue,
                    Some(SchedulerCommand::Shutdown) | None => return false,
                },
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
