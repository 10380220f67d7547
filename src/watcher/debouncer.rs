//! Change debouncing with single-flight sync cycles.
//!
//! [`DebounceMachine`] is the pure state machine:
//!
//! ```text
//! Idle ──event──▶ Pending(deadline) ──event──▶ Pending(now + window)
//!                      │
//!                 deadline passes
//!                      ▼
//!                  Running ──event──▶ Running (dirty)
//!                      │
//!                  cycle done ──dirty──▶ Pending(now + window)
//!                      └──────clean──▶ Idle
//! ```
//!
//! [`ChangeDebouncer`] drives it from a tokio task. The task holds at most
//! one running cycle, so cycles never overlap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::sync::SyncReport;
use crate::Result;

/// Queued change signals beyond this are redundant and dropped.
const EVENT_CAPACITY: usize = 256;

/// Runs one reconciliation cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    async fn run_cycle(&self) -> Result<SyncReport>;
}

/// Externally visible debouncer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceState {
    Idle,
    Pending,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Pending { deadline: Instant },
    Running { dirty: bool },
}

/// Pure debounce state machine over a monotonic clock.
#[derive(Debug, Clone)]
pub struct DebounceMachine {
    window: Duration,
    phase: Phase,
}

impl DebounceMachine {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            phase: Phase::Idle,
        }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub const fn state(&self) -> DebounceState {
        match self.phase {
            Phase::Idle => DebounceState::Idle,
            Phase::Pending { .. } => DebounceState::Pending,
            Phase::Running { .. } => DebounceState::Running,
        }
    }

    /// When the pending cycle is due. `None` unless pending.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Pending { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Record a change observed at `now`.
    pub fn on_event(&mut self, now: Instant) {
        self.phase = match self.phase {
            Phase::Idle | Phase::Pending { .. } => Phase::Pending {
                deadline: now + self.window,
            },
            Phase::Running { .. } => Phase::Running { dirty: true },
        };
    }

    /// Start the cycle if the deadline has passed. Returns true when the
    /// caller must run a cycle now.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Pending { deadline } if now >= deadline => {
                self.phase = Phase::Running { dirty: false };
                true
            }
            _ => false,
        }
    }

    /// Record that the running cycle finished, successfully or not.
    pub fn on_cycle_complete(&mut self, now: Instant) {
        if let Phase::Running { dirty } = self.phase {
            self.phase = if dirty {
                Phase::Pending {
                    deadline: now + self.window,
                }
            } else {
                Phase::Idle
            };
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed { report: SyncReport },
    Failed { error: String },
}

/// Snapshot of the debouncer for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebouncerStatus {
    pub state: DebounceState,
    pub events_received: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_outcome: Option<CycleOutcome>,
}

impl Default for DebouncerStatus {
    fn default() -> Self {
        Self {
            state: DebounceState::Idle,
            events_received: 0,
            cycles_completed: 0,
            cycles_failed: 0,
            last_outcome: None,
        }
    }
}

/// Cloneable handle to a running debouncer.
#[derive(Clone)]
pub struct DebouncerHandle {
    event_tx: mpsc::Sender<()>,
    status_rx: watch::Receiver<DebouncerStatus>,
    outcome_tx: broadcast::Sender<CycleOutcome>,
    driver: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DebouncerHandle {
    /// Signal a change. Never blocks, so it is safe to call from the
    /// filesystem notification thread.
    ///
    /// Returns false once the debouncer has shut down.
    pub fn notify(&self) -> bool {
        match self.event_tx.try_send(()) {
            // A queued signal already guarantees a cycle.
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    /// Current state and counters.
    #[must_use]
    pub fn status(&self) -> DebouncerStatus {
        self.status_rx.borrow().clone()
    }

    /// Receive the outcome of every later cycle.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CycleOutcome> {
        self.outcome_tx.subscribe()
    }

    /// Wait for the driver task to exit after cancellation.
    pub async fn join(&self) {
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::error!(error = %e, "Debouncer task failed");
            }
        }
    }
}

impl std::fmt::Debug for DebouncerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncerHandle")
            .field("status", &*self.status_rx.borrow())
            .finish_non_exhaustive()
    }
}

/// Spawns the debounce driver.
pub struct ChangeDebouncer;

impl ChangeDebouncer {
    /// Start a debouncer that runs `runner` after `window` of quiet.
    ///
    /// Cancelling `cancel` stops the driver; a cycle in progress is
    /// awaited, never aborted. Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(
        runner: Arc<dyn CycleRunner>,
        window: Duration,
        cancel: CancellationToken,
    ) -> DebouncerHandle {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (status_tx, status_rx) = watch::channel(DebouncerStatus::default());
        let (outcome_tx, _) = broadcast::channel(16);

        let driver = Driver {
            runner,
            machine: DebounceMachine::new(window),
            status: DebouncerStatus::default(),
            status_tx,
            outcome_tx: outcome_tx.clone(),
        };
        let task = tokio::spawn(driver.run(event_rx, cancel));

        DebouncerHandle {
            event_tx,
            status_rx,
            outcome_tx,
            driver: Arc::new(Mutex::new(Some(task))),
        }
    }
}

struct Driver {
    runner: Arc<dyn CycleRunner>,
    machine: DebounceMachine,
    status: DebouncerStatus,
    status_tx: watch::Sender<DebouncerStatus>,
    outcome_tx: broadcast::Sender<CycleOutcome>,
}

type CycleTask = JoinHandle<Result<SyncReport>>;

impl Driver {
    async fn run(mut self, mut event_rx: mpsc::Receiver<()>, cancel: CancellationToken) {
        let mut running: Option<CycleTask> = None;

        tracing::debug!(window = ?self.machine.window(), "Debouncer started");

        loop {
            let deadline = self.machine.deadline();

            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                joined = async {
                    match running.as_mut() {
                        Some(task) => task.await,
                        None => std::future::pending().await,
                    }
                }, if running.is_some() => {
                    running = None;
                    self.finish(joined);
                }

                event = event_rx.recv() => {
                    let Some(()) = event else { break };
                    self.machine.on_event(Instant::now());
                    self.status.events_received += 1;
                    self.publish();
                }

                () = async {
                    if let Some(deadline) = deadline {
                        tokio::time::sleep_until(deadline).await;
                    }
                }, if deadline.is_some() => {
                    if self.machine.poll(Instant::now()) {
                        let runner = Arc::clone(&self.runner);
                        running = Some(tokio::spawn(async move { runner.run_cycle().await }));
                        self.publish();
                    }
                }
            }
        }

        if let Some(task) = running.take() {
            tracing::info!("Waiting for running sync cycle before shutdown");
            let joined = task.await;
            self.finish(joined);
        }

        tracing::debug!("Debouncer stopped");
    }

    fn finish(&mut self, joined: std::result::Result<Result<SyncReport>, tokio::task::JoinError>) {
        self.machine.on_cycle_complete(Instant::now());

        let outcome = match joined {
            Ok(Ok(report)) => {
                self.status.cycles_completed += 1;
                CycleOutcome::Completed { report }
            }
            Ok(Err(e)) => {
                self.status.cycles_failed += 1;
                CycleOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                self.status.cycles_failed += 1;
                let error = SyncError::Task(e.to_string());
                tracing::error!(error = %error, "Sync cycle task failed");
                CycleOutcome::Failed {
                    error: error.to_string(),
                }
            }
        };

        if self.machine.state() == DebounceState::Pending {
            tracing::debug!("Changes arrived during cycle, rescheduling");
        }

        self.status.last_outcome = Some(outcome.clone());
        self.publish();
        let _ = self.outcome_tx.send(outcome);
    }

    fn publish(&mut self) {
        self.status.state = self.machine.state();
        self.status_tx.send_replace(self.status.clone());
    }
}
