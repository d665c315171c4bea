//! Trigger engine.
//!
//! The engine is responsible for:
//! - Firing enabled jobs when their cron schedule is due
//! - Collapsing missed occurrences into a single fire
//! - Skipping a fire while the previous one is still running
//! - Flagging overrun executions past their monitor timeout
//! - Manual triggers, pause/resume, graceful shutdown

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::{JobDefinition, JobId};
use crate::logger::{ExecutionLog, ExecutionOutcome};
use crate::scheduler::executor::HandlerExecutor;
use crate::scheduler::gate::{AlwaysGrant, DispatchGate};
use crate::store::{JobStore, JobStoreError};

/// Buffer size for the command channel between SchedulerHandle and Scheduler.
const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Cap on occurrence counting between ticks; beyond this the backlog is
/// treated as "many" and still collapsed into one fire.
const MAX_CATCHUP_OCCURRENCES: usize = 100;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Job not found in the store.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// A previous fire of the job is still running.
    #[error("job {0} already has an execution in flight")]
    AlreadyRunning(JobId),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] JobStoreError),

    /// Channel error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// State of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler is stopped.
    Stopped,
    /// Scheduler is running.
    Running,
    /// Scheduler is paused.
    Paused,
}

/// Commands that can be sent to the scheduler.
enum SchedulerCommand {
    /// Fire a job immediately, regardless of its schedule.
    Trigger {
        job_id: JobId,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Pause scheduled firing.
    Pause { response: oneshot::Sender<()> },
    /// Resume scheduled firing.
    Resume { response: oneshot::Sender<()> },
    /// Shut the scheduler down.
    Shutdown { response: oneshot::Sender<()> },
}

/// Handle for controlling a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: Arc<RwLock<SchedulerState>>,
}

impl SchedulerHandle {
    async fn send_result_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<Result<T, SchedulerError>>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                SchedulerError::Channel(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::Channel(format!("failed to receive {} response", operation))
        })?
    }

    async fn send_unit_command(
        &self,
        build_command: impl FnOnce(oneshot::Sender<()>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<(), SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                SchedulerError::Channel(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::Channel(format!("failed to receive {} response", operation))
        })?;

        Ok(())
    }

    /// Fire a job immediately.
    ///
    /// Works while paused and for disabled jobs; only an in-flight execution
    /// of the same job blocks it.
    pub async fn trigger(&self, job_id: impl Into<JobId>) -> Result<(), SchedulerError> {
        let job_id = job_id.into();
        self.send_result_command(
            |response| SchedulerCommand::Trigger { job_id, response },
            "trigger",
        )
        .await
    }

    /// Pause scheduled firing. Manual triggers still work while paused.
    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.send_unit_command(|response| SchedulerCommand::Pause { response }, "pause")
            .await
    }

    /// Resume scheduled firing after a pause.
    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.send_unit_command(|response| SchedulerCommand::Resume { response }, "resume")
            .await
    }

    /// Shut the scheduler down, waiting for in-flight executions.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.send_unit_command(
            |response| SchedulerCommand::Shutdown { response },
            "shutdown",
        )
        .await
    }

    /// Get the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Check if the scheduler is running.
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == SchedulerState::Running
    }

    /// Check if the scheduler is paused.
    pub async fn is_paused(&self) -> bool {
        *self.state.read().await == SchedulerState::Paused
    }
}

/// An execution currently being run by the engine, keyed by job.
struct InFlight {
    handle: JoinHandle<()>,
    started: tokio::time::Instant,
    monitor_timeout: Duration,
}

/// Main trigger engine.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    executor: Arc<HandlerExecutor>,
    log: Arc<dyn ExecutionLog>,
    gate: Arc<dyn DispatchGate>,
    /// Tick interval for checking schedules.
    tick_interval: Duration,
    /// Graceful shutdown timeout.
    shutdown_timeout: Duration,
    /// At most one entry per job; the no-self-overlap invariant lives here.
    in_flight: Arc<RwLock<HashMap<JobId, InFlight>>>,
}

impl Scheduler {
    /// Create a scheduler over the given store, executor and execution log.
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<HandlerExecutor>,
        log: Arc<dyn ExecutionLog>,
    ) -> Self {
        Self {
            store,
            executor,
            log,
            gate: Arc::new(AlwaysGrant),
            tick_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
            in_flight: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Set the dispatch gate.
    pub fn with_gate(mut self, gate: Arc<dyn DispatchGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start the scheduler and return a handle for controlling it.
    pub fn start(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(SchedulerState::Running));

        let handle = SchedulerHandle {
            command_tx,
            state: Arc::clone(&state),
        };

        let scheduler_task = tokio::spawn(async move {
            self.run(command_rx, state).await;
        });

        (handle, scheduler_task)
    }

    /// Main scheduler loop.
    async fn run(
        self,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        state: Arc<RwLock<SchedulerState>>,
    ) {
        let mut interval = tokio::time::interval(self.tick_interval);
        // Catch-up origin for jobs that have not fired yet; per-job origins
        // take over after the first observed fire.
        let mut origin = chrono::Utc::now();
        let mut last_fire: HashMap<JobId, chrono::DateTime<chrono::Utc>> = HashMap::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let current_state = *state.read().await;
                    if current_state == SchedulerState::Running {
                        let now = chrono::Utc::now();
                        self.check_schedules(origin, &mut last_fire, now).await;
                    }

                    self.sweep_overruns().await;
                    self.cleanup_finished().await;
                }

                Some(command) = command_rx.recv() => {
                    match command {
                        SchedulerCommand::Trigger { job_id, response } => {
                            let result = self.trigger_job(job_id).await;
                            let _ = response.send(result);
                        }
                        SchedulerCommand::Pause { response } => {
                            let mut s = state.write().await;
                            *s = SchedulerState::Paused;
                            let _ = response.send(());
                        }
                        SchedulerCommand::Resume { response } => {
                            let mut s = state.write().await;
                            *s = SchedulerState::Running;
                            // Reset the catch-up origins so occurrences during
                            // the pause are skipped rather than fired as a burst.
                            origin = chrono::Utc::now();
                            last_fire.clear();
                            tracing::info!("scheduler resumed, skipping occurrences from the pause window");
                            let _ = response.send(());
                        }
                        SchedulerCommand::Shutdown { response } => {
                            let mut s = state.write().await;
                            *s = SchedulerState::Stopped;
                            drop(s);

                            self.await_in_flight().await;

                            let _ = response.send(());
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Check all enabled definitions and fire those that are due.
    ///
    /// Due fires are computed from each job's last observed fire time (falling
    /// back to `origin` before the first fire). Occurrences since then are
    /// counted; if more than one was missed (slow tick, long pause), the job
    /// still fires only once, and a skipped fire consumes its occurrences.
    async fn check_schedules(
        &self,
        origin: chrono::DateTime<chrono::Utc>,
        last_fire: &mut HashMap<JobId, chrono::DateTime<chrono::Utc>>,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let defs = match self.store.list_enabled().await {
            Ok(defs) => defs,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list enabled jobs");
                return;
            }
        };

        for def in defs {
            let schedule = match def.schedule() {
                Ok(schedule) => schedule,
                Err(e) => {
                    tracing::warn!(job_id = %def.id, expression = %def.cron_expression, error = %e, "unparseable schedule");
                    continue;
                }
            };

            let mut occurrence_count = 0;
            let mut current_time = last_fire.get(&def.id).copied().unwrap_or(origin);

            while occurrence_count < MAX_CATCHUP_OCCURRENCES {
                match schedule.next_fire_after(current_time) {
                    Ok(next) if next <= now => {
                        occurrence_count += 1;
                        current_time = next;
                    }
                    _ => break,
                }
            }

            if occurrence_count == 0 {
                continue;
            }

            // Advance even when the fire is skipped below; occurrences are
            // consumed, not deferred.
            last_fire.insert(def.id, current_time);

            if occurrence_count > 1 {
                tracing::warn!(
                    job_id = %def.id,
                    missed_occurrences = occurrence_count,
                    "multiple occurrences missed, firing once"
                );
            } else {
                tracing::debug!(job_id = %def.id, fire_time = %current_time, "schedule due");
            }

            if self.in_flight.read().await.contains_key(&def.id) {
                tracing::debug!(job_id = %def.id, "previous execution still running, skipping fire");
                continue;
            }

            if !self.gate.grant(&def, current_time).await {
                tracing::debug!(job_id = %def.id, "fire denied by dispatch gate");
                continue;
            }

            if let Err(e) = self.dispatch(def).await {
                tracing::warn!(error = %e, "failed to dispatch scheduled fire");
            }
        }
    }

    /// Fire a job immediately (manual trigger).
    async fn trigger_job(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let def = self.store.get(job_id).await.map_err(|e| match e {
            JobStoreError::NotFound(id) => SchedulerError::JobNotFound(id),
            other => SchedulerError::Store(other),
        })?;

        tracing::info!(job_id = %job_id, handler = %def.handler_name, "manual trigger");
        self.dispatch(def).await
    }

    /// Spawn one fire of `def` on the executor, tracking it as in flight.
    async fn dispatch(&self, def: JobDefinition) -> Result<(), SchedulerError> {
        let mut in_flight = self.in_flight.write().await;
        if let Some(existing) = in_flight.get(&def.id) {
            if !existing.handle.is_finished() {
                return Err(SchedulerError::AlreadyRunning(def.id));
            }
        }

        let job_id = def.id;
        let monitor_timeout = def.monitor_timeout;
        let executor = Arc::clone(&self.executor);
        let tracking = Arc::clone(&self.in_flight);

        let handle = tokio::spawn(async move {
            let report = executor.execute(&def).await;
            if report.success {
                tracing::info!(
                    job_id = %report.job_id,
                    attempts = report.attempts,
                    duration_ms = report.duration.as_millis() as u64,
                    "fire succeeded"
                );
            } else {
                tracing::warn!(
                    job_id = %report.job_id,
                    attempts = report.attempts,
                    error = report.error.as_deref().unwrap_or(""),
                    "fire failed"
                );
            }
            tracking.write().await.remove(&job_id);
        });

        in_flight.insert(
            job_id,
            InFlight {
                handle,
                started: tokio::time::Instant::now(),
                monitor_timeout,
            },
        );

        Ok(())
    }

    /// Flag executions that have overrun their monitor timeout.
    ///
    /// The handler task is not cancelled; its row is terminally flagged as
    /// `Timeout` and the job is released for its next fire. If the handler
    /// eventually returns, its completion is dropped by the execution log.
    async fn sweep_overruns(&self) {
        let mut overrun = Vec::new();
        {
            let in_flight = self.in_flight.read().await;
            for (job_id, entry) in in_flight.iter() {
                if entry.handle.is_finished() {
                    continue;
                }
                let elapsed = entry.started.elapsed();
                if elapsed > entry.monitor_timeout {
                    overrun.push((*job_id, elapsed));
                }
            }
        }

        for (job_id, elapsed) in overrun {
            tracing::warn!(
                job_id = %job_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "execution overran monitor timeout"
            );

            match self.log.list_for_job(job_id).await {
                Ok(rows) => {
                    for row in rows.iter().filter(|r| !r.status.is_terminal()) {
                        if let Err(e) = self
                            .log
                            .complete(row.id, ExecutionOutcome::timeout(elapsed))
                            .await
                        {
                            tracing::warn!(job_id = %job_id, execution_id = %row.id, error = %e, "failed to flag overrun row");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "failed to list rows for overrun sweep");
                }
            }

            self.in_flight.write().await.remove(&job_id);
        }
    }

    /// Drop bookkeeping for executions whose task has finished.
    async fn cleanup_finished(&self) {
        let mut in_flight = self.in_flight.write().await;
        in_flight.retain(|_, entry| !entry.handle.is_finished());
    }

    /// Wait for in-flight executions to finish, bounded by the shutdown timeout.
    async fn await_in_flight(&self) {
        let in_flight_count = self.in_flight.read().await.len();

        if in_flight_count == 0 {
            tracing::info!("no in-flight executions to wait for during shutdown");
            return;
        }

        tracing::info!(
            "graceful shutdown: waiting for {} in-flight execution(s) (timeout: {:?})",
            in_flight_count,
            self.shutdown_timeout
        );

        let start = tokio::time::Instant::now();
        let deadline = start + self.shutdown_timeout;

        loop {
            let mut in_flight = self.in_flight.write().await;
            in_flight.retain(|_, entry| !entry.handle.is_finished());
            let remaining = in_flight.len();
            drop(in_flight);

            if remaining == 0 {
                tracing::info!("all in-flight executions finished in {:?}", start.elapsed());
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    "shutdown timeout ({:?}) exceeded with {} execution(s) still running",
                    self.shutdown_timeout,
                    remaining
                );
                break;
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
