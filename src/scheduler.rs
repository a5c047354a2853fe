use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::retry::RetryPolicy;
use crate::tasks::ScrapeTask;
use crate::traits::{RunLogEntry, RunLogStore};
use crate::types::RunStatus;

/// Runtime snapshot of one registered task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusSnapshot {
    pub name: String,
    pub interval_secs: u64,
    pub enabled: bool,
    pub running: bool,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
    pub last_status: Option<RunStatus>,
    pub last_duration_ms: Option<u64>,
    pub skipped_ticks: u64,
    pub last_skipped_at: Option<String>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Result of asking the scheduler to run a task right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    Fired,
    /// The previous invocation is still running; nothing was queued.
    Skipped,
    Disabled,
    Unknown,
}

#[derive(Debug, Default)]
struct Telemetry {
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    last_status: Option<RunStatus>,
    last_duration_ms: Option<u64>,
    skipped_ticks: u64,
    last_skipped_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

struct TaskEntry {
    task: Arc<dyn ScrapeTask>,
    cadence: Duration,
    retry: RetryPolicy,
    /// Single-flight guard: `true` while an invocation is in flight.
    running: AtomicBool,
    enabled: AtomicBool,
    telemetry: Mutex<Telemetry>,
}

impl TaskEntry {
    fn name(&self) -> &'static str {
        self.task.name()
    }

    fn telemetry(&self) -> std::sync::MutexGuard<'_, Telemetry> {
        self.telemetry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_skip(&self) {
        let mut t = self.telemetry();
        t.skipped_ticks += 1;
        t.last_skipped_at = Some(Utc::now());
    }

    fn record_start(&self) {
        self.telemetry().last_run = Some(Utc::now());
    }

    fn record_finish(&self, status: RunStatus, message: &str, duration_ms: u64) {
        let mut t = self.telemetry();
        t.last_status = Some(status);
        t.last_duration_ms = Some(duration_ms);
        if status == RunStatus::Error {
            t.consecutive_failures += 1;
            t.last_error = Some(message.to_string());
        } else {
            t.consecutive_failures = 0;
            t.last_error = None;
        }
    }

    fn snapshot(&self) -> TaskStatusSnapshot {
        let t = self.telemetry();
        TaskStatusSnapshot {
            name: self.name().to_string(),
            interval_secs: self.cadence.as_secs(),
            enabled: self.enabled.load(Ordering::Acquire),
            running: self.running.load(Ordering::Acquire),
            last_run: t.last_run.map(|d| d.to_rfc3339()),
            next_run: t.next_run.map(|d| d.to_rfc3339()),
            last_status: t.last_status,
            last_duration_ms: t.last_duration_ms,
            skipped_ticks: t.skipped_ticks,
            last_skipped_at: t.last_skipped_at.map(|d| d.to_rfc3339()),
            consecutive_failures: t.consecutive_failures,
            last_error: t.last_error.clone(),
        }
    }
}

/// Holds a task's single-flight flag for the lifetime of one invocation.
/// Dropping it (including while unwinding) returns the task to idle.
struct RunGuard {
    entry: Arc<TaskEntry>,
}

impl RunGuard {
    fn acquire(entry: &Arc<TaskEntry>) -> Option<Self> {
        entry
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                entry: entry.clone(),
            })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.entry.running.store(false, Ordering::Release);
    }
}

/// Drives every registered task on its own fixed cadence.
///
/// A tick that finds the task's previous invocation still running is dropped
/// and counted in `skipped_ticks`; ticks never queue. Different tasks run
/// concurrently. `stop` halts ticking and waits for in-flight invocations.
pub struct Scheduler {
    entries: Vec<Arc<TaskEntry>>,
    run_log: Arc<dyn RunLogStore>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl Scheduler {
    pub fn new(run_log: Arc<dyn RunLogStore>) -> Self {
        Self {
            entries: Vec::new(),
            run_log,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn register(
        &mut self,
        task: Arc<dyn ScrapeTask>,
        cadence: Duration,
        retry: RetryPolicy,
        enabled: bool,
    ) {
        info!(
            task = task.name(),
            interval_secs = cadence.as_secs(),
            enabled,
            "Registered task"
        );
        self.entries.push(Arc::new(TaskEntry {
            task,
            cadence,
            retry,
            running: AtomicBool::new(false),
            enabled: AtomicBool::new(enabled),
            telemetry: Mutex::new(Telemetry::default()),
        }));
    }

    /// Spawn one tick loop per task. The first tick of each fires immediately.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Scheduler already started");
            return;
        }
        for entry in &self.entries {
            let entry = entry.clone();
            let run_log = self.run_log.clone();
            let cancel = self.cancel.clone();
            let tracker = self.tracker.clone();
            self.tracker.spawn(async move {
                let mut ticker = tokio::time::interval(entry.cadence.max(Duration::from_millis(1)));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    entry.telemetry().next_run = chrono::Duration::from_std(entry.cadence)
                        .ok()
                        .map(|d| Utc::now() + d);
                    fire(&entry, &run_log, &tracker);
                }
                debug!(task = entry.name(), "Tick loop stopped");
            });
        }
        info!(tasks = self.entries.len(), "Scheduler started");
    }

    /// Stop issuing ticks, then wait for every in-flight invocation to finish
    /// on its own.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        let in_flight = self
            .entries
            .iter()
            .filter(|e| e.running.load(Ordering::Acquire))
            .count();
        if in_flight > 0 {
            info!(in_flight, "Waiting for running tasks to finish");
        }
        self.tracker.wait().await;
        info!("Scheduler stopped");
    }

    /// Run a task now under its single-flight guard without waiting for it.
    pub fn trigger(&self, name: &str) -> TriggerResult {
        match self.find(name) {
            Some(entry) => fire(entry, &self.run_log, &self.tracker),
            None => TriggerResult::Unknown,
        }
    }

    /// Run a task inline and return its run-log entry. Ignores the enabled flag.
    pub async fn run_once(&self, name: &str) -> anyhow::Result<RunLogEntry> {
        let entry = self
            .find(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown task '{}'", name))?;
        let guard = RunGuard::acquire(entry)
            .ok_or_else(|| anyhow::anyhow!("Task '{}' is already running", name))?;
        entry.record_start();
        Ok(execute(guard, self.run_log.clone()).await)
    }

    /// Returns `false` for an unknown task name.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.find(name) {
            Some(entry) => {
                entry.enabled.store(enabled, Ordering::Release);
                info!(task = name, enabled, "Task enabled flag changed");
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> Vec<TaskStatusSnapshot> {
        self.entries.iter().map(|e| e.snapshot()).collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<TaskEntry>> {
        self.entries.iter().find(|e| e.name() == name)
    }
}

fn fire(entry: &Arc<TaskEntry>, run_log: &Arc<dyn RunLogStore>, tracker: &TaskTracker) -> TriggerResult {
    if !entry.enabled.load(Ordering::Acquire) {
        debug!(task = entry.name(), "Task disabled; tick ignored");
        return TriggerResult::Disabled;
    }
    let Some(guard) = RunGuard::acquire(entry) else {
        entry.record_skip();
        warn!(task = entry.name(), "Previous run still in progress; tick skipped");
        return TriggerResult::Skipped;
    };
    entry.record_start();
    tracker.spawn(execute(guard, run_log.clone()));
    TriggerResult::Fired
}

/// One retry-wrapped invocation. Panics are caught and logged as errors; the
/// guard is released when this returns.
async fn execute(guard: RunGuard, run_log: Arc<dyn RunLogStore>) -> RunLogEntry {
    let entry = guard.entry.clone();
    let name = entry.name();
    let started = Instant::now();
    info!(task = name, "Task started");

    let attempt_loop = entry.retry.run(name, |_| entry.task.execute());
    let result = AssertUnwindSafe(attempt_loop).catch_unwind().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let (status, message) = match result {
        Ok(Ok(outcome)) => (outcome.status(), outcome.message),
        Ok(Err(e)) => (RunStatus::Error, format!("{:#}", e)),
        Err(_) => (RunStatus::Error, "Task panicked".to_string()),
    };
    entry.record_finish(status, &message, elapsed_ms);
    drop(guard);

    match status {
        RunStatus::Error => error!(task = name, elapsed_ms, error = %message, "Task failed"),
        RunStatus::Warning => warn!(task = name, elapsed_ms, message = %message, "Task finished with warnings"),
        RunStatus::Success => info!(task = name, elapsed_ms, message = %message, "Task finished"),
    }

    let log = RunLogEntry {
        task_name: name.to_string(),
        status,
        message,
        execution_time_ms: elapsed_ms,
        timestamp: Utc::now(),
    };
    if let Err(e) = run_log.append_run_log(&log).await {
        error!(task = name, error = %e, "Failed to append run log");
    }
    log
}
