//! Execution counters shared by every clone of an engine.
//!
//! ```text
//! run_simple ──▶ record_command(kind, error_kind, status, elapsed)
//! pipeline   ──▶ record_pipeline(status)
//! for/while  ──▶ record_loop(iterations)
//! execute    ──▶ record_script(elapsed)
//! ```
//!
//! Counters are relaxed atomics: a snapshot taken while scripts run may mix
//! counts from slightly different moments, but each counter is exact.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::ErrorKind;
use crate::interpreter::CommandKind;

#[derive(Debug)]
pub struct ExecutionMetrics {
    commands: AtomicU64,
    failures: AtomicU64,
    cancelled: AtomicU64,
    command_nanos: AtomicU64,
    by_kind: [AtomicU64; CommandKind::ALL.len()],
    errors: [AtomicU64; ErrorKind::ALL.len()],
    pipelines: AtomicU64,
    pipeline_failures: AtomicU64,
    loops: AtomicU64,
    loop_iterations: AtomicU64,
    scripts: AtomicU64,
    script_nanos: AtomicU64,
    since: Mutex<Instant>,
}

/// Point-in-time copy of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub commands: u64,
    pub successes: u64,
    pub failures: u64,
    pub cancelled: u64,
    /// Percentage of commands that exited 0; 0 before anything ran.
    pub success_rate: f64,
    /// Commands per resolved kind. Names that resolved nowhere are counted
    /// under `errors.command_not_found` instead.
    pub by_kind: BTreeMap<&'static str, u64>,
    /// Engine-level failures per error kind. Plain non-zero exits are not
    /// errors.
    pub errors: BTreeMap<&'static str, u64>,
    pub pipelines: u64,
    pub pipeline_failures: u64,
    pub loops: u64,
    pub loop_iterations: u64,
    pub scripts: u64,
    #[serde(with = "millis")]
    pub total_elapsed: Duration,
    #[serde(with = "millis")]
    pub average_command: Duration,
    #[serde(with = "millis")]
    pub uptime: Duration,
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            commands: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            command_nanos: AtomicU64::new(0),
            by_kind: std::array::from_fn(|_| AtomicU64::new(0)),
            errors: std::array::from_fn(|_| AtomicU64::new(0)),
            pipelines: AtomicU64::new(0),
            pipeline_failures: AtomicU64::new(0),
            loops: AtomicU64::new(0),
            loop_iterations: AtomicU64::new(0),
            scripts: AtomicU64::new(0),
            script_nanos: AtomicU64::new(0),
            since: Mutex::new(Instant::now()),
        }
    }

    /// One simple command finished with `status`.
    pub fn record_command(
        &self,
        kind: Option<CommandKind>,
        error: Option<ErrorKind>,
        status: i32,
        elapsed: Duration,
    ) {
        self.commands.fetch_add(1, Ordering::Relaxed);
        self.command_nanos.fetch_add(nanos(elapsed), Ordering::Relaxed);
        if status != 0 {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(kind) = kind {
            self.by_kind[kind as usize].fetch_add(1, Ordering::Relaxed);
        }
        if let Some(error) = error {
            self.errors[error as usize].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A command was interrupted by cancellation.
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        self.errors[ErrorKind::Cancelled as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// A multi-stage pipeline finished with `status`.
    pub fn record_pipeline(&self, status: i32) {
        self.pipelines.fetch_add(1, Ordering::Relaxed);
        if status != 0 {
            self.pipeline_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_loop(&self, iterations: u64) {
        self.loops.fetch_add(1, Ordering::Relaxed);
        self.loop_iterations.fetch_add(iterations, Ordering::Relaxed);
    }

    /// One `execute` or `execute_command` call finished.
    pub fn record_script(&self, elapsed: Duration) {
        self.scripts.fetch_add(1, Ordering::Relaxed);
        self.script_nanos.fetch_add(nanos(elapsed), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let commands = self.commands.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed).min(commands);
        let successes = commands - failures;
        let success_rate = if commands == 0 {
            0.0
        } else {
            successes as f64 / commands as f64 * 100.0
        };
        let average_command = match commands {
            0 => Duration::ZERO,
            n => Duration::from_nanos(self.command_nanos.load(Ordering::Relaxed) / n),
        };
        let since = *self.since.lock().unwrap_or_else(PoisonError::into_inner);

        MetricsSnapshot {
            commands,
            successes,
            failures,
            cancelled: self.cancelled.load(Ordering::Relaxed),
            success_rate,
            by_kind: CommandKind::ALL
                .iter()
                .map(|k| (k.as_str(), self.by_kind[*k as usize].load(Ordering::Relaxed)))
                .filter(|(_, n)| *n > 0)
                .collect(),
            errors: ErrorKind::ALL
                .iter()
                .map(|k| (k.as_str(), self.errors[*k as usize].load(Ordering::Relaxed)))
                .filter(|(_, n)| *n > 0)
                .collect(),
            pipelines: self.pipelines.load(Ordering::Relaxed),
            pipeline_failures: self.pipeline_failures.load(Ordering::Relaxed),
            loops: self.loops.load(Ordering::Relaxed),
            loop_iterations: self.loop_iterations.load(Ordering::Relaxed),
            scripts: self.scripts.load(Ordering::Relaxed),
            total_elapsed: Duration::from_nanos(self.script_nanos.load(Ordering::Relaxed)),
            average_command,
            uptime: since.elapsed(),
        }
    }

    /// Zero every counter and restart the uptime clock.
    pub fn reset(&self) {
        let counters = [
            &self.commands,
            &self.failures,
            &self.cancelled,
            &self.command_nanos,
            &self.pipelines,
            &self.pipeline_failures,
            &self.loops,
            &self.loop_iterations,
            &self.scripts,
            &self.script_nanos,
        ];
        for counter in counters.into_iter().chain(&self.by_kind).chain(&self.errors) {
            counter.store(0, Ordering::Relaxed);
        }
        *self.since.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
