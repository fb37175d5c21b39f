//! Sandbox runner: executes one job per worker thread and races it against a
//! wall-clock timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{oneshot, RwLock};

use seedforge_types::{
    timestamp_now, BindingSet, ExecutionReport, LogSink, Outcome, OutcomeKind, RecordedResult,
    SandboxError, ScriptEngine,
};

/// Reported when the worker thread disappears without answering.
pub const WORKER_LOST_MESSAGE: &str = "sandbox worker terminated unexpectedly";

/// Runner configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Timeout for jobs that do not set their own
    #[serde(with = "duration_ms")]
    pub default_timeout: Duration,

    /// Sources larger than this are rejected before compiling
    pub max_source_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(10_000),
            max_source_bytes: 1024 * 1024,
        }
    }
}

/// One unit of work for [`SandboxRunner::run`].
#[derive(Clone, Debug)]
pub struct SandboxJob {
    pub source: String,
    pub bindings: BindingSet,
    /// `None` uses [`RunnerConfig::default_timeout`].
    pub timeout: Option<Duration>,
}

impl SandboxJob {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            bindings: BindingSet::new(),
            timeout: None,
        }
    }

    pub fn with_bindings(mut self, bindings: BindingSet) -> Self {
        self.bindings = bindings;
        self
    }

    /// A zero timeout is ignored.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }
}

/// Running totals across all jobs of one runner.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunnerStats {
    pub total_jobs: u64,
    pub completed: u64,
    pub runtime_errors: u64,
    pub syntax_errors: u64,
    pub timed_out: u64,
    pub avg_elapsed: Duration,
}

impl RunnerStats {
    /// Count one settled job and fold `elapsed` into the running average.
    pub fn record(&mut self, kind: OutcomeKind, elapsed: Duration) {
        self.total_jobs = self.total_jobs.saturating_add(1);
        match kind {
            OutcomeKind::Completed => self.completed += 1,
            OutcomeKind::RuntimeError => self.runtime_errors += 1,
            OutcomeKind::SyntaxError => self.syntax_errors += 1,
            OutcomeKind::TimedOut => self.timed_out += 1,
        }

        let jobs = u128::from(self.total_jobs);
        let total_ns = self.avg_elapsed.as_nanos() * (jobs - 1) + elapsed.as_nanos();
        let avg_ns = u64::try_from(total_ns / jobs).unwrap_or(u64::MAX);
        self.avg_elapsed = Duration::from_nanos(avg_ns);
    }
}

/// Runs source text against a binding set with a timeout.
///
/// Each job gets its own detached worker thread and [`LogSink`]; jobs share
/// nothing. A job that outlives its timeout keeps its thread until the code
/// returns, but nothing it logs after settlement is kept.
pub struct SandboxRunner {
    engine: Arc<dyn ScriptEngine>,
    config: RunnerConfig,
    stats: Arc<RwLock<RunnerStats>>,
    job_seq: AtomicU64,
}

impl SandboxRunner {
    pub fn new(engine: Arc<dyn ScriptEngine>, config: RunnerConfig) -> Self {
        Self {
            engine,
            config,
            stats: Arc::new(RwLock::new(RunnerStats::default())),
            job_seq: AtomicU64::new(0),
        }
    }

    /// Runner backed by the boa JavaScript engine.
    #[cfg(feature = "builtin-sandbox-js")]
    pub fn with_builtin_js(
        engine_config: seedforge_sandbox_js::JsEngineConfig,
        config: RunnerConfig,
    ) -> Self {
        Self::new(
            Arc::new(seedforge_sandbox_js::JsEngine::new(engine_config)),
            config,
        )
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub async fn stats(&self) -> RunnerStats {
        self.stats.read().await.clone()
    }

    /// Run `job` to settlement. Never fails: every problem becomes an
    /// [`Outcome`] on the report.
    pub async fn run(&self, job: SandboxJob) -> ExecutionReport {
        let started = Instant::now();
        let job_id = self.job_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let timeout = job.timeout.unwrap_or(self.config.default_timeout);
        let sink = LogSink::new();

        if job.source.len() > self.config.max_source_bytes {
            let outcome = Outcome::SyntaxError(format!(
                "source too large: {} bytes (max {})",
                job.source.len(),
                self.config.max_source_bytes
            ));
            return self.settle(job_id, &sink, outcome, None, started).await;
        }

        let (compiled_tx, compiled_rx) = oneshot::channel::<Result<(), SandboxError>>();
        let (result_tx, result_rx) = oneshot::channel::<Result<Option<Value>, SandboxError>>();
        let engine = Arc::clone(&self.engine);
        let worker_sink = sink.clone();
        let SandboxJob { source, bindings, .. } = job;

        let spawned = std::thread::Builder::new()
            .name(format!("seedforge-sandbox-{job_id}"))
            .spawn(move || {
                let compiled = match engine.compile(&source, &bindings, worker_sink) {
                    Ok(compiled) => compiled,
                    Err(e) => {
                        let _ = compiled_tx.send(Err(e));
                        return;
                    }
                };
                if compiled_tx.send(Ok(())).is_err() {
                    return;
                }
                let _ = result_tx.send(compiled.invoke());
            });
        if let Err(e) = spawned {
            let outcome = Outcome::RuntimeError(format!("failed to start sandbox worker: {e}"));
            return self.settle(job_id, &sink, outcome, None, started).await;
        }

        // The run timer starts after compiling; compiling gets its own
        // budget of the same length.
        let compiled = match tokio::time::timeout(timeout, compiled_rx).await {
            Ok(compiled) => compiled,
            Err(_) => {
                tracing::warn!(
                    job_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "sandbox compile timed out"
                );
                return self.settle(job_id, &sink, Outcome::TimedOut, None, started).await;
            }
        };
        match compiled {
            Ok(Ok(())) => {}
            Ok(Err(SandboxError::Syntax(msg))) => {
                return self
                    .settle(job_id, &sink, Outcome::SyntaxError(msg), None, started)
                    .await;
            }
            Ok(Err(e)) => {
                return self
                    .settle(job_id, &sink, Outcome::RuntimeError(e.detail()), None, started)
                    .await;
            }
            Err(_) => {
                let outcome = Outcome::RuntimeError(WORKER_LOST_MESSAGE.to_string());
                return self.settle(job_id, &sink, outcome, None, started).await;
            }
        }

        tracing::debug!(job_id, timeout_ms = timeout.as_millis() as u64, "sandbox job running");

        let (outcome, value) = tokio::select! {
            result = result_rx => match result {
                Ok(Ok(value)) => (Outcome::Completed, value),
                Ok(Err(e)) => (Outcome::RuntimeError(e.detail()), None),
                Err(_) => (Outcome::RuntimeError(WORKER_LOST_MESSAGE.to_string()), None),
            },
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(job_id, timeout_ms = timeout.as_millis() as u64, "sandbox job timed out");
                (Outcome::TimedOut, None)
            }
        };

        self.settle(job_id, &sink, outcome, value, started).await
    }

    async fn settle(
        &self,
        job_id: u64,
        sink: &LogSink,
        outcome: Outcome,
        value: Option<Value>,
        started: Instant,
    ) -> ExecutionReport {
        let logs = sink.seal().unwrap_or_default();
        let settled_at = timestamp_now();
        let elapsed = started.elapsed();
        let result = value.map(|value| RecordedResult {
            timestamp: settled_at,
            value,
        });

        self.update_stats(outcome.kind(), elapsed).await;
        tracing::debug!(
            job_id,
            outcome = ?outcome.kind(),
            logs = logs.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "sandbox job settled"
        );

        ExecutionReport {
            logs,
            result,
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
            settled_at,
        }
    }

    async fn update_stats(&self, kind: OutcomeKind, elapsed: Duration) {
        self.stats.write().await.record(kind, elapsed);
    }
}

/// `Duration` as integer milliseconds in config files.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        if millis == 0 {
            return Err(serde::de::Error::custom("timeout must be positive"));
        }
        Ok(Duration::from_millis(millis))
    }
}

// ================================
// Tests
// ================================
