use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed message carried by [`Outcome::TimedOut`].
pub const TIMEOUT_MESSAGE: &str = "execution timed out";

/// Current wall-clock time truncated to millisecond precision.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// ================================
// Log entries
// ================================

/// Severity tag of a captured log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line emitted by the injected logger binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp_now(),
            level,
            message: message.into(),
        }
    }
}

/// Non-empty value returned by a completed invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResult {
    pub timestamp: DateTime<Utc>,
    pub value: Value,
}

// ================================
// Outcome
// ================================

/// Terminal state of a sandbox job. There are no others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    RuntimeError(String),
    SyntaxError(String),
    TimedOut,
}

/// Payload-free discriminant of [`Outcome`], for picking an icon or exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Completed,
    RuntimeError,
    SyntaxError,
    TimedOut,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Completed => OutcomeKind::Completed,
            Outcome::RuntimeError(_) => OutcomeKind::RuntimeError,
            Outcome::SyntaxError(_) => OutcomeKind::SyntaxError,
            Outcome::TimedOut => OutcomeKind::TimedOut,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    /// Human-readable failure message; `None` for [`Outcome::Completed`].
    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Completed => None,
            Outcome::RuntimeError(msg) | Outcome::SyntaxError(msg) => Some(msg),
            Outcome::TimedOut => Some(TIMEOUT_MESSAGE),
        }
    }
}

// ================================
// Report
// ================================

/// Everything a sandbox job produced, finalized once at settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Logger output in call order, preserved for every outcome.
    pub logs: Vec<LogEntry>,
    /// Return value of a completed invocation, if non-empty.
    pub result: Option<RecordedResult>,
    pub outcome: Outcome,
    /// Wall time from job start to settlement.
    pub elapsed_ms: u64,
    pub settled_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Render the report as the console transcript shown to the user.
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .logs
            .iter()
            .map(|entry| {
                let prefix = match entry.level {
                    LogLevel::Info => "",
                    LogLevel::Warn => "⚠️ Warning: ",
                    LogLevel::Error => "❌ Error: ",
                };
                format!("[{}] {}{}", clock(&entry.timestamp), prefix, entry.message)
            })
            .collect();

        if let Some(result) = &self.result {
            let shown = match &result.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("[{}] Result: {}", clock(&result.timestamp), shown));
        }

        let terminal = match &self.outcome {
            Outcome::Completed => "✅ Execution completed successfully".to_string(),
            Outcome::RuntimeError(msg) => format!("❌ Execution failed: {msg}"),
            Outcome::SyntaxError(msg) => format!("❌ Syntax error: {msg}"),
            Outcome::TimedOut => "⏱️ Execution timed out".to_string(),
        };
        lines.push(format!("[{}] {}", clock(&self.settled_at), terminal));
        lines
    }
}

fn clock(ts: &DateTime<Utc>) -> String {
    ts.format("%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed(ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
            + chrono::TimeDelta::milliseconds(i64::from(ms))
    }

    fn report(outcome: Outcome) -> ExecutionReport {
        ExecutionReport {
            logs: vec![
                LogEntry { timestamp: fixed(1), level: LogLevel::Info, message: "hello".into() },
                LogEntry { timestamp: fixed(2), level: LogLevel::Warn, message: "careful".into() },
                LogEntry { timestamp: fixed(3), level: LogLevel::Error, message: "bad".into() },
            ],
            result: None,
            outcome,
            elapsed_ms: 4,
            settled_at: fixed(4),
        }
    }

    #[test]
    fn test_render_prefixes_and_terminal_line() {
        let lines = report(Outcome::Completed).render_lines();
        assert_eq!(
            lines,
            vec![
                "[09:30:00.001] hello",
                "[09:30:00.002] ⚠️ Warning: careful",
                "[09:30:00.003] ❌ Error: bad",
                "[09:30:00.004] ✅ Execution completed successfully",
            ]
        );
    }

    #[test]
    fn test_render_result_line() {
        let mut r = report(Outcome::Completed);
        r.result = Some(RecordedResult { timestamp: fixed(3), value: serde_json::json!(42) });
        let lines = r.render_lines();
        assert_eq!(lines[3], "[09:30:00.003] Result: 42");
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(Outcome::Completed.message(), None);
        assert_eq!(Outcome::TimedOut.message(), Some(TIMEOUT_MESSAGE));
        assert_eq!(Outcome::SyntaxError("x".into()).kind(), OutcomeKind::SyntaxError);
        let last = report(Outcome::RuntimeError("boom".into())).render_lines().pop().unwrap();
        assert!(last.ends_with("❌ Execution failed: boom"));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(Outcome::RuntimeError("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "runtime_error", "message": "boom" }));
        let json = serde_json::to_value(Outcome::TimedOut).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "timed_out" }));
    }

    #[test]
    fn test_timestamp_now_has_millisecond_precision() {
        let ts = timestamp_now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
