//! Types shared between the seedforge planner, the sandbox runner and the
//! script engines plugged into it.

pub mod calendar;
pub mod query;
pub mod report;
pub mod sandbox;

pub use calendar::{Period, ParsePeriodError, DEFAULT_DATE_FORMAT};
pub use report::{
    timestamp_now, ExecutionReport, LogEntry, LogLevel, Outcome, OutcomeKind, RecordedResult,
    TIMEOUT_MESSAGE,
};
pub use sandbox::{Binding, BindingSet, CompiledScript, LogSink, SandboxError, ScriptEngine};
