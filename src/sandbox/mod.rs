//! Sandbox Module
//!
//! Runs user-supplied source text against an explicit set of host bindings,
//! captures logger output with timestamps and reports one of four outcomes.
//! Engines plug in through [`ScriptEngine`]; the boa-backed JavaScript engine
//! is available behind the `builtin-sandbox-js` feature.

pub mod preview;
pub mod runner;

pub use preview::preview_source;
pub use runner::{RunnerConfig, RunnerStats, SandboxJob, SandboxRunner, WORKER_LOST_MESSAGE};
pub use seedforge_types::{
    Binding, BindingSet, CompiledScript, ExecutionReport, LogEntry, LogLevel, LogSink, Outcome,
    OutcomeKind, SandboxError, ScriptEngine,
};
