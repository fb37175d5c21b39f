use std::sync::Arc;

use chrono::{NaiveDateTime, Weekday};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::report::{LogEntry, LogLevel};

// ================================
// Errors
// ================================

/// Errors crossing the engine seam.
///
/// The runner folds these into an [`Outcome`](crate::Outcome); they never
/// reach the host as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Invalid binding '{name}': {reason}")]
    InvalidBinding { name: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SandboxError {
    /// Message without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            SandboxError::Syntax(msg) | SandboxError::Runtime(msg) | SandboxError::Internal(msg) => {
                msg.clone()
            }
            SandboxError::InvalidBinding { name, reason } => {
                format!("invalid binding '{name}': {reason}")
            }
        }
    }
}

// ================================
// Bindings
// ================================

/// A host value injected into the executed source under a fixed name.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Console-like object: `log`, `info`, `debug`, `warn`, `error`.
    Logger,
    /// Date helpers working on epoch milliseconds. `now` pins the clock.
    Calendar {
        now: Option<NaiveDateTime>,
        week_start: Weekday,
    },
    /// Query-string encoder (`encode(object, reservedKeys?)`).
    Query,
    /// Plain data converted to an engine value.
    Value(Value),
}

impl Binding {
    pub fn calendar(now: Option<NaiveDateTime>) -> Self {
        Binding::Calendar {
            now,
            week_start: Weekday::Sun,
        }
    }
}

/// Ordered allow-list of identifiers visible to sandboxed source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingSet {
    entries: IndexMap<String, Binding>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `console` and `logger` loggers, a `calendar` pinned to `now` when
    /// given, and the `query` encoder.
    pub fn standard(now: Option<NaiveDateTime>) -> Self {
        Self::new()
            .with("console", Binding::Logger)
            .with("logger", Binding::Logger)
            .with("calendar", Binding::calendar(now))
            .with("query", Binding::Query)
    }

    pub fn with(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.insert(name, binding);
        self
    }

    /// Insert or replace a binding. Replacing keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) -> Option<Binding> {
        self.entries.insert(name.into(), binding)
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every name is a plain identifier usable as a parameter name.
    pub fn validate(&self) -> Result<(), SandboxError> {
        for name in self.entries.keys() {
            if !is_identifier(name) {
                return Err(SandboxError::InvalidBinding {
                    name: name.clone(),
                    reason: "not a valid identifier".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

// ================================
// Log sink / settlement guard
// ================================

#[derive(Debug, Default)]
struct SinkState {
    sealed: bool,
    entries: Vec<LogEntry>,
}

/// Shared output buffer of one job.
///
/// Records are accepted until the first [`seal`](LogSink::seal); the first
/// sealer takes the entries, later seals get `None` and later records are
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    state: Arc<Mutex<SinkState>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns `false` if the job has already settled.
    pub fn record(&self, level: LogLevel, message: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if state.sealed {
            return false;
        }
        state.entries.push(LogEntry::new(level, message));
        true
    }

    pub fn seal(&self) -> Option<Vec<LogEntry>> {
        let mut state = self.state.lock();
        if state.sealed {
            return None;
        }
        state.sealed = true;
        Some(std::mem::take(&mut state.entries))
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ================================
// Engine seam
// ================================

/// Compile-and-invoke interface implemented by script engines.
///
/// `compile` and `invoke` are called on the same worker thread, so compiled
/// units need not be `Send`.
pub trait ScriptEngine: Send + Sync {
    /// Engine identifier used in logs.
    fn name(&self) -> &'static str;

    /// Compile `source` as a function body whose parameters are the binding
    /// names. Logger bindings write into `sink`.
    ///
    /// # Errors
    /// `SandboxError::Syntax` when the source does not parse.
    fn compile(
        &self,
        source: &str,
        bindings: &BindingSet,
        sink: LogSink,
    ) -> Result<Box<dyn CompiledScript>, SandboxError>;
}

/// A compiled unit ready to run once.
pub trait CompiledScript {
    /// Run the unit. `Ok(None)` means it returned nothing worth recording.
    fn invoke(self: Box<Self>) -> Result<Option<Value>, SandboxError>;
}
