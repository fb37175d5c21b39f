//! # seedforge: time-windowed seed URL planning
//!
//! `seedforge` builds request URLs ("seeds") for APIs that page by date
//! range, and runs user-written seed scripts in a sandbox before they are
//! used elsewhere. It has two independent parts:
//!
//! - **Seed planning**: split `[now - lookback, now]` into day, week, month
//!   or year windows and emit one URL per window, with extra query
//!   parameters merged in front of the computed `start`/`end` dates. The
//!   same algorithm can be rendered as a `getSeeds()` script.
//! - **Sandboxed execution**: run source text against an explicit set of
//!   host bindings (`console`, `calendar`, `query`, plain values), capture
//!   timestamped logger output, and settle on exactly one of `Completed`,
//!   `RuntimeError`, `SyntaxError` or `TimedOut`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use seedforge::planner::{plan, Lookback, SeedRequest};
//! use seedforge::Period;
//!
//! let now = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let request = SeedRequest::new("https://api.example.com/items", Period::Month)
//!     .with_lookback(Lookback::months(2))
//!     .with_param("limit", "100");
//! for seed in plan(&request, now).unwrap() {
//!     println!("{seed}");
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `builtin-sandbox-js` | Bundles the JavaScript engine (boa) for the sandbox runner |

pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod sandbox;

pub use config::{load_config, parse_config, ConfigFormat, SeedforgeConfig};
pub use error::{ConfigError, PlanError, PlanResult};
pub use planner::{
    plan, render_seed_function, DateWindow, Lookback, PlannerOptions, SeedPlanner, SeedRequest,
};
pub use sandbox::{RunnerConfig, RunnerStats, SandboxJob, SandboxRunner};
pub use seedforge_types::{
    Binding, BindingSet, ExecutionReport, LogEntry, LogLevel, Outcome, OutcomeKind, Period,
};

#[cfg(feature = "builtin-sandbox-js")]
pub use seedforge_sandbox_js::{JsEngine, JsEngineConfig};
