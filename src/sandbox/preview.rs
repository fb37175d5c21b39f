//! "Run code" harness for seed functions: calls `getSeeds()` and logs what
//! it returned.

use std::time::Duration;

use seedforge_types::{Binding, BindingSet, ExecutionReport};

use super::runner::{SandboxJob, SandboxRunner};

const PREVIEW_EPILOGUE: &str = r#"
const __seeds = getSeeds();
if (Array.isArray(__seeds)) {
    console.log(`Found ${__seeds.length} seeds:`);
    __seeds.forEach((seed, index) => console.log(`[${index + 1}] ${seed}`));
} else {
    console.warn("getSeeds() did not return an array");
}
return __seeds;
"#;

/// Append the preview epilogue to a source declaring `getSeeds()`.
pub fn preview_source(source: &str) -> String {
    format!("{source}\n;{PREVIEW_EPILOGUE}")
}

impl SandboxRunner {
    /// Run a `getSeeds()` declaration and log each seed it returns.
    ///
    /// A `console` logger is added when `bindings` has none, since the
    /// epilogue writes through it.
    pub async fn preview_seeds(
        &self,
        source: &str,
        mut bindings: BindingSet,
        timeout: Option<Duration>,
    ) -> ExecutionReport {
        if !bindings.contains("console") {
            bindings.insert("console", Binding::Logger);
        }
        let mut job = SandboxJob::new(preview_source(source)).with_bindings(bindings);
        if let Some(timeout) = timeout {
            job = job.with_timeout(timeout);
        }
        self.run(job).await
    }
}
