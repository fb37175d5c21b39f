mod builtins;
pub mod engine;

pub use engine::{JsEngine, JsEngineConfig};

// Re-export boa_engine for consumers that need direct access
pub use boa_engine;
