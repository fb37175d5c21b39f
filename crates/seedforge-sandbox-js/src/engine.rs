//! JavaScript [`ScriptEngine`] backed by boa_engine.
//!
//! Source text is compiled with the `Function` constructor as the body of a
//! function whose parameters are the binding names. Before compiling, every global that is not an allowed
//! ECMAScript intrinsic is removed, so the bindings are the only host
//! identifiers the source can reach.

use boa_engine::{Context, JsError, JsObject, JsString, JsValue, Source};
use serde_json::Value;

use seedforge_types::{BindingSet, CompiledScript, LogSink, SandboxError, ScriptEngine};

use crate::builtins::{self, SinkGuard};

/// JavaScript engine configuration
#[derive(Clone, Debug)]
pub struct JsEngineConfig {
    /// Intrinsics left on the global object
    pub allowed_intrinsics: Vec<String>,

    /// Abort loops after this many iterations (runtime error)
    pub max_loop_iterations: Option<u64>,

    /// Abort on deeper recursion (runtime error)
    pub max_recursion_depth: Option<usize>,
}

impl Default for JsEngineConfig {
    fn default() -> Self {
        Self {
            allowed_intrinsics: vec![
                "undefined".into(),
                "NaN".into(),
                "Infinity".into(),
                "JSON".into(),
                "Math".into(),
                "parseInt".into(),
                "parseFloat".into(),
                "isNaN".into(),
                "isFinite".into(),
                "Number".into(),
                "String".into(),
                "Boolean".into(),
                "Array".into(),
                "Object".into(),
                "Map".into(),
                "Set".into(),
                "Symbol".into(),
                "Error".into(),
                "TypeError".into(),
                "RangeError".into(),
                "SyntaxError".into(),
                "ReferenceError".into(),
                "encodeURIComponent".into(),
                "decodeURIComponent".into(),
                "encodeURI".into(),
                "decodeURI".into(),
                "RegExp".into(),
                "Date".into(),
            ],
            max_loop_iterations: None,
            max_recursion_depth: None,
        }
    }
}

/// boa_engine implementation of [`ScriptEngine`]
#[derive(Clone, Debug, Default)]
pub struct JsEngine {
    config: JsEngineConfig,
}

impl JsEngine {
    pub fn new(config: JsEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JsEngineConfig {
        &self.config
    }

    fn new_context(&self) -> Result<Context, SandboxError> {
        let mut context = Context::default();
        if let Some(limit) = self.config.max_loop_iterations {
            context.runtime_limits_mut().set_loop_iteration_limit(limit);
        }
        if let Some(depth) = self.config.max_recursion_depth {
            context.runtime_limits_mut().set_recursion_limit(depth);
        }

        let allowed_list = self
            .config
            .allowed_intrinsics
            .iter()
            .map(|name| format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(",");
        let strip_globals = format!(
            r#"
(function () {{
    var allowed = new Set([{allowed_list}]);
    var global = globalThis;
    Object.getOwnPropertyNames(global).forEach(function (key) {{
        if (!allowed.has(key)) {{
            try {{ delete global[key]; }} catch (e) {{ global[key] = undefined; }}
        }}
    }});
}})();
"#
        );
        context
            .eval(Source::from_bytes(&strip_globals))
            .map_err(|e| SandboxError::Internal(format!("Failed to restrict globals: {e}")))?;
        Ok(context)
    }
}

impl ScriptEngine for JsEngine {
    fn name(&self) -> &'static str {
        "boa-js"
    }

    fn compile(
        &self,
        source: &str,
        bindings: &BindingSet,
        sink: LogSink,
    ) -> Result<Box<dyn CompiledScript>, SandboxError> {
        bindings.validate()?;
        let mut context = self.new_context()?;

        let params = bindings.names().collect::<Vec<_>>().join(", ");

        // The intrinsic constructor survives the global strip; it parses the
        // body on its own, so source cannot close the function early.
        let function_ctor = context.intrinsics().constructors().function().constructor();
        let ctor_args = bindings
            .names()
            .chain(std::iter::once(source))
            .map(|text| JsValue::from(JsString::from(text)))
            .collect::<Vec<_>>();
        let function = function_ctor
            .construct(&ctor_args, None, &mut context)
            .map_err(|e| SandboxError::Syntax(error_message(&e, &mut context)))?;

        let mut args = Vec::with_capacity(bindings.len());
        for (name, binding) in bindings.iter() {
            let value = builtins::binding_value(binding, &mut context).map_err(|e| {
                SandboxError::InvalidBinding {
                    name: name.to_string(),
                    reason: error_message(&e, &mut context),
                }
            })?;
            args.push(value);
        }

        tracing::debug!(engine = self.name(), bindings = %params, "compiled sandbox source");

        Ok(Box::new(JsCompiledScript {
            context,
            function,
            args,
            _sink: SinkGuard::install(sink),
        }))
    }
}

struct JsCompiledScript {
    context: Context,
    function: JsObject,
    args: Vec<JsValue>,
    _sink: SinkGuard,
}

impl CompiledScript for JsCompiledScript {
    fn invoke(self: Box<Self>) -> Result<Option<Value>, SandboxError> {
        let JsCompiledScript {
            mut context,
            function,
            args,
            _sink,
        } = *self;
        let value = function
            .call(&JsValue::undefined(), &args, &mut context)
            .map_err(|e| SandboxError::Runtime(error_message(&e, &mut context)))?;
        Ok(recorded_value(&value, &mut context))
    }
}

/// Message of a thrown value: thrown strings verbatim, errors as
/// `Kind: message`.
fn error_message(err: &JsError, context: &mut Context) -> String {
    if let Some(thrown) = err.as_opaque() {
        if let Some(s) = thrown.as_string() {
            return s.to_std_string_escaped();
        }
    }
    match err.try_native(context) {
        Ok(native) => native.to_string(),
        Err(_) => err.to_string(),
    }
}

/// `undefined`, `null` and `""` are not recorded.
fn recorded_value(value: &JsValue, context: &mut Context) -> Option<Value> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    if let Some(s) = value.as_string() {
        let s = s.to_std_string_escaped();
        return (!s.is_empty()).then_some(Value::String(s));
    }
    if value.is_callable() {
        return Some(Value::String(builtins::format_arg(value, context)));
    }
    match value.to_json(context) {
        Ok(json) => Some(json),
        Err(_) => Some(Value::String(builtins::format_arg(value, context))),
    }
}

// ================================
// Tests
// ================================

#[cfg(test)]
mod tests {
    use super::*;
    use seedforge_types::{Binding, LogLevel};
    use serde_json::json;

    fn run(source: &str, bindings: &BindingSet) -> (Result<Option<Value>, SandboxError>, LogSink) {
        let sink = LogSink::new();
        let engine = JsEngine::default();
        let result = engine
            .compile(source, bindings, sink.clone())
            .and_then(|compiled| compiled.invoke());
        (result, sink)
    }

    fn logs(sink: &LogSink) -> Vec<(LogLevel, String)> {
        sink.seal()
            .unwrap()
            .into_iter()
            .map(|e| (e.level, e.message))
            .collect()
    }

    #[test]
    fn test_return_value_and_logger() {
        let bindings = BindingSet::new().with("logger", Binding::Logger);
        let (result, sink) = run("logger.info('hi'); return 42;", &bindings);
        assert_eq!(result.unwrap().and_then(|v| v.as_f64()), Some(42.0));
        assert_eq!(logs(&sink), vec![(LogLevel::Info, "hi".to_string())]);
    }

    #[test]
    fn test_logger_levels_and_argument_joining() {
        let bindings = BindingSet::new().with("console", Binding::Logger);
        let (result, sink) = run(
            r#"
            console.log("a", 1, true);
            console.debug({ k: [1, 2] });
            console.warn("careful");
            console.error(new TypeError("bad type"));
            "#,
            &bindings,
        );
        assert_eq!(result.unwrap(), None);
        assert_eq!(
            logs(&sink),
            vec![
                (LogLevel::Info, "a 1 true".to_string()),
                (LogLevel::Info, r#"{"k":[1,2]}"#.to_string()),
                (LogLevel::Warn, "careful".to_string()),
                (LogLevel::Error, "TypeError: bad type".to_string()),
            ]
        );
    }

    #[test]
    fn test_syntax_error_is_reported_at_compile() {
        let sink = LogSink::new();
        let engine = JsEngine::default();
        let result = engine.compile("function main( { return 1; ", &BindingSet::new(), sink);
        assert!(matches!(result, Err(SandboxError::Syntax(_))));
    }

    #[test]
    fn test_source_cannot_close_the_function_body() {
        let bindings = BindingSet::new().with("logger", Binding::Logger);
        let sink = LogSink::new();
        let result = JsEngine::default().compile(
            "}); logger.info('escaped'); throw new Error('boom'); (function(){",
            &bindings,
            sink.clone(),
        );
        match result {
            Err(SandboxError::Syntax(msg)) => assert!(!msg.contains("boom"), "{msg}"),
            Err(other) => panic!("Expected Syntax error, got: {:?}", other),
            Ok(_) => panic!("Expected Syntax error, got a compiled unit"),
        }
        assert!(logs(&sink).is_empty());
    }

    #[test]
    fn test_compile_runs_no_user_code() {
        let bindings = BindingSet::new().with("logger", Binding::Logger);
        let sink = LogSink::new();
        let compiled = JsEngine::default()
            .compile("logger.info('ran'); return 1;", &bindings, sink.clone())
            .unwrap();
        assert!(sink.is_empty());
        assert_eq!(compiled.invoke().unwrap().and_then(|v| v.as_f64()), Some(1.0));
        assert_eq!(logs(&sink), vec![(LogLevel::Info, "ran".to_string())]);
    }

    #[test]
    fn test_thrown_error_message() {
        let (result, _) = run("throw new Error('boom');", &BindingSet::new());
        match result {
            Err(SandboxError::Runtime(msg)) => assert!(msg.contains("boom"), "{msg}"),
            other => panic!("Expected Runtime error, got: {:?}", other),
        }
        let (result, _) = run("throw 'plain';", &BindingSet::new());
        assert_eq!(result, Err(SandboxError::Runtime("plain".to_string())));
    }

    #[test]
    fn test_non_allowed_globals_are_removed() {
        let (result, _) = run(
            "return [typeof JSON, typeof Math, typeof globalThis, typeof eval, typeof Reflect];",
            &BindingSet::new(),
        );
        assert_eq!(
            result.unwrap(),
            Some(json!(["object", "object", "undefined", "undefined", "undefined"]))
        );
    }

    #[test]
    fn test_value_binding() {
        let bindings = BindingSet::new().with("input", Binding::Value(json!({ "a": 10, "b": [1, 2] })));
        let (result, _) = run("return input.a + input.b.length;", &bindings);
        assert_eq!(result.unwrap().and_then(|v| v.as_f64()), Some(12.0));
    }

    #[test]
    fn test_empty_results_not_recorded() {
        for source in ["return;", "return null;", "return '';"] {
            let (result, _) = run(source, &BindingSet::new());
            assert_eq!(result.unwrap(), None, "{source}");
        }
        let (result, _) = run("return 'x';", &BindingSet::new());
        assert_eq!(result.unwrap(), Some(json!("x")));
    }

    #[test]
    fn test_calendar_binding_pinned_now() {
        let now = chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let bindings = BindingSet::new().with("calendar", Binding::calendar(Some(now)));
        let (result, _) = run(
            r#"
            var now = calendar.now();
            var start = calendar.subtract(now, 2, 'month');
            return [
                calendar.format(start),
                calendar.format(calendar.endOf(start, 'month')),
                calendar.format(calendar.startOf(calendar.add(start, 1, 'month'), 'month'), '%Y-%m-%d'),
                calendar.format(calendar.parse('2024-02-29'))
            ];
            "#,
            &bindings,
        );
        assert_eq!(
            result.unwrap(),
            Some(json!(["2024/01/15", "2024/01/31", "2024-02-01", "2024/02/29"]))
        );
    }

    #[test]
    fn test_calendar_rejects_unknown_period() {
        let bindings = BindingSet::new().with("calendar", Binding::calendar(None));
        let (result, _) = run("return calendar.add(calendar.now(), 1, 'fortnight');", &bindings);
        match result {
            Err(SandboxError::Runtime(msg)) => assert!(msg.contains("fortnight"), "{msg}"),
            other => panic!("Expected Runtime error, got: {:?}", other),
        }
    }

    #[test]
    fn test_query_binding() {
        let bindings = BindingSet::new().with("query", Binding::Query);
        let (result, _) = run(
            "return query.encode({ limit: '100', q: 'a b', start: 'x' }, ['start']);",
            &bindings,
        );
        assert_eq!(result.unwrap(), Some(json!("limit=100&q=a+b")));
    }

    #[test]
    fn test_invalid_binding_name() {
        let sink = LogSink::new();
        let bindings = BindingSet::new().with("bad name", Binding::Logger);
        let result = JsEngine::default().compile("return 1;", &bindings, sink);
        assert!(matches!(result, Err(SandboxError::InvalidBinding { .. })));
    }

    #[test]
    fn test_loop_iteration_limit() {
        let engine = JsEngine::new(JsEngineConfig {
            max_loop_iterations: Some(1_000),
            ..JsEngineConfig::default()
        });
        let result = engine
            .compile("while (true) {}", &BindingSet::new(), LogSink::new())
            .and_then(|compiled| compiled.invoke());
        assert!(matches!(result, Err(SandboxError::Runtime(_))));
    }
}
