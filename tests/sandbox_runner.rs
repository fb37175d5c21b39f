#![cfg(feature = "builtin-sandbox-js")]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Value};

use seedforge::planner::{plan, render_seed_function, Lookback, PlannerOptions, SeedRequest};
use seedforge::sandbox::{RunnerConfig, SandboxJob, SandboxRunner};
use seedforge::{Binding, BindingSet, JsEngineConfig, LogLevel, Outcome, Period};

fn runner() -> SandboxRunner {
    SandboxRunner::with_builtin_js(JsEngineConfig::default(), RunnerConfig::default())
}

fn logger_only() -> BindingSet {
    BindingSet::new().with("logger", Binding::Logger)
}

fn messages(report: &seedforge::ExecutionReport) -> Vec<(LogLevel, String)> {
    report
        .logs
        .iter()
        .map(|e| (e.level, e.message.clone()))
        .collect()
}

#[tokio::test]
async fn test_completed_records_logs_and_result() {
    let job = SandboxJob::new("logger.info('hi'); return 42;").with_bindings(logger_only());
    let report = runner().run(job).await;

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(messages(&report), vec![(LogLevel::Info, "hi".to_string())]);
    let result = report.result.expect("result recorded");
    assert_eq!(result.value.as_f64(), Some(42.0));
}

#[tokio::test]
async fn test_infinite_loop_times_out_with_partial_logs() {
    let job = SandboxJob::new("logger.info('spinning'); while (true) {}")
        .with_bindings(logger_only())
        .with_timeout(Duration::from_millis(50));
    let report = runner().run(job).await;

    assert_eq!(report.outcome, Outcome::TimedOut);
    assert_eq!(report.outcome.message(), Some("execution timed out"));
    assert_eq!(messages(&report), vec![(LogLevel::Info, "spinning".to_string())]);
    assert!(report.elapsed_ms >= 50);
    assert!(report.elapsed_ms < 5_000);
}

#[tokio::test]
async fn test_thrown_error_is_runtime_error_with_earlier_logs() {
    let job = SandboxJob::new("logger.warn('about to fail'); throw new Error('boom');")
        .with_bindings(logger_only());
    let report = runner().run(job).await;

    match &report.outcome {
        Outcome::RuntimeError(msg) => assert!(msg.contains("boom"), "{msg}"),
        other => panic!("Expected RuntimeError, got: {:?}", other),
    }
    assert_eq!(messages(&report), vec![(LogLevel::Warn, "about to fail".to_string())]);
    assert!(report.result.is_none());
}

#[tokio::test]
async fn test_unbalanced_braces_is_syntax_error_without_logs() {
    let job = SandboxJob::new("logger.info('never'); function broken( {").with_bindings(logger_only());
    let report = runner().run(job).await;

    assert!(matches!(report.outcome, Outcome::SyntaxError(_)), "{:?}", report.outcome);
    assert!(report.logs.is_empty());
}

#[tokio::test]
async fn test_source_cannot_close_its_function_early() {
    let job = SandboxJob::new("}); logger.info('outside'); throw new Error('boom'); (function(){")
        .with_bindings(logger_only());
    let report = runner().run(job).await;

    match &report.outcome {
        Outcome::SyntaxError(msg) => assert!(!msg.contains("boom"), "{msg}"),
        other => panic!("Expected SyntaxError, got: {:?}", other),
    }
    assert!(report.logs.is_empty());
}

#[tokio::test]
async fn test_loop_outside_function_body_cannot_dodge_timeout() {
    let job = SandboxJob::new("}); while (true) {} (function(){")
        .with_bindings(logger_only())
        .with_timeout(Duration::from_millis(50));
    let report = tokio::time::timeout(Duration::from_secs(3), runner().run(job))
        .await
        .expect("job settles within its timeout");

    assert!(matches!(report.outcome, Outcome::SyntaxError(_)), "{:?}", report.outcome);
}

#[tokio::test]
async fn test_only_bindings_and_intrinsics_are_visible() {
    let source = r#"
        return {
            logger: typeof logger,
            json: typeof JSON,
            globalThis: typeof globalThis,
            eval: typeof eval,
            query: typeof query,
        };
    "#;
    let report = runner()
        .run(SandboxJob::new(source).with_bindings(logger_only()))
        .await;
    assert_eq!(
        report.result.map(|r| r.value),
        Some(json!({
            "logger": "object",
            "json": "object",
            "globalThis": "undefined",
            "eval": "undefined",
            "query": "undefined",
        }))
    );
}

#[tokio::test]
async fn test_concurrent_jobs_do_not_share_logs() {
    let runner = Arc::new(runner());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move {
                let source = format!("for (var n = 0; n < 3; n++) {{ logger.info('job {i}'); }} return {i};");
                runner.run(SandboxJob::new(source).with_bindings(logger_only())).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let report = handle.await.unwrap();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.logs.len(), 3);
        assert!(report.logs.iter().all(|e| e.message == format!("job {i}")));
        assert_eq!(report.result.unwrap().value.as_f64(), Some(i as f64));
    }

    let stats = runner.stats().await;
    assert_eq!(stats.total_jobs, 8);
    assert_eq!(stats.completed, 8);
}

#[tokio::test]
async fn test_rendered_seed_function_matches_planner() {
    let now = NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    for (period, lookback) in [
        (Period::Month, Lookback::months(2)),
        (Period::Week, Lookback::new(45, Period::Day)),
        (Period::Day, Lookback::new(3, Period::Day)),
        (Period::Year, Lookback::new(2, Period::Year)),
        (Period::Month, Lookback::new(-1, Period::Month)),
    ] {
        let request = SeedRequest::new("https://api.example.com/items", period)
            .with_lookback(lookback)
            .with_param("limit", "100")
            .with_param("q", "a b&c")
            .with_param("start", "ignored");
        let expected = plan(&request, now).unwrap();

        let source = format!(
            "{}\nreturn getSeeds();",
            render_seed_function(&request, &PlannerOptions::default()).unwrap()
        );
        let report = runner()
            .run(SandboxJob::new(source).with_bindings(BindingSet::standard(Some(now))))
            .await;

        assert_eq!(report.outcome, Outcome::Completed, "{period} / {lookback}");
        let got: Vec<String> = match report.result.map(|r| r.value) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            other => panic!("Expected an array of seeds, got: {:?}", other),
        };
        assert_eq!(got, expected, "{period} / {lookback}");
    }
}

#[tokio::test]
async fn test_preview_of_rendered_function() {
    let now = NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let request = SeedRequest::new("https://api.example.com/items", Period::Month)
        .with_lookback(Lookback::months(2))
        .with_param("limit", "100");
    let source = render_seed_function(&request, &PlannerOptions::default()).unwrap();

    let report = runner()
        .preview_seeds(&source, BindingSet::standard(Some(now)), None)
        .await;
    assert_eq!(report.outcome, Outcome::Completed);
    let lines: Vec<_> = report.logs.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        lines,
        vec![
            "Found 3 seeds:",
            "[1] https://api.example.com/items?limit=100&start=2024/01/15&end=2024/01/31",
            "[2] https://api.example.com/items?limit=100&start=2024/02/01&end=2024/02/29",
            "[3] https://api.example.com/items?limit=100&start=2024/03/01&end=2024/03/15",
        ]
    );
}

#[tokio::test]
async fn test_transcript_shape() {
    let job = SandboxJob::new("logger.info('hi'); logger.error('bad'); return 'done';")
        .with_bindings(logger_only());
    let lines = runner().run(job).await.render_lines();

    let stamp = r"^\[\d{2}:\d{2}:\d{2}\.\d{3}\] ";
    let expected = [
        format!("{stamp}hi$"),
        format!("{stamp}❌ Error: bad$"),
        format!("{stamp}Result: done$"),
        format!("{stamp}✅ Execution completed successfully$"),
    ];
    assert_eq!(lines.len(), expected.len());
    for (line, pattern) in lines.iter().zip(expected) {
        assert!(Regex::new(&pattern).unwrap().is_match(line), "{line:?} !~ {pattern}");
    }
}

#[tokio::test]
async fn test_loop_limit_is_runtime_error() {
    let runner = SandboxRunner::with_builtin_js(
        JsEngineConfig {
            max_loop_iterations: Some(10_000),
            ..JsEngineConfig::default()
        },
        RunnerConfig::default(),
    );
    let report = runner.run(SandboxJob::new("while (true) {}")).await;
    assert!(matches!(report.outcome, Outcome::RuntimeError(_)), "{:?}", report.outcome);
}
