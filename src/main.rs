use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;

use seedforge::cli::{Cli, Commands, PlanArgs, RunArgs};
use seedforge::sandbox::{SandboxJob, SandboxRunner};
use seedforge::{load_config, Binding, BindingSet, SeedPlanner, SeedforgeConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config.as_deref().map(load_config).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .init();
    if let Some(path) = &cli.config {
        tracing::debug!(path = %path.display(), "using config file");
    }

    match dispatch(&cli, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// `Ok(false)` when a sandbox run did not complete.
async fn dispatch(cli: &Cli, config: &SeedforgeConfig) -> anyhow::Result<bool> {
    match &cli.command {
        Commands::Plan(args) => plan(args, cli.json, config),
        Commands::Render(args) => render(args, config),
        Commands::Run(args) => run(args, cli.json, config).await,
    }
}

fn plan(args: &PlanArgs, json: bool, config: &SeedforgeConfig) -> anyhow::Result<bool> {
    let planner = SeedPlanner::new(config.planner.clone());
    let now = args
        .now
        .unwrap_or_else(|| chrono::Local::now().naive_local());
    let seeds = planner.plan(&args.to_request(), now)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&seeds)?);
    } else {
        for seed in &seeds {
            println!("{seed}");
        }
    }
    Ok(true)
}

fn render(args: &PlanArgs, config: &SeedforgeConfig) -> anyhow::Result<bool> {
    let planner = SeedPlanner::new(config.planner.clone());
    print!("{}", planner.render(&args.to_request())?);
    Ok(true)
}

async fn run(args: &RunArgs, json: bool, config: &SeedforgeConfig) -> anyhow::Result<bool> {
    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let runner = SandboxRunner::with_builtin_js(
        config.sandbox.js_engine_config(),
        config.sandbox.runner.clone(),
    );
    let mut bindings = BindingSet::standard(args.now);
    bindings.insert(
        "calendar",
        Binding::Calendar {
            now: args.now,
            week_start: config.planner.week_start,
        },
    );
    let timeout = args.timeout_ms.map(Duration::from_millis);

    let report = if args.preview {
        runner.preview_seeds(&source, bindings, timeout).await
    } else {
        let mut job = SandboxJob::new(source).with_bindings(bindings);
        if let Some(timeout) = timeout {
            job = job.with_timeout(timeout);
        }
        runner.run(job).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report.render_lines() {
            println!("{line}");
        }
    }
    Ok(report.outcome.is_completed())
}
