use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use seedforge_types::{calendar, Period};

use crate::error::PlanError;
use crate::planner::{Lookback, SeedRequest};

#[derive(Parser, Debug)]
#[command(name = "seedforge", version, about = "Plan time-windowed seed URLs and run seed scripts")]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (.toml, .yaml, .yml or .json)")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print one seed URL per window
    Plan(PlanArgs),
    /// Print the equivalent getSeeds() script
    Render(PlanArgs),
    /// Run a script file in the sandbox
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[arg(long)]
    pub base_url: String,
    #[arg(long, value_parser = parse_period)]
    pub period: Period,
    #[arg(long, default_value = "5 months", value_parser = parse_lookback)]
    pub lookback: Lookback,
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
    #[arg(long, value_parser = parse_now, help = "Reference time (RFC 3339 or YYYY-MM-DD); defaults to the local clock")]
    pub now: Option<NaiveDateTime>,
}

impl PlanArgs {
    pub fn to_request(&self) -> SeedRequest {
        self.params.iter().fold(
            SeedRequest::new(self.base_url.clone(), self.period).with_lookback(self.lookback),
            |request, (key, value)| request.with_param(key.clone(), value.clone()),
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    pub file: PathBuf,
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    #[arg(long, help = "Call getSeeds() after the script and list its seeds")]
    pub preview: bool,
    #[arg(long, value_parser = parse_now, help = "Pin calendar.now() to this time")]
    pub now: Option<NaiveDateTime>,
}

fn parse_period(text: &str) -> Result<Period, String> {
    text.parse::<Period>()
        .map_err(|e| PlanError::from(e).to_string())
}

fn parse_lookback(text: &str) -> Result<Lookback, String> {
    text.parse::<Lookback>().map_err(|e| e.to_string())
}

/// `key=value`; the value may itself contain `=`.
pub fn parse_param(text: &str) -> Result<(String, String), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{text}'"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{text}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// RFC 3339 (converted to UTC), `YYYY-MM-DD`, `YYYY/MM/DD` or a naive
/// `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_now(text: &str) -> Result<NaiveDateTime, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.naive_utc());
    }
    calendar::parse_timestamp(text).ok_or_else(|| format!("cannot parse time '{text}'"))
}
