//! Render the planning algorithm as a standalone `getSeeds()` script.
//!
//! The script relies on the sandbox's `calendar` and `query` bindings. Run
//! against a calendar pinned to the same "now" and week start, it returns
//! exactly the URLs [`plan_seeds`](super::plan_seeds) produces.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use super::{PlannerOptions, SeedRequest};
use crate::error::{PlanError, PlanResult};

const INDENT: &str = "    ";

/// Render `request` as JavaScript source declaring `getSeeds()`.
///
/// The first three declarations are `baseUrl`, `urlParameters` and `period`,
/// in that order, so they can be edited by hand.
pub fn render_seed_function(request: &SeedRequest, options: &PlannerOptions) -> PlanResult<String> {
    if request.base_url.trim().is_empty() {
        return Err(PlanError::InvalidBaseUrl("base URL is empty".to_string()));
    }

    let base_url = js_literal(&request.base_url)?;
    let params = pretty_json(&request.extra_params)?;
    let period = js_literal(request.period.as_str())?;
    let date_format = js_literal(&options.date_format)?;
    let lookback_unit = js_literal(request.lookback.unit.as_str())?;
    let lookback_amount = request.lookback.amount;

    let source = format!(
        r#"function getSeeds() {{
    const baseUrl = {base_url};
    const urlParameters = {params};
    const period = {period};
    const dateFormat = {date_format};

    let end = calendar.now();
    let start = calendar.subtract(end, {lookback_amount}, {lookback_unit});
    if (end < start) {{
        const swap = start;
        start = end;
        end = swap;
    }}

    const extra = query.encode(urlParameters, ["start", "end"]);
    const prefix = extra ? extra + "&" : "";
    const seeds = [];
    let current = start;
    while (current <= end) {{
        const periodEnd = Math.min(calendar.endOf(current, period), end);
        const from = calendar.format(current, dateFormat);
        const to = calendar.format(periodEnd, dateFormat);
        seeds.push(`${{baseUrl}}?${{prefix}}start=${{from}}&end=${{to}}`);
        current = calendar.startOf(calendar.add(current, 1, period), period);
    }}
    return seeds;
}}
"#
    );

    tracing::debug!(period = %request.period, lookback = %request.lookback, "rendered seed function");
    Ok(source)
}

fn js_literal(text: &str) -> PlanResult<String> {
    serde_json::to_string(text).map_err(|e| PlanError::Render(e.to_string()))
}

/// Pretty JSON, 4-space indent, continuation lines shifted into the
/// function body.
fn pretty_json<T: Serialize>(value: &T) -> PlanResult<String> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT.as_bytes()));
    value
        .serialize(&mut serializer)
        .map_err(|e| PlanError::Render(e.to_string()))?;
    let text = String::from_utf8(buf).map_err(|e| PlanError::Render(e.to_string()))?;
    Ok(text.replace('\n', &format!("\n{INDENT}")))
}
