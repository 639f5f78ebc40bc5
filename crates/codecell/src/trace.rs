//! Visualization trace lines
//!
//! Sandboxed programs may print lines starting with [`TRACE_MARKER`] to
//! describe algorithm state step by step. The runner never touches them; this
//! module is for consumers of an [`ExecutionResult`](crate::ExecutionResult).
//!
//! Two payload shapes are accepted:
//!
//! ```text
//! __VIS__:{"arr": [5, 3, 8], "i": 0, "j": 1, "swap": true, "type": "sort"}
//! __VIS__:[5,3,8] 0 1
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix marking a trace line on stdout
pub const TRACE_MARKER: &str = "__VIS__:";

/// One step of a visualized algorithm
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Array state at this step
    pub arr: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub j: Option<i64>,

    /// Whether `i` and `j` are being swapped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<bool>,

    /// Step type discriminator, e.g. "sort" or "search"
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
}

/// Check if a line is a trace line
pub fn is_trace_line(line: &str) -> bool {
    line.starts_with(TRACE_MARKER)
}

/// Parse a single line, returning `None` for ordinary or malformed lines
pub fn parse_line(line: &str) -> Option<TraceStep> {
    let payload = line.strip_prefix(TRACE_MARKER)?.trim();

    let step = if payload.starts_with('{') {
        serde_json::from_str::<TraceStep>(payload)
            .map_err(|e| debug!(error = %e, line, "malformed trace payload"))
            .ok()
    } else {
        parse_legacy(payload)
    };

    if step.is_none() {
        debug!(line, "skipping unparseable trace line");
    }
    step
}

/// Parse the bracketed `[a,b,c] i j` form
fn parse_legacy(payload: &str) -> Option<TraceStep> {
    let rest = payload.strip_prefix('[')?;
    let (list, indices) = rest.split_once(']')?;

    let arr = if list.trim().is_empty() {
        Vec::new()
    } else {
        list.split(',')
            .map(|value| value.trim().parse::<f64>().ok())
            .collect::<Option<Vec<_>>>()?
    };

    let mut indices = indices.split_whitespace();
    let i = indices.next()?.parse::<i64>().ok()?;
    let j = indices.next()?.parse::<i64>().ok()?;

    Some(TraceStep {
        arr,
        i: Some(i),
        j: Some(j),
        ..TraceStep::default()
    })
}

/// Collect every parseable trace step in program output, in order
pub fn parse_output(output: &str) -> Vec<TraceStep> {
    output.lines().filter_map(parse_line).collect()
}

/// Remove trace lines, keeping every other line as printed
pub fn strip_trace_lines(output: &str) -> String {
    output
        .split_inclusive('\n')
        .filter(|line| !is_trace_line(line))
        .collect()
}
