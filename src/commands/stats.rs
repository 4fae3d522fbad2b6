use anyhow::{Context, Result, anyhow};
use std::io::Write;

use crate::stats::stats;
use crate::time::time_call;

/// Parses whitespace-separated numbers.
pub fn parse_values(input: &str) -> Result<Vec<f64>> {
    input
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("Invalid number {:?}", token))
        })
        .collect()
}

/// Prints summary statistics of `values` as pretty JSON.
#[tracing::instrument(skip(values, out), fields(count = values.len()))]
pub fn show_stats<W: Write>(values: &[f64], out: &mut W) -> Result<()> {
    let summary =
        time_call("stats", || stats(values)).ok_or_else(|| anyhow!("No values given"))?;
    let rendered = serde_json::to_string_pretty(&summary).context("Failed to render stats")?;
    writeln!(out, "{}", rendered).context("Failed to write stats")?;
    Ok(())
}
