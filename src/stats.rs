//! Summary statistics over a sample of numbers.

use serde::Serialize;

/// Percentiles and moments of a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    #[serde(rename = "25th")]
    pub p25: f64,
    #[serde(rename = "50th")]
    pub p50: f64,
    #[serde(rename = "75th")]
    pub p75: f64,
    #[serde(rename = "90th")]
    pub p90: f64,
    #[serde(rename = "95th")]
    pub p95: f64,
    #[serde(rename = "99th")]
    pub p99: f64,
    #[serde(rename = "99.9th")]
    pub p999: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub stdev: f64,
    pub median: f64,
    pub count: usize,
    pub total: f64,
    pub max: f64,
    pub min: f64,
}

/// Computes [`Stats`] for `values`, or `None` if there are none.
pub fn stats(values: &[f64]) -> Option<Stats> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let total: f64 = sorted.iter().sum();
    let mean = total / count as f64;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let median = percentile(&sorted, 50.0);

    Some(Stats {
        p25: percentile(&sorted, 25.0),
        p50: median,
        p75: percentile(&sorted, 75.0),
        p90: percentile(&sorted, 90.0),
        p95: percentile(&sorted, 95.0),
        p99: percentile(&sorted, 99.0),
        p999: percentile(&sorted, 99.9),
        mean,
        stdev: variance.sqrt(),
        median,
        count,
        total,
        max: sorted[count - 1],
        min: sorted[0],
    })
}

/// Percentile `q` (0-100) of an ascending slice, interpolating linearly
/// between the two nearest ranks. Returns NaN for an empty slice.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
