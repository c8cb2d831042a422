use std::time::Duration;

use anyhow::{Context, Result};
use ewma_rate::rate::{RateEstimator, RateSnapshot};
use tracing::debug;

use crate::cli::{OutputFormat, Series};

pub fn run_series(series: Series) -> Result<()> {
    series.validate().context("Invalid series arguments")?;
    let snapshots = replay(&series.counts, series.alpha, Duration::from_millis(series.interval_ms));

    match series.format {
        OutputFormat::Text => {
            for (i, s) in snapshots.iter().enumerate() {
                println!("{}\tcount={}\trate={:.3}", i + 1, s.count, s.rate);
            }
        }
        OutputFormat::Json => {
            let out = serde_json::to_string_pretty(&snapshots).context("Encoding snapshots")?;
            println!("{out}");
        }
    }
    Ok(())
}

/// Feeds each count as one interval's worth of events and samples after each.
pub(crate) fn replay(counts: &[i64], alpha: f64, interval: Duration) -> Vec<RateSnapshot> {
    let estimator = RateEstimator::new(alpha, interval);
    counts
        .iter()
        .map(|&n| {
            estimator.increment(n);
            estimator.tick();
            let s = estimator.snapshot();
            debug!(events = n, count = s.count, rate = s.rate, "Replayed interval");
            s
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_seeds_and_smooths() {
        let out = replay(&[10, 20], 0.5, Duration::from_secs(1));
        assert_eq!(out[0], RateSnapshot { count: 10, rate: 10.0 });
        assert_eq!(out[1].count, 30);
        assert!((out[1].rate - 15.0).abs() < 1e-9);
    }

    #[test]
    fn replay_leading_zeros_stay_unseeded() {
        let out = replay(&[0, 0, 6], 0.5, Duration::from_secs(1));
        assert_eq!(out[0], RateSnapshot { count: 0, rate: 0.0 });
        assert_eq!(out[1], RateSnapshot { count: 0, rate: 0.0 });
        assert_eq!(out[2], RateSnapshot { count: 6, rate: 6.0 });
    }

    #[test]
    fn replay_respects_interval() {
        let out = replay(&[30], 0.5, Duration::from_millis(250));
        assert!((out[0].rate - 120.0).abs() < 1e-9);
    }

    #[test]
    fn run_rejects_negative_counts() {
        let series = Series {
            counts: vec![1, -1],
            alpha: 0.5,
            interval_ms: 1000,
            format: OutputFormat::Text,
        };
        let err = run_series(series).unwrap_err();
        assert_eq!(crate::error::exit_code_for_error(&err), 2);
    }
}
