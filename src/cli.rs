use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::{check_alpha, ConfigError};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive an estimator from concurrent producer threads and report its rate
    Simulate(Simulate),
    /// Replay per-interval event counts through an estimator, one tick each
    Series(Series),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Clone, Debug)]
pub struct Simulate {
    /// Smoothing factor applied to each new sample
    #[arg(long, default_value_t = 0.2)]
    pub alpha: f64,

    /// Sampling interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Number of producer threads
    #[arg(long, default_value_t = 4)]
    pub producers: usize,

    /// Target events per second, per producer
    #[arg(long, default_value_t = 100)]
    pub events_per_sec: u64,

    /// Events added per increment call
    #[arg(long, default_value_t = 1)]
    pub burst: u64,

    /// Run time in seconds (0 runs until Ctrl-C)
    #[arg(long, default_value_t = 10)]
    pub duration_secs: u64,

    /// Report period in milliseconds (defaults to the sampling interval)
    #[arg(long)]
    pub report_ms: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl Simulate {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_alpha(self.alpha)?;
        if self.interval_ms == 0 || self.report_ms == Some(0) {
            return Err(ConfigError::ZeroInterval);
        }
        if self.producers == 0 {
            return Err(ConfigError::ZeroProducers);
        }
        if self.burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        if self.events_per_sec == 0 {
            return Err(ConfigError::ZeroEventRate);
        }
        self.increment_size()?;
        self.producer_pause()?;
        Ok(())
    }

    /// `burst` as the signed amount each producer passes to `increment`.
    pub fn increment_size(&self) -> Result<i64, ConfigError> {
        i64::try_from(self.burst).map_err(|_| ConfigError::BurstTooLarge(self.burst))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn report_period(&self) -> Duration {
        Duration::from_millis(self.report_ms.unwrap_or(self.interval_ms))
    }

    /// Pause between increments so each producer adds about
    /// `events_per_sec` events per second.
    pub fn producer_pause(&self) -> Result<Duration, ConfigError> {
        let secs = self.burst as f64 / self.events_per_sec as f64;
        Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::PauseOutOfRange(secs))
    }

    pub fn run_for(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }
}

#[derive(Parser, Clone, Debug)]
pub struct Series {
    /// Events observed in each successive interval
    #[arg(required = true, allow_negative_numbers = true)]
    pub counts: Vec<i64>,

    /// Smoothing factor applied to each new sample
    #[arg(long, default_value_t = 0.5)]
    pub alpha: f64,

    /// Sampling interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl Series {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_alpha(self.alpha)?;
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if let Some((index, &value)) = self.counts.iter().enumerate().find(|(_, c)| **c < 0) {
            return Err(ConfigError::NegativeCount { index, value });
        }
        Ok(())
    }
}
