//! Thread-safe exponentially weighted moving average of a per-second event rate.
//!
//! [`RateEstimator`] is the whole core: producers call `increment`, a timer
//! calls `tick` at the sampling interval, readers call `rate` / `count`.
//! [`Ticker`] is a ready-made timer for hosts that do not have one.

pub mod rate;
pub mod ticker;

pub use rate::{RateEstimator, RateSnapshot};
pub use ticker::{Ticker, TickerError};
