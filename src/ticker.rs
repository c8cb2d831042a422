use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel as channel;
use thiserror::Error;
use tracing::{debug, warn};

use crate::rate::RateEstimator;

#[derive(Debug, Error)]
pub enum TickerError {
    #[error("sampling interval must be greater than zero")]
    ZeroInterval,
    #[error("failed to spawn ticker thread")]
    Spawn(#[source] std::io::Error),
}

/// Background thread calling [`RateEstimator::tick`] every sampling interval.
///
/// Stops on [`Ticker::stop`] or when dropped.
pub struct Ticker {
    stop_tx: Option<channel::Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl Ticker {
    pub fn spawn(estimator: Arc<RateEstimator>) -> Result<Self, TickerError> {
        let interval = estimator.sampling_interval();
        if interval.is_zero() {
            return Err(TickerError::ZeroInterval);
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("ewma-ticker".into())
            .spawn(move || {
                let ticks = channel::tick(interval);
                let mut delivered = 0u64;
                loop {
                    channel::select! {
                        recv(ticks) -> _ => {
                            estimator.tick();
                            delivered += 1;
                        }
                        // Either an explicit stop or the sender being dropped.
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!(ticks = delivered, "Ticker stopped");
                delivered
            })
            .map_err(TickerError::Spawn)?;

        debug!(interval_ms = interval.as_millis() as u64, "Ticker started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stops the thread and returns how many ticks it delivered.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(n)) => n,
            Some(Err(_)) => {
                warn!("Ticker thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
