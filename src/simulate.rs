use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel as channel;
use ewma_rate::rate::{RateEstimator, RateSnapshot};
use ewma_rate::ticker::Ticker;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{OutputFormat, Simulate};

#[derive(Debug, Serialize)]
pub struct Summary {
    pub producers: usize,
    pub produced: u64,
    pub ticks: u64,
    pub elapsed_secs: f64,
    #[serde(flatten)]
    pub last: RateSnapshot,
}

pub fn run_simulate(sim: Simulate) -> Result<()> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop = stop_flag.clone();
        let _ = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        });
    }

    let format = sim.format;
    let summary = run_simulate_with_shutdown(sim, stop_flag, |s| print_snapshot(format, s))?;
    match format {
        OutputFormat::Text => println!(
            "done: {} producers, {} events, {} ticks in {:.1}s, last count={} rate={:.1}/s",
            summary.producers,
            summary.produced,
            summary.ticks,
            summary.elapsed_secs,
            summary.last.count,
            summary.last.rate
        ),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&summary).context("Encoding summary")?)
        }
    }
    Ok(())
}

fn print_snapshot(format: OutputFormat, s: &RateSnapshot) {
    match format {
        OutputFormat::Text => println!("count={}\trate={:.1}/s", s.count, s.rate),
        OutputFormat::Json => match serde_json::to_string(s) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(?e, "Encoding snapshot"),
        },
    }
}

pub(crate) fn run_simulate_with_shutdown(
    sim: Simulate,
    stop_flag: Arc<AtomicBool>,
    mut report: impl FnMut(&RateSnapshot),
) -> Result<Summary> {
    sim.validate().context("Invalid simulate arguments")?;
    info!(
        alpha = sim.alpha,
        interval_ms = sim.interval_ms,
        producers = sim.producers,
        events_per_sec = sim.events_per_sec,
        burst = sim.burst,
        "Starting simulation"
    );

    let estimator = Arc::new(RateEstimator::new(sim.alpha, sim.interval()));
    let started = Instant::now();

    let ticker = Ticker::spawn(Arc::clone(&estimator)).context("Starting ticker")?;
    let producers = spawn_producers(sim.producers, &stop_flag, |i| {
        spawn_producer(i, &sim, Arc::clone(&estimator), stop_flag.clone())
    })?;

    let reports = channel::tick(sim.report_period());
    let deadline = match sim.run_for() {
        Some(d) => channel::after(d),
        None => channel::never(),
    };

    while !stop_flag.load(Ordering::Relaxed) {
        channel::select! {
            recv(reports) -> _ => {
                let s = estimator.snapshot();
                info!(count = s.count, rate = s.rate, "Rate");
                report(&s);
            }
            recv(deadline) -> _ => break,
            default(Duration::from_millis(100)) => {}
        }
    }

    // Shutdown
    info!("Stopping simulation");
    stop_flag.store(true, Ordering::Relaxed);
    let produced = join_producers(producers);
    let ticks = ticker.stop();

    Ok(Summary {
        producers: sim.producers,
        produced,
        ticks,
        elapsed_secs: started.elapsed().as_secs_f64(),
        last: estimator.snapshot(),
    })
}

// On a failed spawn, the producers already running are stopped and joined
// before the error is returned.
fn spawn_producers(
    count: usize,
    stop: &AtomicBool,
    mut spawn: impl FnMut(usize) -> Result<JoinHandle<u64>>,
) -> Result<Vec<JoinHandle<u64>>> {
    let mut handles = Vec::with_capacity(count);
    for id in 0..count {
        match spawn(id) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                stop.store(true, Ordering::Relaxed);
                join_producers(handles);
                return Err(e);
            }
        }
    }
    Ok(handles)
}

fn join_producers(handles: Vec<JoinHandle<u64>>) -> u64 {
    let mut produced = 0u64;
    for handle in handles {
        match handle.join() {
            Ok(n) => produced += n,
            Err(_) => warn!("Producer thread panicked"),
        }
    }
    produced
}

fn spawn_producer(
    id: usize,
    sim: &Simulate,
    estimator: Arc<RateEstimator>,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<u64>> {
    let step = sim.increment_size()?;
    let pause = sim.producer_pause()?;
    let burst = sim.burst;
    thread::Builder::new()
        .name(format!("producer-{id}"))
        .spawn(move || {
            let mut produced = 0u64;
            while !stop.load(Ordering::Relaxed) {
                estimator.increment(step);
                produced += burst;
                thread::sleep(pause);
            }
            produced
        })
        .with_context(|| format!("Spawning producer {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn quick(duration_secs: u64) -> Simulate {
        Simulate {
            alpha: 0.5,
            interval_ms: 20,
            producers: 3,
            events_per_sec: 1000,
            burst: 5,
            duration_secs,
            report_ms: Some(20),
            format: OutputFormat::Text,
        }
    }

    #[test]
    fn runs_until_deadline() {
        let mut seen = Vec::new();
        let summary =
            run_simulate_with_shutdown(quick(1), Arc::new(AtomicBool::new(false)), |s| seen.push(*s))
                .unwrap();

        assert_eq!(summary.producers, 3);
        assert!(summary.ticks >= 1);
        assert!(summary.produced > 0);
        assert!(summary.last.count <= summary.produced as i64);
        assert!(summary.last.rate > 0.0);
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].count <= w[1].count));
    }

    #[test]
    fn honours_external_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let stopper = {
            let stop = stop.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                stop.store(true, Ordering::Relaxed);
            })
        };

        let started = Instant::now();
        let summary = run_simulate_with_shutdown(quick(0), stop, |_| {}).unwrap();
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(summary.produced > 0);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut sim = quick(1);
        sim.producers = 0;
        let err = run_simulate_with_shutdown(sim, Arc::new(AtomicBool::new(false)), |_| {})
            .unwrap_err();
        assert_eq!(crate::error::exit_code_for_error(&err), 2);
    }

    #[test]
    fn rejects_burst_that_would_wrap() {
        let mut sim = quick(1);
        sim.burst = u64::MAX;
        sim.events_per_sec = 1;
        let err = run_simulate_with_shutdown(sim, Arc::new(AtomicBool::new(false)), |_| {})
            .unwrap_err();
        assert_eq!(crate::error::exit_code_for_error(&err), 2);
    }

    #[test]
    fn failed_spawn_stops_running_producers() {
        let stop = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicUsize::new(0));

        let result = spawn_producers(4, &stop, |id| {
            if id == 2 {
                anyhow::bail!("no more threads");
            }
            let stop = stop.clone();
            let exited = exited.clone();
            Ok(thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(1));
                }
                exited.fetch_add(1, Ordering::SeqCst);
                1
            }))
        });

        assert!(result.is_err());
        assert!(stop.load(Ordering::Relaxed));
        // Both spawned producers have been joined by the time the error returns.
        assert_eq!(exited.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn summary_json_flattens_snapshot() {
        let summary = Summary {
            producers: 1,
            produced: 10,
            ticks: 2,
            elapsed_secs: 1.0,
            last: RateSnapshot { count: 10, rate: 5.0 },
        };
        let v: serde_json::Value = serde_json::to_value(&summary).unwrap();
        assert_eq!(v["count"], 10);
        assert_eq!(v["rate"], 5.0);
        assert_eq!(v["ticks"], 2);
    }
}
