// ── Throughput sampler ──
//
// Owns the repeating timer and the single retained baseline sample.
// Each tick reads the counter source and derives the rate against the
// previous sample.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::counter::CounterSource;
use crate::error::{CoreError, CounterError};
use crate::model::{RateSample, ThroughputSample};

/// Result of one timer period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Sampled(RateSample),
    /// The counter read failed; the previous rates still stand.
    Failed {
        error: CounterError,
        consecutive: u32,
    },
}

pub struct Sampler {
    source: Box<dyn CounterSource>,
    period: Duration,
    timer: Option<Interval>,
    baseline: Option<ThroughputSample>,
    rates: RateSample,
    failures: u32,
    destroyed: bool,
}

impl Sampler {
    pub fn new(source: Box<dyn CounterSource>) -> Self {
        Self {
            source,
            period: Duration::from_secs(1),
            timer: None,
            baseline: None,
            rates: RateSample::ZERO,
            failures: 0,
            destroyed: false,
        }
    }

    /// Take a fresh baseline and arm the timer.
    ///
    /// Rates computed before a previous `stop` are kept until the first
    /// tick so a caller can render the last known value right away.
    pub fn start(&mut self, period: Duration) -> Result<(), CoreError> {
        if self.destroyed {
            return Err(CoreError::IllegalState("sampler already destroyed"));
        }
        self.period = period;
        self.baseline = match self.source.read() {
            Ok(sample) => Some(sample),
            Err(e) => {
                debug!(error = %e, "baseline read failed, next tick re-baselines");
                None
            }
        };
        self.arm();
        Ok(())
    }

    /// Cancel the timer. Rates stay readable.
    pub fn stop(&mut self) {
        self.timer = None;
    }

    /// Change the period. A running timer is re-armed; the baseline and
    /// the rates are untouched.
    pub fn set_interval(&mut self, period: Duration) {
        if period == self.period {
            return;
        }
        self.period = period;
        if self.timer.is_some() {
            self.arm();
        }
    }

    /// Terminal: release the timer and refuse any later `start`.
    pub fn destroy(&mut self) {
        self.timer = None;
        self.baseline = None;
        self.destroyed = true;
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn rates(&self) -> RateSample {
        self.rates
    }

    pub fn rx_speed(&self) -> u64 {
        self.rates.rx_rate
    }

    pub fn tx_speed(&self) -> u64 {
        self.rates.tx_rate
    }

    /// Wait for the next period and sample.
    ///
    /// Never resolves while stopped, so it can sit in a `select!` next to
    /// other event sources. Cancel-safe: the read happens only after the
    /// timer fired.
    pub async fn tick(&mut self) -> TickOutcome {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
        self.sample()
    }

    fn sample(&mut self) -> TickOutcome {
        match self.source.read() {
            Ok(current) => {
                self.failures = 0;
                let rates = match self.baseline {
                    Some(previous) => RateSample::between(&previous, &current),
                    None => RateSample::ZERO,
                };
                self.baseline = Some(current);
                self.rates = rates;
                TickOutcome::Sampled(rates)
            }
            Err(error) => {
                self.failures = self.failures.saturating_add(1);
                TickOutcome::Failed {
                    error,
                    consecutive: self.failures,
                }
            }
        }
    }

    fn arm(&mut self) {
        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }
}
