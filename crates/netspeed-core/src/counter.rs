// ── Counter source ──
//
// Cumulative byte counters for the machine's network interfaces.
// The sampler only needs "read now"; everything else is the source's
// business.

use std::sync::Arc;

use sysinfo::Networks;
use tokio::time::Instant;
use tracing::trace;

use crate::error::CounterError;
use crate::model::ThroughputSample;

/// Reads cumulative received/transmitted byte counters.
pub trait CounterSource: Send {
    fn read(&mut self) -> Result<ThroughputSample, CounterError>;
}

/// Builds a fresh counter source for every service instance the host
/// creates.
pub type CounterFactory = Arc<dyn Fn() -> Box<dyn CounterSource> + Send + Sync>;

/// Interface names never counted towards throughput.
const LOOPBACK_PREFIXES: &[&str] = &["lo"];

/// Counter source backed by `sysinfo`'s per-interface totals.
pub struct SysinfoCounter {
    networks: Networks,
}

impl SysinfoCounter {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }

    /// A factory suitable for [`ServiceHost`](crate::ServiceHost).
    pub fn factory() -> CounterFactory {
        Arc::new(|| Box::new(SysinfoCounter::new()) as Box<dyn CounterSource>)
    }
}

impl Default for SysinfoCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SysinfoCounter {
    fn read(&mut self) -> Result<ThroughputSample, CounterError> {
        // Interfaces come and go (VPNs, docking); drop the vanished ones.
        self.networks.refresh(true);

        let mut rx = 0u64;
        let mut tx = 0u64;
        let mut seen = 0usize;
        for (name, data) in self.networks.iter() {
            if LOOPBACK_PREFIXES.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            rx = rx.saturating_add(data.total_received());
            tx = tx.saturating_add(data.total_transmitted());
            seen += 1;
        }

        if seen == 0 {
            return Err(CounterError::NoInterfaces);
        }
        trace!(interfaces = seen, rx, tx, "read interface counters");
        Ok(ThroughputSample::new(rx, tx, Instant::now()))
    }
}
