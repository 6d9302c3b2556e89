// ── Keepalive host ──
//
// A second long-lived component holding the elevated keepalive
// permission. While it is attached, the indicator service may drop its
// visible foreground indicator; when it detaches, the service is put
// back into foreground mode first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::ServiceController;
use crate::error::RpcError;
use crate::rpc::Transport;
use crate::store::PreferenceStore;

// ── ReconnectConfig ──────────────────────────────────────────────

/// Exponential backoff between attempts to reach the daemon.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on a single delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// `min(initial * 2^attempt, max)`, spread by a deterministic jitter
/// of up to ±25%.
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(16)).unwrap_or(16);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

// ── KeepaliveHost ────────────────────────────────────────────────

pub struct KeepaliveHost<T: Transport> {
    controller: ServiceController<T>,
    store: Arc<dyn PreferenceStore>,
    reconnect: ReconnectConfig,
    started_rx: mpsc::UnboundedReceiver<()>,
}

impl<T: Transport> KeepaliveHost<T> {
    pub fn new(transport: T, store: Arc<dyn PreferenceStore>) -> Self {
        let controller = ServiceController::with_keepalive(transport, store.clone());
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        controller.set_on_started(move || {
            let _ = started_tx.send(());
        });
        Self {
            controller,
            store,
            reconnect: ReconnectConfig::default(),
            started_rx,
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn controller(&self) -> &ServiceController<T> {
        &self.controller
    }

    /// Attach: take the permission and, if monitoring is enabled, make
    /// sure the service runs and is bound without a foreground
    /// indicator.
    pub async fn activate(&self) -> Result<(), RpcError> {
        self.controller.init().await?;
        info!("keepalive host attached");
        if self.store.status() {
            self.controller.start_service(true).await?;
            self.controller.drop_foreground().await?;
        }
        Ok(())
    }

    /// The service (re)started: bind to it and drop its foreground.
    async fn on_service_started(&self) {
        if let Err(e) = self.controller.bind_service().await {
            warn!(error = %e, "could not bind to restarted service");
            return;
        }
        if let Err(e) = self.controller.drop_foreground().await {
            warn!(error = %e, "could not drop foreground after restart");
        }
    }

    /// Detach: give up the permission, put a still-enabled service back
    /// into foreground mode, then release the binding.
    pub async fn deactivate(&self) {
        self.controller.unregister();
        if self.store.status() {
            if let Err(e) = self.controller.start_service(false).await {
                warn!(error = %e, "could not return service to foreground");
            }
        }
        self.controller.release().await;
        info!("keepalive host detached");
    }

    /// Stay attached until cancelled, re-attaching with backoff
    /// whenever the daemon goes away.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;
        let mut link = self.controller.link();

        loop {
            match self.activate().await {
                Ok(()) => {
                    attempt = 0;
                    loop {
                        tokio::select! {
                            biased;

                            () = cancel.cancelled() => break,
                            Some(()) = self.started_rx.recv() => self.on_service_started().await,
                            lost = async { link.wait_for(|linked| !linked).await.map(drop) } => {
                                if lost.is_ok() {
                                    warn!("lost the daemon, reconnecting");
                                }
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, attempt, "keepalive attach failed");
                }
            }

            if cancel.is_cancelled() {
                break;
            }
            let delay = calculate_backoff(attempt, &self.reconnect);
            attempt = attempt.saturating_add(1);
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.deactivate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = ReconnectConfig::default();
        let first = calculate_backoff(0, &config);
        let third = calculate_backoff(3, &config);
        let late = calculate_backoff(40, &config);

        assert!(first <= Duration::from_millis(1250));
        assert!(third > first);
        // Jitter factor never exceeds 1.25.
        assert!(late <= Duration::from_millis(37_500));
    }
}
