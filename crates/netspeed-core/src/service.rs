// ── Indicator service ──
//
// One task per running instance. Commands from the host, bus signals,
// keepalive-permission changes and sampler ticks are all funneled into
// a single `select!` loop, so every state transition happens in one
// total order and nothing inside needs a lock.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Signal, Subscription};
use crate::counter::CounterSource;
use crate::debounce::SuppressionPolicy;
use crate::error::CoreError;
use crate::model::{Configuration, ServiceMode, ServiceRuntimeState};
use crate::renderer::{INDICATOR_ID, IndicatorContent, Renderer};
use crate::sampler::{Sampler, TickOutcome};
use crate::store::PreferenceStore;

const COMMAND_CHANNEL_SIZE: usize = 32;

/// Consecutive counter failures between two warnings.
const FAILURE_WARN_EVERY: u32 = 3;

/// Signals the service reacts to.
const SERVICE_TOPICS: [Signal; 4] = [
    Signal::Close,
    Signal::StopForeground,
    Signal::ScreenOn,
    Signal::ScreenOff,
];

// ── Commands ─────────────────────────────────────────────────────

/// How an instance came to life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Launch {
    /// Explicit start request: foreground-capable.
    Started,
    /// Created by a binding alone.
    Bound,
}

#[derive(Debug)]
pub(crate) enum ServiceCommand {
    /// Start request on an instance (possibly already running). Carries
    /// the configuration to apply.
    Start(Configuration),
    UpdateConfiguration(Configuration),
    DropForeground,
    /// Terminal teardown.
    Teardown { clear_status: bool },
}

/// Collaborators handed to every instance.
#[derive(Clone)]
pub(crate) struct ServiceDeps {
    pub bus: EventBus,
    pub store: Arc<dyn PreferenceStore>,
    pub renderer: Arc<dyn Renderer>,
    pub keepalive: watch::Receiver<bool>,
}

// ── ServiceHandle ────────────────────────────────────────────────

/// Host-side handle to one running instance.
pub(crate) struct ServiceHandle {
    commands: mpsc::Sender<ServiceCommand>,
    state: watch::Receiver<ServiceRuntimeState>,
    configuration: watch::Receiver<Configuration>,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    /// Create the instance: subscribe to signals, announce `START`, take
    /// the sampler baseline and spawn the event loop.
    pub fn spawn(
        deps: ServiceDeps,
        counter: Box<dyn CounterSource>,
        configuration: Configuration,
        launch: Launch,
    ) -> Result<Self, CoreError> {
        let signals = deps.bus.subscribe(&SERVICE_TOPICS);
        deps.bus.publish(Signal::Start);

        let mut sampler = Sampler::new(counter);
        sampler.start(configuration.interval())?;

        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (state_tx, state) = watch::channel(ServiceRuntimeState {
            mode: ServiceMode::Starting,
            ..ServiceRuntimeState::default()
        });
        let (config_tx, config_rx) = watch::channel(configuration.clone());

        let mut policy = SuppressionPolicy::default();
        // The baseline counts as a (0,0) observation.
        policy.observe(0, configuration.hide_threshold, Instant::now());

        let service = IndicatorService {
            configuration,
            sampler,
            policy,
            mode: ServiceMode::Starting,
            started: false,
            paused: false,
            shown: false,
            renderer: deps.renderer,
            store: deps.store,
            keepalive: Some(deps.keepalive),
            state_tx,
            config_tx,
        };
        let task = tokio::spawn(service.run(command_rx, signals, launch));

        Ok(Self {
            commands,
            state,
            configuration: config_rx,
            task,
        })
    }

    /// `false` once the event loop has exited (teardown, `CLOSE`).
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished() && !self.commands.is_closed()
    }

    pub fn state(&self) -> ServiceRuntimeState {
        *self.state.borrow()
    }

    pub fn configuration(&self) -> Configuration {
        self.configuration.borrow().clone()
    }

    pub async fn send(&self, command: ServiceCommand) -> Result<(), CoreError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoreError::IllegalState("indicator service already stopped"))
    }

    /// Tear down and wait for the event loop to finish.
    pub async fn shutdown(self, clear_status: bool) {
        if self
            .commands
            .send(ServiceCommand::Teardown { clear_status })
            .await
            .is_err()
        {
            debug!("indicator service already gone");
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "indicator service task failed");
        }
    }
}

// ── IndicatorService ─────────────────────────────────────────────

struct IndicatorService {
    configuration: Configuration,
    sampler: Sampler,
    policy: SuppressionPolicy,
    mode: ServiceMode,
    /// Took an explicit start request (foreground-capable).
    started: bool,
    paused: bool,
    /// An indicator, blank or not, is published and not yet cancelled.
    shown: bool,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn PreferenceStore>,
    keepalive: Option<watch::Receiver<bool>>,
    state_tx: watch::Sender<ServiceRuntimeState>,
    config_tx: watch::Sender<Configuration>,
}

impl IndicatorService {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ServiceCommand>,
        mut signals: Subscription,
        launch: Launch,
    ) {
        info!(?launch, interval = ?self.configuration.interval(), "indicator service created");
        match launch {
            Launch::Started => self.on_start(None),
            Launch::Bound => self.enter_bound(),
        }

        let clear_status = loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(ServiceCommand::Teardown { clear_status }) => break clear_status,
                    Some(command) => self.on_command(command),
                    None => break false,
                },
                signal = signals.recv() => match signal {
                    Some(Signal::Close) => {
                        info!("close signal received");
                        break true;
                    }
                    Some(signal) => self.on_signal(signal),
                    None => break false,
                },
                granted = permission_changed(&mut self.keepalive) => {
                    self.on_permission(granted);
                }
                outcome = self.sampler.tick() => self.on_tick(outcome),
            }
        };

        self.teardown(clear_status);
    }

    // ── Event handlers ───────────────────────────────────────────

    fn on_command(&mut self, command: ServiceCommand) {
        match command {
            ServiceCommand::Start(configuration) => self.on_start(Some(configuration)),
            ServiceCommand::UpdateConfiguration(configuration) => {
                self.update_configuration(configuration);
            }
            ServiceCommand::DropForeground => self.drop_foreground(),
            ServiceCommand::Teardown { .. } => {}
        }
    }

    fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::StopForeground => self.drop_foreground(),
            Signal::ScreenOff => self.pause(),
            Signal::ScreenOn => self.resume(),
            Signal::Start | Signal::Close => {}
        }
    }

    fn on_permission(&mut self, granted: Option<bool>) {
        let granted = granted.unwrap_or_else(|| {
            self.keepalive = None;
            false
        });
        if granted {
            debug!("keepalive permission granted");
            self.drop_foreground();
        } else if self.started && self.mode == ServiceMode::BackgroundBound {
            info!("keepalive permission revoked, returning to foreground");
            self.start_foreground();
        }
    }

    fn on_tick(&mut self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Sampled(rates) => {
                let speed = rates.speed(self.configuration.mode);
                if self
                    .policy
                    .observe(speed, self.configuration.hide_threshold, Instant::now())
                {
                    debug!(
                        suppressed = self.policy.is_suppressed(),
                        speed, "suppression changed"
                    );
                }
            }
            TickOutcome::Failed { error, consecutive } => {
                if consecutive % FAILURE_WARN_EVERY == 0 {
                    warn!(error = %error, consecutive, "counter reads keep failing");
                } else {
                    debug!(error = %error, consecutive, "counter read failed, keeping last rates");
                }
            }
        }
        self.render();
    }

    // ── Transitions ──────────────────────────────────────────────

    fn on_start(&mut self, configuration: Option<Configuration>) {
        self.started = true;
        self.start_foreground();
        if self.permission_granted() {
            self.drop_foreground();
        }
        if let Some(configuration) = configuration {
            self.update_configuration(configuration);
        }
    }

    fn enter_bound(&mut self) {
        self.mode = ServiceMode::BackgroundBound;
        self.render();
    }

    fn start_foreground(&mut self) {
        if self.mode == ServiceMode::ForegroundVisible {
            return;
        }
        self.mode = ServiceMode::ForegroundVisible;
        self.renderer
            .publish_foreground(INDICATOR_ID, &self.content());
        self.shown = true;
        info!("indicator in foreground mode");
        self.publish_state();
    }

    fn drop_foreground(&mut self) {
        if self.mode != ServiceMode::ForegroundVisible {
            return;
        }
        self.mode = ServiceMode::BackgroundBound;
        info!("indicator dropped to background-bound mode");
        self.render();
    }

    fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.sampler.stop();
        self.policy.reset_window();
        self.paused = true;
        debug!("screen off, sampling paused");
        self.publish_state();
    }

    fn resume(&mut self) {
        if !self.paused {
            return;
        }
        if let Err(e) = self.sampler.start(self.configuration.interval()) {
            warn!(error = %e, "could not resume sampling");
            return;
        }
        self.paused = false;
        debug!("screen on, sampling resumed");
        self.render();
    }

    fn update_configuration(&mut self, configuration: Configuration) {
        if configuration == self.configuration {
            debug!("configuration unchanged, ignoring");
            return;
        }
        if configuration.interval() != self.configuration.interval() {
            self.sampler.set_interval(configuration.interval());
        }
        debug!(?configuration, "configuration updated");
        self.configuration = configuration;
        self.config_tx.send_replace(self.configuration.clone());
        self.render();
    }

    fn teardown(&mut self, clear_status: bool) {
        self.sampler.destroy();
        self.renderer.cancel(INDICATOR_ID);
        self.shown = false;
        self.mode = ServiceMode::Stopped;
        self.publish_state();

        if clear_status {
            if let Err(e) = self.store.set_status(false) {
                warn!(error = %e, "failed to clear status flag");
            }
        }
        info!(clear_status, "indicator service stopped");
    }

    // ── Rendering ────────────────────────────────────────────────

    fn render(&mut self) {
        let suppressed = self.policy.is_suppressed();
        match self.mode {
            ServiceMode::BackgroundBound if suppressed => {
                if self.shown {
                    self.renderer.cancel(INDICATOR_ID);
                    self.shown = false;
                }
            }
            ServiceMode::BackgroundBound | ServiceMode::ForegroundVisible => {
                self.renderer.publish(INDICATOR_ID, &self.content());
                self.shown = true;
            }
            ServiceMode::Starting | ServiceMode::Stopped => {}
        }
        self.publish_state();
    }

    fn content(&self) -> IndicatorContent {
        if self.policy.is_suppressed() {
            IndicatorContent::blank(&self.configuration)
        } else {
            IndicatorContent::visible(self.sampler.rates(), &self.configuration)
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(ServiceRuntimeState {
            mode: self.mode,
            suppressed: self.policy.is_suppressed(),
            paused: self.paused,
            last_rates: self.sampler.rates(),
        });
    }

    fn permission_granted(&self) -> bool {
        self.keepalive.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Next value of the keepalive permission. `None` once the sender is
/// gone; never resolves after that.
async fn permission_changed(rx: &mut Option<watch::Receiver<bool>>) -> Option<bool> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
