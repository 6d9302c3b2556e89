// ── Service controller ──
//
// Client-side facade a control surface uses to start, stop, bind to
// and reconfigure the indicator service. Lifecycle signals coming back
// from the host are turned into the optional `on_started` and
// `on_closed` callbacks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::Signal;
use crate::error::RpcError;
use crate::model::Configuration;
use crate::rpc::{self, BindingId, Reply, Request, SignalReceiver, StatusReport, Transport};
use crate::store::PreferenceStore;

const NOTICE_CHANNEL_SIZE: usize = 16;

/// Lifecycle callback. Runs on the controller's listener task.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Non-fatal, user-facing notice (the desktop flavor of a toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The service could not be reached; the request was dropped.
    Unreachable(String),
    Rejected(String),
}

impl From<&RpcError> for Notice {
    fn from(e: &RpcError) -> Self {
        match e {
            RpcError::Unreachable { reason } => Self::Unreachable(reason.clone()),
            other => Self::Rejected(other.to_string()),
        }
    }
}

// ── ServiceController ────────────────────────────────────────────

/// Cheaply cloneable via `Arc<ControllerInner>`.
pub struct ServiceController<T: Transport> {
    inner: Arc<ControllerInner<T>>,
}

impl<T: Transport> Clone for ServiceController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<T> {
    transport: T,
    store: Arc<dyn PreferenceStore>,
    /// Subscribe with the elevated keepalive permission.
    keepalive: bool,
    state: Mutex<ControllerState>,
    notices: broadcast::Sender<Notice>,
    linked: watch::Sender<bool>,
}

#[derive(Default)]
struct ControllerState {
    /// Signal listener; `Some` while registered.
    listener: Option<JoinHandle<()>>,
    /// `Some` only while bound.
    binder: Option<BindingId>,
    on_started: Option<Callback>,
    on_closed: Option<Callback>,
    released: bool,
}

impl<T: Transport> ServiceController<T> {
    pub fn new(transport: T, store: Arc<dyn PreferenceStore>) -> Self {
        Self::build(transport, store, false)
    }

    /// A controller whose signal subscription holds the keepalive
    /// permission.
    pub fn with_keepalive(transport: T, store: Arc<dyn PreferenceStore>) -> Self {
        Self::build(transport, store, true)
    }

    fn build(transport: T, store: Arc<dyn PreferenceStore>, keepalive: bool) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);
        let (linked, _) = watch::channel(false);
        Self {
            inner: Arc::new(ControllerInner {
                transport,
                store,
                keepalive,
                state: Mutex::new(ControllerState::default()),
                notices,
                linked,
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    // ── Callbacks ────────────────────────────────────────────────

    pub fn set_on_started(&self, callback: impl Fn() + Send + Sync + 'static) {
        let mut state = self.state();
        if !state.released {
            state.on_started = Some(Arc::new(callback));
        }
    }

    pub fn set_on_closed(&self, callback: impl Fn() + Send + Sync + 'static) {
        let mut state = self.state();
        if !state.released {
            state.on_closed = Some(Arc::new(callback));
        }
    }

    /// Soft notices for the user: delivery failures and rejections.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    // ── Registration ─────────────────────────────────────────────

    /// Subscribe to lifecycle signals. No-op if already registered or
    /// released.
    pub async fn init(&self) -> Result<(), RpcError> {
        {
            let state = self.state();
            if state.released || (state.listener.is_some() && *self.inner.linked.borrow()) {
                return Ok(());
            }
        }

        let signals = self.inner.transport.subscribe(self.inner.keepalive).await?;
        let listener = tokio::spawn(listen(Arc::downgrade(&self.inner), signals));

        let mut state = self.state();
        if state.released {
            listener.abort();
            return Ok(());
        }
        if let Some(previous) = state.listener.replace(listener) {
            previous.abort();
        }
        drop(state);
        self.inner.linked.send_replace(true);
        debug!(keepalive = self.inner.keepalive, "controller registered");
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.state().listener.is_some() && *self.inner.linked.borrow()
    }

    /// Follows the signal subscription: `true` while it is open.
    pub fn link(&self) -> watch::Receiver<bool> {
        self.inner.linked.subscribe()
    }

    /// Drop the signal subscription (and with it any keepalive
    /// permission) without touching the binding.
    pub fn unregister(&self) {
        if let Some(listener) = self.state().listener.take() {
            listener.abort();
        }
        self.inner.linked.send_replace(false);
    }

    // ── Service operations ───────────────────────────────────────

    /// Start the service with the persisted configuration, optionally
    /// binding to it as well.
    pub async fn start_service(&self, bind_also: bool) -> Result<(), RpcError> {
        let configuration = self.inner.store.configuration();
        self.call(Request::Start { configuration }).await?;
        if bind_also {
            self.bind_service().await?;
        }
        Ok(())
    }

    /// Bind, or return the existing binding.
    pub async fn bind_service(&self) -> Result<BindingId, RpcError> {
        if let Some(binding) = self.binding() {
            return Ok(binding);
        }
        let binding = rpc::expect_binding(self.call(Request::Bind).await?)?;
        let stale = {
            let mut state = self.state();
            if state.released {
                Some(binding)
            } else {
                state.binder.replace(binding).filter(|b| *b != binding)
            }
        };
        if let Some(stale) = stale {
            self.send_unbind(stale).await;
        }
        Ok(self.binding().unwrap_or(binding))
    }

    /// Release the binding, if any. Never fails.
    pub async fn unbind_service(&self) {
        let binding = self.state().binder.take();
        if let Some(binding) = binding {
            self.send_unbind(binding).await;
        }
    }

    /// Unbind, stop the service, then broadcast `CLOSE` so every other
    /// listener can react.
    pub async fn stop_service(&self) -> Result<(), RpcError> {
        self.unbind_service().await;
        self.call(Request::Stop).await?;
        self.call(Request::Broadcast {
            signal: Signal::Close,
        })
        .await?;
        Ok(())
    }

    /// Best-effort push that never blocks the caller. Dropped silently
    /// while unbound.
    pub fn update_configuration(&self, configuration: Configuration) {
        let controller = self.clone();
        tokio::spawn(async move {
            let _ = controller.push_configuration(configuration).await;
        });
    }

    /// Awaitable form of [`update_configuration`](Self::update_configuration).
    pub async fn push_configuration(&self, configuration: Configuration) -> Result<(), RpcError> {
        let Some(binding) = self.binding() else {
            debug!("not bound, configuration update dropped");
            return Ok(());
        };
        let result = self
            .call(Request::UpdateConfiguration {
                binding,
                configuration,
            })
            .await;
        if let Err(e) = &result {
            warn!(error = %e, "configuration push failed");
        }
        result.map(|_| ())
    }

    pub async fn drop_foreground(&self) -> Result<(), RpcError> {
        self.call(Request::Broadcast {
            signal: Signal::StopForeground,
        })
        .await
        .and_then(rpc::expect_ok)
    }

    /// Forward a signal to the host's bus.
    pub async fn broadcast(&self, signal: Signal) -> Result<(), RpcError> {
        self.call(Request::Broadcast { signal })
            .await
            .and_then(rpc::expect_ok)
    }

    pub async fn status(&self) -> Result<StatusReport, RpcError> {
        match self.call(Request::Status).await? {
            Reply::Status(report) => Ok(report),
            other => Err(RpcError::Protocol(format!("expected status, got {other:?}"))),
        }
    }

    pub fn binding(&self) -> Option<BindingId> {
        self.state().binder
    }

    pub fn is_bound(&self) -> bool {
        self.binding().is_some()
    }

    /// Unsubscribe, drop both callbacks and release the binding.
    /// Idempotent; later lifecycle signals are ignored.
    pub async fn release(&self) {
        let binding = {
            let mut state = self.state();
            if state.released {
                return;
            }
            state.released = true;
            state.on_started = None;
            state.on_closed = None;
            if let Some(listener) = state.listener.take() {
                listener.abort();
            }
            state.binder.take()
        };
        self.inner.linked.send_replace(false);
        if let Some(binding) = binding {
            self.send_unbind(binding).await;
        }
        debug!("controller released");
    }

    pub fn is_released(&self) -> bool {
        self.state().released
    }

    // ── Internals ────────────────────────────────────────────────

    /// Every transport failure also goes out as a notice.
    async fn call(&self, request: Request) -> Result<Reply, RpcError> {
        let result = self.inner.transport.call(request).await;
        if let Err(e) = &result {
            let _ = self.inner.notices.send(Notice::from(e));
        }
        result
    }

    async fn send_unbind(&self, binding: BindingId) {
        if let Err(e) = self.inner.transport.call(Request::Unbind { binding }).await {
            debug!(error = %e, %binding, "unbind failed, remote likely gone");
        }
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Signal listener ──────────────────────────────────────────────

/// Turns bus signals into callbacks until the subscription ends or the
/// controller goes away.
async fn listen<T: Transport>(inner: Weak<ControllerInner<T>>, mut signals: SignalReceiver) {
    while let Some(signal) = signals.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let controller = ServiceController { inner };
        match signal {
            Signal::Start => {
                let callback = controller.state().on_started.clone();
                if let Some(callback) = callback {
                    callback();
                }
            }
            Signal::Close => {
                info!("service closed");
                controller.unbind_service().await;
                if let Err(e) = controller.inner.store.set_status(false) {
                    warn!(error = %e, "failed to clear status flag");
                }
                let callback = controller.state().on_closed.clone();
                if let Some(callback) = callback {
                    callback();
                }
            }
            Signal::StopForeground | Signal::ScreenOn | Signal::ScreenOff => {}
        }
    }

    // The remote end went away: any binding now refers to a dead peer.
    if let Some(inner) = inner.upgrade() {
        inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .binder = None;
        inner.linked.send_replace(false);
        debug!("signal subscription ended");
    }
}
