// ── Service host ──
//
// The process-level owner of the indicator service: the bus, the
// preference store, the counter factory, the renderer, the keepalive
// permission and at most one running instance. Created once at process
// start, shut down at process exit.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::bus::{EventBus, Signal};
use crate::counter::CounterFactory;
use crate::error::{CoreError, RpcError};
use crate::model::{Configuration, ServiceRuntimeState};
use crate::renderer::Renderer;
use crate::rpc::{BindingId, Reply, Request, StatusReport};
use crate::service::{Launch, ServiceCommand, ServiceDeps, ServiceHandle};
use crate::store::PreferenceStore;

// ── ServiceHost ──────────────────────────────────────────────────

/// Cheaply cloneable via `Arc<HostInner>`.
#[derive(Clone)]
pub struct ServiceHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    bus: EventBus,
    store: Arc<dyn PreferenceStore>,
    counters: CounterFactory,
    renderer: Arc<dyn Renderer>,
    keepalive: watch::Sender<bool>,
    keepalive_grants: std::sync::Mutex<usize>,
    instance: Mutex<Option<Instance>>,
    next_binding: AtomicU64,
}

struct Instance {
    handle: ServiceHandle,
    bindings: HashSet<BindingId>,
    /// Took an explicit start request; survives losing all bindings.
    started: bool,
    started_at: DateTime<Utc>,
}

impl ServiceHost {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        counters: CounterFactory,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let (keepalive, _) = watch::channel(false);
        Self {
            inner: Arc::new(HostInner {
                bus: EventBus::new(),
                store,
                counters,
                renderer,
                keepalive,
                keepalive_grants: std::sync::Mutex::new(0),
                instance: Mutex::new(None),
                next_binding: AtomicU64::new(1),
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn store(&self) -> &Arc<dyn PreferenceStore> {
        &self.inner.store
    }

    // ── Request dispatch ─────────────────────────────────────────

    /// Serve one control-plane request.
    pub async fn handle(&self, request: Request) -> Result<Reply, RpcError> {
        debug!(?request, "host request");
        let reply = match request {
            Request::Start { configuration } => {
                self.start(configuration).await.map(|()| Reply::Ok)
            }
            Request::Stop => {
                self.stop().await;
                Ok(Reply::Ok)
            }
            Request::Bind => self.bind().await.map(|binding| Reply::Bound { binding }),
            Request::Unbind { binding } => {
                self.unbind(binding).await;
                Ok(Reply::Ok)
            }
            Request::UpdateConfiguration {
                binding,
                configuration,
            } => self
                .update_configuration(binding, configuration)
                .await
                .map(|()| Reply::Ok),
            Request::Broadcast { signal } => {
                self.broadcast(signal).await;
                Ok(Reply::Ok)
            }
            Request::Status => Ok(Reply::Status(self.status().await)),
        };
        reply.map_err(|e| match e {
            CoreError::Rpc(rpc) => rpc,
            other => RpcError::Rejected(other.to_string()),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start the service, creating the instance if needed.
    pub async fn start(&self, configuration: Configuration) -> Result<(), CoreError> {
        let mut slot = self.instance().await;
        match slot.as_mut() {
            Some(instance) => {
                instance.started = true;
                instance
                    .handle
                    .send(ServiceCommand::Start(configuration))
                    .await?;
            }
            None => {
                *slot = Some(self.spawn(configuration, Launch::Started)?);
                info!("indicator service started");
            }
        }
        Ok(())
    }

    /// Bind to the service, creating a bind-only instance if none runs.
    pub async fn bind(&self) -> Result<BindingId, CoreError> {
        let binding = BindingId(self.inner.next_binding.fetch_add(1, Ordering::Relaxed));
        let mut slot = self.instance().await;
        if slot.is_none() {
            let configuration = self.inner.store.configuration();
            *slot = Some(self.spawn(configuration, Launch::Bound)?);
            info!("indicator service created by binding");
        }
        if let Some(instance) = slot.as_mut() {
            instance.bindings.insert(binding);
        }
        debug!(%binding, "bound");
        Ok(binding)
    }

    /// Release a binding. Unknown bindings are ignored. A bind-only
    /// instance goes away with its last binding.
    pub async fn unbind(&self, binding: BindingId) {
        let mut slot = self.instance().await;
        let orphaned = match slot.as_mut() {
            Some(instance) => {
                if !instance.bindings.remove(&binding) {
                    return;
                }
                debug!(%binding, "unbound");
                !instance.started && instance.bindings.is_empty()
            }
            None => false,
        };
        if orphaned {
            if let Some(instance) = slot.take() {
                info!("last binding gone, destroying bind-only instance");
                instance.handle.shutdown(false).await;
            }
        }
    }

    pub async fn update_configuration(
        &self,
        binding: BindingId,
        configuration: Configuration,
    ) -> Result<(), CoreError> {
        let slot = self.instance().await;
        match slot.as_ref() {
            Some(instance) if instance.bindings.contains(&binding) => Ok(instance
                .handle
                .send(ServiceCommand::UpdateConfiguration(configuration))
                .await?),
            _ => Err(RpcError::unreachable(format!("binding {binding} is not bound")).into()),
        }
    }

    /// Publish a signal. A `CLOSE` also waits for the instance to finish
    /// tearing down.
    pub async fn broadcast(&self, signal: Signal) {
        let listeners = self.inner.bus.publish(signal);
        debug!(%signal, listeners, "broadcast");
        if signal == Signal::Close {
            let instance = self.instance().await.take();
            if let Some(instance) = instance {
                instance.handle.shutdown(true).await;
            }
        }
    }

    /// Explicit stop: teardown and clear the durable status flag.
    pub async fn stop(&self) {
        let instance = self.instance().await.take();
        if let Some(instance) = instance {
            instance.handle.shutdown(true).await;
            info!("indicator service stopped");
        }
    }

    /// Process exit: teardown, keep the durable status flag.
    pub async fn shutdown(&self) {
        let instance = self.instance().await.take();
        if let Some(instance) = instance {
            instance.handle.shutdown(false).await;
        }
        info!("service host shut down");
    }

    // ── Observation ──────────────────────────────────────────────

    pub async fn state(&self) -> ServiceRuntimeState {
        self.instance()
            .await
            .as_ref()
            .map(|instance| instance.handle.state())
            .unwrap_or_default()
    }

    pub async fn status(&self) -> StatusReport {
        let slot = self.instance().await;
        let mut report = StatusReport {
            status_flag: self.inner.store.status(),
            keepalive: *self.inner.keepalive.borrow(),
            ..StatusReport::default()
        };
        if let Some(instance) = slot.as_ref() {
            report.state = instance.handle.state();
            report.configuration = Some(instance.handle.configuration());
            report.started_at = Some(instance.started_at);
            report.bindings = instance.bindings.len();
        }
        report
    }

    pub fn keepalive_active(&self) -> bool {
        *self.inner.keepalive.borrow()
    }

    // ── Keepalive permission ─────────────────────────────────────

    /// Hold the elevated keepalive permission until the grant drops.
    pub fn grant_keepalive(&self) -> KeepaliveGrant {
        let mut grants = self
            .inner
            .keepalive_grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *grants += 1;
        if *grants == 1 {
            info!("keepalive permission granted");
            self.inner.keepalive.send_replace(true);
        }
        KeepaliveGrant { host: self.clone() }
    }

    fn revoke_keepalive(&self) {
        let mut grants = self
            .inner
            .keepalive_grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *grants = grants.saturating_sub(1);
        if *grants == 0 {
            info!("keepalive permission revoked");
            self.inner.keepalive.send_replace(false);
        }
    }

    // ── Internals ────────────────────────────────────────────────

    /// Lock the instance slot, dropping an instance whose event loop
    /// already exited on its own (e.g. a `CLOSE` from the bus).
    async fn instance(&self) -> tokio::sync::MutexGuard<'_, Option<Instance>> {
        let mut slot = self.inner.instance.lock().await;
        if slot.as_ref().is_some_and(|instance| !instance.handle.is_alive()) {
            debug!("reaping stopped indicator service");
            slot.take();
        }
        slot
    }

    fn spawn(&self, configuration: Configuration, launch: Launch) -> Result<Instance, CoreError> {
        let deps = ServiceDeps {
            bus: self.inner.bus.clone(),
            store: self.inner.store.clone(),
            renderer: self.inner.renderer.clone(),
            keepalive: self.inner.keepalive.subscribe(),
        };
        let counter = (self.inner.counters)();
        let handle = ServiceHandle::spawn(deps, counter, configuration, launch)?;
        Ok(Instance {
            handle,
            bindings: HashSet::new(),
            started: launch == Launch::Started,
            started_at: Utc::now(),
        })
    }
}

/// Proof of the elevated keepalive permission. Dropping revokes it.
pub struct KeepaliveGrant {
    host: ServiceHost,
}

impl Drop for KeepaliveGrant {
    fn drop(&mut self) {
        self.host.revoke_keepalive();
    }
}
