//! Browser lifecycle: serialized initialization, disconnect recovery, and
//! scheduled restarts.
//!
//! The controller is the only owner of the browser handle. All mutation goes
//! through its state machine:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> Restarting -> Initializing
//!                                    |
//!                                    v
//!                                 Closed
//! ```
//!
//! `Ready -> Restarting` happens on a disconnect notification (forced,
//! regardless of in-flight jobs) or when the render counter crosses the
//! configured threshold while the pool is idle.

use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connector::Connector;
use crate::engine::BrowserHandle;
use crate::registry::EndpointRegistry;
use crate::scheduler::RenderGate;
use crate::{RenderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Uninitialized,
    Initializing,
    Ready,
    Restarting,
    Closed,
}

struct Shared {
    state: PoolState,
    handle: Option<Arc<dyn BrowserHandle>>,
    render_count: u32,
    /// Bumped on every teardown so stale disconnect notifications for an
    /// already-replaced handle are ignored.
    generation: u64,
}

pub struct LifecycleController {
    connector: Connector,
    registry: Arc<dyn EndpointRegistry>,
    gate: Arc<RenderGate>,
    config: Config,
    shared: StdMutex<Shared>,
    /// The single mutual-exclusion flag: exactly one launch-or-connect (or
    /// teardown) sequence runs at a time; concurrent callers block on this
    /// lock for a bounded wait and observe its outcome.
    init_lock: Mutex<()>,
}

impl LifecycleController {
    pub fn new(
        connector: Connector,
        registry: Arc<dyn EndpointRegistry>,
        gate: Arc<RenderGate>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            connector,
            registry,
            gate,
            config,
            shared: StdMutex::new(Shared {
                state: PoolState::Uninitialized,
                handle: None,
                render_count: 0,
                generation: 0,
            }),
            init_lock: Mutex::new(()),
        })
    }

    pub fn state(&self) -> PoolState {
        self.shared.lock().expect("lifecycle state poisoned").state
    }

    pub fn render_count(&self) -> u32 {
        self.shared
            .lock()
            .expect("lifecycle state poisoned")
            .render_count
    }

    pub fn endpoint(&self) -> Option<String> {
        self.shared
            .lock()
            .expect("lifecycle state poisoned")
            .handle
            .as_ref()
            .map(|h| h.endpoint().to_string())
    }

    pub(crate) fn ready_handle(&self) -> Option<Arc<dyn BrowserHandle>> {
        let shared = self.shared.lock().expect("lifecycle state poisoned");
        match shared.state {
            PoolState::Ready => shared.handle.clone(),
            _ => None,
        }
    }

    /// Idempotent, concurrent-safe access to a live handle. If another
    /// caller is initializing, waits up to `timeouts.init_wait` for its
    /// result instead of starting a second acquisition.
    pub async fn ensure_ready(self: &Arc<Self>) -> Result<Arc<dyn BrowserHandle>> {
        if let Some(handle) = self.ready_handle() {
            return Ok(handle);
        }
        if self.state() == PoolState::Closed {
            return Err(RenderError::Closed);
        }

        let wait = self.config.timeouts.init_wait;
        let guard = timeout(wait, self.init_lock.lock())
            .await
            .map_err(|_| RenderError::timeout("initialization wait", wait))?;

        // The previous holder may have brought the pool up (or torn it down)
        // while we waited.
        if let Some(handle) = self.ready_handle() {
            return Ok(handle);
        }
        if self.state() == PoolState::Closed {
            return Err(RenderError::Closed);
        }

        let result = self.initialize_locked().await;
        drop(guard);
        result
    }

    /// Runs with `init_lock` held.
    async fn initialize_locked(self: &Arc<Self>) -> Result<Arc<dyn BrowserHandle>> {
        self.set_state(PoolState::Initializing);
        match self.connector.acquire().await {
            Ok(handle) => Ok(self.enter_ready(handle)),
            Err(e) => {
                self.set_state(PoolState::Uninitialized);
                Err(e)
            }
        }
    }

    fn enter_ready(self: &Arc<Self>, handle: Box<dyn BrowserHandle>) -> Arc<dyn BrowserHandle> {
        let handle: Arc<dyn BrowserHandle> = Arc::from(handle);
        let generation = {
            let mut shared = self.shared.lock().expect("lifecycle state poisoned");
            shared.handle = Some(handle.clone());
            shared.render_count = 0;
            shared.state = PoolState::Ready;
            shared.generation
        };
        self.subscribe_disconnect(&handle, generation);
        info!(endpoint = %handle.endpoint(), generation, "browser ready");
        handle
    }

    fn subscribe_disconnect(self: &Arc<Self>, handle: &Arc<dyn BrowserHandle>, generation: u64) {
        let mut rx = handle.disconnects();
        let controller: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                if *rx.borrow_and_update() {
                    break;
                }
                if rx.changed().await.is_err() {
                    // Sender dropped without signalling: treat as gone.
                    break;
                }
            }
            if let Some(controller) = controller.upgrade() {
                controller.on_disconnect(generation).await;
            }
        });
    }

    async fn on_disconnect(self: Arc<Self>, generation: u64) {
        {
            let shared = self.shared.lock().expect("lifecycle state poisoned");
            if shared.generation != generation || shared.state != PoolState::Ready {
                return;
            }
        }
        warn!(generation, "browser disconnected; forcing restart");
        self.force_restart_if_current(generation).await;
    }

    async fn force_restart_if_current(self: &Arc<Self>, generation: u64) -> bool {
        let _guard = self.init_lock.lock().await;
        {
            let shared = self.shared.lock().expect("lifecycle state poisoned");
            if shared.generation != generation || shared.state == PoolState::Closed {
                return false;
            }
        }
        self.restart_locked().await
    }

    /// Restart the browser. A forced restart proceeds regardless of
    /// in-flight jobs (they will fail and report their own errors); a
    /// scheduled one only fires when the render counter sits on a positive
    /// threshold multiple and nothing is in flight.
    pub async fn restart(self: &Arc<Self>, force: bool) -> bool {
        if !force && !self.scheduled_restart_due() {
            return false;
        }
        let _guard = self.init_lock.lock().await;
        if self.state() == PoolState::Closed {
            return false;
        }
        // Re-check under the lock: a job may have been admitted while we
        // waited.
        if !force && !self.scheduled_restart_due() {
            return false;
        }
        self.restart_locked().await
    }

    /// Runs with `init_lock` held: teardown, then immediately re-initialize.
    async fn restart_locked(self: &Arc<Self>) -> bool {
        self.teardown().await;
        match self.initialize_locked().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "restart failed; pool stays down until next render");
                false
            }
        }
    }

    fn scheduled_restart_due(&self) -> bool {
        let count = self.render_count();
        count > 0 && count % self.config.restart_threshold == 0 && self.gate.is_idle()
    }

    /// Called by the capturer after each successful render, outside the hot
    /// path. Returns the new counter value.
    pub fn note_render_complete(&self) -> u32 {
        let mut shared = self.shared.lock().expect("lifecycle state poisoned");
        shared.render_count = shared.render_count.saturating_add(1);
        shared.render_count
    }

    /// Whether the counter/idle gate would let a scheduled restart proceed.
    pub async fn consider_scheduled_restart(self: &Arc<Self>) -> bool {
        if !self.scheduled_restart_due() {
            return false;
        }
        debug!(
            render_count = self.render_count(),
            "render threshold reached; scheduling restart"
        );
        self.restart(false).await
    }

    async fn teardown(&self) {
        let (handle, generation) = {
            let mut shared = self.shared.lock().expect("lifecycle state poisoned");
            shared.state = PoolState::Restarting;
            shared.generation += 1;
            shared.render_count = 0;
            (shared.handle.take(), shared.generation)
        };
        if let Some(handle) = handle {
            self.release_handle(handle).await;
        }
        debug!(generation, "browser handle released");
    }

    async fn release_handle(&self, handle: Arc<dyn BrowserHandle>) {
        let endpoint = handle.endpoint().to_string();
        if let Err(e) = handle.close().await {
            warn!(endpoint = %endpoint, error = %e, "browser close failed");
        }
        // Only clear the registry entry if it still points at us. A newer
        // instance published by another process must not be clobbered by our
        // late cleanup.
        let key = self.connector.identity_key();
        match self.registry.lookup(key).await {
            Ok(Some(current)) if current == endpoint => {
                if let Err(e) = self.registry.invalidate(key).await {
                    warn!(error = %e, "failed to invalidate registry entry");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "registry unavailable during release"),
        }
    }

    fn set_state(&self, state: PoolState) {
        self.shared.lock().expect("lifecycle state poisoned").state = state;
    }

    /// Shut the pool down for good: close the browser, release the registry
    /// entry if still owned. Further `ensure_ready` calls fail with
    /// [`RenderError::Closed`].
    pub async fn close(self: &Arc<Self>) {
        let _guard = self.init_lock.lock().await;
        if self.state() == PoolState::Closed {
            return;
        }
        self.teardown().await;
        self.set_state(PoolState::Closed);
        info!("render pool closed");
    }
}
