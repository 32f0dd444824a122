//! The render pool façade.
//!
//! Wires the admission gate, lifecycle controller, capturer, and health
//! monitor into the surface callers use: submit a named render, force or
//! suggest a restart, shut everything down on process exit.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capture::{resolve_source, Capturer};
use crate::config::Config;
use crate::connector::Connector;
use crate::engine::RenderEngine;
use crate::health::spawn_health_monitor;
use crate::lifecycle::{LifecycleController, PoolState};
use crate::registry::{registry_from_config, EndpointRegistry};
use crate::request::{RenderOutput, RenderRequest};
use crate::scheduler::RenderGate;
use crate::Result;

/// External templating collaborator: turns a template name plus data into a
/// local HTML artifact the pool can navigate to.
#[async_trait]
pub trait TemplateResolver: Send + Sync {
    async fn resolve(&self, name: &str, data: &serde_json::Value) -> Result<PathBuf>;
}

pub struct RenderPool {
    config: Config,
    gate: Arc<RenderGate>,
    controller: Arc<LifecycleController>,
    capturer: Capturer,
    shutdown: CancellationToken,
    health: Mutex<Option<JoinHandle<()>>>,
}

impl RenderPool {
    /// Pool over the default Chromium engine and the configured registry.
    #[cfg(feature = "chromium")]
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let engine: Arc<dyn RenderEngine> = Arc::new(crate::engine::chromium::ChromiumEngine::new());
        let registry: Arc<dyn EndpointRegistry> =
            Arc::from(registry_from_config(config.registry.path.as_deref()));
        Ok(Self::with_engine(engine, registry, config))
    }

    /// Pool over an explicit engine and registry. This is the seam tests and
    /// embedders use.
    pub fn with_engine(
        engine: Arc<dyn RenderEngine>,
        registry: Arc<dyn EndpointRegistry>,
        config: Config,
    ) -> Self {
        let gate = Arc::new(RenderGate::new(config.max_concurrent));
        let connector = Connector::new(engine, registry.clone(), config.clone());
        let controller =
            LifecycleController::new(connector, registry, gate.clone(), config.clone());
        let shutdown = CancellationToken::new();
        let health = spawn_health_monitor(
            controller.clone(),
            gate.clone(),
            config.health_interval,
            config.timeouts.probe,
            shutdown.clone(),
        );
        Self {
            capturer: Capturer::new(config.clone()),
            config,
            gate,
            controller,
            shutdown,
            health: Mutex::new(Some(health)),
        }
    }

    /// Render one named request to image bytes.
    ///
    /// The job is admitted once a slot under `max_concurrent` frees, runs
    /// against the shared browser in its own isolated context, and always
    /// leaves the in-flight set on completion. A successful render bumps the
    /// shared counter and may trigger a scheduled browser restart once the
    /// pool is idle.
    pub async fn screenshot(&self, request: &RenderRequest) -> Result<RenderOutput> {
        request.validate()?;
        // Missing artifacts fail before admission and before any browser
        // acquisition side effects.
        resolve_source(&request.source)?;

        let slot = self
            .gate
            .admit(&request.name, self.config.timeouts.admission)
            .await?;
        let handle = self.controller.ensure_ready().await?;
        let result = self.capturer.capture(&handle, request).await;
        drop(slot);

        match result {
            Ok(output) => {
                let count = self.controller.note_render_complete();
                debug!(job = %request.name, render_count = count, pages = output.page_count(), "render complete");
                self.controller.consider_scheduled_restart().await;
                Ok(output)
            }
            Err(e) => {
                if e.is_disconnect() {
                    warn!(job = %request.name, error = %e, "render lost its browser mid-job");
                } else {
                    debug!(job = %request.name, error = %e, "render failed");
                }
                Err(e)
            }
        }
    }

    /// Resolve a template through the external collaborator, then render the
    /// produced artifact.
    pub async fn screenshot_template(
        &self,
        resolver: &dyn TemplateResolver,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<RenderOutput> {
        let path = resolver.resolve(name, data).await?;
        let request = RenderRequest::file(name, path);
        self.screenshot(&request).await
    }

    /// Acquire the browser without rendering anything. Returns the control
    /// endpoint other processes can attach to.
    pub async fn warm_up(&self) -> Result<String> {
        let handle = self.controller.ensure_ready().await?;
        Ok(handle.endpoint().to_string())
    }

    /// Restart the browser. `force` bypasses the render-count/idle gate and
    /// fails any in-flight jobs. Returns whether a restart actually ran.
    pub async fn restart(&self, force: bool) -> bool {
        self.controller.restart(force).await
    }

    /// Shut down: stop the health monitor, close the browser, and release
    /// the registry entry if this process still owns it.
    pub async fn cleanup(&self) {
        self.shutdown.cancel();
        if let Some(health) = self.health.lock().await.take() {
            let _ = health.await;
        }
        self.controller.close().await;
    }

    pub fn state(&self) -> PoolState {
        self.controller.state()
    }

    pub fn render_count(&self) -> u32 {
        self.controller.render_count()
    }

    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
