//! Browser acquisition: attach to a published endpoint or launch fresh.
//!
//! The whole point of the registry dance is that a caller process restart
//! does not pay for a new browser process: if a live endpoint is published
//! for this host, attach to it; only launch when attach is impossible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backoff::jittered_retry_delay;
use crate::config::Config;
use crate::engine::{BrowserHandle, RenderEngine};
use crate::registry::{process_identity_key, EndpointRegistry};
use crate::{RenderError, Result};

/// Prefer the registry's candidate over the statically configured one.
pub fn candidate_endpoint(
    registry_value: Option<String>,
    static_value: Option<&str>,
) -> Option<(String, EndpointSource)> {
    match registry_value {
        Some(endpoint) => Some((endpoint, EndpointSource::Registry)),
        None => static_value.map(|e| (e.to_string(), EndpointSource::Static)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    Registry,
    Static,
}

pub struct Connector {
    engine: Arc<dyn RenderEngine>,
    registry: Arc<dyn EndpointRegistry>,
    identity_key: String,
    config: Config,
    /// Degradation is logged once per outage, not per render.
    registry_degraded: AtomicBool,
}

impl Connector {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        registry: Arc<dyn EndpointRegistry>,
        config: Config,
    ) -> Self {
        let identity_key = process_identity_key(engine.kind());
        Self {
            engine,
            registry,
            identity_key,
            config,
            registry_degraded: AtomicBool::new(false),
        }
    }

    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// Attach to a known endpoint or launch a fresh browser. Errors only
    /// when both paths fail.
    pub async fn acquire(&self) -> Result<Box<dyn BrowserHandle>> {
        let candidate = candidate_endpoint(
            self.registry_lookup().await,
            self.config.engine.endpoint.as_deref(),
        );

        if let Some((endpoint, source)) = candidate {
            match self.attach_with_retries(&endpoint).await {
                Ok(handle) => {
                    info!(endpoint = %endpoint, "reusing running browser");
                    return Ok(handle);
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "stale endpoint, falling back to launch");
                    if source == EndpointSource::Registry {
                        if let Err(e) = self.registry.invalidate(&self.identity_key).await {
                            warn!(error = %e, "failed to invalidate stale registry entry");
                        }
                    }
                }
            }
        }

        let handle = self.engine.launch(&self.config.engine).await?;
        info!(endpoint = %handle.endpoint(), "launched fresh browser");
        if let Err(e) = self
            .registry
            .publish(
                &self.identity_key,
                handle.endpoint(),
                self.config.registry.ttl,
            )
            .await
        {
            warn!(error = %e, "failed to publish browser endpoint; reuse across restarts disabled");
        }
        Ok(handle)
    }

    async fn attach_with_retries(&self, endpoint: &str) -> Result<Box<dyn BrowserHandle>> {
        let retries = self.config.engine.max_attach_retries;
        let mut last_err = RenderError::acquisition("no attach attempt made");
        for attempt in 0..=retries {
            match self.attach_once(endpoint).await {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    debug!(endpoint = %endpoint, attempt, error = %e, "attach attempt failed");
                    last_err = e;
                }
            }
            if attempt < retries {
                tokio::time::sleep(jittered_retry_delay(
                    attempt,
                    self.config.engine.backoff_base,
                ))
                .await;
            }
        }
        Err(last_err)
    }

    async fn attach_once(&self, endpoint: &str) -> Result<Box<dyn BrowserHandle>> {
        let handle = self.engine.connect(endpoint).await?;
        match verify_handle(handle.as_ref(), self.config.timeouts.probe).await {
            Ok(()) => Ok(handle),
            Err(e) => {
                let _ = handle.close().await;
                Err(e)
            }
        }
    }
}

impl Connector {
    async fn registry_lookup(&self) -> Option<String> {
        match self.registry.lookup(&self.identity_key).await {
            Ok(value) => {
                self.registry_degraded.store(false, Ordering::Relaxed);
                value
            }
            Err(e) => {
                if !self.registry_degraded.swap(true, Ordering::Relaxed) {
                    warn!(
                        error = %e,
                        "endpoint registry unavailable; degrading to always-launch"
                    );
                }
                None
            }
        }
    }
}

/// A connected websocket is not proof of a usable browser. Open and close a
/// throwaway context/page within a short timeout to be sure.
pub async fn verify_handle(handle: &dyn BrowserHandle, probe_timeout: Duration) -> Result<()> {
    timeout(probe_timeout, async {
        let context = handle.new_context().await?;
        let result = async {
            let page = context.new_page().await?;
            page.close().await
        }
        .await;
        let close_result = context.close().await;
        result.and(close_result)
    })
    .await
    .map_err(|_| RenderError::timeout("endpoint verification", probe_timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_candidate_wins_over_static() {
        let picked = candidate_endpoint(Some("ws://from-registry".to_string()), Some("ws://static"));
        assert_eq!(
            picked,
            Some(("ws://from-registry".to_string(), EndpointSource::Registry))
        );
    }

    #[test]
    fn static_candidate_used_when_registry_is_empty() {
        let picked = candidate_endpoint(None, Some("ws://static"));
        assert_eq!(picked, Some(("ws://static".to_string(), EndpointSource::Static)));
    }

    #[test]
    fn no_candidate_means_launch() {
        assert_eq!(candidate_endpoint(None, None), None);
    }
}
