//! Chromium engine over the DevTools protocol (chromiumoxide).
//!
//! One [`ChromiumEngine`] can either spawn a browser process or attach to a
//! running one via its websocket endpoint. The CDP event handler runs on a
//! dedicated task; when its stream ends the connection is gone, and the
//! disconnect channel flips so the lifecycle controller can force a restart.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
    GetTargetsParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::Handler;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use super::{BrowserHandle, ContentBox, PageContext, PageHandle, RenderEngine, Screenshot};
use crate::config::EngineConfig;
use crate::request::ImageType;
use crate::{RenderError, Result, Viewport};

/// Resolves once every `<img>` has loaded or errored.
const IMAGE_WAIT_JS: &str = r#"
Promise.all(Array.from(document.images, img => {
    if (img.complete) return Promise.resolve(true);
    return new Promise(resolve => {
        img.addEventListener('load', () => resolve(true), { once: true });
        img.addEventListener('error', () => resolve(false), { once: true });
    });
})).then(() => true)
"#;

#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumEngine;

impl ChromiumEngine {
    pub fn new() -> Self {
        Self
    }

    fn build_config(config: &EngineConfig) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder();
        if let Some(exe) = &config.executable {
            builder = builder.chrome_executable(exe.clone());
        }
        if !config.headless {
            builder = builder.with_head();
        }
        builder = builder.args(config.args.clone());
        builder.build().map_err(RenderError::Engine)
    }

    fn wrap(browser: Browser, handler: Handler) -> ChromiumHandle {
        let endpoint = browser.websocket_address().to_string();
        let disconnect_rx = spawn_handler_loop(handler, endpoint.clone());
        ChromiumHandle {
            browser: Arc::new(Mutex::new(browser)),
            endpoint,
            disconnect_rx,
        }
    }
}

/// Drive the CDP event loop until the connection drops, then flip the
/// disconnect flag for subscribers.
fn spawn_handler_loop(mut handler: Handler, endpoint: String) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
        debug!(endpoint = %endpoint, "CDP handler loop ended");
        let _ = tx.send(true);
    });
    rx
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    fn kind(&self) -> &'static str {
        "chromium"
    }

    async fn launch(&self, config: &EngineConfig) -> Result<Box<dyn BrowserHandle>> {
        let browser_config = Self::build_config(config)?;
        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::acquisition(format!("launch failed: {}", e)))?;
        Ok(Box::new(Self::wrap(browser, handler)))
    }

    async fn connect(&self, endpoint: &str) -> Result<Box<dyn BrowserHandle>> {
        let (browser, handler) = Browser::connect(endpoint)
            .await
            .map_err(|e| RenderError::engine(format!("connect to {} failed: {}", endpoint, e)))?;
        Ok(Box::new(Self::wrap(browser, handler)))
    }
}

pub struct ChromiumHandle {
    browser: Arc<Mutex<Browser>>,
    endpoint: String,
    disconnect_rx: watch::Receiver<bool>,
}

#[async_trait]
impl BrowserHandle for ChromiumHandle {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn disconnects(&self) -> watch::Receiver<bool> {
        self.disconnect_rx.clone()
    }

    async fn new_context(&self) -> Result<Box<dyn PageContext>> {
        let browser = self.browser.lock().await;
        let resp = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| RenderError::engine(format!("createBrowserContext: {}", e)))?;
        Ok(Box::new(ChromiumContext {
            browser: self.browser.clone(),
            context_id: resp.result.browser_context_id.clone(),
        }))
    }

    async fn probe(&self) -> Result<()> {
        let browser = self.browser.lock().await;
        browser
            .execute(GetTargetsParams::default())
            .await
            .map(|_| ())
            .map_err(|e| RenderError::engine(format!("liveness probe: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| RenderError::engine(format!("browser close: {}", e)))?;
        if let Err(e) = browser.wait().await {
            warn!("browser did not exit cleanly: {}", e);
        }
        Ok(())
    }
}

pub struct ChromiumContext {
    browser: Arc<Mutex<Browser>>,
    context_id: BrowserContextId,
}

#[async_trait]
impl PageContext for ChromiumContext {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(RenderError::Engine)?;
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page(params)
                .await
                .map_err(|e| RenderError::engine(format!("newPage: {}", e)))?
        };
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<()> {
        let params = DisposeBrowserContextParams::builder()
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(RenderError::Engine)?;
        let browser = self.browser.lock().await;
        browser
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|e| RenderError::engine(format!("disposeBrowserContext: {}", e)))
    }
}

pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn evaluate_json(&self, expression: String) -> Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(RenderError::Engine)?;
        let evaluation = self
            .page
            .evaluate(params)
            .await
            .map_err(|e| RenderError::engine(format!("evaluate: {}", e)))?;
        Ok(evaluation
            .value()
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| RenderError::navigation(url, e.to_string()))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| RenderError::navigation(url, e.to_string()))?;
        Ok(())
    }

    async fn wait_for_images(&self) -> Result<()> {
        self.evaluate_json(IMAGE_WAIT_JS.to_string()).await.map(|_| ())
    }

    async fn content_box(&self, selector: &str) -> Result<Option<ContentBox>> {
        let quoted = serde_json::to_string(selector)?;
        let expression = format!(
            r#"(() => {{
                const el = document.querySelector({quoted});
                if (!el) return null;
                const r = el.getBoundingClientRect();
                return {{
                    x: r.x + window.scrollX,
                    y: r.y + window.scrollY,
                    width: r.width,
                    height: r.height
                }};
            }})()"#
        );
        let value = self.evaluate_json(expression).await?;
        if value.is_null() {
            return Ok(None);
        }
        let get = |field: &str| value.get(field).and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok(Some(ContentBox {
            x: get("x"),
            y: get("y"),
            width: get("width"),
            height: get("height"),
        }))
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(viewport.device_scale_factor)
            .mobile(false)
            .build()
            .map_err(RenderError::Engine)?;
        self.page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|e| RenderError::engine(format!("setDeviceMetricsOverride: {}", e)))
    }

    async fn scroll_to(&self, y: u32) -> Result<()> {
        self.evaluate_json(format!("(() => {{ window.scrollTo(0, {y}); return true; }})()"))
            .await
            .map(|_| ())
    }

    async fn screenshot(&self, params: Screenshot) -> Result<Vec<u8>> {
        let format = match params.image_type {
            ImageType::Png => CaptureScreenshotFormat::Png,
            ImageType::Jpeg => CaptureScreenshotFormat::Jpeg,
        };
        let mut builder = ScreenshotParams::builder()
            .format(format)
            .full_page(params.full_page);
        if let Some(quality) = params.quality {
            builder = builder.quality(quality as i64);
        }
        if let Some(clip) = params.clip {
            builder = builder.clip(chromiumoxide::cdp::browser_protocol::page::Viewport {
                x: clip.x,
                y: clip.y,
                width: clip.width,
                height: clip.height,
                scale: 1.0,
            });
        }
        self.page
            .screenshot(builder.build())
            .await
            .map_err(|e| RenderError::engine(format!("captureScreenshot: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| RenderError::engine(format!("page close: {}", e)))
    }
}
