//! Mock engine used by the integration tests.
//!
//! Implements the engine traits with in-memory state so pool behavior
//! (single launch, concurrency caps, restart gating, disconnects) can be
//! exercised without a real browser. Screenshot bytes encode the captured
//! height as their length, which lets tests assert segment geometry.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rasterpool_lib::engine::{
    BrowserHandle, ContentBox, PageContext, PageHandle, RenderEngine, Screenshot,
};
use rasterpool_lib::{Config, RenderError, Result, Viewport};
use tokio::sync::watch;

#[derive(Default)]
pub struct MockState {
    pub launches: AtomicUsize,
    pub connects: AtomicUsize,
    pub launch_delay_ms: AtomicU32,
    pub capture_delay_ms: AtomicU32,
    pub content_width: AtomicU32,
    pub content_height: AtomicU32,
    pub fail_probe: AtomicBool,
    connectable: Mutex<HashSet<String>>,
    live: Mutex<Vec<Arc<HandleState>>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        let state = Arc::new(Self::default());
        state.content_width.store(800, Ordering::SeqCst);
        state.content_height.store(600, Ordering::SeqCst);
        state
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_content(&self, width: u32, height: u32) {
        self.content_width.store(width, Ordering::SeqCst);
        self.content_height.store(height, Ordering::SeqCst);
    }

    pub fn set_capture_delay(&self, delay: Duration) {
        self.capture_delay_ms
            .store(delay.as_millis() as u32, Ordering::SeqCst);
    }

    pub fn set_launch_delay(&self, delay: Duration) {
        self.launch_delay_ms
            .store(delay.as_millis() as u32, Ordering::SeqCst);
    }

    pub fn allow_connect(&self, endpoint: &str) {
        self.connectable
            .lock()
            .unwrap()
            .insert(endpoint.to_string());
    }

    /// Kill the most recently created browser: pending and future page
    /// operations fail, and the disconnect channel flips.
    pub fn trigger_disconnect(&self) {
        let handles = self.live.lock().unwrap();
        if let Some(handle) = handles.last() {
            handle.kill();
        }
    }

    fn register_handle(&self, handle: Arc<HandleState>) {
        self.allow_connect(&handle.endpoint);
        self.live.lock().unwrap().push(handle);
    }
}

struct HandleState {
    endpoint: String,
    closed: AtomicBool,
    disconnect_tx: watch::Sender<bool>,
    engine: Arc<MockState>,
}

impl HandleState {
    fn kill(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.disconnect_tx.send_replace(true);
    }

    fn check_alive(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RenderError::engine("connection is closed"))
        } else {
            Ok(())
        }
    }
}

pub struct MockEngine {
    pub state: Arc<MockState>,
}

impl MockEngine {
    pub fn new(state: Arc<MockState>) -> Arc<Self> {
        Arc::new(Self { state })
    }

    fn make_handle(&self, endpoint: String) -> MockHandle {
        let (disconnect_tx, _) = watch::channel(false);
        let inner = Arc::new(HandleState {
            endpoint,
            closed: AtomicBool::new(false),
            disconnect_tx,
            engine: self.state.clone(),
        });
        self.state.register_handle(inner.clone());
        MockHandle { inner }
    }
}

#[async_trait]
impl RenderEngine for MockEngine {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn launch(&self, _config: &rasterpool_lib::EngineConfig) -> Result<Box<dyn BrowserHandle>> {
        let delay = self.state.launch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        let n = self.state.launches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(self.make_handle(format!("ws://mock/{}", n))))
    }

    async fn connect(&self, endpoint: &str) -> Result<Box<dyn BrowserHandle>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let connectable = self.state.connectable.lock().unwrap().contains(endpoint);
        if !connectable {
            return Err(RenderError::engine(format!(
                "connect to {} failed: connection refused",
                endpoint
            )));
        }
        Ok(Box::new(self.make_handle(endpoint.to_string())))
    }
}

pub struct MockHandle {
    inner: Arc<HandleState>,
}

#[async_trait]
impl BrowserHandle for MockHandle {
    fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    fn disconnects(&self) -> watch::Receiver<bool> {
        self.inner.disconnect_tx.subscribe()
    }

    async fn new_context(&self) -> Result<Box<dyn PageContext>> {
        self.inner.check_alive()?;
        Ok(Box::new(MockContext {
            handle: self.inner.clone(),
        }))
    }

    async fn probe(&self) -> Result<()> {
        self.inner.check_alive()?;
        if self.inner.engine.fail_probe.load(Ordering::SeqCst) {
            return Err(RenderError::engine("probe failed"));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.inner.kill();
        Ok(())
    }
}

pub struct MockContext {
    handle: Arc<HandleState>,
}

#[async_trait]
impl PageContext for MockContext {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        self.handle.check_alive()?;
        Ok(Box::new(MockPage {
            handle: self.handle.clone(),
            viewport: Mutex::new(Viewport::default()),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MockPage {
    handle: Arc<HandleState>,
    viewport: Mutex<Viewport>,
}

#[async_trait]
impl PageHandle for MockPage {
    async fn goto(&self, _url: &str) -> Result<()> {
        self.handle.check_alive()
    }

    async fn wait_for_images(&self) -> Result<()> {
        self.handle.check_alive()
    }

    async fn content_box(&self, _selector: &str) -> Result<Option<ContentBox>> {
        self.handle.check_alive()?;
        Ok(Some(ContentBox {
            x: 0.0,
            y: 0.0,
            width: self.handle.engine.content_width.load(Ordering::SeqCst) as f64,
            height: self.handle.engine.content_height.load(Ordering::SeqCst) as f64,
        }))
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.handle.check_alive()?;
        *self.viewport.lock().unwrap() = viewport;
        Ok(())
    }

    async fn scroll_to(&self, _y: u32) -> Result<()> {
        self.handle.check_alive()
    }

    async fn screenshot(&self, params: Screenshot) -> Result<Vec<u8>> {
        let delay = self.handle.engine.capture_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.handle.check_alive()?;
        let height = if let Some(clip) = params.clip {
            clip.height.ceil() as usize
        } else if params.full_page {
            self.handle.engine.content_height.load(Ordering::SeqCst) as usize
        } else {
            self.viewport.lock().unwrap().height as usize
        };
        Ok(vec![0u8; height.max(1)])
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Test config with short waits so failure cases don't drag the suite.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.max_concurrent = 3;
    config.restart_threshold = 100;
    config.multi_page_height = 400;
    config.health_interval = Duration::from_secs(600);
    config.timeouts.admission = Duration::from_secs(5);
    config.timeouts.init_wait = Duration::from_secs(5);
    config.timeouts.probe = Duration::from_secs(1);
    config.engine.backoff_base = Duration::from_millis(10);
    config.engine.max_attach_retries = 1;
    config
}

/// Poll until `predicate` holds or the deadline passes.
pub async fn wait_until(deadline: Duration, predicate: impl Fn() -> bool) {
    let step = Duration::from_millis(25);
    let mut waited = Duration::ZERO;
    while waited < deadline {
        if predicate() {
            return;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    panic!("condition not reached within {:?}", deadline);
}
