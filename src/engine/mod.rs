//! Opaque headless-engine capability.
//!
//! The pool never talks a remote-control protocol directly; it consumes
//! these traits: launch or attach to a browser, open an isolated context,
//! drive one page, capture bytes. The production implementation sits on
//! Chromium's DevTools protocol ([`chromium`]); tests substitute mocks.
//!
//! # Module Structure
//!
//! - [`chromium`] - chromiumoxide-backed engine (feature `chromium`)

#[cfg(feature = "chromium")]
pub mod chromium;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::request::{ClipRegion, ImageType};
use crate::{Result, Viewport};

/// Parameters for one capture, already resolved by the capturer.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub image_type: ImageType,
    /// JPEG quality 1-100.
    pub quality: Option<u8>,
    /// Capture this document region instead of the viewport.
    pub clip: Option<ClipRegion>,
    /// Capture the full scrollable document.
    pub full_page: bool,
}

/// Axis-aligned box of the content element, in CSS pixels relative to the
/// document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Engine type tag used in registry keys ("chromium", ...).
    fn kind(&self) -> &'static str;

    /// Spawn a fresh browser process.
    async fn launch(&self, config: &EngineConfig) -> Result<Box<dyn BrowserHandle>>;

    /// Attach to an already-running browser via its control endpoint.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn BrowserHandle>>;
}

#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Control endpoint other processes can attach to.
    fn endpoint(&self) -> &str;

    /// Receiver flipped to `true` exactly once, when the engine connection
    /// drops. Subscribers use it as the forced-restart trigger.
    fn disconnects(&self) -> watch::Receiver<bool>;

    /// Open an isolated context: no cookie/storage leakage between jobs.
    async fn new_context(&self) -> Result<Box<dyn PageContext>>;

    /// Cheap liveness probe; an error means the browser is gone or wedged.
    async fn probe(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait PageContext: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>>;

    /// Dispose the context and any pages still in it.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the configured load condition. Callers bound
    /// this with a hard timeout.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Resolve once every `<img>` on the page finished loading (or failed).
    /// Callers bound this with a hard timeout.
    async fn wait_for_images(&self) -> Result<()>;

    /// Bounding box of the first element matching `selector`, if any.
    async fn content_box(&self, selector: &str) -> Result<Option<ContentBox>>;

    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;

    /// Scroll the document so `y` is at the viewport top.
    async fn scroll_to(&self, y: u32) -> Result<()>;

    async fn screenshot(&self, params: Screenshot) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}

impl Screenshot {
    pub fn element_clip(image_type: ImageType, quality: Option<u8>, content: ContentBox) -> Self {
        Self {
            image_type,
            quality,
            clip: Some(ClipRegion {
                x: content.x,
                y: content.y,
                width: content.width,
                height: content.height,
            }),
            full_page: false,
        }
    }

    pub fn full_page(image_type: ImageType, quality: Option<u8>) -> Self {
        Self {
            image_type,
            quality,
            clip: None,
            full_page: true,
        }
    }

    pub fn viewport(image_type: ImageType, quality: Option<u8>) -> Self {
        Self {
            image_type,
            quality,
            clip: None,
            full_page: false,
        }
    }
}
