//! Rasterpool Library
//!
//! A browser render pool: rasterize HTML documents (or live URLs) into
//! raster images over a single long-lived headless browser shared by
//! concurrent jobs and, via a published endpoint, by other processes on the
//! same host.
//!
//! # Module Overview
//!
//! - [`service`] - The [`RenderPool`] façade (screenshot / restart / cleanup)
//! - [`engine`] - Opaque headless-engine traits and the Chromium implementation
//! - [`lifecycle`] - Browser ownership, serialized init, crash recovery
//! - [`connector`] - Attach-or-launch acquisition with backoff
//! - [`registry`] - Cross-process endpoint registry
//! - [`scheduler`] - Concurrency-bounded job admission
//! - [`capture`] - Per-job navigation and screenshot capture
//! - [`segments`] - Multi-page segment geometry
//! - [`config`] - Configuration file support
//!
//! # Example
//!
//! ```no_run
//! use rasterpool_lib::{Config, RenderPool, RenderRequest, Viewport};
//!
//! # async fn example() -> rasterpool_lib::Result<()> {
//! let pool = RenderPool::new(Config::default())?;
//! let request = RenderRequest::url("example", "https://example.com")
//!     .with_viewport(Viewport::new(1280, 720))
//!     .with_full_page(true);
//! let output = pool.screenshot(&request).await?;
//! println!("captured {} page(s)", output.page_count());
//! pool.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod capture;
pub mod config;
pub mod connector;
pub mod engine;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod registry;
pub mod request;
pub mod scheduler;
pub mod segments;
pub mod service;
pub mod viewport;

pub use config::{Config, EngineConfig, RegistryConfig, Timeouts};
pub use engine::{BrowserHandle, ContentBox, PageContext, PageHandle, RenderEngine, Screenshot};
pub use error::{ErrorCategory, ErrorPayload, RenderError, Result};
pub use lifecycle::{LifecycleController, PoolState};
pub use registry::{
    process_identity_key, EndpointRegistry, FileRegistry, MemoryRegistry,
};
pub use request::{
    CaptureStrategy, ClipRegion, ImageType, RenderOutput, RenderRequest, RenderSource,
};
pub use scheduler::RenderGate;
pub use segments::{segment_plan, Segment};
pub use service::{RenderPool, TemplateResolver};
pub use viewport::Viewport;
