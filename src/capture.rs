//! Per-job capture: isolated context, navigation, readiness wait, and the
//! single- or multi-segment screenshot walk.
//!
//! Every exit path tears the page and context down before returning, so a
//! crashed job never leaks browser-side state into the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::engine::{BrowserHandle, ContentBox, PageContext, PageHandle, Screenshot};
use crate::request::{
    CaptureStrategy, ClipRegion, RenderOutput, RenderRequest, RenderSource,
    DEFAULT_CONTENT_SELECTOR,
};
use crate::segments::{last_viewport_height, segment_plan, segment_viewport_height};
use crate::{RenderError, Result, Viewport};

/// Pause after each scroll so layout and lazy content settle before the
/// capture.
const SCROLL_SETTLE: Duration = Duration::from_millis(200);

/// Resolve a request source to a navigable URL. File sources must exist on
/// disk; this is checked before any browser work so a missing artifact fails
/// fast and cheap.
pub fn resolve_source(source: &RenderSource) -> Result<String> {
    match source {
        RenderSource::Url(raw) => Ok(Url::parse(raw)?.to_string()),
        RenderSource::File(path) => {
            if !path.exists() {
                return Err(RenderError::MissingArtifact(path.clone()));
            }
            let absolute = std::fs::canonicalize(path)?;
            Url::from_file_path(&absolute)
                .map(|u| u.to_string())
                .map_err(|_| {
                    RenderError::InvalidRequest(format!(
                        "cannot build file URL from {}",
                        absolute.display()
                    ))
                })
        }
    }
}

pub struct Capturer {
    config: Config,
}

impl Capturer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run one admitted render job against a live handle.
    pub async fn capture(
        &self,
        handle: &Arc<dyn BrowserHandle>,
        request: &RenderRequest,
    ) -> Result<RenderOutput> {
        request.validate()?;
        let url = resolve_source(&request.source)?;

        let context = handle.new_context().await?;
        let result = self.capture_in_context(context.as_ref(), request, &url).await;
        if let Err(e) = context.close().await {
            debug!(job = %request.name, error = %e, "context teardown failed");
        }
        result
    }

    async fn capture_in_context(
        &self,
        context: &dyn PageContext,
        request: &RenderRequest,
        url: &str,
    ) -> Result<RenderOutput> {
        let page = context.new_page().await?;
        let result = self.capture_on_page(page.as_ref(), request, url).await;
        if let Err(e) = page.close().await {
            debug!(job = %request.name, error = %e, "page teardown failed");
        }
        result
    }

    async fn capture_on_page(
        &self,
        page: &dyn PageHandle,
        request: &RenderRequest,
        url: &str,
    ) -> Result<RenderOutput> {
        let viewport = request.viewport.unwrap_or(self.config.viewport);
        page.set_viewport(viewport).await?;

        let nav_timeout = request
            .navigation_timeout
            .unwrap_or(self.config.timeouts.navigation);
        timeout(nav_timeout, page.goto(url))
            .await
            .map_err(|_| RenderError::timeout("navigation", nav_timeout))??;

        let image_wait = request.image_wait.unwrap_or(self.config.timeouts.image_wait);
        match timeout(image_wait, page.wait_for_images()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            // A slow image must not fail the job; capture what has rendered.
            Err(_) => warn!(job = %request.name, "image wait timed out after {:?}", image_wait),
        }

        match CaptureStrategy::select(request) {
            CaptureStrategy::FullPage => {
                let shot = Screenshot::full_page(request.image_type, request.quality);
                Ok(RenderOutput::Single(page.screenshot(shot).await?))
            }
            CaptureStrategy::Clip(clip) => {
                let shot = Screenshot {
                    image_type: request.image_type,
                    quality: request.quality,
                    clip: Some(clip),
                    full_page: false,
                };
                Ok(RenderOutput::Single(page.screenshot(shot).await?))
            }
            CaptureStrategy::Element => {
                let content = self.find_content_box(page, request).await?;
                self.capture_element(page, request, content).await
            }
            CaptureStrategy::MultiPage => {
                let content = self.find_content_box(page, request).await?;
                self.capture_segments(page, request, viewport, content).await
            }
        }
    }

    /// Designated container if present, else the document body.
    async fn find_content_box(
        &self,
        page: &dyn PageHandle,
        request: &RenderRequest,
    ) -> Result<Option<ContentBox>> {
        let selector = request
            .content_selector
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_SELECTOR);
        if let Some(found) = page.content_box(selector).await? {
            return Ok(Some(found));
        }
        if selector != "body" {
            return page.content_box("body").await;
        }
        Ok(None)
    }

    async fn capture_element(
        &self,
        page: &dyn PageHandle,
        request: &RenderRequest,
        content: Option<ContentBox>,
    ) -> Result<RenderOutput> {
        let shot = match content {
            Some(content) if content.width > 0.0 && content.height > 0.0 => {
                Screenshot::element_clip(request.image_type, request.quality, content)
            }
            _ => Screenshot::viewport(request.image_type, request.quality),
        };
        Ok(RenderOutput::Single(page.screenshot(shot).await?))
    }

    async fn capture_segments(
        &self,
        page: &dyn PageHandle,
        request: &RenderRequest,
        viewport: Viewport,
        content: Option<ContentBox>,
    ) -> Result<RenderOutput> {
        let Some(content) = content.filter(|c| c.width > 0.0 && c.height > 0.0) else {
            // Nothing measurable to paginate over.
            let shot = Screenshot::viewport(request.image_type, request.quality);
            return Ok(RenderOutput::Single(page.screenshot(shot).await?));
        };

        let segment_height = request
            .multi_page_height
            .unwrap_or(self.config.multi_page_height);
        let total_height = content.height.ceil() as u32;
        let plan = segment_plan(total_height, segment_height);

        if plan.len() == 1 {
            return self.capture_element(page, request, Some(content)).await;
        }

        let width = (content.width.ceil() as u32).max(1);
        page.set_viewport(
            Viewport::new(width, segment_viewport_height(segment_height))
                .with_scale(viewport.device_scale_factor),
        )
        .await?;

        let mut pages = Vec::with_capacity(plan.len());
        for (i, segment) in plan.iter().enumerate() {
            let last = i + 1 == plan.len();
            if last && i > 0 {
                page.set_viewport(
                    Viewport::new(width, last_viewport_height(segment.height))
                        .with_scale(viewport.device_scale_factor),
                )
                .await?;
            }
            if i > 0 {
                page.scroll_to(segment.offset).await?;
                sleep(SCROLL_SETTLE).await;
            }
            let shot = if last && i > 0 {
                // Clip the remaining region directly instead of trusting the
                // final scroll position.
                Screenshot {
                    image_type: request.image_type,
                    quality: request.quality,
                    clip: Some(ClipRegion {
                        x: content.x,
                        y: content.y + segment.offset as f64,
                        width: width as f64,
                        height: segment.height as f64,
                    }),
                    full_page: false,
                }
            } else {
                Screenshot::viewport(request.image_type, request.quality)
            };
            pages.push(page.screenshot(shot).await?);
            debug!(
                job = %request.name,
                segment = i + 1,
                of = plan.len(),
                offset = segment.offset,
                height = segment.height,
                "captured segment"
            );
        }
        Ok(RenderOutput::Pages(pages))
    }
}
