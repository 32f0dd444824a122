use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RenderError, Result, Viewport};

/// Container element captured by default when the page provides one.
pub const DEFAULT_CONTENT_SELECTOR: &str = "#container";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderSource {
    /// Local HTML artifact produced by the templating layer.
    File(PathBuf),
    /// Live URL.
    Url(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[default]
    Png,
    Jpeg,
}

impl ImageType {
    pub fn extension(self) -> &'static str {
        match self {
            ImageType::Png => "png",
            ImageType::Jpeg => "jpeg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub name: String,
    pub source: RenderSource,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub multi_page: bool,
    /// Segment height override; falls back to the pool config.
    #[serde(default)]
    pub multi_page_height: Option<u32>,
    #[serde(default)]
    pub image_type: ImageType,
    /// JPEG quality 1-100; ignored for PNG.
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub clip: Option<ClipRegion>,
    #[serde(default)]
    pub full_page: bool,
    /// Element captured by the default strategy; `None` tries
    /// [`DEFAULT_CONTENT_SELECTOR`] and then the document body.
    #[serde(default)]
    pub content_selector: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub navigation_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub image_wait: Option<Duration>,
}

impl RenderRequest {
    pub fn url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, RenderSource::Url(url.into()))
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(name, RenderSource::File(path.into()))
    }

    fn new(name: impl Into<String>, source: RenderSource) -> Self {
        Self {
            name: name.into(),
            source,
            viewport: None,
            multi_page: false,
            multi_page_height: None,
            image_type: ImageType::default(),
            quality: None,
            clip: None,
            full_page: false,
            content_selector: None,
            navigation_timeout: None,
            image_wait: None,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_full_page(mut self, full_page: bool) -> Self {
        self.full_page = full_page;
        self
    }

    pub fn with_multi_page(mut self, multi_page: bool) -> Self {
        self.multi_page = multi_page;
        self
    }

    pub fn with_multi_page_height(mut self, height: u32) -> Self {
        self.multi_page_height = Some(height);
        self
    }

    pub fn with_clip(mut self, clip: ClipRegion) -> Self {
        self.clip = Some(clip);
        self
    }

    pub fn with_image_type(mut self, image_type: ImageType) -> Self {
        self.image_type = image_type;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RenderError::InvalidRequest(
                "request name must not be empty".to_string(),
            ));
        }
        if let Some(q) = self.quality {
            if self.image_type != ImageType::Jpeg {
                return Err(RenderError::InvalidRequest(
                    "quality only applies to jpeg output".to_string(),
                ));
            }
            if !(1..=100).contains(&q) {
                return Err(RenderError::InvalidRequest(format!(
                    "quality must be 1-100, got {}",
                    q
                )));
            }
        }
        if let Some(h) = self.multi_page_height {
            if h == 0 {
                return Err(RenderError::InvalidRequest(
                    "multiPageHeight must be positive".to_string(),
                ));
            }
        }
        if let Some(clip) = &self.clip {
            if clip.width <= 0.0 || clip.height <= 0.0 {
                return Err(RenderError::InvalidRequest(
                    "clip region must have positive dimensions".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// The capture strategy a request resolves to. Selection is deterministic:
/// fullPage wins over clip, clip over multiPage, and element capture is the
/// fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureStrategy {
    FullPage,
    Clip(ClipRegion),
    MultiPage,
    Element,
}

impl CaptureStrategy {
    pub fn select(request: &RenderRequest) -> Self {
        if request.full_page {
            CaptureStrategy::FullPage
        } else if let Some(clip) = request.clip {
            CaptureStrategy::Clip(clip)
        } else if request.multi_page {
            CaptureStrategy::MultiPage
        } else {
            CaptureStrategy::Element
        }
    }
}

/// A successful render. Failed jobs surface as [`RenderError`], never as an
/// empty output.
#[derive(Debug, Clone)]
pub enum RenderOutput {
    Single(Vec<u8>),
    /// Ordered top-to-bottom, page 1 first.
    Pages(Vec<Vec<u8>>),
}

impl RenderOutput {
    pub fn page_count(&self) -> usize {
        match self {
            RenderOutput::Single(_) => 1,
            RenderOutput::Pages(pages) => pages.len(),
        }
    }

    pub fn into_pages(self) -> Vec<Vec<u8>> {
        match self {
            RenderOutput::Single(bytes) => vec![bytes],
            RenderOutput::Pages(pages) => pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> RenderRequest {
        RenderRequest::url("card", "https://example.com")
    }

    #[test]
    fn strategy_defaults_to_element_capture() {
        assert_eq!(
            CaptureStrategy::select(&base_request()),
            CaptureStrategy::Element
        );
    }

    #[test]
    fn full_page_wins_over_everything() {
        let req = base_request()
            .with_full_page(true)
            .with_multi_page(true)
            .with_clip(ClipRegion {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            });
        assert_eq!(CaptureStrategy::select(&req), CaptureStrategy::FullPage);
    }

    #[test]
    fn clip_wins_over_multi_page() {
        let clip = ClipRegion {
            x: 1.0,
            y: 2.0,
            width: 10.0,
            height: 20.0,
        };
        let req = base_request().with_multi_page(true).with_clip(clip);
        assert_eq!(CaptureStrategy::select(&req), CaptureStrategy::Clip(clip));
    }

    #[test]
    fn multi_page_selected_when_flagged_alone() {
        let req = base_request().with_multi_page(true);
        assert_eq!(CaptureStrategy::select(&req), CaptureStrategy::MultiPage);
    }

    #[test]
    fn quality_requires_jpeg() {
        let req = base_request().with_quality(80);
        assert!(req.validate().is_err());

        let req = base_request()
            .with_image_type(ImageType::Jpeg)
            .with_quality(80);
        assert!(req.validate().is_ok());

        let req = base_request()
            .with_image_type(ImageType::Jpeg)
            .with_quality(0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn empty_name_is_rejected() {
        let req = RenderRequest::url("", "https://example.com");
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_deserializes_from_camel_case_json() {
        let req: RenderRequest = serde_json::from_str(
            r#"{
                "name": "weekly-report",
                "source": {"file": "/tmp/report.html"},
                "multiPage": true,
                "multiPageHeight": 4000,
                "imageType": "jpeg",
                "quality": 90
            }"#,
        )
        .unwrap();
        assert_eq!(req.name, "weekly-report");
        assert!(req.multi_page);
        assert_eq!(req.multi_page_height, Some(4000));
        assert_eq!(req.image_type, ImageType::Jpeg);
        assert!(req.validate().is_ok());
    }
}
