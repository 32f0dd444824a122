use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_scale")]
    pub device_scale_factor: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
            device_scale_factor: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_scale_factor: 1.0,
        }
    }

    pub fn with_scale(mut self, device_scale_factor: f64) -> Self {
        self.device_scale_factor = device_scale_factor;
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT or WIDTHxHEIGHT@SCALE (e.g., 1440x900 or 1440x900@2)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Invalid scale factor: {0}")]
    InvalidScale(String),
    #[error("Width must be positive")]
    ZeroWidth,
    #[error("Height must be positive")]
    ZeroHeight,
    #[error("Scale factor must be positive")]
    ZeroScale,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dims, scale) = match s.split_once('@') {
            Some((dims, scale)) => (dims, Some(scale)),
            None => (s, None),
        };

        let parts: Vec<&str> = dims.split('x').collect();
        if parts.len() != 2 {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = parts[0]
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(parts[0].to_string()))?;

        let height: u32 = parts[1]
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(parts[1].to_string()))?;

        let device_scale_factor: f64 = match scale {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ViewportParseError::InvalidScale(raw.to_string()))?,
            None => 1.0,
        };

        if width == 0 {
            return Err(ViewportParseError::ZeroWidth);
        }
        if height == 0 {
            return Err(ViewportParseError::ZeroHeight);
        }
        if device_scale_factor <= 0.0 {
            return Err(ViewportParseError::ZeroScale);
        }

        Ok(Viewport {
            width,
            height,
            device_scale_factor,
        })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if (self.device_scale_factor - 1.0).abs() < f64::EPSILON {
            write!(f, "{}x{}", self.width, self.height)
        } else {
            write!(
                f,
                "{}x{}@{}",
                self.width, self.height, self.device_scale_factor
            )
        }
    }
}
