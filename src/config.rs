use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{RenderError, Result, Viewport};

/// Renders between scheduled browser restarts.
pub const DEFAULT_RESTART_THRESHOLD: u32 = 100;

/// Height in CSS pixels of one multi-page segment.
pub const DEFAULT_MULTI_PAGE_HEIGHT: u32 = 4000;

/// Chromium refuses viewports taller than this.
pub const VIEWPORT_HARD_CAP: u32 = 16_384;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
    pub viewport: Viewport,
    pub max_concurrent: usize,
    pub restart_threshold: u32,
    pub multi_page_height: u32,
    #[serde(with = "humantime_serde")]
    pub health_interval: Duration,
    pub timeouts: Timeouts,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Browser executable; `None` lets the engine auto-detect.
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
    pub headless: bool,
    /// Statically configured control endpoint, tried when the registry has
    /// no candidate.
    pub endpoint: Option<String>,
    pub max_attach_retries: u32,
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub image_wait: Duration,
    /// How long concurrent callers wait for an in-flight initialization.
    #[serde(with = "humantime_serde")]
    pub init_wait: Duration,
    /// Overall deadline for a job waiting on a render slot.
    #[serde(with = "humantime_serde")]
    pub admission: Duration,
    #[serde(with = "humantime_serde")]
    pub probe: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// State file for the shared endpoint registry; `None` keeps the
    /// registry in memory only (no cross-process reuse).
    pub path: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: None,
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            headless: true,
            endpoint: None,
            max_attach_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            image_wait: Duration::from_secs(15),
            init_wait: Duration::from_secs(30),
            admission: Duration::from_secs(30),
            probe: Duration::from_secs(5),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            viewport: Viewport::default(),
            max_concurrent: 3,
            restart_threshold: DEFAULT_RESTART_THRESHOLD,
            multi_page_height: DEFAULT_MULTI_PAGE_HEIGHT,
            health_interval: Duration::from_secs(90),
            timeouts: Timeouts::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, the central config, or defaults.
    /// Priority: explicit path > ~/.config/rasterpool/config.toml > defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::central_config_path().filter(|p| p.exists()),
        };

        let Some(file) = resolved else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(&file).map_err(|e| {
            RenderError::Config(format!("Failed to read config {}: {}", file.display(), e))
        })?;
        toml::from_str(&raw).map_err(|e| {
            RenderError::Config(format!("Invalid config {}: {}", file.display(), e))
        })
    }

    pub fn central_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config/rasterpool/config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(RenderError::Config(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.restart_threshold == 0 {
            return Err(RenderError::Config(
                "restart_threshold must be at least 1".to_string(),
            ));
        }
        if self.multi_page_height == 0 {
            return Err(RenderError::Config(
                "multi_page_height must be positive".to_string(),
            ));
        }
        if self.multi_page_height + 100 > VIEWPORT_HARD_CAP {
            return Err(RenderError::Config(format!(
                "multi_page_height {} exceeds the viewport hard cap {}",
                self.multi_page_height, VIEWPORT_HARD_CAP
            )));
        }
        if self.health_interval < Duration::from_secs(10) {
            return Err(RenderError::Config(
                "health_interval below 10s would race in-flight renders".to_string(),
            ));
        }
        Ok(())
    }
}
