//! Client configuration.

use crate::cache::CachePolicy;
use crate::camera::{DEFAULT_SCALE, MAX_SCALE, MIN_SCALE, Viewport};
use crate::input::DEFAULT_CLICK_THRESHOLD;
use crate::socket::feed_url_for_origin;
use crate::tile::Rgb;
use kurbo::Size;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(String),
    #[error("Invalid background color: {0}")]
    Color(String),
    #[error("Invalid scale limits: min {min}, max {max}")]
    ScaleLimits { min: String, max: String },
}

/// Settings for a map client. Every field has a default, so a JSON file only
/// needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Origin of the HTTP API (`/api/map`, `/api/nbt`).
    pub api_base: String,
    /// Realtime feed URL; derived from `api_base` when unset.
    pub feed_url: Option<String>,
    pub min_scale: f64,
    pub max_scale: f64,
    pub initial_scale: f64,
    /// Chunks prefetched on every side of the viewport.
    pub prefetch_margin: i32,
    /// Window inbound pixel bursts are buffered for.
    pub batch_window_ms: u64,
    /// Manhattan distance in pixels below which a release is a click.
    pub click_threshold: f64,
    /// Canvas background, `#rrggbb`.
    pub background: String,
    /// Cap on loaded chunks kept outside the viewport; unbounded if unset.
    pub max_cached_chunks: Option<usize>,
    /// Cancel tile fetches that scroll out of view.
    pub cancel_offscreen: bool,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:3000".to_string(),
            feed_url: None,
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
            initial_scale: DEFAULT_SCALE,
            prefetch_margin: 1,
            batch_window_ms: 1000,
            click_threshold: DEFAULT_CLICK_THRESHOLD,
            background: "#1f1f1f".to_string(),
            max_cached_chunks: None,
            cancel_offscreen: false,
        }
    }
}

impl CanvasConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.background_color()?;
        let ok = self.min_scale.is_finite()
            && self.max_scale.is_finite()
            && self.min_scale > 0.0
            && self.min_scale <= self.max_scale;
        if !ok {
            return Err(ConfigError::ScaleLimits {
                min: self.min_scale.to_string(),
                max: self.max_scale.to_string(),
            });
        }
        Ok(())
    }

    pub fn background_color(&self) -> Result<Rgb, ConfigError> {
        Rgb::from_hex(&self.background).ok_or_else(|| ConfigError::Color(self.background.clone()))
    }

    pub fn feed_url(&self) -> String {
        self.feed_url
            .clone()
            .unwrap_or_else(|| feed_url_for_origin(&self.api_base))
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            prefetch_margin: self.prefetch_margin.max(0),
            max_cached: self.max_cached_chunks,
            cancel_offscreen: self.cancel_offscreen,
        }
    }

    /// A viewport of `size` with the configured scale settings.
    pub fn viewport(&self, size: Size) -> Viewport {
        Viewport {
            scale: self.initial_scale,
            ..Viewport::new(size)
        }
        .with_scale_limits(self.min_scale, self.max_scale)
    }
}
