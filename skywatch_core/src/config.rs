//! Render configuration table.
//!
//! All thresholds, tolerances, opacities, colors and dash patterns used by
//! the render decision live here so they can be tuned without touching the
//! reconciler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Configuration for the simplification policy and the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Visible-track count from which polylines are simplified (default: 200)
    pub dense_threshold: usize,

    /// Visible-track count above which non-selected tracks lose their line (default: 500)
    pub line_ceiling: usize,

    /// Visible-track count above which non-selected tracks get an unrotated dot (default: 1000)
    pub heading_ceiling: usize,

    /// Simplification tolerance at the dense threshold, in degrees (default: 0.01)
    pub min_tolerance: f64,

    /// Simplification tolerance at the heading ceiling, in degrees (default: 0.1)
    pub max_tolerance: f64,

    /// Opacity of the selected track (default: 1.0)
    pub selected_opacity: f64,

    /// Opacity of every other track while something is selected (default: 0.1)
    pub dimmed_opacity: f64,

    /// Opacity when nothing is selected, within 0.6..=0.8 (default: 0.6)
    pub neutral_opacity: f64,

    /// Polyline stroke weight in pixels (default: 4)
    pub line_weight: u32,

    /// Rotation baked into the aircraft glyph asset, subtracted from the bearing (default: 45°)
    pub glyph_offset_deg: f64,

    /// Color for classifications missing from the registry
    pub fallback_color: String,

    /// Initial classification palette, name → color
    pub palette: BTreeMap<String, String>,

    /// Decorative dash pattern for the selected track, keyed by classification
    pub dash_patterns: BTreeMap<String, String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let palette = [
            ("commercial", "#00ff00"),
            ("survey", "#ff0000"),
            ("agriculture", "#FFA500"),
            ("cloud seeding", "#0000FF"),
            ("crop dusting", "#FF00FF"),
            ("rescue", "#FFFF00"),
            ("chemtrail", "#800080"),
            ("unknown", "#808080"),
        ];
        let dashes = [
            ("cloud seeding", "10, 5"),
            ("crop dusting", "5, 10, 5"),
            ("rescue", "15, 5"),
        ];

        Self {
            dense_threshold: 200,
            line_ceiling: 500,
            heading_ceiling: 1000,
            min_tolerance: 0.01,
            max_tolerance: 0.1,
            selected_opacity: 1.0,
            dimmed_opacity: 0.1,
            neutral_opacity: 0.6,
            line_weight: 4,
            glyph_offset_deg: 45.0,
            fallback_color: "#808080".to_string(),
            palette: palette
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            dash_patterns: dashes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl RenderConfig {
    /// Loads a configuration from a JSON file; absent keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: RenderConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the render decision depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dense_threshold <= self.line_ceiling
            && self.line_ceiling <= self.heading_ceiling)
        {
            return Err(ConfigError::ThresholdOrder {
                dense: self.dense_threshold,
                line: self.line_ceiling,
                heading: self.heading_ceiling,
            });
        }
        if !(0.6..=0.8).contains(&self.neutral_opacity) {
            return Err(ConfigError::NeutralOpacity(self.neutral_opacity));
        }
        for opacity in [self.selected_opacity, self.dimmed_opacity] {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(ConfigError::Opacity(opacity));
            }
        }
        if !(self.min_tolerance > 0.0 && self.min_tolerance <= self.max_tolerance) {
            return Err(ConfigError::Tolerance {
                min: self.min_tolerance,
                max: self.max_tolerance,
            });
        }
        Ok(())
    }
}

/// Dashboard settings outside the render decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Lines kept in the operator log before the oldest is dropped (default: 200)
    pub log_capacity: usize,

    /// Compute an initial view from the first non-empty batch (default: true)
    pub fit_initial_view: bool,

    /// Buffer size of the in-process update channel (default: 256)
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_capacity: 200,
            fit_initial_view: true,
            channel_capacity: 256,
        }
    }
}

/// Errors raised while loading or validating a [`RenderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Thresholds must satisfy dense <= line <= heading (got {dense}, {line}, {heading})")]
    ThresholdOrder {
        dense: usize,
        line: usize,
        heading: usize,
    },

    #[error("Neutral opacity {0} outside 0.6..=0.8")]
    NeutralOpacity(f64),

    #[error("Opacity {0} outside 0.0..=1.0")]
    Opacity(f64),

    #[error("Tolerance range invalid (min {min}, max {max})")]
    Tolerance { min: f64, max: f64 },

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.palette.get("survey").map(String::as_str), Some("#ff0000"));
        assert_eq!(config.dash_patterns.len(), 3);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: RenderConfig =
            serde_json::from_str(r#"{"line_ceiling": 400, "neutral_opacity": 0.7}"#).unwrap();
        assert_eq!(config.line_ceiling, 400);
        assert_eq!(config.dense_threshold, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_order_violation() {
        let config = RenderConfig {
            line_ceiling: 100,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ThresholdOrder { .. })));
    }

    #[test]
    fn test_neutral_opacity_range() {
        let config = RenderConfig {
            neutral_opacity: 0.9,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NeutralOpacity(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = RenderConfig::from_json_file("/nonexistent/skywatch.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
