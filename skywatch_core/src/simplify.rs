//! Level-of-detail decision and polyline reduction.
//!
//! The decision depends only on the number of visible tracks and on whether
//! the track in question is selected:
//!
//! | visible tracks T          | non-selected track                         |
//! |---------------------------|--------------------------------------------|
//! | T < dense_threshold       | full resolution, line, oriented glyph      |
//! | T >= dense_threshold      | simplified line (tolerance grows with T)   |
//! | T > line_ceiling          | marker only                                |
//! | T > heading_ceiling       | marker only, unrotated dot                 |
//!
//! The selected track always gets the first row.

use geo::{algorithm::simplify::Simplify, Coord, LineString};
use serde::Serialize;

use crate::config::RenderConfig;

/// Point fidelity of a polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Resolution {
    Full,
    Reduced { tolerance: f64 },
}

/// What to draw for one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LodDecision {
    pub resolution: Resolution,

    /// Whether a polyline is drawn at all
    pub draw_line: bool,

    /// Whether the marker is a rotated aircraft glyph (else a plain dot)
    pub orient_glyph: bool,
}

impl LodDecision {
    /// Full fidelity: used for the selected track and sparse fleets.
    pub const FULL: LodDecision = LodDecision {
        resolution: Resolution::Full,
        draw_line: true,
        orient_glyph: true,
    };
}

/// Level-of-detail policy derived from a [`RenderConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimplificationPolicy {
    dense_threshold: usize,
    line_ceiling: usize,
    heading_ceiling: usize,
    min_tolerance: f64,
    max_tolerance: f64,
}

impl Default for SimplificationPolicy {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

impl SimplificationPolicy {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            dense_threshold: config.dense_threshold,
            line_ceiling: config.line_ceiling,
            heading_ceiling: config.heading_ceiling,
            min_tolerance: config.min_tolerance,
            max_tolerance: config.max_tolerance,
        }
    }

    /// Decides the level of detail for one track given the visible-track count.
    pub fn decide(&self, total_visible: usize, selected: bool) -> LodDecision {
        if selected || total_visible < self.dense_threshold {
            return LodDecision::FULL;
        }

        LodDecision {
            resolution: Resolution::Reduced {
                tolerance: self.tolerance_for(total_visible),
            },
            draw_line: total_visible <= self.line_ceiling,
            orient_glyph: total_visible <= self.heading_ceiling,
        }
    }

    /// Reduction tolerance for `total_visible` tracks, in degrees.
    ///
    /// Linear from `min_tolerance` at the dense threshold to `max_tolerance`
    /// at the heading ceiling, clamped on both sides.
    pub fn tolerance_for(&self, total_visible: usize) -> f64 {
        let span = self.heading_ceiling.saturating_sub(self.dense_threshold);
        if span == 0 {
            return if total_visible >= self.heading_ceiling {
                self.max_tolerance
            } else {
                self.min_tolerance
            };
        }

        let t = (total_visible.saturating_sub(self.dense_threshold) as f64 / span as f64)
            .clamp(0.0, 1.0);
        self.min_tolerance + t * (self.max_tolerance - self.min_tolerance)
    }

    /// Returns the valid `(lat, lon)` vertices of a polyline at `resolution`.
    ///
    /// Invalid (non-numeric) points are dropped first. A reduced line keeps
    /// its first and last vertex and never has more points than its input.
    pub fn apply(&self, coords: &[(f64, f64)], resolution: Resolution) -> Vec<(f64, f64)> {
        let valid: Vec<(f64, f64)> = coords
            .iter()
            .copied()
            .filter(|(lat, lon)| lat.is_finite() && lon.is_finite())
            .collect();

        match resolution {
            Resolution::Full => valid,
            Resolution::Reduced { tolerance } => reduce(&valid, tolerance),
        }
    }
}

/// Ramer–Douglas–Peucker in (lon, lat) space.
fn reduce(coords: &[(f64, f64)], tolerance: f64) -> Vec<(f64, f64)> {
    if coords.len() < 3 {
        return coords.to_vec();
    }

    let line = LineString::new(
        coords
            .iter()
            .map(|&(lat, lon)| Coord { x: lon, y: lat })
            .collect(),
    );

    line.simplify(&tolerance)
        .0
        .into_iter()
        .map(|c| (c.y, c.x))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn zigzag(n: usize) -> Vec<(f64, f64)> {
        (0..n)
            .map(|i| (if i % 2 == 0 { 0.0 } else { 0.001 }, i as f64 * 0.01))
            .collect()
    }

    #[test]
    fn test_sparse_fleet_full_resolution() {
        let policy = SimplificationPolicy::default();
        assert_eq!(policy.decide(10, false), LodDecision::FULL);
        assert_eq!(policy.decide(199, false), LodDecision::FULL);
    }

    #[test]
    fn test_selected_always_full() {
        let policy = SimplificationPolicy::default();
        for total in [0, 300, 600, 5000] {
            assert_eq!(policy.decide(total, true), LodDecision::FULL);
        }
    }

    #[test]
    fn test_line_exists_at_300_not_at_600() {
        let policy = SimplificationPolicy::default();
        assert!(policy.decide(300, false).draw_line);
        assert!(!policy.decide(600, false).draw_line);
        assert!(policy.decide(600, false).orient_glyph);
        assert!(!policy.decide(1001, false).orient_glyph);
    }

    #[test]
    fn test_tolerance_interpolation() {
        let policy = SimplificationPolicy::default();
        assert_relative_eq!(policy.tolerance_for(200), 0.01);
        assert_relative_eq!(policy.tolerance_for(600), 0.055, epsilon = 1e-12);
        assert_relative_eq!(policy.tolerance_for(1000), 0.1);
        assert_relative_eq!(policy.tolerance_for(50_000), 0.1);
        assert!(policy.tolerance_for(300) < policy.tolerance_for(400));
    }

    #[test]
    fn test_reduction_keeps_endpoints_and_never_grows() {
        let policy = SimplificationPolicy::default();
        let input = zigzag(50);
        let output = policy.apply(&input, Resolution::Reduced { tolerance: 0.01 });

        assert!(output.len() <= input.len());
        assert_eq!(output.first(), input.first());
        assert_eq!(output.last(), input.last());
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_apply_drops_invalid_points() {
        let policy = SimplificationPolicy::default();
        let input = [(0.0, 0.0), (f64::NAN, 1.0), (0.0, 2.0)];
        assert_eq!(policy.apply(&input, Resolution::Full), vec![(0.0, 0.0), (0.0, 2.0)]);
    }
}
