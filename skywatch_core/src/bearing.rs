//! Heading approximation for glyph orientation.
//!
//! Not navigation-grade: the initial great-circle bearing between the last
//! two valid points is enough to point an aircraft icon.

use crate::track_store::Track;

/// How many trailing valid points are inspected.
const WINDOW: usize = 3;

/// Initial great-circle bearing from point 1 to point 2, in [0, 360) degrees.
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_lon = (lon2 - lon1).to_radians();

    let y = d_lon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lon.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Wraps an angle into [0, 360).
pub fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Rotation handed to the rendering primitive for a glyph pre-rotated by `offset_deg`.
#[inline]
pub fn glyph_rotation(bearing_deg: f64, offset_deg: f64) -> f64 {
    bearing_deg - offset_deg
}

/// Result of a bearing estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingEstimate {
    /// Bearing in degrees
    pub bearing: f64,

    /// False when the value came from the cache (too few valid points)
    pub fresh: bool,
}

/// Estimates a bearing from `(lat, lon)` points, falling back to `cached` (or 0).
///
/// Only the last [`WINDOW`] valid points are considered; the bearing runs
/// from the second-to-last to the last of them.
pub fn estimate(coords: &[(f64, f64)], cached: Option<f64>) -> HeadingEstimate {
    let recent: Vec<(f64, f64)> = coords
        .iter()
        .rev()
        .filter(|(lat, lon)| lat.is_finite() && lon.is_finite())
        .take(WINDOW)
        .copied()
        .collect();

    // `recent` is newest-first
    match recent.as_slice() {
        [(lat2, lon2), (lat1, lon1), ..] => HeadingEstimate {
            bearing: initial_bearing(*lat1, *lon1, *lat2, *lon2),
            fresh: true,
        },
        _ => HeadingEstimate {
            bearing: cached.unwrap_or(0.0),
            fresh: false,
        },
    }
}

/// Estimates a track's bearing from its valid samples without touching the cache.
///
/// This is the value the glyph is oriented by, so views that show a heading
/// should read it from here.
pub fn estimate_track(track: &Track) -> HeadingEstimate {
    estimate(&track.valid_coords(), track.cached_heading())
}

/// Estimates a track's bearing and refreshes its cache when the estimate is fresh.
pub fn estimate_for_track(track: &mut Track) -> f64 {
    let estimate = estimate_track(track);
    if estimate.fresh {
        track.cache_heading(estimate.bearing);
    }
    estimate.bearing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_store::TrackStore;
    use approx::assert_relative_eq;
    use skywatch_env::{FlightSnapshot, Sample};

    #[test]
    fn test_due_east() {
        assert_relative_eq!(initial_bearing(0.0, 0.0, 0.0, 1.0), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cardinal_directions() {
        assert_relative_eq!(initial_bearing(0.0, 0.0, 1.0, 0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing(1.0, 0.0, 0.0, 0.0), 180.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing(0.0, 1.0, 0.0, 0.0), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_relative_eq!(normalize_degrees(-90.0), 270.0);
        assert_relative_eq!(normalize_degrees(720.5), 0.5, epsilon = 1e-9);
        assert!(normalize_degrees(-1e-15) < 360.0);
    }

    #[test]
    fn test_glyph_rotation_subtracts_offset() {
        assert_relative_eq!(glyph_rotation(90.0, 45.0), 45.0);
    }

    #[test]
    fn test_estimate_uses_last_two_valid_points() {
        let coords = [(0.0, 0.0), (5.0, 5.0), (0.0, 0.0), (0.0, 1.0), (f64::NAN, 3.0)];
        let est = estimate(&coords, None);
        assert!(est.fresh);
        assert_relative_eq!(est.bearing, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_estimate_falls_back_to_cache() {
        let est = estimate(&[(1.0, 1.0), (f64::NAN, f64::NAN)], Some(42.0));
        assert!(!est.fresh);
        assert_eq!(est.bearing, 42.0);

        assert_eq!(estimate(&[], None).bearing, 0.0);
    }

    #[test]
    fn test_track_cache_is_sticky() {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![FlightSnapshot::new(
            "X",
            vec![Sample::position(0.0, 0.0, 1.0), Sample::position(0.0, 1.0, 2.0)],
        )]);
        let track = store.get_mut("X").unwrap();
        assert_relative_eq!(estimate_for_track(track), 90.0, epsilon = 1e-9);

        store.upsert_batch(vec![FlightSnapshot::new("X", vec![Sample::position(0.0, 2.0, 3.0)])]);
        let track = store.get_mut("X").unwrap();
        assert_relative_eq!(estimate_for_track(track), 90.0, epsilon = 1e-9);
    }
}
