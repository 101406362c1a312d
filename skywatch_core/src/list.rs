//! Operator-facing flight list.
//!
//! The list applies the same [`FilterState::is_visible`] rule as the
//! reconciler, then a secondary free-text/classification query the operator
//! types into the list panel. Only the selected track gets a detailed entry.

use serde::Serialize;
use skywatch_env::{FlightId, UNKNOWN_DURATION, UNKNOWN_SCALAR};

use crate::bearing::estimate_track;
use crate::filter::FilterState;
use crate::track_store::{Track, TrackStore};

/// Placeholder shown for sentinel values.
pub const UNKNOWN_TEXT: &str = "unknown";

/// Secondary list filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListQuery {
    /// Case-insensitive substring of the flight id or classification
    pub text: Option<String>,

    /// Exact classification name
    pub classification: Option<String>,
}

impl ListQuery {
    pub fn matches(&self, track: &Track) -> bool {
        let text_ok = match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(text) => {
                let needle = text.to_lowercase();
                track.id.to_lowercase().contains(&needle)
                    || track.classification.to_lowercase().contains(&needle)
            }
        };
        let class_ok = match self.classification.as_deref() {
            None | Some("") => true,
            Some(class) => track.classification == class,
        };
        text_ok && class_ok
    }
}

/// Entry for a non-selected track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactEntry {
    pub flight_id: FlightId,
    pub classification: String,
}

/// Entry for the selected track, with display-ready values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedEntry {
    pub flight_id: FlightId,
    pub classification: String,
    pub classification_source: Option<String>,
    pub altitude: String,
    pub velocity: String,
    pub heading: String,
    pub avg_altitude: String,
    pub avg_velocity: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListEntry {
    Compact(CompactEntry),
    Detailed(DetailedEntry),
}

impl ListEntry {
    pub fn flight_id(&self) -> &str {
        match self {
            ListEntry::Compact(e) => &e.flight_id,
            ListEntry::Detailed(e) => &e.flight_id,
        }
    }

    pub fn is_detailed(&self) -> bool {
        matches!(self, ListEntry::Detailed(_))
    }
}

/// Projected list plus counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListProjection {
    /// Entries ordered by flight id
    pub entries: Vec<ListEntry>,

    /// Tracks passing the visibility rule (equals the reconciler's count)
    pub visible_count: usize,

    /// Entries left after the secondary query
    pub shown_count: usize,
}

/// Derives the list view from the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListProjector;

impl ListProjector {
    pub fn project(store: &TrackStore, filter: &FilterState, query: &ListQuery) -> ListProjection {
        let mut projection = ListProjection::default();

        for track in store.iter().filter(|t| filter.is_visible(t)) {
            projection.visible_count += 1;
            if !query.matches(track) {
                continue;
            }
            let entry = if filter.is_selected(&track.id) {
                ListEntry::Detailed(detailed(track))
            } else {
                ListEntry::Compact(CompactEntry {
                    flight_id: track.id.clone(),
                    classification: track.classification.clone(),
                })
            };
            projection.entries.push(entry);
        }

        projection.shown_count = projection.entries.len();
        projection
    }
}

fn detailed(track: &Track) -> DetailedEntry {
    let last = track.last_sample();
    DetailedEntry {
        flight_id: track.id.clone(),
        classification: track.classification.clone(),
        classification_source: track.classification_source.clone(),
        altitude: format_scalar(last.map_or(UNKNOWN_SCALAR, |s| s.altitude), "m"),
        velocity: format_scalar(last.map_or(UNKNOWN_SCALAR, |s| s.velocity), "m/s"),
        heading: format_heading(drawn_heading(track)),
        avg_altitude: format_scalar(track.avg_altitude, "m"),
        avg_velocity: format_scalar(track.avg_velocity, "m/s"),
        duration: format_duration(track.duration),
    }
}

/// Heading the map glyph shows, or `None` when the track has no drawable point.
fn drawn_heading(track: &Track) -> Option<f64> {
    if track.samples().iter().any(|s| s.is_valid()) {
        Some(estimate_track(track).bearing)
    } else {
        None
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

/// `-1` (or a non-number) renders as "unknown"; anything else rounds to a whole unit.
pub fn format_scalar(value: f64, unit: &str) -> String {
    if value == UNKNOWN_SCALAR || !value.is_finite() {
        UNKNOWN_TEXT.to_string()
    } else {
        format!("{} {}", value.round() as i64, unit)
    }
}

/// Seconds to whole minutes; `0` renders as "unknown".
pub fn format_duration(seconds: f64) -> String {
    if seconds == UNKNOWN_DURATION || !seconds.is_finite() || seconds < 0.0 {
        UNKNOWN_TEXT.to_string()
    } else {
        format!("{} min", (seconds / 60.0).round() as i64)
    }
}

pub fn format_heading(heading: Option<f64>) -> String {
    match heading {
        Some(deg) if deg.is_finite() => format!("{}°", deg.round() as i64),
        _ => UNKNOWN_TEXT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skywatch_env::{FlightSnapshot, Sample};

    fn store() -> TrackStore {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![
            FlightSnapshot::new("BAW123", vec![Sample::new(51.0, 0.0, 1.0, 10500.4, 240.6)])
                .with_classification("commercial")
                .with_source("ml")
                .with_stats(10480.6, 238.2, 125.0),
            FlightSnapshot::new("N42SV", vec![Sample::position(40.0, -74.0, 1.0)])
                .with_classification("survey"),
            FlightSnapshot::new("RSQ7", vec![Sample::position(45.0, 8.0, 1.0)])
                .with_classification("rescue"),
        ]);
        store
    }

    #[test]
    fn test_sentinel_rendering() {
        assert_eq!(format_scalar(-1.0, "m"), "unknown");
        assert_eq!(format_scalar(10480.6, "m"), "10481 m");
        assert_eq!(format_duration(125.0), "2 min");
        assert_eq!(format_duration(0.0), "unknown");
        assert_eq!(format_heading(None), "unknown");
        assert_eq!(format_heading(Some(89.6)), "90°");
    }

    #[test]
    fn test_selected_entry_is_detailed() {
        let store = store();
        let mut filter = FilterState::new();
        filter.set_selection(Some("BAW123".to_string()));

        let projection = ListProjector::project(&store, &filter, &ListQuery::default());
        assert_eq!(projection.visible_count, 3);
        match &projection.entries[0] {
            ListEntry::Detailed(entry) => {
                assert_eq!(entry.altitude, "10500 m");
                assert_eq!(entry.velocity, "241 m/s");
                assert_eq!(entry.avg_altitude, "10481 m");
                assert_eq!(entry.duration, "2 min");
                // one point: the glyph keeps its default orientation
                assert_eq!(entry.heading, "0°");
                assert_eq!(entry.classification_source.as_deref(), Some("ml"));
            }
            other => panic!("expected detailed entry, got {:?}", other),
        }
        assert!(!projection.entries[1].is_detailed());
    }

    #[test]
    fn test_heading_unknown_without_valid_points() {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![FlightSnapshot::new(
            "DARK1",
            vec![Sample::position(f64::NAN, f64::NAN, 1.0)],
        )]);
        let mut filter = FilterState::new();
        filter.set_selection(Some("DARK1".to_string()));

        let projection = ListProjector::project(&store, &filter, &ListQuery::default());
        match &projection.entries[0] {
            ListEntry::Detailed(entry) => assert_eq!(entry.heading, "unknown"),
            other => panic!("expected detailed entry, got {:?}", other),
        }
    }

    #[test]
    fn test_visible_count_ignores_secondary_query() {
        let store = store();
        let mut filter = FilterState::new();
        filter.toggle_classification("survey");
        filter.toggle_classification("rescue");

        let query = ListQuery {
            text: Some("rsq".to_string()),
            classification: None,
        };
        let projection = ListProjector::project(&store, &filter, &query);

        assert_eq!(projection.visible_count, 2);
        assert_eq!(projection.shown_count, 1);
        assert_eq!(projection.entries[0].flight_id(), "RSQ7");
    }

    #[test]
    fn test_classification_query_is_exact() {
        let store = store();
        let query = ListQuery {
            text: None,
            classification: Some("survey".to_string()),
        };
        let projection = ListProjector::project(&store, &FilterState::new(), &query);
        let ids: Vec<&str> = projection.entries.iter().map(ListEntry::flight_id).collect();
        assert_eq!(ids, vec!["N42SV"]);
    }

    #[test]
    fn test_text_query_matches_classification() {
        let store = store();
        let query = ListQuery {
            text: Some("COMMER".to_string()),
            classification: None,
        };
        let projection = ListProjector::project(&store, &FilterState::new(), &query);
        assert_eq!(projection.shown_count, 1);
    }
}
