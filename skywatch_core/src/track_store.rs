//! The "STORE" - authoritative per-flight state.
//!
//! Every flight seen on the update channel lives here as a [`Track`], keyed
//! by flight id. Snapshots replace a track's samples wholesale; nothing is
//! appended incrementally. The store never holds a track without samples.

use serde::{Deserialize, Serialize};
use skywatch_env::{FlightId, FlightSnapshot, Sample, DEFAULT_CLASSIFICATION};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// TRACK
// ============================================================================

/// Accumulated state of one aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Upstream flight id
    pub id: FlightId,

    /// Position reports, ascending by timestamp, never empty
    samples: Vec<Sample>,

    /// Classification name (defaults to "unknown")
    pub classification: String,

    /// Who assigned the classification ("ml", "rule", "manual", ...)
    pub classification_source: Option<String>,

    /// Mean altitude in meters, -1 if unknown
    pub avg_altitude: f64,

    /// Mean ground speed in m/s, -1 if unknown
    pub avg_velocity: f64,

    /// Seconds between first and last report, 0 if unknown
    pub duration: f64,

    /// Last computed bearing in degrees; survives snapshot replacement
    last_heading: Option<f64>,
}

impl Track {
    /// Builds a track from a snapshot already known to be well-formed.
    fn from_snapshot(id: FlightId, snapshot: FlightSnapshot) -> Self {
        let mut track = Self {
            id,
            samples: Vec::new(),
            classification: String::new(),
            classification_source: None,
            avg_altitude: -1.0,
            avg_velocity: -1.0,
            duration: 0.0,
            last_heading: None,
        };
        track.apply_snapshot(snapshot);
        track
    }

    /// Replaces samples and overwrites every scalar field (last write wins).
    fn apply_snapshot(&mut self, snapshot: FlightSnapshot) {
        let mut samples = snapshot.points;
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.samples = samples;
        self.classification = snapshot
            .classification
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CLASSIFICATION.to_string());
        self.classification_source = snapshot.classification_source;
        self.avg_altitude = snapshot.avg_altitude;
        self.avg_velocity = snapshot.avg_velocity;
        self.duration = snapshot.duration;
    }

    /// Samples in ascending timestamp order.
    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Most recent sample.
    #[inline]
    pub fn last_sample(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// `(lat, lon)` of every sample with numeric coordinates, in order.
    pub fn valid_coords(&self) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .filter(|s| s.is_valid())
            .map(Sample::coord)
            .collect()
    }

    /// Heading cached by the last successful bearing estimate.
    #[inline]
    pub fn cached_heading(&self) -> Option<f64> {
        self.last_heading
    }

    pub(crate) fn cache_heading(&mut self, heading: f64) {
        self.last_heading = Some(heading);
    }

    /// Converts back to the wire shape.
    pub fn to_snapshot(&self) -> FlightSnapshot {
        let mut snapshot = FlightSnapshot::new(self.id.clone(), self.samples.clone())
            .with_classification(self.classification.clone())
            .with_stats(self.avg_altitude, self.avg_velocity, self.duration);
        snapshot.classification_source = self.classification_source.clone();
        snapshot
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Why a snapshot was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot has no flight id")]
    MissingId,

    #[error("snapshot for {0} has no points")]
    EmptyPoints(FlightId),

    #[error("snapshot for {id} has {count} undecodable points")]
    MalformedPoints { id: FlightId, count: usize },
}

/// Outcome of [`TrackStore::upsert_batch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertReport {
    /// Ids created or updated
    pub touched: BTreeSet<FlightId>,

    /// Subset of `touched` that did not exist before
    pub created: BTreeSet<FlightId>,

    /// Malformed snapshots that were skipped
    pub skipped: usize,
}

/// Authoritative mapping flight id → [`Track`].
///
/// Iteration order is by flight id, which is also the list order.
#[derive(Debug, Clone, Default)]
pub struct TrackStore {
    tracks: BTreeMap<FlightId, Track>,
}

fn check_snapshot(snapshot: &FlightSnapshot) -> Result<&str, SnapshotError> {
    let id = match snapshot.flight_id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => return Err(SnapshotError::MissingId),
    };
    if snapshot.rejected_points > 0 {
        return Err(SnapshotError::MalformedPoints {
            id: id.to_string(),
            count: snapshot.rejected_points,
        });
    }
    if snapshot.points.is_empty() {
        return Err(SnapshotError::EmptyPoints(id.to_string()));
    }
    Ok(id)
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a batch of snapshots.
    ///
    /// Existing tracks get their samples replaced and scalars overwritten;
    /// unknown ids create new tracks. Malformed snapshots (missing id, no
    /// points) are logged and skipped without affecting the rest.
    pub fn upsert_batch(
        &mut self,
        snapshots: impl IntoIterator<Item = FlightSnapshot>,
    ) -> UpsertReport {
        let mut report = UpsertReport::default();

        for snapshot in snapshots {
            let id = match check_snapshot(&snapshot) {
                Ok(id) => id.to_string(),
                Err(e) => {
                    warn!("Skipping malformed snapshot: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };

            match self.tracks.get_mut(&id) {
                Some(track) => track.apply_snapshot(snapshot),
                None => {
                    let track = Track::from_snapshot(id.clone(), snapshot);
                    self.tracks.insert(id.clone(), track);
                    report.created.insert(id.clone());
                }
            }
            report.touched.insert(id);
        }

        debug!(
            "Upserted {} tracks ({} new, {} skipped), store size {}",
            report.touched.len(),
            report.created.len(),
            report.skipped,
            self.tracks.len()
        );
        report
    }

    /// Deletes tracks and returns the ids that were actually present.
    pub fn remove<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> Vec<FlightId> {
        ids.into_iter()
            .filter_map(|id| self.tracks.remove(id).map(|t| t.id))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Track> {
        self.tracks.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Track> {
        self.tracks.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tracks.contains_key(id)
    }

    /// All tracks, ordered by flight id.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &FlightId> {
        self.tracks.keys()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, timestamps: &[f64]) -> FlightSnapshot {
        let points = timestamps
            .iter()
            .map(|&t| Sample::new(55.0 + t * 0.01, 11.0, t, 3000.0, 200.0))
            .collect();
        FlightSnapshot::new(id, points)
    }

    #[test]
    fn test_store_creation() {
        let store = TrackStore::new();
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_sorts_out_of_order_samples() {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![snapshot("X", &[5.0, 1.0, 3.0])]);

        let stamps: Vec<f64> =
            store.get("X").unwrap().samples().iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_upsert_replaces_samples_wholesale() {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![snapshot("X", &[1.0, 2.0, 3.0])]);
        let report = store.upsert_batch(vec![snapshot("X", &[10.0])]);

        assert!(report.touched.contains("X"));
        assert!(report.created.is_empty());
        assert_eq!(store.get("X").unwrap().samples().len(), 1);
    }

    #[test]
    fn test_upsert_overwrites_scalars() {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![snapshot("X", &[1.0])
            .with_classification("survey")
            .with_source("ml")
            .with_stats(1200.0, 90.0, 300.0)]);
        store.upsert_batch(vec![snapshot("X", &[2.0])]);

        let track = store.get("X").unwrap();
        assert_eq!(track.classification, "unknown");
        assert_eq!(track.classification_source, None);
        assert_eq!(track.avg_altitude, -1.0);
        assert_eq!(track.duration, 0.0);
    }

    #[test]
    fn test_malformed_snapshots_skipped() {
        let mut store = TrackStore::new();
        let mut no_id = snapshot("ignored", &[1.0]);
        no_id.flight_id = None;

        let report = store.upsert_batch(vec![
            no_id,
            snapshot("empty", &[]),
            snapshot("good", &[1.0]),
        ]);

        assert_eq!(report.skipped, 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains("good"));
        assert!(!store.contains("empty"));
    }

    #[test]
    fn test_snapshot_with_undecodable_points_skipped() {
        let mut store = TrackStore::new();
        let mut damaged = snapshot("damaged", &[1.0, 2.0]);
        damaged.rejected_points = 1;

        let report = store.upsert_batch(vec![damaged, snapshot("good", &[1.0])]);

        assert_eq!(report.skipped, 1);
        assert!(store.contains("good"));
        assert!(!store.contains("damaged"));
    }

    #[test]
    fn test_remove_reports_present_ids_only() {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![snapshot("a", &[1.0]), snapshot("b", &[1.0])]);

        let removed = store.remove(["a", "zzz"]);
        assert_eq!(removed, vec!["a".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_heading_cache_survives_upsert() {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![snapshot("X", &[1.0, 2.0])]);
        store.get_mut("X").unwrap().cache_heading(123.0);
        store.upsert_batch(vec![snapshot("X", &[3.0])]);
        assert_eq!(store.get("X").unwrap().cached_heading(), Some(123.0));
    }

    #[test]
    fn test_identical_batch_is_idempotent() {
        let batch = vec![snapshot("a", &[3.0, 1.0]), snapshot("b", &[2.0])];
        let mut store = TrackStore::new();
        store.upsert_batch(batch.clone());
        let first: Vec<Track> = store.iter().cloned().collect();
        store.upsert_batch(batch);
        let second: Vec<Track> = store.iter().cloned().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_iteration_ordered_by_id() {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![
            snapshot("c", &[1.0]),
            snapshot("a", &[1.0]),
            snapshot("b", &[1.0]),
        ]);
        let ids: Vec<&str> = store.ids().map(String::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
