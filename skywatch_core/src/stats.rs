//! Fleet Statistics
//! ================
//!
//! Summary numbers for the dashboard header:
//! - **Totals**: tracked flights and monitored areas
//! - **Breakdown**: flights per classification
//! - **Retrain hint**: whether there is enough labelled variety to retrain the classifier

use serde::Serialize;
use std::collections::BTreeMap;

use crate::areas::AreaBook;
use crate::track_store::TrackStore;

/// Minimum fleet size before a retrain is worth suggesting.
pub const RETRAIN_MIN_TRACKS: usize = 10;

/// Snapshot of fleet-level counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetStats {
    pub total_tracks: usize,

    /// Flights per classification, ordered by name
    pub by_classification: BTreeMap<String, usize>,

    pub monitored_areas: usize,

    /// At least [`RETRAIN_MIN_TRACKS`] flights spanning more than one classification
    pub retrain_recommended: bool,
}

impl FleetStats {
    pub fn compute(store: &TrackStore, areas: &AreaBook) -> Self {
        let mut by_classification = BTreeMap::new();
        for track in store.iter() {
            *by_classification.entry(track.classification.clone()).or_insert(0) += 1;
        }

        let total_tracks = store.len();
        Self {
            retrain_recommended: total_tracks >= RETRAIN_MIN_TRACKS && by_classification.len() > 1,
            total_tracks,
            by_classification,
            monitored_areas: areas.monitored_count(),
        }
    }

    /// Share of the fleet in `classification`, in [0, 1].
    pub fn share(&self, classification: &str) -> f64 {
        if self.total_tracks == 0 {
            return 0.0;
        }
        let count = self.by_classification.get(classification).copied().unwrap_or(0);
        count as f64 / self.total_tracks as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use skywatch_env::{FlightSnapshot, Sample};

    fn fleet(classes: &[&str]) -> TrackStore {
        let mut store = TrackStore::new();
        store.upsert_batch(classes.iter().enumerate().map(|(i, class)| {
            FlightSnapshot::new(format!("f{}", i), vec![Sample::position(0.0, 0.0, 1.0)])
                .with_classification(*class)
        }));
        store
    }

    #[test]
    fn test_counts_per_classification() {
        let stats = FleetStats::compute(&fleet(&["survey", "survey", ""]), &AreaBook::new());
        assert_eq!(stats.total_tracks, 3);
        assert_eq!(stats.by_classification.get("survey"), Some(&2));
        assert_eq!(stats.by_classification.get("unknown"), Some(&1));
        assert_relative_eq!(stats.share("survey"), 2.0 / 3.0);
    }

    #[test]
    fn test_retrain_needs_size_and_variety() {
        let uniform = fleet(&["survey"; 12]);
        assert!(!FleetStats::compute(&uniform, &AreaBook::new()).retrain_recommended);

        let small = fleet(&["survey", "rescue"]);
        assert!(!FleetStats::compute(&small, &AreaBook::new()).retrain_recommended);

        let mut classes = vec!["survey"; 9];
        classes.push("rescue");
        assert!(FleetStats::compute(&fleet(&classes), &AreaBook::new()).retrain_recommended);
    }

    #[test]
    fn test_empty_fleet() {
        let stats = FleetStats::compute(&TrackStore::new(), &AreaBook::new());
        assert_eq!(stats.share("survey"), 0.0);
        assert!(!stats.retrain_recommended);
    }
}
