//! Areas of interest known to the dashboard.
//!
//! The area service owns persistence; this book mirrors what it returned so
//! the dashboard can draw rectangles, count monitored areas and break down
//! the tracks inside an area by classification.

use skywatch_env::{AreaId, AreaRecord, PollFrequency};
use std::collections::BTreeMap;

use crate::track_store::TrackStore;

/// Local mirror of the area service's records.
#[derive(Debug, Clone, Default)]
pub struct AreaBook {
    areas: BTreeMap<AreaId, AreaRecord>,
}

impl AreaBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole book with a fresh listing.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = AreaRecord>) {
        self.areas = records.into_iter().map(|r| (r.id, r)).collect();
    }

    pub fn insert(&mut self, record: AreaRecord) {
        self.areas.insert(record.id, record);
    }

    pub fn remove(&mut self, id: AreaId) -> Option<AreaRecord> {
        self.areas.remove(&id)
    }

    pub fn get(&self, id: AreaId) -> Option<&AreaRecord> {
        self.areas.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AreaRecord> {
        self.areas.values()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Returns false if the area is unknown.
    pub fn set_monitoring(
        &mut self,
        id: AreaId,
        monitoring: bool,
        frequency: Option<PollFrequency>,
    ) -> bool {
        match self.areas.get_mut(&id) {
            Some(area) => {
                area.monitoring = monitoring;
                if let Some(frequency) = frequency {
                    area.frequency = frequency;
                }
                true
            }
            None => false,
        }
    }

    /// Returns false if the area is unknown.
    pub fn rename(&mut self, id: AreaId, name: &str) -> bool {
        match self.areas.get_mut(&id) {
            Some(area) => {
                let name = name.trim();
                area.name = if name.is_empty() { None } else { Some(name.to_string()) };
                true
            }
            None => false,
        }
    }

    pub fn monitored_count(&self) -> usize {
        self.areas.values().filter(|a| a.monitoring).count()
    }

    /// Counts tracks with any valid sample inside the area, per classification.
    pub fn classification_breakdown(
        &self,
        id: AreaId,
        store: &TrackStore,
    ) -> Option<BTreeMap<String, usize>> {
        let bounds = self.areas.get(&id)?.bounds;
        let mut counts = BTreeMap::new();
        for track in store.iter() {
            let inside = track
                .samples()
                .iter()
                .any(|s| s.is_valid() && bounds.contains(s.lat, s.lon));
            if inside {
                *counts.entry(track.classification.clone()).or_insert(0) += 1;
            }
        }
        Some(counts)
    }
}

/// Label shown for an area: its name, or "Area N".
pub fn display_name(area: &AreaRecord) -> String {
    match area.name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("Area {}", area.id.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skywatch_env::{Bounds, FlightSnapshot, Sample};

    fn record(id: u64) -> AreaRecord {
        AreaRecord {
            id: AreaId(id),
            bounds: Bounds::from_corners((50.0, 0.0), (52.0, 2.0)),
            monitoring: false,
            frequency: PollFrequency::default(),
            name: None,
        }
    }

    #[test]
    fn test_monitoring_and_rename() {
        let mut book = AreaBook::new();
        book.insert(record(1));
        assert!(book.set_monitoring(AreaId(1), true, Some(PollFrequency::FiveMinutes)));
        assert!(!book.set_monitoring(AreaId(9), true, None));
        assert_eq!(book.monitored_count(), 1);
        assert_eq!(book.get(AreaId(1)).unwrap().frequency, PollFrequency::FiveMinutes);

        assert_eq!(display_name(book.get(AreaId(1)).unwrap()), "Area 1");
        book.rename(AreaId(1), "  Thames  ");
        assert_eq!(display_name(book.get(AreaId(1)).unwrap()), "Thames");
    }

    #[test]
    fn test_classification_breakdown() {
        let mut store = TrackStore::new();
        store.upsert_batch(vec![
            FlightSnapshot::new("in1", vec![Sample::position(51.0, 1.0, 1.0)])
                .with_classification("survey"),
            FlightSnapshot::new(
                "in2",
                vec![Sample::position(60.0, 1.0, 1.0), Sample::position(50.5, 0.5, 2.0)],
            )
            .with_classification("survey"),
            FlightSnapshot::new("in3", vec![Sample::position(51.5, 1.5, 1.0)]),
            FlightSnapshot::new("out", vec![Sample::position(10.0, 10.0, 1.0)])
                .with_classification("survey"),
        ]);
        let mut book = AreaBook::new();
        book.insert(record(1));

        let counts = book.classification_breakdown(AreaId(1), &store).unwrap();
        assert_eq!(counts.get("survey"), Some(&2));
        assert_eq!(counts.get("unknown"), Some(&1));
        assert!(book.classification_breakdown(AreaId(2), &store).is_none());
    }
}
