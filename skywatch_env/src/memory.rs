//! In-memory collaborator backend.
//!
//! Implements every collaborator trait against process-local state. Used by
//! the simulator and by tests; `set_offline(true)` turns every call into a
//! transport failure.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::channel::UpdateSender;
use crate::collaborator::{AreaService, ClassificationService, TrackSource};
use crate::error::EnvError;
use crate::types::{
    AreaId, AreaRecord, Bounds, ChannelEvent, ClassificationEntry, FilterChange, FlightId,
    FlightSnapshot, PollFrequency, DEFAULT_CLASSIFICATION,
};

#[derive(Debug, Default)]
struct BackendState {
    flights: BTreeMap<FlightId, FlightSnapshot>,
    classifications: Vec<ClassificationEntry>,
    areas: BTreeMap<AreaId, AreaRecord>,
    next_area_id: u64,
    filter_notices: Vec<FilterChange>,
    offline: bool,
}

/// Process-local stand-in for the tracking server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
    updates: Option<UpdateSender>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped backend for sharing with a runtime.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Attaches the channel used to push `flight-update` events after reclassification.
    pub fn with_updates(mut self, sender: UpdateSender) -> Self {
        self.updates = Some(sender);
        self
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn online(&self) -> Result<MutexGuard<'_, BackendState>, EnvError> {
        let state = self.lock();
        if state.offline {
            return Err(EnvError::transport("Backend offline"));
        }
        Ok(state)
    }

    /// Simulates a network outage.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Stores or replaces a flight (server-side view).
    pub fn upsert_flight(&self, snapshot: FlightSnapshot) {
        if let Some(id) = snapshot.flight_id.clone() {
            self.lock().flights.insert(id, snapshot);
        }
    }

    /// Removes a flight (server-side view).
    pub fn remove_flight(&self, flight_id: &str) -> bool {
        self.lock().flights.remove(flight_id).is_some()
    }

    /// Number of flights held server-side.
    pub fn flight_count(&self) -> usize {
        self.lock().flights.len()
    }

    /// Filter notices received so far, oldest first.
    pub fn filter_notices(&self) -> Vec<FilterChange> {
        self.lock().filter_notices.clone()
    }

    /// Snapshot of the persisted areas.
    pub fn areas(&self) -> Vec<AreaRecord> {
        self.lock().areas.values().cloned().collect()
    }
}

#[async_trait]
impl TrackSource for InMemoryBackend {
    async fn fetch_tracks(
        &self,
        classifications: &[String],
    ) -> Result<Vec<FlightSnapshot>, EnvError> {
        let state = self.online()?;
        let flights: Vec<FlightSnapshot> = state
            .flights
            .values()
            .filter(|f| {
                classifications.is_empty()
                    || classifications
                        .iter()
                        .any(|c| c == f.classification_or_default())
            })
            .cloned()
            .collect();
        debug!("Returning {} flights for classifications {:?}", flights.len(), classifications);
        Ok(flights)
    }

    async fn fetch_track(&self, flight_id: &str) -> Result<FlightSnapshot, EnvError> {
        let state = self.online()?;
        state
            .flights
            .get(flight_id)
            .cloned()
            .ok_or_else(|| EnvError::not_found(format!("flight {}", flight_id)))
    }

    async fn notify_filter(&self, notice: &FilterChange) -> Result<(), EnvError> {
        self.online()?.filter_notices.push(notice.clone());
        Ok(())
    }

    async fn reclassify(&self, flight_id: &str, classification: &str) -> Result<(), EnvError> {
        if flight_id.is_empty() || classification.is_empty() {
            return Err(EnvError::Rejected("Missing flight_id or classification".into()));
        }
        let updated = {
            let mut state = self.online()?;
            let flight = state
                .flights
                .get_mut(flight_id)
                .ok_or_else(|| EnvError::not_found(format!("flight {}", flight_id)))?;
            flight.classification = Some(classification.to_string());
            flight.classification_source = Some("manual".to_string());
            flight.clone()
        };
        info!("Classification updated for {}", flight_id);
        if let Some(updates) = &self.updates {
            updates.try_send(ChannelEvent::FlightUpdate(updated))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ClassificationService for InMemoryBackend {
    async fn list_classifications(&self) -> Result<Vec<ClassificationEntry>, EnvError> {
        Ok(self.online()?.classifications.clone())
    }

    async fn add_classification(&self, entry: &ClassificationEntry) -> Result<(), EnvError> {
        if entry.name.is_empty() || entry.color.is_empty() {
            return Err(EnvError::Rejected("Missing name or color".into()));
        }
        let mut state = self.online()?;
        if entry.name == DEFAULT_CLASSIFICATION
            || state.classifications.iter().any(|c| c.name == entry.name)
        {
            return Err(EnvError::AlreadyExists(entry.name.clone()));
        }
        state.classifications.push(entry.clone());
        info!("Added classification {} with color {}", entry.name, entry.color);
        Ok(())
    }
}

#[async_trait]
impl AreaService for InMemoryBackend {
    async fn create_area(
        &self,
        bounds: Bounds,
        frequency: PollFrequency,
    ) -> Result<AreaId, EnvError> {
        let mut state = self.online()?;
        state.next_area_id += 1;
        let id = AreaId(state.next_area_id);
        state.areas.insert(
            id,
            AreaRecord {
                id,
                bounds,
                monitoring: false,
                frequency,
                name: None,
            },
        );
        info!("Area created with ID {}", id);
        Ok(id)
    }

    async fn start_area(&self, id: AreaId, frequency: PollFrequency) -> Result<(), EnvError> {
        let mut state = self.online()?;
        let area = state.areas.get_mut(&id).ok_or_else(|| EnvError::not_found(id))?;
        area.monitoring = true;
        area.frequency = frequency;
        info!("Started monitoring for {}", id);
        Ok(())
    }

    async fn stop_area(&self, id: AreaId) -> Result<(), EnvError> {
        let mut state = self.online()?;
        match state.areas.get_mut(&id) {
            Some(area) => {
                area.monitoring = false;
                info!("Stopped monitoring for {}", id);
            }
            None => debug!("{} not found for stop, possibly already deleted", id),
        }
        Ok(())
    }

    async fn delete_area(&self, id: AreaId) -> Result<(), EnvError> {
        let mut state = self.online()?;
        state.areas.remove(&id).ok_or_else(|| EnvError::not_found(id))?;
        info!("Deleted {}", id);
        Ok(())
    }

    async fn rename_area(&self, id: AreaId, name: &str) -> Result<(), EnvError> {
        if name.is_empty() {
            return Err(EnvError::Rejected("Missing name".into()));
        }
        let mut state = self.online()?;
        let area = state.areas.get_mut(&id).ok_or_else(|| EnvError::not_found(id))?;
        area.name = Some(name.to_string());
        Ok(())
    }

    async fn list_areas(&self) -> Result<Vec<AreaRecord>, EnvError> {
        Ok(self.online()?.areas.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{update_channel, UpdateChannel};
    use crate::types::Sample;

    fn flight(id: &str, class: &str) -> FlightSnapshot {
        FlightSnapshot::new(id, vec![Sample::position(0.0, 0.0, 1.0)]).with_classification(class)
    }

    #[tokio::test]
    async fn test_fetch_tracks_prefilters_by_classification() {
        let backend = InMemoryBackend::new();
        backend.upsert_flight(flight("a", "survey"));
        backend.upsert_flight(flight("b", "commercial"));
        backend.upsert_flight(FlightSnapshot::new("c", vec![Sample::position(1.0, 1.0, 1.0)]));

        assert_eq!(backend.fetch_tracks(&[]).await.unwrap().len(), 3);
        let filtered = backend
            .fetch_tracks(&["survey".to_string(), "unknown".to_string()])
            .await
            .unwrap();
        let ids: Vec<_> = filtered.iter().filter_map(|f| f.flight_id.clone()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_offline_backend_fails_with_transport() {
        let backend = InMemoryBackend::new();
        backend.set_offline(true);
        let err = backend.fetch_tracks(&[]).await.unwrap_err();
        assert!(err.is_transient());
        backend.set_offline(false);
        assert!(backend.fetch_tracks(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_classification_rejected() {
        let backend = InMemoryBackend::new();
        let entry = ClassificationEntry::new("survey", "#ff0000");
        backend.add_classification(&entry).await.unwrap();
        assert_eq!(
            backend.add_classification(&entry).await,
            Err(EnvError::AlreadyExists("survey".into()))
        );
        assert_eq!(backend.list_classifications().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_area_lifecycle() {
        let backend = InMemoryBackend::new();
        let bounds = Bounds::from_corners((50.0, 10.0), (52.0, 12.0));
        let id = backend.create_area(bounds, PollFrequency::OneMinute).await.unwrap();
        assert!(!backend.areas()[0].monitoring);

        backend.start_area(id, PollFrequency::FiveMinutes).await.unwrap();
        backend.rename_area(id, "Jutland").await.unwrap();
        let area = &backend.list_areas().await.unwrap()[0];
        assert!(area.monitoring);
        assert_eq!(area.frequency, PollFrequency::FiveMinutes);
        assert_eq!(area.name.as_deref(), Some("Jutland"));

        backend.stop_area(id).await.unwrap();
        backend.delete_area(id).await.unwrap();
        // Stopping a deleted area is tolerated, deleting it again is not
        assert!(backend.stop_area(id).await.is_ok());
        assert!(matches!(backend.delete_area(id).await, Err(EnvError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reclassify_pushes_flight_update() {
        let (tx, mut rx) = update_channel(4);
        let backend = InMemoryBackend::new().with_updates(tx);
        backend.upsert_flight(flight("a", "survey"));

        backend.reclassify("a", "rescue").await.unwrap();
        match rx.recv().await {
            Some(ChannelEvent::FlightUpdate(snap)) => {
                assert_eq!(snap.classification.as_deref(), Some("rescue"));
                assert_eq!(snap.classification_source.as_deref(), Some("manual"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
