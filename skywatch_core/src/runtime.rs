//! Dashboard Runtime - binds the [`Dashboard`] to its collaborators.
//!
//! The runtime is the single event-loop task. It awaits collaborators only
//! between dashboard mutations and applies their results whole, so a failed
//! fetch never leaves the store half-updated.
//!
//! # Usage
//!
//! ```ignore
//! use skywatch_core::{Dashboard, DashboardRuntime, SceneLayer};
//! use skywatch_env::{update_channel, InMemoryBackend};
//!
//! let (tx, rx) = update_channel(256);
//! let backend = Arc::new(InMemoryBackend::new().with_updates(tx));
//! let mut runtime = DashboardRuntime::new(
//!     Dashboard::with_layer(SceneLayer::new()),
//!     backend.clone(),
//!     backend.clone(),
//!     backend,
//! );
//!
//! runtime.connect().await?;
//! runtime.run(rx).await;
//! ```

use skywatch_env::{
    AreaId, AreaRecord, AreaService, Bounds, ClassificationEntry, ClassificationService, EnvError,
    FlightId, PollFrequency, TrackSource, UpdateChannel,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dashboard::Dashboard;
use crate::registry::RegistryError;
use crate::visual::VisualLayer;

/// Errors surfaced by runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Collaborator error: {0}")]
    Env(#[from] EnvError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Event loop owning the dashboard and its collaborators.
///
/// Generic over the visual layer and each collaborator so the same loop
/// runs against the in-memory backend or a real server client.
pub struct DashboardRuntime<L, S, C, A>
where
    L: VisualLayer,
    S: TrackSource,
    C: ClassificationService,
    A: AreaService,
{
    dashboard: Dashboard<L>,
    tracks: Arc<S>,
    classifications: Arc<C>,
    areas: Arc<A>,
    events_handled: u64,
}

impl<L, S, C, A> DashboardRuntime<L, S, C, A>
where
    L: VisualLayer,
    S: TrackSource,
    C: ClassificationService,
    A: AreaService,
{
    pub fn new(
        dashboard: Dashboard<L>,
        tracks: Arc<S>,
        classifications: Arc<C>,
        areas: Arc<A>,
    ) -> Self {
        Self {
            dashboard,
            tracks,
            classifications,
            areas,
            events_handled: 0,
        }
    }

    pub fn dashboard(&self) -> &Dashboard<L> {
        &self.dashboard
    }

    pub fn dashboard_mut(&mut self) -> &mut Dashboard<L> {
        &mut self.dashboard
    }

    pub fn into_dashboard(self) -> Dashboard<L> {
        self.dashboard
    }

    pub fn events_handled(&self) -> u64 {
        self.events_handled
    }

    // ========================================================================
    // CONNECTION
    // ========================================================================

    /// Seeds registry, areas and tracks on (re)connect.
    ///
    /// Registry and area failures are logged and skipped; a track fetch
    /// failure is returned and leaves the store untouched.
    pub async fn connect(&mut self) -> Result<(), RuntimeError> {
        match self.classifications.list_classifications().await {
            Ok(entries) => {
                let added = self.dashboard.merge_classifications(entries);
                debug!("Registry merged, {} new classifications", added);
            }
            Err(e) => warn!("Failed to load classifications: {}", e),
        }

        if let Err(e) = self.refresh_areas().await {
            warn!("Failed to load areas: {}", e);
        }

        let active: Vec<String> = self.dashboard.filter_notice().classifications;
        let flights = self.tracks.fetch_tracks(&active).await.map_err(|e| {
            warn!("Failed to fetch tracks: {}", e);
            e
        })?;

        let report = self.dashboard.apply_batch(flights);
        info!(
            "Connected: {} tracks seeded ({} skipped)",
            report.touched.len(),
            report.skipped
        );
        Ok(())
    }

    // ========================================================================
    // EVENT LOOP
    // ========================================================================

    /// Handles one event. Returns false once the channel is closed.
    pub async fn next_event<U: UpdateChannel>(&mut self, channel: &mut U) -> bool {
        match channel.recv().await {
            Some(event) => {
                self.dashboard.handle_event(event);
                self.dashboard.drain_activations();
                self.events_handled += 1;
                true
            }
            None => false,
        }
    }

    /// Processes events until the channel closes.
    pub async fn run<U: UpdateChannel>(&mut self, mut channel: U) {
        info!("Dashboard event loop started");
        while self.next_event(&mut channel).await {}
        info!("Update channel closed after {} events", self.events_handled);
    }

    // ========================================================================
    // OPERATOR ACTIONS
    // ========================================================================

    /// Selects a flight after fetching its full-resolution detail.
    ///
    /// If the fetch fails the selection is left unchanged.
    pub async fn select_flight(&mut self, id: Option<FlightId>) -> Result<bool, RuntimeError> {
        let id = match id {
            Some(id) => id,
            None => return Ok(self.dashboard.select_flight(None)),
        };

        let mut detail = self.tracks.fetch_track(&id).await.map_err(|e| {
            warn!("Failed to fetch detail for {}: {}", id, e);
            e
        })?;
        detail.flight_id.get_or_insert_with(|| id.clone());

        self.dashboard.apply_batch(vec![detail]);
        Ok(self.dashboard.select_flight(Some(id)))
    }

    /// Toggles a classification locally, then notifies the track source.
    ///
    /// The local filter change stands even if the notice fails.
    pub async fn toggle_classification(&mut self, name: &str) -> Result<bool, RuntimeError> {
        let active = self.dashboard.toggle_classification(name);
        let notice = self.dashboard.filter_notice();
        if let Err(e) = self.tracks.notify_filter(&notice).await {
            warn!("Failed to send filter notice: {}", e);
            return Err(e.into());
        }
        Ok(active)
    }

    /// Registers a classification with the service, then locally.
    pub async fn add_classification(
        &mut self,
        entry: ClassificationEntry,
    ) -> Result<(), RuntimeError> {
        if self.dashboard.registry().contains(&entry.name) {
            return Err(RegistryError::AlreadyExists(entry.name).into());
        }
        self.classifications.add_classification(&entry).await?;
        self.dashboard.add_classification(entry)?;
        Ok(())
    }

    /// Requests a manual reclassification; the result arrives as a `flight-update`.
    pub async fn reclassify(
        &mut self,
        flight_id: &str,
        classification: &str,
    ) -> Result<(), RuntimeError> {
        self.tracks.reclassify(flight_id, classification).await?;
        self.dashboard
            .push_log(format!("Reclassification of {} to {} requested", flight_id, classification));
        Ok(())
    }

    // ========================================================================
    // AREAS
    // ========================================================================

    pub async fn refresh_areas(&mut self) -> Result<(), RuntimeError> {
        let records = self.areas.list_areas().await?;
        self.dashboard.replace_areas(records);
        Ok(())
    }

    /// Persists a new area. It is not monitored until [`Self::start_area`].
    pub async fn create_area(
        &mut self,
        bounds: Bounds,
        frequency: PollFrequency,
    ) -> Result<AreaId, RuntimeError> {
        let id = self.areas.create_area(bounds, frequency).await?;
        self.dashboard.areas_mut().insert(AreaRecord {
            id,
            bounds,
            monitoring: false,
            frequency,
            name: None,
        });
        Ok(id)
    }

    pub async fn start_area(
        &mut self,
        id: AreaId,
        frequency: PollFrequency,
    ) -> Result<(), RuntimeError> {
        self.areas.start_area(id, frequency).await?;
        self.dashboard.areas_mut().set_monitoring(id, true, Some(frequency));
        Ok(())
    }

    pub async fn stop_area(&mut self, id: AreaId) -> Result<(), RuntimeError> {
        self.areas.stop_area(id).await?;
        self.dashboard.areas_mut().set_monitoring(id, false, None);
        Ok(())
    }

    /// Deletes an area, stopping it first if it is being monitored.
    ///
    /// A failed stop is logged and the deletion proceeds.
    pub async fn delete_area(&mut self, id: AreaId) -> Result<(), RuntimeError> {
        let monitoring = self.dashboard.areas().get(id).map_or(false, |a| a.monitoring);
        if monitoring {
            if let Err(e) = self.areas.stop_area(id).await {
                warn!("Failed to stop {} before deletion: {}", id, e);
            }
        }
        self.areas.delete_area(id).await?;
        self.dashboard.remove_area(id);
        Ok(())
    }

    pub async fn rename_area(&mut self, id: AreaId, name: &str) -> Result<(), RuntimeError> {
        self.areas.rename_area(id, name).await?;
        self.dashboard.areas_mut().rename(id, name);
        Ok(())
    }
}
