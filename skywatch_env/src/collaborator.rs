//! Collaborator interfaces the SkyWatch engine talks to.
//!
//! Everything behind these traits is external to the engine: the HTTP
//! endpoints serving tracks, the classification registry persistence and
//! the area-of-interest service. The engine only ever awaits them between
//! mutations and applies their results whole.

use async_trait::async_trait;

use crate::error::EnvError;
use crate::types::{
    AreaId, AreaRecord, Bounds, ClassificationEntry, FilterChange, FlightSnapshot, PollFrequency,
};

/// Source of track data and sink for filter notices.
///
/// # Implementations
///
/// - **Production**: HTTP client against the tracking server
/// - **Tests/Simulation**: [`crate::InMemoryBackend`]
#[async_trait]
pub trait TrackSource: Send + Sync + 'static {
    /// Fetches all current tracks, used to seed the store on (re)connect.
    ///
    /// A non-empty `classifications` slice asks the server to pre-filter;
    /// an empty slice requests everything.
    async fn fetch_tracks(&self, classifications: &[String])
        -> Result<Vec<FlightSnapshot>, EnvError>;

    /// Fetches one track at full resolution.
    ///
    /// # Returns
    /// * `Ok(snapshot)` - Full point list plus stats
    /// * `Err(EnvError::NotFound)` - Unknown flight id
    async fn fetch_track(&self, flight_id: &str) -> Result<FlightSnapshot, EnvError>;

    /// Informs the server of the active classification filter.
    async fn notify_filter(&self, notice: &FilterChange) -> Result<(), EnvError>;

    /// Requests a manual reclassification.
    ///
    /// The server answers asynchronously with a `flight-update` event.
    async fn reclassify(&self, flight_id: &str, classification: &str) -> Result<(), EnvError>;
}

/// Classification registry persistence.
#[async_trait]
pub trait ClassificationService: Send + Sync + 'static {
    /// Returns every known `{name, color}` pair.
    async fn list_classifications(&self) -> Result<Vec<ClassificationEntry>, EnvError>;

    /// Adds a classification.
    ///
    /// # Returns
    /// * `Err(EnvError::AlreadyExists)` - Name is already registered
    async fn add_classification(&self, entry: &ClassificationEntry) -> Result<(), EnvError>;
}

/// Area-of-interest persistence and monitoring control.
#[async_trait]
pub trait AreaService: Send + Sync + 'static {
    /// Persists a new (not yet monitored) area and returns its server-assigned id.
    async fn create_area(&self, bounds: Bounds, frequency: PollFrequency)
        -> Result<AreaId, EnvError>;

    /// Starts (or restarts) monitoring of an existing area.
    async fn start_area(&self, id: AreaId, frequency: PollFrequency) -> Result<(), EnvError>;

    /// Stops monitoring. Stopping an unknown area is not an error.
    async fn stop_area(&self, id: AreaId) -> Result<(), EnvError>;

    /// Deletes an area.
    async fn delete_area(&self, id: AreaId) -> Result<(), EnvError>;

    /// Sets an area's display name.
    async fn rename_area(&self, id: AreaId, name: &str) -> Result<(), EnvError>;

    /// Lists all persisted areas.
    async fn list_areas(&self) -> Result<Vec<AreaRecord>, EnvError>;
}
