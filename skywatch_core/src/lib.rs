//! SkyWatch Core - flight-track state and render-decision engine
//!
//! This library keeps a live map and list of aircraft in exact agreement
//! while a server pushes position batches and cleanup notices:
//! 1. **State**: `TrackStore` holds one `Track` per flight, samples sorted by time
//! 2. **Visibility**: `FilterState` decides which tracks are shown; map and list share it
//! 3. **Level of detail**: `SimplificationPolicy` thins polylines and drops lines or headings
//!    as the fleet grows
//! 4. **Reconciliation**: `RenderReconciler` diffs desired visuals against what was drawn
//!
//! `Dashboard` owns all of it; `DashboardRuntime` drives it from the update
//! channel and the collaborator services in `skywatch_env`.

pub mod areas;
pub mod bearing;
pub mod config;
pub mod dashboard;
pub mod filter;
pub mod list;
pub mod reconciler;
pub mod registry;
pub mod runtime;
pub mod simplify;
pub mod stats;
pub mod track_store;
pub mod visual;

#[cfg(feature = "visualization")]
pub mod visualization;

// Re-export key types for convenience
pub use areas::AreaBook;
pub use bearing::{initial_bearing, HeadingEstimate};
pub use config::{ConfigError, RenderConfig, RuntimeConfig};
pub use dashboard::Dashboard;
pub use filter::{FilterState, SelectionState};
pub use list::{ListEntry, ListProjection, ListProjector, ListQuery};
pub use reconciler::{ReconcileReport, RenderReconciler, RenderState};
pub use registry::{ClassificationRegistry, RegistryError};
pub use runtime::{DashboardRuntime, RuntimeError};
pub use simplify::{LodDecision, Resolution, SimplificationPolicy};
pub use stats::FleetStats;
pub use track_store::{SnapshotError, Track, TrackStore, UpsertReport};
pub use visual::{
    ActivationHook, Glyph, LineStyle, MarkerStyle, SceneLayer, SceneSnapshot, VisualError,
    VisualId, VisualLayer,
};

#[cfg(feature = "visualization")]
pub use visualization::RerunLayer;
