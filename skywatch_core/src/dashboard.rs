//! Dashboard - the single owner of all engine state.
//!
//! Every mutation goes through a `Dashboard` method that runs to completion:
//! the store or filter changes, then the reconciler and list are re-derived
//! before the method returns. Nothing in here awaits or does I/O; the async
//! side lives in [`crate::runtime`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Dashboard<L>                          │
//! │                                                              │
//! │  ChannelEvent ──> TrackStore ──┬──> RenderReconciler ──> L   │
//! │                                │         ^                   │
//! │  operator ──────> FilterState ─┤         │ activation hooks  │
//! │                                │         │ (crossbeam)       │
//! │                                └──> ListProjector            │
//! │                                                              │
//! │  ClassificationRegistry   AreaBook   operator log            │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crossbeam::channel::{unbounded, Receiver};
use skywatch_env::{
    AreaId, AreaRecord, Bounds, ChannelEvent, ClassificationEntry, FilterChange, FlightId,
    FlightSnapshot, Sample,
};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

use crate::areas::AreaBook;
use crate::config::{RenderConfig, RuntimeConfig};
use crate::filter::FilterState;
use crate::list::{ListProjection, ListProjector, ListQuery};
use crate::reconciler::{ReconcileReport, RenderReconciler, RenderState};
use crate::registry::{ClassificationRegistry, RegistryError};
use crate::stats::FleetStats;
use crate::track_store::{TrackStore, UpsertReport};
use crate::visual::VisualLayer;

/// Coordinator owning the store, filter, registry, areas and visuals.
pub struct Dashboard<L: VisualLayer> {
    runtime_config: RuntimeConfig,
    store: TrackStore,
    filter: FilterState,
    registry: ClassificationRegistry,
    areas: AreaBook,
    reconciler: RenderReconciler,
    layer: L,
    activations: Receiver<FlightId>,
    query: ListQuery,
    log: VecDeque<String>,
    initial_view: Option<Bounds>,
    last_report: ReconcileReport,
}

impl<L: VisualLayer> Dashboard<L> {
    pub fn new(layer: L, render: RenderConfig, runtime_config: RuntimeConfig) -> Self {
        let (tx, rx) = unbounded();
        Self {
            registry: ClassificationRegistry::from_config(&render),
            reconciler: RenderReconciler::new(render, tx),
            runtime_config,
            store: TrackStore::new(),
            filter: FilterState::new(),
            areas: AreaBook::new(),
            layer,
            activations: rx,
            query: ListQuery::default(),
            log: VecDeque::new(),
            initial_view: None,
            last_report: ReconcileReport::default(),
        }
    }

    /// Dashboard with default render and runtime settings.
    pub fn with_layer(layer: L) -> Self {
        Self::new(layer, RenderConfig::default(), RuntimeConfig::default())
    }

    // ------------------------------------------------------------------------
    // Update channel
    // ------------------------------------------------------------------------

    /// Applies one update-channel event to completion.
    pub fn handle_event(&mut self, event: ChannelEvent) {
        debug!("Handling {} event", event.kind());
        match event {
            ChannelEvent::BatchUpdate(batch) => {
                self.apply_batch(batch.flights);
            }
            ChannelEvent::Cleanup(cleanup) => {
                self.apply_cleanup(&cleanup.flight_ids);
            }
            ChannelEvent::FlightUpdate(snapshot) => {
                self.apply_batch(vec![snapshot]);
            }
            ChannelEvent::Log(log) => self.push_log(log.message),
        }
    }

    /// Upserts a batch of snapshots and re-derives the visuals.
    pub fn apply_batch(&mut self, flights: Vec<FlightSnapshot>) -> UpsertReport {
        let report = self.store.upsert_batch(flights);

        // Fit only to snapshots the store accepted.
        if self.runtime_config.fit_initial_view && self.initial_view.is_none() {
            let accepted = report.touched.iter().filter_map(|id| self.store.get(id));
            self.initial_view = bounding_box(accepted.flat_map(|t| t.samples().iter()));
            if let Some(view) = &self.initial_view {
                info!("Initial view fitted to {:?}", view);
            }
        }

        self.reconcile();
        report
    }

    /// Removes tracks and their visuals. Returns the ids that were present.
    ///
    /// Removing the selected track clears the flight selection.
    pub fn apply_cleanup(&mut self, ids: &[FlightId]) -> Vec<FlightId> {
        let removed = self.store.remove(ids.iter().map(String::as_str));
        self.reconciler
            .remove_tracks(&mut self.layer, removed.iter().map(String::as_str));

        if let Some(selected) = self.filter.selected_flight() {
            if removed.iter().any(|id| id == selected) {
                self.filter.set_selection(None);
            }
        }

        debug!("Cleanup removed {} of {} tracks", removed.len(), ids.len());
        self.reconcile();
        removed
    }

    // ------------------------------------------------------------------------
    // Operator actions
    // ------------------------------------------------------------------------

    /// Selects a flight (or clears with `None`). Returns true if the selection changed.
    ///
    /// Selecting an id that is not in the store is ignored.
    pub fn select_flight(&mut self, id: Option<FlightId>) -> bool {
        if let Some(id) = &id {
            if !self.store.contains(id) {
                debug!("Ignoring selection of unknown flight {}", id);
                return false;
            }
        }
        let changed = self.filter.set_selection(id);
        if changed {
            self.reconcile();
        }
        changed
    }

    pub fn select_area(&mut self, id: Option<AreaId>) -> bool {
        self.filter.select_area(id)
    }

    /// Flips a classification in the filter and returns its new membership.
    pub fn toggle_classification(&mut self, name: &str) -> bool {
        let active = self.filter.toggle_classification(name);
        self.reconcile();
        active
    }

    /// Sets filter membership. Returns true if the filter changed.
    pub fn set_classification(&mut self, name: &str, enabled: bool) -> bool {
        let changed = self.filter.set_classification(name, enabled);
        if changed {
            self.reconcile();
        }
        changed
    }

    /// Applies queued activation signals to the selection.
    ///
    /// Returns true if the selection changed.
    pub fn drain_activations(&mut self) -> bool {
        let mut changed = false;
        while let Ok(id) = self.activations.try_recv() {
            if self.store.contains(&id) {
                changed |= self.filter.set_selection(Some(id));
            }
        }
        if changed {
            self.reconcile();
        }
        changed
    }

    /// Activation on the map background: clears flight and area selection.
    pub fn background_activated(&mut self) -> bool {
        let area_changed = self.filter.select_area(None);
        let flight_changed = self.filter.set_selection(None);
        if flight_changed {
            self.reconcile();
        }
        area_changed || flight_changed
    }

    pub fn set_list_query(&mut self, query: ListQuery) {
        self.query = query;
    }

    // ------------------------------------------------------------------------
    // Registry and areas
    // ------------------------------------------------------------------------

    pub fn add_classification(&mut self, entry: ClassificationEntry) -> Result<(), RegistryError> {
        self.registry.add(entry)?;
        self.reconcile();
        Ok(())
    }

    /// Merges the server's registry; returns how many names were new.
    pub fn merge_classifications(&mut self, entries: Vec<ClassificationEntry>) -> usize {
        let added = self.registry.merge(entries);
        self.reconcile();
        added
    }

    pub fn replace_areas(&mut self, records: Vec<AreaRecord>) {
        self.areas.replace_all(records);
        if let Some(selected) = self.filter.selected_area() {
            if self.areas.get(selected).is_none() {
                self.filter.select_area(None);
            }
        }
    }

    pub fn areas_mut(&mut self) -> &mut AreaBook {
        &mut self.areas
    }

    /// Drops an area from the book, clearing it from the selection.
    pub fn remove_area(&mut self, id: AreaId) -> Option<AreaRecord> {
        if self.filter.selected_area() == Some(id) {
            self.filter.select_area(None);
        }
        self.areas.remove(id)
    }

    // ------------------------------------------------------------------------
    // Operator log
    // ------------------------------------------------------------------------

    /// Appends a line, dropping the oldest past capacity.
    pub fn push_log(&mut self, message: impl Into<String>) {
        self.log.push_back(message.into());
        while self.log.len() > self.runtime_config.log_capacity {
            self.log.pop_front();
        }
    }

    pub fn operator_log(&self) -> impl Iterator<Item = &str> {
        self.log.iter().map(String::as_str)
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    pub fn list(&self) -> ListProjection {
        ListProjector::project(&self.store, &self.filter, &self.query)
    }

    pub fn stats(&self) -> FleetStats {
        FleetStats::compute(&self.store, &self.areas)
    }

    pub fn area_breakdown(&self, id: AreaId) -> Option<BTreeMap<String, usize>> {
        self.areas.classification_breakdown(id, &self.store)
    }

    pub fn filter_notice(&self) -> FilterChange {
        self.filter.change_notice()
    }

    /// Bounding box of the first non-empty batch, if fitting is enabled.
    pub fn initial_view(&self) -> Option<Bounds> {
        self.initial_view
    }

    pub fn render_state(&self, id: &str) -> RenderState {
        self.reconciler.state_of(id)
    }

    pub fn visible_count(&self) -> usize {
        self.reconciler.visible_count()
    }

    pub fn last_report(&self) -> &ReconcileReport {
        &self.last_report
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn registry(&self) -> &ClassificationRegistry {
        &self.registry
    }

    pub fn areas(&self) -> &AreaBook {
        &self.areas
    }

    pub fn reconciler(&self) -> &RenderReconciler {
        &self.reconciler
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut L {
        &mut self.layer
    }

    /// Removes every visual, e.g. on disconnect. Store and filter are kept.
    pub fn teardown(&mut self) {
        self.reconciler.teardown(&mut self.layer);
    }

    /// Re-derives all visuals from current state.
    pub fn reconcile(&mut self) -> &ReconcileReport {
        self.last_report = self.reconciler.reconcile(
            &mut self.layer,
            &mut self.store,
            &self.filter,
            &self.registry,
        );
        &self.last_report
    }
}

/// Bounds of every valid sample, or `None` if there are none.
fn bounding_box<'a>(samples: impl Iterator<Item = &'a Sample>) -> Option<Bounds> {
    let mut coords = samples.filter(|s| s.is_valid()).map(|s| s.coord());

    let first = coords.next()?;
    let bounds = coords.fold(Bounds::from_corners(first, first), |b, (lat, lon)| Bounds {
        lamin: b.lamin.min(lat),
        lamax: b.lamax.max(lat),
        lomin: b.lomin.min(lon),
        lomax: b.lomax.max(lon),
    });
    Some(bounds)
}

// ============================================================================
// TESTS
// ============================================================================
