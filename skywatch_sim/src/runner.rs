//! Scenario runner - drives the dashboard runtime with a synthetic fleet.
//!
//! Each tick the fleet moves, the simulated server pushes a batch update
//! (and, depending on the scenario, cleanups or operator actions) through
//! the real update channel, and the engine invariants are checked against
//! the resulting store, list and scene.

use serde::Serialize;
use skywatch_core::{
    Dashboard, DashboardRuntime, Glyph, ListProjector, ListQuery, RenderConfig, RenderState,
    RuntimeConfig, SceneLayer,
};
use skywatch_env::{
    update_channel, FlightId, FlightSnapshot, InMemoryBackend, MpscUpdateChannel, UpdateSender,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::exporter::{SimExport, SimFrame};
use crate::fleet::{Fleet, CLASSES};
use crate::scenarios::ScenarioId;

type SimRuntime = DashboardRuntime<SceneLayer, InMemoryBackend, InMemoryBackend, InMemoryBackend>;

/// Fleets up to this size get their full scene exported per frame.
const SCENE_EXPORT_LIMIT: usize = 200;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    #[serde(serialize_with = "serialize_scenario")]
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all invariant checks
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Tracks in the store at the end
    pub final_track_count: usize,

    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

fn serialize_scenario<S: serde::Serializer>(id: &ScenarioId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(id.name())
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Batch-update events applied
    pub batches: u64,

    /// Cleanup events applied
    pub cleanups: u64,

    /// Invariant checks passed
    pub checks: u64,

    /// Largest visible-track count seen
    pub max_visible: usize,

    /// Largest number of tracks drawn with a line
    pub max_lines: usize,

    /// Visual primitive failures across all passes
    pub failed_visuals: usize,
}

/// Runs fleet scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Fleet size override
    aircraft: Option<usize>,

    /// Ticks per run
    ticks: u64,

    /// Simulated seconds per tick
    tick_secs: f64,

    /// Render configuration under test
    render: RenderConfig,

    /// Export every Nth tick
    export_interval: u64,
}

impl ScenarioRunner {
    /// Creates a new runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            aircraft: None,
            ticks: 20,
            tick_secs: 10.0,
            render: RenderConfig::default(),
            export_interval: 1,
        }
    }

    pub fn with_aircraft(mut self, aircraft: Option<usize>) -> Self {
        self.aircraft = aircraft;
        self
    }

    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.ticks = ticks.max(1);
        self
    }

    pub fn with_render_config(mut self, render: RenderConfig) -> Self {
        self.render = render;
        self
    }

    pub fn with_export_interval(mut self, interval: u64) -> Self {
        self.export_interval = interval.max(1);
        self
    }

    /// Runs a scenario.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_inner(scenario, None)
    }

    /// Runs a scenario and records frames into `export`.
    pub fn run_with_export(&self, scenario: ScenarioId, export: &mut SimExport) -> ScenarioResult {
        let result = self.run_inner(scenario, Some(export));
        export.finalize(result.passed, result.failure_reason.clone());
        result
    }

    fn run_inner(&self, scenario: ScenarioId, export: Option<&mut SimExport>) -> ScenarioResult {
        info!("Running scenario: {} - {}", scenario.name(), scenario.description());

        let mut run = Run {
            scenario,
            ticks: 0,
            metrics: ScenarioMetrics::default(),
            time: 0.0,
            tracks: 0,
        };

        let outcome = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt.block_on(self.drive(&mut run, export)),
            Err(e) => Err(format!("Failed to build runtime: {}", e)),
        };

        if let Err(reason) = &outcome {
            warn!("Scenario {} failed at tick {}: {}", scenario.name(), run.ticks, reason);
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            total_ticks: run.ticks,
            final_time_secs: run.time,
            final_track_count: run.tracks,
            failure_reason: outcome.err(),
            metrics: run.metrics,
        }
    }

    async fn drive(&self, run: &mut Run, mut export: Option<&mut SimExport>) -> Result<(), String> {
        let scenario = run.scenario;
        let dropout = if scenario == ScenarioId::Reorder { 0.1 } else { 0.0 };
        let mut fleet = Fleet::new(self.seed).with_dropout(dropout);
        fleet.spawn(self.aircraft.unwrap_or_else(|| scenario.default_aircraft()));

        let runtime_config = RuntimeConfig::default();
        let (tx, mut rx) = update_channel(runtime_config.channel_capacity);
        let backend = Arc::new(InMemoryBackend::new().with_updates(tx.clone()));
        sync_backend(&backend, &fleet.snapshots());

        let dashboard = Dashboard::new(SceneLayer::new(), self.render.clone(), runtime_config);
        let mut runtime: SimRuntime =
            DashboardRuntime::new(dashboard, backend.clone(), backend.clone(), backend.clone());

        runtime.connect().await.map_err(|e| format!("connect failed: {}", e))?;
        check_invariants(runtime.dashboard(), &self.render)?;
        run.metrics.checks += 1;

        let mut last_batch = Vec::new();
        for tick in 0..self.ticks {
            fleet.step(self.tick_secs);
            run.ticks = tick + 1;
            run.time = fleet.time();

            let mut batch = if scenario == ScenarioId::Reorder {
                fleet.shuffled_snapshots()
            } else {
                fleet.snapshots()
            };
            sync_backend(&backend, &batch);

            match scenario {
                ScenarioId::CleanupRace => {
                    let retired = fleet.retire(2);
                    let ids: Vec<FlightId> =
                        retired.iter().filter_map(|s| s.flight_id.clone()).collect();
                    for id in &ids {
                        backend.remove_flight(id);
                    }
                    batch.extend(retired);
                    push_batch(&tx, &mut runtime, &mut rx, batch.clone(), &mut run.metrics).await?;
                    push_cleanup(&tx, &mut runtime, &mut rx, ids.clone(), &mut run.metrics).await?;

                    let survivor = ids.iter().find(|id| runtime.dashboard().store().contains(id));
                    if let Some(id) = survivor {
                        return Err(format!("{} survived a later cleanup", id));
                    }
                    // keep the post-cleanup view for the idempotence check
                    batch.retain(|s| s.flight_id.as_ref().map_or(false, |id| !ids.contains(id)));
                }
                ScenarioId::Selection => {
                    self.operate(tick, &mut fleet, &mut runtime).await?;
                    push_batch(&tx, &mut runtime, &mut rx, batch.clone(), &mut run.metrics).await?;
                }
                _ => {
                    push_batch(&tx, &mut runtime, &mut rx, batch.clone(), &mut run.metrics).await?;
                }
            }

            tx.send_log(format!("Polled {} aircraft", fleet.len()))
                .await
                .map_err(|e| e.to_string())?;
            runtime.next_event(&mut rx).await;

            check_invariants(runtime.dashboard(), &self.render)?;
            run.metrics.checks += 1;
            record_metrics(runtime.dashboard(), &mut run.metrics);

            if let Some(export) = export.as_deref_mut() {
                if tick % self.export_interval == 0 {
                    export.add_frame(frame(tick, fleet.time(), runtime.dashboard()));
                }
            }

            last_batch = batch;
        }

        // Idempotence: replaying the last batch must not touch the scene.
        let before = runtime.dashboard().layer().snapshot();
        runtime.dashboard_mut().layer_mut().reset_mutations();
        push_batch(&tx, &mut runtime, &mut rx, last_batch, &mut run.metrics).await?;
        let mutations = runtime.dashboard().layer().mutation_count();
        if mutations != 0 || runtime.dashboard().layer().snapshot() != before {
            return Err(format!("replaying identical batch caused {} mutations", mutations));
        }

        run.tracks = runtime.dashboard().store().len();
        debug!(
            "Scenario {} finished: {} tracks, {} checks",
            scenario.name(),
            run.tracks,
            run.metrics.checks
        );
        Ok(())
    }

    /// Operator actions of the selection scenario.
    async fn operate(
        &self,
        tick: u64,
        fleet: &mut Fleet,
        runtime: &mut SimRuntime,
    ) -> Result<(), String> {
        match tick {
            1 => {
                let id = fleet.pick().ok_or("empty fleet")?;
                runtime
                    .select_flight(Some(id.clone()))
                    .await
                    .map_err(|e| format!("select {} failed: {}", id, e))?;
                expect_selected(runtime, Some(&id))?;
            }
            3 => {
                let selected_class = selected_class(runtime).ok_or("nothing selected at tick 3")?;
                let other = CLASSES
                    .iter()
                    .find(|c| **c != selected_class)
                    .ok_or("no other classification")?;
                runtime
                    .toggle_classification(other)
                    .await
                    .map_err(|e| format!("toggle failed: {}", e))?;
            }
            5 => {
                // Activate another visible track as if clicked on the map.
                let dash = runtime.dashboard();
                let target = dash
                    .reconciler()
                    .visible_ids()
                    .iter()
                    .find(|id| !dash.filter().is_selected(id))
                    .cloned();
                if let Some(target) = target {
                    if !dash.layer().activate_flight(&target) {
                        return Err(format!("no visual to activate for {}", target));
                    }
                    runtime.dashboard_mut().drain_activations();
                    expect_selected(runtime, Some(&target))?;
                }
            }
            7 => {
                runtime.dashboard_mut().background_activated();
                expect_selected(runtime, None)?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Mutable state of one run, readable after a failure.
struct Run {
    scenario: ScenarioId,
    ticks: u64,
    metrics: ScenarioMetrics,
    time: f64,
    tracks: usize,
}

fn sync_backend(backend: &InMemoryBackend, snapshots: &[FlightSnapshot]) {
    for snapshot in snapshots {
        backend.upsert_flight(snapshot.clone());
    }
}

async fn push_batch(
    tx: &UpdateSender,
    runtime: &mut SimRuntime,
    rx: &mut MpscUpdateChannel,
    batch: Vec<FlightSnapshot>,
    metrics: &mut ScenarioMetrics,
) -> Result<(), String> {
    tx.send_batch(batch).await.map_err(|e| e.to_string())?;
    if !runtime.next_event(rx).await {
        return Err("update channel closed".to_string());
    }
    metrics.batches += 1;
    Ok(())
}

async fn push_cleanup(
    tx: &UpdateSender,
    runtime: &mut SimRuntime,
    rx: &mut MpscUpdateChannel,
    ids: Vec<FlightId>,
    metrics: &mut ScenarioMetrics,
) -> Result<(), String> {
    tx.send_cleanup(ids).await.map_err(|e| e.to_string())?;
    if !runtime.next_event(rx).await {
        return Err("update channel closed".to_string());
    }
    metrics.cleanups += 1;
    Ok(())
}

fn selected_class(runtime: &SimRuntime) -> Option<String> {
    let dash = runtime.dashboard();
    let id = dash.filter().selected_flight()?;
    dash.store().get(id).map(|t| t.classification.clone())
}

fn expect_selected(runtime: &SimRuntime, expected: Option<&FlightId>) -> Result<(), String> {
    let actual = runtime.dashboard().filter().selected_flight();
    if actual != expected.map(String::as_str) {
        return Err(format!("expected selection {:?}, found {:?}", expected, actual));
    }
    Ok(())
}

fn record_metrics(dash: &Dashboard<SceneLayer>, metrics: &mut ScenarioMetrics) {
    let report = dash.last_report();
    metrics.max_visible = metrics.max_visible.max(report.visible);
    metrics.max_lines = metrics.max_lines.max(report.lines);
    metrics.failed_visuals += report.failed;
}

fn frame(tick: u64, time_sec: f64, dash: &Dashboard<SceneLayer>) -> SimFrame {
    SimFrame {
        tick,
        time_sec,
        render: dash.last_report().clone(),
        shown: dash.list().shown_count,
        stats: dash.stats(),
        selected: dash.filter().selected_flight().map(str::to_string),
        scene: (dash.store().len() <= SCENE_EXPORT_LIMIT).then(|| dash.layer().snapshot()),
        events: dash.operator_log().last().map(str::to_string).into_iter().collect(),
    }
}

// ============================================================================
// INVARIANTS
// ============================================================================

/// Checks store, list and scene against each other.
pub fn check_invariants(dash: &Dashboard<SceneLayer>, render: &RenderConfig) -> Result<(), String> {
    let store = dash.store();
    let filter = dash.filter();

    for track in store.iter() {
        if track.samples().is_empty() {
            return Err(format!("{} has no samples", track.id));
        }
        if track.samples().windows(2).any(|w| w[0].timestamp > w[1].timestamp) {
            return Err(format!("{} samples out of order", track.id));
        }
    }

    // Map and list must agree on visibility.
    let list = ListProjector::project(store, filter, &ListQuery::default());
    let listed: BTreeSet<&str> = list.entries.iter().map(|e| e.flight_id()).collect();
    let rendered: BTreeSet<&str> =
        dash.reconciler().visible_ids().iter().map(String::as_str).collect();
    if listed != rendered || list.visible_count != dash.visible_count() {
        return Err(format!(
            "visibility disagreement: list {} vs map {}",
            list.visible_count,
            dash.visible_count()
        ));
    }

    let scene = dash.layer().snapshot();
    let markers: BTreeMap<&str, &skywatch_core::visual::MarkerView> =
        scene.markers.iter().map(|m| (m.flight_id.as_str(), m)).collect();
    let lines: BTreeMap<&str, &skywatch_core::visual::LineView> =
        scene.lines.iter().map(|l| (l.flight_id.as_str(), l)).collect();

    let total = dash.visible_count();
    let selection_active = filter.selected_flight().is_some();

    for track in store.iter() {
        let id = track.id.as_str();
        let state = dash.render_state(id);

        if !rendered.contains(id) {
            if state != RenderState::Absent || markers.contains_key(id) {
                return Err(format!("hidden track {} still drawn", id));
            }
            continue;
        }

        let valid = track.valid_coords().len();
        let selected = filter.is_selected(id);
        let expected = match valid {
            0 => RenderState::Absent,
            1 => RenderState::MarkerOnly,
            _ if selected || total <= render.line_ceiling => RenderState::LineAndMarker,
            _ => RenderState::MarkerOnly,
        };
        if state != expected {
            return Err(format!(
                "{} is {:?}, expected {:?} at {} visible",
                id, state, expected, total
            ));
        }
        if expected == RenderState::Absent {
            continue;
        }

        let marker = markers.get(id).ok_or_else(|| format!("{} has no marker", id))?;
        let oriented = matches!(marker.style.glyph, Glyph::Oriented { .. });
        if oriented != (selected || total <= render.heading_ceiling) {
            return Err(format!("{} glyph {:?} wrong at {} visible", id, marker.style.glyph, total));
        }

        let opacity = if selected {
            render.selected_opacity
        } else if selection_active {
            render.dimmed_opacity
        } else {
            render.neutral_opacity
        };
        if marker.style.opacity != opacity {
            return Err(format!("{} opacity {} expected {}", id, marker.style.opacity, opacity));
        }

        if let Some(line) = lines.get(id) {
            let first_valid = track.valid_coords().first().copied();
            if line.vertices.first().copied() != first_valid {
                return Err(format!("{} line lost its first point", id));
            }
            if selected && line.vertices.len() != valid {
                return Err(format!("selected {} not at full resolution", id));
            }
            if line.vertices.len() > valid {
                return Err(format!("{} line has more vertices than samples", id));
            }
        }
    }

    if scene.markers.len() != markers.len() || markers.len() > rendered.len() {
        return Err("scene has stray markers".to_string());
    }
    Ok(())
}
