//! The "RECONCILER" - turns tracks into map visuals with minimal mutation.
//!
//! Each track moves through a small state machine:
//!
//! ```text
//!            visible, line allowed
//!   Absent ─────────────────────────> LineAndMarker
//!     │  ^                               │     ^
//!     │  └──── hidden / cleanup ─────────┤     │ line allowed again
//!     │                                  v     │
//!     └────── visible, no line ─────> MarkerOnly
//! ```
//!
//! Every pass re-derives the desired visual of every track from the store,
//! the filter and the level-of-detail policy, then diffs it against what was
//! last issued to the [`VisualLayer`]. Only differences reach the layer, so
//! a repeat pass with unchanged inputs performs zero mutations.

use crossbeam::channel::Sender;
use serde::Serialize;
use skywatch_env::FlightId;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::bearing::{estimate_for_track, glyph_rotation};
use crate::config::RenderConfig;
use crate::filter::FilterState;
use crate::registry::ClassificationRegistry;
use crate::simplify::SimplificationPolicy;
use crate::track_store::{Track, TrackStore};
use crate::visual::{
    ActivationHook, Glyph, LineStyle, MarkerStyle, VisualError, VisualId, VisualLayer,
};

/// Render state of one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    Absent,
    MarkerOnly,
    LineAndMarker,
}

#[derive(Debug, Clone)]
struct IssuedLine {
    id: VisualId,
    vertices: Vec<(f64, f64)>,
    style: LineStyle,
}

#[derive(Debug, Clone)]
struct IssuedMarker {
    id: VisualId,
    position: (f64, f64),
    style: MarkerStyle,
}

/// What was last issued to the layer for one track.
#[derive(Debug, Clone, Default)]
struct VisualEntry {
    line: Option<IssuedLine>,
    marker: Option<IssuedMarker>,
}

impl VisualEntry {
    fn state(&self) -> RenderState {
        match (&self.line, &self.marker) {
            (Some(_), _) => RenderState::LineAndMarker,
            (None, Some(_)) => RenderState::MarkerOnly,
            (None, None) => RenderState::Absent,
        }
    }
}

/// Desired visual for one track in the current pass.
struct Desired {
    line: Option<(Vec<(f64, f64)>, LineStyle)>,
    position: (f64, f64),
    marker_style: MarkerStyle,
}

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Tracks passing the visibility rule
    pub visible: usize,

    /// Tracks drawn with a polyline
    pub lines: usize,

    /// Tracks drawn marker-only
    pub markers_only: usize,

    /// Tracks whose primitives failed and were cleared
    pub failed: usize,
}

/// Keeps the visual layer in step with the track store.
#[derive(Debug)]
pub struct RenderReconciler {
    config: RenderConfig,
    policy: SimplificationPolicy,
    entries: BTreeMap<FlightId, VisualEntry>,
    visible: BTreeSet<FlightId>,
    activations: Sender<FlightId>,
}

impl RenderReconciler {
    /// Creates a reconciler whose activation hooks send on `activations`.
    pub fn new(config: RenderConfig, activations: Sender<FlightId>) -> Self {
        Self {
            policy: SimplificationPolicy::from_config(&config),
            config,
            entries: BTreeMap::new(),
            visible: BTreeSet::new(),
            activations,
        }
    }

    pub fn policy(&self) -> &SimplificationPolicy {
        &self.policy
    }

    /// Number of tracks the last pass treated as visible.
    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    /// Ids the last pass treated as visible.
    pub fn visible_ids(&self) -> &BTreeSet<FlightId> {
        &self.visible
    }

    pub fn state_of(&self, id: &str) -> RenderState {
        self.entries
            .get(id)
            .map(VisualEntry::state)
            .unwrap_or(RenderState::Absent)
    }

    /// Re-derives every track's visual and pushes the differences to `layer`.
    ///
    /// A primitive failure clears that track's visuals and is logged; the
    /// remaining tracks are still processed.
    pub fn reconcile<L: VisualLayer>(
        &mut self,
        layer: &mut L,
        store: &mut TrackStore,
        filter: &FilterState,
        registry: &ClassificationRegistry,
    ) -> ReconcileReport {
        self.visible = store
            .iter()
            .filter(|t| filter.is_visible(t))
            .map(|t| t.id.clone())
            .collect();
        let total = self.visible.len();

        // Hidden or vanished tracks lose their visuals first.
        let stale: Vec<FlightId> = self
            .entries
            .keys()
            .filter(|id| !self.visible.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            self.teardown_track(layer, &id);
        }

        let mut report = ReconcileReport {
            visible: total,
            ..Default::default()
        };

        for track in store.iter_mut() {
            if !self.visible.contains(&track.id) {
                continue;
            }

            let desired = match self.derive(track, filter, registry, total) {
                Some(desired) => desired,
                None => {
                    warn!("Track {} has no valid coordinates, not drawn", track.id);
                    self.teardown_track(layer, &track.id);
                    report.failed += 1;
                    continue;
                }
            };

            let mut entry = self.entries.remove(&track.id).unwrap_or_default();
            match self.sync(layer, &track.id, &mut entry, desired) {
                Ok(()) => {
                    match entry.state() {
                        RenderState::LineAndMarker => report.lines += 1,
                        RenderState::MarkerOnly => report.markers_only += 1,
                        RenderState::Absent => {}
                    }
                    self.entries.insert(track.id.clone(), entry);
                }
                Err(e) => {
                    warn!("Failed to draw track {}: {}", track.id, e);
                    clear_entry(layer, &track.id, entry);
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Reconciled {} visible tracks: {} lines, {} marker-only, {} failed",
            report.visible, report.lines, report.markers_only, report.failed
        );
        report
    }

    /// Removes the visuals of `ids` immediately.
    pub fn remove_tracks<'a, L: VisualLayer>(
        &mut self,
        layer: &mut L,
        ids: impl IntoIterator<Item = &'a str>,
    ) {
        for id in ids {
            self.visible.remove(id);
            self.teardown_track(layer, id);
        }
    }

    /// Removes every visual this reconciler has issued.
    pub fn teardown<L: VisualLayer>(&mut self, layer: &mut L) {
        for (id, entry) in std::mem::take(&mut self.entries) {
            clear_entry(layer, &id, entry);
        }
        self.visible.clear();
    }

    fn teardown_track<L: VisualLayer>(&mut self, layer: &mut L, id: &str) {
        if let Some(entry) = self.entries.remove(id) {
            clear_entry(layer, id, entry);
        }
    }

    /// Computes the desired visual, or `None` if the track has nothing drawable.
    fn derive(
        &self,
        track: &mut Track,
        filter: &FilterState,
        registry: &ClassificationRegistry,
        total: usize,
    ) -> Option<Desired> {
        let selected = filter.is_selected(&track.id);
        let decision = self.policy.decide(total, selected);

        let vertices = self.policy.apply(&track.valid_coords(), decision.resolution);
        let position = *vertices.last()?;

        let opacity = if selected {
            self.config.selected_opacity
        } else if filter.selected_flight().is_some() {
            self.config.dimmed_opacity
        } else {
            self.config.neutral_opacity
        };
        let color = registry.color_of(&track.classification).to_string();

        let glyph = if decision.orient_glyph {
            let bearing = estimate_for_track(track);
            Glyph::Oriented {
                rotation_deg: glyph_rotation(bearing, self.config.glyph_offset_deg),
            }
        } else {
            Glyph::Dot
        };

        let line = if decision.draw_line && vertices.len() >= 2 {
            let dash = if selected {
                self.config.dash_patterns.get(&track.classification).cloned()
            } else {
                None
            };
            Some((
                vertices,
                LineStyle {
                    color: color.clone(),
                    opacity,
                    weight: self.config.line_weight,
                    dash,
                },
            ))
        } else {
            None
        };

        Some(Desired {
            line,
            position,
            marker_style: MarkerStyle { glyph, color, opacity },
        })
    }

    /// Brings `entry` to `desired`, updating it as each layer call succeeds.
    fn sync<L: VisualLayer>(
        &self,
        layer: &mut L,
        flight_id: &str,
        entry: &mut VisualEntry,
        desired: Desired,
    ) -> Result<(), VisualError> {
        match (entry.line.as_mut(), desired.line) {
            (None, Some((vertices, style))) => {
                let id = layer.create_line(&vertices, &style, self.hook(flight_id))?;
                entry.line = Some(IssuedLine { id, vertices, style });
            }
            (Some(issued), Some((vertices, style))) => {
                if issued.vertices != vertices {
                    layer.update_line(issued.id, &vertices)?;
                    issued.vertices = vertices;
                }
                if issued.style != style {
                    layer.restyle_line(issued.id, &style)?;
                    issued.style = style;
                }
            }
            (Some(issued), None) => {
                layer.remove(issued.id)?;
                entry.line = None;
            }
            (None, None) => {}
        }

        match entry.marker.as_mut() {
            None => {
                let id = layer.create_marker(
                    desired.position,
                    &desired.marker_style,
                    self.hook(flight_id),
                )?;
                entry.marker = Some(IssuedMarker {
                    id,
                    position: desired.position,
                    style: desired.marker_style,
                });
            }
            Some(issued) => {
                if issued.position != desired.position {
                    layer.move_marker(issued.id, desired.position)?;
                    issued.position = desired.position;
                }
                if issued.style != desired.marker_style {
                    layer.restyle_marker(issued.id, &desired.marker_style)?;
                    issued.style = desired.marker_style;
                }
            }
        }

        Ok(())
    }

    fn hook(&self, flight_id: &str) -> ActivationHook {
        ActivationHook::new(flight_id, self.activations.clone())
    }
}

/// Removes whatever `entry` holds; removal errors are logged and ignored.
fn clear_entry<L: VisualLayer>(layer: &mut L, flight_id: &str, entry: VisualEntry) {
    let ids = entry.line.map(|l| l.id).into_iter().chain(entry.marker.map(|m| m.id));
    for id in ids {
        if let Err(e) = layer.remove(id) {
            debug!("Removing visual {:?} of {} failed: {}", id, flight_id, e);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visual::SceneLayer;
    use approx::assert_relative_eq;
    use crossbeam::channel::{unbounded, Receiver};
    use skywatch_env::{FlightSnapshot, Sample};

    struct Fixture {
        reconciler: RenderReconciler,
        scene: SceneLayer,
        store: TrackStore,
        filter: FilterState,
        registry: ClassificationRegistry,
        _rx: Receiver<FlightId>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(RenderConfig::default())
        }

        fn with_config(config: RenderConfig) -> Self {
            let (tx, rx) = unbounded();
            Self {
                registry: ClassificationRegistry::from_config(&config),
                reconciler: RenderReconciler::new(config, tx),
                scene: SceneLayer::new(),
                store: TrackStore::new(),
                filter: FilterState::new(),
                _rx: rx,
            }
        }

        fn run(&mut self) -> ReconcileReport {
            self.reconciler
                .reconcile(&mut self.scene, &mut self.store, &self.filter, &self.registry)
        }

        fn add(&mut self, id: &str, class: &str) {
            self.store.upsert_batch(vec![eastbound(id).with_classification(class)]);
        }
    }

    fn eastbound(id: &str) -> FlightSnapshot {
        FlightSnapshot::new(
            id,
            vec![
                Sample::position(0.0, 0.0, 1.0),
                Sample::position(0.0, 0.5, 2.0),
                Sample::position(0.0, 1.0, 3.0),
            ],
        )
    }

    fn fleet(n: usize) -> Vec<FlightSnapshot> {
        (0..n).map(|i| eastbound(&format!("f{:04}", i))).collect()
    }

    #[test]
    fn test_sparse_track_gets_line_and_oriented_marker() {
        let mut fx = Fixture::new();
        fx.add("X", "survey");
        let report = fx.run();

        assert_eq!(report.lines, 1);
        assert_eq!(fx.reconciler.state_of("X"), RenderState::LineAndMarker);

        let marker = fx.scene.marker_for("X").unwrap();
        assert_eq!(marker.position, (0.0, 1.0));
        match marker.style.glyph {
            Glyph::Oriented { rotation_deg } => {
                assert_relative_eq!(rotation_deg, 45.0, epsilon = 1e-9)
            }
            Glyph::Dot => panic!("expected oriented glyph"),
        }
        let line = fx.scene.line_for("X").unwrap();
        assert_eq!(line.style.color, "#ff0000");
        assert_eq!(line.style.opacity, 0.6);
        assert_eq!(line.style.weight, 4);
    }

    #[test]
    fn test_repeat_pass_is_mutation_free() {
        let mut fx = Fixture::new();
        fx.store.upsert_batch(fleet(20));
        fx.run();
        let before = fx.scene.snapshot();
        fx.scene.reset_mutations();

        fx.store.upsert_batch(fleet(20));
        fx.run();

        assert_eq!(fx.scene.mutation_count(), 0);
        assert_eq!(fx.scene.snapshot(), before);
    }

    #[test]
    fn test_line_suppressed_in_crowded_fleet() {
        let mut fx = Fixture::new();
        fx.store.upsert_batch(fleet(300));
        fx.run();
        assert_eq!(fx.reconciler.state_of("f0000"), RenderState::LineAndMarker);

        fx.store.upsert_batch(fleet(600));
        let report = fx.run();
        assert_eq!(fx.reconciler.state_of("f0000"), RenderState::MarkerOnly);
        assert_eq!(report.lines, 0);
        assert_eq!(fx.scene.line_count(), 0);
        assert_eq!(fx.scene.marker_count(), 600);
    }

    #[test]
    fn test_selected_track_keeps_line_in_crowded_fleet() {
        let mut fx = Fixture::new();
        fx.store.upsert_batch(fleet(1200));
        fx.filter.set_selection(Some("f0007".to_string()));
        fx.run();

        assert_eq!(fx.reconciler.state_of("f0007"), RenderState::LineAndMarker);
        assert_eq!(fx.reconciler.state_of("f0008"), RenderState::MarkerOnly);
        assert_eq!(fx.scene.marker_for("f0008").unwrap().style.glyph, Glyph::Dot);
        assert!(matches!(
            fx.scene.marker_for("f0007").unwrap().style.glyph,
            Glyph::Oriented { .. }
        ));
    }

    #[test]
    fn test_selection_change_is_style_only() {
        let mut fx = Fixture::new();
        fx.add("A", "survey");
        fx.add("B", "commercial");
        fx.run();
        fx.scene.reset_mutations();

        fx.filter.set_selection(Some("A".to_string()));
        fx.run();

        assert_eq!(fx.reconciler.state_of("A"), RenderState::LineAndMarker);
        assert_eq!(fx.reconciler.state_of("B"), RenderState::LineAndMarker);
        // two restyles per track: line and marker
        assert_eq!(fx.scene.mutation_count(), 4);
        assert_eq!(fx.scene.line_for("A").unwrap().style.opacity, 1.0);
        assert_eq!(fx.scene.line_for("B").unwrap().style.opacity, 0.1);
    }

    #[test]
    fn test_dash_pattern_only_on_selected() {
        let mut fx = Fixture::new();
        fx.add("A", "rescue");
        fx.add("B", "rescue");
        fx.filter.set_selection(Some("A".to_string()));
        fx.run();

        assert_eq!(fx.scene.line_for("A").unwrap().style.dash.as_deref(), Some("15, 5"));
        assert_eq!(fx.scene.line_for("B").unwrap().style.dash, None);
    }

    #[test]
    fn test_filtered_track_torn_down() {
        let mut fx = Fixture::new();
        fx.add("A", "survey");
        fx.add("B", "commercial");
        fx.run();

        fx.filter.toggle_classification("survey");
        let report = fx.run();

        assert_eq!(report.visible, 1);
        assert_eq!(fx.reconciler.state_of("B"), RenderState::Absent);
        assert!(fx.scene.marker_for("B").is_none());
        assert!(fx.scene.line_for("B").is_none());
    }

    #[test]
    fn test_single_valid_point_is_marker_only() {
        let mut fx = Fixture::new();
        fx.store.upsert_batch(vec![FlightSnapshot::new(
            "X",
            vec![Sample::position(10.0, 10.0, 1.0), Sample::position(f64::NAN, f64::NAN, 2.0)],
        )]);
        fx.run();
        assert_eq!(fx.reconciler.state_of("X"), RenderState::MarkerOnly);
        assert_eq!(fx.scene.marker_for("X").unwrap().position, (10.0, 10.0));
    }

    #[test]
    fn test_primitive_failure_does_not_abort_batch() {
        let mut fx = Fixture::new();
        fx.store.upsert_batch(vec![
            FlightSnapshot::new(
                "bad",
                vec![Sample::position(95.0, 0.0, 1.0), Sample::position(96.0, 0.0, 2.0)],
            ),
            eastbound("good"),
        ]);
        let report = fx.run();

        assert_eq!(report.failed, 1);
        assert_eq!(fx.reconciler.state_of("bad"), RenderState::Absent);
        assert_eq!(fx.reconciler.state_of("good"), RenderState::LineAndMarker);
        assert!(fx.scene.marker_for("bad").is_none());
    }

    #[test]
    fn test_remove_tracks_clears_immediately() {
        let mut fx = Fixture::new();
        fx.add("X", "survey");
        fx.run();

        fx.reconciler.remove_tracks(&mut fx.scene, ["X"]);
        assert_eq!(fx.scene.snapshot().markers.len(), 0);
        assert_eq!(fx.reconciler.visible_count(), 0);
    }

    #[test]
    fn test_teardown_removes_everything() {
        let mut fx = Fixture::new();
        fx.store.upsert_batch(fleet(5));
        fx.run();
        fx.reconciler.teardown(&mut fx.scene);
        assert_eq!(fx.scene.line_count() + fx.scene.marker_count(), 0);
    }

    #[test]
    fn test_visible_ids_follow_filter() {
        let mut fx = Fixture::new();
        fx.add("A", "survey");
        fx.add("B", "commercial");
        fx.filter.toggle_classification("commercial");
        fx.run();

        let expected: BTreeSet<FlightId> = fx
            .store
            .iter()
            .filter(|t| fx.filter.is_visible(t))
            .map(|t| t.id.clone())
            .collect();
        assert_eq!(fx.reconciler.visible_ids(), &expected);
    }
}
