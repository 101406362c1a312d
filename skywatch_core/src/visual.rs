//! Map-visual abstraction.
//!
//! The reconciler never talks to a drawing library directly. It drives a
//! [`VisualLayer`], which owns the primitives (polylines and markers) and
//! hands back opaque [`VisualId`]s.
//!
//! # Activation
//!
//! Every primitive receives one [`ActivationHook`] at creation. Firing the
//! hook (a click on the line or marker) queues the owning flight id on a
//! crossbeam channel that the dashboard drains into its selection.

use crossbeam::channel::Sender;
use serde::Serialize;
use skywatch_env::FlightId;
use std::collections::BTreeMap;
use thiserror::Error;

/// Handle for a primitive owned by a [`VisualLayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VisualId(pub u64);

/// Polyline styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineStyle {
    pub color: String,
    pub opacity: f64,
    pub weight: u32,

    /// Dash pattern such as `"10, 5"`; solid when `None`
    pub dash: Option<String>,
}

/// Marker icon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Glyph {
    /// Aircraft icon rotated by `rotation_deg`
    Oriented { rotation_deg: f64 },

    /// Unrotated dot
    Dot,
}

/// Marker styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerStyle {
    pub glyph: Glyph,
    pub color: String,
    pub opacity: f64,
}

/// Errors raised by a [`VisualLayer`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VisualError {
    #[error("Invalid coordinates ({lat}, {lon})")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Unknown primitive {0:?}")]
    UnknownPrimitive(VisualId),

    #[error("Visual backend error: {0}")]
    Backend(String),
}

/// Secondary-activation signal attached to a primitive.
#[derive(Debug, Clone)]
pub struct ActivationHook {
    flight_id: FlightId,
    tx: Sender<FlightId>,
}

impl ActivationHook {
    pub fn new(flight_id: impl Into<FlightId>, tx: Sender<FlightId>) -> Self {
        Self {
            flight_id: flight_id.into(),
            tx,
        }
    }

    pub fn flight_id(&self) -> &str {
        &self.flight_id
    }

    /// Queues the flight for selection. Returns false if the dashboard is gone.
    pub fn fire(&self) -> bool {
        self.tx.send(self.flight_id.clone()).is_ok()
    }
}

/// Drawing-library seam.
///
/// Coordinates are `(lat, lon)` pairs in degrees.
///
/// # Implementations
///
/// - **Tests/Simulation**: [`SceneLayer`]
/// - **Viewer**: `RerunLayer` (`visualization` feature)
pub trait VisualLayer: Send + 'static {
    fn create_line(
        &mut self,
        vertices: &[(f64, f64)],
        style: &LineStyle,
        hook: ActivationHook,
    ) -> Result<VisualId, VisualError>;

    fn update_line(&mut self, id: VisualId, vertices: &[(f64, f64)]) -> Result<(), VisualError>;

    fn restyle_line(&mut self, id: VisualId, style: &LineStyle) -> Result<(), VisualError>;

    fn create_marker(
        &mut self,
        position: (f64, f64),
        style: &MarkerStyle,
        hook: ActivationHook,
    ) -> Result<VisualId, VisualError>;

    fn move_marker(&mut self, id: VisualId, position: (f64, f64)) -> Result<(), VisualError>;

    fn restyle_marker(&mut self, id: VisualId, style: &MarkerStyle) -> Result<(), VisualError>;

    /// Removes a line or marker.
    fn remove(&mut self, id: VisualId) -> Result<(), VisualError>;
}

/// Rejects non-numeric or out-of-range coordinates.
pub fn check_coordinate(lat: f64, lon: f64) -> Result<(), VisualError> {
    if lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
    {
        Ok(())
    } else {
        Err(VisualError::InvalidCoordinates { lat, lon })
    }
}

// ============================================================================
// IN-MEMORY SCENE
// ============================================================================

#[derive(Debug, Clone)]
enum Primitive {
    Line {
        vertices: Vec<(f64, f64)>,
        style: LineStyle,
        hook: ActivationHook,
    },
    Marker {
        position: (f64, f64),
        style: MarkerStyle,
        hook: ActivationHook,
    },
}

impl Primitive {
    fn hook(&self) -> &ActivationHook {
        match self {
            Primitive::Line { hook, .. } | Primitive::Marker { hook, .. } => hook,
        }
    }
}

/// Serializable view of one line in a [`SceneSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineView {
    pub flight_id: FlightId,
    pub vertices: Vec<(f64, f64)>,
    pub style: LineStyle,
}

/// Serializable view of one marker in a [`SceneSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    pub flight_id: FlightId,
    pub position: (f64, f64),
    pub style: MarkerStyle,
}

/// Everything currently drawn, ordered by flight id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SceneSnapshot {
    pub lines: Vec<LineView>,
    pub markers: Vec<MarkerView>,
}

/// Retained in-memory scene that counts every mutation it receives.
#[derive(Debug, Default)]
pub struct SceneLayer {
    primitives: BTreeMap<VisualId, Primitive>,
    next_id: u64,
    mutations: u64,
}

impl SceneLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total layer calls that changed the scene since creation or the last reset.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub fn reset_mutations(&mut self) {
        self.mutations = 0;
    }

    pub fn line_count(&self) -> usize {
        self.primitives
            .values()
            .filter(|p| matches!(p, Primitive::Line { .. }))
            .count()
    }

    pub fn marker_count(&self) -> usize {
        self.primitives.len() - self.line_count()
    }

    /// Line drawn for `flight_id`, if any.
    pub fn line_for(&self, flight_id: &str) -> Option<LineView> {
        self.snapshot().lines.into_iter().find(|l| l.flight_id == flight_id)
    }

    /// Marker drawn for `flight_id`, if any.
    pub fn marker_for(&self, flight_id: &str) -> Option<MarkerView> {
        self.snapshot().markers.into_iter().find(|m| m.flight_id == flight_id)
    }

    /// Simulates a click on a primitive. Returns false for unknown ids.
    pub fn activate(&self, id: VisualId) -> bool {
        self.primitives.get(&id).map(|p| p.hook().fire()).unwrap_or(false)
    }

    /// Simulates a click on whatever is drawn for `flight_id`.
    pub fn activate_flight(&self, flight_id: &str) -> bool {
        self.primitives
            .values()
            .find(|p| p.hook().flight_id() == flight_id)
            .map(|p| p.hook().fire())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        let mut scene = SceneSnapshot::default();
        for primitive in self.primitives.values() {
            match primitive {
                Primitive::Line { vertices, style, hook } => scene.lines.push(LineView {
                    flight_id: hook.flight_id().to_string(),
                    vertices: vertices.clone(),
                    style: style.clone(),
                }),
                Primitive::Marker { position, style, hook } => scene.markers.push(MarkerView {
                    flight_id: hook.flight_id().to_string(),
                    position: *position,
                    style: style.clone(),
                }),
            }
        }
        scene.lines.sort_by(|a, b| a.flight_id.cmp(&b.flight_id));
        scene.markers.sort_by(|a, b| a.flight_id.cmp(&b.flight_id));
        scene
    }

    fn insert(&mut self, primitive: Primitive) -> VisualId {
        let id = VisualId(self.next_id);
        self.next_id += 1;
        self.primitives.insert(id, primitive);
        self.mutations += 1;
        id
    }

    fn primitive_mut(&mut self, id: VisualId) -> Result<&mut Primitive, VisualError> {
        self.primitives.get_mut(&id).ok_or(VisualError::UnknownPrimitive(id))
    }
}

impl VisualLayer for SceneLayer {
    fn create_line(
        &mut self,
        vertices: &[(f64, f64)],
        style: &LineStyle,
        hook: ActivationHook,
    ) -> Result<VisualId, VisualError> {
        for &(lat, lon) in vertices {
            check_coordinate(lat, lon)?;
        }
        Ok(self.insert(Primitive::Line {
            vertices: vertices.to_vec(),
            style: style.clone(),
            hook,
        }))
    }

    fn update_line(
        &mut self,
        id: VisualId,
        new_vertices: &[(f64, f64)],
    ) -> Result<(), VisualError> {
        for &(lat, lon) in new_vertices {
            check_coordinate(lat, lon)?;
        }
        match self.primitive_mut(id)? {
            Primitive::Line { vertices, .. } => *vertices = new_vertices.to_vec(),
            Primitive::Marker { .. } => return Err(VisualError::UnknownPrimitive(id)),
        }
        self.mutations += 1;
        Ok(())
    }

    fn restyle_line(&mut self, id: VisualId, new_style: &LineStyle) -> Result<(), VisualError> {
        match self.primitive_mut(id)? {
            Primitive::Line { style, .. } => *style = new_style.clone(),
            Primitive::Marker { .. } => return Err(VisualError::UnknownPrimitive(id)),
        }
        self.mutations += 1;
        Ok(())
    }

    fn create_marker(
        &mut self,
        position: (f64, f64),
        style: &MarkerStyle,
        hook: ActivationHook,
    ) -> Result<VisualId, VisualError> {
        check_coordinate(position.0, position.1)?;
        Ok(self.insert(Primitive::Marker {
            position,
            style: style.clone(),
            hook,
        }))
    }

    fn move_marker(&mut self, id: VisualId, new_position: (f64, f64)) -> Result<(), VisualError> {
        check_coordinate(new_position.0, new_position.1)?;
        match self.primitive_mut(id)? {
            Primitive::Marker { position, .. } => *position = new_position,
            Primitive::Line { .. } => return Err(VisualError::UnknownPrimitive(id)),
        }
        self.mutations += 1;
        Ok(())
    }

    fn restyle_marker(&mut self, id: VisualId, new_style: &MarkerStyle) -> Result<(), VisualError> {
        match self.primitive_mut(id)? {
            Primitive::Marker { style, .. } => *style = new_style.clone(),
            Primitive::Line { .. } => return Err(VisualError::UnknownPrimitive(id)),
        }
        self.mutations += 1;
        Ok(())
    }

    fn remove(&mut self, id: VisualId) -> Result<(), VisualError> {
        self.primitives
            .remove(&id)
            .ok_or(VisualError::UnknownPrimitive(id))?;
        self.mutations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    fn line_style() -> LineStyle {
        LineStyle {
            color: "#ff0000".to_string(),
            opacity: 0.6,
            weight: 4,
            dash: None,
        }
    }

    #[test]
    fn test_rejects_out_of_range_coordinates() {
        let (tx, _rx) = unbounded();
        let mut scene = SceneLayer::new();
        let result = scene.create_line(
            &[(0.0, 0.0), (91.0, 0.0)],
            &line_style(),
            ActivationHook::new("X", tx),
        );
        assert!(matches!(result, Err(VisualError::InvalidCoordinates { .. })));
        assert_eq!(scene.mutation_count(), 0);
    }

    #[test]
    fn test_activation_queues_flight_id() {
        let (tx, rx) = unbounded();
        let mut scene = SceneLayer::new();
        let id = scene
            .create_marker(
                (1.0, 2.0),
                &MarkerStyle {
                    glyph: Glyph::Dot,
                    color: "#808080".to_string(),
                    opacity: 0.6,
                },
                ActivationHook::new("X", tx),
            )
            .unwrap();

        assert!(scene.activate(id));
        assert!(!scene.activate(VisualId(999)));
        assert_eq!(rx.try_recv().unwrap(), "X");
    }

    #[test]
    fn test_mutations_counted() {
        let (tx, _rx) = unbounded();
        let mut scene = SceneLayer::new();
        let id = scene
            .create_line(&[(0.0, 0.0), (1.0, 1.0)], &line_style(), ActivationHook::new("X", tx))
            .unwrap();
        scene.update_line(id, &[(0.0, 0.0), (2.0, 2.0)]).unwrap();
        scene.remove(id).unwrap();

        assert_eq!(scene.mutation_count(), 3);
        assert_eq!(scene.line_count(), 0);
        assert_eq!(scene.remove(id), Err(VisualError::UnknownPrimitive(id)));
    }

    #[test]
    fn test_snapshot_sorted_by_flight() {
        let (tx, _rx) = unbounded();
        let mut scene = SceneLayer::new();
        for id in ["b", "a"] {
            scene
                .create_line(
                    &[(0.0, 0.0), (1.0, 1.0)],
                    &line_style(),
                    ActivationHook::new(id, tx.clone()),
                )
                .unwrap();
        }
        let names: Vec<String> = scene.snapshot().lines.into_iter().map(|l| l.flight_id).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(scene.line_for("a").is_some());
    }
}
