//! Rerun-backed visual layer.
//!
//! Logs every track line and marker as a 2D entity so the fleet can be
//! watched live in the Rerun viewer:
//! - `map/lines/<flight>` - polyline (`LineStrips2D`)
//! - `map/markers/<flight>` - marker (`Points2D`, heading as label)
//!
//! Enable with the `visualization` feature flag. The viewer has no click
//! callbacks, so activation hooks are kept but never fired.

use rerun::{RecordingStream, RecordingStreamBuilder};
use std::collections::HashMap;

use crate::visual::{
    check_coordinate, ActivationHook, Glyph, LineStyle, MarkerStyle, VisualError, VisualId,
    VisualLayer,
};

enum Logged {
    Line {
        path: String,
        vertices: Vec<(f64, f64)>,
        style: LineStyle,
    },
    Marker {
        path: String,
        position: (f64, f64),
        style: MarkerStyle,
    },
}

/// Visual layer that streams to a Rerun recording.
pub struct RerunLayer {
    rec: RecordingStream,
    logged: HashMap<VisualId, (Logged, ActivationHook)>,
    next_id: u64,
}

impl RerunLayer {
    /// Spawns a viewer and streams to it.
    pub fn spawn(app_id: &str) -> Result<Self, VisualError> {
        let rec = RecordingStreamBuilder::new(app_id).spawn().map_err(backend)?;
        Ok(Self::with_stream(rec))
    }

    /// Records to an `.rrd` file for later replay.
    pub fn to_file(app_id: &str, path: &str) -> Result<Self, VisualError> {
        let rec = RecordingStreamBuilder::new(app_id).save(path).map_err(backend)?;
        Ok(Self::with_stream(rec))
    }

    pub fn with_stream(rec: RecordingStream) -> Self {
        Self {
            rec,
            logged: HashMap::new(),
            next_id: 0,
        }
    }

    fn log(&self, logged: &Logged) -> Result<(), VisualError> {
        match logged {
            Logged::Line { path, vertices, style } => {
                let strip: Vec<[f32; 2]> =
                    vertices.iter().map(|&(lat, lon)| to_view(lat, lon)).collect();
                let mut lines = rerun::LineStrips2D::new([strip])
                    .with_colors([rgba(&style.color, style.opacity)])
                    .with_radii([style.weight as f32 * 0.005]);
                if let Some(dash) = &style.dash {
                    lines = lines.with_labels([format!("dash {}", dash)]);
                }
                self.rec.log(path.as_str(), &lines).map_err(backend)
            }
            Logged::Marker { path, position, style } => {
                let label = match style.glyph {
                    Glyph::Oriented { rotation_deg } => format!("{:.0}°", rotation_deg),
                    Glyph::Dot => String::new(),
                };
                self.rec
                    .log(
                        path.as_str(),
                        &rerun::Points2D::new([to_view(position.0, position.1)])
                            .with_colors([rgba(&style.color, style.opacity)])
                            .with_radii([0.03])
                            .with_labels([label]),
                    )
                    .map_err(backend)
            }
        }
    }

    fn insert(&mut self, logged: Logged, hook: ActivationHook) -> Result<VisualId, VisualError> {
        self.log(&logged)?;
        let id = VisualId(self.next_id);
        self.next_id += 1;
        self.logged.insert(id, (logged, hook));
        Ok(id)
    }

    fn entry_mut(&mut self, id: VisualId) -> Result<&mut Logged, VisualError> {
        self.logged
            .get_mut(&id)
            .map(|(logged, _)| logged)
            .ok_or(VisualError::UnknownPrimitive(id))
    }

    fn relog(&self, id: VisualId) -> Result<(), VisualError> {
        let (logged, _) = self.logged.get(&id).ok_or(VisualError::UnknownPrimitive(id))?;
        self.log(logged)
    }
}

impl VisualLayer for RerunLayer {
    fn create_line(
        &mut self,
        vertices: &[(f64, f64)],
        style: &LineStyle,
        hook: ActivationHook,
    ) -> Result<VisualId, VisualError> {
        for &(lat, lon) in vertices {
            check_coordinate(lat, lon)?;
        }
        let path = format!("map/lines/{}", hook.flight_id());
        self.insert(
            Logged::Line {
                path,
                vertices: vertices.to_vec(),
                style: style.clone(),
            },
            hook,
        )
    }

    fn update_line(
        &mut self,
        id: VisualId,
        new_vertices: &[(f64, f64)],
    ) -> Result<(), VisualError> {
        for &(lat, lon) in new_vertices {
            check_coordinate(lat, lon)?;
        }
        match self.entry_mut(id)? {
            Logged::Line { vertices, .. } => *vertices = new_vertices.to_vec(),
            Logged::Marker { .. } => return Err(VisualError::UnknownPrimitive(id)),
        }
        self.relog(id)
    }

    fn restyle_line(&mut self, id: VisualId, new_style: &LineStyle) -> Result<(), VisualError> {
        match self.entry_mut(id)? {
            Logged::Line { style, .. } => *style = new_style.clone(),
            Logged::Marker { .. } => return Err(VisualError::UnknownPrimitive(id)),
        }
        self.relog(id)
    }

    fn create_marker(
        &mut self,
        position: (f64, f64),
        style: &MarkerStyle,
        hook: ActivationHook,
    ) -> Result<VisualId, VisualError> {
        check_coordinate(position.0, position.1)?;
        let path = format!("map/markers/{}", hook.flight_id());
        self.insert(
            Logged::Marker {
                path,
                position,
                style: style.clone(),
            },
            hook,
        )
    }

    fn move_marker(&mut self, id: VisualId, new_position: (f64, f64)) -> Result<(), VisualError> {
        check_coordinate(new_position.0, new_position.1)?;
        match self.entry_mut(id)? {
            Logged::Marker { position, .. } => *position = new_position,
            Logged::Line { .. } => return Err(VisualError::UnknownPrimitive(id)),
        }
        self.relog(id)
    }

    fn restyle_marker(&mut self, id: VisualId, new_style: &MarkerStyle) -> Result<(), VisualError> {
        match self.entry_mut(id)? {
            Logged::Marker { style, .. } => *style = new_style.clone(),
            Logged::Line { .. } => return Err(VisualError::UnknownPrimitive(id)),
        }
        self.relog(id)
    }

    fn remove(&mut self, id: VisualId) -> Result<(), VisualError> {
        let (logged, _) = self.logged.remove(&id).ok_or(VisualError::UnknownPrimitive(id))?;
        let path = match &logged {
            Logged::Line { path, .. } | Logged::Marker { path, .. } => path.as_str(),
        };
        self.rec.log(path, &rerun::Clear::recursive()).map_err(backend)
    }
}

fn backend(err: impl std::fmt::Display) -> VisualError {
    VisualError::Backend(err.to_string())
}

/// Rerun's 2D space is y-down, so latitude is flipped.
fn to_view(lat: f64, lon: f64) -> [f32; 2] {
    [lon as f32, -lat as f32]
}

/// `#rrggbb` plus opacity to RGBA; unparsable colors fall back to grey.
fn rgba(hex: &str, opacity: f64) -> [u8; 4] {
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    let digits = hex.trim_start_matches('#');
    let channel = |i: usize| digits.get(i..i + 2).and_then(|s| u8::from_str_radix(s, 16).ok());
    match (digits.len(), channel(0), channel(2), channel(4)) {
        (6, Some(r), Some(g), Some(b)) => [r, g, b, alpha],
        _ => [128, 128, 128, alpha],
    }
}
