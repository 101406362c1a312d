//! JSON exporter for scenario runs.
//!
//! Exports per-tick dashboard frames (counts, fleet stats and, for small
//! fleets, the full drawn scene) so a run can be replayed or plotted.

use serde::Serialize;
use skywatch_core::{FleetStats, ReconcileReport, SceneSnapshot};
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize)]
pub struct SimFrame {
    /// Tick number
    pub tick: u64,

    /// Simulation time in seconds
    pub time_sec: f64,

    /// Outcome of the last reconcile pass
    pub render: ReconcileReport,

    /// List entries after the operator's query
    pub shown: usize,

    pub stats: FleetStats,

    /// Selected flight, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,

    /// Drawn scene; omitted for large fleets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<SceneSnapshot>,

    /// Operator log lines received this tick
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
