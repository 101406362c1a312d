//! SkyWatch scenario harness
//!
//! A seeded synthetic fleet plays the part of the flight server. Each
//! scenario pushes batches and cleanups through the real update channel
//! into a `DashboardRuntime` and checks, every tick, that:
//! - map and list agree on which tracks are visible
//! - stored samples stay sorted and non-empty
//! - lines, glyphs and opacities follow the level-of-detail thresholds
//! - replaying an identical batch leaves the scene untouched
//!
//! # Usage
//!
//! ```ignore
//! use skywatch_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_ticks(20).run(ScenarioId::Dense);
//! assert!(result.passed);
//! ```

pub mod exporter;
pub mod fleet;
pub mod runner;
pub mod scenarios;

#[cfg(test)]
mod properties;

pub use exporter::{SimExport, SimFrame};
pub use fleet::{Fleet, Region, SimAircraft};
pub use runner::{check_invariants, ScenarioMetrics, ScenarioResult, ScenarioRunner};
