//! Synthetic fleet: the ground truth the simulated server reports.
//!
//! Every aircraft flies a slowly wandering great-circle-ish path inside a
//! region. Each step appends one position report to its history; the
//! server-side snapshot is the recent history plus averaged stats.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::Serialize;
use skywatch_env::{FlightId, FlightSnapshot, Sample};

/// Classifications handed out to synthetic aircraft.
pub const CLASSES: [&str; 7] = [
    "commercial",
    "survey",
    "agriculture",
    "cloud seeding",
    "crop dusting",
    "rescue",
    "unknown",
];

/// Region the fleet is spawned in, `(lat, lon)` corners.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Region {
    pub south_west: (f64, f64),
    pub north_east: (f64, f64),
}

impl Default for Region {
    fn default() -> Self {
        // Roughly central Europe
        Self {
            south_west: (45.0, 0.0),
            north_east: (55.0, 15.0),
        }
    }
}

/// One simulated aircraft.
#[derive(Debug, Clone, Serialize)]
pub struct SimAircraft {
    pub id: FlightId,
    pub classification: String,

    /// Current heading in degrees
    pub heading: f64,

    /// Ground speed in m/s
    pub speed: f64,

    /// Altitude in meters
    pub altitude: f64,

    /// True `(lat, lon)`, known even when the last report dropped out
    pub position: (f64, f64),

    /// Position history, oldest first
    pub history: Vec<Sample>,
}

/// Ground-truth fleet driven by a seeded RNG.
pub struct Fleet {
    rng: ChaCha8Rng,
    aircraft: Vec<SimAircraft>,
    next_id: u64,
    time: f64,
    region: Region,

    /// Reports kept per aircraft
    history_len: usize,

    /// Probability that a report has no position (radar dropout)
    dropout: f64,
}

/// Meters per degree of latitude.
const METERS_PER_DEG: f64 = 111_320.0;

/// Standard deviation of the per-step heading change, degrees.
const TURN_STD_DEG: f64 = 5.0;

impl Fleet {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            aircraft: Vec::new(),
            next_id: 0,
            time: 0.0,
            region: Region::default(),
            history_len: 30,
            dropout: 0.0,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn with_dropout(mut self, probability: f64) -> Self {
        self.dropout = probability.clamp(0.0, 1.0);
        self
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    pub fn aircraft(&self) -> &[SimAircraft] {
        &self.aircraft
    }

    /// Spawns `count` aircraft with one initial report each. Returns their ids.
    pub fn spawn(&mut self, count: usize) -> Vec<FlightId> {
        let (sw, ne) = (self.region.south_west, self.region.north_east);
        let mut ids = Vec::with_capacity(count);

        for _ in 0..count {
            let id = format!("{:06x}", 0x4b0000 + self.next_id);
            self.next_id += 1;

            let lat = self.rng.gen_range(sw.0..ne.0);
            let lon = self.rng.gen_range(sw.1..ne.1);
            let classification = CLASSES[self.rng.gen_range(0..CLASSES.len())].to_string();
            let altitude = self.rng.gen_range(300.0..11_000.0);
            let speed = self.rng.gen_range(60.0..250.0);

            self.aircraft.push(SimAircraft {
                id: id.clone(),
                classification,
                heading: self.rng.gen_range(0.0..360.0),
                speed,
                altitude,
                position: (lat, lon),
                history: vec![Sample::new(lat, lon, self.time, altitude, speed)],
            });
            ids.push(id);
        }
        ids
    }

    /// Advances every aircraft by `dt` seconds and records a report.
    pub fn step(&mut self, dt: f64) {
        self.time += dt;
        for aircraft in &mut self.aircraft {
            let turn: f64 = self.rng.sample(StandardNormal);
            aircraft.heading = (aircraft.heading + turn * TURN_STD_DEG).rem_euclid(360.0);
            let (lat, lon) = aircraft.position;
            let dist_deg = aircraft.speed * dt / METERS_PER_DEG;
            let rad = aircraft.heading.to_radians();
            let lat2 = (lat + dist_deg * rad.cos()).clamp(-89.0, 89.0);
            let lon2 = lon + dist_deg * rad.sin() / lat.to_radians().cos().max(0.1);
            aircraft.position = (lat2, lon2);

            let sample = if self.rng.gen_bool(self.dropout) {
                Sample::new(f64::NAN, f64::NAN, self.time, -1.0, -1.0)
            } else {
                Sample::new(lat2, lon2, self.time, aircraft.altitude, aircraft.speed)
            };
            aircraft.history.push(sample);
            if aircraft.history.len() > self.history_len {
                aircraft.history.remove(0);
            }
        }
    }

    /// Removes `count` random aircraft and returns their final snapshots.
    pub fn retire(&mut self, count: usize) -> Vec<FlightSnapshot> {
        let mut retired = Vec::new();
        for _ in 0..count.min(self.aircraft.len()) {
            let idx = self.rng.gen_range(0..self.aircraft.len());
            let aircraft = self.aircraft.swap_remove(idx);
            retired.push(snapshot_of(&aircraft));
        }
        retired
    }

    /// Server-side view of every aircraft, ordered as spawned.
    pub fn snapshots(&self) -> Vec<FlightSnapshot> {
        self.aircraft.iter().map(snapshot_of).collect()
    }

    /// Like [`Self::snapshots`] but with each point list shuffled.
    pub fn shuffled_snapshots(&mut self) -> Vec<FlightSnapshot> {
        let mut snapshots = self.snapshots();
        for snapshot in &mut snapshots {
            snapshot.points.shuffle(&mut self.rng);
        }
        snapshots
    }

    /// Picks a random aircraft id.
    pub fn pick(&mut self) -> Option<FlightId> {
        self.aircraft.choose(&mut self.rng).map(|a| a.id.clone())
    }
}

fn snapshot_of(aircraft: &SimAircraft) -> FlightSnapshot {
    let valid: Vec<&Sample> = aircraft.history.iter().filter(|s| s.is_valid()).collect();
    let mean = |f: fn(&Sample) -> f64| {
        if valid.is_empty() {
            -1.0
        } else {
            valid.iter().map(|s| f(s)).sum::<f64>() / valid.len() as f64
        }
    };
    let duration = match (aircraft.history.first(), aircraft.history.last()) {
        (Some(first), Some(last)) => last.timestamp - first.timestamp,
        _ => 0.0,
    };

    FlightSnapshot::new(aircraft.id.clone(), aircraft.history.clone())
        .with_classification(aircraft.classification.clone())
        .with_source("sim")
        .with_stats(mean(|s| s.altitude), mean(|s| s.velocity), duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_same_seed_same_fleet() {
        let mut a = Fleet::new(7);
        let mut b = Fleet::new(7);
        a.spawn(10);
        b.spawn(10);
        a.step(10.0);
        b.step(10.0);
        assert_eq!(a.snapshots(), b.snapshots());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut fleet = Fleet::new(1);
        fleet.spawn(2);
        for _ in 0..100 {
            fleet.step(5.0);
        }
        assert!(fleet.aircraft().iter().all(|a| a.history.len() == 30));
    }

    #[test]
    fn test_snapshot_stats_average_history() {
        let mut fleet = Fleet::new(11);
        fleet.spawn(1);
        fleet.step(10.0);
        fleet.step(10.0);

        let aircraft = &fleet.aircraft()[0];
        let snapshot = &fleet.snapshots()[0];
        assert_relative_eq!(fleet.time(), 20.0);
        assert_relative_eq!(snapshot.duration, 20.0);
        assert_relative_eq!(snapshot.avg_altitude, aircraft.altitude, epsilon = 1e-9);
        assert_relative_eq!(snapshot.avg_velocity, aircraft.speed, epsilon = 1e-9);
    }

    #[test]
    fn test_retire_removes_aircraft() {
        let mut fleet = Fleet::new(3);
        fleet.spawn(5);
        let retired = fleet.retire(2);
        assert_eq!(retired.len(), 2);
        assert_eq!(fleet.len(), 3);
        for snapshot in retired {
            let id = snapshot.flight_id.unwrap();
            assert!(fleet.aircraft().iter().all(|a| a.id != id));
        }
    }

    #[test]
    fn test_full_dropout_yields_invalid_points() {
        let mut fleet = Fleet::new(4).with_dropout(1.0);
        fleet.spawn(1);
        fleet.step(1.0);
        let snapshot = &fleet.snapshots()[0];
        assert!(!snapshot.points[1].is_valid());
        assert!(snapshot.points[0].is_valid());
    }
}
