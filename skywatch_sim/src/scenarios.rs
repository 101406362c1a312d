//! Fleet scenarios exercising the render-decision engine.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SW-001: Small fleet, every track full resolution
    Sparse,

    /// SW-002: Above the dense threshold, polylines simplified
    Dense,

    /// SW-003: Above the line ceiling, non-selected tracks marker-only
    Crowded,

    /// SW-004: Above the heading ceiling, unrotated dots
    Swarm,

    /// SW-005: Batch and cleanup for the same flight in one tick
    CleanupRace,

    /// SW-006: Out-of-order samples and radar dropouts
    Reorder,

    /// SW-007: Operator selects, filters and deselects in a busy fleet
    Selection,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Sparse,
            ScenarioId::Dense,
            ScenarioId::Crowded,
            ScenarioId::Swarm,
            ScenarioId::CleanupRace,
            ScenarioId::Reorder,
            ScenarioId::Selection,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Sparse => "sparse",
            ScenarioId::Dense => "dense",
            ScenarioId::Crowded => "crowded",
            ScenarioId::Swarm => "swarm",
            ScenarioId::CleanupRace => "cleanup_race",
            ScenarioId::Reorder => "reorder",
            ScenarioId::Selection => "selection",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Sparse => "50 aircraft: full-resolution lines and oriented glyphs",
            ScenarioId::Dense => "300 aircraft: simplified lines, tolerance grows with fleet size",
            ScenarioId::Crowded => "600 aircraft: markers only except the selected track",
            ScenarioId::Swarm => "1200 aircraft: heading computation skipped, plain dots",
            ScenarioId::CleanupRace => {
                "Flights updated then cleaned up in the same tick must vanish"
            }
            ScenarioId::Reorder => "Shuffled point lists and dropouts: stored samples stay sorted",
            ScenarioId::Selection => "Selection survives filtering and keeps full resolution",
        }
    }

    /// Fleet size used when none is given on the command line.
    pub fn default_aircraft(&self) -> usize {
        match self {
            ScenarioId::Sparse => 50,
            ScenarioId::Dense => 300,
            ScenarioId::Crowded => 600,
            ScenarioId::Swarm => 1200,
            ScenarioId::CleanupRace => 80,
            ScenarioId::Reorder => 40,
            ScenarioId::Selection => 300,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioId::all()
            .into_iter()
            .find(|id| id.name() == s.to_lowercase().replace('-', "_"))
            .ok_or_else(|| format!("Unknown scenario: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
        }
        assert_eq!("cleanup-race".parse::<ScenarioId>(), Ok(ScenarioId::CleanupRace));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_fleet_sizes_cross_thresholds() {
        assert!(ScenarioId::Sparse.default_aircraft() < 200);
        assert!(ScenarioId::Crowded.default_aircraft() > 500);
        assert!(ScenarioId::Swarm.default_aircraft() > 1000);
    }
}
