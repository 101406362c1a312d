//! Property tests over randomly generated fleets and polylines.

use proptest::prelude::*;
use skywatch_core::{
    Dashboard, RenderConfig, Resolution, SceneLayer, SimplificationPolicy, TrackStore,
};
use skywatch_env::{FlightSnapshot, Sample};

use crate::fleet::{Fleet, CLASSES};
use crate::runner::check_invariants;

fn polyline() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-80.0f64..80.0, -179.0f64..179.0), 2..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn map_and_list_agree_under_any_filter(
        seed in any::<u64>(),
        aircraft in 1usize..60,
        steps in 0usize..5,
        active in prop::collection::btree_set(0usize..CLASSES.len(), 0..4),
        selected in prop::option::of(0usize..60),
    ) {
        let mut fleet = Fleet::new(seed);
        fleet.spawn(aircraft);
        for _ in 0..steps {
            fleet.step(15.0);
        }

        let render = RenderConfig::default();
        let mut dashboard = Dashboard::new(SceneLayer::new(), render.clone(), Default::default());
        dashboard.apply_batch(fleet.snapshots());
        for idx in &active {
            dashboard.set_classification(CLASSES[*idx], true);
        }
        if let Some(idx) = selected {
            let id = fleet.aircraft().get(idx).map(|a| a.id.clone());
            dashboard.select_flight(id);
        }

        prop_assert_eq!(check_invariants(&dashboard, &render), Ok(()));
    }

    #[test]
    fn simplification_keeps_endpoints(coords in polyline(), tolerance in 0.0f64..2.0) {
        let policy = SimplificationPolicy::default();
        let out = policy.apply(&coords, Resolution::Reduced { tolerance });

        prop_assert!(out.len() >= 2);
        prop_assert!(out.len() <= coords.len());
        prop_assert_eq!(out.first(), coords.first());
        prop_assert_eq!(out.last(), coords.last());
    }

    #[test]
    fn larger_tolerance_never_adds_vertices(
        coords in polyline(),
        low in 0.0f64..1.0,
        extra in 0.0f64..1.0,
    ) {
        let policy = SimplificationPolicy::default();
        let fine = policy.apply(&coords, Resolution::Reduced { tolerance: low });
        let coarse = policy.apply(&coords, Resolution::Reduced { tolerance: low + extra });
        prop_assert!(coarse.len() <= fine.len());
    }

    #[test]
    fn stored_samples_are_sorted(timestamps in prop::collection::vec(0u32..10_000, 1..50)) {
        let points: Vec<Sample> = timestamps
            .iter()
            .map(|t| Sample::position(50.0, 8.0, f64::from(*t)))
            .collect();
        let mut store = TrackStore::new();
        store.upsert_batch(vec![FlightSnapshot::new("4b1234", points)]);

        let track = store.get("4b1234").unwrap();
        prop_assert_eq!(track.samples().len(), timestamps.len());
        prop_assert!(track.samples().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
