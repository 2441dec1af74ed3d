//! Property tests for the quantified invariants: quantile ordering,
//! adjustment nonnegativity, bias clamping, and bound monotonicity.

use std::collections::{BTreeMap, HashMap};

use locus_analyzer::calibration::adjust_rtt_ms;
use locus_analyzer::estimator::{sse_for_candidate, Observation};
use locus_analyzer::geo::max_distance_km;
use locus_analyzer::stats::compute_stats_from_samples;
use locus_types::{CalibrationEntry, CalibrationFile};
use proptest::prelude::*;

fn calibration(bias_ms: f64, scale: f64) -> CalibrationFile {
    let mut endpoints = BTreeMap::new();
    endpoints.insert(
        "ep".to_string(),
        CalibrationEntry {
            bias_ms,
            scale,
            sample_count: 1,
            rmse_ms: None,
        },
    );
    CalibrationFile {
        endpoints,
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn quantiles_are_ordered_and_jitter_nonnegative(
        values in prop::collection::vec(0.0f64..1000.0, 1..200),
    ) {
        let mut samples = HashMap::new();
        samples.insert(
            "ep".to_string(),
            values.iter().enumerate().map(|(i, &v)| (i as i64, v)).collect::<Vec<_>>(),
        );
        let stats = compute_stats_from_samples(&samples);
        let st = &stats["ep"];
        prop_assert!(st.min <= st.p05 + 1e-12);
        prop_assert!(st.p05 <= st.p50 + 1e-12);
        prop_assert!(st.p50 <= st.p95 + 1e-12);
        prop_assert!(st.jitter >= 0.0);
        prop_assert_eq!(st.count, values.len());
    }

    #[test]
    fn adjustment_never_goes_negative(
        rtt in -100.0f64..1000.0,
        bias in 0.0f64..200.0,
        scale in -1.0f64..5.0,
    ) {
        let cal = calibration(bias, scale);
        prop_assert!(adjust_rtt_ms(rtt, "ep", Some(&cal)) >= 0.0);
        // Probe-path suffixed lookup goes through the same entry.
        prop_assert!(adjust_rtt_ms(rtt, "ep@vpn", Some(&cal)) >= 0.0);
    }

    #[test]
    fn identity_calibration_passes_raw_values_through(rtt in 0.0f64..1000.0) {
        let cal = calibration(0.0, 1.0);
        prop_assert_eq!(adjust_rtt_ms(rtt, "ep", Some(&cal)), rtt);
    }

    #[test]
    fn candidate_bias_is_always_nonnegative(
        lats in prop::collection::vec(-60.0f64..60.0, 3..6),
        cand_lat in -80.0f64..80.0,
        cand_lon in -170.0f64..170.0,
        rtt in 1.0f64..200.0,
    ) {
        let obs: Vec<Observation> = lats
            .iter()
            .enumerate()
            .map(|(i, &lat)| Observation {
                lat,
                lon: (i as f64) * 40.0 - 60.0,
                rtt_ms: rtt,
                jitter_ms: 1.0 + i as f64,
            })
            .collect();
        let (sse, bias) = sse_for_candidate(cand_lat, cand_lon, &obs, 200_000.0);
        prop_assert!(bias >= 0.0);
        prop_assert!(sse >= 0.0);
    }

    #[test]
    fn loose_bound_dominates_tight_bound(
        p05 in 0.1f64..500.0,
        extra in 0.0f64..500.0,
        dist in 0.0f64..20_000.0,
    ) {
        // p50 >= p05, so the loose circle contains the tight circle: a
        // claim outside the loose bound is always outside the tight one.
        let p50 = p05 + extra;
        let tight = max_distance_km(p05, 200_000.0).unwrap();
        let loose = max_distance_km(p50, 200_000.0).unwrap();
        prop_assert!(loose >= tight);
        if dist > loose {
            prop_assert!(dist > tight);
        }
    }
}
