use geosidecar::core::{IndexParams, SpatialIndexAssigner};
use geosidecar::io::swath::{ProductProfile, ResolutionPlanEntry};
use geosidecar::{GranuleProcessor, MemorySwathReader, QuadtreeEncoder, ResolutionSet, SidecarConfig};
use ndarray::Array2;

/// Gently curved swath crossing the antimeridian
fn swath(rows: usize, cols: usize) -> (Array2<f64>, Array2<f64>) {
    let lat = Array2::from_shape_fn((rows, cols), |(i, j)| {
        -20.0 + 0.045 * i as f64 + 0.0004 * (j as f64 - cols as f64 / 2.0).powi(2)
    });
    let lon = Array2::from_shape_fn((rows, cols), |(i, j)| {
        let lon = 178.5 + 0.045 * j as f64 - 0.01 * i as f64;
        if lon > 180.0 {
            lon - 360.0
        } else {
            lon
        }
    });
    (lat, lon)
}

#[test]
fn test_assigner_identical_across_thread_counts() {
    let _ = env_logger::builder().is_test(true).try_init();
    let encoder = QuadtreeEncoder::new();
    let (lat, lon) = swath(48, 64);

    let mut results = Vec::new();
    for threads in [1, 2, 8] {
        let mut set = ResolutionSet::new("native", lat.clone(), lon.clone(), vec![]).unwrap();
        let params = IndexParams {
            worker_threads: Some(threads),
            ..Default::default()
        };
        let level = SpatialIndexAssigner::new(&encoder, params)
            .assign(&mut set)
            .expect("assignment failed");
        results.push((level, set.index_values().clone()));
    }

    for (level, values) in &results[1..] {
        assert_eq!(*level, results[0].0);
        assert_eq!(values, &results[0].1);
    }
}

#[test]
fn test_granule_identical_across_thread_counts() {
    let _ = env_logger::builder().is_test(true).try_init();
    let encoder = QuadtreeEncoder::new();
    let (lat, lon) = swath(24, 30);
    let mut profile = ProductProfile::generic();
    profile.plan.push(ResolutionPlanEntry::derived("x2", "native", 2, &[]));
    profile.plan.push(ResolutionPlanEntry::derived("x4", "native", 4, &[]));

    let mut datasets = Vec::new();
    for threads in [1, 2, 8] {
        let reader = MemorySwathReader::new("swath", profile.clone(), lat.clone(), lon.clone()).unwrap();
        let config = SidecarConfig {
            worker_threads: Some(threads),
            ..Default::default()
        };
        let outcome = GranuleProcessor::new(&encoder, config)
            .unwrap()
            .process(&reader)
            .expect("processing failed");
        assert!(outcome.is_complete(), "{} threads: {:?}", threads, outcome.resolution_failures);
        datasets.push(outcome.dataset);
    }

    let first = &datasets[0];
    for other in &datasets[1..] {
        assert_eq!(other.resolution_sets(), first.resolution_sets());
        assert_eq!(other.cover_sets(), first.cover_sets());
    }
}
