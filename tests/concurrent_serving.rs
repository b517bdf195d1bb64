//! Predictions keep flowing, unchanged, while the artifact set is reloaded
//! underneath them.

use seizure_risk_engine::artifacts::{ArtifactNames, RegistryOptions};
use seizure_risk_engine::{
    ArtifactRegistry, InferenceEngine, InferenceRequest, RegistryState, RiskPredictor,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const WORKERS: usize = 8;
const PREDICTIONS_PER_WORKER: usize = 200;

// stress_level >= 6 -> +1.5; otherwise eeg_mean_amp < 0.5 -> -1.5 else +0.2
const MODEL: &str = r#"{"learner": {
    "gradient_booster": {"model": {"trees": [{
        "left_children":    [1, 3, -1, -1, -1],
        "right_children":   [2, 4, -1, -1, -1],
        "split_indices":    [1, 3, 0, 0, 0],
        "split_conditions": [6.0, 0.5, 1.5, -1.5, 0.2],
        "default_left":     [0, 0, 0, 0, 0]
    }]}},
    "learner_model_param": {"base_score": "5E-1", "num_feature": "4"},
    "objective": {"name": "binary:logistic"}
}}"#;

const SIGNATURE: &str =
    r#"{"feature_order": ["hours_of_sleep", "stress_level", "medication_taken", "eeg_mean_amp"]}"#;

const BASELINE: &str = "eeg_source_id,eeg_mean_amp\nchb01_baseline,0.31\nchb02_baseline,0.72\n";

fn registry(dir: &Path) -> Arc<ArtifactRegistry> {
    std::fs::write(dir.join("model.json"), MODEL).unwrap();
    std::fs::write(dir.join("model_signature.json"), SIGNATURE).unwrap();
    std::fs::write(dir.join("master_eeg_features.csv"), BASELINE).unwrap();

    let names = ArtifactNames {
        model: "model.json".to_string(),
        ..ArtifactNames::default()
    };
    Arc::new(ArtifactRegistry::new(RegistryOptions::new(dir).with_names(names)))
}

#[test]
fn test_predictions_are_stable_across_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(dir.path());
    assert_eq!(registry.load(), RegistryState::Ready);

    let predictor = RiskPredictor::new(registry.clone(), InferenceEngine::default(), "chb01");
    let request = InferenceRequest::new(7.5, 3, 1).with_profile("chb02");
    let expected = predictor.predict(&request).unwrap();

    let stop = AtomicBool::new(false);
    let reloads = AtomicUsize::new(0);

    thread::scope(|s| {
        s.spawn(|| loop {
            assert_eq!(registry.reload(), RegistryState::Ready);
            reloads.fetch_add(1, Ordering::Relaxed);
            if stop.load(Ordering::Acquire) {
                break;
            }
        });

        s.spawn(|| {
            while !stop.load(Ordering::Acquire) {
                let state = registry.state();
                assert_eq!(state, RegistryState::Ready, "registry left Ready during reload");
                assert!(registry.is_ready());
            }
        });

        let (predictor, request, expected) = (&predictor, &request, &expected);
        let workers: Vec<_> = (0..WORKERS)
            .map(|_| {
                s.spawn(move || {
                    for _ in 0..PREDICTIONS_PER_WORKER {
                        let response = predictor.predict(request).unwrap();
                        assert_eq!(response.probability.to_bits(), expected.probability.to_bits());
                        assert_eq!(response.risk_percentage, expected.risk_percentage);
                        assert_eq!(response.risk_tier, expected.risk_tier);
                        assert_eq!(response.baseline_used, expected.baseline_used);
                    }
                })
            })
            .collect();

        let results: Vec<_> = workers.into_iter().map(|w| w.join()).collect();
        stop.store(true, Ordering::Release);
        for result in results {
            result.unwrap();
        }
    });

    assert!(reloads.load(Ordering::Relaxed) > 0);
    assert_eq!(expected.baseline_used, "chb02_baseline");
}

#[test]
fn test_concurrent_first_loads_share_one_artifact_set() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(dir.path());

    let registry = &registry;
    let snapshots: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                s.spawn(move || {
                    assert_eq!(registry.load(), RegistryState::Ready);
                    registry.snapshot().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for snapshot in &snapshots[1..] {
        assert!(Arc::ptr_eq(&snapshots[0], snapshot));
    }
}
