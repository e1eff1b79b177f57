use chrono::Utc;
use forecast_pipeline::store::entity_file_key;
use forecast_pipeline::{ArtifactStore, FsArtifactStore, TrainedArtifact};
use series_math::RegressionMetrics;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn artifact(entity: &str, writer: usize) -> TrainedArtifact {
    // Large enough that a torn write would be visible
    let model = format!("{{\"writer\":{},\"pad\":\"{}\"}}", writer, "x".repeat(64 * 1024));
    TrainedArtifact {
        entity_id: entity.to_string(),
        model: model.into_bytes(),
        metrics: RegressionMetrics {
            mse: writer as f64,
            rmse: (writer as f64).sqrt(),
            mae: writer as f64,
            r2: 0.0,
        },
        trained_at: Utc::now(),
    }
}

#[test]
fn test_concurrent_writers_leave_one_complete_artifact() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsArtifactStore::open(dir.path()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|writer| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..5 {
                    store.put(&artifact("AAPL", writer)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = store.get("AAPL").unwrap();
    let body: serde_json::Value = serde_json::from_slice(&stored.model).unwrap();
    let writer = body["writer"].as_u64().unwrap() as usize;
    assert!(writer < 8);
    assert_eq!(body["pad"].as_str().unwrap().len(), 64 * 1024);

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 2);
}

#[test]
fn test_readers_never_see_partial_models() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsArtifactStore::open(dir.path()).unwrap());
    store.put(&artifact("PRIMA", 0)).unwrap();

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 1..20 {
                store.put(&artifact("PRIMA", i)).unwrap();
            }
        })
    };

    for _ in 0..50 {
        let stored = store.get("PRIMA").unwrap();
        let body: serde_json::Value = serde_json::from_slice(&stored.model).unwrap();
        assert!(body["writer"].is_u64());
    }
    writer.join().unwrap();
}

#[test]
fn test_entities_are_independent() {
    let dir = tempdir().unwrap();
    let store = FsArtifactStore::open(dir.path()).unwrap();

    store.put(&artifact("S&P500", 1)).unwrap();
    store.put(&artifact("INTEGRA", 2)).unwrap();

    assert_eq!(store.get("S&P500").unwrap().metrics.mse, 1.0);
    assert_eq!(store.get("INTEGRA").unwrap().metrics.mse, 2.0);
    assert!(store
        .model_path("S&P500")
        .ends_with(format!("model_{}.json", entity_file_key("S&P500"))));

    // Ids that differ only in punctuation keep separate artifacts
    assert!(!store.exists("S_P500"));
    store.put(&artifact("S_P500", 3)).unwrap();
    assert_eq!(store.get("S&P500").unwrap().metrics.mse, 1.0);
    assert_eq!(store.get("S_P500").unwrap().metrics.mse, 3.0);
    assert_ne!(store.model_path("S&P500"), store.model_path("S_P500"));
}

#[test]
fn test_reads_pair_model_and_metrics_of_one_put() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsArtifactStore::open(dir.path()).unwrap());
    store.put(&artifact("HABITAT", 0)).unwrap();

    let writers: Vec<_> = (1..5)
        .map(|offset| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10 {
                    store.put(&artifact("HABITAT", offset * 100 + i)).unwrap();
                }
            })
        })
        .collect();

    for _ in 0..100 {
        let stored = store.get("HABITAT").unwrap();
        let body: serde_json::Value = serde_json::from_slice(&stored.model).unwrap();
        let writer = body["writer"].as_u64().unwrap() as f64;
        assert_eq!(stored.metrics.mse, writer);
    }
    for handle in writers {
        handle.join().unwrap();
    }
}
