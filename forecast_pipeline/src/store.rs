//! Persistence of trained artifacts, one per entity
//!
//! Layout under the model directory, with `{key}` derived from the entity id
//! by [`entity_file_key`]:
//!
//! - `model_{key}.json`: serialized model
//! - `metrics_{key}.json`: `{"mse": .., "rmse": .., "mae": .., "r2": ..}`
//!
//! Both files of a `put` are fully written to temporary siblings before either
//! is renamed into place. Reads and writes of one entity hold the same lock, so
//! a `get` never pairs the model of one `put` with the metrics of another.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use series_math::RegressionMetrics;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// A trained model and its in-sample metrics
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedArtifact {
    pub entity_id: String,
    /// Serialized model, opaque to the store
    pub model: Vec<u8>,
    pub metrics: RegressionMetrics,
    pub trained_at: DateTime<Utc>,
}

/// Keyed artifact repository; a `put` replaces any previous artifact
pub trait ArtifactStore {
    fn get(&self, entity_id: &str) -> Result<TrainedArtifact>;

    fn put(&self, artifact: &TrainedArtifact) -> Result<()>;

    fn exists(&self, entity_id: &str) -> bool;

    /// Returns whether an artifact was removed
    fn delete(&self, entity_id: &str) -> Result<bool>;
}

/// File name stem for an entity.
///
/// Bytes outside `[A-Za-z0-9_-]` are percent-encoded (`&` becomes `%26`,
/// `.` becomes `%2E`), so distinct ids never share a stem and no stem can
/// name a parent directory.
pub fn entity_file_key(entity_id: &str) -> String {
    let mut key = String::with_capacity(entity_id.len());
    for byte in entity_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-') {
            key.push(char::from(byte));
        } else {
            key.push_str(&format!("%{:02X}", byte));
        }
    }
    key
}

/// Artifact store backed by a directory.
///
/// Reads and writes for the same entity are serialized; each file is written
/// to a temporary sibling and renamed into place, so readers see either the old
/// or the new artifact, never a partial one.
#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FsArtifactStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_path(&self, entity_id: &str) -> PathBuf {
        self.root
            .join(format!("model_{}.json", entity_file_key(entity_id)))
    }

    pub fn metrics_path(&self, entity_id: &str) -> PathBuf {
        self.root
            .join(format!("metrics_{}.json", entity_file_key(entity_id)))
    }

    fn entity_lock(&self, entity_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(entity_file_key(entity_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Write `bytes` to a synced temporary file next to the artifacts
    fn stage(&self, bytes: &[u8]) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn get(&self, entity_id: &str) -> Result<TrainedArtifact> {
        let lock = self.entity_lock(entity_id);
        let _guard = lock.lock();

        let model_path = self.model_path(entity_id);
        let metrics_path = self.metrics_path(entity_id);

        if !model_path.exists() || !metrics_path.exists() {
            return Err(ForecastError::NotFoundError(format!(
                "No trained model for {}",
                entity_id
            )));
        }

        let model = fs::read(&model_path)?;
        let metrics: RegressionMetrics = serde_json::from_slice(&fs::read(&metrics_path)?)?;
        let trained_at: DateTime<Utc> = fs::metadata(&model_path)?.modified()?.into();

        debug!(entity = entity_id, path = %model_path.display(), "artifact loaded");

        Ok(TrainedArtifact {
            entity_id: entity_id.to_string(),
            model,
            metrics,
            trained_at,
        })
    }

    fn put(&self, artifact: &TrainedArtifact) -> Result<()> {
        let lock = self.entity_lock(&artifact.entity_id);
        let _guard = lock.lock();

        let model_path = self.model_path(&artifact.entity_id);
        let metrics_path = self.metrics_path(&artifact.entity_id);

        let staged_model = self.stage(&artifact.model)?;
        let staged_metrics = self.stage(&serde_json::to_vec_pretty(&artifact.metrics)?)?;

        staged_model.persist(&model_path).map_err(|e| e.error)?;
        if let Err(e) = staged_metrics.persist(&metrics_path) {
            // Old metrics must not be paired with the new model
            let _ = fs::remove_file(&model_path);
            return Err(e.error.into());
        }

        info!(
            entity = %artifact.entity_id,
            model = %model_path.display(),
            metrics = %metrics_path.display(),
            "artifact stored"
        );
        Ok(())
    }

    fn exists(&self, entity_id: &str) -> bool {
        self.model_path(entity_id).exists() && self.metrics_path(entity_id).exists()
    }

    fn delete(&self, entity_id: &str) -> Result<bool> {
        let lock = self.entity_lock(entity_id);
        let _guard = lock.lock();

        let mut removed = false;
        for path in [self.model_path(entity_id), self.metrics_path(entity_id)] {
            if path.exists() {
                fs::remove_file(&path)?;
                removed = true;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifact(entity: &str, model: &[u8], mse: f64) -> TrainedArtifact {
        TrainedArtifact {
            entity_id: entity.to_string(),
            model: model.to_vec(),
            metrics: RegressionMetrics {
                mse,
                rmse: mse.sqrt(),
                mae: 1.0,
                r2: 0.5,
            },
            trained_at: Utc::now(),
        }
    }

    #[test]
    fn test_entity_file_key() {
        assert_eq!(entity_file_key("AAPL"), "AAPL");
        assert_eq!(entity_file_key("S&P500"), "S%26P500");
        assert_eq!(entity_file_key("S_P500"), "S_P500");
        assert_eq!(entity_file_key("S P500"), "S%20P500");
        assert_eq!(entity_file_key("../etc"), "%2E%2E%2Fetc");
        assert_eq!(entity_file_key("100%"), "100%25");
        assert_eq!(entity_file_key("Período"), "Per%C3%ADodo");
    }

    #[test]
    fn test_similar_ids_do_not_share_artifacts() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();

        store.put(&artifact("S&P500", b"index", 4.0)).unwrap();

        assert!(store.exists("S&P500"));
        assert!(!store.exists("S_P500"));
        assert!(!store.exists("S P500"));
        assert_eq!(store.get("S_P500").unwrap_err().status_code(), 404);

        store.put(&artifact("S_P500", b"symbol", 9.0)).unwrap();
        assert_eq!(store.get("S&P500").unwrap().model, b"index".to_vec());
        assert_eq!(store.get("S_P500").unwrap().model, b"symbol".to_vec());
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();

        assert!(!store.exists("AAPL"));
        let err = store.get("AAPL").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_put_overwrites() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();

        store.put(&artifact("AAPL", b"first", 4.0)).unwrap();
        store.put(&artifact("AAPL", b"second", 9.0)).unwrap();

        let loaded = store.get("AAPL").unwrap();
        assert_eq!(loaded.model, b"second".to_vec());
        assert_eq!(loaded.metrics.mse, 9.0);

        // No temporary files left behind
        let files = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 2);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();

        store.put(&artifact("PRIMA", b"m", 1.0)).unwrap();
        assert!(store.delete("PRIMA").unwrap());
        assert!(!store.exists("PRIMA"));
        assert!(!store.delete("PRIMA").unwrap());
    }
}
