//! On-disk model artifacts
//!
//! Each fitted component is stored as its own JSON envelope carrying a
//! SHA256 checksum of the payload and the id of the training run that
//! produced it. Writes go to a temp file that is fsynced and then renamed
//! into place, so a reader never sees a half-written artifact.

use crate::error::{InferenceError, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Envelope format understood by this build
pub const FORMAT_VERSION: u32 = 1;

/// Named artifact slots under the model directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    QualityRegression,
    QualityClassification,
    QualityScaler,
    AnomalyModel,
    AnomalyScaler,
}

impl ArtifactRole {
    pub const ALL: [ArtifactRole; 5] = [
        ArtifactRole::QualityRegression,
        ArtifactRole::QualityClassification,
        ArtifactRole::QualityScaler,
        ArtifactRole::AnomalyModel,
        ArtifactRole::AnomalyScaler,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactRole::QualityRegression => "quality-regression",
            ArtifactRole::QualityClassification => "quality-classification",
            ArtifactRole::QualityScaler => "quality-scaler",
            ArtifactRole::AnomalyModel => "anomaly-model",
            ArtifactRole::AnomalyScaler => "anomaly-scaler",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl std::fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactEnvelope {
    role: String,
    format_version: u32,
    run_id: String,
    saved_at: DateTime<Utc>,
    checksum: String,
    payload: String,
}

/// A verified artifact read back from disk
#[derive(Debug, Clone)]
pub struct LoadedArtifact<T> {
    pub run_id: String,
    pub saved_at: DateTime<Utc>,
    pub value: T,
}

/// Directory-backed store for model artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, role: ArtifactRole) -> PathBuf {
        self.root.join(role.file_name())
    }

    pub fn exists(&self, role: ArtifactRole) -> bool {
        self.path_for(role).is_file()
    }

    /// Make sure the model directory exists and is a directory
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            InferenceError::persistence(
                "model-dir",
                format!("cannot create {}: {}", self.root.display(), e),
            )
        })
    }

    /// Serialize `value` and write it under `role`
    pub fn save<T: Serialize>(&self, role: ArtifactRole, run_id: &str, value: &T) -> Result<()> {
        self.ensure_root()?;
        let payload = serde_json::to_string(value)
            .map_err(|e| InferenceError::persistence(role.as_str(), e))?;
        let envelope = ArtifactEnvelope {
            role: role.as_str().to_string(),
            format_version: FORMAT_VERSION,
            run_id: run_id.to_string(),
            saved_at: Utc::now(),
            checksum: compute_checksum(payload.as_bytes()),
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| InferenceError::persistence(role.as_str(), e))?;

        let path = self.path_for(role);
        write_atomic(&path, &bytes).map_err(|e| {
            InferenceError::persistence(role.as_str(), format!("write {}: {}", path.display(), e))
        })?;

        debug!(
            role = %role,
            run_id = %run_id,
            path = %path.display(),
            size = bytes.len(),
            "Artifact written"
        );
        Ok(())
    }

    /// Read, verify and deserialize the artifact stored under `role`
    pub fn load<T: DeserializeOwned>(&self, role: ArtifactRole) -> Result<LoadedArtifact<T>> {
        let path = self.path_for(role);
        let bytes = fs::read(&path).map_err(|e| {
            InferenceError::persistence(role.as_str(), format!("read {}: {}", path.display(), e))
        })?;
        let envelope: ArtifactEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| {
                InferenceError::persistence(role.as_str(), format!("malformed envelope: {}", e))
            })?;

        if envelope.role != role.as_str() {
            return Err(InferenceError::persistence(
                role.as_str(),
                format!("file holds role '{}'", envelope.role),
            ));
        }
        if envelope.format_version != FORMAT_VERSION {
            return Err(InferenceError::persistence(
                role.as_str(),
                format!(
                    "unsupported format version {} (expected {})",
                    envelope.format_version, FORMAT_VERSION
                ),
            ));
        }
        let computed = compute_checksum(envelope.payload.as_bytes());
        if computed != envelope.checksum {
            return Err(InferenceError::persistence(
                role.as_str(),
                format!(
                    "checksum mismatch: expected {}, got {}",
                    envelope.checksum, computed
                ),
            ));
        }

        let value = serde_json::from_str(&envelope.payload)
            .map_err(|e| {
                InferenceError::persistence(role.as_str(), format!("malformed payload: {}", e))
            })?;

        Ok(LoadedArtifact {
            run_id: envelope.run_id,
            saved_at: envelope.saved_at,
            value,
        })
    }
}

/// Identifier shared by all artifacts written from one training run
pub fn new_run_id() -> String {
    format!(
        "{}-{:08x}",
        Utc::now().format("%Y%m%dT%H%M%S%.6fZ"),
        rand::random::<u32>()
    )
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        weights: Vec<f64>,
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"fitted scaler");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"fitted scaler"));
    }

    #[test]
    fn test_save_then_load_is_exact() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let sample = Sample {
            weights: vec![0.1 + 0.2, 1.0 / 3.0, -2.5e-17],
        };

        store.save(ArtifactRole::QualityScaler, "run-1", &sample).unwrap();
        assert!(store.exists(ArtifactRole::QualityScaler));
        assert!(!dir.path().join("quality-scaler.json.tmp").exists());

        let loaded: LoadedArtifact<Sample> = store.load(ArtifactRole::QualityScaler).unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.value, sample);
    }

    #[test]
    fn test_tampered_payload_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store
            .save(ArtifactRole::AnomalyModel, "run-1", &Sample { weights: vec![1.25] })
            .unwrap();

        let path = store.path_for(ArtifactRole::AnomalyModel);
        let text = fs::read_to_string(&path).unwrap().replace("1.25", "9.75");
        fs::write(&path, text).unwrap();

        let err = store.load::<Sample>(ArtifactRole::AnomalyModel).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_role_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store
            .save(ArtifactRole::QualityScaler, "run-1", &Sample { weights: vec![] })
            .unwrap();
        fs::copy(
            store.path_for(ArtifactRole::QualityScaler),
            store.path_for(ArtifactRole::AnomalyScaler),
        )
        .unwrap();

        let err = store.load::<Sample>(ArtifactRole::AnomalyScaler).unwrap_err();
        assert!(matches!(err, InferenceError::Persistence { .. }));
    }

    #[test]
    fn test_missing_artifact_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let err = store.load::<Sample>(ArtifactRole::QualityRegression).unwrap_err();
        match err {
            InferenceError::Persistence { role, .. } => assert_eq!(role, "quality-regression"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
