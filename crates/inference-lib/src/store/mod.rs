//! Storage seams: the monitoring data store and on-disk model artifacts

mod artifacts;

pub use artifacts::{new_run_id, ArtifactRole, ArtifactStore, LoadedArtifact, FORMAT_VERSION};

use crate::anomaly::Alert;
use crate::models::{Product, ProductStatus, QualityRecord, SensorReading};
use anyhow::Context;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Data the inference service reads from and writes back to
pub trait MonitoringStore: Send + Sync {
    fn product(&self, product_id: i64) -> Option<Product>;

    /// Most recent reading for a product
    fn latest_reading(&self, product_id: i64) -> Option<SensorReading>;

    /// Historical inspection records used for quality training
    fn quality_records(&self) -> Vec<QualityRecord>;

    /// Every stored sensor reading, used for anomaly training
    fn sensor_readings(&self) -> Vec<SensorReading>;

    fn append_reading(&self, product_id: i64, reading: SensorReading);

    fn append_alerts(&self, product_id: i64, alerts: &[Alert]);

    fn alerts(&self, product_id: i64) -> Vec<Alert>;

    /// Returns false if the product does not exist
    fn update_product_status(&self, product_id: i64, status: ProductStatus) -> bool;
}

/// Serialized form of an [`InMemoryStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub products: Vec<Product>,
    pub readings: Vec<SensorReading>,
    pub quality_records: Vec<QualityRecord>,
}

/// Concurrent in-process store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    products: DashMap<i64, Product>,
    readings: DashMap<i64, Vec<SensorReading>>,
    /// Readings not attached to any product; still used for training
    unassigned: RwLock<Vec<SensorReading>>,
    alerts: DashMap<i64, Vec<Alert>>,
    quality_records: RwLock<Vec<QualityRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        for product in snapshot.products {
            store.insert_product(product);
        }
        for reading in snapshot.readings {
            match reading.product_id {
                Some(id) => store.append_reading(id, reading),
                None => store
                    .unassigned
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(reading.with_baseline_defaults()),
            }
        }
        *store
            .quality_records
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot.quality_records;
        store
    }

    /// Load a JSON snapshot from disk
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data file {:?}", path))?;
        let snapshot: StoreSnapshot = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse data file {:?}", path))?;
        debug!(
            path = %path.display(),
            products = snapshot.products.len(),
            readings = snapshot.readings.len(),
            quality_records = snapshot.quality_records.len(),
            "Loaded store snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn insert_product(&self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn add_quality_records(&self, records: impl IntoIterator<Item = QualityRecord>) {
        self.quality_records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
    }
}

impl MonitoringStore for InMemoryStore {
    fn product(&self, product_id: i64) -> Option<Product> {
        self.products.get(&product_id).map(|p| p.clone())
    }

    fn latest_reading(&self, product_id: i64) -> Option<SensorReading> {
        let readings = self.readings.get(&product_id)?;
        readings
            .iter()
            .enumerate()
            .max_by_key(|(i, r)| (r.recorded_at, *i))
            .map(|(_, r)| r.clone())
    }

    fn quality_records(&self) -> Vec<QualityRecord> {
        self.quality_records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sensor_readings(&self) -> Vec<SensorReading> {
        let mut all: Vec<SensorReading> = self
            .unassigned
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut ids: Vec<i64> = self.readings.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(readings) = self.readings.get(&id) {
                all.extend(readings.iter().cloned());
            }
        }
        all
    }

    /// Stores the reading with absent optional channels set to baseline
    fn append_reading(&self, product_id: i64, mut reading: SensorReading) {
        reading.product_id = Some(product_id);
        self.readings
            .entry(product_id)
            .or_default()
            .push(reading.with_baseline_defaults());
    }

    fn append_alerts(&self, product_id: i64, alerts: &[Alert]) {
        if alerts.is_empty() {
            return;
        }
        self.alerts
            .entry(product_id)
            .or_default()
            .extend(alerts.iter().cloned());
    }

    fn alerts(&self, product_id: i64) -> Vec<Alert> {
        self.alerts
            .get(&product_id)
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    fn update_product_status(&self, product_id: i64, status: ProductStatus) -> bool {
        match self.products.get_mut(&product_id) {
            Some(mut product) => {
                product.status = status;
                true
            }
            None => false,
        }
    }
}
