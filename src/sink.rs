//! Destination of position records

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{
    errors::StoreError,
    models::{Mmsi, StoredPositionRecord},
};

/// Acknowledgement of a stored position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub mmsi: Mmsi,
}

/// Upsert of a vessel's latest position, keyed by MMSI.
///
/// Writing the same MMSI again overwrites the previous record.
#[async_trait]
pub trait PositionSink: Send + Sync {
    async fn write(&self, record: &StoredPositionRecord) -> Result<Ack, StoreError>;
}

/// In-memory last-write-wins store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Mmsi, StoredPositionRecord>>,
    rejected: HashSet<Mmsi>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse writes for `mmsi` with a request-level error
    pub fn rejecting(mut self, mmsi: Mmsi) -> Self {
        self.rejected.insert(mmsi);
        self
    }

    /// Fail every write as if the store could not be reached
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn get(&self, mmsi: Mmsi) -> Option<StoredPositionRecord> {
        self.lock().get(&mmsi).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Mmsi, StoredPositionRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PositionSink for MemoryStore {
    async fn write(&self, record: &StoredPositionRecord) -> Result<Ack, StoreError> {
        if self.unavailable {
            return Err(StoreError::Connectivity {
                message: "memory store marked unavailable".to_string(),
            });
        }
        if self.rejected.contains(&record.mmsi) {
            return Err(StoreError::Request {
                mmsi: record.mmsi,
                message: "write rejected".to_string(),
            });
        }
        self.lock().insert(record.mmsi, record.clone());
        Ok(Ack { mmsi: record.mmsi })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn record(mmsi: u32, lat: f64, lon: f64, ts: i64) -> StoredPositionRecord {
        StoredPositionRecord {
            mmsi: Mmsi::try_from(mmsi).unwrap(),
            name: "EVER GIVEN".to_string(),
            lat,
            lon,
            observed_at: DateTime::from_timestamp(ts, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn overwrite_keeps_latest() {
        let store = MemoryStore::new();
        store.write(&record(244592000, 51.95, 4.05, 100)).await.unwrap();
        store.write(&record(244592000, 52.00, 4.10, 160)).await.unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get(Mmsi::try_from(244592000).unwrap()).unwrap();
        assert_eq!(stored.lat, 52.00);
        assert_eq!(stored.lon, 4.10);
        assert_eq!(stored.observed_at_unix(), 160);
    }

    #[tokio::test]
    async fn scripted_failures() {
        let rejected = Mmsi::try_from(244057043).unwrap();
        let store = MemoryStore::new().rejecting(rejected);

        let err = store.write(&record(244057043, 0.0, 0.0, 1)).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(store.write(&record(244592000, 0.0, 0.0, 1)).await.is_ok());

        let store = MemoryStore::new().unavailable();
        let err = store.write(&record(244592000, 0.0, 0.0, 1)).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(store.is_empty());
    }
}
