use {
    crate::domain::{
        audit::AnomalyEntry,
        store::{EntityKind, Record, RecordStore, StoreError, StoreFuture},
    },
    std::collections::HashMap,
    tokio::sync::RwLock,
};

/// Process-local store. Used when no database is configured, and by tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<(EntityKind, String), Record>>,
    anomalies: RwLock<Vec<AnomalyEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every anomaly recorded so far, oldest first. Redelivered refusals
    /// keep the first entry.
    pub async fn anomalies(&self) -> Vec<AnomalyEntry> {
        self.anomalies.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl RecordStore for InMemoryStore {
    fn get<'a>(&'a self, kind: EntityKind, id: &'a str) -> StoreFuture<'a, Record> {
        Box::pin(async move {
            self.records
                .read()
                .await
                .get(&(kind, id.to_string()))
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    kind,
                    id: id.to_string(),
                })
        })
    }

    fn save(&self, record: Record) -> StoreFuture<'_, Record> {
        Box::pin(async move {
            let key = (record.kind(), record.id().to_string());
            let mut records = self.records.write().await;

            let stored_version = records.get(&key).map(Record::version).unwrap_or(0);
            if stored_version != record.version() {
                return Err(StoreError::Conflict {
                    kind: key.0,
                    id: key.1,
                });
            }

            let saved = record.with_version(stored_version + 1);
            records.insert(key, saved.clone());
            Ok(saved)
        })
    }

    fn remove<'a>(&'a self, kind: EntityKind, id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            Ok(self
                .records
                .write()
                .await
                .remove(&(kind, id.to_string()))
                .is_some())
        })
    }

    fn record_anomaly(&self, entry: AnomalyEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut anomalies = self.anomalies.write().await;
            if !anomalies.iter().any(|seen| seen.same_refusal_as(&entry)) {
                anomalies.push(entry);
            }
            Ok(())
        })
    }
}
