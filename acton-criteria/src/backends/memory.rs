//! In-memory data source
//!
//! Records live in a concurrent map of collections, each an ordered map of
//! key to record. Clones share the same storage, which makes the store handy
//! for tests and for prototyping repositories before a real backend exists.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::key_value::KeyValueCommand;
use crate::repository::{
    CallGuard, DataSource, Record, RepositoryError, RepositoryOperation, RepositoryResult,
};

type Collection = BTreeMap<String, Record>;

/// A [`DataSource`] backed by process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    collections: Arc<DashMap<String, Collection>>,
    guard: CallGuard,
}

impl InMemoryDataSource {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort calls once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.guard = self.guard.with_cancellation(token);
        self
    }

    /// Number of records in `collection`
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |records| records.len())
    }

    /// Whether `collection` holds no records
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn put(&self, collection: &str, id: &str, record: &Record) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record.clone());
    }

    fn get(&self, collection: &str, id: &str) -> Option<Record> {
        self.collections
            .get(collection)
            .and_then(|records| records.get(id).cloned())
    }

    fn scan(&self, collection: &str, prefix: Option<&str>) -> Vec<Record> {
        let Some(records) = self.collections.get(collection) else {
            return Vec::new();
        };
        match prefix {
            Some(prefix) => records
                .range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(_, record)| record.clone())
                .collect(),
            None => records.values().cloned().collect(),
        }
    }

    fn remove(&self, collection: &str, id: &str) {
        if let Some(mut records) = self.collections.get_mut(collection) {
            records.remove(id);
        }
    }
}

impl DataSource for InMemoryDataSource {
    type Command = KeyValueCommand;

    const BACKEND: &'static str = "memory";

    async fn execute(&self, command: &Self::Command) -> RepositoryResult<()> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Execute, async {
                match command {
                    KeyValueCommand::Put {
                        collection,
                        id,
                        record,
                    } => self.put(collection, id, record),
                    KeyValueCommand::Delete { collection, id } => self.remove(collection, id),
                    other => {
                        return Err(RepositoryError::backend_error(
                            RepositoryOperation::Execute,
                            format!("{:?} returns records; use fetch", other),
                        ))
                    }
                }
                Ok(())
            })
            .await
    }

    async fn fetch_one(&self, command: &Self::Command) -> RepositoryResult<Option<Record>> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::FetchOne, async {
                match command {
                    KeyValueCommand::Get { collection, id } => Ok(self.get(collection, id)),
                    KeyValueCommand::Scan { collection, prefix } => {
                        Ok(self.scan(collection, prefix.as_deref()).into_iter().next())
                    }
                    other => Err(RepositoryError::backend_error(
                        RepositoryOperation::FetchOne,
                        format!("{:?} returns no records", other),
                    )),
                }
            })
            .await
    }

    async fn fetch(&self, command: &Self::Command) -> RepositoryResult<Vec<Record>> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Fetch, async {
                match command {
                    KeyValueCommand::Get { collection, id } => {
                        Ok(self.get(collection, id).into_iter().collect())
                    }
                    KeyValueCommand::Scan { collection, prefix } => {
                        Ok(self.scan(collection, prefix.as_deref()))
                    }
                    other => Err(RepositoryError::backend_error(
                        RepositoryOperation::Fetch,
                        format!("{:?} returns no records", other),
                    )),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use serde_json::json;

    fn record(id: &str) -> Record {
        match json!({"id": id}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn put(id: &str) -> KeyValueCommand {
        KeyValueCommand::Put {
            collection: "c".into(),
            id: id.into(),
            record: record(id),
        }
    }

    #[tokio::test]
    async fn test_prefix_scan() {
        let store = InMemoryDataSource::new();
        for id in ["usr_1", "usr_2", "org_1"] {
            store.execute(&put(id)).await.unwrap();
        }
        let scanned = store
            .fetch(&KeyValueCommand::Scan {
                collection: "c".into(),
                prefix: Some("usr_".into()),
            })
            .await
            .unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(store.len("c"), 3);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let store = InMemoryDataSource::new();
        let clone = store.clone();
        store.execute(&put("a")).await.unwrap();
        assert_eq!(clone.len("c"), 1);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = InMemoryDataSource::new();
        let get = KeyValueCommand::Get {
            collection: "none".into(),
            id: "x".into(),
        };
        assert!(store.fetch_one(&get).await.unwrap().is_none());
        assert!(store.is_empty("none"));
    }

    #[tokio::test]
    async fn test_cancelled_store_rejects_calls() {
        let token = CancellationToken::new();
        let store = InMemoryDataSource::new().with_cancellation(token.clone());
        token.cancel();
        let error = store.execute(&put("a")).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Cancelled);
    }
}
