//! Generic repository over a data source, a command builder and a mapper

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation};
use super::retry::RetryPolicy;
use super::traits::{
    CommandBuilder, DataSource, Record, Repository, RepositoryMapper, RepositoryResult,
};
use crate::backends::key_value::KeyValueCommandBuilder;
use crate::backends::memory::InMemoryDataSource;
use crate::criteria::Criteria;

/// A [`Repository`] assembled from backend parts
///
/// - `D`: the [`DataSource`] executing commands
/// - `B`: the [`CommandBuilder`] producing commands for `D`
/// - `M`: the [`RepositoryMapper`] converting records to `T`
///
/// Reads and the idempotent writes (upsert by id, delete by id) retry
/// retriable errors with the configured [`RetryPolicy`].
pub struct DataSourceRepository<T, D, B, M> {
    source: Arc<D>,
    commands: B,
    mapper: M,
    retry: RetryPolicy,
    _aggregate: PhantomData<fn() -> T>,
}

impl<T, D, B, M> DataSourceRepository<T, D, B, M>
where
    D: DataSource,
    B: CommandBuilder<Command = D::Command>,
    M: RepositoryMapper<T>,
{
    /// Assemble a repository
    pub fn new(source: Arc<D>, commands: B, mapper: M) -> Self {
        Self {
            source,
            commands,
            mapper,
            retry: RetryPolicy::default(),
            _aggregate: PhantomData,
        }
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The underlying data source
    pub fn source(&self) -> &Arc<D> {
        &self.source
    }

    /// The command builder
    pub fn commands(&self) -> &B {
        &self.commands
    }

    async fn fetch_records(
        &self,
        operation: RepositoryOperation,
        command: &D::Command,
    ) -> RepositoryResult<Vec<Record>> {
        self.retry
            .run(operation, || self.source.fetch(command))
            .await
            .map_err(|e| e.with_operation(operation))
    }

    fn to_aggregates(&self, records: Vec<Record>) -> RepositoryResult<Vec<T>> {
        records
            .into_iter()
            .map(|record| self.mapper.to_aggregate(record))
            .collect()
    }
}

impl<T, M> DataSourceRepository<T, InMemoryDataSource, KeyValueCommandBuilder, M>
where
    M: RepositoryMapper<T>,
{
    /// Repository over an in-memory collection with `id` as identifier
    pub fn in_memory(source: InMemoryDataSource, collection: &str, mapper: M) -> Self {
        Self::new(
            Arc::new(source),
            KeyValueCommandBuilder::new(collection),
            mapper,
        )
        .with_retry(RetryPolicy::none())
    }
}

impl<T, D, B, M> Repository<T> for DataSourceRepository<T, D, B, M>
where
    T: Send + Sync,
    D: DataSource,
    B: CommandBuilder<Command = D::Command>,
    M: RepositoryMapper<T>,
{
    async fn save(&self, aggregate: &T) -> RepositoryResult<()> {
        let record = self.mapper.to_primitive(aggregate)?;
        let id = record_id(&record, self.commands.id_field())?;
        let command = self.commands.upsert(&id, record)?;

        tracing::debug!(backend = D::BACKEND, id = %id, "Saving record");
        self.retry
            .run(RepositoryOperation::Save, || self.source.execute(&command))
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Save).with_entity_id(id))
    }

    async fn search_by_id(&self, id: &str) -> RepositoryResult<Option<T>> {
        let command = self.commands.find_by_id(id)?;
        let record = self
            .retry
            .run(RepositoryOperation::SearchById, || {
                self.source.fetch_one(&command)
            })
            .await
            .map_err(|e| {
                e.with_operation(RepositoryOperation::SearchById)
                    .with_entity_id(id)
            })?;
        record.map(|r| self.mapper.to_aggregate(r)).transpose()
    }

    async fn search_all(&self) -> RepositoryResult<Vec<T>> {
        let command = self.commands.find_all()?;
        let records = self
            .fetch_records(RepositoryOperation::SearchAll, &command)
            .await?;
        self.to_aggregates(records)
    }

    async fn matching(&self, criteria: &Criteria) -> RepositoryResult<Vec<T>> {
        if criteria.is_empty() {
            return self.search_all().await;
        }

        let plan = self.commands.matching(criteria)?;
        tracing::debug!(backend = D::BACKEND, command = ?plan.command, "Running criteria query");

        let records = self
            .fetch_records(RepositoryOperation::Matching, &plan.command)
            .await?;

        let records = if plan.residual.is_empty() {
            records
        } else {
            let fetched = records.len();
            let kept = plan.residual.apply(records);
            tracing::debug!(
                backend = D::BACKEND,
                fetched,
                kept = kept.len(),
                "Applied in-process residual"
            );
            kept
        };
        self.to_aggregates(records)
    }

    async fn delete(&self, id: &str) -> RepositoryResult<()> {
        let command = self.commands.delete(id)?;
        tracing::debug!(backend = D::BACKEND, id, "Deleting record");
        self.retry
            .run(RepositoryOperation::Delete, || self.source.execute(&command))
            .await
            .map_err(|e| {
                e.with_operation(RepositoryOperation::Delete)
                    .with_entity_id(id)
            })
    }
}

impl<T, D, B, M> fmt::Debug for DataSourceRepository<T, D, B, M>
where
    D: DataSource,
    B: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceRepository")
            .field("backend", &D::BACKEND)
            .field("commands", &self.commands)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Extract the identifier from a record as a string
pub(crate) fn record_id(record: &Record, id_field: &str) -> RepositoryResult<String> {
    match record.get(id_field) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        Some(_) | None => Err(RepositoryError::validation(format!(
            "Record must have a non-empty string or numeric '{}' field",
            id_field
        ))
        .with_operation(RepositoryOperation::Save)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Filter, Order};
    use crate::repository::{RepositoryErrorKind, SerdeMapper};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: String,
        name: String,
        age: u32,
        role: String,
    }

    fn user(id: &str, name: &str, age: u32, role: &str) -> User {
        User {
            id: id.into(),
            name: name.into(),
            age,
            role: role.into(),
        }
    }

    async fn seeded() -> DataSourceRepository<
        User,
        InMemoryDataSource,
        KeyValueCommandBuilder,
        SerdeMapper<User>,
    > {
        let repo =
            DataSourceRepository::in_memory(InMemoryDataSource::new(), "users", SerdeMapper::new());
        for u in [
            user("1", "Ada", 36, "admin"),
            user("2", "Brian", 17, "user"),
            user("3", "Cleo", 42, "user"),
            user("4", "Dan", 25, "editor"),
        ] {
            repo.save(&u).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let repo = seeded().await;
        repo.save(&user("1", "Ada L.", 37, "admin")).await.unwrap();
        let found = repo.search_by_id("1").await.unwrap().unwrap();
        assert_eq!(found.name, "Ada L.");
        assert_eq!(repo.search_all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_search_by_id_absent_is_none() {
        let repo = seeded().await;
        assert!(repo.search_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_id_succeeds() {
        let repo = seeded().await;
        repo.delete("missing").await.unwrap();
        repo.delete("2").await.unwrap();
        assert!(repo.search_by_id("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_criteria_equals_search_all() {
        let repo = seeded().await;
        let mut all = repo.search_all().await.unwrap();
        let mut matched = repo.matching(&Criteria::all()).await.unwrap();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(all, matched);
    }

    #[tokio::test]
    async fn test_matching_with_or_order_and_pagination() {
        let repo = seeded().await;
        let mut criteria = Criteria::from_filter(Filter::gte("age", 18).unwrap())
            .with_order(Order::desc("age").unwrap())
            .with_limit(2);
        criteria.add_filter(Filter::eq("role", "user").unwrap());
        criteria.add_or_criteria(Criteria::from_filter(Filter::eq("role", "admin").unwrap()));

        let found = repo.matching(&criteria).await.unwrap();
        let ids: Vec<_> = found.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[tokio::test]
    async fn test_matching_id_lookup_is_pushed_down() {
        let repo = seeded().await;
        let criteria = Criteria::from_filter(Filter::eq("id", "4").unwrap());
        let found = repo.matching(&criteria).await.unwrap();
        assert_eq!(found, vec![user("4", "Dan", 25, "editor")]);
    }

    #[tokio::test]
    async fn test_save_requires_id() {
        #[derive(Serialize, Deserialize)]
        struct NoId {
            name: String,
        }
        let repo =
            DataSourceRepository::in_memory(InMemoryDataSource::new(), "x", SerdeMapper::<NoId>::new());
        let error = repo.save(&NoId { name: "a".into() }).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Validation);
        assert_eq!(error.operation, RepositoryOperation::Save);
    }

    #[test]
    fn test_numeric_ids_stringified() {
        let record = match serde_json::json!({"id": 42}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(record_id(&record, "id").unwrap(), "42");
    }
}
