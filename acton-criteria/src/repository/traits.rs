//! Repository trait definitions
//!
//! Async methods use RPITIT (Return Position Impl Trait In Traits), so no
//! `async_trait` boxing is involved.
//!
//! # Overview
//!
//! - [`Repository`]: save / search / match / delete for one aggregate type
//! - [`RepositoryMapper`]: converts aggregates to and from primitive records
//! - [`DataSource`]: the only component holding a live backend connection
//! - [`CriteriaConverter`]: translates [`Criteria`] into a backend's native query
//! - [`CommandBuilder`]: builds backend commands for each repository operation

use std::fmt;
use std::future::Future;

use serde_json::Value;

use super::error::RepositoryError;
use super::plan::QueryPlan;
use crate::criteria::Criteria;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// A primitive record: a flat map of attribute names to JSON values
pub type Record = serde_json::Map<String, Value>;

/// Persistence operations for one aggregate type
///
/// # Example
///
/// ```rust
/// use acton_criteria::criteria::{Criteria, Filter};
/// use acton_criteria::repository::{InMemoryDataSource, Repository, SerdeMapper, DataSourceRepository};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct User {
///     id: String,
///     name: String,
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let repo = DataSourceRepository::in_memory(
///     InMemoryDataSource::new(),
///     "users",
///     SerdeMapper::<User>::new(),
/// );
///
/// repo.save(&User { id: "1".into(), name: "Ada".into() }).await.unwrap();
/// let found = repo
///     .matching(&Criteria::from_filter(Filter::begins_with("name", "A").unwrap()))
///     .await
///     .unwrap();
/// assert_eq!(found.len(), 1);
/// assert!(repo.search_by_id("2").await.unwrap().is_none());
/// # }
/// ```
pub trait Repository<T>: Send + Sync {
    /// Upsert an aggregate, keyed on its id
    fn save(&self, aggregate: &T) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Find an aggregate by id
    ///
    /// Returns `Ok(None)` when absent; absence is not an error.
    fn search_by_id(&self, id: &str) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Fetch every aggregate
    fn search_all(&self) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Fetch aggregates matching `criteria`
    ///
    /// An empty criteria returns the same set as [`Repository::search_all`].
    fn matching(
        &self,
        criteria: &Criteria,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Delete an aggregate by id
    ///
    /// Deleting an id that does not exist succeeds.
    fn delete(&self, id: &str) -> impl Future<Output = RepositoryResult<()>> + Send;
}

/// Bidirectional converter between aggregates and primitive records
pub trait RepositoryMapper<T>: Send + Sync {
    /// Aggregate to record
    fn to_primitive(&self, aggregate: &T) -> RepositoryResult<Record>;

    /// Record to aggregate
    fn to_aggregate(&self, record: Record) -> RepositoryResult<T>;
}

/// Uniform, minimal access to a storage backend
///
/// Implementations own at most one live connection (client or pool),
/// established lazily on first use and reused afterwards. Every call is
/// bounded by a timeout and can be cancelled.
pub trait DataSource: Send + Sync {
    /// Native command understood by this backend
    type Command: fmt::Debug + Clone + Send + Sync;

    /// Backend name used in errors and logs
    const BACKEND: &'static str;

    /// Run a command that returns no records
    fn execute(&self, command: &Self::Command) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Run a command returning at most one record
    fn fetch_one(
        &self,
        command: &Self::Command,
    ) -> impl Future<Output = RepositoryResult<Option<Record>>> + Send;

    /// Run a command returning any number of records
    fn fetch(
        &self,
        command: &Self::Command,
    ) -> impl Future<Output = RepositoryResult<Vec<Record>>> + Send;
}

/// Translates criteria into a backend's native query representation
///
/// Unsupported operators and untranslatable criteria fail here, before any
/// network call.
pub trait CriteriaConverter {
    /// Native query artifact
    type Query;

    /// Render `criteria`
    fn convert(&self, criteria: &Criteria) -> RepositoryResult<Self::Query>;
}

/// Builds backend commands for each repository operation
pub trait CommandBuilder: Send + Sync {
    /// Command type, matching the data source's
    type Command: fmt::Debug + Clone + Send + Sync;

    /// Name of the identifier attribute
    fn id_field(&self) -> &str;

    /// Insert or replace the record stored under `id`
    fn upsert(&self, id: &str, record: Record) -> RepositoryResult<Self::Command>;

    /// Fetch the record stored under `id`
    fn find_by_id(&self, id: &str) -> RepositoryResult<Self::Command>;

    /// Fetch every record
    fn find_all(&self) -> RepositoryResult<Self::Command>;

    /// Fetch the records matching `criteria`
    ///
    /// Whatever the command cannot express is returned as a residual to be
    /// applied in process.
    fn matching(&self, criteria: &Criteria) -> RepositoryResult<QueryPlan<Self::Command>>;

    /// Remove the record stored under `id`
    fn delete(&self, id: &str) -> RepositoryResult<Self::Command>;
}
