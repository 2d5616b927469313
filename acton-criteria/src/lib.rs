//! # acton-criteria
//!
//! Backend-agnostic query criteria and a repository abstraction that runs them
//! against PostgreSQL, DynamoDB, Elasticsearch, Redis or process memory.
//!
//! ## Features
//!
//! - **Criteria algebra**: validated filters, ordering, pagination and OR branches
//! - **Field whitelisting**: reject unknown filter and order fields at construction
//! - **Native translation**: SQL with bound parameters, DynamoDB filter expressions,
//!   Elasticsearch query DSL
//! - **In-process fallback**: what a key-value store cannot express is evaluated
//!   after fetch, with identical semantics
//! - **Resilience**: lazy exactly-once connection setup, per-call timeouts,
//!   cancellation and bounded retries with exponential backoff
//!
//! ## Cargo features
//!
//! | Feature | Enables |
//! |---|---|
//! | `postgres` | `PostgresDataSource` (sqlx) |
//! | `dynamodb` | `DynamoDbDataSource` (aws-sdk-dynamodb) |
//! | `elasticsearch` | `ElasticsearchDataSource` |
//! | `cache` | `RedisDataSource` (deadpool-redis) |
//! | `full` | all of the above |
//!
//! Converters and command builders for every backend are always compiled.
//!
//! ## Example
//!
//! ```rust
//! use acton_criteria::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct User {
//!     id: String,
//!     name: String,
//!     age: i64,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let users = DataSourceRepository::in_memory(
//!     InMemoryDataSource::new(),
//!     "users",
//!     SerdeMapper::<User>::new(),
//! );
//!
//! for (id, name, age) in [("1", "Ada", 36), ("2", "Alan", 41), ("3", "Grace", 85)] {
//!     users
//!         .save(&User { id: id.into(), name: name.into(), age })
//!         .await?;
//! }
//!
//! let criteria = Criteria::create(
//!     vec![FilterInput::new("age", "<", 50)],
//!     Some("name"),
//!     Some("desc"),
//!     None,
//!     None,
//!     Some(&["name", "age"]),
//! )?;
//!
//! let found = users.matching(&criteria).await?;
//! let names: Vec<_> = found.iter().map(|u| u.name.as_str()).collect();
//! assert_eq!(names, ["Alan", "Ada"]);
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod criteria;
pub mod error;
pub mod observability;
pub mod repository;

/// Common imports
pub mod prelude {
    pub use crate::config::{Config, DataSourceConfig, LoggingConfig};
    pub use crate::error::{Error, Result};
    pub use crate::observability::init_tracing;

    pub use crate::criteria::{
        Criteria, CriteriaError, CriteriaRequest, CriteriaResult, Filter, FilterInput,
        FilterOperator, FilterValue, Filters, Order, OrderType,
    };

    pub use crate::repository::{
        CommandBuilder, CriteriaConverter, DataSource, DataSourceRepository, Record, Repository,
        RepositoryError, RepositoryErrorKind, RepositoryMapper, RepositoryResult, RetryPolicy,
        SerdeMapper,
    };

    pub use crate::backends::{InMemoryDataSource, KeyValueCommandBuilder};

    #[cfg(feature = "postgres")]
    pub use crate::backends::postgres::PostgresDataSource;
    pub use crate::backends::postgres::SqlCommandBuilder;

    #[cfg(feature = "dynamodb")]
    pub use crate::backends::dynamodb::DynamoDbDataSource;
    pub use crate::backends::dynamodb::DynamoDbCommandBuilder;

    #[cfg(feature = "elasticsearch")]
    pub use crate::backends::elasticsearch::ElasticsearchDataSource;
    pub use crate::backends::elasticsearch::ElasticsearchCommandBuilder;

    #[cfg(feature = "cache")]
    pub use crate::backends::RedisDataSource;
}
