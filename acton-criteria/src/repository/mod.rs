//! Repository abstraction over pluggable data sources
//!
//! A [`Repository`] stores and queries aggregates. The generic
//! [`DataSourceRepository`] implements it for any backend by combining:
//!
//! - a [`DataSource`] that executes backend commands
//! - a [`CommandBuilder`] that turns ids, records and [`Criteria`] into those commands
//! - a [`RepositoryMapper`] that converts between aggregates and [`Record`]s
//!
//! [`Criteria`]: crate::criteria::Criteria

mod connection;
mod error;
mod generic;
mod mapper;
mod plan;
mod retry;
mod traits;

pub use connection::{CallGuard, LazyConnection};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use generic::DataSourceRepository;
pub use mapper::{FnMapper, SerdeMapper};
pub use plan::{QueryPlan, Residual};
pub use retry::RetryPolicy;
pub use traits::{
    CommandBuilder, CriteriaConverter, DataSource, Record, Repository, RepositoryMapper,
    RepositoryResult,
};

pub use crate::backends::memory::InMemoryDataSource;
