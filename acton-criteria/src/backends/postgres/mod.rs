//! PostgreSQL backend
//!
//! [`SqlCriteriaConverter`] and [`SqlCommandBuilder`] are pure and always
//! available; [`PostgresDataSource`] requires the `postgres` feature.

mod converter;
#[cfg(feature = "postgres")]
mod datasource;

pub use converter::{
    escape_like, quote_identifier, quote_table, SqlCommandBuilder, SqlCriteriaConverter,
    SqlParam, SqlQuery, SqlStatement,
};
#[cfg(feature = "postgres")]
pub use datasource::PostgresDataSource;
