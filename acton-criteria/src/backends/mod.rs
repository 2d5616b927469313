//! Storage backends
//!
//! Each backend pairs a criteria converter and command builder (always
//! compiled, no I/O) with a [`DataSource`](crate::repository::DataSource)
//! behind its cargo feature:
//!
//! | Backend | Commands | Data source | Feature |
//! |---|---|---|---|
//! | PostgreSQL | [`postgres::SqlCommandBuilder`] | `PostgresDataSource` | `postgres` |
//! | DynamoDB | [`dynamodb::DynamoDbCommandBuilder`] | `DynamoDbDataSource` | `dynamodb` |
//! | Elasticsearch | [`elasticsearch::ElasticsearchCommandBuilder`] | `ElasticsearchDataSource` | `elasticsearch` |
//! | Redis | [`KeyValueCommandBuilder`] | `RedisDataSource` | `cache` |
//! | In-memory | [`KeyValueCommandBuilder`] | [`InMemoryDataSource`] | always |

pub mod dynamodb;
pub mod elasticsearch;
pub mod key_value;
pub mod memory;
pub mod postgres;
#[cfg(feature = "cache")]
pub mod redis;

pub use key_value::{KeyValueCommand, KeyValueCommandBuilder, DEFAULT_ID_FIELD};
pub use memory::InMemoryDataSource;
#[cfg(feature = "cache")]
pub use redis::RedisDataSource;
