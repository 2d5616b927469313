//! PostgreSQL data source over a lazily created sqlx pool

use std::time::Duration;

use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};
use tokio_util::sync::CancellationToken;

use super::converter::{SqlParam, SqlStatement};
use crate::config::{DataSourceConfig, PostgresConfig};
use crate::repository::{
    CallGuard, DataSource, LazyConnection, Record, RepositoryError, RepositoryOperation,
    RepositoryResult, RetryPolicy,
};

/// A [`DataSource`] running [`SqlStatement`]s against PostgreSQL
///
/// The pool is created on first use, with retries, and shared by every
/// later call. Statements built by [`SqlCommandBuilder`] return a single
/// JSON column named `record`.
///
/// [`SqlCommandBuilder`]: super::SqlCommandBuilder
#[derive(Debug)]
pub struct PostgresDataSource {
    config: PostgresConfig,
    pool: LazyConnection<PgPool>,
    guard: CallGuard,
    connect_retry: RetryPolicy,
}

impl PostgresDataSource {
    /// A data source that connects on first use
    pub fn new(config: PostgresConfig, settings: &DataSourceConfig) -> Self {
        Self {
            config,
            pool: LazyConnection::new(),
            guard: CallGuard::new(Duration::from_millis(settings.timeout_ms)),
            connect_retry: RetryPolicy::for_connect(settings),
        }
    }

    /// A data source over an existing pool
    pub fn from_pool(pool: PgPool, settings: &DataSourceConfig) -> Self {
        Self {
            config: PostgresConfig::default(),
            pool: LazyConnection::connected(pool),
            guard: CallGuard::new(Duration::from_millis(settings.timeout_ms)),
            connect_retry: RetryPolicy::none(),
        }
    }

    /// Abort in-flight calls once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.guard = self.guard.with_cancellation(token);
        self
    }

    /// The pool, creating it on first use
    pub async fn pool(&self) -> RepositoryResult<PgPool> {
        self.pool
            .get_or_connect(|| {
                self.connect_retry
                    .run(RepositoryOperation::Connect, || try_create_pool(&self.config))
            })
            .await
    }

    async fn rows(&self, statement: &SqlStatement) -> RepositoryResult<Vec<PgRow>> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Fetch, async {
                let pool = self.pool().await?;
                bind_params(sqlx::query(&statement.sql), &statement.params)
                    .fetch_all(&pool)
                    .await
                    .map_err(|e| map_sqlx_error(RepositoryOperation::Fetch, e))
            })
            .await
    }
}

impl DataSource for PostgresDataSource {
    type Command = SqlStatement;

    const BACKEND: &'static str = "postgres";

    async fn execute(&self, command: &SqlStatement) -> RepositoryResult<()> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Execute, async {
                let pool = self.pool().await?;
                let result = bind_params(sqlx::query(&command.sql), &command.params)
                    .execute(&pool)
                    .await
                    .map_err(|e| map_sqlx_error(RepositoryOperation::Execute, e))?;
                tracing::debug!(rows_affected = result.rows_affected(), "Statement executed");
                Ok(())
            })
            .await
    }

    async fn fetch_one(&self, command: &SqlStatement) -> RepositoryResult<Option<Record>> {
        let row = self
            .guard
            .run(Self::BACKEND, RepositoryOperation::FetchOne, async {
                let pool = self.pool().await?;
                bind_params(sqlx::query(&command.sql), &command.params)
                    .fetch_optional(&pool)
                    .await
                    .map_err(|e| map_sqlx_error(RepositoryOperation::FetchOne, e))
            })
            .await?;
        row.as_ref().map(decode_record).transpose()
    }

    async fn fetch(&self, command: &SqlStatement) -> RepositoryResult<Vec<Record>> {
        self.rows(command).await?.iter().map(decode_record).collect()
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(b) => query.bind(*b),
            SqlParam::Integer(n) => query.bind(*n),
            SqlParam::Float(n) => query.bind(*n),
            SqlParam::Text(s) => query.bind(s.as_str()),
            SqlParam::Json(value) => query.bind(Json(value)),
        };
    }
    query
}

fn decode_record(row: &PgRow) -> RepositoryResult<Record> {
    let Json(value): Json<Value> = row
        .try_get("record")
        .map_err(|e| map_sqlx_error(RepositoryOperation::Fetch, e))?;
    match value {
        Value::Object(record) => Ok(record),
        other => Err(RepositoryError::serialization(
            RepositoryOperation::Fetch,
            format!("Expected a JSON object per row, got {}", other),
        )),
    }
}

/// Attempt to create a pool (single try)
async fn try_create_pool(config: &PostgresConfig) -> RepositoryResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| {
            RepositoryError::connection_failed(format!(
                "Failed to connect to database at '{}': {} ({})",
                sanitize_connection_url(&config.url),
                categorize_db_error(&e),
                e
            ))
            .with_backend("postgres")
        })?;

    tracing::info!(
        "Database connection pool created: max={}, min={}",
        config.max_connections,
        config.min_connections
    );
    Ok(pool)
}

fn map_sqlx_error(operation: RepositoryOperation, error: sqlx::Error) -> RepositoryError {
    use sqlx::Error;
    let message = format!("{}: {}", categorize_db_error(&error), error);
    match error {
        Error::Io(_)
        | Error::Tls(_)
        | Error::PoolTimedOut
        | Error::PoolClosed
        | Error::WorkerCrashed => {
            RepositoryError::connection_failed(message).with_operation(operation)
        }
        Error::ColumnDecode { .. }
        | Error::ColumnNotFound(_)
        | Error::Decode(_)
        | Error::Encode(_) => RepositoryError::serialization(operation, message),
        Error::Configuration(_) => {
            RepositoryError::configuration(message).with_operation(operation)
        }
        _ => RepositoryError::backend_error(operation, message),
    }
}

/// Sanitize connection URL for safe logging (remove password)
pub(crate) fn sanitize_connection_url(url: &str) -> String {
    if let (Some(at_pos), Some(scheme_end)) = (url.rfind('@'), url.find("://")) {
        let credentials = &url[scheme_end + 3..at_pos];
        if let Some(colon_pos) = credentials.find(':') {
            return format!(
                "{}{}:***{}",
                &url[..scheme_end + 3],
                &credentials[..colon_pos],
                &url[at_pos..]
            );
        }
    }
    url.to_string()
}

/// Categorize database error for better user guidance
fn categorize_db_error(err: &sqlx::Error) -> &'static str {
    use sqlx::Error;
    match err {
        Error::Configuration(_) => "Configuration error",
        Error::Database(_) => "Database query error",
        Error::Io(_) => "Network I/O error - check connectivity",
        Error::Tls(_) => "TLS/SSL error - check certificate configuration",
        Error::PoolTimedOut => "Connection pool timeout - database may be overloaded",
        Error::PoolClosed => "Connection pool closed",
        Error::WorkerCrashed => "Database worker crashed",
        _ => "Database error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;

    #[test]
    fn test_sanitize_connection_url() {
        assert_eq!(
            sanitize_connection_url("postgres://app:s3cret@db:5432/main"),
            "postgres://app:***@db:5432/main"
        );
        assert_eq!(
            sanitize_connection_url("postgres://localhost/main"),
            "postgres://localhost/main"
        );
    }

    #[test]
    fn test_pool_errors_are_retriable() {
        let error = map_sqlx_error(RepositoryOperation::Fetch, sqlx::Error::PoolTimedOut);
        assert_eq!(error.kind, RepositoryErrorKind::ConnectionFailed);
        assert_eq!(error.operation, RepositoryOperation::Fetch);
        assert!(error.is_retriable());
    }

    #[test]
    fn test_missing_column_is_serialization_error() {
        let error = map_sqlx_error(
            RepositoryOperation::Fetch,
            sqlx::Error::ColumnNotFound("record".into()),
        );
        assert_eq!(error.kind, RepositoryErrorKind::Serialization);
        assert!(!error.is_retriable());
    }

    #[tokio::test]
    async fn test_pool_is_not_created_until_first_use() {
        let source = PostgresDataSource::new(
            PostgresConfig {
                url: "postgres://app:pw@127.0.0.1:1/none".into(),
                ..PostgresConfig::default()
            },
            &DataSourceConfig::default(),
        );
        assert!(!source.pool.is_connected().await);
        assert_eq!(source.pool.connect_count(), 0);
    }

    fn unreachable_source(settings: &DataSourceConfig) -> PostgresDataSource {
        PostgresDataSource::new(
            PostgresConfig {
                url: "postgres://app:pw@127.0.0.1:1/none".into(),
                ..PostgresConfig::default()
            },
            settings,
        )
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_connecting() {
        let token = CancellationToken::new();
        token.cancel();
        let source =
            unreachable_source(&DataSourceConfig::default()).with_cancellation(token);

        let statement = SqlStatement {
            sql: "SELECT 1".into(),
            params: Vec::new(),
        };
        let error = source.execute(&statement).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Cancelled);
        let error = source.fetch(&statement).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Cancelled);
        assert_eq!(source.pool.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_setup_counts_against_call_timeout() {
        // Connect retries back off far longer than the call may take
        let settings = DataSourceConfig {
            timeout_ms: 50,
            retry_delay_ms: 10_000,
            ..DataSourceConfig::default()
        };
        let source = unreachable_source(&settings);

        let statement = SqlStatement {
            sql: "SELECT 1".into(),
            params: Vec::new(),
        };
        let started = std::time::Instant::now();
        let error = source.fetch_one(&statement).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
