//! Redis data source
//!
//! Records are stored as JSON strings under `{collection}:{id}`. Prefix scans
//! use `SCAN MATCH` over the collection's key space followed by `MGET`.
//! Collection names may not contain `:`, so no collection's key space
//! overlaps another's.

use std::ops::DerefMut;
use std::time::Duration;

use deadpool_redis::{Config as DeadpoolConfig, Connection, Pool, Runtime};
use redis::{cmd, RedisError};
use tokio_util::sync::CancellationToken;

use super::key_value::KeyValueCommand;
use crate::config::{DataSourceConfig, RedisConfig};
use crate::repository::{
    CallGuard, DataSource, LazyConnection, Record, RepositoryError, RepositoryOperation,
    RepositoryResult, RetryPolicy,
};

/// Keys requested per `SCAN` round trip
const SCAN_COUNT: usize = 100;

/// A [`DataSource`] running [`KeyValueCommand`]s against Redis
#[derive(Debug)]
pub struct RedisDataSource {
    config: RedisConfig,
    pool: LazyConnection<Pool>,
    guard: CallGuard,
    connect_retry: RetryPolicy,
}

impl RedisDataSource {
    /// A data source that creates its pool on first use
    pub fn new(config: RedisConfig, settings: &DataSourceConfig) -> Self {
        Self {
            config,
            pool: LazyConnection::new(),
            guard: CallGuard::new(Duration::from_millis(settings.timeout_ms)),
            connect_retry: RetryPolicy::for_connect(settings),
        }
    }

    /// A data source over an existing pool
    pub fn from_pool(pool: Pool, config: RedisConfig, settings: &DataSourceConfig) -> Self {
        Self {
            config,
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

    async fn connection(&self, operation: RepositoryOperation) -> RepositoryResult<Connection> {
        let pool = self
            .pool
            .get_or_connect(|| {
                self.connect_retry
                    .run(RepositoryOperation::Connect, || try_create_pool(&self.config))
            })
            .await?;
        pool.get().await.map_err(|e| {
            RepositoryError::connection_failed(format!("Failed to get Redis connection: {}", e))
                .with_operation(operation)
                .with_backend("redis")
        })
    }

    async fn put(&self, collection: &str, id: &str, record: &Record) -> RepositoryResult<()> {
        let payload = serde_json::to_string(record).map_err(|e| {
            RepositoryError::serialization(RepositoryOperation::Execute, e.to_string())
                .with_backend("redis")
        })?;
        let key = record_key(collection, id)?;
        let mut conn = self.connection(RepositoryOperation::Execute).await?;

        let mut command = cmd("SET");
        command.arg(key).arg(payload);
        if let Some(ttl) = self.config.ttl_secs {
            command.arg("EX").arg(ttl);
        }
        let _: () = command
            .query_async(conn.deref_mut())
            .await
            .map_err(|e| map_redis_error(RepositoryOperation::Execute, e))?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> RepositoryResult<Option<Record>> {
        let key = record_key(collection, id)?;
        let mut conn = self.connection(RepositoryOperation::FetchOne).await?;
        let payload: Option<String> = cmd("GET")
            .arg(key)
            .query_async(conn.deref_mut())
            .await
            .map_err(|e| map_redis_error(RepositoryOperation::FetchOne, e))?;
        payload
            .map(|p| decode(RepositoryOperation::FetchOne, &p))
            .transpose()
    }

    async fn scan(&self, collection: &str, prefix: Option<&str>) -> RepositoryResult<Vec<Record>> {
        let pattern = format!(
            "{}*",
            escape_glob(&record_key(collection, prefix.unwrap_or_default())?)
        );
        let mut conn = self.connection(RepositoryOperation::Fetch).await?;

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(conn.deref_mut())
                .await
                .map_err(|e| map_redis_error(RepositoryOperation::Fetch, e))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();

        let mut records = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(SCAN_COUNT) {
            let payloads: Vec<Option<String>> = cmd("MGET")
                .arg(chunk)
                .query_async(conn.deref_mut())
                .await
                .map_err(|e| map_redis_error(RepositoryOperation::Fetch, e))?;
            // Keys expiring between SCAN and MGET come back as nil
            for payload in payloads.into_iter().flatten() {
                records.push(decode(RepositoryOperation::Fetch, &payload)?);
            }
        }

        tracing::debug!(pattern = %pattern, keys = keys.len(), "Scan completed");
        Ok(records)
    }

    async fn remove(&self, collection: &str, id: &str) -> RepositoryResult<()> {
        let key = record_key(collection, id)?;
        let mut conn = self.connection(RepositoryOperation::Execute).await?;
        let _: u64 = cmd("DEL")
            .arg(key)
            .query_async(conn.deref_mut())
            .await
            .map_err(|e| map_redis_error(RepositoryOperation::Execute, e))?;
        Ok(())
    }
}

impl DataSource for RedisDataSource {
    type Command = KeyValueCommand;

    const BACKEND: &'static str = "redis";

    async fn execute(&self, command: &KeyValueCommand) -> RepositoryResult<()> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Execute, async {
                match command {
                    KeyValueCommand::Put {
                        collection,
                        id,
                        record,
                    } => self.put(collection, id, record).await,
                    KeyValueCommand::Delete { collection, id } => {
                        self.remove(collection, id).await
                    }
                    other => Err(RepositoryError::backend_error(
                        RepositoryOperation::Execute,
                        format!("{:?} returns records; use fetch", other),
                    )),
                }
            })
            .await
    }

    async fn fetch_one(&self, command: &KeyValueCommand) -> RepositoryResult<Option<Record>> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::FetchOne, async {
                match command {
                    KeyValueCommand::Get { collection, id } => self.get(collection, id).await,
                    KeyValueCommand::Scan { collection, prefix } => Ok(self
                        .scan(collection, prefix.as_deref())
                        .await?
                        .into_iter()
                        .next()),
                    other => Err(RepositoryError::backend_error(
                        RepositoryOperation::FetchOne,
                        format!("{:?} returns no records", other),
                    )),
                }
            })
            .await
    }

    async fn fetch(&self, command: &KeyValueCommand) -> RepositoryResult<Vec<Record>> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Fetch, async {
                match command {
                    KeyValueCommand::Get { collection, id } => {
                        Ok(self.get(collection, id).await?.into_iter().collect())
                    }
                    KeyValueCommand::Scan { collection, prefix } => {
                        self.scan(collection, prefix.as_deref()).await
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

/// Attempt to create a Redis pool (single try)
async fn try_create_pool(config: &RedisConfig) -> RepositoryResult<Pool> {
    let pool = DeadpoolConfig::from_url(&config.url)
        .builder()
        .map_err(|e| {
            RepositoryError::configuration(format!("Failed to build Redis pool: {}", e))
                .with_backend("redis")
        })?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| {
            RepositoryError::configuration(format!("Failed to create Redis pool: {}", e))
                .with_backend("redis")
        })?;

    // Test the connection
    let conn = pool.get().await.map_err(|e| {
        RepositoryError::connection_failed(format!("Failed to get Redis connection: {}", e))
            .with_backend("redis")
    })?;
    drop(conn);

    tracing::info!(
        "Redis connection pool created: max_connections={}",
        config.max_connections
    );
    Ok(pool)
}

fn record_key(collection: &str, id: &str) -> RepositoryResult<String> {
    if collection.is_empty() || collection.contains(':') {
        return Err(RepositoryError::validation(format!(
            "Collection name '{}' must be non-empty and free of ':'",
            collection
        ))
        .with_backend("redis"));
    }
    Ok(format!("{}:{}", collection, id))
}

/// Escape glob metacharacters so `SCAN MATCH` treats them literally
fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn decode(operation: RepositoryOperation, payload: &str) -> RepositoryResult<Record> {
    serde_json::from_str(payload).map_err(|e| {
        RepositoryError::serialization(operation, format!("Stored value is not a record: {}", e))
            .with_backend("redis")
    })
}

fn map_redis_error(operation: RepositoryOperation, error: RedisError) -> RepositoryError {
    let error = if error.is_timeout() {
        RepositoryError::timeout(operation, error.to_string())
    } else if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal()
    {
        RepositoryError::connection_failed(error.to_string()).with_operation(operation)
    } else {
        RepositoryError::backend_error(operation, error.to_string())
    };
    error.with_backend("redis")
}
