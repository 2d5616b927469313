//! Connection lifecycle helpers shared by every data source
//!
//! - [`LazyConnection`]: a connection slot filled on first use, exactly once
//!   even under concurrent first use
//! - [`CallGuard`]: bounds every backend call with a timeout and an optional
//!   cancellation token

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::error::{RepositoryError, RepositoryOperation};
use super::traits::RepositoryResult;

/// A lazily established, reused connection (client or pool)
///
/// The fast path takes a read lock. On a miss the write lock is taken and
/// the slot checked again, so concurrent first callers run the connect
/// function exactly once and all receive the same connection.
///
/// # Example
///
/// ```rust
/// use acton_criteria::repository::LazyConnection;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let slot: LazyConnection<String> = LazyConnection::new();
/// let conn = slot
///     .get_or_connect(|| async { Ok("client".to_string()) })
///     .await
///     .unwrap();
/// assert_eq!(conn, "client");
/// assert_eq!(slot.connect_count(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct LazyConnection<C> {
    slot: RwLock<Option<C>>,
    connects: AtomicUsize,
}

impl<C> Default for LazyConnection<C> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
            connects: AtomicUsize::new(0),
        }
    }
}

impl<C: Clone> LazyConnection<C> {
    /// An empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot pre-filled with an existing connection
    pub fn connected(connection: C) -> Self {
        Self {
            slot: RwLock::new(Some(connection)),
            connects: AtomicUsize::new(0),
        }
    }

    /// Return the connection, establishing it on first use
    ///
    /// A failed connect leaves the slot empty so a later call can retry.
    pub async fn get_or_connect<F, Fut>(&self, connect: F) -> RepositoryResult<C>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepositoryResult<C>>,
    {
        if let Some(connection) = self.slot.read().await.as_ref() {
            return Ok(connection.clone());
        }

        let mut slot = self.slot.write().await;
        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }

        let connection = connect().await?;
        self.connects.fetch_add(1, Ordering::Relaxed);
        *slot = Some(connection.clone());
        Ok(connection)
    }

    /// The current connection, if established
    pub async fn current(&self) -> Option<C> {
        self.slot.read().await.clone()
    }

    /// Whether a connection is established
    pub async fn is_connected(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Drop the current connection so the next call reconnects
    pub async fn reset(&self) -> Option<C> {
        self.slot.write().await.take()
    }

    /// Number of successful connects performed by this slot
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }
}

/// Timeout and cancellation applied to every backend call
#[derive(Debug, Clone)]
pub struct CallGuard {
    timeout: Duration,
    cancellation: Option<CancellationToken>,
}

impl CallGuard {
    /// A guard with the given timeout and no cancellation token
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancellation: None,
        }
    }

    /// Attach a cancellation token
    ///
    /// Cancelling the token aborts every in-flight call made through this
    /// guard and fails later calls immediately.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The attached cancellation token, if any
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Run `call` under the timeout and cancellation token
    ///
    /// Exceeding the timeout yields a retriable `Timeout` error; cancellation
    /// yields `Cancelled`.
    pub async fn run<T, F>(
        &self,
        backend: &'static str,
        operation: RepositoryOperation,
        call: F,
    ) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        let cancelled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => {
                tracing::debug!(backend, %operation, "Backend call cancelled");
                Err(RepositoryError::cancelled(operation).with_backend(backend))
            }
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(result) => result.map_err(|e| e.with_backend(backend)),
                Err(_) => {
                    tracing::warn!(
                        backend,
                        %operation,
                        "Backend call timed out after {:?}",
                        self.timeout
                    );
                    Err(RepositoryError::timeout(
                        operation,
                        format!("No response within {:?}", self.timeout),
                    )
                    .with_backend(backend))
                }
            },
        }
    }
}

impl Default for CallGuard {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_TIMEOUT_MS))
    }
}
