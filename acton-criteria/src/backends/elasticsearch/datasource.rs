//! Elasticsearch data source

use std::fmt;
use std::time::Duration;

use ::elasticsearch::auth::Credentials;
use ::elasticsearch::http::response::Response;
use ::elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use ::elasticsearch::params::Refresh;
use ::elasticsearch::{DeleteParts, Elasticsearch, GetParts, IndexParts, SearchParts};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::converter::ElasticsearchCommand;
use crate::config::{DataSourceConfig, ElasticsearchConfig};
use crate::repository::{
    CallGuard, DataSource, LazyConnection, Record, RepositoryError, RepositoryErrorKind,
    RepositoryOperation, RepositoryResult,
};

/// A [`DataSource`] running [`ElasticsearchCommand`]s against one node
///
/// The client is built on first use. Building it sends no request, so a
/// failure here is always a configuration error and is not retried.
pub struct ElasticsearchDataSource {
    client: LazyConnection<Elasticsearch>,
    config: ElasticsearchConfig,
    guard: CallGuard,
}

impl fmt::Debug for ElasticsearchDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticsearchDataSource")
            .field("url", &self.config.url)
            .field("refresh", &self.config.refresh)
            .field("guard", &self.guard)
            .finish()
    }
}

impl ElasticsearchDataSource {
    /// A data source that builds its client on first use
    pub fn new(config: ElasticsearchConfig, settings: &DataSourceConfig) -> Self {
        Self {
            client: LazyConnection::new(),
            config,
            guard: CallGuard::new(Duration::from_millis(settings.timeout_ms)),
        }
    }

    /// A data source over an existing client
    ///
    /// `config` still decides the refresh policy of writes.
    pub fn from_client(
        client: Elasticsearch,
        config: ElasticsearchConfig,
        settings: &DataSourceConfig,
    ) -> Self {
        Self {
            client: LazyConnection::connected(client),
            config,
            guard: CallGuard::new(Duration::from_millis(settings.timeout_ms)),
        }
    }

    /// The client, building it on first use
    pub async fn client(&self) -> RepositoryResult<Elasticsearch> {
        self.client
            .get_or_connect(|| async { build_client(&self.config, self.guard.timeout()) })
            .await
    }

    /// Abort in-flight calls once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.guard = self.guard.with_cancellation(token);
        self
    }

    fn refresh(&self) -> Refresh {
        if self.config.refresh {
            Refresh::WaitFor
        } else {
            Refresh::False
        }
    }

    async fn get(&self, index: &str, id: &str) -> RepositoryResult<Option<Record>> {
        let client = self.client().await?;
        let response = client
            .get(GetParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| map_transport_error(RepositoryOperation::FetchOne, e))?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        let body = success_body(RepositoryOperation::FetchOne, response).await?;
        source_of(&body).transpose()
    }

    async fn search(&self, index: &str, body: &Value) -> RepositoryResult<Vec<Record>> {
        let client = self.client().await?;
        let response = client
            .search(SearchParts::Index(&[index]))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| map_transport_error(RepositoryOperation::Fetch, e))?;

        if response.status_code().as_u16() == 404 {
            tracing::debug!(index, "Index does not exist; search returns no records");
            return Ok(Vec::new());
        }
        let result = success_body(RepositoryOperation::Fetch, response).await?;

        let hits = result
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(|h| h.as_array())
            .cloned()
            .unwrap_or_default();

        tracing::debug!(
            index,
            took_ms = result.get("took").and_then(Value::as_u64),
            hits = hits.len(),
            "Search completed"
        );
        hits.iter().filter_map(source_of).collect()
    }
}

impl DataSource for ElasticsearchDataSource {
    type Command = ElasticsearchCommand;

    const BACKEND: &'static str = "elasticsearch";

    async fn execute(&self, command: &ElasticsearchCommand) -> RepositoryResult<()> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Execute, async {
                let client = self.client().await?;
                match command {
                    ElasticsearchCommand::Index {
                        index,
                        id,
                        document,
                    } => {
                        let response = client
                            .index(IndexParts::IndexId(index, id))
                            .body(document)
                            .refresh(self.refresh())
                            .send()
                            .await
                            .map_err(|e| map_transport_error(RepositoryOperation::Execute, e))?;
                        success_body(RepositoryOperation::Execute, response).await?;
                    }
                    ElasticsearchCommand::Delete { index, id } => {
                        let response = client
                            .delete(DeleteParts::IndexId(index, id))
                            .refresh(self.refresh())
                            .send()
                            .await
                            .map_err(|e| map_transport_error(RepositoryOperation::Execute, e))?;
                        // Deleting a missing document succeeds
                        if response.status_code().as_u16() != 404 {
                            success_body(RepositoryOperation::Execute, response).await?;
                        }
                    }
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

    async fn fetch_one(&self, command: &ElasticsearchCommand) -> RepositoryResult<Option<Record>> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::FetchOne, async {
                match command {
                    ElasticsearchCommand::Get { index, id } => self.get(index, id).await,
                    ElasticsearchCommand::Search { index, body } => {
                        Ok(self.search(index, body).await?.into_iter().next())
                    }
                    other => Err(RepositoryError::backend_error(
                        RepositoryOperation::FetchOne,
                        format!("{:?} returns no records", other),
                    )),
                }
            })
            .await
    }

    async fn fetch(&self, command: &ElasticsearchCommand) -> RepositoryResult<Vec<Record>> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Fetch, async {
                match command {
                    ElasticsearchCommand::Get { index, id } => {
                        Ok(self.get(index, id).await?.into_iter().collect())
                    }
                    ElasticsearchCommand::Search { index, body } => {
                        self.search(index, body).await
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

fn build_client(config: &ElasticsearchConfig, timeout: Duration) -> RepositoryResult<Elasticsearch> {
    let url: ::elasticsearch::http::Url = config.url.parse().map_err(|e| {
        RepositoryError::configuration(format!("Invalid URL '{}': {}", config.url, e))
            .with_backend("elasticsearch")
    })?;

    let mut builder =
        TransportBuilder::new(SingleNodeConnectionPool::new(url)).timeout(timeout);
    match (&config.username, &config.password) {
        (Some(username), Some(password)) => {
            builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
        }
        (None, None) => {}
        _ => {
            return Err(RepositoryError::configuration(
                "username and password must be set together",
            )
            .with_backend("elasticsearch"))
        }
    }

    let transport = builder.build().map_err(|e| {
        RepositoryError::configuration(format!("Failed to build transport: {}", e))
            .with_backend("elasticsearch")
    })?;
    tracing::info!("Elasticsearch client created: url={}", config.url);
    Ok(Elasticsearch::new(transport))
}

/// The JSON body of a successful response, or the error it describes
async fn success_body(operation: RepositoryOperation, response: Response) -> RepositoryResult<Value> {
    let status = response.status_code();
    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|e| map_transport_error(operation, e));
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("Request failed (status {}): {}", status, body);
    let error = match status.as_u16() {
        400 => RepositoryError::new(operation, RepositoryErrorKind::Translation, message),
        429 | 502 | 503 | 504 => {
            RepositoryError::connection_failed(message).with_operation(operation)
        }
        _ => RepositoryError::backend_error(operation, message),
    };
    Err(error.with_backend("elasticsearch"))
}

fn map_transport_error(
    operation: RepositoryOperation,
    error: ::elasticsearch::Error,
) -> RepositoryError {
    let error = if error.is_timeout() {
        RepositoryError::timeout(operation, error.to_string())
    } else if error.is_json() {
        RepositoryError::serialization(operation, error.to_string())
    } else {
        RepositoryError::connection_failed(error.to_string()).with_operation(operation)
    };
    error.with_backend("elasticsearch")
}

/// A document's `_source`; `None` when the document was not found
fn source_of(document: &Value) -> Option<RepositoryResult<Record>> {
    if document.get("found").and_then(Value::as_bool) == Some(false) {
        return None;
    }
    match document.get("_source") {
        Some(Value::Object(source)) => Some(Ok(source.clone())),
        Some(other) => Some(Err(RepositoryError::serialization(
            RepositoryOperation::Fetch,
            format!("Expected an object as _source, got {}", other),
        )
        .with_backend("elasticsearch"))),
        None => Some(Err(RepositoryError::serialization(
            RepositoryOperation::Fetch,
            "Document has no _source; is _source disabled for the index?",
        )
        .with_backend("elasticsearch"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_of() {
        let hit = json!({"_id": "1", "_source": {"id": "1", "name": "Ada"}});
        let record = source_of(&hit).unwrap().unwrap();
        assert_eq!(record["name"], "Ada");

        assert!(source_of(&json!({"found": false})).is_none());
        assert!(source_of(&json!({"_id": "1"})).unwrap().is_err());
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let config = ElasticsearchConfig {
            url: "not a url".into(),
            ..ElasticsearchConfig::default()
        };
        let source = ElasticsearchDataSource::new(config, &DataSourceConfig::default());
        let error = source.client().await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Configuration);
        assert_eq!(error.backend.as_deref(), Some("elasticsearch"));
        assert!(!source.client.is_connected().await);
    }

    #[tokio::test]
    async fn test_client_is_built_once_on_first_use() {
        let source = ElasticsearchDataSource::new(
            ElasticsearchConfig::default(),
            &DataSourceConfig::default(),
        );
        assert!(format!("{:?}", source).contains("localhost:9200"));
        assert!(!source.client.is_connected().await);

        source.client().await.unwrap();
        source.client().await.unwrap();
        assert_eq!(source.client.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_half_configured_credentials_are_rejected() {
        let config = ElasticsearchConfig {
            username: Some("elastic".into()),
            ..ElasticsearchConfig::default()
        };
        let source = ElasticsearchDataSource::new(config, &DataSourceConfig::default());
        let command = ElasticsearchCommand::Get {
            index: "users".into(),
            id: "1".into(),
        };
        let error = source.fetch(&command).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Configuration);
    }
}
