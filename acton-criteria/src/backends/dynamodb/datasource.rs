//! DynamoDB data source over the AWS SDK

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_json::{Number, Value};
use tokio_util::sync::CancellationToken;

use super::converter::{DynamoDbCommand, DynamoDbQuery};
use crate::config::{DataSourceConfig, DynamoDbConfig};
use crate::repository::{
    CallGuard, DataSource, LazyConnection, Record, RepositoryError, RepositoryErrorKind,
    RepositoryOperation, RepositoryResult, RetryPolicy,
};

type Item = HashMap<String, AttributeValue>;

/// A [`DataSource`] running [`DynamoDbCommand`]s
///
/// The SDK client is built on first use from [`DynamoDbConfig`], falling
/// back to the default AWS provider chain for anything left unset.
#[derive(Debug)]
pub struct DynamoDbDataSource {
    config: DynamoDbConfig,
    client: LazyConnection<Client>,
    guard: CallGuard,
    connect_retry: RetryPolicy,
}

impl DynamoDbDataSource {
    /// A data source that builds its client on first use
    pub fn new(config: DynamoDbConfig, settings: &DataSourceConfig) -> Self {
        Self {
            config,
            client: LazyConnection::new(),
            guard: CallGuard::new(Duration::from_millis(settings.timeout_ms)),
            connect_retry: RetryPolicy::for_connect(settings),
        }
    }

    /// A data source over an existing client
    pub fn from_client(client: Client, settings: &DataSourceConfig) -> Self {
        Self {
            config: DynamoDbConfig::default(),
            client: LazyConnection::connected(client),
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

    /// The SDK client, building it on first use
    pub async fn client(&self) -> RepositoryResult<Client> {
        self.client
            .get_or_connect(|| {
                self.connect_retry
                    .run(RepositoryOperation::Connect, || create_client(&self.config))
            })
            .await
    }

    async fn scan(&self, table: &str, query: &DynamoDbQuery) -> RepositoryResult<Vec<Record>> {
        let client = self.client().await?;
        let values = query
            .expression_attribute_values
            .iter()
            .map(|(placeholder, value)| (placeholder.clone(), to_attribute(value)))
            .collect::<Item>();
        let names = query
            .expression_attribute_names
            .iter()
            .map(|(placeholder, name)| (placeholder.clone(), name.clone()))
            .collect::<HashMap<_, _>>();

        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;
        let mut pages = 0usize;
        loop {
            let request = client
                .scan()
                .table_name(table)
                .set_filter_expression(query.filter_expression.clone())
                .set_expression_attribute_names((!names.is_empty()).then(|| names.clone()))
                .set_expression_attribute_values((!values.is_empty()).then(|| values.clone()))
                .set_exclusive_start_key(start_key.take());

            let output = request
                .send()
                .await
                .map_err(|e| map_sdk_error(RepositoryOperation::Fetch, e))?;
            pages += 1;

            for item in output.items() {
                records.push(from_item(item)?);
            }
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        tracing::debug!(table, pages, records = records.len(), "Scan completed");
        Ok(records)
    }

    async fn get(&self, table: &str, key: &Record) -> RepositoryResult<Option<Record>> {
        let client = self.client().await?;
        let output = client
            .get_item()
            .table_name(table)
            .set_key(Some(to_item(key)))
            .send()
            .await
            .map_err(|e| map_sdk_error(RepositoryOperation::FetchOne, e))?;
        output.item().map(from_item).transpose()
    }
}

impl DataSource for DynamoDbDataSource {
    type Command = DynamoDbCommand;

    const BACKEND: &'static str = "dynamodb";

    async fn execute(&self, command: &DynamoDbCommand) -> RepositoryResult<()> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Execute, async {
                let client = self.client().await?;
                match command {
                    DynamoDbCommand::PutItem { table, item } => {
                        client
                            .put_item()
                            .table_name(table)
                            .set_item(Some(to_item(item)))
                            .send()
                            .await
                            .map_err(|e| map_sdk_error(RepositoryOperation::Execute, e))?;
                    }
                    DynamoDbCommand::DeleteItem { table, key } => {
                        client
                            .delete_item()
                            .table_name(table)
                            .set_key(Some(to_item(key)))
                            .send()
                            .await
                            .map_err(|e| map_sdk_error(RepositoryOperation::Execute, e))?;
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

    async fn fetch_one(&self, command: &DynamoDbCommand) -> RepositoryResult<Option<Record>> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::FetchOne, async {
                match command {
                    DynamoDbCommand::GetItem { table, key } => self.get(table, key).await,
                    DynamoDbCommand::Scan { table, query } => {
                        Ok(self.scan(table, query).await?.into_iter().next())
                    }
                    other => Err(RepositoryError::backend_error(
                        RepositoryOperation::FetchOne,
                        format!("{:?} returns no records", other),
                    )),
                }
            })
            .await
    }

    async fn fetch(&self, command: &DynamoDbCommand) -> RepositoryResult<Vec<Record>> {
        self.guard
            .run(Self::BACKEND, RepositoryOperation::Fetch, async {
                match command {
                    DynamoDbCommand::GetItem { table, key } => {
                        Ok(self.get(table, key).await?.into_iter().collect())
                    }
                    DynamoDbCommand::Scan { table, query } => self.scan(table, query).await,
                    other => Err(RepositoryError::backend_error(
                        RepositoryOperation::Fetch,
                        format!("{:?} returns no records", other),
                    )),
                }
            })
            .await
    }
}

async fn create_client(config: &DynamoDbConfig) -> RepositoryResult<Client> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    match (&config.access_key_id, &config.secret_access_key) {
        (Some(key), Some(secret)) => {
            loader = loader.credentials_provider(Credentials::new(
                key,
                secret,
                None,
                None,
                "acton-criteria",
            ));
        }
        (None, None) => {}
        _ => {
            return Err(RepositoryError::configuration(
                "access_key_id and secret_access_key must be set together",
            )
            .with_backend("dynamodb"))
        }
    }

    let sdk_config = loader.load().await;
    tracing::info!(
        "DynamoDB client created: region={}, endpoint={}",
        sdk_config
            .region()
            .map_or_else(|| "default".to_string(), |r| r.to_string()),
        config.endpoint_url.as_deref().unwrap_or("default")
    );
    Ok(Client::new(&sdk_config))
}

fn map_sdk_error<E, R>(operation: RepositoryOperation, error: SdkError<E, R>) -> RepositoryError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&error).to_string();
    let error = match &error {
        SdkError::TimeoutError(_) => RepositoryError::timeout(operation, message),
        SdkError::DispatchFailure(_) => {
            RepositoryError::connection_failed(message).with_operation(operation)
        }
        SdkError::ConstructionFailure(_) => {
            RepositoryError::configuration(message).with_operation(operation)
        }
        SdkError::ResponseError(_) => RepositoryError::serialization(operation, message),
        _ => match error.code() {
            // The service rejected the expression itself
            Some("ValidationException") => {
                RepositoryError::new(operation, RepositoryErrorKind::Translation, message)
            }
            _ => RepositoryError::backend_error(operation, message),
        },
    };
    error.with_backend("dynamodb")
}

fn to_item(record: &Record) -> Item {
    record
        .iter()
        .map(|(name, value)| (name.clone(), to_attribute(value)))
        .collect()
}

fn from_item(item: &Item) -> RepositoryResult<Record> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), from_attribute(value)?)))
        .collect()
}

fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(to_item(map)),
    }
}

fn from_attribute(value: &AttributeValue) -> RepositoryResult<Value> {
    Ok(match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n)?,
        AttributeValue::Ss(items) => items.iter().cloned().map(Value::String).collect(),
        AttributeValue::Ns(items) => items
            .iter()
            .map(|n| parse_number(n))
            .collect::<RepositoryResult<_>>()?,
        AttributeValue::L(items) => items
            .iter()
            .map(from_attribute)
            .collect::<RepositoryResult<_>>()?,
        AttributeValue::M(map) => Value::Object(from_item(map)?),
        other => {
            return Err(RepositoryError::serialization(
                RepositoryOperation::Fetch,
                format!("Unsupported attribute value {:?}", other),
            )
            .with_backend("dynamodb"))
        }
    })
}

fn parse_number(n: &str) -> RepositoryResult<Value> {
    if let Ok(integer) = n.parse::<i64>() {
        return Ok(Value::from(integer));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| {
            RepositoryError::serialization(
                RepositoryOperation::Fetch,
                format!("'{}' is not a representable number", n),
            )
            .with_backend("dynamodb")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_conversion_preserves_shape() {
        let record = match json!({
            "id": "u1",
            "age": 42,
            "score": 1.5,
            "active": true,
            "deleted_at": null,
            "tags": ["a", "b"],
            "address": {"city": "Berlin"}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let item = to_item(&record);
        assert_eq!(item["age"], AttributeValue::N("42".into()));
        assert_eq!(item["deleted_at"], AttributeValue::Null(true));
        assert_eq!(from_item(&item).unwrap(), record);
    }

    #[test]
    fn test_stored_none_field_matches_null_equality() {
        use crate::backends::dynamodb::{DynamoDbCriteriaConverter, NULL_TYPE};
        use crate::criteria::{Criteria, Filter};
        use crate::repository::CriteriaConverter;

        let record = match json!({"id": "u1", "deleted_at": null}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let item = to_item(&record);
        assert_eq!(item["deleted_at"], AttributeValue::Null(true));

        // The stored attribute exists, so only the type check can match it
        let query = DynamoDbCriteriaConverter
            .convert(&Criteria::from_filter(
                Filter::eq("deleted_at", None::<String>).unwrap(),
            ))
            .unwrap();
        assert_eq!(
            query.filter_expression.as_deref(),
            Some("(attribute_not_exists(#f0) OR attribute_type(#f0, :v0))")
        );
        assert_eq!(query.expression_attribute_names["#f0"], "deleted_at");
        assert_eq!(
            to_attribute(&query.expression_attribute_values[":v0"]),
            AttributeValue::S(NULL_TYPE.to_string())
        );
    }

    #[test]
    fn test_number_sets_decode_as_arrays() {
        let value = AttributeValue::Ns(vec!["1".into(), "2.5".into()]);
        assert_eq!(from_attribute(&value).unwrap(), json!([1, 2.5]));
        assert!(parse_number("NaN").is_err());
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_building_client() {
        let token = CancellationToken::new();
        token.cancel();
        let source =
            DynamoDbDataSource::new(DynamoDbConfig::default(), &DataSourceConfig::default())
                .with_cancellation(token);

        let mut item = Record::new();
        item.insert("id".into(), json!("u1"));
        let command = DynamoDbCommand::PutItem {
            table: "users".into(),
            item,
        };
        let error = source.execute(&command).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Cancelled);
        assert_eq!(source.client.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_half_configured_credentials_are_rejected() {
        let config = DynamoDbConfig {
            access_key_id: Some("key".into()),
            ..DynamoDbConfig::default()
        };
        let error = create_client(&config).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Configuration);
    }
}
