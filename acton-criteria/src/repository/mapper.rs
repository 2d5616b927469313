//! Ready-made [`RepositoryMapper`] implementations

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation};
use super::traits::{Record, RepositoryMapper, RepositoryResult};

/// Maps any serde type to and from records
///
/// The aggregate must serialize to a JSON object.
///
/// ```rust
/// use acton_criteria::repository::{RepositoryMapper, SerdeMapper};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Order {
///     id: String,
///     total: i64,
/// }
///
/// let mapper = SerdeMapper::<Order>::new();
/// let record = mapper.to_primitive(&Order { id: "o1".into(), total: 12 }).unwrap();
/// assert_eq!(record["total"], 12);
/// assert_eq!(mapper.to_aggregate(record).unwrap().id, "o1");
/// ```
pub struct SerdeMapper<T> {
    _aggregate: PhantomData<fn() -> T>,
}

impl<T> SerdeMapper<T> {
    /// Create a mapper
    pub fn new() -> Self {
        Self {
            _aggregate: PhantomData,
        }
    }
}

impl<T> Default for SerdeMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeMapper<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerdeMapper")
            .field("aggregate", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> RepositoryMapper<T> for SerdeMapper<T>
where
    T: Serialize + DeserializeOwned,
{
    fn to_primitive(&self, aggregate: &T) -> RepositoryResult<Record> {
        match serde_json::to_value(aggregate) {
            Ok(Value::Object(record)) => Ok(record),
            Ok(other) => Err(RepositoryError::serialization(
                RepositoryOperation::Save,
                format!(
                    "{} must serialize to an object, got {}",
                    std::any::type_name::<T>(),
                    json_kind(&other)
                ),
            )),
            Err(e) => Err(RepositoryError::serialization(
                RepositoryOperation::Save,
                e.to_string(),
            )),
        }
    }

    fn to_aggregate(&self, record: Record) -> RepositoryResult<T> {
        serde_json::from_value(Value::Object(record)).map_err(|e| {
            RepositoryError::serialization(
                RepositoryOperation::Fetch,
                format!("Failed to decode {}: {}", std::any::type_name::<T>(), e),
            )
        })
    }
}

/// Mapper built from a pair of closures
pub struct FnMapper<T, P, A> {
    to_primitive: P,
    to_aggregate: A,
    _aggregate: PhantomData<fn() -> T>,
}

impl<T, P, A> FnMapper<T, P, A>
where
    P: Fn(&T) -> RepositoryResult<Record> + Send + Sync,
    A: Fn(Record) -> RepositoryResult<T> + Send + Sync,
{
    /// Create a mapper from conversion functions
    pub fn new(to_primitive: P, to_aggregate: A) -> Self {
        Self {
            to_primitive,
            to_aggregate,
            _aggregate: PhantomData,
        }
    }
}

impl<T, P, A> RepositoryMapper<T> for FnMapper<T, P, A>
where
    P: Fn(&T) -> RepositoryResult<Record> + Send + Sync,
    A: Fn(Record) -> RepositoryResult<T> + Send + Sync,
{
    fn to_primitive(&self, aggregate: &T) -> RepositoryResult<Record> {
        (self.to_primitive)(aggregate)
    }

    fn to_aggregate(&self, record: Record) -> RepositoryResult<T> {
        (self.to_aggregate)(record)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Tag(String);

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: String,
        age: u32,
    }

    #[test]
    fn test_non_object_rejected() {
        let error = SerdeMapper::<Tag>::new()
            .to_primitive(&Tag("x".into()))
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Serialization);
        assert!(error.message.contains("a string"));
    }

    #[test]
    fn test_bad_record_is_serialization_error() {
        let record = match json!({"id": "1", "age": "old"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let error = SerdeMapper::<User>::new().to_aggregate(record).unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Serialization);
    }

    #[test]
    fn test_fn_mapper() {
        let mapper = FnMapper::new(
            |name: &String| {
                let mut record = Record::new();
                record.insert("id".into(), json!(name));
                Ok(record)
            },
            |record: Record| Ok(record["id"].as_str().unwrap_or_default().to_string()),
        );
        let record = mapper.to_primitive(&"ada".to_string()).unwrap();
        assert_eq!(mapper.to_aggregate(record).unwrap(), "ada");
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: String,
        balance: i64,
        active: bool,
        closed_at: Option<String>,
        tags: Vec<String>,
    }

    proptest! {
        #[test]
        fn prop_serde_mapper_round_trips(
            id in "[a-z0-9_]{1,16}",
            balance in any::<i64>(),
            active in any::<bool>(),
            closed_at in proptest::option::of("[0-9-]{10}"),
            tags in proptest::collection::vec("\\PC{0,8}", 0..4),
        ) {
            let account = Account { id, balance, active, closed_at, tags };
            let mapper = SerdeMapper::<Account>::new();
            let record = mapper.to_primitive(&account).unwrap();
            prop_assert_eq!(mapper.to_aggregate(record).unwrap(), account);
        }
    }
}
