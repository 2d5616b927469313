//! Filter primitives: field, operator, value and the predicate combining them
//!
//! # Example
//!
//! ```rust
//! use acton_criteria::criteria::{Filter, FilterOperator, FilterValue};
//!
//! let adults = Filter::gte("age", 18).unwrap();
//! assert_eq!(adults.operator(), FilterOperator::GreaterEqual);
//!
//! // Scalars given to IN are normalized into a one-element list
//! let single = Filter::is_in("status", "active").unwrap();
//! assert_eq!(single.value(), &FilterValue::List(vec!["active".into()]));
//!
//! // Operators can also be parsed from their wire tokens
//! let parsed = Filter::create("name", "NOT LIKE", "A%").unwrap();
//! assert_eq!(parsed.operator(), FilterOperator::NotLike);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::error::{CriteriaError, CriteriaResult};

/// Name of the attribute a filter applies to
///
/// Never empty; surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FilterField(String);

impl FilterField {
    /// Create a field name, rejecting blank input
    pub fn new(name: impl Into<String>) -> CriteriaResult<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(CriteriaError::EmptyField);
        }
        if trimmed.len() == name.len() {
            Ok(Self(name))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// The field name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FilterField {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for FilterField {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for FilterField {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Comparison operators accepted by filters
///
/// The set is closed: every backend converter matches on it exhaustively.
///
/// ```rust
/// use acton_criteria::criteria::FilterOperator;
///
/// assert_eq!(FilterOperator::NotIn.to_string(), "NOT IN");
/// assert_eq!("begins_with".parse::<FilterOperator>(), Ok(FilterOperator::BeginsWith));
/// assert_eq!(">=".parse::<FilterOperator>(), Ok(FilterOperator::GreaterEqual));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessEqual,
    /// Substring match
    Contains,
    /// Prefix match
    BeginsWith,
    /// SQL-style pattern (`%` any run, `_` any single character)
    Like,
    /// Negated SQL-style pattern
    NotLike,
    /// Value is in a list
    In,
    /// Value is not in a list
    NotIn,
}

impl FilterOperator {
    /// Every operator, in declaration order
    pub const ALL: [FilterOperator; 12] = [
        Self::Equal,
        Self::NotEqual,
        Self::GreaterThan,
        Self::GreaterEqual,
        Self::LessThan,
        Self::LessEqual,
        Self::Contains,
        Self::BeginsWith,
        Self::Like,
        Self::NotLike,
        Self::In,
        Self::NotIn,
    ];

    /// Wire token of the operator
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::Contains => "CONTAINS",
            Self::BeginsWith => "BEGINS_WITH",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }

    /// Upper snake case name of the operator
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Equal => "EQUAL",
            Self::NotEqual => "NOT_EQUAL",
            Self::GreaterThan => "GREATER_THAN",
            Self::GreaterEqual => "GREATER_EQUAL",
            Self::LessThan => "LESS_THAN",
            Self::LessEqual => "LESS_EQUAL",
            Self::Contains => "CONTAINS",
            Self::BeginsWith => "BEGINS_WITH",
            Self::Like => "LIKE",
            Self::NotLike => "NOT_LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT_IN",
        }
    }

    /// Whether the operator takes a list of values
    pub const fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Whether the operator works on string values only
    pub const fn takes_text(&self) -> bool {
        matches!(
            self,
            Self::Contains | Self::BeginsWith | Self::Like | Self::NotLike
        )
    }

    /// Whether the operator is an ordering comparison
    pub const fn is_range(&self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::GreaterEqual | Self::LessThan | Self::LessEqual
        )
    }

    fn allowed_tokens() -> Vec<String> {
        Self::ALL.iter().map(|op| op.as_str().to_string()).collect()
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = CriteriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|op| {
                op.as_str() == normalized
                    || op.name() == normalized
                    || op.name().replace('_', " ") == normalized
            })
            .or(match normalized.as_str() {
                "==" | "EQ" => Some(Self::Equal),
                "<>" | "NE" => Some(Self::NotEqual),
                "GT" => Some(Self::GreaterThan),
                "GTE" => Some(Self::GreaterEqual),
                "LT" => Some(Self::LessThan),
                "LTE" => Some(Self::LessEqual),
                _ => None,
            })
            .ok_or_else(|| CriteriaError::InvalidOperator {
                value: s.to_string(),
                allowed: Self::allowed_tokens(),
            })
    }
}

impl Serialize for FilterOperator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A normalized filter value
///
/// Lists keep their members in order so each backend can expand them into
/// its own placeholder scheme. Booleans keep their type; `true`/`false` is
/// only their display form. Absent values become [`FilterValue::Null`],
/// displayed as `NULL`.
///
/// ```rust
/// use acton_criteria::criteria::FilterValue;
///
/// assert_eq!(FilterValue::from(true).to_string(), "true");
/// assert_eq!(FilterValue::from(None::<String>).to_string(), "NULL");
/// assert_eq!(FilterValue::from(vec!["a", "b"]).to_string(), "a,b");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Explicit null
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// String value
    String(String),
    /// Ordered list of scalar values (for IN / NOT IN)
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Whether this is the null sentinel
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// String content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// List members, if this is a list
    pub fn as_list(&self) -> Option<&[FilterValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Typed JSON form, used for native encoding
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for FilterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for FilterValue {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(list: Vec<T>) -> Self {
        Self::List(list.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl TryFrom<Value> for FilterValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float))
                .ok_or_else(|| format!("number {} is out of range", n)),
            Value::String(s) => Ok(Self::String(s)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Array(_) => Err("nested lists are not supported".to_string()),
                    other => Self::try_from(other),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Value::Object(_) => Err("objects are not valid filter values".to_string()),
        }
    }
}

/// A single immutable `field operator value` predicate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    field: FilterField,
    operator: FilterOperator,
    value: FilterValue,
}

impl Filter {
    /// Create a filter from already-typed parts
    ///
    /// The value is normalized and checked against the operator:
    /// IN / NOT IN take a list (a scalar becomes a one-element list), text
    /// operators take a string, range operators reject null and lists.
    pub fn new(
        field: FilterField,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> CriteriaResult<Self> {
        let value = normalize(&field, operator, value.into())?;
        Ok(Self {
            field,
            operator,
            value,
        })
    }

    /// Create a filter from untyped parts, parsing the operator token
    pub fn create(
        field: impl Into<String>,
        operator: &str,
        value: impl Into<FilterValue>,
    ) -> CriteriaResult<Self> {
        let operator = operator.parse::<FilterOperator>()?;
        Self::new(FilterField::new(field)?, operator, value)
    }

    /// Create a filter from a raw input record
    pub fn from_input(input: FilterInput) -> CriteriaResult<Self> {
        let field = FilterField::new(input.field)?;
        let operator = input.operator.parse::<FilterOperator>()?;
        let value =
            FilterValue::try_from(input.value).map_err(|reason| CriteriaError::InvalidValue {
                field: field.to_string(),
                operator: operator.to_string(),
                reason,
            })?;
        Self::new(field, operator, value)
    }

    fn build(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> CriteriaResult<Self> {
        Self::new(FilterField::new(field)?, operator, value)
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::Equal, value)
    }

    /// `field != value`
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::NotEqual, value)
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::GreaterThan, value)
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::GreaterEqual, value)
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::LessThan, value)
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::LessEqual, value)
    }

    /// Substring match
    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::Contains, text.into())
    }

    /// Prefix match
    pub fn begins_with(field: impl Into<String>, prefix: impl Into<String>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::BeginsWith, prefix.into())
    }

    /// SQL-style pattern match
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::Like, pattern.into())
    }

    /// Negated SQL-style pattern match
    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::NotLike, pattern.into())
    }

    /// Membership in a list
    pub fn is_in(field: impl Into<String>, values: impl Into<FilterValue>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::In, values)
    }

    /// Non-membership in a list
    pub fn not_in(field: impl Into<String>, values: impl Into<FilterValue>) -> CriteriaResult<Self> {
        Self::build(field, FilterOperator::NotIn, values)
    }

    /// The filtered field
    pub fn field(&self) -> &FilterField {
        &self.field
    }

    /// The comparison operator
    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    /// The normalized value
    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// Same predicate on a different field
    #[must_use]
    pub(crate) fn renamed(&self, field: FilterField) -> Self {
        Self {
            field,
            operator: self.operator,
            value: self.value.clone(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

fn normalize(
    field: &FilterField,
    operator: FilterOperator,
    value: FilterValue,
) -> CriteriaResult<FilterValue> {
    let invalid = |reason: &str| CriteriaError::InvalidValue {
        field: field.to_string(),
        operator: operator.to_string(),
        reason: reason.to_string(),
    };

    match operator {
        FilterOperator::In | FilterOperator::NotIn => match value {
            FilterValue::List(items) => {
                if items.iter().any(|item| item.as_list().is_some()) {
                    return Err(invalid("nested lists are not supported"));
                }
                if items.iter().any(FilterValue::is_null) {
                    return Err(invalid("list members cannot be null"));
                }
                Ok(FilterValue::List(items))
            }
            FilterValue::Null => Err(invalid("expects a list of values")),
            scalar => Ok(FilterValue::List(vec![scalar])),
        },
        FilterOperator::Contains
        | FilterOperator::BeginsWith
        | FilterOperator::Like
        | FilterOperator::NotLike => match value {
            FilterValue::String(_) => Ok(value),
            _ => Err(invalid("expects a string value")),
        },
        FilterOperator::Equal | FilterOperator::NotEqual => match value {
            FilterValue::List(_) => Err(invalid("does not accept a list, use IN / NOT IN")),
            _ => Ok(value),
        },
        FilterOperator::GreaterThan
        | FilterOperator::GreaterEqual
        | FilterOperator::LessThan
        | FilterOperator::LessEqual => match value {
            FilterValue::List(_) => Err(invalid("does not accept a list")),
            FilterValue::Null => Err(invalid("cannot compare against NULL")),
            _ => Ok(value),
        },
    }
}

/// Untyped filter input, as received from a transport layer
///
/// ```rust
/// use acton_criteria::criteria::{Filter, FilterInput};
///
/// let input: FilterInput =
///     serde_json::from_str(r#"{"field": "age", "operator": ">=", "value": 18}"#).unwrap();
/// let filter = Filter::from_input(input).unwrap();
/// assert_eq!(filter.to_string(), "age >= 18");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterInput {
    /// Field name
    pub field: String,
    /// Operator token or name
    pub operator: String,
    /// Value; absent means null
    #[serde(default)]
    pub value: Value,
}

impl FilterInput {
    /// Create a filter input
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_tokens_round_trip_through_parse() {
        for op in FilterOperator::ALL {
            assert_eq!(op.as_str().parse::<FilterOperator>(), Ok(op));
            assert_eq!(op.name().parse::<FilterOperator>(), Ok(op));
        }
    }

    #[test]
    fn test_operator_parse_is_case_insensitive() {
        assert_eq!("not like".parse(), Ok(FilterOperator::NotLike));
        assert_eq!("contains".parse(), Ok(FilterOperator::Contains));
        assert_eq!("gte".parse(), Ok(FilterOperator::GreaterEqual));
    }

    #[test]
    fn test_unknown_operator_names_allowed_set() {
        let error = "~".parse::<FilterOperator>().unwrap_err();
        let allowed = error.allowed_values().unwrap();
        assert_eq!(allowed.len(), FilterOperator::ALL.len());
        assert!(allowed.contains(&"BEGINS_WITH".to_string()));
    }

    #[test]
    fn test_empty_field_rejected() {
        assert_eq!(FilterField::new("   "), Err(CriteriaError::EmptyField));
        assert_eq!(Filter::eq("", 1).unwrap_err(), CriteriaError::EmptyField);
    }

    #[test]
    fn test_field_is_trimmed() {
        assert_eq!(FilterField::new(" name ").unwrap().as_str(), "name");
    }

    #[test]
    fn test_scalar_in_becomes_list() {
        let filter = Filter::is_in("status", "active").unwrap();
        assert_eq!(filter.value().as_list().map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_list_kept_ordered() {
        let filter = Filter::is_in("status", vec!["c", "a", "b"]).unwrap();
        assert_eq!(filter.value().to_string(), "c,a,b");
    }

    #[test]
    fn test_text_operator_requires_string() {
        let error = Filter::create("age", "LIKE", 3).unwrap_err();
        assert!(matches!(error, CriteriaError::InvalidValue { .. }));
    }

    #[test]
    fn test_equal_rejects_list() {
        assert!(Filter::eq("status", vec!["a", "b"]).is_err());
    }

    #[test]
    fn test_range_rejects_null() {
        assert!(Filter::gt("age", None::<i64>).is_err());
    }

    #[test]
    fn test_in_rejects_null_members() {
        let value = FilterValue::List(vec![FilterValue::Null]);
        assert!(Filter::is_in("status", value).is_err());
    }

    #[test]
    fn test_boolean_keeps_type() {
        let filter = Filter::eq("active", true).unwrap();
        assert_eq!(filter.value(), &FilterValue::Bool(true));
        assert_eq!(filter.value().to_json(), json!(true));
        assert_eq!(filter.to_string(), "active = true");
    }

    #[test]
    fn test_from_input_absent_value_is_null() {
        let input: FilterInput =
            serde_json::from_str(r#"{"field": "deleted_at", "operator": "="}"#).unwrap();
        let filter = Filter::from_input(input).unwrap();
        assert!(filter.value().is_null());
        assert_eq!(filter.to_string(), "deleted_at = NULL");
    }

    #[test]
    fn test_from_input_rejects_objects() {
        let input = FilterInput::new("meta", "=", json!({"a": 1}));
        assert!(matches!(
            Filter::from_input(input),
            Err(CriteriaError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(Filter::eq("a", 1).unwrap(), Filter::create("a", "=", 1).unwrap());
        assert_ne!(Filter::eq("a", 1).unwrap(), Filter::eq("a", 2).unwrap());
    }

    #[test]
    fn test_filter_serializes_tokens() {
        let filter = Filter::not_in("status", vec!["x"]).unwrap();
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"field": "status", "operator": "NOT IN", "value": ["x"]})
        );
    }
}
