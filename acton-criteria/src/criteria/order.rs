//! Sort order
//!
//! [`Order::none`] is the canonical "no ordering" value. It is distinct from
//! an ascending order on no fields: converters skip the sort clause entirely.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::error::{ensure_allowed, CriteriaError, CriteriaResult};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderType {
    /// Ascending
    Asc,
    /// Descending
    Desc,
    /// No ordering
    #[default]
    None,
}

impl OrderType {
    /// Lower case name of the direction
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
            Self::None => "none",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = CriteriaError;

    /// Accepts `asc` and `desc`, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(CriteriaError::InvalidOrderType {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for OrderType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One or more field names to sort by, in priority order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct OrderBy(Vec<String>);

impl OrderBy {
    /// Parse a comma-separated list of fields
    ///
    /// Fields are trimmed; an empty segment fails.
    pub fn parse(value: &str) -> CriteriaResult<Self> {
        value
            .split(',')
            .map(|field| {
                let field = field.trim();
                if field.is_empty() {
                    Err(CriteriaError::EmptyField)
                } else {
                    Ok(field.to_string())
                }
            })
            .collect::<CriteriaResult<Vec<_>>>()
            .map(Self)
    }

    /// Sort by a single field
    pub fn field(name: impl Into<String>) -> CriteriaResult<Self> {
        Self::parse(&name.into())
    }

    /// Fields in priority order
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Sort fields plus direction
///
/// # Example
///
/// ```rust
/// use acton_criteria::criteria::{Order, OrderType};
///
/// let order = Order::create(Some("last_name, first_name"), None, None).unwrap();
/// assert_eq!(order.order_type(), OrderType::Asc);
/// assert_eq!(order.order_by().fields(), ["last_name", "first_name"]);
///
/// assert!(!Order::create(Some(""), Some("desc"), None).unwrap().has_order());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Order {
    order_by: OrderBy,
    order_type: OrderType,
}

impl Order {
    /// Create an order from parts
    pub fn new(order_by: OrderBy, order_type: OrderType) -> Self {
        Self {
            order_by,
            order_type,
        }
    }

    /// The canonical unordered value
    pub fn none() -> Self {
        Self::default()
    }

    /// Ascending on the given comma-separated fields
    pub fn asc(order_by: &str) -> CriteriaResult<Self> {
        Ok(Self::new(OrderBy::parse(order_by)?, OrderType::Asc))
    }

    /// Descending on the given comma-separated fields
    pub fn desc(order_by: &str) -> CriteriaResult<Self> {
        Ok(Self::new(OrderBy::parse(order_by)?, OrderType::Desc))
    }

    /// Build an order from untyped input
    ///
    /// An absent or blank `order_by` yields [`Order::none`]. A missing
    /// `order_type` defaults to ascending.
    pub fn create(
        order_by: Option<&str>,
        order_type: Option<&str>,
        valid_fields: Option<&[&str]>,
    ) -> CriteriaResult<Self> {
        let Some(order_by) = order_by.filter(|value| !value.trim().is_empty()) else {
            return Ok(Self::none());
        };

        let order_by = OrderBy::parse(order_by)?;
        if let Some(valid) = valid_fields {
            for field in order_by.fields() {
                ensure_allowed("order_by", field, valid)?;
            }
        }

        let order_type = match order_type.filter(|value| !value.trim().is_empty()) {
            Some(value) => value.parse()?,
            None => OrderType::Asc,
        };

        Ok(Self::new(order_by, order_type))
    }

    /// Sort fields
    pub fn order_by(&self) -> &OrderBy {
        &self.order_by
    }

    /// Sort direction
    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Whether this order actually sorts anything
    pub fn has_order(&self) -> bool {
        self.order_type != OrderType::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_order_by_is_none() {
        assert_eq!(Order::create(None, Some("desc"), None).unwrap(), Order::none());
        assert_eq!(Order::create(Some("  "), None, None).unwrap(), Order::none());
    }

    #[test]
    fn test_order_type_defaults_to_asc() {
        let order = Order::create(Some("name"), None, None).unwrap();
        assert_eq!(order.order_type(), OrderType::Asc);
        assert!(order.has_order());
    }

    #[test]
    fn test_order_type_is_case_insensitive() {
        let order = Order::create(Some("name"), Some("DESC"), None).unwrap();
        assert_eq!(order.order_type(), OrderType::Desc);
    }

    #[test]
    fn test_invalid_order_type() {
        let error = Order::create(Some("name"), Some("sideways"), None).unwrap_err();
        assert_eq!(
            error,
            CriteriaError::InvalidOrderType {
                value: "sideways".to_string()
            }
        );
    }

    #[test]
    fn test_every_order_field_checked_against_whitelist() {
        let error = Order::create(Some("name,password"), None, Some(&["name"])).unwrap_err();
        assert!(matches!(
            error,
            CriteriaError::InvalidField { field, parameter: "order_by", .. } if field == "password"
        ));
    }

    #[test]
    fn test_empty_segment_rejected() {
        assert_eq!(OrderBy::parse("a,,b"), Err(CriteriaError::EmptyField));
    }

    #[test]
    fn test_none_differs_from_asc_on_no_fields() {
        let ascending_nothing = Order::new(OrderBy::default(), OrderType::Asc);
        assert_ne!(ascending_nothing, Order::none());
        assert!(ascending_nothing.has_order());
        assert!(!Order::none().has_order());
    }

    #[test]
    fn test_serializes_comma_joined() {
        let order = Order::desc("a, b").unwrap();
        assert_eq!(
            serde_json::to_value(&order).unwrap(),
            serde_json::json!({"order_by": "a,b", "order_type": "desc"})
        );
    }
}
