//! In-process evaluation of criteria against primitive records
//!
//! Used by the in-memory store and by the key-value residual, where the
//! backend cannot evaluate predicates itself.
//!
//! Attribute names resolve against the record's top-level keys first, then as
//! dot-separated paths into nested objects. A missing attribute behaves like
//! `null`, so negated predicates (`!=`, `NOT IN`, `NOT LIKE`) match it while
//! every positive predicate does not.

use std::cmp::Ordering;

use serde_json::Value;

use super::composite::Criteria;
use super::filter::{Filter, FilterOperator, FilterValue};
use super::order::{Order, OrderType};
use crate::repository::Record;

impl Criteria {
    /// Whether `record` belongs to the result set of this criteria tree
    ///
    /// Order and pagination are not considered.
    ///
    /// ```rust
    /// use acton_criteria::criteria::{Criteria, Filter};
    /// use serde_json::json;
    ///
    /// let mut criteria = Criteria::from_filter(Filter::eq("status", "active").unwrap());
    /// criteria.add_or_criteria(Criteria::from_filter(Filter::eq("role", "admin").unwrap()));
    ///
    /// let admin = json!({"status": "disabled", "role": "admin"});
    /// assert!(criteria.matches(admin.as_object().unwrap()));
    /// ```
    pub fn matches(&self, record: &Record) -> bool {
        let own = self.has_filters() && self.filters().iter().all(|f| f.matches(record));
        if own {
            return true;
        }
        if self.or_criteria().is_empty() {
            // No filters and no branches selects everything
            return !self.has_filters();
        }
        self.or_criteria().iter().any(|branch| branch.matches(record))
    }
}

impl Filter {
    /// Whether `record` satisfies this single predicate
    pub fn matches(&self, record: &Record) -> bool {
        let actual = resolve(record, self.field().as_str());
        let expected = self.value();

        match self.operator() {
            FilterOperator::Equal => equals(actual, expected),
            FilterOperator::NotEqual => !equals(actual, expected),
            FilterOperator::GreaterThan => {
                compare(actual, expected) == Some(Ordering::Greater)
            }
            FilterOperator::GreaterEqual => matches!(
                compare(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::LessThan => compare(actual, expected) == Some(Ordering::Less),
            FilterOperator::LessEqual => matches!(
                compare(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::Contains => match (actual, expected.as_str()) {
                (Value::String(s), Some(needle)) => s.contains(needle),
                (Value::Array(items), Some(needle)) => {
                    items.iter().any(|item| item.as_str() == Some(needle))
                }
                _ => false,
            },
            FilterOperator::BeginsWith => match (actual, expected.as_str()) {
                (Value::String(s), Some(prefix)) => s.starts_with(prefix),
                _ => false,
            },
            FilterOperator::Like => match (actual, expected.as_str()) {
                (Value::String(s), Some(pattern)) => like(s, pattern),
                _ => false,
            },
            FilterOperator::NotLike => match (actual, expected.as_str()) {
                (Value::String(s), Some(pattern)) => !like(s, pattern),
                _ => true,
            },
            FilterOperator::In => members(expected).iter().any(|m| equals(actual, m)),
            FilterOperator::NotIn => !members(expected).iter().any(|m| equals(actual, m)),
        }
    }
}

/// Compare two records by an order
///
/// Missing values sort first in ascending order. [`OrderType::None`] keeps
/// everything equal so a stable sort preserves fetch order.
pub fn compare_records(left: &Record, right: &Record, order: &Order) -> Ordering {
    let direction = match order.order_type() {
        OrderType::None => return Ordering::Equal,
        OrderType::Asc => Ordering::Less,
        OrderType::Desc => Ordering::Greater,
    };

    for field in order.order_by().fields() {
        let ordering = total_order(resolve(left, field), resolve(right, field));
        if ordering != Ordering::Equal {
            return if direction == Ordering::Less {
                ordering
            } else {
                ordering.reverse()
            };
        }
    }
    Ordering::Equal
}

/// Resolve an attribute: exact key first, then a dot-separated path
pub(crate) fn resolve<'a>(record: &'a Record, field: &str) -> &'a Value {
    if let Some(value) = record.get(field) {
        return value;
    }
    let mut segments = field.split('.');
    let Some(mut current) = segments.next().and_then(|first| record.get(first)) else {
        return &Value::Null;
    };
    for segment in segments {
        match current.get(segment) {
            Some(value) => current = value,
            None => return &Value::Null,
        }
    }
    current
}

fn members(value: &FilterValue) -> &[FilterValue] {
    match value {
        FilterValue::List(items) => items,
        other => std::slice::from_ref(other),
    }
}

fn equals(actual: &Value, expected: &FilterValue) -> bool {
    compare(actual, expected) == Some(Ordering::Equal)
}

fn compare(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    compare_values(actual, &expected.to_json())
}

/// Compare two JSON values of the same kind
///
/// Numbers compare as `f64`, strings lexicographically, booleans with
/// `false < true`, and `null` equals `null`. Mismatched kinds are
/// incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return Some(a.cmp(&b));
            }
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn total_order(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    compare_values(left, right).unwrap_or_else(|| rank(left).cmp(&rank(right)))
}

/// SQL `LIKE` matching: `%` is any run, `_` any single character, `\` escapes
pub(crate) fn like(text: &str, pattern: &str) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Token {
        Any,
        One,
        Char(char),
    }

    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Char(chars.next().unwrap_or('\\')),
            other => Token::Char(other),
        });
    }

    let text: Vec<char> = text.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match tokens.get(p) {
            Some(Token::Any) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(Token::One) => {
                t += 1;
                p += 1;
            }
            Some(Token::Char(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    tokens[p..].iter().all(|token| *token == Token::Any)
}
