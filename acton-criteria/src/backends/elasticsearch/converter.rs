//! Criteria to Elasticsearch query DSL translation
//!
//! Each criteria node becomes a `bool` query. Exact predicates go to
//! `filter` (no scoring), CONTAINS goes to `must` as a full-text `match`,
//! and negations go to `must_not` so documents missing the field match them.
//! OR branches become `should` clauses with `minimum_should_match: 1`.

use serde_json::{json, Map, Value};

use crate::criteria::{Criteria, Filter, FilterOperator, Order, OrderType};
use crate::repository::{
    CommandBuilder, CriteriaConverter, QueryPlan, Record, RepositoryError, RepositoryResult,
};

const BACKEND: &str = "elasticsearch";

/// Result window used when criteria carry no limit
///
/// Matches the default `index.max_result_window`. Without a limit the page
/// shrinks by the offset so that `from + size` stays inside the window.
pub const DEFAULT_SEARCH_SIZE: u64 = 10_000;

/// Translates criteria into a search request body
///
/// # Example
///
/// ```rust
/// use acton_criteria::backends::elasticsearch::ElasticsearchCriteriaConverter;
/// use acton_criteria::criteria::{Criteria, Filter};
/// use acton_criteria::repository::CriteriaConverter;
/// use serde_json::json;
///
/// let criteria = Criteria::from_filter(Filter::eq("status", "active").unwrap()).with_limit(20);
/// let body = ElasticsearchCriteriaConverter::default().convert(&criteria).unwrap();
///
/// assert_eq!(body["query"]["bool"]["filter"][0], json!({"term": {"status": "active"}}));
/// assert_eq!(body["size"], 20);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ElasticsearchCriteriaConverter {
    default_size: u64,
}

impl Default for ElasticsearchCriteriaConverter {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_SEARCH_SIZE,
        }
    }
}

impl ElasticsearchCriteriaConverter {
    /// Use `size` when criteria carry no limit
    ///
    /// `size` is also the result window: offset plus page size may not
    /// exceed it.
    pub fn with_default_size(size: u64) -> Self {
        Self { default_size: size }
    }

    /// `(from, size)` for the request, kept inside the result window
    fn page(&self, criteria: &Criteria) -> RepositoryResult<(u64, u64)> {
        let window = self.default_size;
        let offset = criteria.offset().unwrap_or(0);
        if offset > 0 && offset >= window {
            return Err(RepositoryError::translation(
                BACKEND,
                format!("Offset {} is outside the result window of {}", offset, window),
            ));
        }
        let size = match criteria.limit() {
            Some(limit) if offset.saturating_add(limit) > window => {
                return Err(RepositoryError::translation(
                    BACKEND,
                    format!(
                        "Offset {} plus limit {} exceeds the result window of {}",
                        offset, limit, window
                    ),
                ))
            }
            Some(limit) => limit,
            None => window - offset,
        };
        Ok((offset, size))
    }
}

impl CriteriaConverter for ElasticsearchCriteriaConverter {
    type Query = Value;

    fn convert(&self, criteria: &Criteria) -> RepositoryResult<Value> {
        criteria.trace_ignored_modifiers(BACKEND);
        let (from, size) = self.page(criteria)?;

        let mut body = Map::new();
        body.insert("query".into(), node_query(criteria));
        if criteria.order().has_order() {
            body.insert("sort".into(), sort_clause(criteria.order()));
        }
        body.insert("size".into(), json!(size));
        if criteria.offset().is_some() {
            body.insert("from".into(), json!(from));
        }

        tracing::debug!(body = %serde_json::Value::Object(body.clone()), "Translated criteria");
        Ok(Value::Object(body))
    }
}

#[derive(Default)]
struct BoolClauses {
    must: Vec<Value>,
    filter: Vec<Value>,
    must_not: Vec<Value>,
}

impl BoolClauses {
    fn add(&mut self, filter: &Filter) {
        let field = filter.field().as_str();
        let value = filter.value();
        let operand = value.to_json();

        match filter.operator() {
            FilterOperator::Equal if value.is_null() => {
                self.must_not.push(json!({"exists": {"field": field}}))
            }
            FilterOperator::NotEqual if value.is_null() => {
                self.filter.push(json!({"exists": {"field": field}}))
            }
            FilterOperator::Equal => self.filter.push(json!({"term": {field: operand}})),
            FilterOperator::NotEqual => self.must_not.push(json!({"term": {field: operand}})),
            FilterOperator::GreaterThan => self.filter.push(range(field, "gt", operand)),
            FilterOperator::GreaterEqual => self.filter.push(range(field, "gte", operand)),
            FilterOperator::LessThan => self.filter.push(range(field, "lt", operand)),
            FilterOperator::LessEqual => self.filter.push(range(field, "lte", operand)),
            FilterOperator::Contains => self.must.push(json!({"match": {field: operand}})),
            FilterOperator::BeginsWith => self.filter.push(json!({"prefix": {field: operand}})),
            FilterOperator::Like => self.filter.push(wildcard(field, value.as_str())),
            FilterOperator::NotLike => self.must_not.push(wildcard(field, value.as_str())),
            FilterOperator::In => self.filter.push(json!({"terms": {field: operand}})),
            FilterOperator::NotIn => self.must_not.push(json!({"terms": {field: operand}})),
        }
    }

    fn into_query(self) -> Value {
        let mut clauses = Map::new();
        for (name, list) in [
            ("must", self.must),
            ("filter", self.filter),
            ("must_not", self.must_not),
        ] {
            if !list.is_empty() {
                clauses.insert(name.into(), Value::Array(list));
            }
        }
        json!({"bool": clauses})
    }
}

fn range(field: &str, bound: &str, value: Value) -> Value {
    json!({"range": {field: {bound: value}}})
}

fn wildcard(field: &str, pattern: Option<&str>) -> Value {
    json!({"wildcard": {field: {"value": like_to_wildcard(pattern.unwrap_or_default())}}})
}

fn node_query(node: &Criteria) -> Value {
    let own = node.has_filters().then(|| {
        let mut clauses = BoolClauses::default();
        for filter in node.filters() {
            clauses.add(filter);
        }
        clauses.into_query()
    });

    if node.or_criteria().is_empty() {
        return own.unwrap_or_else(|| json!({"match_all": {}}));
    }

    let should: Vec<Value> = own
        .into_iter()
        .chain(node.or_criteria().iter().map(node_query))
        .collect();
    json!({"bool": {"should": should, "minimum_should_match": 1}})
}

fn sort_clause(order: &Order) -> Value {
    let direction = match order.order_type() {
        OrderType::Desc => "desc",
        _ => "asc",
    };
    order
        .order_by()
        .fields()
        .iter()
        .map(|field| json!({ field.as_str(): {"order": direction} }))
        .collect()
}

/// Rewrite a LIKE pattern as an Elasticsearch wildcard
///
/// `%` becomes `*` and `_` becomes `?`. Literal `*`, `?` and `\` are
/// escaped, and `\%` / `\_` in the input stay literal.
pub fn like_to_wildcard(pattern: &str) -> String {
    let mut wildcard = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let literal = match c {
            '%' => {
                wildcard.push('*');
                continue;
            }
            '_' => {
                wildcard.push('?');
                continue;
            }
            '\\' => chars.next().unwrap_or('\\'),
            other => other,
        };
        if matches!(literal, '*' | '?' | '\\') {
            wildcard.push('\\');
        }
        wildcard.push(literal);
    }
    wildcard
}

/// An Elasticsearch request
#[derive(Debug, Clone, PartialEq)]
pub enum ElasticsearchCommand {
    /// Index (create or replace) a document
    Index {
        /// Index name
        index: String,
        /// Document id
        id: String,
        /// Document source
        document: Record,
    },
    /// Read a document's source by id
    Get {
        /// Index name
        index: String,
        /// Document id
        id: String,
    },
    /// Run a search request body and return each hit's source
    Search {
        /// Index name
        index: String,
        /// Request body
        body: Value,
    },
    /// Remove a document by id
    Delete {
        /// Index name
        index: String,
        /// Document id
        id: String,
    },
}

/// Builds [`ElasticsearchCommand`]s for one index
#[derive(Debug, Clone)]
pub struct ElasticsearchCommandBuilder {
    index: String,
    id_field: String,
    converter: ElasticsearchCriteriaConverter,
}

impl ElasticsearchCommandBuilder {
    /// Builder for `index`, keyed on `id`
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            id_field: crate::backends::key_value::DEFAULT_ID_FIELD.to_string(),
            converter: ElasticsearchCriteriaConverter::default(),
        }
    }

    /// Read the document id from a different field
    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Use a custom converter
    #[must_use]
    pub fn with_converter(mut self, converter: ElasticsearchCriteriaConverter) -> Self {
        self.converter = converter;
        self
    }
}

impl CommandBuilder for ElasticsearchCommandBuilder {
    type Command = ElasticsearchCommand;

    fn id_field(&self) -> &str {
        &self.id_field
    }

    fn upsert(&self, id: &str, record: Record) -> RepositoryResult<ElasticsearchCommand> {
        Ok(ElasticsearchCommand::Index {
            index: self.index.clone(),
            id: id.to_string(),
            document: record,
        })
    }

    fn find_by_id(&self, id: &str) -> RepositoryResult<ElasticsearchCommand> {
        Ok(ElasticsearchCommand::Get {
            index: self.index.clone(),
            id: id.to_string(),
        })
    }

    fn find_all(&self) -> RepositoryResult<ElasticsearchCommand> {
        Ok(ElasticsearchCommand::Search {
            index: self.index.clone(),
            body: self.converter.convert(&Criteria::all())?,
        })
    }

    fn matching(
        &self,
        criteria: &Criteria,
    ) -> RepositoryResult<QueryPlan<ElasticsearchCommand>> {
        Ok(QueryPlan::native(ElasticsearchCommand::Search {
            index: self.index.clone(),
            body: self.converter.convert(criteria)?,
        }))
    }

    fn delete(&self, id: &str) -> RepositoryResult<ElasticsearchCommand> {
        Ok(ElasticsearchCommand::Delete {
            index: self.index.clone(),
            id: id.to_string(),
        })
    }
}
