//! Criteria to PostgreSQL translation
//!
//! Values are always bound as positional `$N` parameters and never
//! concatenated into the statement. Identifiers are double-quoted with
//! embedded quotes doubled.
//!
//! Negated predicates (`!=`, `NOT IN`, `NOT LIKE`) also match NULL columns,
//! so a missing value never satisfies a positive predicate but always
//! satisfies its negation.

use std::fmt::Write as _;

use serde_json::Value;

use crate::criteria::{Criteria, Filter, FilterOperator, FilterValue, Order, OrderType};
use crate::repository::{
    CommandBuilder, CriteriaConverter, QueryPlan, Record, RepositoryResult,
};

const BACKEND: &str = "postgres";

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// SQL NULL
    Null,
    /// Boolean parameter
    Bool(bool),
    /// Integer parameter
    Integer(i64),
    /// Floating point parameter
    Float(f64),
    /// Text parameter
    Text(String),
    /// JSONB parameter
    Json(Value),
}

impl From<&FilterValue> for SqlParam {
    fn from(value: &FilterValue) -> Self {
        match value {
            FilterValue::Null => Self::Null,
            FilterValue::Bool(b) => Self::Bool(*b),
            FilterValue::Integer(n) => Self::Integer(*n),
            FilterValue::Float(n) => Self::Float(*n),
            FilterValue::String(s) => Self::Text(s.clone()),
            FilterValue::List(_) => Self::Json(value.to_json()),
        }
    }
}

/// Rendered clauses of a criteria
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlQuery {
    /// Condition without the `WHERE` keyword; `None` selects every row
    pub where_clause: Option<String>,
    /// Sort list without the `ORDER BY` keywords
    pub order_clause: Option<String>,
    /// `LIMIT` value
    pub limit: Option<u64>,
    /// `OFFSET` value
    pub offset: Option<u64>,
    /// Parameters referenced by `$1..$N` in `where_clause`
    pub params: Vec<SqlParam>,
}

impl SqlQuery {
    /// The clauses as a statement suffix, starting with a space when non-empty
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        if let Some(ref condition) = self.where_clause {
            let _ = write!(sql, " WHERE {}", condition);
        }
        if let Some(ref order) = self.order_clause {
            let _ = write!(sql, " ORDER BY {}", order);
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {}", limit);
        }
        if let Some(offset) = self.offset {
            let _ = write!(sql, " OFFSET {}", offset);
        }
        sql
    }
}

/// A complete statement with its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// SQL text with `$N` placeholders
    pub sql: String,
    /// Parameters in placeholder order
    pub params: Vec<SqlParam>,
}

impl SqlStatement {
    /// A statement
    pub fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Translates criteria into PostgreSQL clauses
///
/// # Example
///
/// ```rust
/// use acton_criteria::backends::postgres::{SqlCriteriaConverter, SqlParam};
/// use acton_criteria::criteria::{Criteria, Filter, Order};
/// use acton_criteria::repository::CriteriaConverter;
///
/// let mut criteria = Criteria::from_filter(Filter::gte("age", 18).unwrap())
///     .with_order(Order::asc("name").unwrap())
///     .with_limit(10);
/// criteria.add_or_criteria(Criteria::from_filter(Filter::eq("role", "admin").unwrap()));
///
/// let query = SqlCriteriaConverter.convert(&criteria).unwrap();
/// assert_eq!(
///     query.to_sql(),
///     r#" WHERE ("age" >= $1) OR ("role" = $2) ORDER BY "name" ASC LIMIT 10"#
/// );
/// assert_eq!(query.params, vec![SqlParam::Integer(18), SqlParam::Text("admin".into())]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlCriteriaConverter;

impl CriteriaConverter for SqlCriteriaConverter {
    type Query = SqlQuery;

    fn convert(&self, criteria: &Criteria) -> RepositoryResult<SqlQuery> {
        criteria.trace_ignored_modifiers(BACKEND);

        let mut params = Vec::new();
        let where_clause = node_condition(criteria, &mut params);
        let query = SqlQuery {
            where_clause,
            order_clause: order_clause(criteria.order()),
            limit: criteria.limit(),
            offset: criteria.offset(),
            params,
        };
        tracing::debug!(sql = %query.to_sql(), params = query.params.len(), "Translated criteria");
        Ok(query)
    }
}

fn node_condition(node: &Criteria, params: &mut Vec<SqlParam>) -> Option<String> {
    let mut groups = Vec::new();

    if node.has_filters() {
        let conditions: Vec<String> = node
            .filters()
            .iter()
            .map(|filter| filter_condition(filter, params))
            .collect();
        groups.push(conditions.join(" AND "));
    }

    for branch in node.or_criteria() {
        groups.push(node_condition(branch, params).unwrap_or_else(|| "TRUE".to_string()));
    }

    match groups.len() {
        0 => None,
        1 => groups.pop(),
        _ => Some(
            groups
                .iter()
                .map(|group| format!("({})", group))
                .collect::<Vec<_>>()
                .join(" OR "),
        ),
    }
}

fn filter_condition(filter: &Filter, params: &mut Vec<SqlParam>) -> String {
    let column = quote_identifier(filter.field().as_str());
    let value = filter.value();

    let mut bind = |param: SqlParam| {
        params.push(param);
        format!("${}", params.len())
    };

    match filter.operator() {
        FilterOperator::Equal if value.is_null() => format!("{} IS NULL", column),
        FilterOperator::NotEqual if value.is_null() => format!("{} IS NOT NULL", column),
        FilterOperator::Equal => format!("{} = {}", column, bind(value.into())),
        FilterOperator::NotEqual => {
            format!("{} IS DISTINCT FROM {}", column, bind(value.into()))
        }
        FilterOperator::GreaterThan => format!("{} > {}", column, bind(value.into())),
        FilterOperator::GreaterEqual => format!("{} >= {}", column, bind(value.into())),
        FilterOperator::LessThan => format!("{} < {}", column, bind(value.into())),
        FilterOperator::LessEqual => format!("{} <= {}", column, bind(value.into())),
        FilterOperator::Contains => {
            let pattern = format!("%{}%", escape_like(&text(value)));
            format!("{} LIKE {}", column, bind(SqlParam::Text(pattern)))
        }
        FilterOperator::BeginsWith => {
            let pattern = format!("{}%", escape_like(&text(value)));
            format!("{} LIKE {}", column, bind(SqlParam::Text(pattern)))
        }
        FilterOperator::Like => {
            format!("{} LIKE {}", column, bind(SqlParam::Text(text(value))))
        }
        FilterOperator::NotLike => format!(
            "({} IS NULL OR {} NOT LIKE {})",
            column,
            column,
            bind(SqlParam::Text(text(value)))
        ),
        FilterOperator::In => match members(value) {
            [] => "FALSE".to_string(),
            items => {
                let placeholders: Vec<String> =
                    items.iter().map(|item| bind(item.into())).collect();
                format!("{} IN ({})", column, placeholders.join(", "))
            }
        },
        FilterOperator::NotIn => match members(value) {
            [] => "TRUE".to_string(),
            items => {
                let placeholders: Vec<String> =
                    items.iter().map(|item| bind(item.into())).collect();
                format!(
                    "({} IS NULL OR {} NOT IN ({}))",
                    column,
                    column,
                    placeholders.join(", ")
                )
            }
        },
    }
}

fn order_clause(order: &Order) -> Option<String> {
    let direction = match order.order_type() {
        OrderType::None => return None,
        OrderType::Asc => "ASC",
        OrderType::Desc => "DESC",
    };
    let fields = order.order_by().fields();
    if fields.is_empty() {
        return None;
    }
    Some(
        fields
            .iter()
            .map(|field| format!("{} {}", quote_identifier(field), direction))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn members(value: &FilterValue) -> &[FilterValue] {
    value.as_list().unwrap_or(std::slice::from_ref(value))
}

fn text(value: &FilterValue) -> String {
    value.as_str().map_or_else(|| value.to_string(), str::to_string)
}

/// Escape `\`, `%` and `_` so the text matches literally inside a LIKE pattern
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name
pub fn quote_table(name: &str) -> String {
    name.split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// Builds SQL statements for one table
///
/// Rows are read as `to_jsonb(row)` so every statement yields a single JSON
/// column named `record`. Upserts go through `jsonb_populate_record`, which
/// requires the record keys to match the table's column names.
#[derive(Debug, Clone)]
pub struct SqlCommandBuilder {
    table: String,
    id_field: String,
    converter: SqlCriteriaConverter,
}

impl SqlCommandBuilder {
    /// Builder for `table` (optionally schema-qualified), keyed on `id`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_field: crate::backends::key_value::DEFAULT_ID_FIELD.to_string(),
            converter: SqlCriteriaConverter,
        }
    }

    /// Use a different identifier column
    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    fn select(&self) -> String {
        format!(
            "SELECT to_jsonb(t) AS record FROM {} AS t",
            quote_table(&self.table)
        )
    }

    fn id_condition(&self) -> String {
        format!("{}::text = $1", quote_identifier(&self.id_field))
    }
}

impl CommandBuilder for SqlCommandBuilder {
    type Command = SqlStatement;

    fn id_field(&self) -> &str {
        &self.id_field
    }

    fn upsert(&self, _id: &str, record: Record) -> RepositoryResult<SqlStatement> {
        let table = quote_table(&self.table);
        let mut columns: Vec<&String> = record
            .keys()
            .filter(|column| **column != self.id_field)
            .collect();
        columns.sort();
        let updates: Vec<String> = columns
            .into_iter()
            .map(|column| {
                let column = quote_identifier(column);
                format!("{} = EXCLUDED.{}", column, column)
            })
            .collect();
        let conflict_action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        let sql = format!(
            "INSERT INTO {table} SELECT * FROM jsonb_populate_record(NULL::{table}, $1) \
             ON CONFLICT ({}) {}",
            quote_identifier(&self.id_field),
            conflict_action,
        );
        Ok(SqlStatement::new(
            sql,
            vec![SqlParam::Json(Value::Object(record))],
        ))
    }

    fn find_by_id(&self, id: &str) -> RepositoryResult<SqlStatement> {
        Ok(SqlStatement::new(
            format!("{} WHERE {}", self.select(), self.id_condition()),
            vec![SqlParam::Text(id.to_string())],
        ))
    }

    fn find_all(&self) -> RepositoryResult<SqlStatement> {
        Ok(SqlStatement::new(self.select(), Vec::new()))
    }

    fn matching(&self, criteria: &Criteria) -> RepositoryResult<QueryPlan<SqlStatement>> {
        let query = self.converter.convert(criteria)?;
        let sql = format!("{}{}", self.select(), query.to_sql());
        Ok(QueryPlan::native(SqlStatement::new(sql, query.params)))
    }

    fn delete(&self, id: &str) -> RepositoryResult<SqlStatement> {
        Ok(SqlStatement::new(
            format!(
                "DELETE FROM {} WHERE {}",
                quote_table(&self.table),
                self.id_condition()
            ),
            vec![SqlParam::Text(id.to_string())],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::FilterInput;
    use serde_json::json;

    fn convert(criteria: &Criteria) -> SqlQuery {
        SqlCriteriaConverter.convert(criteria).unwrap()
    }

    #[test]
    fn test_and_filters_use_positional_params() {
        let criteria = Criteria::create(
            vec![
                FilterInput::new("status", "=", "active"),
                FilterInput::new("age", ">", 21),
            ],
            None,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        let query = convert(&criteria);
        assert_eq!(
            query.where_clause.as_deref(),
            Some(r#""status" = $1 AND "age" > $2"#)
        );
        assert_eq!(
            query.params,
            vec![SqlParam::Text("active".into()), SqlParam::Integer(21)]
        );
    }

    #[test]
    fn test_adults_named_a_page() {
        let criteria = Criteria::create(
            vec![
                FilterInput::new("age", ">=", 18),
                FilterInput::new("name", "LIKE", "A%"),
            ],
            Some("name"),
            Some("desc"),
            Some(10),
            Some(0),
            None,
        )
        .unwrap();
        let query = convert(&criteria);
        let sql = query.to_sql();

        assert_eq!(
            sql,
            r#" WHERE "age" >= $1 AND "name" LIKE $2 ORDER BY "name" DESC LIMIT 10 OFFSET 0"#
        );
        assert_eq!(
            query.params,
            vec![SqlParam::Integer(18), SqlParam::Text("A%".into())]
        );
        // Filter values only travel as parameters
        let where_clause = query.where_clause.unwrap();
        assert!(!where_clause.contains("18"));
        assert!(!sql.contains("A%"));
    }

    #[test]
    fn test_empty_criteria_has_no_clauses() {
        assert_eq!(convert(&Criteria::all()).to_sql(), "");
    }

    #[test]
    fn test_contains_and_prefix_escape_wildcards() {
        let mut criteria = Criteria::from_filter(Filter::contains("name", "50%_off").unwrap());
        criteria.add_filter(Filter::begins_with("path", "C:\\").unwrap());
        let query = convert(&criteria);
        assert_eq!(
            query.params,
            vec![
                SqlParam::Text("%50\\%\\_off%".into()),
                SqlParam::Text("C:\\\\%".into())
            ]
        );
        assert_eq!(
            query.where_clause.as_deref(),
            Some(r#""name" LIKE $1 AND "path" LIKE $2"#)
        );
    }

    #[test]
    fn test_like_pattern_passed_through() {
        let query = convert(&Criteria::from_filter(Filter::like("name", "A_%").unwrap()));
        assert_eq!(query.params, vec![SqlParam::Text("A_%".into())]);
    }

    #[test]
    fn test_in_expands_one_placeholder_per_member() {
        let query = convert(&Criteria::from_filter(
            Filter::is_in("role", vec!["a", "b", "c"]).unwrap(),
        ));
        assert_eq!(query.where_clause.as_deref(), Some(r#""role" IN ($1, $2, $3)"#));
        assert_eq!(query.params.len(), 3);
    }

    #[test]
    fn test_empty_in_lists() {
        let empty: Vec<String> = Vec::new();
        let mut criteria = Criteria::from_filter(Filter::is_in("a", empty.clone()).unwrap());
        criteria.add_filter(Filter::not_in("b", empty).unwrap());
        let query = convert(&criteria);
        assert_eq!(query.where_clause.as_deref(), Some("FALSE AND TRUE"));
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_null_equality() {
        let mut criteria = Criteria::from_filter(Filter::eq("deleted_at", None::<String>).unwrap());
        criteria.add_filter(Filter::ne("email", None::<String>).unwrap());
        let query = convert(&criteria);
        assert_eq!(
            query.where_clause.as_deref(),
            Some(r#""deleted_at" IS NULL AND "email" IS NOT NULL"#)
        );
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_negations_include_nulls() {
        let mut criteria = Criteria::from_filter(Filter::ne("a", 1).unwrap());
        criteria.add_filter(Filter::not_in("b", vec![1, 2]).unwrap());
        criteria.add_filter(Filter::not_like("c", "x%").unwrap());
        let query = convert(&criteria);
        assert_eq!(
            query.where_clause.as_deref(),
            Some(concat!(
                r#""a" IS DISTINCT FROM $1 AND "#,
                r#"("b" IS NULL OR "b" NOT IN ($2, $3)) AND "#,
                r#"("c" IS NULL OR "c" NOT LIKE $4)"#
            ))
        );
    }

    #[test]
    fn test_identifier_quotes_doubled() {
        let query = convert(&Criteria::from_filter(Filter::eq("we\"ird", 1).unwrap()));
        assert_eq!(query.where_clause.as_deref(), Some(r#""we""ird" = $1"#));
    }

    #[test]
    fn test_nested_branches_numbered_globally() {
        let mut inner = Criteria::from_filter(Filter::eq("c", 3).unwrap());
        inner.add_or_criteria(Criteria::from_filter(Filter::eq("d", 4).unwrap()));
        let mut root = Criteria::from_filter(Filter::eq("a", 1).unwrap());
        root.add_filter(Filter::eq("b", 2).unwrap());
        root.add_or_criteria(inner);

        let query = convert(&root);
        assert_eq!(
            query.where_clause.as_deref(),
            Some(r#"("a" = $1 AND "b" = $2) OR (("c" = $3) OR ("d" = $4))"#)
        );
        assert_eq!(query.params.len(), 4);
    }

    #[test]
    fn test_empty_root_with_branches_uses_only_branches() {
        let mut root = Criteria::all();
        root.add_or_criteria(Criteria::from_filter(Filter::eq("a", 1).unwrap()));
        root.add_or_criteria(Criteria::from_filter(Filter::eq("b", 2).unwrap()));
        assert_eq!(
            convert(&root).where_clause.as_deref(),
            Some(r#"("a" = $1) OR ("b" = $2)"#)
        );
    }

    #[test]
    fn test_empty_branch_matches_everything() {
        let mut root = Criteria::from_filter(Filter::eq("a", 1).unwrap());
        root.add_or_criteria(Criteria::all());
        assert_eq!(
            convert(&root).where_clause.as_deref(),
            Some(r#"("a" = $1) OR (TRUE)"#)
        );
    }

    #[test]
    fn test_only_root_pagination_applies() {
        let mut root = Criteria::all().with_limit(5).with_offset(10);
        root.add_or_criteria(
            Criteria::from_filter(Filter::eq("a", 1).unwrap())
                .with_limit(1)
                .with_order(Order::desc("a").unwrap()),
        );
        let query = convert(&root);
        assert_eq!(query.to_sql(), r#" WHERE "a" = $1 LIMIT 5 OFFSET 10"#);
    }

    #[test]
    fn test_multi_field_order() {
        let query = convert(&Criteria::all().with_order(Order::desc("last, first").unwrap()));
        assert_eq!(
            query.order_clause.as_deref(),
            Some(r#""last" DESC, "first" DESC"#)
        );
    }

    #[test]
    fn test_upsert_statement() {
        let record = match json!({"id": "u1", "name": "Ada", "age": 36}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let statement = SqlCommandBuilder::new("app.users")
            .upsert("u1", record.clone())
            .unwrap();
        assert_eq!(
            statement.sql,
            concat!(
                r#"INSERT INTO "app"."users" SELECT * FROM jsonb_populate_record(NULL::"app"."users", $1) "#,
                r#"ON CONFLICT ("id") DO UPDATE SET "age" = EXCLUDED."age", "name" = EXCLUDED."name""#
            )
        );
        assert_eq!(statement.params, vec![SqlParam::Json(Value::Object(record))]);
    }

    #[test]
    fn test_upsert_with_only_id_does_nothing_on_conflict() {
        let record = match json!({"id": "u1"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let statement = SqlCommandBuilder::new("users").upsert("u1", record).unwrap();
        assert!(statement.sql.ends_with(r#"ON CONFLICT ("id") DO NOTHING"#));
    }

    #[test]
    fn test_id_statements() {
        let builder = SqlCommandBuilder::new("users");
        assert_eq!(
            builder.find_by_id("7").unwrap().sql,
            r#"SELECT to_jsonb(t) AS record FROM "users" AS t WHERE "id"::text = $1"#
        );
        assert_eq!(
            builder.delete("7").unwrap().sql,
            r#"DELETE FROM "users" WHERE "id"::text = $1"#
        );
    }

    #[test]
    fn test_matching_statement() {
        let plan = SqlCommandBuilder::new("users")
            .matching(&Criteria::from_filter(Filter::eq("a", 1).unwrap()).with_limit(2))
            .unwrap();
        assert_eq!(
            plan.command.sql,
            r#"SELECT to_jsonb(t) AS record FROM "users" AS t WHERE "a" = $1 LIMIT 2"#
        );
        assert!(plan.residual.is_empty());
    }
}
