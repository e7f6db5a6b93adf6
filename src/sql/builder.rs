//! Statement construction per operation kind.

use tokio_postgres::types::ToSql;

use crate::models::{ExecKind, QuerySpec, ScalarKind, ScalarSpec, SqlValue};
use crate::sql::escape::literal;
use crate::sql::fields::{render_field, render_sort, FieldPosition};
use crate::sql::predicate;
use crate::{Error, Result};

/// A rendered statement plus its positional parameters.
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    /// Statement text.
    pub text: String,
    /// Positional parameters in emission order; indices start at `$1`.
    pub params: Vec<SqlValue>,
}

impl BuiltQuery {
    fn plain(text: String) -> Self {
        Self {
            text,
            params: Vec::new(),
        }
    }

    /// Parameter slice in the form the driver binds.
    #[must_use]
    pub fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect()
    }
}

/// Builds the statement for a filter record.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for malformed records: empty payloads on
/// insert/update, a missing aggregate spec on `scalar`, missing statement
/// text on raw kinds, or an unsupported null comparison.
pub fn build(spec: &QuerySpec) -> Result<BuiltQuery> {
    match spec.exec {
        ExecKind::Find | ExecKind::Read | ExecKind::List => select(spec),
        ExecKind::Count => build_count(spec),
        ExecKind::Check => check(spec),
        ExecKind::Insert => insert(spec),
        ExecKind::Update => update(spec),
        ExecKind::Remove => remove(spec),
        ExecKind::Drop => Ok(BuiltQuery::plain(format!(
            "DROP TABLE {}",
            spec.qualified_table()
        ))),
        ExecKind::Truncate => Ok(BuiltQuery::plain(format!(
            "TRUNCATE TABLE {} RESTART IDENTITY",
            spec.qualified_table()
        ))),
        ExecKind::Scalar => scalar(spec),
        ExecKind::Query | ExecKind::Command => raw(spec),
    }
}

/// Builds the companion COUNT statement used by `list` and `count`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when the record's predicates are
/// malformed.
pub fn build_count(spec: &QuerySpec) -> Result<BuiltQuery> {
    Ok(BuiltQuery::plain(format!(
        "SELECT COUNT(1)::int as count FROM {}{}",
        spec.qualified_table(),
        where_fragment(spec)?
    )))
}

fn where_fragment(spec: &QuerySpec) -> Result<String> {
    if spec.filter.is_empty() {
        return Ok(String::new());
    }
    let joined = predicate::compose(&spec.filter, spec.language.as_deref(), "AND")?;
    Ok(format!(" WHERE {joined}"))
}

fn select(spec: &QuerySpec) -> Result<BuiltQuery> {
    let language = spec.language.as_deref();
    let projection = if spec.fields.is_empty() {
        "*".to_string()
    } else {
        let rendered: Vec<String> = spec
            .fields
            .iter()
            .map(|field| render_field(field, language, FieldPosition::Projection))
            .collect();
        rendered.join(",")
    };

    let mut text = format!("SELECT {projection} FROM {}", spec.qualified_table());
    text.push_str(&where_fragment(spec)?);

    if !spec.sort.is_empty() {
        let order: Vec<String> = spec
            .sort
            .iter()
            .map(|token| render_sort(token, language))
            .collect();
        text.push_str(&format!(" ORDER BY {}", order.join(",")));
    }
    if let Some(take) = spec.take.filter(|take| *take > 0) {
        text.push_str(&format!(" LIMIT {take}"));
    }
    if let Some(skip) = spec.skip.filter(|skip| *skip > 0) {
        text.push_str(&format!(" OFFSET {skip}"));
    }
    Ok(BuiltQuery::plain(text))
}

fn check(spec: &QuerySpec) -> Result<BuiltQuery> {
    let limit = spec.take.filter(|take| *take > 0).unwrap_or(1);
    Ok(BuiltQuery::plain(format!(
        "SELECT 1 as count FROM {}{} LIMIT {limit}",
        spec.qualified_table(),
        where_fragment(spec)?
    )))
}

fn insert(spec: &QuerySpec) -> Result<BuiltQuery> {
    let language = spec.language.as_deref();
    let mut columns = Vec::with_capacity(spec.payload.len());
    let mut expressions = Vec::with_capacity(spec.payload.len());
    let mut params = Vec::new();

    for (key, value) in &spec.payload {
        let (operator, name) = split_operator(key);
        let column = render_field(name, language, FieldPosition::Predicate);
        let value = value.resolved();
        match operator {
            // Literal-valued columns are excluded from the insert entirely.
            Some('#') => {},
            Some('!') => {
                columns.push(column);
                expressions.push("FALSE".to_string());
            },
            Some('=') => {
                columns.push(column);
                expressions.push(literal(&value));
            },
            Some('+' | '-' | '*' | '/' | '>' | '<') => {
                let value = if value.is_null() {
                    SqlValue::Int(0)
                } else {
                    value
                };
                params.push(value);
                columns.push(column);
                expressions.push(format!("${}", params.len()));
            },
            _ => {
                params.push(value);
                columns.push(column);
                expressions.push(format!("${}", params.len()));
            },
        }
    }

    if columns.is_empty() {
        return Err(Error::InvalidInput(format!(
            "insert into '{}' has no usable payload",
            spec.table
        )));
    }

    let mut text = format!(
        "INSERT INTO {} ({}) VALUES({})",
        spec.qualified_table(),
        columns.join(","),
        expressions.join(",")
    );
    if !spec.returning.is_empty() {
        text.push_str(&format!(" RETURNING {}", spec.returning.join(",")));
    } else if let Some(primary_key) = &spec.primary_key {
        text.push_str(&format!(" RETURNING {primary_key}"));
    }
    Ok(BuiltQuery { text, params })
}

fn update(spec: &QuerySpec) -> Result<BuiltQuery> {
    let language = spec.language.as_deref();
    let mut assignments = Vec::with_capacity(spec.payload.len());
    let mut params = Vec::new();

    for (key, value) in &spec.payload {
        let (operator, name) = split_operator(key);
        let column = render_field(name, language, FieldPosition::Predicate);
        let value = value.resolved();
        match operator {
            Some(op @ ('+' | '-' | '*' | '/')) => {
                params.push(value);
                assignments.push(format!(
                    "{column}=COALESCE({column},0){op}${}",
                    params.len()
                ));
            },
            Some('>') => {
                params.push(value);
                assignments.push(format!("{column}=GREATEST({column},${})", params.len()));
            },
            Some('<') => {
                params.push(value);
                assignments.push(format!("{column}=LEAST({column},${})", params.len()));
            },
            Some('!') => assignments.push(format!("{column}=NOT {column}")),
            Some('=' | '#') => assignments.push(format!("{column}={}", literal(&value))),
            _ => {
                params.push(value);
                assignments.push(format!("{column}=${}", params.len()));
            },
        }
    }

    if assignments.is_empty() {
        return Err(Error::InvalidInput(format!(
            "update of '{}' has no usable payload",
            spec.table
        )));
    }

    let table = spec.qualified_table();
    let sets = assignments.join(",");
    let where_sql = where_fragment(spec)?;
    let text = if spec.returning.is_empty() {
        // Affected-count form: the CTE turns the update into a countable row set.
        format!(
            "WITH rows AS (UPDATE {table} SET {sets}{where_sql} RETURNING 1) \
             SELECT COUNT(1)::int count FROM rows"
        )
    } else {
        format!(
            "UPDATE {table} SET {sets}{where_sql} RETURNING {}",
            spec.returning.join(",")
        )
    };
    Ok(BuiltQuery { text, params })
}

fn remove(spec: &QuerySpec) -> Result<BuiltQuery> {
    let mut text = format!(
        "DELETE FROM {}{}",
        spec.qualified_table(),
        where_fragment(spec)?
    );
    if !spec.returning.is_empty() {
        text.push_str(&format!(" RETURNING {}", spec.returning.join(",")));
    }
    Ok(BuiltQuery::plain(text))
}

fn scalar(spec: &QuerySpec) -> Result<BuiltQuery> {
    let Some(scalar) = &spec.scalar else {
        return Err(Error::InvalidInput(
            "scalar exec requires a scalar spec".to_string(),
        ));
    };
    let table = spec.qualified_table();
    let where_sql = where_fragment(spec)?;

    let text = match scalar.kind {
        ScalarKind::Group => group_text(scalar, &table, &where_sql)?,
        ScalarKind::Count => {
            format!("SELECT COUNT(1)::int as value FROM {table}{where_sql}")
        },
        aggregate => {
            let target = scalar.key.clone().unwrap_or_else(|| "1".to_string());
            format!(
                "SELECT {}({target})::numeric as value FROM {table}{where_sql}",
                aggregate.sql_fn()
            )
        },
    };
    Ok(BuiltQuery::plain(text))
}

fn group_text(scalar: &ScalarSpec, table: &str, where_sql: &str) -> Result<String> {
    let Some(key) = &scalar.key else {
        return Err(Error::InvalidInput(
            "grouped scalar requires a key".to_string(),
        ));
    };
    let value_expression = scalar.key2.as_ref().map_or_else(
        || "COUNT(1)::int as value".to_string(),
        |key2| format!("SUM({key2})::numeric as value"),
    );
    Ok(format!(
        "SELECT {key}, {value_expression} FROM {table}{where_sql} GROUP BY {key}"
    ))
}

fn raw(spec: &QuerySpec) -> Result<BuiltQuery> {
    let Some(query) = &spec.query else {
        return Err(Error::InvalidInput(
            "raw exec requires statement text".to_string(),
        ));
    };
    let mut text = query.clone();
    if spec.filter.is_empty() {
        if text.contains("{where}") {
            text = text.replace("{where}", "");
        }
    } else {
        let joined = format!(
            "WHERE {}",
            predicate::compose(&spec.filter, spec.language.as_deref(), "AND")?
        );
        if text.contains("{where}") {
            text = text.replace("{where}", &joined);
        } else {
            text.push_str(&format!(" {joined}"));
        }
    }
    Ok(BuiltQuery {
        text,
        params: spec.params.clone(),
    })
}

/// Splits a payload key into its optional operator prefix and column name.
fn split_operator(key: &str) -> (Option<char>, &str) {
    let mut chars = key.chars();
    match chars.next() {
        Some(op @ ('+' | '-' | '*' | '/' | '>' | '<' | '!' | '=' | '#')) => {
            (Some(op), &key[op.len_utf8()..])
        },
        _ => (None, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Predicate;

    #[test]
    fn test_insert_with_returning() {
        let spec = QuerySpec::new(ExecKind::Insert, "products")
            .with_payload("name", "Drone X1")
            .with_payload("price", 1999i64)
            .with_returning("id");
        let built = build(&spec).unwrap();
        assert_eq!(
            built.text,
            "INSERT INTO products (\"name\",\"price\") VALUES($1,$2) RETURNING id"
        );
        assert_eq!(
            built.params,
            vec![
                SqlValue::Text("Drone X1".to_string()),
                SqlValue::Int(1999)
            ]
        );
    }

    #[test]
    fn test_insert_primary_key_returning() {
        let spec = QuerySpec::new(ExecKind::Insert, "products")
            .with_payload("name", "Drone X1")
            .with_primary_key("id");
        let built = build(&spec).unwrap();
        assert_eq!(
            built.text,
            "INSERT INTO products (\"name\") VALUES($1) RETURNING id"
        );
    }

    #[test]
    fn test_insert_operator_prefixes() {
        let spec = QuerySpec::new(ExecKind::Insert, "stats")
            .with_payload("+hits", SqlValue::Null)
            .with_payload("!archived", SqlValue::Null)
            .with_payload("=created", "now()")
            .with_payload("#ignored", 1i64)
            .with_payload("label", "a");
        let built = build(&spec).unwrap();
        assert_eq!(
            built.text,
            "INSERT INTO stats (\"hits\",\"archived\",\"created\",\"label\") \
             VALUES($1,FALSE,'now()',$2)"
        );
        assert_eq!(
            built.params,
            vec![SqlValue::Int(0), SqlValue::Text("a".to_string())]
        );
    }

    #[test]
    fn test_insert_placeholders_are_contiguous() {
        let spec = QuerySpec::new(ExecKind::Insert, "t")
            .with_payload("a", 1i64)
            .with_payload("!b", SqlValue::Null)
            .with_payload("c", 2i64)
            .with_payload("#d", 3i64)
            .with_payload("e", 4i64);
        let built = build(&spec).unwrap();
        assert_eq!(
            built.text,
            "INSERT INTO t (\"a\",\"b\",\"c\",\"e\") VALUES($1,FALSE,$2,$3)"
        );
        assert_eq!(
            built.params,
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(4)]
        );
    }

    #[test]
    fn test_insert_empty_payload_is_rejected() {
        let spec = QuerySpec::new(ExecKind::Insert, "t").with_payload("#only", 1i64);
        assert!(matches!(
            build(&spec).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn test_list_rows_and_count_statements() {
        let spec = QuerySpec::new(ExecKind::List, "orders")
            .with_predicate(Predicate::eq("status", "paid"))
            .with_sort("created_desc")
            .with_take(20)
            .with_skip(0);
        let rows = build(&spec).unwrap();
        assert_eq!(
            rows.text,
            "SELECT * FROM orders WHERE \"status\"='paid' ORDER BY \"created\" DESC LIMIT 20"
        );
        let count = build_count(&spec).unwrap();
        assert_eq!(
            count.text,
            "SELECT COUNT(1)::int as count FROM orders WHERE \"status\"='paid'"
        );
    }

    #[test]
    fn test_skip_appends_offset() {
        let spec = QuerySpec::new(ExecKind::Find, "orders")
            .with_take(10)
            .with_skip(30);
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT * FROM orders LIMIT 10 OFFSET 30"
        );
    }

    #[test]
    fn test_update_without_returning_counts_rows() {
        let spec = QuerySpec::new(ExecKind::Update, "products")
            .with_payload("price", 1899i64)
            .with_predicate(Predicate::eq("id", 5i64));
        let built = build(&spec).unwrap();
        assert_eq!(
            built.text,
            "WITH rows AS (UPDATE products SET \"price\"=$1 WHERE \"id\"=5 RETURNING 1) \
             SELECT COUNT(1)::int count FROM rows"
        );
        assert_eq!(built.params, vec![SqlValue::Int(1899)]);
    }

    #[test]
    fn test_update_with_returning() {
        let spec = QuerySpec::new(ExecKind::Update, "products")
            .with_payload("price", 1899i64)
            .with_predicate(Predicate::eq("id", 5i64))
            .with_returning("id")
            .with_returning("price");
        assert_eq!(
            build(&spec).unwrap().text,
            "UPDATE products SET \"price\"=$1 WHERE \"id\"=5 RETURNING id,price"
        );
    }

    #[test]
    fn test_update_operator_prefixes() {
        let spec = QuerySpec::new(ExecKind::Update, "articles")
            .with_payload("+views", 1i64)
            .with_payload(">top_score", 88i64)
            .with_payload("<floor_score", 3i64)
            .with_payload("!published", SqlValue::Null)
            .with_payload("=touched", "now()");
        let built = build(&spec).unwrap();
        assert_eq!(
            built.text,
            "WITH rows AS (UPDATE articles SET \
             \"views\"=COALESCE(\"views\",0)+$1,\
             \"top_score\"=GREATEST(\"top_score\",$2),\
             \"floor_score\"=LEAST(\"floor_score\",$3),\
             \"published\"=NOT \"published\",\
             \"touched\"='now()' \
             RETURNING 1) SELECT COUNT(1)::int count FROM rows"
        );
        assert_eq!(
            built.params,
            vec![SqlValue::Int(1), SqlValue::Int(88), SqlValue::Int(3)]
        );
    }

    #[test]
    fn test_remove_with_returning() {
        let spec = QuerySpec::new(ExecKind::Remove, "orders")
            .with_predicate(Predicate::eq("id", 5i64))
            .with_returning("id");
        assert_eq!(
            build(&spec).unwrap().text,
            "DELETE FROM orders WHERE \"id\"=5 RETURNING id"
        );
    }

    #[test]
    fn test_count_and_check() {
        let spec = QuerySpec::new(ExecKind::Count, "orders")
            .with_predicate(Predicate::eq("status", "paid"));
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT COUNT(1)::int as count FROM orders WHERE \"status\"='paid'"
        );

        let spec = QuerySpec::new(ExecKind::Check, "orders")
            .with_predicate(Predicate::eq("status", "paid"));
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT 1 as count FROM orders WHERE \"status\"='paid' LIMIT 1"
        );

        let spec = spec.with_take(5);
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT 1 as count FROM orders WHERE \"status\"='paid' LIMIT 5"
        );
    }

    #[test]
    fn test_ddl_statements() {
        let spec = QuerySpec::new(ExecKind::Drop, "scratch").with_schema("tmp");
        assert_eq!(build(&spec).unwrap().text, "DROP TABLE tmp.scratch");

        let spec = QuerySpec::new(ExecKind::Truncate, "scratch");
        assert_eq!(
            build(&spec).unwrap().text,
            "TRUNCATE TABLE scratch RESTART IDENTITY"
        );
    }

    #[test]
    fn test_scalar_aggregate() {
        let spec = QuerySpec::new(ExecKind::Scalar, "sales")
            .with_scalar(ScalarSpec::new(ScalarKind::Sum, "amount"));
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT SUM(amount)::numeric as value FROM sales"
        );

        let spec = QuerySpec::new(ExecKind::Scalar, "sales").with_scalar(ScalarSpec {
            kind: ScalarKind::Count,
            key: Some("amount".to_string()),
            key2: None,
        });
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT COUNT(1)::int as value FROM sales"
        );
    }

    #[test]
    fn test_scalar_group() {
        let spec = QuerySpec::new(ExecKind::Scalar, "sales")
            .with_scalar(ScalarSpec::group("region", Some("amount".to_string())));
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT region, SUM(amount)::numeric as value FROM sales GROUP BY region"
        );

        let spec = QuerySpec::new(ExecKind::Scalar, "sales")
            .with_scalar(ScalarSpec::group("region", None));
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT region, COUNT(1)::int as value FROM sales GROUP BY region"
        );
    }

    #[test]
    fn test_raw_where_substitution() {
        let spec = QuerySpec::raw(
            ExecKind::Query,
            "SELECT * FROM orders o {where} ORDER BY o.id",
        )
        .with_predicate(Predicate::eq("status", "paid"));
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT * FROM orders o WHERE \"status\"='paid' ORDER BY o.id"
        );
    }

    #[test]
    fn test_raw_where_appended() {
        let spec = QuerySpec::raw(ExecKind::Query, "SELECT * FROM orders")
            .with_predicate(Predicate::eq("status", "paid"));
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT * FROM orders WHERE \"status\"='paid'"
        );
    }

    #[test]
    fn test_raw_placeholder_removed_without_predicates() {
        let spec = QuerySpec::raw(ExecKind::Query, "SELECT * FROM orders{where}");
        assert_eq!(build(&spec).unwrap().text, "SELECT * FROM orders");
    }

    #[test]
    fn test_raw_params_pass_through() {
        let spec = QuerySpec::raw(ExecKind::Query, "SELECT * FROM orders WHERE id = $1")
            .with_param(5i64);
        let built = build(&spec).unwrap();
        assert_eq!(built.params, vec![SqlValue::Int(5)]);
    }

    #[test]
    fn test_localized_projection() {
        let spec = QuerySpec::new(ExecKind::Find, "articles")
            .with_field("id")
            .with_field("title§")
            .with_language("_de");
        assert_eq!(
            build(&spec).unwrap().text,
            "SELECT \"id\",\"title_de\" AS \"title\" FROM articles"
        );
    }
}
