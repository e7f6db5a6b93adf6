//! Row conversion and per-operation result shaping.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value as Json};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::models::{ExecKind, QueryResult, QuerySpec, ScalarKind, TIMESTAMP_FORMAT};
use crate::Result;

/// Converts driver rows into JSON objects.
pub(crate) fn rows_to_json(rows: &[Row]) -> Vec<Json> {
    rows.iter().map(row_to_json).collect()
}

/// Converts one driver row into a JSON object, keyed by column name.
///
/// Unknown column types decode to null rather than failing the whole row.
pub(crate) fn row_to_json(row: &Row) -> Json {
    let mut object = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value: Option<Json> = match column.type_().name() {
            "bool" => row.try_get::<_, Option<bool>>(index).ok().flatten().map(Json::from),
            "int2" => row
                .try_get::<_, Option<i16>>(index)
                .ok()
                .flatten()
                .map(Json::from),
            "int4" => row
                .try_get::<_, Option<i32>>(index)
                .ok()
                .flatten()
                .map(Json::from),
            "int8" => row
                .try_get::<_, Option<i64>>(index)
                .ok()
                .flatten()
                .map(Json::from),
            "float4" => row
                .try_get::<_, Option<f32>>(index)
                .ok()
                .flatten()
                .map(|v| Json::from(f64::from(v))),
            "float8" => row
                .try_get::<_, Option<f64>>(index)
                .ok()
                .flatten()
                .map(Json::from),
            "numeric" => row
                .try_get::<_, Option<Decimal>>(index)
                .ok()
                .flatten()
                .map(|v| Json::from(v.to_string())),
            "text" | "varchar" | "bpchar" | "name" | "char" => row
                .try_get::<_, Option<String>>(index)
                .ok()
                .flatten()
                .map(Json::from),
            "uuid" => row
                .try_get::<_, Option<Uuid>>(index)
                .ok()
                .flatten()
                .map(|v| Json::from(v.to_string())),
            "json" | "jsonb" => row.try_get::<_, Option<Json>>(index).ok().flatten(),
            "timestamp" => row
                .try_get::<_, Option<NaiveDateTime>>(index)
                .ok()
                .flatten()
                .map(|v| Json::from(v.format(TIMESTAMP_FORMAT).to_string())),
            "timestamptz" => row
                .try_get::<_, Option<DateTime<Utc>>>(index)
                .ok()
                .flatten()
                .map(|v| Json::from(v.to_rfc3339())),
            "date" => row
                .try_get::<_, Option<NaiveDate>>(index)
                .ok()
                .flatten()
                .map(|v| Json::from(v.to_string())),
            "_text" | "_varchar" => row
                .try_get::<_, Option<Vec<String>>>(index)
                .ok()
                .flatten()
                .map(Json::from),
            "_int4" => row
                .try_get::<_, Option<Vec<i32>>>(index)
                .ok()
                .flatten()
                .map(Json::from),
            "_int8" => row
                .try_get::<_, Option<Vec<i64>>>(index)
                .ok()
                .flatten()
                .map(Json::from),
            _ => None,
        };
        object.insert(column.name().to_string(), value.unwrap_or(Json::Null));
    }
    Json::Object(object)
}

/// Shapes driver rows into the per-operation result.
pub(crate) fn shape(spec: &QuerySpec, rows: &[Row]) -> Result<QueryResult> {
    shape_json(spec, rows_to_json(rows))
}

/// Shapes already-converted rows into the per-operation result.
#[allow(clippy::needless_pass_by_value)]
pub(crate) fn shape_json(spec: &QuerySpec, items: Vec<Json>) -> Result<QueryResult> {
    let result = match spec.exec {
        ExecKind::Find | ExecKind::Read | ExecKind::Query => {
            if spec.first {
                QueryResult::Row(items.into_iter().next())
            } else {
                QueryResult::Rows(items)
            }
        },
        // The page half of a list; the executor folds in the count query.
        ExecKind::List => QueryResult::Rows(items),
        ExecKind::Count => QueryResult::Count(count_from(&items)),
        ExecKind::Check => QueryResult::Flag(!items.is_empty()),
        ExecKind::Insert => shape_insert(spec, items),
        ExecKind::Update | ExecKind::Remove => shape_write(spec, items),
        ExecKind::Scalar => {
            if spec.scalar.as_ref().is_some_and(|s| s.kind == ScalarKind::Group) {
                QueryResult::Rows(items)
            } else {
                QueryResult::Scalar(numeric_from(&items))
            }
        },
        ExecKind::Drop | ExecKind::Truncate | ExecKind::Command => QueryResult::Empty,
    };
    Ok(result)
}

fn shape_insert(spec: &QuerySpec, items: Vec<Json>) -> QueryResult {
    if !spec.returning.is_empty() {
        return QueryResult::Row(items.into_iter().next());
    }
    if let Some(primary_key) = &spec.primary_key {
        let value = items
            .first()
            .and_then(|row| row.get(primary_key.as_str()))
            .cloned()
            .unwrap_or(Json::Null);
        return QueryResult::Value(value);
    }
    QueryResult::Count(Some(i64::try_from(items.len()).unwrap_or(i64::MAX)))
}

fn shape_write(spec: &QuerySpec, items: Vec<Json>) -> QueryResult {
    if spec.returning.is_empty() {
        // Update-without-RETURNING runs as a counting CTE; the count arrives
        // as a single-row result set.
        return QueryResult::Count(count_from(&items));
    }
    if spec.first {
        QueryResult::Row(items.into_iter().next())
    } else {
        QueryResult::Rows(items)
    }
}

/// Extracts the `count` column of the first row.
pub(crate) fn count_from(items: &[Json]) -> Option<i64> {
    items.first()?.get("count").and_then(Json::as_i64)
}

/// Extracts the `value` column of the first row as a number; NUMERIC columns
/// arrive as strings and are parsed.
fn numeric_from(items: &[Json]) -> Option<f64> {
    match items.first()?.get("value")? {
        Json::Number(number) => number.as_f64(),
        Json::String(text) => text.parse().ok(),
        _ => None,
    }
}
