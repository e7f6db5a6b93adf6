//! Value escaping and literal rendering.

use crate::models::{SqlValue, TIMESTAMP_FORMAT};

/// Renders a value as a PostgreSQL literal in predicate position.
#[must_use]
pub fn literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "null".to_string(),
        SqlValue::Bool(v) => v.to_string(),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::Float(v) => v.to_string(),
        SqlValue::Text(v) => quote_text(v),
        SqlValue::Timestamp(v) => quote_text(&v.format(TIMESTAMP_FORMAT).to_string()),
        SqlValue::Array(items) => array_literal(items),
        SqlValue::Json(v) => quote_text(&v.to_string()),
        SqlValue::Lazy(produce) => literal(&produce().resolved()),
    }
}

/// Renders an array element.
///
/// PostgreSQL accepts both casings for NULL; textual array elements use the
/// uppercase form.
pub(crate) fn array_element(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Lazy(produce) => array_element(&produce().resolved()),
        other => literal(other),
    }
}

/// Renders an `ARRAY[...]` constructor; an empty array renders as `null`.
fn array_literal(items: &[SqlValue]) -> String {
    if items.is_empty() {
        return "null".to_string();
    }
    let elements: Vec<String> = items.iter().map(array_element).collect();
    format!("ARRAY[{}]", elements.join(","))
}

/// Single-quotes a string, doubling `'` and `\`.
///
/// A literal that contained a backslash gets the `E` escape-string prefix so
/// the doubled backslashes read back as single ones.
#[must_use]
pub fn quote_text(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('\'', "''");
    if text.contains('\\') {
        format!("E'{escaped}'")
    } else {
        format!("'{escaped}'")
    }
}
