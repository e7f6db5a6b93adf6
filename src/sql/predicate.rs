//! WHERE composition.

use crate::models::{Comparer, Predicate, SearchAnchor, SqlValue};
use crate::sql::escape::{array_element, literal, quote_text};
use crate::sql::fields::{render_field, FieldPosition};
use crate::{Error, Result};

/// Renders a predicate list joined by the given operator: `AND` at the top
/// level, `OR` inside nested groups.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for a null comparison with an ordering
/// comparer.
pub fn compose(predicates: &[Predicate], language: Option<&str>, joiner: &str) -> Result<String> {
    let mut parts = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        parts.push(render(predicate, language)?);
    }
    Ok(parts.join(&format!(" {joiner} ")))
}

fn render(predicate: &Predicate, language: Option<&str>) -> Result<String> {
    match predicate {
        Predicate::Where {
            name,
            comparer,
            value,
        } => render_where(name, *comparer, value, language),
        Predicate::In { name, values } => Ok(format!(
            "{} IN ({})",
            column(name, language),
            value_list(values)
        )),
        Predicate::NotIn { name, values } => Ok(format!(
            "{} NOT IN ({})",
            column(name, language),
            value_list(values)
        )),
        Predicate::Or(nested) => Ok(format!("({})", compose(nested, language, "OR")?)),
        Predicate::Array {
            name,
            comparer,
            values,
        } => Ok(format!(
            "{} {} ARRAY[{}]",
            column(name, language),
            comparer.as_str(),
            element_list(values)
        )),
        Predicate::Between { name, from, to } => Ok(format!(
            "({} BETWEEN {} AND {})",
            column(name, language),
            literal(&from.resolved()),
            literal(&to.resolved())
        )),
        Predicate::Search { name, term, anchor } => {
            Ok(render_search(name, term, *anchor, language))
        },
        Predicate::Contains { name } => {
            Ok(format!("LENGTH({}::text)>0", column(name, language)))
        },
        Predicate::Empty { name } => {
            let column = column(name, language);
            Ok(format!("({column} IS NULL OR LENGTH({column}::text)=0)"))
        },
        Predicate::DatePart {
            part,
            name,
            comparer,
            value,
        } => Ok(format!(
            "EXTRACT({} from {}){}{}",
            part.as_str(),
            column(name, language),
            comparer.as_str(),
            value
        )),
        Predicate::Permit {
            name,
            values,
            required,
            user_id,
        } => Ok(render_permit(name, values, *required, user_id.as_ref(), language)),
        Predicate::Raw(fragment) => Ok(format!("({fragment})")),
    }
}

fn render_where(
    name: &str,
    comparer: Comparer,
    value: &SqlValue,
    language: Option<&str>,
) -> Result<String> {
    let column = column(name, language);
    let value = value.resolved();
    if value.is_null() {
        return match comparer {
            Comparer::Eq => Ok(format!("{column} IS NULL")),
            Comparer::Ne => Ok(format!("{column} IS NOT NULL")),
            other => Err(Error::InvalidInput(format!(
                "null comparison with '{}' is not supported for column '{name}'",
                other.as_str()
            ))),
        };
    }
    Ok(format!("{column}{}{}", comparer.as_str(), literal(&value)))
}

fn render_search(name: &str, term: &str, anchor: SearchAnchor, language: Option<&str>) -> String {
    let term: String = term.chars().filter(|c| *c != '%').collect();
    let pattern = match anchor {
        SearchAnchor::Beg => format!("{term}%"),
        SearchAnchor::End => format!("%{term}"),
        SearchAnchor::Contains => format!("%{term}%"),
    };
    format!(
        "{}::text ILIKE {}",
        column(name, language),
        quote_text(&pattern)
    )
}

fn render_permit(
    name: &str,
    values: &[SqlValue],
    required: bool,
    user_id: Option<&SqlValue>,
    language: Option<&str>,
) -> String {
    let column = column(name, language);
    let mut clause = String::new();
    if let Some(user_id) = user_id {
        clause.push_str(&format!("\"userid\"={} OR ", literal(&user_id.resolved())));
    }
    if required {
        clause.push_str(&format!("array_length({column},1) IS NULL OR "));
    }
    clause.push_str(&format!(
        "{column}::_text && ARRAY[{}]",
        element_list(values)
    ));
    format!("({clause})")
}

fn column(name: &str, language: Option<&str>) -> String {
    render_field(name, language, FieldPosition::Predicate)
}

/// Comma list of literals; an empty input keeps a `null` placeholder so the
/// statement stays well-formed.
fn value_list(values: &[SqlValue]) -> String {
    if values.is_empty() {
        return "null".to_string();
    }
    let rendered: Vec<String> = values.iter().map(|v| literal(&v.resolved())).collect();
    rendered.join(",")
}

/// Comma list of array elements; text elements containing `,` split into
/// separate elements.
fn element_list(values: &[SqlValue]) -> String {
    let mut elements = Vec::with_capacity(values.len());
    for value in values {
        match value.resolved() {
            SqlValue::Text(text) if text.contains(',') => {
                elements.extend(
                    text.split(',')
                        .map(|part| SqlValue::Text(part.trim().to_string())),
                );
            },
            other => elements.push(other),
        }
    }
    let rendered: Vec<String> = elements.iter().map(array_element).collect();
    rendered.join(",")
}
