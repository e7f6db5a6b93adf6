//! Identifier rendering with language localization and memoization.
//!
//! Rendered identifiers are memoized process-wide in a bounded map keyed by
//! `(position, language, raw name)`. The table is a pure memoization cache:
//! for a fixed key the rendered output is byte-identical, inserts are
//! idempotent, and clearing it at any time is safe.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock, PoisonError};

use lru::LruCache;

/// Trailing marker on a column name requesting language-localized rewriting.
pub const LOCALIZED_SUFFIX: char = '§';

const CACHE_CAPACITY: usize = 1024;

/// Where the rendered identifier will appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPosition {
    /// SELECT list: localized columns render with an alias back to the base
    /// name.
    Projection,
    /// WHERE / SET / ORDER BY position: no alias.
    Predicate,
}

type FieldKey = (FieldPosition, String, String);

fn cache() -> &'static Mutex<LruCache<FieldKey, String>> {
    static CACHE: OnceLock<Mutex<LruCache<FieldKey, String>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Mutex::new(LruCache::new(capacity))
    })
}

/// Renders a column identifier for the given position.
///
/// Plain names are double-quoted unless they contain `"`, whitespace, `:` or
/// `.` (treated as pre-qualified and passed through). Names ending in the
/// localization marker are rewritten to `"<base><language>"`, aliased back
/// to `"<base>"` in projection position.
#[must_use]
pub fn render_field(name: &str, language: Option<&str>, position: FieldPosition) -> String {
    let language = language.unwrap_or("");
    let key = (position, language.to_string(), name.to_string());

    let mut table = cache().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(hit) = table.get(&key) {
        return hit.clone();
    }
    let rendered = render_uncached(name, language, position);
    table.put(key, rendered.clone());
    rendered
}

fn render_uncached(name: &str, language: &str, position: FieldPosition) -> String {
    if let Some(base) = name.strip_suffix(LOCALIZED_SUFFIX) {
        return match position {
            FieldPosition::Predicate => format!("\"{base}{language}\""),
            FieldPosition::Projection => format!("\"{base}{language}\" AS \"{base}\""),
        };
    }
    if name.contains('"')
        || name.contains(':')
        || name.contains('.')
        || name.chars().any(char::is_whitespace)
    {
        name.to_string()
    } else {
        format!("\"{name}\"")
    }
}

/// Renders a `"<col>_asc"` / `"<col>_desc"` sort token.
#[must_use]
pub fn render_sort(token: &str, language: Option<&str>) -> String {
    let (column, direction) = if let Some(column) = token.strip_suffix("_desc") {
        (column, "DESC")
    } else if let Some(column) = token.strip_suffix("_asc") {
        (column, "ASC")
    } else {
        (token, "ASC")
    };
    format!(
        "{} {direction}",
        render_field(column, language, FieldPosition::Predicate)
    )
}

/// Clears the memoization table.
pub fn clear_field_cache() {
    cache()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Number of memoized identifiers.
#[must_use]
pub fn field_cache_len() -> usize {
    cache()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}
