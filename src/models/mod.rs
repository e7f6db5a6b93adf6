//! Data model: filter records, dynamic SQL values, normalized results.

mod filter;
mod result;
mod value;

pub use filter::{
    ArrayComparer, Comparer, DatePart, ExecKind, Predicate, QuerySpec, ScalarKind, ScalarSpec,
    SearchAnchor,
};
pub use result::QueryResult;
pub use value::SqlValue;

pub(crate) use value::TIMESTAMP_FORMAT;
