//! SQL generation for the PostgreSQL dialect.
//!
//! Everything in this module is pure CPU: nothing suspends or touches I/O.
//! Predicate values are inlined as escaped literals; payload values bind as
//! positional parameters. The closed operator sets in
//! [`crate::models::Comparer`] and the quoting rules in [`fields`] keep
//! caller data out of identifier position.

pub mod builder;
pub mod escape;
pub mod fields;
pub mod predicate;

pub use builder::{build, build_count, BuiltQuery};
