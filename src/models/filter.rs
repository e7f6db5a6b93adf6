//! Filter records: the sole input to the executor.

use serde::Serialize;

use super::value::SqlValue;

/// Operation kind of a filter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecKind {
    /// Read rows (or the first row when `first` is set).
    Find,
    /// Alias of [`ExecKind::Find`].
    Read,
    /// Read a page of rows plus the unpaged total.
    List,
    /// Count matching rows.
    Count,
    /// Test for row existence.
    Check,
    /// Aggregate or grouped aggregate.
    Scalar,
    /// Insert one row.
    Insert,
    /// Update matching rows.
    Update,
    /// Delete matching rows.
    Remove,
    /// Drop the table.
    Drop,
    /// Truncate the table, restarting identities.
    Truncate,
    /// Raw statement returning rows.
    Query,
    /// Raw statement returning an affected-row count.
    Command,
}

impl ExecKind {
    /// Canonical lowercase tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Read => "read",
            Self::List => "list",
            Self::Count => "count",
            Self::Check => "check",
            Self::Scalar => "scalar",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Drop => "drop",
            Self::Truncate => "truncate",
            Self::Query => "query",
            Self::Command => "command",
        }
    }

    /// Parses a lowercase tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "find" => Some(Self::Find),
            "read" => Some(Self::Read),
            "list" => Some(Self::List),
            "count" => Some(Self::Count),
            "check" => Some(Self::Check),
            "scalar" => Some(Self::Scalar),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "remove" => Some(Self::Remove),
            "drop" => Some(Self::Drop),
            "truncate" => Some(Self::Truncate),
            "query" => Some(Self::Query),
            "command" => Some(Self::Command),
            _ => None,
        }
    }
}

/// Binary comparison operator.
///
/// The closed set is deliberate: comparers may reach identifier position in
/// the rendered statement, so only these six tokens are ever emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparer {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `<>`
    #[serde(rename = "<>")]
    Ne,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
}

impl Comparer {
    /// SQL token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Parses a comparison token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" | "==" => Some(Self::Eq),
            "<>" | "!=" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            _ => None,
        }
    }
}

/// Array comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArrayComparer {
    /// Overlap: `&&`
    #[serde(rename = "&&")]
    Overlap,
    /// Containment: `@>`
    #[serde(rename = "@>")]
    Contains,
}

impl ArrayComparer {
    /// SQL token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overlap => "&&",
            Self::Contains => "@>",
        }
    }
}

/// Anchor variant for `ILIKE` search patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchAnchor {
    /// Match at the beginning: `term%`.
    Beg,
    /// Match at the end: `%term`.
    End,
    /// Match anywhere: `%term%`.
    Contains,
}

/// Date component for extracted comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePart {
    /// Calendar year.
    Year,
    /// Calendar month.
    Month,
    /// Day of month.
    Day,
    /// Hour of day.
    Hour,
    /// Minute of hour.
    Minute,
}

impl DatePart {
    /// `EXTRACT` field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
        }
    }
}

/// Aggregate selector for `exec: scalar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// Arithmetic mean.
    Avg,
    /// Minimum.
    Min,
    /// Sum.
    Sum,
    /// Maximum.
    Max,
    /// Row count.
    Count,
    /// Grouped aggregate: one row per distinct key.
    Group,
}

impl ScalarKind {
    /// SQL aggregate function name.
    #[must_use]
    pub const fn sql_fn(self) -> &'static str {
        match self {
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Sum => "SUM",
            Self::Max => "MAX",
            Self::Count => "COUNT",
            Self::Group => "GROUP",
        }
    }
}

/// Aggregate specification.
#[derive(Debug, Clone, Serialize)]
pub struct ScalarSpec {
    /// Which aggregate to compute.
    pub kind: ScalarKind,
    /// Aggregated column (grouping key for [`ScalarKind::Group`]).
    pub key: Option<String>,
    /// Summed column for grouped aggregates.
    pub key2: Option<String>,
}

impl ScalarSpec {
    /// Creates an aggregate over the given column.
    #[must_use]
    pub fn new(kind: ScalarKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: Some(key.into()),
            key2: None,
        }
    }

    /// Creates a grouped aggregate: one row per distinct `key`, summing
    /// `key2` (row count when `key2` is absent).
    #[must_use]
    pub fn group(key: impl Into<String>, key2: Option<String>) -> Self {
        Self {
            kind: ScalarKind::Group,
            key: Some(key.into()),
            key2,
        }
    }
}

/// One predicate clause of a filter record.
///
/// Clauses compose in sequence order, joined by `AND` at the top level and
/// by `OR` inside [`Predicate::Or`] nesting.
#[derive(Debug, Clone, Serialize)]
pub enum Predicate {
    /// Binary comparison; a null value renders as `IS NULL` / `IS NOT NULL`.
    Where {
        /// Column name.
        name: String,
        /// Comparison operator.
        comparer: Comparer,
        /// Compared value.
        value: SqlValue,
    },
    /// Membership test.
    In {
        /// Column name.
        name: String,
        /// Candidate values.
        values: Vec<SqlValue>,
    },
    /// Negated membership test.
    NotIn {
        /// Column name.
        name: String,
        /// Candidate values.
        values: Vec<SqlValue>,
    },
    /// Nested group joined by `OR`.
    Or(Vec<Predicate>),
    /// SQL array overlap or containment.
    Array {
        /// Column name.
        name: String,
        /// Overlap or containment.
        comparer: ArrayComparer,
        /// Compared elements; text elements containing `,` are split.
        values: Vec<SqlValue>,
    },
    /// Inclusive range test.
    Between {
        /// Column name.
        name: String,
        /// Lower bound.
        from: SqlValue,
        /// Upper bound.
        to: SqlValue,
    },
    /// Case-insensitive pattern search.
    Search {
        /// Column name.
        name: String,
        /// Search term; `%` characters are stripped before anchoring.
        term: String,
        /// Anchor variant.
        anchor: SearchAnchor,
    },
    /// Non-empty text test.
    Contains {
        /// Column name.
        name: String,
    },
    /// Empty-or-null text test.
    Empty {
        /// Column name.
        name: String,
    },
    /// Comparison against an extracted date component.
    DatePart {
        /// Date component.
        part: DatePart,
        /// Column name.
        name: String,
        /// Comparison operator.
        comparer: Comparer,
        /// Compared value.
        value: i64,
    },
    /// Array-overlap permission test with optional owner bypass.
    Permit {
        /// Column holding the permitted values.
        name: String,
        /// Values the caller holds.
        values: Vec<SqlValue>,
        /// When set, a null/absent column array also passes.
        required: bool,
        /// Owner id that bypasses the overlap test.
        user_id: Option<SqlValue>,
    },
    /// Raw predicate fragment, parenthesized verbatim.
    Raw(String),
}

impl Predicate {
    /// `name = value` comparison.
    #[must_use]
    pub fn eq(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::cmp(name, Comparer::Eq, value)
    }

    /// `name <> value` comparison.
    #[must_use]
    pub fn ne(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::cmp(name, Comparer::Ne, value)
    }

    /// Arbitrary binary comparison.
    #[must_use]
    pub fn cmp(name: impl Into<String>, comparer: Comparer, value: impl Into<SqlValue>) -> Self {
        Self::Where {
            name: name.into(),
            comparer,
            value: value.into(),
        }
    }

    /// Contains-anchored search.
    #[must_use]
    pub fn search(name: impl Into<String>, term: impl Into<String>) -> Self {
        Self::Search {
            name: name.into(),
            term: term.into(),
            anchor: SearchAnchor::Contains,
        }
    }
}

/// The filter record: the sole input to the executor.
///
/// Owned by the caller; the registry and executor never mutate a submitted
/// spec (the default schema is applied to a private copy).
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Operation kind.
    pub exec: ExecKind,
    /// Unqualified table name.
    pub table: String,
    /// Optional schema; falls back to the connection default.
    pub schema: Option<String>,
    /// Ordered predicate clauses.
    pub filter: Vec<Predicate>,
    /// Projection expressions; entries ending in `§` are localized.
    pub fields: Vec<String>,
    /// Sort tokens: `"<col>_asc"` / `"<col>_desc"`.
    pub sort: Vec<String>,
    /// LIMIT.
    pub take: Option<u32>,
    /// OFFSET.
    pub skip: Option<u32>,
    /// Column/value pairs for insert and update, in emission order. Keys may
    /// carry a one-character operator prefix.
    pub payload: Vec<(String, SqlValue)>,
    /// RETURNING columns; implies row output.
    pub returning: Vec<String>,
    /// Column whose value is extracted after insert when `returning` is
    /// absent.
    pub primary_key: Option<String>,
    /// Return only the first row.
    pub first: bool,
    /// Aggregate specification for `exec: scalar`.
    pub scalar: Option<ScalarSpec>,
    /// Raw statement text with an optional `{where}` placeholder.
    pub query: Option<String>,
    /// Bound parameters for the raw statement.
    pub params: Vec<SqlValue>,
    /// Localization suffix appended to `§`-marked columns.
    pub language: Option<String>,
    /// Log the rendered statement before dispatch.
    pub debug: bool,
    /// Bypass the cache layer for this call.
    pub nocache: bool,
}

impl QuerySpec {
    /// Creates a spec for the given operation and table.
    #[must_use]
    pub fn new(exec: ExecKind, table: impl Into<String>) -> Self {
        Self {
            exec,
            table: table.into(),
            schema: None,
            filter: Vec::new(),
            fields: Vec::new(),
            sort: Vec::new(),
            take: None,
            skip: None,
            payload: Vec::new(),
            returning: Vec::new(),
            primary_key: None,
            first: false,
            scalar: None,
            query: None,
            params: Vec::new(),
            language: None,
            debug: false,
            nocache: false,
        }
    }

    /// Creates a raw-statement spec.
    #[must_use]
    pub fn raw(exec: ExecKind, query: impl Into<String>) -> Self {
        let mut spec = Self::new(exec, "");
        spec.query = Some(query.into());
        spec
    }

    /// Sets the schema.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Appends a predicate clause.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.filter.push(predicate);
        self
    }

    /// Appends a projection expression.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Appends a sort token.
    #[must_use]
    pub fn with_sort(mut self, token: impl Into<String>) -> Self {
        self.sort.push(token.into());
        self
    }

    /// Sets LIMIT.
    #[must_use]
    pub const fn with_take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }

    /// Sets OFFSET.
    #[must_use]
    pub const fn with_skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Appends a payload entry.
    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.payload.push((key.into(), value.into()));
        self
    }

    /// Appends a RETURNING column.
    #[must_use]
    pub fn with_returning(mut self, column: impl Into<String>) -> Self {
        self.returning.push(column.into());
        self
    }

    /// Sets the extracted primary-key column.
    #[must_use]
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Sets first-row-only delivery.
    #[must_use]
    pub const fn with_first(mut self, first: bool) -> Self {
        self.first = first;
        self
    }

    /// Sets the aggregate specification.
    #[must_use]
    pub fn with_scalar(mut self, scalar: ScalarSpec) -> Self {
        self.scalar = Some(scalar);
        self
    }

    /// Appends a bound parameter for a raw statement.
    #[must_use]
    pub fn with_param(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Sets the localization suffix.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Enables statement logging for this call.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Bypasses the cache layer for this call.
    #[must_use]
    pub const fn with_nocache(mut self, nocache: bool) -> Self {
        self.nocache = nocache;
        self
    }

    /// Schema-qualified table identifier.
    #[must_use]
    pub fn qualified_table(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.table),
            None => self.table.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_kind_round_trip() {
        for kind in [
            ExecKind::Find,
            ExecKind::Read,
            ExecKind::List,
            ExecKind::Count,
            ExecKind::Check,
            ExecKind::Scalar,
            ExecKind::Insert,
            ExecKind::Update,
            ExecKind::Remove,
            ExecKind::Drop,
            ExecKind::Truncate,
            ExecKind::Query,
            ExecKind::Command,
        ] {
            assert_eq!(ExecKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ExecKind::parse("upsert"), None);
    }

    #[test]
    fn test_comparer_parse() {
        assert_eq!(Comparer::parse("="), Some(Comparer::Eq));
        assert_eq!(Comparer::parse("=="), Some(Comparer::Eq));
        assert_eq!(Comparer::parse("!="), Some(Comparer::Ne));
        assert_eq!(Comparer::parse("<>"), Some(Comparer::Ne));
        assert_eq!(Comparer::parse("like"), None);
    }

    #[test]
    fn test_qualified_table() {
        let spec = QuerySpec::new(ExecKind::Find, "orders");
        assert_eq!(spec.qualified_table(), "orders");

        let spec = spec.with_schema("sales");
        assert_eq!(spec.qualified_table(), "sales.orders");
    }

    #[test]
    fn test_builder_chain() {
        let spec = QuerySpec::new(ExecKind::List, "orders")
            .with_predicate(Predicate::eq("status", "paid"))
            .with_sort("created_desc")
            .with_take(20)
            .with_skip(0);
        assert_eq!(spec.filter.len(), 1);
        assert_eq!(spec.sort, vec!["created_desc"]);
        assert_eq!(spec.take, Some(20));
        assert_eq!(spec.skip, Some(0));
    }
}
