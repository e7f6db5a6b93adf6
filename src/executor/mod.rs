//! Pooled query execution.
//!
//! The executor owns a bounded deadpool-postgres pool. The public surface is
//! synchronous; driver I/O runs on the ambient tokio runtime when one
//! exists, otherwise on a private current-thread runtime. Pool clients are
//! released by drop on every exit path, including build failures and driver
//! errors. A `list` call holds one client across both of its sub-queries so
//! the row and count statements observe the same connection.

pub(crate) mod normalize;

use std::future::Future;

use deadpool_postgres::{Pool, Status};
use tokio::runtime::Handle;

use crate::models::{ExecKind, QueryResult, QuerySpec};
use crate::sql::{self, BuiltQuery};
use crate::{Error, Result};

/// Maps pool acquisition errors.
fn pool_error(e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "pool_get_client".to_string(),
        cause: e.to_string(),
    }
}

/// Maps driver errors.
fn query_error(operation: &str, e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// Runs a future to completion from a synchronous caller, reusing the
/// ambient runtime when present.
pub(crate) fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if let Ok(handle) = Handle::try_current() {
        handle.block_on(future)
    } else {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "create_runtime".to_string(),
                cause: e.to_string(),
            })?;
        runtime.block_on(future)
    }
}

/// Pooled query executor.
pub struct Executor {
    pool: Pool,
}

impl Executor {
    pub(crate) const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds and runs one filter record against the database.
    ///
    /// # Errors
    ///
    /// Build failures surface as [`Error::InvalidInput`] without touching
    /// the pool; driver failures surface as [`Error::OperationFailed`].
    pub fn run(&self, spec: &QuerySpec) -> Result<QueryResult> {
        let built = sql::build(spec)?;
        self.run_built(spec, &built)
    }

    /// Runs an already-built statement for `spec`.
    pub(crate) fn run_built(&self, spec: &QuerySpec, built: &BuiltQuery) -> Result<QueryResult> {
        if spec.debug {
            tracing::info!(
                target: "sql",
                statement = %built.text,
                params = ?built.params,
                "dispatching statement"
            );
        }
        block_on(self.run_async(spec, built))
    }

    async fn run_async(&self, spec: &QuerySpec, built: &BuiltQuery) -> Result<QueryResult> {
        if spec.exec == ExecKind::List {
            return self.run_list(spec, built).await;
        }

        let client = self.pool.get().await.map_err(pool_error)?;
        let params = built.param_refs();
        match spec.exec {
            ExecKind::Drop | ExecKind::Truncate => {
                client
                    .execute(built.text.as_str(), &params)
                    .await
                    .map_err(|e| query_error("execute", e))?;
                Ok(QueryResult::Empty)
            },
            ExecKind::Command => {
                let affected = client
                    .execute(built.text.as_str(), &params)
                    .await
                    .map_err(|e| query_error("execute", e))?;
                Ok(QueryResult::Count(Some(to_count(affected))))
            },
            ExecKind::Insert if spec.returning.is_empty() && spec.primary_key.is_none() => {
                let affected = client
                    .execute(built.text.as_str(), &params)
                    .await
                    .map_err(|e| query_error("insert", e))?;
                Ok(QueryResult::Count(Some(to_count(affected))))
            },
            ExecKind::Remove if spec.returning.is_empty() => {
                let affected = client
                    .execute(built.text.as_str(), &params)
                    .await
                    .map_err(|e| query_error("delete", e))?;
                Ok(QueryResult::Count(Some(to_count(affected))))
            },
            _ => {
                let rows = client
                    .query(built.text.as_str(), &params)
                    .await
                    .map_err(|e| query_error("query", e))?;
                normalize::shape(spec, &rows)
            },
        }
    }

    /// Runs the two halves of a `list`: rows first, then the count, on the
    /// same pooled client. A count failure surfaces and the rows are
    /// discarded.
    async fn run_list(&self, spec: &QuerySpec, built: &BuiltQuery) -> Result<QueryResult> {
        let count_query = sql::build_count(spec)?;
        let client = self.pool.get().await.map_err(pool_error)?;

        let rows = client
            .query(built.text.as_str(), &built.param_refs())
            .await
            .map_err(|e| query_error("list_rows", e))?;
        let count_rows = client
            .query(count_query.text.as_str(), &[])
            .await
            .map_err(|e| query_error("list_count", e))?;

        let items = normalize::rows_to_json(&rows);
        let count = normalize::count_from(&normalize::rows_to_json(&count_rows)).unwrap_or(0);
        Ok(QueryResult::Page { items, count })
    }

    /// Pool status snapshot.
    pub(crate) fn status(&self) -> Status {
        self.pool.status()
    }

    /// Closes the pool; outstanding clients finish normally.
    pub(crate) fn close(&self) {
        self.pool.close();
    }
}

/// Affected-row counts fit i64 in practice; saturate rather than wrap.
fn to_count(affected: u64) -> i64 {
    i64::try_from(affected).unwrap_or(i64::MAX)
}
