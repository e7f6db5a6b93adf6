//! Logging initialization and query/cache instrumentation.
//!
//! Metrics go through the `metrics` facade and are no-ops until the host
//! process installs a recorder.

use tracing_subscriber::EnvFilter;

/// Initializes a tracing subscriber with an env-filter.
///
/// Honors `RUST_LOG` when set; otherwise logs the crate at `info` (`debug`
/// when `verbose`). Safe to call more than once; later calls are no-ops.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "pglane=debug" } else { "pglane=info" })
    });
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Counts a dispatched query by kind (`read` / `write`).
pub(crate) fn record_query(kind: &'static str) {
    match kind {
        "write" => metrics::counter!("pglane_write_queries_total").increment(1),
        _ => metrics::counter!("pglane_read_queries_total").increment(1),
    }
}

/// Counts a cache interaction (`hit` / `miss` / `bypass` / `error`).
pub(crate) fn record_cache(status: &'static str) {
    metrics::counter!("pglane_cache_requests_total", "status" => status).increment(1);
}

/// Publishes the breaker state (0 closed, 1 open, 2 half-open).
pub(crate) fn record_breaker_state(state: u8) {
    metrics::gauge!("pglane_circuit_breaker_state").set(f64::from(state));
}
