use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing bootstrap for tests and example binaries.
///
/// Filter directives come from `BLAZELOG_LOG` if set, then `RUST_LOG`, and
/// default to this crate's own records at info. The `log` macros used on
/// the worker's hot path are forwarded to `tracing`, and the formatter
/// prints thread names so output from the `blazelog-worker` thread stands
/// apart from producer threads.
///
/// Calling this more than once is harmless.
pub fn init() {
    let _ = LogTracer::init();

    let filter = EnvFilter::try_from_env("BLAZELOG_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("blazelog=info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Benchmarks measure the ingestion path itself, so the subscriber drops
/// every event: instrumentation must not show up in the numbers.
///
/// Calling this more than once is harmless.
pub fn init_for_benchmarks() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("off"))
        .try_init();
}
