//! Tracing subscriber setup: compact, uptime-timestamped output, filterable
//! via `RUST_LOG`.

use tracing_subscriber::{
    fmt::{self, format, time},
    prelude::*,
    EnvFilter,
};

/// Install the global tracing subscriber. Returns a guard that does nothing
/// on drop but gives callers an RAII-shaped handle to hold for the
/// process's lifetime, matching the pattern other binaries in this
/// ecosystem use for their logging init.
pub fn init() -> impl Drop {
    let evt_fmt = format().with_timer(time::Uptime::default()).compact();
    let fmt_layer = fmt::layer().event_format(evt_fmt);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env())
        .init();

    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {}
    }
    Guard
}
