//! Diagnostics for operators and developers, separate from the test results.
//!
//! Tracing output goes to stderr and is never persisted. The session reports
//! (`results.txt`, `summary.txt`, `other_logs.txt`) and the JSON session files
//! are written by `io::reports` and `io::store` whatever the filter says.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset: `warn`, `info` with one `-v`,
/// `debug` with two or more.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides `verbosity`.
///
/// ```bash
/// RUST_LOG=tramp::driver=debug tramp replay trace.json
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1)
                .compact(),
        )
        .init();
}
