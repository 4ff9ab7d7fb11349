//! Tracing setup.

use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "CCE_LOG";

/// Install the global subscriber.
///
/// Reads [`LOG_ENV`] for directives such as `CCE_LOG=cce=debug,cce_core=info`
/// and falls back to `cce=info` when unset or invalid. Logs go to stderr so
/// `--json` output on stdout stays machine-readable. Safe to call repeatedly.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("cce=info"));

        // A subscriber installed by an embedding process wins.
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .with(filter)
            .try_init();
    });
}
