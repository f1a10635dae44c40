//! Logging setup.
//!
//! The library itself only emits `tracing` events. Applications and tests
//! that want them printed can install a formatting subscriber here, filtered
//! by `RUST_LOG` (default `info`).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to `info`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter)
}

/// Installs a fmt subscriber with an explicit filter directive, such as
/// `"sealed_compute=debug"`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging_with_filter(directive: &str) -> bool {
    install(EnvFilter::new(directive))
}

fn install(filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
