//! # Telemetry
//!
//! Structured logging setup for hosts that do not install their own
//! subscriber.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,cartline=debug";

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages from every crate
/// - `RUST_LOG=cartline=trace` - Trace for the cart engine only
/// - Default: [`DEFAULT_FILTER`]
///
/// Returns `false` if a global subscriber was already installed; the
/// existing one is left in place.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
