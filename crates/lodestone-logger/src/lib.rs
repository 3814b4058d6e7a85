//! Logging setup shared by the lodestone binaries and tests.

pub mod severity;

pub use severity::{LogSeverity, ParseSeverityError};

use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `severity` when it is set. Returns `false` when a
/// subscriber was already installed, in which case nothing changes.
pub fn init(severity: LogSeverity) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(severity.as_directive()));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .is_ok()
}
