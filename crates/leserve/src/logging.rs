//! Log subscriber installation

use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. Fails when a global subscriber
/// is already installed.
pub fn init_logging(level: &str) -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}
