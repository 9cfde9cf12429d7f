//! Global `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Output format for the global subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
/// Returns `false` when a subscriber was already installed, which is normal
/// when several tests call this.
pub fn init_tracing(format: TracingFormat) -> bool {
    let filter = env_filter();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = match format {
        TracingFormat::Text => builder.try_init(),
        TracingFormat::Json => builder.json().flatten_event(true).try_init(),
    };

    match installed {
        Ok(()) => {
            tracing::debug!(?format, "tracing subscriber installed");
            true
        },
        Err(_) => false,
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
