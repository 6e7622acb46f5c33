use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Install the global tracing subscriber exactly once.
///
/// Respects RUST_LOG; defaults to `info` when unset.
pub fn init_logger(service_name: &'static str) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true)
            .init();

        tracing::info!(service = service_name, "logger initialized");
    });
}
