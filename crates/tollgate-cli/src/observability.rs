// Tracing initialization. `RUST_LOG` wins over the configured level.
use tollgate_auth::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn init_tracing(logging: &LoggingConfig) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
}
