//! Log setup
//!
//! stdout carries the JSON response, so every log line goes to stderr.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter directive for a run
pub fn filter_for(debug: bool) -> &'static str {
    if debug {
        "info,registry_image_out=debug"
    } else {
        "info"
    }
}

/// Install the global subscriber; `RUST_LOG` wins over `debug`
///
/// Calling this twice is harmless, the second call is ignored.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_for(debug)));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
