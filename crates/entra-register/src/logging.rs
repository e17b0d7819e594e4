// Tracing setup for the CLI. Events go to stderr next to the progress lines.
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const DEFAULT_LEVEL: &str = "warn";
pub const VERBOSE_LEVEL: &str = "debug";

pub fn init_tracing(verbose: bool) {
    init_tracing_with_level(if verbose { VERBOSE_LEVEL } else { DEFAULT_LEVEL });
}

pub fn init_tracing_with_level(level: &str) {
    // Prefer RUST_LOG from env, otherwise use provided level string.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
